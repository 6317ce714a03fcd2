use album_service::config::{BlobBackend, Config};
use album_service::{
    create_router, serve_local_uploads, start_api_server, AlbumStore, AppState, BlobStore,
    LocalBlobStore, MemoryAlbumStore, MemoryBlobStore, PgAlbumStore, S3Uploader,
};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&config.service.log_level);

    info!(
        service = %config.service.name,
        "Starting album service"
    );

    // Initialize metrics
    init_metrics(config.service.metrics_port)?;

    let albums = build_album_store(&config).await?;

    let mut local_root = None;
    let blobs: Arc<dyn BlobStore> = match config.storage.backend {
        BlobBackend::S3 => {
            let s3_config = config
                .storage
                .s3
                .as_ref()
                .context("storage.backend is s3 but [storage.s3] is missing")?;
            Arc::new(
                S3Uploader::new(s3_config)
                    .await
                    .context("Failed to initialize S3 uploader")?,
            )
        }
        BlobBackend::Local => {
            let local = &config.storage.local;
            tokio::fs::create_dir_all(&local.root)
                .await
                .with_context(|| format!("Failed to create {}", local.root.display()))?;
            local_root = Some(local.root.clone());
            Arc::new(LocalBlobStore::new(local.root.clone(), &local.public_url_prefix))
        }
        BlobBackend::Memory => {
            warn!("Using in-memory blob store, photos are lost on restart");
            Arc::new(MemoryBlobStore::new())
        }
    };

    let state = AppState::new(albums, blobs, &config);
    let mut router = create_router(state, &config.api);
    if let Some(root) = local_root {
        router = serve_local_uploads(router, &config.storage.local.public_url_prefix, root);
    }

    let shutdown = CancellationToken::new();

    // Spawn API server task
    let api_config = config.api.clone();
    let server_shutdown = shutdown.clone();
    let api_handle = tokio::spawn(async move {
        if let Err(e) = start_api_server(router, &api_config, server_shutdown).await {
            error!(error = %e, "API server error");
        }
    });

    info!("Album service started successfully");

    // Wait for shutdown signal
    shutdown_signal().await;

    info!("Shutting down album service");

    // Let in-flight uploads finish
    shutdown.cancel();
    if let Err(e) = api_handle.await {
        error!(error = %e, "API server task failed");
    }

    info!("Album service stopped");

    Ok(())
}

async fn build_album_store(config: &Config) -> Result<Arc<dyn AlbumStore>> {
    let Some(url) = config.database.url.as_deref() else {
        warn!("No database url configured, albums are kept in memory");
        return Ok(Arc::new(MemoryAlbumStore::new()));
    };

    let store = PgAlbumStore::new(url, &config.database)
        .await
        .context("Failed to initialize album store")?;

    // Run migrations if enabled
    if config.database.run_migrations {
        store
            .run_migrations()
            .await
            .context("Failed to run database migrations")?;
    }

    Ok(Arc::new(store))
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json())
        .init();
}

/// Initialize Prometheus metrics exporter
fn init_metrics(port: u16) -> Result<()> {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();

    builder
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus metrics exporter")?;

    info!(port = port, "Prometheus metrics exporter started");

    Ok(())
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
