use serde::Deserialize;
use std::path::PathBuf;

/// Main configuration for the album service
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,
    /// Document store configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Blob storage configuration
    #[serde(default)]
    pub storage: StorageConfig,
    /// Upload limits
    #[serde(default)]
    pub uploads: UploadConfig,
    /// Album lifecycle settings
    #[serde(default)]
    pub albums: AlbumConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging/metrics
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Metrics port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

/// HTTP API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// API listen address
    #[serde(default = "default_api_host")]
    pub host: String,
    /// API listen port
    #[serde(default = "default_api_port")]
    pub port: u16,
    /// Enable CORS
    #[serde(default = "default_true")]
    pub cors_enabled: bool,
    /// Allowed CORS origins
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

/// Database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL. Without one the in-memory store is used.
    pub url: Option<String>,
    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Idle connection timeout in seconds
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// Run migrations on startup
    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

/// Which blob backend stores uploaded photos
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BlobBackend {
    S3,
    #[default]
    Local,
    Memory,
}

/// Blob storage configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: BlobBackend,
    /// Required when `backend = "s3"`
    pub s3: Option<S3Config>,
    #[serde(default)]
    pub local: LocalStorageConfig,
}

/// S3 storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    /// S3 bucket name for photo storage
    pub bucket: String,
    /// AWS region
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint URL (for MinIO, LocalStack, etc.)
    pub endpoint_url: Option<String>,
    /// Force path-style access (required for MinIO)
    #[serde(default)]
    pub force_path_style: bool,
    /// Prefix for publicly resolvable object URLs, e.g. a CDN origin
    pub public_url_prefix: Option<String>,
    /// Multipart upload threshold in bytes (5MB default)
    #[serde(default = "default_multipart_threshold")]
    pub multipart_threshold_bytes: usize,
    /// Part size for multipart uploads in bytes (5MB default)
    #[serde(default = "default_part_size")]
    pub part_size_bytes: usize,
}

/// Local filesystem storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LocalStorageConfig {
    /// Directory that receives uploaded photos
    #[serde(default = "default_local_root")]
    pub root: PathBuf,
    /// URL prefix under which `root` is served
    #[serde(default = "default_local_public_url_prefix")]
    pub public_url_prefix: String,
}

/// Upload limits and filtering
#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    /// Per-file size cap
    #[serde(default = "default_max_file_size")]
    pub max_file_size_bytes: u64,
    /// Maximum number of files accepted in one request
    #[serde(default = "default_max_files_per_batch")]
    pub max_files_per_batch: usize,
    /// Request body ceiling for an upload
    #[serde(default = "default_max_batch_bytes")]
    pub max_batch_bytes: usize,
    /// Declared media types must start with this prefix
    #[serde(default = "default_allowed_mime_prefix")]
    pub allowed_mime_prefix: String,
    /// Multipart field carrying the files
    #[serde(default = "default_field_name")]
    pub field_name: String,
    /// Parallel blob writes within a single batch
    #[serde(default = "default_upload_concurrency")]
    pub concurrency: usize,
    /// Directory for staged temp files (system temp dir when unset)
    pub staging_dir: Option<PathBuf>,
}

/// Album lifecycle configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AlbumConfig {
    /// Months an album stays visible after its public date
    #[serde(default = "default_expiry_window_months")]
    pub expiry_window_months: u32,
    /// Base URL of the viewer, used to build share links
    pub public_base_url: Option<String>,
}

// Default value functions
fn default_service_name() -> String {
    "album-service".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    2
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_idle_timeout_secs() -> u64 {
    600
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_multipart_threshold() -> usize {
    5 * 1024 * 1024 // 5MB
}

fn default_part_size() -> usize {
    5 * 1024 * 1024 // 5MB
}

fn default_local_root() -> PathBuf {
    PathBuf::from("public/uploads")
}

fn default_local_public_url_prefix() -> String {
    "/uploads".to_string()
}

fn default_max_file_size() -> u64 {
    10 * 1024 * 1024 // 10MB
}

fn default_max_files_per_batch() -> usize {
    10
}

fn default_max_batch_bytes() -> usize {
    50 * 1024 * 1024 // 50MB
}

fn default_allowed_mime_prefix() -> String {
    "image/".to_string()
}

fn default_field_name() -> String {
    "photos".to_string()
}

fn default_upload_concurrency() -> usize {
    4
}

fn default_expiry_window_months() -> u32 {
    2
}

impl Config {
    /// Load configuration from environment and config files
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            // Start with default values
            .set_default("service.name", "album-service")?
            .set_default("service.log_level", "info")?
            .set_default("service.metrics_port", 9090)?
            // Add config file if present
            .add_source(config::File::with_name("config/albums").required(false))
            .add_source(config::File::with_name("/etc/albums/albums").required(false))
            // Override with environment variables
            // ALBUMS__UPLOADS__MAX_FILE_SIZE_BYTES -> uploads.max_file_size_bytes
            .add_source(
                config::Environment::with_prefix("ALBUMS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.storage.backend == BlobBackend::S3 && self.storage.s3.is_none() {
            anyhow::bail!("storage.backend is s3 but no [storage.s3] section is configured");
        }
        if self.uploads.max_files_per_batch == 0 {
            anyhow::bail!("uploads.max_files_per_batch must be at least 1");
        }
        Ok(())
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            metrics_port: default_metrics_port(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
            cors_enabled: true,
            cors_origins: Vec::new(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout_secs(),
            idle_timeout_secs: default_idle_timeout_secs(),
            run_migrations: true,
        }
    }
}

impl Default for LocalStorageConfig {
    fn default() -> Self {
        Self {
            root: default_local_root(),
            public_url_prefix: default_local_public_url_prefix(),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size_bytes: default_max_file_size(),
            max_files_per_batch: default_max_files_per_batch(),
            max_batch_bytes: default_max_batch_bytes(),
            allowed_mime_prefix: default_allowed_mime_prefix(),
            field_name: default_field_name(),
            concurrency: default_upload_concurrency(),
            staging_dir: None,
        }
    }
}

impl Default for AlbumConfig {
    fn default() -> Self {
        Self {
            expiry_window_months: default_expiry_window_months(),
            public_base_url: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let uploads = UploadConfig::default();
        assert_eq!(uploads.max_file_size_bytes, 10 * 1024 * 1024);
        assert_eq!(uploads.max_files_per_batch, 10);
        assert_eq!(uploads.allowed_mime_prefix, "image/");
        assert_eq!(uploads.field_name, "photos");
        assert_eq!(AlbumConfig::default().expiry_window_months, 2);
        assert_eq!(StorageConfig::default().backend, BlobBackend::Local);
    }

    #[test]
    fn test_deserialize_partial_config() {
        let raw = r#"{
            "storage": { "backend": "s3", "s3": { "bucket": "albums" } },
            "uploads": { "max_file_size_bytes": 1024 }
        }"#;
        let config: Config = serde_json::from_str(raw).unwrap();

        assert_eq!(config.storage.backend, BlobBackend::S3);
        let s3 = config.storage.s3.as_ref().unwrap();
        assert_eq!(s3.bucket, "albums");
        assert_eq!(s3.region, "us-east-1");
        assert_eq!(config.uploads.max_file_size_bytes, 1024);
        assert_eq!(config.uploads.max_files_per_batch, 10);
        assert!(config.database.url.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_s3_backend_requires_section() {
        let config: Config = serde_json::from_str(r#"{ "storage": { "backend": "s3" } }"#).unwrap();
        assert!(config.validate().is_err());
    }
}
