use crate::config::DatabaseConfig;
use crate::model::{Album, NewAlbum, Photo};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::FromRow;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Document store holding album records.
///
/// Records are keyed by the store-generated `doc_id`; the external `id` is a
/// secondary field that is expected to be unique.
#[async_trait]
pub trait AlbumStore: Send + Sync {
    /// Persist a new album under external id `id`.
    ///
    /// The store assigns `doc_id` and returns the record as written.
    async fn insert(&self, id: &str, album: &NewAlbum, now: DateTime<Utc>) -> Result<Album>;

    /// Up to `limit` albums whose external id equals `id`, oldest first
    async fn find_by_external_id(&self, id: &str, limit: usize) -> Result<Vec<Album>>;

    /// Append `photos` to the album's photo list in one atomic step.
    ///
    /// Returns `false` when no record with `doc_id` exists.
    async fn append_photos(
        &self,
        doc_id: Uuid,
        photos: &[Photo],
        updated_at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Connectivity check for readiness probes
    async fn ping(&self) -> Result<()>;
}

#[derive(Debug, FromRow)]
struct AlbumRow {
    doc_id: Uuid,
    id: String,
    title: String,
    public_date: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    photos: Json<Vec<Photo>>,
    is_active: bool,
}

impl From<AlbumRow> for Album {
    fn from(row: AlbumRow) -> Self {
        Self {
            doc_id: row.doc_id,
            id: row.id,
            title: row.title,
            public_date: row.public_date,
            created_at: row.created_at,
            updated_at: row.updated_at,
            photos: row.photos.0,
            is_active: row.is_active,
        }
    }
}

/// PostgreSQL-backed album store. Photos live in a JSONB array column.
pub struct PgAlbumStore {
    pool: PgPool,
}

impl PgAlbumStore {
    /// Create a new store with connection pool
    pub async fn new(url: &str, config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Some(Duration::from_secs(config.idle_timeout_secs)))
            .connect(url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        info!("Connected to PostgreSQL database");

        Ok(Self { pool })
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run migrations")?;

        info!("Database migrations completed");
        Ok(())
    }
}

#[async_trait]
impl AlbumStore for PgAlbumStore {
    #[instrument(skip(self, album), fields(album_id = %id))]
    async fn insert(&self, id: &str, album: &NewAlbum, now: DateTime<Utc>) -> Result<Album> {
        let row = sqlx::query_as::<_, AlbumRow>(
            r#"
            INSERT INTO albums (id, title, public_date, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $4)
            RETURNING doc_id, id, title, public_date,
                      created_at, updated_at, photos, is_active
            "#,
        )
        .bind(id)
        .bind(&album.title)
        .bind(album.public_date)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .context("Failed to insert album")?;

        debug!(doc_id = %row.doc_id, "Album inserted");
        Ok(row.into())
    }

    async fn find_by_external_id(&self, id: &str, limit: usize) -> Result<Vec<Album>> {
        let rows = sqlx::query_as::<_, AlbumRow>(
            r#"
            SELECT doc_id, id, title, public_date,
                   created_at, updated_at, photos, is_active
            FROM albums
            WHERE id = $1
            ORDER BY created_at ASC
            LIMIT $2
            "#,
        )
        .bind(id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .context("Failed to query album by id")?;

        Ok(rows.into_iter().map(Album::from).collect())
    }

    #[instrument(skip(self, photos), fields(photo_count = photos.len()))]
    async fn append_photos(
        &self,
        doc_id: Uuid,
        photos: &[Photo],
        updated_at: DateTime<Utc>,
    ) -> Result<bool> {
        // jsonb concatenation runs under the row lock, so concurrent appends
        // are applied one after another instead of overwriting each other.
        let result = sqlx::query(
            r#"
            UPDATE albums
            SET photos = photos || $2,
                updated_at = $3
            WHERE doc_id = $1
            "#,
        )
        .bind(doc_id)
        .bind(Json(photos))
        .bind(updated_at)
        .execute(&self.pool)
        .await
        .context("Failed to append photos")?;

        Ok(result.rows_affected() > 0)
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .context("Database ping failed")?;
        Ok(())
    }
}

/// In-process album store for tests and database-less development
#[derive(Default)]
pub struct MemoryAlbumStore {
    albums: RwLock<HashMap<Uuid, Album>>,
}

impl MemoryAlbumStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.albums.read().await.len()
    }
}

#[async_trait]
impl AlbumStore for MemoryAlbumStore {
    async fn insert(&self, id: &str, album: &NewAlbum, now: DateTime<Utc>) -> Result<Album> {
        let mut albums = self.albums.write().await;
        if albums.values().any(|a| a.id == id) {
            anyhow::bail!("album id {id} already exists");
        }
        let album = album.clone().into_album(Uuid::new_v4(), id.to_string(), now);
        albums.insert(album.doc_id, album.clone());
        Ok(album)
    }

    async fn find_by_external_id(&self, id: &str, limit: usize) -> Result<Vec<Album>> {
        let albums = self.albums.read().await;
        let mut matches: Vec<Album> = albums.values().filter(|a| a.id == id).cloned().collect();
        matches.sort_by_key(|a| a.created_at);
        matches.truncate(limit);
        Ok(matches)
    }

    async fn append_photos(
        &self,
        doc_id: Uuid,
        photos: &[Photo],
        updated_at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut albums = self.albums.write().await;
        match albums.get_mut(&doc_id) {
            Some(album) => {
                album.photos.extend_from_slice(photos);
                album.updated_at = updated_at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NewAlbum;

    fn trip() -> NewAlbum {
        NewAlbum::parse(Some("Trip"), Some("2025-06-06")).unwrap()
    }

    fn photo(name: &str) -> Photo {
        Photo {
            url: format!("memory://{name}"),
            name: name.to_string(),
            size: None,
            mimetype: None,
            uploaded_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_memory_store_insert_and_find() {
        let store = MemoryAlbumStore::new();
        let album = store.insert("abcd1234", &trip(), Utc::now()).await.unwrap();
        assert_eq!(album.id, "abcd1234");
        assert!(album.photos.is_empty());

        let found = store.find_by_external_id("abcd1234", 2).await.unwrap();
        assert_eq!(found, vec![album]);
        assert!(store.find_by_external_id("zzzz9999", 2).await.unwrap().is_empty());

        let other = store.insert("wxyz5678", &trip(), Utc::now()).await.unwrap();
        assert_ne!(other.doc_id, found[0].doc_id);
    }

    #[tokio::test]
    async fn test_memory_store_rejects_duplicate_external_id() {
        let store = MemoryAlbumStore::new();
        store.insert("abcd1234", &trip(), Utc::now()).await.unwrap();
        assert!(store.insert("abcd1234", &trip(), Utc::now()).await.is_err());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_memory_store_append_preserves_order() {
        let store = MemoryAlbumStore::new();
        let album = store.insert("abcd1234", &trip(), Utc::now()).await.unwrap();

        let later = Utc::now();
        assert!(store
            .append_photos(album.doc_id, &[photo("a"), photo("b")], later)
            .await
            .unwrap());
        assert!(store.append_photos(album.doc_id, &[photo("c")], later).await.unwrap());

        let stored = &store.find_by_external_id("abcd1234", 1).await.unwrap()[0];
        let names: Vec<&str> = stored.photos.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["a", "b", "c"]);
        assert_eq!(stored.updated_at, later);
    }

    #[tokio::test]
    async fn test_memory_store_append_unknown_album() {
        let store = MemoryAlbumStore::new();
        let appended = store
            .append_photos(Uuid::new_v4(), &[photo("a")], Utc::now())
            .await
            .unwrap();
        assert!(!appended);
    }
}
