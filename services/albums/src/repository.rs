use crate::album_id::generate_album_id;
use crate::album_store::AlbumStore;
use crate::error::{AlbumError, Result};
use crate::model::{Album, NewAlbum, Photo};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{error, info, instrument};
use uuid::Uuid;

/// Album operations on top of a document store: validation, identifier
/// assignment, external-id lookup and photo registration.
#[derive(Clone)]
pub struct AlbumRepository {
    store: Arc<dyn AlbumStore>,
}

impl AlbumRepository {
    pub fn new(store: Arc<dyn AlbumStore>) -> Self {
        Self { store }
    }

    /// Create an album with a fresh external id and no photos
    #[instrument(skip(self, new_album), fields(title = %new_album.title))]
    pub async fn create(&self, new_album: NewAlbum, now: DateTime<Utc>) -> Result<Album> {
        let album = self
            .store
            .insert(&generate_album_id(), &new_album, now)
            .await
            .map_err(AlbumError::Backend)?;

        info!(album_id = %album.id, doc_id = %album.doc_id, "Album created");
        metrics::counter!("albums.created").increment(1);

        Ok(album)
    }

    /// Look up the album whose external id is `id`
    pub async fn find_by_external_id(&self, id: &str) -> Result<Album> {
        let mut matches = self
            .store
            .find_by_external_id(id, 2)
            .await
            .map_err(AlbumError::Backend)?;

        if matches.len() > 1 {
            error!(
                album_id = %id,
                "Multiple albums share one external id, using the oldest"
            );
        }

        if matches.is_empty() {
            return Err(AlbumError::NotFound(id.to_string()));
        }
        Ok(matches.swap_remove(0))
    }

    /// Append `photos` to the album stored under `doc_id`
    #[instrument(skip(self, photos), fields(photo_count = photos.len()))]
    pub async fn append_photos(
        &self,
        doc_id: Uuid,
        photos: &[Photo],
        now: DateTime<Utc>,
    ) -> Result<()> {
        let appended = self
            .store
            .append_photos(doc_id, photos, now)
            .await
            .map_err(AlbumError::Backend)?;

        if !appended {
            return Err(AlbumError::NotFound(doc_id.to_string()));
        }
        Ok(())
    }

    pub async fn ping(&self) -> Result<()> {
        self.store.ping().await.map_err(AlbumError::Backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::album_id::is_valid_album_id;
    use crate::album_store::MemoryAlbumStore;
    use anyhow::anyhow;
    use async_trait::async_trait;

    fn repository() -> AlbumRepository {
        AlbumRepository::new(Arc::new(MemoryAlbumStore::new()))
    }

    fn wedding() -> NewAlbum {
        NewAlbum::parse(Some("Wedding"), Some("2025-06-06")).unwrap()
    }

    #[tokio::test]
    async fn test_create_then_find() {
        let repo = repository();
        let created = repo.create(wedding(), Utc::now()).await.unwrap();
        assert!(is_valid_album_id(&created.id));

        let found = repo.find_by_external_id(&created.id).await.unwrap();
        assert_eq!(found.doc_id, created.doc_id);
        assert_eq!(found.title, "Wedding");
        assert!(found.photos.is_empty());
    }

    #[tokio::test]
    async fn test_find_unknown_album() {
        let err = repository().find_by_external_id("missing1").await.unwrap_err();
        assert!(matches!(err, AlbumError::NotFound(id) if id == "missing1"));
    }

    #[tokio::test]
    async fn test_append_to_missing_record() {
        let err = repository()
            .append_photos(Uuid::new_v4(), &[], Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, AlbumError::NotFound(_)));
    }

    struct DuplicateStore {
        albums: Vec<Album>,
    }

    #[async_trait]
    impl AlbumStore for DuplicateStore {
        async fn insert(
            &self,
            _id: &str,
            _album: &NewAlbum,
            _now: DateTime<Utc>,
        ) -> anyhow::Result<Album> {
            Err(anyhow!("read only"))
        }

        async fn find_by_external_id(&self, _id: &str, limit: usize) -> anyhow::Result<Vec<Album>> {
            Ok(self.albums.iter().take(limit).cloned().collect())
        }

        async fn append_photos(
            &self,
            _doc_id: Uuid,
            _photos: &[Photo],
            _updated_at: DateTime<Utc>,
        ) -> anyhow::Result<bool> {
            Ok(false)
        }

        async fn ping(&self) -> anyhow::Result<()> {
            Err(anyhow!("connection refused"))
        }
    }

    #[tokio::test]
    async fn test_first_match_wins_on_duplicates() {
        let first = wedding().into_album(Uuid::new_v4(), "dupdup11".to_string(), Utc::now());
        let second = wedding().into_album(Uuid::new_v4(), "dupdup11".to_string(), Utc::now());
        let repo = AlbumRepository::new(Arc::new(DuplicateStore {
            albums: vec![first.clone(), second],
        }));

        let found = repo.find_by_external_id("dupdup11").await.unwrap();
        assert_eq!(found.doc_id, first.doc_id);
    }

    #[tokio::test]
    async fn test_store_failures_become_backend_errors() {
        let repo = AlbumRepository::new(Arc::new(DuplicateStore { albums: vec![] }));

        assert!(matches!(
            repo.create(wedding(), Utc::now()).await,
            Err(AlbumError::Backend(_))
        ));
        assert!(matches!(repo.ping().await, Err(AlbumError::Backend(_))));
    }
}
