use crate::error::Result;
use crate::lifecycle::{AlbumStatus, ExpiryPolicy};
use crate::model::{Album, Photo};
use crate::repository::AlbumRepository;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, instrument};

/// What a viewer gets to see of an album at a given instant
#[derive(Debug, Clone, PartialEq)]
pub enum AlbumView {
    /// Hidden until `public_date`
    NotPublic { public_date: DateTime<Utc> },
    /// Visibility window closed at `expired_at`
    Expired {
        public_date: DateTime<Utc>,
        expired_at: DateTime<Utc>,
    },
    Active(AlbumProjection),
}

impl AlbumView {
    pub fn status(&self) -> AlbumStatus {
        match self {
            AlbumView::NotPublic { .. } => AlbumStatus::NotPublic,
            AlbumView::Expired { .. } => AlbumStatus::Expired,
            AlbumView::Active(_) => AlbumStatus::Active,
        }
    }
}

/// Viewer-facing projection of an active album
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlbumProjection {
    pub id: String,
    pub title: String,
    pub public_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub photos: Vec<Photo>,
    pub status: AlbumStatus,
}

impl AlbumProjection {
    fn from_album(album: Album, expires_at: DateTime<Utc>) -> Self {
        Self {
            id: album.id,
            title: album.title,
            public_date: album.public_date,
            created_at: album.created_at,
            expires_at,
            photos: album.photos,
            status: AlbumStatus::Active,
        }
    }
}

/// Resolves album ids to what a viewer may see, gated by the expiry policy
#[derive(Clone)]
pub struct AlbumReadService {
    repository: AlbumRepository,
    policy: ExpiryPolicy,
}

impl AlbumReadService {
    pub fn new(repository: AlbumRepository, policy: ExpiryPolicy) -> Self {
        Self { repository, policy }
    }

    pub fn policy(&self) -> &ExpiryPolicy {
        &self.policy
    }

    #[instrument(skip(self))]
    pub async fn get_album(&self, id: &str, now: DateTime<Utc>) -> Result<AlbumView> {
        let album = self.repository.find_by_external_id(id).await?;
        let public_date = album.public_date;
        let expires_at = self.policy.expiry_date(public_date);

        let view = match self.policy.status(now, public_date) {
            AlbumStatus::NotPublic => AlbumView::NotPublic { public_date },
            AlbumStatus::Expired => AlbumView::Expired {
                public_date,
                expired_at: expires_at,
            },
            AlbumStatus::Active => AlbumView::Active(AlbumProjection::from_album(album, expires_at)),
        };

        debug!(status = view.status().as_str(), "Album resolved");
        metrics::counter!("albums.reads", "status" => view.status().as_str()).increment(1);

        Ok(view)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::album_store::MemoryAlbumStore;
    use crate::error::AlbumError;
    use crate::model::NewAlbum;
    use chrono::{Duration, TimeZone};
    use std::sync::Arc;
    use uuid::Uuid;

    async fn setup(public_date: &str) -> (AlbumRepository, AlbumReadService, Album) {
        let repository = AlbumRepository::new(Arc::new(MemoryAlbumStore::new()));
        let album = repository
            .create(
                NewAlbum::parse(Some("Wedding"), Some(public_date)).unwrap(),
                Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap(),
            )
            .await
            .unwrap();
        let service = AlbumReadService::new(repository.clone(), ExpiryPolicy::default());
        (repository, service, album)
    }

    #[tokio::test]
    async fn test_wedding_lifecycle() {
        let (_, service, album) = setup("2025-06-06").await;
        let public_date = Utc.with_ymd_and_hms(2025, 6, 6, 0, 0, 0).unwrap();

        let day_before = public_date - Duration::days(1);
        assert_eq!(
            service.get_album(&album.id, day_before).await.unwrap(),
            AlbumView::NotPublic { public_date }
        );

        match service.get_album(&album.id, public_date).await.unwrap() {
            AlbumView::Active(projection) => {
                assert_eq!(projection.title, "Wedding");
                assert!(projection.photos.is_empty());
                assert_eq!(projection.status, AlbumStatus::Active);
                assert_eq!(
                    projection.expires_at,
                    Utc.with_ymd_and_hms(2025, 8, 6, 0, 0, 0).unwrap()
                );
            }
            other => panic!("expected active album, got {other:?}"),
        }

        let after_window = Utc.with_ymd_and_hms(2025, 8, 7, 0, 0, 0).unwrap();
        assert_eq!(
            service.get_album(&album.id, after_window).await.unwrap(),
            AlbumView::Expired {
                public_date,
                expired_at: Utc.with_ymd_and_hms(2025, 8, 6, 0, 0, 0).unwrap(),
            }
        );
    }

    #[tokio::test]
    async fn test_repeated_reads_are_identical() {
        let (repository, service, album) = setup("2025-06-06").await;
        repository
            .append_photos(
                album.doc_id,
                &[Photo {
                    url: "memory://albums/x/1.jpg".to_string(),
                    name: "1.jpg".to_string(),
                    size: Some(3),
                    mimetype: Some("image/jpeg".to_string()),
                    uploaded_at: Utc::now(),
                }],
                Utc::now(),
            )
            .await
            .unwrap();

        let now = Utc.with_ymd_and_hms(2025, 7, 1, 0, 0, 0).unwrap();
        let first = service.get_album(&album.id, now).await.unwrap();
        let second = service.get_album(&album.id, now).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_unknown_album_is_not_found() {
        let (_, service, _) = setup("2025-06-06").await;
        let err = service
            .get_album(&Uuid::new_v4().to_string(), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, AlbumError::NotFound(_)));
    }
}
