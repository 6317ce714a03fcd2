//! Album Service
//!
//! Time-boxed photo albums. An album is created with a public date, stays
//! hidden until that date, is viewable for a fixed window afterwards and then
//! expires. Guests upload photos in multipart batches; each file is validated,
//! written to blob storage and recorded on the album in a single append.
//!
//! ## Features
//!
//! - **Short shareable ids**: 8-character lowercase alphanumeric album ids
//! - **Lifecycle gating**: not public, active and expired states derived from
//!   the public date on every read
//! - **Partial-success uploads**: per-file validation, bounded parallel writes,
//!   orphaned blobs removed when a batch cannot be recorded
//! - **Pluggable storage**: PostgreSQL or in-memory documents, S3, local disk
//!   or in-memory blobs
//!
//! ## Architecture
//!
//! ```text
//!   HTTP API                 Services                  Backends
//! ┌──────────────┐        ┌──────────────┐         ┌──────────────┐
//! │ GET          │───────▶│ Read Service │         │ Album Store  │
//! │ /albums/:id  │        │ (lifecycle)  │         │ (Postgres /  │
//! └──────────────┘        └──────────────┘         │  memory)     │
//!                                │                 └──────────────┘
//! ┌──────────────┐               ▼                        ▲
//! │ POST         │        ┌──────────────┐                │
//! │ /albums      │───────▶│ Album        │────────────────┘
//! └──────────────┘        │ Repository   │
//!                         └──────────────┘
//! ┌──────────────┐               ▲                 ┌──────────────┐
//! │ POST         │        ┌──────────────┐         │ Blob Store   │
//! │ /albums/:id/ │───────▶│ Upload       │────────▶│ (S3 / local  │
//! │ upload       │        │ Pipeline     │         │  / memory)   │
//! └──────────────┘        └──────────────┘         └──────────────┘
//! ```

pub mod album_id;
pub mod album_store;
pub mod api;
pub mod blob_store;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod model;
pub mod read_service;
pub mod repository;
pub mod s3_uploader;
pub mod upload;

pub use album_id::generate_album_id;
pub use album_store::{AlbumStore, MemoryAlbumStore, PgAlbumStore};
pub use api::{create_router, serve_local_uploads, start_api_server, AppState};
pub use blob_store::{BlobStore, LocalBlobStore, MemoryBlobStore};
pub use config::Config;
pub use error::{AlbumError, BlobError, FileError};
pub use lifecycle::{AlbumStatus, ExpiryPolicy};
pub use model::{Album, NewAlbum, Photo};
pub use read_service::{AlbumProjection, AlbumReadService, AlbumView};
pub use repository::AlbumRepository;
pub use s3_uploader::S3Uploader;
pub use upload::{StagedFile, UploadLimits, UploadOutcome, UploadPipeline};
