//! Multi-file upload pipeline.
//!
//! Each file of a batch is staged in a temp file, validated, written to blob
//! storage and turned into a [`Photo`]. Files fail independently; the batch
//! only fails as a whole when the album is unknown or nothing could be
//! stored. Survivors are registered on the album with a single append.

use crate::album_id::random_token;
use crate::blob_store::{read_staged, BlobStore};
use crate::config::UploadConfig;
use crate::error::{AlbumError, BlobError, FileError, Result};
use crate::model::Photo;
use crate::repository::AlbumRepository;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

const KEY_SUFFIX_LEN: usize = 11;
const MAX_EXTENSION_LEN: usize = 10;

/// Limits applied to each file of a batch
#[derive(Debug, Clone)]
pub struct UploadLimits {
    pub max_file_size_bytes: u64,
    pub max_files_per_batch: usize,
    pub allowed_mime_prefix: String,
    pub concurrency: usize,
}

impl From<&UploadConfig> for UploadLimits {
    fn from(config: &UploadConfig) -> Self {
        Self {
            max_file_size_bytes: config.max_file_size_bytes,
            max_files_per_batch: config.max_files_per_batch,
            allowed_mime_prefix: config.allowed_mime_prefix.clone(),
            concurrency: config.concurrency.max(1),
        }
    }
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self::from(&UploadConfig::default())
    }
}

/// An uploaded file parked in a temp file until the pipeline is done with it.
///
/// The temp file is removed when the value is released or dropped.
#[derive(Debug)]
pub struct StagedFile {
    original_name: Option<String>,
    content_type: Option<String>,
    size: u64,
    written: u64,
    write_cap: u64,
    writer: tokio::fs::File,
    temp: NamedTempFile,
}

impl StagedFile {
    /// Open an empty staging file. Bytes beyond `write_cap` are counted but not kept.
    pub fn create(
        staging_dir: Option<&Path>,
        original_name: Option<String>,
        content_type: Option<String>,
        write_cap: u64,
    ) -> std::io::Result<Self> {
        let temp = match staging_dir {
            Some(dir) => NamedTempFile::new_in(dir)?,
            None => NamedTempFile::new()?,
        };
        let writer = tokio::fs::File::from_std(temp.reopen()?);

        Ok(Self {
            original_name: original_name.filter(|n| !n.trim().is_empty()),
            content_type: content_type.filter(|c| !c.trim().is_empty()),
            size: 0,
            written: 0,
            write_cap,
            writer,
            temp,
        })
    }

    /// Stage an in-memory buffer in one step
    pub async fn from_bytes(
        staging_dir: Option<&Path>,
        original_name: Option<String>,
        content_type: Option<String>,
        data: &[u8],
    ) -> std::io::Result<Self> {
        let mut staged = Self::create(staging_dir, original_name, content_type, u64::MAX)?;
        staged.write_chunk(data).await?;
        Ok(staged)
    }

    pub async fn write_chunk(&mut self, chunk: &[u8]) -> std::io::Result<()> {
        self.size += chunk.len() as u64;

        let room = self.write_cap.saturating_sub(self.written);
        let keep = chunk.len().min(usize::try_from(room).unwrap_or(usize::MAX));
        if keep == 0 {
            return Ok(());
        }

        self.writer.write_all(&chunk[..keep]).await?;
        self.writer.flush().await?;
        self.written += keep as u64;
        Ok(())
    }

    pub fn original_name(&self) -> Option<&str> {
        self.original_name.as_deref()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Total bytes received, including any that were not kept
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn path(&self) -> &Path {
        self.temp.path()
    }

    /// Remove the temp file, logging instead of failing
    pub fn release(self) {
        let Self { writer, temp, .. } = self;
        drop(writer);
        let path: PathBuf = temp.path().to_path_buf();
        if let Err(e) = temp.close() {
            warn!(error = %e, path = %path.display(), "Failed to remove staged upload");
        }
    }
}

/// A file that did not make it into the album
#[derive(Debug, Clone, Serialize)]
pub struct FileFailure {
    pub name: String,
    pub error: String,
}

/// Result of a batch in which at least one file was stored
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadOutcome {
    pub photos: Vec<Photo>,
    pub failures: Vec<FileFailure>,
    pub success_count: usize,
    pub error_count: usize,
    pub total_count: usize,
}

/// Blobs written by a batch that are not yet referenced by the album.
///
/// Unless committed, dropping the guard deletes them in the background.
struct PersistedBlobs {
    blobs: Arc<dyn BlobStore>,
    keys: Mutex<Vec<String>>,
    committed: bool,
}

impl PersistedBlobs {
    fn new(blobs: Arc<dyn BlobStore>) -> Self {
        Self {
            blobs,
            keys: Mutex::new(Vec::new()),
            committed: false,
        }
    }

    fn record(&self, key: &str) {
        self.keys.lock().push(key.to_string());
    }

    fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for PersistedBlobs {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        let keys = std::mem::take(self.keys.get_mut());
        if keys.is_empty() {
            return;
        }

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(count = keys.len(), "No runtime to remove orphaned blobs");
            return;
        };

        let blobs = self.blobs.clone();
        handle.spawn(async move {
            for key in keys {
                match blobs.delete(&key).await {
                    Ok(()) => debug!(key = %key, "Removed orphaned blob"),
                    Err(e) => warn!(error = %e, key = %key, "Failed to remove orphaned blob"),
                }
            }
        });
    }
}

/// Validates, persists and registers uploaded photos
#[derive(Clone)]
pub struct UploadPipeline {
    repository: AlbumRepository,
    blobs: Arc<dyn BlobStore>,
    limits: UploadLimits,
}

impl UploadPipeline {
    pub fn new(repository: AlbumRepository, blobs: Arc<dyn BlobStore>, limits: UploadLimits) -> Self {
        Self {
            repository,
            blobs,
            limits,
        }
    }

    pub fn limits(&self) -> &UploadLimits {
        &self.limits
    }

    /// Store a batch of files for the album with external id `album_id`
    #[instrument(skip(self, files), fields(album_id = %album_id, total = files.len()))]
    pub async fn upload_photos(&self, album_id: &str, files: Vec<StagedFile>) -> Result<UploadOutcome> {
        let album = self.repository.find_by_external_id(album_id).await?;
        let total_count = files.len();
        let guard = PersistedBlobs::new(self.blobs.clone());

        let results: Vec<(String, std::result::Result<Photo, FileError>)> = stream::iter(files)
            .map(|file| {
                let guard = &guard;
                let album_id = album.id.as_str();
                async move {
                    let label = display_name(&file);
                    let result = self.store_file(album_id, &file, guard).await;
                    file.release();
                    (label, result)
                }
            })
            .buffered(self.limits.concurrency.max(1))
            .collect()
            .await;

        let mut photos = Vec::with_capacity(results.len());
        let mut failures = Vec::new();
        let mut escalation: Option<BlobError> = None;

        for (name, result) in results {
            match result {
                Ok(photo) => photos.push(photo),
                Err(e) => {
                    warn!(file = %name, error = %e, "Skipping file");
                    failures.push(FileFailure {
                        name,
                        error: e.to_string(),
                    });
                    if let FileError::Storage(blob_err) = e {
                        if blob_err.is_infrastructural() && escalation.is_none() {
                            escalation = Some(blob_err);
                        }
                    }
                }
            }
        }

        metrics::counter!("albums.photos.rejected").increment(failures.len() as u64);

        if photos.is_empty() {
            metrics::counter!("albums.uploads.failed").increment(1);
            return Err(match escalation {
                Some(BlobError::PermissionDenied { key }) => AlbumError::StoragePermission(key),
                Some(BlobError::Timeout { key }) => AlbumError::StorageTimeout(key),
                _ => AlbumError::AllUploadsFailed { total: total_count },
            });
        }

        // Append and commit run on their own task so that dropping the request
        // cannot separate them. On failure the guard drops inside the task.
        let repository = self.repository.clone();
        let doc_id = album.doc_id;
        let registered = photos.clone();
        let registration = tokio::spawn(async move {
            let appended = repository
                .append_photos(doc_id, &registered, Utc::now())
                .await;
            if appended.is_ok() {
                guard.commit();
            }
            appended
        });
        registration
            .await
            .map_err(|e| {
                AlbumError::Internal(anyhow::Error::new(e).context("Photo registration task failed"))
            })??;

        metrics::counter!("albums.photos.stored").increment(photos.len() as u64);
        info!(
            stored = photos.len(),
            failed = failures.len(),
            "Upload batch registered"
        );

        Ok(UploadOutcome {
            success_count: photos.len(),
            error_count: failures.len(),
            total_count,
            photos,
            failures,
        })
    }

    async fn store_file(
        &self,
        album_id: &str,
        file: &StagedFile,
        guard: &PersistedBlobs,
    ) -> std::result::Result<Photo, FileError> {
        let content_type = file.content_type().unwrap_or_default();
        if !content_type.starts_with(&self.limits.allowed_mime_prefix) {
            let declared = if content_type.is_empty() { "unknown" } else { content_type };
            return Err(FileError::UnsupportedType(declared.to_string()));
        }

        if file.size() > self.limits.max_file_size_bytes {
            return Err(FileError::TooLarge {
                size: file.size(),
                limit: self.limits.max_file_size_bytes,
            });
        }

        let now = Utc::now();
        let key = storage_key(album_id, now, file.original_name());
        let body = read_staged(file.path()).await.map_err(FileError::Staging)?;

        let url = self.blobs.put(&key, body, content_type).await?;
        guard.record(&key);

        debug!(key = %key, "Photo persisted");

        Ok(Photo {
            url,
            name: file
                .original_name()
                .map(str::to_string)
                .unwrap_or_else(|| fallback_name(now, &key)),
            size: Some(file.size()),
            mimetype: Some(content_type.to_string()),
            uploaded_at: Utc::now(),
        })
    }
}

fn display_name(file: &StagedFile) -> String {
    file.original_name().unwrap_or("unnamed").to_string()
}

/// `albums/{album_id}/{millis}_{suffix}{ext}`
pub fn storage_key(album_id: &str, now: DateTime<Utc>, original_name: Option<&str>) -> String {
    let suffix = random_token(&mut rand::thread_rng(), KEY_SUFFIX_LEN);
    format!(
        "albums/{}/{}_{}{}",
        album_id,
        now.timestamp_millis(),
        suffix,
        extension_of(original_name)
    )
}

/// Lowercased `.ext` of a filename, empty when absent or unusable
pub fn extension_of(name: Option<&str>) -> String {
    name.and_then(|n| Path::new(n).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| {
            !ext.is_empty()
                && ext.len() <= MAX_EXTENSION_LEN
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
        })
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
        .unwrap_or_default()
}

fn fallback_name(now: DateTime<Utc>, key: &str) -> String {
    let ext = Path::new(key)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{e}"))
        .unwrap_or_default();
    format!("photo_{}{}", now.format("%Y%m%d_%H%M%S"), ext)
}
