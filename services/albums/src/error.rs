use thiserror::Error;

/// Errors surfaced by album operations
#[derive(Error, Debug)]
pub enum AlbumError {
    #[error("Invalid album input: {0}")]
    Validation(String),

    #[error("Album {0} not found")]
    NotFound(String),

    #[error("None of the {total} uploaded files could be stored")]
    AllUploadsFailed { total: usize },

    #[error("Blob storage denied access: {0}")]
    StoragePermission(String),

    #[error("Blob storage timed out: {0}")]
    StorageTimeout(String),

    #[error("Document store unavailable: {0:#}")]
    Backend(#[source] anyhow::Error),

    #[error("Internal error: {0:#}")]
    Internal(#[source] anyhow::Error),
}

impl AlbumError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Machine-readable code used in API error bodies
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::AllUploadsFailed { .. } => "NO_VALID_FILES",
            Self::StoragePermission(_) => "STORAGE_FORBIDDEN",
            Self::StorageTimeout(_) => "STORAGE_TIMEOUT",
            Self::Backend(_) => "BACKEND_UNAVAILABLE",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

/// Failures of blob storage writes and deletes
#[derive(Error, Debug)]
pub enum BlobError {
    #[error("Access denied for {key}")]
    PermissionDenied { key: String },

    #[error("Timed out writing {key}")]
    Timeout { key: String },

    #[error("Blob storage error: {0:#}")]
    Other(#[from] anyhow::Error),
}

impl BlobError {
    /// Permission and timeout failures point at the storage setup rather than a single file
    pub fn is_infrastructural(&self) -> bool {
        matches!(self, Self::PermissionDenied { .. } | Self::Timeout { .. })
    }
}

/// Why a single file of an upload batch was not stored
#[derive(Error, Debug)]
pub enum FileError {
    #[error("Unsupported media type {0}")]
    UnsupportedType(String),

    #[error("File is {size} bytes, limit is {limit}")]
    TooLarge { size: u64, limit: u64 },

    #[error("Failed to read staged upload: {0}")]
    Staging(#[source] std::io::Error),

    #[error(transparent)]
    Storage(#[from] BlobError),
}

pub type Result<T, E = AlbumError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_error_classification() {
        let denied = BlobError::PermissionDenied { key: "k".into() };
        let timeout = BlobError::Timeout { key: "k".into() };
        let other = BlobError::Other(anyhow::anyhow!("boom"));

        assert!(denied.is_infrastructural());
        assert!(timeout.is_infrastructural());
        assert!(!other.is_infrastructural());
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(AlbumError::validation("x").code(), "VALIDATION_ERROR");
        assert_eq!(AlbumError::NotFound("abc".into()).code(), "NOT_FOUND");
        assert_eq!(AlbumError::AllUploadsFailed { total: 2 }.code(), "NO_VALID_FILES");
    }
}
