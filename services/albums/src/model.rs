use crate::error::{AlbumError, Result};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Album record as held by the document store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Album {
    /// Store-generated document key, never exposed as the album identifier
    pub doc_id: Uuid,
    /// External identifier used in links
    pub id: String,
    pub title: String,
    /// Album is hidden from viewers before this instant
    pub public_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Photos in upload order
    pub photos: Vec<Photo>,
    /// Set at creation; nothing branches on it yet
    pub is_active: bool,
}

/// Metadata of a persisted photo blob
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Photo {
    /// Publicly resolvable address of the blob
    pub url: String,
    /// Original filename or a generated fallback
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mimetype: Option<String>,
    pub uploaded_at: DateTime<Utc>,
}

/// Validated input for album creation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAlbum {
    pub title: String,
    pub public_date: DateTime<Utc>,
}

impl NewAlbum {
    /// Validate raw creation input: a non-blank title and a parseable public date
    pub fn parse(title: Option<&str>, public_date: Option<&str>) -> Result<Self> {
        let title = title.map(str::trim).unwrap_or_default();
        if title.is_empty() {
            return Err(AlbumError::validation("title is required"));
        }

        let public_date = public_date
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AlbumError::validation("publicDate is required"))?;
        let public_date = parse_public_date(public_date)?;

        Ok(Self {
            title: title.to_string(),
            public_date,
        })
    }

    /// Materialize the album record under a store-assigned `doc_id` with an empty photo list
    pub fn into_album(self, doc_id: Uuid, id: String, now: DateTime<Utc>) -> Album {
        Album {
            doc_id,
            id,
            title: self.title,
            public_date: self.public_date,
            created_at: now,
            updated_at: now,
            photos: Vec::new(),
            is_active: true,
        }
    }
}

/// Accepts RFC 3339 timestamps and plain `YYYY-MM-DD` dates (midnight UTC)
pub fn parse_public_date(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| Utc.from_utc_datetime(&midnight))
        .ok_or_else(|| AlbumError::validation(format!("publicDate '{raw}' is not a valid date")))
}
