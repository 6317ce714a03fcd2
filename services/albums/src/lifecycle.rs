//! Publish-date gating and fixed-window expiry.
//!
//! An album becomes visible at its public date and stays visible for a fixed
//! number of calendar months. Expiry is computed when the album is read; nothing
//! is deleted when the window closes.
//!
//! Month addition is calendar arithmetic in UTC: the month field advances and
//! the day of month is clamped to the last valid day of the target month, so
//! Dec 31 + 2 months lands on Feb 28 (or Feb 29 in leap years). The window end
//! itself is still visible; the album is expired strictly after it.

use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};

/// Default visibility window
pub const DEFAULT_EXPIRY_WINDOW_MONTHS: u32 = 2;

/// Visibility of an album at a given instant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlbumStatus {
    /// Before the public date
    NotPublic,
    /// Past the end of the visibility window
    Expired,
    Active,
}

impl AlbumStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlbumStatus::NotPublic => "not_public",
            AlbumStatus::Expired => "expired",
            AlbumStatus::Active => "active",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryPolicy {
    window: Months,
}

impl ExpiryPolicy {
    pub fn new(window_months: u32) -> Self {
        Self {
            window: Months::new(window_months),
        }
    }

    /// Last instant at which an album published at `public_date` is visible
    pub fn expiry_date(&self, public_date: DateTime<Utc>) -> DateTime<Utc> {
        public_date
            .checked_add_months(self.window)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Albums without a public date never expire
    pub fn is_expired(&self, now: DateTime<Utc>, public_date: Option<DateTime<Utc>>) -> bool {
        match public_date {
            Some(public_date) => now > self.expiry_date(public_date),
            None => false,
        }
    }

    pub fn status(&self, now: DateTime<Utc>, public_date: DateTime<Utc>) -> AlbumStatus {
        if now < public_date {
            AlbumStatus::NotPublic
        } else if self.is_expired(now, Some(public_date)) {
            AlbumStatus::Expired
        } else {
            AlbumStatus::Active
        }
    }
}

impl Default for ExpiryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_EXPIRY_WINDOW_MONTHS)
    }
}
