//! # Domain Models
//!
//! These structs represent the core entities of the time capsule service.
//! We use UUID v7 for time-ordered, globally unique identification, and
//! keep timestamps at millisecond precision to match what is persisted.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A sealed record whose message and files stay hidden until `unlock_date`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capsule {
    pub id: Uuid,
    pub title: String,
    /// Free-text identifier of the creator (usually an email)
    pub owner: String,
    pub message: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub unlock_date: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    /// Flipped once by the poller or a manual unlock; never reverts.
    pub is_unlocked: bool,
}

impl Capsule {
    /// Where this capsule sits in its lifecycle at `now`.
    pub fn status_at(&self, now: DateTime<Utc>) -> UnlockStatus {
        if self.is_unlocked {
            UnlockStatus::Unlocked
        } else if self.unlock_date <= now {
            UnlockStatus::Due
        } else {
            UnlockStatus::Locked
        }
    }
}

/// Computed unlock state reported to readers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnlockStatus {
    /// Unlock date still in the future.
    Locked,
    /// Unlock date passed, waiting for the next poller sweep.
    Due,
    /// Content is visible.
    Unlocked,
}

/// An attachment stored alongside a capsule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapsuleFile {
    pub id: Uuid,
    pub capsule_id: Uuid,
    /// Filename as sent by the client
    pub original_name: String,
    /// Reference returned by the `FileStore` (local path or object URL)
    pub storage_ref: String,
    pub mimetype: String,
}

/// A capsule together with all of its files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapsuleWithFiles {
    pub capsule: Capsule,
    pub files: Vec<CapsuleFile>,
}

/// Raw bytes received for one attachment, before they reach a `FileStore`.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl Upload {
    /// Declared content type, or a guess from the file extension.
    pub fn mimetype(&self) -> String {
        match self.content_type.as_deref().map(str::trim) {
            Some(ct) if !ct.is_empty() => ct.to_owned(),
            _ => mime_guess::from_path(&self.file_name)
                .first_or_octet_stream()
                .to_string(),
        }
    }
}

/// Current time truncated to milliseconds.
pub fn now_millis() -> DateTime<Utc> {
    truncate_millis(Utc::now())
}

pub fn truncate_millis(ts: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ts.timestamp_millis()).unwrap_or(ts)
}
