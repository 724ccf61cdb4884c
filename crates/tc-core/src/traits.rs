//! # Core Traits (Ports)
//!
//! Any plugin must implement these traits to be used by the binary.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{Capsule, CapsuleFile, CapsuleWithFiles};

/// Data persistence contract for capsules and their files.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait CapsuleRepo: Send + Sync {
    /// Inserts the capsule and all of its file rows atomically.
    async fn create_capsule(&self, capsule: &Capsule, files: &[CapsuleFile]) -> anyhow::Result<()>;

    async fn get_capsule(&self, id: Uuid) -> anyhow::Result<Option<CapsuleWithFiles>>;

    /// Newest first.
    async fn list_capsules(&self, owner: &str) -> anyhow::Result<Vec<Capsule>>;

    /// Sets `is_unlocked`; returns `None` when the capsule does not exist.
    async fn unlock_capsule(&self, id: Uuid) -> anyhow::Result<Option<Capsule>>;

    /// Unlocks every locked capsule with `unlock_date <= now` and returns them.
    async fn unlock_due(&self, now: DateTime<Utc>) -> anyhow::Result<Vec<Capsule>>;

    /// Removes the capsule (files cascade); returns the removed file rows,
    /// or `None` when the capsule does not exist.
    async fn delete_capsule(&self, id: Uuid) -> anyhow::Result<Option<Vec<CapsuleFile>>>;
}

/// What a `FileStore` hands back for a stored reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredObject {
    Bytes(Bytes),
    /// The object lives elsewhere; clients should be redirected.
    Url(String),
}

/// Blob storage contract for capsule attachments.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Saves raw bytes under `key` and returns a reference for `CapsuleFile::storage_ref`.
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> anyhow::Result<String>;

    async fn get(&self, reference: &str) -> anyhow::Result<StoredObject>;

    async fn delete(&self, reference: &str) -> anyhow::Result<()>;

    /// Whether `reference` was produced by this store.
    fn handles(&self, reference: &str) -> bool;
}

/// Gatekeeper for admin operations (manual unlock, delete).
#[async_trait]
pub trait AdminAuth: Send + Sync {
    /// `token` is the bearer credential presented by the caller, if any.
    async fn authorize(&self, token: Option<&str>) -> bool;

    /// True when no credential is configured and every caller is authorized.
    /// Destructive operations refuse to run behind an open guard.
    fn is_open(&self) -> bool {
        false
    }
}
