//! # tc-storage-local
//!
//! Local filesystem implementation of `FileStore`.
//! Files land under the uploads directory at `<root>/<key>`; the returned
//! reference is that path.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Context};
use async_trait::async_trait;
use bytes::Bytes;
use tc_core::traits::{FileStore, StoredObject};
use tokio::fs;
use tracing::debug;

pub struct LocalFileStore {
    /// Root directory for all uploads (e.g., "./uploads")
    root_path: PathBuf,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root_path: root.into(),
        }
    }

    /// Creates the uploads directory if it does not exist yet.
    pub async fn ensure_root(&self) -> anyhow::Result<()> {
        fs::create_dir_all(&self.root_path)
            .await
            .with_context(|| format!("creating upload dir {}", self.root_path.display()))
    }

    pub fn root(&self) -> &Path {
        &self.root_path
    }

    /// Maps a key to a path inside the root, rejecting anything that could escape it.
    fn resolve(&self, key: &str) -> anyhow::Result<PathBuf> {
        let relative = Path::new(key);
        let mut components = relative.components().peekable();
        if components.peek().is_none() {
            bail!("empty storage key");
        }
        if !components.all(|c| matches!(c, Component::Normal(_))) {
            bail!("storage key {key:?} must be a relative path without '..'");
        }
        Ok(self.root_path.join(relative))
    }

    fn owned_path(&self, reference: &str) -> anyhow::Result<PathBuf> {
        let path = PathBuf::from(reference);
        if !self.handles(reference) || path.components().any(|c| c == Component::ParentDir) {
            bail!("reference {reference:?} is outside {}", self.root_path.display());
        }
        Ok(path)
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn put(&self, key: &str, data: Bytes, _content_type: &str) -> anyhow::Result<String> {
        let target_path = self.resolve(key)?;

        if let Some(parent) = target_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&target_path, &data)
            .await
            .with_context(|| format!("writing {}", target_path.display()))?;

        debug!(path = %target_path.display(), bytes = data.len(), "stored upload");
        Ok(target_path.to_string_lossy().into_owned())
    }

    async fn get(&self, reference: &str) -> anyhow::Result<StoredObject> {
        let path = self.owned_path(reference)?;
        let data = fs::read(&path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        Ok(StoredObject::Bytes(Bytes::from(data)))
    }

    async fn delete(&self, reference: &str) -> anyhow::Result<()> {
        let path = self.owned_path(reference)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("removing {}", path.display())),
        }
    }

    fn handles(&self, reference: &str) -> bool {
        Path::new(reference).starts_with(&self.root_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_delete_within_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new(dir.path());

        let reference = store
            .put("capsule-1/file-1_note.txt", Bytes::from_static(b"hello"), "text/plain")
            .await
            .unwrap();
        assert!(store.handles(&reference));
        assert!(Path::new(&reference).ends_with("capsule-1/file-1_note.txt"));

        let read = store.get(&reference).await.unwrap();
        assert_eq!(read, StoredObject::Bytes(Bytes::from_static(b"hello")));

        store.delete(&reference).await.unwrap();
        assert!(!Path::new(&reference).exists());
        // Deleting twice is fine.
        store.delete(&reference).await.unwrap();
    }

    #[tokio::test]
    async fn rejects_keys_that_escape_the_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new(dir.path().join("uploads"));

        for key in ["../outside.txt", "/etc/passwd", "a/../../b", ""] {
            let result = store.put(key, Bytes::from_static(b"x"), "text/plain").await;
            assert!(result.is_err(), "{key:?} should be rejected");
        }
    }

    #[tokio::test]
    async fn refuses_foreign_references() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new(dir.path().join("uploads"));

        assert!(!store.handles("s3://bucket/key"));
        assert!(store.get("s3://bucket/key").await.is_err());
        let sneaky = format!("{}/../secret", store.root().display());
        assert!(store.get(&sneaky).await.is_err());
    }

    #[tokio::test]
    async fn ensure_root_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new(dir.path().join("nested/uploads"));
        store.ensure_root().await.unwrap();
        assert!(store.root().is_dir());
    }
}
