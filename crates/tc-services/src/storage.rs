//! `FileStore` combinator: remote first, local disk when the remote is down.

use std::sync::Arc;

use anyhow::bail;
use async_trait::async_trait;
use bytes::Bytes;
use tc_core::{FileStore, StoredObject};
use tracing::warn;

pub struct FallbackFileStore {
    primary: Arc<dyn FileStore>,
    fallback: Arc<dyn FileStore>,
}

impl FallbackFileStore {
    pub fn new(primary: Arc<dyn FileStore>, fallback: Arc<dyn FileStore>) -> Self {
        Self { primary, fallback }
    }

    fn route(&self, reference: &str) -> anyhow::Result<&dyn FileStore> {
        if self.primary.handles(reference) {
            Ok(self.primary.as_ref())
        } else if self.fallback.handles(reference) {
            Ok(self.fallback.as_ref())
        } else {
            bail!("no configured store handles reference {reference:?}")
        }
    }
}

#[async_trait]
impl FileStore for FallbackFileStore {
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> anyhow::Result<String> {
        match self.primary.put(key, data.clone(), content_type).await {
            Ok(reference) => Ok(reference),
            Err(e) => {
                warn!(error = %e, key, "remote upload failed, writing to local fallback");
                self.fallback.put(key, data, content_type).await
            }
        }
    }

    async fn get(&self, reference: &str) -> anyhow::Result<StoredObject> {
        self.route(reference)?.get(reference).await
    }

    async fn delete(&self, reference: &str) -> anyhow::Result<()> {
        self.route(reference)?.delete(reference).await
    }

    fn handles(&self, reference: &str) -> bool {
        self.primary.handles(reference) || self.fallback.handles(reference)
    }
}
