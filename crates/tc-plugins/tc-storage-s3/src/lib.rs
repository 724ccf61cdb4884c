//! # tc-storage-s3
//!
//! `FileStore` backed by any S3-compatible object store (AWS, MinIO,
//! Supabase storage). References have the form `s3://<bucket>/<key>`;
//! reads hand back a presigned GET URL instead of the bytes.

use std::time::Duration;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use secrecy::{ExposeSecret, SecretString};
use tc_core::traits::{FileStore, StoredObject};
use tracing::{debug, error, info};

/// Connection settings for the object store.
pub struct S3StoreConfig {
    pub bucket: String,
    pub region: String,
    /// Endpoint override for non-AWS providers.
    pub endpoint_url: Option<String>,
    /// Prepended to every object key (e.g. `"capsules/"`).
    pub prefix: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<SecretString>,
    pub force_path_style: bool,
    pub presign_expiry: Duration,
}

impl std::fmt::Debug for S3StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3StoreConfig")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("endpoint_url", &self.endpoint_url)
            .field("prefix", &self.prefix)
            .field("force_path_style", &self.force_path_style)
            .finish_non_exhaustive()
    }
}

pub struct S3FileStore {
    client: aws_sdk_s3::Client,
    bucket: String,
    prefix: Option<String>,
    presign_expiry: Duration,
}

impl S3FileStore {
    /// Builds an SDK client from the config. Static credentials are used
    /// when both key parts are set, otherwise the default AWS chain applies.
    pub async fn connect(config: S3StoreConfig) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));

        if let Some(endpoint) = &config.endpoint_url {
            debug!(endpoint = %endpoint, "using custom S3 endpoint");
            loader = loader.endpoint_url(endpoint);
        }

        if let (Some(key_id), Some(secret)) = (&config.access_key_id, &config.secret_access_key) {
            loader = loader.credentials_provider(Credentials::new(
                key_id,
                secret.expose_secret(),
                None,
                None,
                "time-capsule-config",
            ));
        }

        let sdk_config = loader.load().await;
        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(config.force_path_style)
            .build();

        info!(bucket = %config.bucket, region = %config.region, "S3 store configured");
        Self::with_client(aws_sdk_s3::Client::from_conf(s3_config), config)
    }

    /// Create a store with a pre-built client (for testing).
    pub fn with_client(client: aws_sdk_s3::Client, config: S3StoreConfig) -> Self {
        Self {
            client,
            bucket: config.bucket,
            prefix: config.prefix,
            presign_expiry: config.presign_expiry,
        }
    }

    fn object_key(&self, key: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}{key}"),
            None => key.to_owned(),
        }
    }

    fn reference(&self, object_key: &str) -> String {
        format!("s3://{}/{}", self.bucket, object_key)
    }

    /// Extracts the object key from a reference produced by this store.
    fn key_of<'a>(&self, reference: &'a str) -> Option<&'a str> {
        reference
            .strip_prefix("s3://")?
            .strip_prefix(self.bucket.as_str())?
            .strip_prefix('/')
            .filter(|key| !key.is_empty())
    }

    fn require_key<'a>(&self, reference: &'a str) -> anyhow::Result<&'a str> {
        self.key_of(reference)
            .ok_or_else(|| anyhow!("reference {reference:?} does not belong to bucket {}", self.bucket))
    }
}

#[async_trait]
impl FileStore for S3FileStore {
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> anyhow::Result<String> {
        let object_key = self.object_key(key);
        debug!(bucket = %self.bucket, key = %object_key, size = data.len(), "uploading object to S3");

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&object_key)
            .content_type(content_type)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, key = %object_key, "S3 put_object failed");
                anyhow!("S3 put_object failed for {object_key}: {e}")
            })?;

        Ok(self.reference(&object_key))
    }

    async fn get(&self, reference: &str) -> anyhow::Result<StoredObject> {
        let key = self.require_key(reference)?;
        let presigning = PresigningConfig::expires_in(self.presign_expiry)
            .context("invalid presign expiry")?;

        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning)
            .await
            .with_context(|| format!("presigning {reference}"))?;

        Ok(StoredObject::Url(request.uri().to_string()))
    }

    async fn delete(&self, reference: &str) -> anyhow::Result<()> {
        let key = self.require_key(reference)?;
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| anyhow!("S3 delete_object failed for {key}: {e}"))?;
        Ok(())
    }

    fn handles(&self, reference: &str) -> bool {
        self.key_of(reference).is_some()
    }
}
