//! # Time Capsule Binary
//!
//! Assembles the service from settings and compile-time features.

mod telemetry;

use std::sync::Arc;

use anyhow::Context;
use tc_api::{router, AppState, RouterOptions};
use tc_config::{Settings, StorageSettings};
use tc_core::{AdminAuth, FileStore};
use tc_db_sqlite::SqliteCapsuleRepo;
use tc_services::{CapsuleService, OpenAdmin, UnlockPoller};
use tc_storage_local::LocalFileStore;
use tracing::{info, warn};

#[cfg(feature = "storage-s3")]
use tc_storage_s3::{S3FileStore, S3StoreConfig};

#[cfg(feature = "auth-simple")]
use tc_auth_simple::Argon2AdminAuth;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("loading settings")?;
    telemetry::init(&settings.log);

    let repo = Arc::new(
        SqliteCapsuleRepo::connect(&settings.database.url, settings.database.max_connections)
            .await
            .context("opening capsule database")?,
    );

    let max_upload_bytes = settings.storage.max_upload_bytes;
    let store = build_store(settings.storage).await?;
    let admin = build_admin(settings.admin.password_hash)?;

    let service = Arc::new(CapsuleService::new(repo.clone(), store));
    let poller = UnlockPoller::new(repo, settings.poller.interval()).start();

    let options = RouterOptions {
        max_upload_bytes,
        allowed_origins: settings.cors.allowed_origins,
    };
    let app = router(AppState { service, admin }, &options);

    let addr = settings.server.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(address = %addr, "time capsule API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    poller.stop().await;
    info!("time capsule API shut down");
    Ok(())
}

async fn build_store(storage: StorageSettings) -> anyhow::Result<Arc<dyn FileStore>> {
    let local = LocalFileStore::new(&storage.upload_dir);
    local.ensure_root().await?;
    let local: Arc<dyn FileStore> = Arc::new(local);

    match storage.backend {
        tc_config::StorageBackend::Local => Ok(local),
        #[cfg(feature = "storage-s3")]
        tc_config::StorageBackend::S3 => {
            let s3 = storage.s3;
            let config = S3StoreConfig {
                bucket: s3.bucket.unwrap_or_default(),
                region: s3.region,
                endpoint_url: s3.endpoint_url,
                prefix: s3.prefix,
                access_key_id: s3.access_key_id,
                secret_access_key: s3.secret_access_key,
                force_path_style: s3.force_path_style,
                presign_expiry: std::time::Duration::from_secs(s3.presign_secs),
            };
            let primary: Arc<dyn FileStore> = Arc::new(S3FileStore::connect(config).await);
            Ok(Arc::new(tc_services::FallbackFileStore::new(primary, local)))
        }
        #[cfg(not(feature = "storage-s3"))]
        tc_config::StorageBackend::S3 => {
            anyhow::bail!("storage.backend = s3 needs a build with the `storage-s3` feature")
        }
    }
}

fn build_admin(password_hash: Option<secrecy::SecretString>) -> anyhow::Result<Arc<dyn AdminAuth>> {
    match password_hash {
        #[cfg(feature = "auth-simple")]
        Some(hash) => Ok(Arc::new(Argon2AdminAuth::new(hash)?)),
        #[cfg(not(feature = "auth-simple"))]
        Some(_) => anyhow::bail!("admin.password_hash needs a build with the `auth-simple` feature"),
        None => {
            warn!("admin.password_hash is not set; manual unlock is open to everyone and delete is disabled");
            Ok(Arc::new(OpenAdmin))
        }
    }
}

/// Resolves on SIGINT (Ctrl+C) or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received SIGINT"),
        () = terminate => info!("received SIGTERM"),
    }
}
