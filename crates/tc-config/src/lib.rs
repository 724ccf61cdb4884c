//! # tc-config
//!
//! Layered settings for the time capsule server, lowest priority first:
//!
//! 1. built-in defaults, replaced by the original deployment's variables
//!    (`DATABASE_URL`, `UPLOAD_DIR`, `CHECK_INTERVAL_SECONDS`, `SUPABASE_BUCKET`)
//!    when those are set,
//! 2. an optional `time-capsule.{toml,yaml,json}` file in the working directory,
//! 3. `CAPSULE__<SECTION>__<KEY>` environment variables
//!    (e.g. `CAPSULE__SERVER__PORT=9000`).
//!
//! A `.env` file is loaded into the process environment first.

use std::path::PathBuf;
use std::time::Duration;

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use secrecy::SecretString;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

pub const CONFIG_FILE: &str = "time-capsule";
pub const ENV_PREFIX: &str = "CAPSULE";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub storage: StorageSettings,
    pub poller: PollerSettings,
    #[serde(default)]
    pub admin: AdminSettings,
    pub cors: CorsSettings,
    pub log: LogSettings,
}

#[derive(Debug, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl ServerSettings {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Deserialize)]
pub struct DatabaseSettings {
    /// sqlx connection string, e.g. `sqlite://time_capsule.db`
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Local,
    S3,
}

#[derive(Debug, Deserialize)]
pub struct StorageSettings {
    pub backend: StorageBackend,
    /// Local uploads directory; also the fallback target for the s3 backend.
    pub upload_dir: PathBuf,
    /// Upper bound for a whole request body, attachments included.
    pub max_upload_bytes: usize,
    pub s3: S3Settings,
}

#[derive(Debug, Deserialize)]
pub struct S3Settings {
    pub bucket: Option<String>,
    pub region: String,
    pub endpoint_url: Option<String>,
    pub prefix: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<SecretString>,
    pub force_path_style: bool,
    pub presign_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct PollerSettings {
    pub interval_secs: u64,
}

impl PollerSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct AdminSettings {
    /// Argon2 PHC hash of the admin token. Unset means admin routes are open.
    pub password_hash: Option<SecretString>,
}

#[derive(Debug, Deserialize)]
pub struct CorsSettings {
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Deserialize)]
pub struct LogSettings {
    /// Default `EnvFilter` directive when `RUST_LOG` is unset.
    pub level: String,
    pub format: LogFormat,
}

/// Variables understood by the original deployment scripts.
#[derive(Debug, Default, Clone)]
pub struct LegacyEnv {
    pub database_url: Option<String>,
    pub upload_dir: Option<String>,
    pub check_interval_seconds: Option<i64>,
    pub supabase_bucket: Option<String>,
}

impl LegacyEnv {
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the legacy variables through `lookup`. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, SettingsError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let check_interval_seconds = var("CHECK_INTERVAL_SECONDS")
            .map(|raw| {
                raw.trim().parse::<i64>().map_err(|_| {
                    SettingsError::Invalid(format!(
                        "CHECK_INTERVAL_SECONDS must be a whole number of seconds, got {raw:?}"
                    ))
                })
            })
            .transpose()?;

        Ok(Self {
            database_url: var("DATABASE_URL"),
            upload_dir: var("UPLOAD_DIR"),
            check_interval_seconds,
            supabase_bucket: var("SUPABASE_BUCKET"),
        })
    }
}

/// Built-in defaults with legacy variables applied.
pub fn defaults(legacy: &LegacyEnv) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let mut builder = Config::builder()
        .set_default("server.host", "0.0.0.0")?
        .set_default("server.port", 8000_i64)?
        .set_default(
            "database.url",
            legacy
                .database_url
                .clone()
                .unwrap_or_else(|| "sqlite://time_capsule.db".to_owned()),
        )?
        .set_default("database.max_connections", 5_i64)?
        .set_default("storage.backend", "local")?
        .set_default(
            "storage.upload_dir",
            legacy.upload_dir.clone().unwrap_or_else(|| "./uploads".to_owned()),
        )?
        .set_default("storage.max_upload_bytes", 25_i64 * 1024 * 1024)?
        .set_default("storage.s3.region", "us-east-1")?
        .set_default("storage.s3.force_path_style", false)?
        .set_default("storage.s3.presign_secs", 900_i64)?
        .set_default("poller.interval_secs", legacy.check_interval_seconds.unwrap_or(60))?
        .set_default(
            "cors.allowed_origins",
            vec!["http://localhost:3000", "http://localhost:5173"],
        )?
        .set_default("log.level", "info")?
        .set_default("log.format", "pretty")?;

    if let Some(bucket) = &legacy.supabase_bucket {
        builder = builder.set_default("storage.s3.bucket", bucket.as_str())?;
    }
    Ok(builder)
}

/// The `CAPSULE__*` environment source.
pub fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .list_separator(",")
        .with_list_parse_key("cors.allowed_origins")
        .try_parsing(true)
}

impl Settings {
    /// Loads `.env`, then every layer described in the module docs.
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!(path = %path.display(), "loaded .env");
        }

        let config = defaults(&LegacyEnv::from_env()?)?
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(environment())
            .build()?;

        Self::from_config(config)
    }

    pub fn from_config(config: Config) -> Result<Self, SettingsError> {
        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), SettingsError> {
        if self.poller.interval_secs == 0 {
            return Err(SettingsError::Invalid("poller.interval_secs must be greater than 0".into()));
        }
        if self.storage.max_upload_bytes == 0 {
            return Err(SettingsError::Invalid("storage.max_upload_bytes must be greater than 0".into()));
        }
        let has_bucket = self
            .storage
            .s3
            .bucket
            .as_deref()
            .is_some_and(|b| !b.trim().is_empty());
        if self.storage.backend == StorageBackend::S3 && !has_bucket {
            return Err(SettingsError::Invalid("storage.backend = s3 requires storage.s3.bucket".into()));
        }
        Ok(())
    }
}
