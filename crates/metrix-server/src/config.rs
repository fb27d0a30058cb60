use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address.
    #[serde(default = "default_address")]
    pub address: String,
    /// gRPC listen address. gRPC is disabled when unset.
    #[serde(default)]
    pub grpc_address: Option<String>,
    /// Seconds between snapshots; `0` saves after every accepted update.
    #[serde(default = "default_store_interval")]
    pub store_interval_secs: u64,
    #[serde(default = "default_file_storage_path")]
    pub file_storage_path: Option<PathBuf>,
    /// SQLite database path. Takes precedence over `file_storage_path`.
    #[serde(default)]
    pub database_dsn: Option<String>,
    #[serde(default = "default_restore")]
    pub restore: bool,
    /// HMAC key for verifying and producing `HashSHA256` headers.
    #[serde(default)]
    pub key: Option<String>,
    /// Path to the RSA private key (PEM) used to decrypt payloads.
    #[serde(default)]
    pub crypto_key: Option<PathBuf>,
    /// CIDR that `X-Real-IP` must fall into, e.g. `192.168.0.0/24`.
    #[serde(default)]
    pub trusted_subnet: Option<String>,
}

fn default_address() -> String {
    "localhost:8080".to_string()
}

fn default_store_interval() -> u64 {
    15
}

fn default_file_storage_path() -> Option<PathBuf> {
    Some(PathBuf::from("/tmp/metrics-db.json"))
}

fn default_restore() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            grpc_address: None,
            store_interval_secs: default_store_interval(),
            file_storage_path: default_file_storage_path(),
            database_dsn: None,
            restore: default_restore(),
            key: None,
            crypto_key: None,
            trusted_subnet: None,
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, raw: &str) -> anyhow::Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid {name}={raw:?}: {e}"))
}

impl ServerConfig {
    /// Read the TOML file at `path` (if it exists) and apply environment
    /// overrides on top.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let mut config = match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content)
                .with_context(|| format!("failed to parse config file {path}"))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path, "Config file not found, using defaults");
                Self::default()
            }
            Err(e) => return Err(e).with_context(|| format!("failed to read config file {path}")),
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Override fields from `ADDRESS`, `GRPC_ADDRESS`, `STORE_INTERVAL`,
    /// `FILE_STORAGE_PATH`, `DATABASE_DSN`, `RESTORE`, `KEY`, `CRYPTO_KEY`
    /// and `TRUSTED_SUBNET`. Empty variables are ignored.
    pub fn apply_env<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.is_empty());

        if let Some(v) = var("ADDRESS") {
            self.address = v;
        }
        if let Some(v) = var("GRPC_ADDRESS") {
            self.grpc_address = Some(v);
        }
        if let Some(v) = var("STORE_INTERVAL") {
            self.store_interval_secs = parse_env("STORE_INTERVAL", &v)?;
        }
        if let Some(v) = var("FILE_STORAGE_PATH") {
            self.file_storage_path = Some(PathBuf::from(v));
        }
        if let Some(v) = var("DATABASE_DSN") {
            self.database_dsn = Some(v);
        }
        if let Some(v) = var("RESTORE") {
            self.restore = parse_env("RESTORE", &v)?;
        }
        if let Some(v) = var("KEY") {
            self.key = Some(v);
        }
        if let Some(v) = var("CRYPTO_KEY") {
            self.crypto_key = Some(PathBuf::from(v));
        }
        if let Some(v) = var("TRUSTED_SUBNET") {
            self.trusted_subnet = Some(v);
        }
        Ok(())
    }

    pub fn store_interval(&self) -> Duration {
        Duration::from_secs(self.store_interval_secs)
    }
}
