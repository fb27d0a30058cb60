use anyhow::Context;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// HTTP address of the server, `host:port` or a full URL.
    #[serde(default = "default_address")]
    pub address: String,
    /// When set, metrics are delivered over gRPC instead of HTTP.
    #[serde(default)]
    pub grpc_address: Option<String>,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_report_interval")]
    pub report_interval_secs: u64,
    /// Maximum number of report sweeps in flight at once.
    #[serde(default = "default_rate_limit")]
    pub rate_limit: usize,
    /// HMAC key for the `HashSHA256` header.
    #[serde(default)]
    pub key: Option<String>,
    /// Path to the server's RSA public key (PEM).
    #[serde(default)]
    pub crypto_key: Option<PathBuf>,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_address() -> String {
    "localhost:8080".to_string()
}

fn default_poll_interval() -> u64 {
    1
}

fn default_report_interval() -> u64 {
    5
}

fn default_rate_limit() -> usize {
    1
}

fn default_max_attempts() -> u32 {
    metrix_common::retry::DEFAULT_DELIVERY_ATTEMPTS
}

fn default_request_timeout() -> u64 {
    5
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            grpc_address: None,
            poll_interval_secs: default_poll_interval(),
            report_interval_secs: default_report_interval(),
            rate_limit: default_rate_limit(),
            key: None,
            crypto_key: None,
            max_attempts: default_max_attempts(),
            request_timeout_secs: default_request_timeout(),
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

impl AgentConfig {
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

    /// Override fields from `ADDRESS`, `GRPC_ADDRESS`, `POLL_INTERVAL`,
    /// `REPORT_INTERVAL`, `RATE_LIMIT`, `KEY` and `CRYPTO_KEY`. Empty
    /// variables are ignored.
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
        if let Some(v) = var("POLL_INTERVAL") {
            self.poll_interval_secs = parse_env("POLL_INTERVAL", &v)?;
        }
        if let Some(v) = var("REPORT_INTERVAL") {
            self.report_interval_secs = parse_env("REPORT_INTERVAL", &v)?;
        }
        if let Some(v) = var("RATE_LIMIT") {
            self.rate_limit = parse_env("RATE_LIMIT", &v)?;
        }
        if let Some(v) = var("KEY") {
            self.key = Some(v);
        }
        if let Some(v) = var("CRYPTO_KEY") {
            self.crypto_key = Some(PathBuf::from(v));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    /// Full URL of the HTTP ingest endpoint.
    pub fn update_url(&self) -> String {
        format!("{}/update/", with_scheme(&self.address).trim_end_matches('/'))
    }

    /// gRPC endpoint URI, if gRPC delivery is configured.
    pub fn grpc_endpoint(&self) -> Option<String> {
        self.grpc_address
            .as_deref()
            .filter(|a| !a.trim().is_empty())
            .map(with_scheme)
    }
}

fn with_scheme(addr: &str) -> String {
    let addr = addr.trim();
    if addr.contains("://") {
        addr.to_string()
    } else {
        format!("http://{addr}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_from_empty_file() {
        let config: AgentConfig = toml::from_str("").unwrap();
        assert_eq!(config.address, "localhost:8080");
        assert_eq!(config.rate_limit, 1);
        assert_eq!(config.max_attempts, 10);
        assert_eq!(config.update_url(), "http://localhost:8080/update/");
        assert!(config.grpc_endpoint().is_none());
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config: AgentConfig = toml::from_str(
            r#"
            address = "10.0.0.1:9000"
            report_interval_secs = 30
            key = "from-file"
            "#,
        )
        .unwrap();

        let env: HashMap<&str, &str> = [
            ("ADDRESS", "collector:8080"),
            ("REPORT_INTERVAL", "2"),
            ("RATE_LIMIT", "4"),
            ("KEY", ""),
            ("GRPC_ADDRESS", "collector:3200"),
        ]
        .into_iter()
        .collect();
        config
            .apply_env(|name| env.get(name).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.address, "collector:8080");
        assert_eq!(config.report_interval(), Duration::from_secs(2));
        assert_eq!(config.rate_limit, 4);
        assert_eq!(config.key.as_deref(), Some("from-file"));
        assert_eq!(config.grpc_endpoint().as_deref(), Some("http://collector:3200"));
    }

    #[test]
    fn bad_numeric_env_is_an_error() {
        let mut config = AgentConfig::default();
        let err = config
            .apply_env(|name| (name == "POLL_INTERVAL").then(|| "soon".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("POLL_INTERVAL"));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.toml");
        let config = AgentConfig::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
    }
}
