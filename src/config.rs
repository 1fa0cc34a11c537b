/// Config loader (spec C9)
///
/// Layered the way the teacher's `config.rs` is: a `config::Config` builder
/// reading `config.toml` (if present) as the base layer, then
/// `config::Environment` with a `MONITOR_` prefix for operator overrides,
/// validated into a typed `MonitorConfig`. Unlike the teacher's
/// stringly-typed `get_string`/`get` calls scattered at every call site,
/// this module does the lookup once, at startup, and hands the rest of the
/// crate a plain struct.
use config::{Config, Environment, File};
use serde::Deserialize;
use tracing::warn;

use crate::error::MonitorError;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub rpc_url: String,
    pub chain_name: Option<String>,
    pub poll_interval_ms: u64,
    pub recheck_depth: u64,
    pub cache_depth: u64,
    pub chain_metadata_poll_ms: i64,
    pub hourly_report_interval_ms: i64,
    pub alert_webhook_url: Option<String>,
    pub log_format: String,
    pub log_file: Option<String>,
    pub metrics_port: Option<u16>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            rpc_url: String::new(),
            chain_name: None,
            poll_interval_ms: 1000,
            recheck_depth: 16,
            cache_depth: 2048,
            chain_metadata_poll_ms: 10_000,
            hourly_report_interval_ms: 3_600_000,
            alert_webhook_url: None,
            log_format: "pretty".to_string(),
            log_file: None,
            metrics_port: None,
        }
    }
}

impl MonitorConfig {
    /// Loads `config.toml` (if present) then `MONITOR_`-prefixed environment
    /// overrides, validating the result. `rpc_url` absent/empty is a fatal
    /// construction-time error per spec §7's "Configuration error" taxonomy
    /// entry. `recheck_depth > cache_depth` is clamped with a warning rather
    /// than rejected, per the invariant note in spec §6.4.
    pub fn load() -> Result<Self, MonitorError> {
        Self::load_from(None)
    }

    /// Same as [`Self::load`], but reads the base file from `path` instead of
    /// the default `./config.toml` (the `--config` CLI override).
    pub fn load_from(path: Option<&str>) -> Result<Self, MonitorError> {
        let builder = Config::builder()
            .add_source(File::with_name(path.unwrap_or("config.toml")).required(false))
            .add_source(Environment::with_prefix("MONITOR").separator("_"));

        let built = builder
            .build()
            .map_err(|e| MonitorError::Config(format!("failed to build config: {e}")))?;

        let mut config: MonitorConfig = built
            .try_deserialize()
            .map_err(|e| MonitorError::Config(format!("failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&mut self) -> Result<(), MonitorError> {
        if self.rpc_url.trim().is_empty() {
            return Err(MonitorError::Config("RPC_URL is required".to_string()));
        }
        if self.recheck_depth > self.cache_depth {
            warn!(
                recheck_depth = self.recheck_depth,
                cache_depth = self.cache_depth,
                "RECHECK_DEPTH exceeds CACHE_DEPTH, clamping"
            );
            self.recheck_depth = self.cache_depth;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_rpc_url_is_a_config_error() {
        let mut config = MonitorConfig { rpc_url: String::new(), ..Default::default() };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, MonitorError::Config(_)));
    }

    #[test]
    fn recheck_depth_above_cache_depth_is_clamped() {
        let mut config = MonitorConfig {
            rpc_url: "http://localhost:8545".to_string(),
            recheck_depth: 100,
            cache_depth: 20,
            ..Default::default()
        };
        config.validate().unwrap();
        assert_eq!(config.recheck_depth, 20);
    }

    #[test]
    fn loads_from_toml_file_with_env_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "rpc_url = \"http://localhost:8545\"").unwrap();
        writeln!(file, "cache_depth = 512").unwrap();

        let cwd = std::env::current_dir().unwrap();
        std::env::set_current_dir(dir.path()).unwrap();
        std::env::set_var("MONITOR_CACHE_DEPTH", "1024");

        let result = MonitorConfig::load();

        std::env::remove_var("MONITOR_CACHE_DEPTH");
        std::env::set_current_dir(cwd).unwrap();

        let config = result.unwrap();
        assert_eq!(config.rpc_url, "http://localhost:8545");
        assert_eq!(config.cache_depth, 1024);
    }
}
