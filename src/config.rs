//! Layered configuration (§4.G): compiled-in defaults, an optional TOML
//! config file, `BITLOGD_`-prefixed environment variables, and finally CLI
//! flag overrides, each layer overriding the one before it.

use crate::error::{Error, Result};

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:1337";
pub const DEFAULT_DB_PATH: &str = "./data";
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_LOG_LEVEL: &str = "info";

const ENV_PREFIX: &str = "BITLOGD";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub listen_addr: String,
    pub db_path: PathBuf,
    pub idle_timeout_secs: u64,
    pub log_level: String,
}

impl Config {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Builds a `Config` by layering defaults, an optional config file,
    /// environment variables, then `overrides` (CLI flags), in that
    /// precedence order (lowest to highest).
    pub fn load(overrides: &Overrides) -> Result<Self> {
        let mut builder = config::Config::builder()
            .set_default("listen_addr", DEFAULT_LISTEN_ADDR)
            .map_err(wrap)?
            .set_default("db_path", DEFAULT_DB_PATH)
            .map_err(wrap)?
            .set_default("idle_timeout_secs", DEFAULT_IDLE_TIMEOUT_SECS)
            .map_err(wrap)?
            .set_default("log_level", DEFAULT_LOG_LEVEL)
            .map_err(wrap)?;

        if let Some(path) = &overrides.config_file {
            builder = builder.add_source(config::File::from(path.as_path()).required(false));
        }

        builder = builder.add_source(config::Environment::with_prefix(ENV_PREFIX));

        let assembled = builder.build().map_err(wrap)?;
        let mut config: Config = assembled.try_deserialize().map_err(wrap)?;

        if let Some(addr) = &overrides.listen_addr {
            config.listen_addr = addr.clone();
        }
        if let Some(path) = &overrides.db_path {
            config.db_path = path.clone();
        }

        Ok(config)
    }
}

/// The CLI-flag layer, applied last and so taking the highest precedence.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub listen_addr: Option<String>,
    pub db_path: Option<PathBuf>,
    pub config_file: Option<PathBuf>,
}

fn wrap(err: config::ConfigError) -> Error {
    Error::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_with_no_overrides() {
        let config = Config::load(&Overrides::default()).unwrap();
        assert_eq!(config.listen_addr, DEFAULT_LISTEN_ADDR);
        assert_eq!(config.db_path, PathBuf::from(DEFAULT_DB_PATH));
        assert_eq!(config.idle_timeout(), Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS));
    }

    #[test]
    fn cli_overrides_beat_defaults() {
        let overrides = Overrides {
            listen_addr: Some("127.0.0.1:9999".to_string()),
            db_path: Some(PathBuf::from("/tmp/bitlogd-test")),
            config_file: None,
        };
        let config = Config::load(&overrides).unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:9999");
        assert_eq!(config.db_path, PathBuf::from("/tmp/bitlogd-test"));
    }

    #[test]
    fn config_file_layers_over_defaults() {
        let dir = tempfile::TempDir::with_prefix("bitlogd").unwrap();
        let config_path = dir.path().join("bitlogd.toml");
        std::fs::write(&config_path, "listen_addr = \"10.0.0.1:1337\"\n").unwrap();

        let overrides = Overrides { config_file: Some(config_path), ..Default::default() };
        let config = Config::load(&overrides).unwrap();
        assert_eq!(config.listen_addr, "10.0.0.1:1337");
        // Untouched keys still fall back to defaults.
        assert_eq!(config.db_path, PathBuf::from(DEFAULT_DB_PATH));
    }

    #[test]
    fn cli_beats_config_file() {
        let dir = tempfile::TempDir::with_prefix("bitlogd").unwrap();
        let config_path = dir.path().join("bitlogd.toml");
        std::fs::write(&config_path, "listen_addr = \"10.0.0.1:1337\"\n").unwrap();

        let overrides = Overrides {
            listen_addr: Some("127.0.0.1:1".to_string()),
            config_file: Some(config_path),
            ..Default::default()
        };
        let config = Config::load(&overrides).unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:1");
    }
}
