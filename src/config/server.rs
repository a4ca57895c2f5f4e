use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

pub const DEFAULT_LOG_FILTER: &str = "guardpost=info";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    /// `tracing` filter directives, used when `RUST_LOG` is not set.
    pub log_filter: String,
}

impl ServerConfig {
    /// Reads a TOML config file. Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| Error::Config(format!("invalid listen address: {e}")))
    }

    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("guardpost.db")
    }

    #[must_use]
    pub fn admin_token_path(&self) -> PathBuf {
        self.data_dir.join(".admin_token")
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            data_dir: PathBuf::from("./data"),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = ServerConfig::from_toml("port = 9090\ndata_dir = \"/srv/guardpost\"").unwrap();
        assert_eq!(config.port, 9090);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.log_filter, DEFAULT_LOG_FILTER);
        assert_eq!(config.db_path(), PathBuf::from("/srv/guardpost/guardpost.db"));
        assert_eq!(config.socket_addr().unwrap().port(), 9090);
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        assert!(matches!(
            ServerConfig::from_toml("prot = 1"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let temp = tempfile::TempDir::new().unwrap();
        assert!(ServerConfig::load(&temp.path().join("nope.toml")).is_err());
    }
}
