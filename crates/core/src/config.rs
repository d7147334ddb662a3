//! Simple config loader using TOML and serde.
//! The config structs are intentionally small and typed.

use serde::Deserialize;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("toml parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Host-level settings shared by the bus and the consensus layer.
#[derive(Debug, Deserialize, Clone)]
pub struct HostConfig {
    /// Network address this node advertises.
    pub bind_addr: Option<String>,

    /// Whether outbound parcels are signed and inbound signatures enforced.
    pub sign_messages: Option<bool>,

    /// Pulse duration in milliseconds. Phase deadlines are fractions of it.
    pub pulse_duration_ms: Option<u64>,
}

impl Default for HostConfig {
    fn default() -> Self {
        HostConfig {
            bind_addr: Some("127.0.0.1:7900".to_string()),
            sign_messages: Some(true),
            pulse_duration_ms: Some(10_000),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Optional node id (hex record ref). If absent a random one is generated.
    pub node_id: Option<String>,

    /// Data directory where the ledger stores its LMDB environment.
    pub data_dir: Option<String>,

    /// Cascade replication factor for multicast fan-out.
    pub replication_factor: Option<usize>,

    #[serde(default)]
    pub host: Option<HostConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            node_id: None,
            data_dir: Some("./data".to_string()),
            replication_factor: Some(2),
            host: Some(HostConfig::default()),
        }
    }
}

impl Config {
    pub fn host(&self) -> HostConfig {
        self.host.clone().unwrap_or_default()
    }
}

/// Load config from a TOML file path.
/// If the file is missing or fails to parse, an error is returned.
pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let s = fs::read_to_string(path.as_ref())?;
    let cfg: Config = toml::from_str(&s)?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_populated() {
        let def = Config::default();
        assert!(def.data_dir.is_some());
        assert_eq!(def.host().sign_messages, Some(true));
    }

    #[test]
    fn load_from_file_roundtrip() {
        let tmp = tempfile::NamedTempFile::new().expect("temp file");
        let toml = r#"
            node_id = "node-xyz"
            data_dir = "./mydata"
            replication_factor = 3

            [host]
            bind_addr = "0.0.0.0:7910"
            sign_messages = false
            pulse_duration_ms = 5000
        "#;
        let mut f = tmp.reopen().expect("reopen");
        f.write_all(toml.as_bytes()).expect("write");

        let cfg = load_from_file(tmp.path()).expect("load");
        assert_eq!(cfg.node_id.as_deref(), Some("node-xyz"));
        assert_eq!(cfg.replication_factor, Some(3));
        assert_eq!(cfg.host().sign_messages, Some(false));
        assert_eq!(cfg.host().pulse_duration_ms, Some(5000));
    }
}
