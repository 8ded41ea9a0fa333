use serde::Deserialize;
use std::fs;

use crate::common::error::{Error, Result};
use crate::rpc::ConsistencyLevel;

/// Store configuration. Every field has a default so an empty TOML file
/// (or `StoreConfig::default()`) yields a working single-node setup.
#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// Consistency level for reads. Escalated to LOCAL_QUORUM when the
    /// keyspace uses a network-topology replication strategy.
    #[serde(default = "default_consistency")]
    pub read_consistency: ConsistencyLevel,

    /// Consistency level for writes, escalated like reads.
    #[serde(default = "default_consistency")]
    pub write_consistency: ConsistencyLevel,

    /// Replication factor for the analytics datacenter.
    #[serde(default = "default_replication")]
    pub replication: u32,

    /// Port used when the store URI does not carry one.
    #[serde(default = "default_rpc_port")]
    pub rpc_port: u16,

    #[serde(default = "default_keyspace")]
    pub keyspace: String,
}

impl StoreConfig {
    pub fn from_file(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let cfg: StoreConfig =
            toml::from_str(&content).map_err(|e| Error::Schema(format!("bad config: {e}")))?;
        Ok(cfg)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            read_consistency: default_consistency(),
            write_consistency: default_consistency(),
            replication: default_replication(),
            rpc_port: default_rpc_port(),
            keyspace: default_keyspace(),
        }
    }
}

fn default_consistency() -> ConsistencyLevel {
    ConsistencyLevel::Quorum
}

fn default_replication() -> u32 {
    1
}

fn default_rpc_port() -> u16 {
    9160
}

fn default_keyspace() -> String {
    "cfs".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = StoreConfig::default();
        assert_eq!(cfg.read_consistency, ConsistencyLevel::Quorum);
        assert_eq!(cfg.write_consistency, ConsistencyLevel::Quorum);
        assert_eq!(cfg.replication, 1);
        assert_eq!(cfg.keyspace, "cfs");
    }

    #[test]
    fn test_partial_toml() {
        let cfg: StoreConfig = toml::from_str("read_consistency = \"ONE\"").unwrap();
        assert_eq!(cfg.read_consistency, ConsistencyLevel::One);
        assert_eq!(cfg.write_consistency, ConsistencyLevel::Quorum);
    }
}
