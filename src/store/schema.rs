//! Keyspace and column-family management.
//!
//! The four column families (two pools of inode + sblocks) are created on
//! first initialization against a fresh cluster. Creation is staggered by
//! a random sleep so co-starting nodes don't race each other, and the
//! caller blocks until every reachable node reports the same schema
//! version.

use std::collections::HashMap;
use std::time::Duration;

use rand::Rng;

use crate::common::config::StoreConfig;
use crate::common::error::{Error, Result};
use crate::rpc::{ColumnFamilyDef, ColumnRpc, IndexedColumnDef, KeyspaceDef};
use crate::store::consistency::NETWORK_TOPOLOGY_STRATEGY;

/// Datacenter holding the filesystem replicas.
const ANALYTICS_DC: &str = "analytics";
/// Transactional datacenter, excluded from filesystem replication.
const OLTP_DC: &str = "transactional";

const BYTES_COMPARATOR: &str = "BytesType";

/// Memtable tuning shared by all four families: short flush interval and
/// a throughput budget sized for 128 MiB logical blocks.
const MEMTABLE_FLUSH_AFTER_MINS: u32 = 1;
const MEMTABLE_THROUGHPUT_MB: u32 = 128;
const KEY_CACHE_SIZE: u64 = 1_000_000;
const GC_GRACE_SECONDS: u32 = 60;

const SCHEMA_AGREEMENT_ATTEMPTS: u32 = 60;
const SCHEMA_AGREEMENT_INTERVAL: Duration = Duration::from_millis(500);

/// Ensure the keyspace exists and the session is bound to it. Returns the
/// definition actually live in the cluster.
pub async fn ensure_keyspace(rpc: &dyn ColumnRpc, config: &StoreConfig) -> Result<KeyspaceDef> {
    let keyspace = match rpc.describe_keyspace(&config.keyspace).await? {
        Some(ks) => ks,
        None => create_keyspace(rpc, config).await?,
    };

    rpc.set_keyspace(&config.keyspace).await?;
    Ok(keyspace)
}

async fn create_keyspace(rpc: &dyn ColumnRpc, config: &StoreConfig) -> Result<KeyspaceDef> {
    // Stagger creation so co-starting nodes don't collide.
    let delay = rand::thread_rng().gen_range(0..5000);
    tokio::time::sleep(Duration::from_millis(delay)).await;

    if let Some(ks) = rpc.describe_keyspace(&config.keyspace).await? {
        return Ok(ks);
    }

    let definition = keyspace_def(config);
    tracing::info!(keyspace = %config.keyspace, replication = config.replication, "creating keyspace");
    rpc.add_keyspace(definition.clone()).await?;
    wait_for_schema_agreement(rpc).await?;

    Ok(definition)
}

/// The keyspace definition the manager creates on a fresh cluster.
pub fn keyspace_def(config: &StoreConfig) -> KeyspaceDef {
    let mut strategy_options = HashMap::new();
    strategy_options.insert(ANALYTICS_DC.to_string(), config.replication.to_string());
    strategy_options.insert(OLTP_DC.to_string(), "0".to_string());

    KeyspaceDef {
        name: config.keyspace.clone(),
        strategy_class: NETWORK_TOPOLOGY_STRATEGY.to_string(),
        strategy_options,
        durable_writes: config.replication > 1,
        column_families: vec![
            inode_cf("inode"),
            sblocks_cf("sblocks", 16, 64),
            inode_cf("inode_archive"),
            // Thresholds of zero disable automatic compaction; archived
            // sub-blocks are written once and never reorganized.
            sblocks_cf("sblocks_archive", 0, 0),
        ],
    }
}

fn inode_cf(name: &str) -> ColumnFamilyDef {
    ColumnFamilyDef {
        name: name.to_string(),
        comparator: BYTES_COMPARATOR.to_string(),
        comment: "Stores file meta data".to_string(),
        indexed_columns: vec![
            indexed_column(b"path"),
            indexed_column(b"parent_path"),
            indexed_column(b"sentinel"),
        ],
        min_compaction_threshold: 16,
        max_compaction_threshold: 64,
        memtable_flush_after_mins: MEMTABLE_FLUSH_AFTER_MINS,
        memtable_throughput_mb: MEMTABLE_THROUGHPUT_MB,
        key_cache_size: KEY_CACHE_SIZE,
        gc_grace_seconds: GC_GRACE_SECONDS,
    }
}

fn sblocks_cf(name: &str, min_compaction: u32, max_compaction: u32) -> ColumnFamilyDef {
    ColumnFamilyDef {
        name: name.to_string(),
        comparator: BYTES_COMPARATOR.to_string(),
        comment: "Stores blocks of information associated with a inode".to_string(),
        indexed_columns: Vec::new(),
        min_compaction_threshold: min_compaction,
        max_compaction_threshold: max_compaction,
        memtable_flush_after_mins: MEMTABLE_FLUSH_AFTER_MINS,
        memtable_throughput_mb: MEMTABLE_THROUGHPUT_MB,
        key_cache_size: KEY_CACHE_SIZE,
        gc_grace_seconds: GC_GRACE_SECONDS,
    }
}

fn indexed_column(name: &[u8]) -> IndexedColumnDef {
    IndexedColumnDef {
        name: name.to_vec(),
        validation_class: BYTES_COMPARATOR.to_string(),
        index_name: String::from_utf8_lossy(name).into_owned(),
    }
}

/// Block until every reachable node reports one schema version.
async fn wait_for_schema_agreement(rpc: &dyn ColumnRpc) -> Result<()> {
    for _ in 0..SCHEMA_AGREEMENT_ATTEMPTS {
        let versions = rpc.describe_schema_versions().await?;
        if versions.len() <= 1 {
            return Ok(());
        }
        tracing::debug!(versions = versions.len(), "waiting for schema agreement");
        tokio::time::sleep(SCHEMA_AGREEMENT_INTERVAL).await;
    }
    Err(Error::Schema(
        "cluster did not reach schema agreement".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyspace_def_families() {
        let def = keyspace_def(&StoreConfig::default());
        let names: Vec<&str> = def.column_families.iter().map(|cf| cf.name.as_str()).collect();
        assert_eq!(names, ["inode", "sblocks", "inode_archive", "sblocks_archive"]);
    }

    #[test]
    fn test_archive_compaction_disabled() {
        let def = keyspace_def(&StoreConfig::default());
        let archive = def
            .column_families
            .iter()
            .find(|cf| cf.name == "sblocks_archive")
            .unwrap();
        assert_eq!(archive.min_compaction_threshold, 0);
        assert_eq!(archive.max_compaction_threshold, 0);

        let regular = def
            .column_families
            .iter()
            .find(|cf| cf.name == "sblocks")
            .unwrap();
        assert_eq!(regular.min_compaction_threshold, 16);
        assert_eq!(regular.max_compaction_threshold, 64);
    }

    #[test]
    fn test_inode_families_are_indexed() {
        let def = keyspace_def(&StoreConfig::default());
        for name in ["inode", "inode_archive"] {
            let cf = def.column_families.iter().find(|cf| cf.name == name).unwrap();
            let indexed: Vec<&[u8]> =
                cf.indexed_columns.iter().map(|c| c.name.as_slice()).collect();
            assert_eq!(
                indexed,
                [b"path".as_slice(), b"parent_path".as_slice(), b"sentinel".as_slice()]
            );
        }
    }

    #[test]
    fn test_durable_writes_follow_replication() {
        let single = keyspace_def(&StoreConfig::default());
        assert!(!single.durable_writes);

        let replicated = keyspace_def(&StoreConfig {
            replication: 3,
            ..StoreConfig::default()
        });
        assert!(replicated.durable_writes);
        assert_eq!(replicated.strategy_options[ANALYTICS_DC], "3");
        assert_eq!(replicated.strategy_options[OLTP_DC], "0");
    }
}
