//! RPC surface of the replicated column store.
//!
//! The store layer talks to the column store only through the [`ColumnRpc`]
//! trait. The wire implementation lives in [`grpc`]; [`memory`] provides an
//! embedded backend for tests and single-process use.

pub mod grpc;
pub mod memory;

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;

use crate::common::error::Result;

/// Consistency level for a single read or write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConsistencyLevel {
    One,
    Quorum,
    #[serde(rename = "LOCAL_QUORUM")]
    LocalQuorum,
    All,
}

/// Which of the two schema triples a store instance operates on. Selected
/// once at initialization from the URI scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoragePool {
    /// `inode` / `sblocks`, compaction enabled. Short-lived job data.
    Regular,
    /// `inode_archive` / `sblocks_archive`, compaction disabled.
    Archive,
}

impl StoragePool {
    pub fn inode_cf(&self) -> &'static str {
        match self {
            StoragePool::Regular => "inode",
            StoragePool::Archive => "inode_archive",
        }
    }

    pub fn sblock_cf(&self) -> &'static str {
        match self {
            StoragePool::Regular => "sblocks",
            StoragePool::Archive => "sblocks_archive",
        }
    }
}

/// A named column value with its write timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: Vec<u8>,
    pub value: Vec<u8>,
    pub timestamp: i64,
}

/// One mutation against a single row of a single column family.
#[derive(Debug, Clone)]
pub enum Mutation {
    SetColumn(Column),
    SetSuperColumn { name: Vec<u8>, columns: Vec<Column> },
    Delete { timestamp: i64, columns: Option<Vec<Vec<u8>>> },
}

/// All mutations for one row of one column family within a batch.
#[derive(Debug, Clone)]
pub struct RowMutations {
    pub key: Vec<u8>,
    pub column_family: String,
    pub mutations: Vec<Mutation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOperator {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
}

/// One predicate of an indexed scan.
#[derive(Debug, Clone)]
pub struct IndexExpression {
    pub column: Vec<u8>,
    pub op: IndexOperator,
    pub value: Vec<u8>,
}

/// Conjunction of predicates plus paging bounds. The backend requires at
/// least one equality predicate.
#[derive(Debug, Clone)]
pub struct IndexClause {
    pub expressions: Vec<IndexExpression>,
    pub start_key: Vec<u8>,
    pub count: usize,
}

/// One row of an indexed-scan result, restricted to the projected columns.
#[derive(Debug, Clone)]
pub struct KeySlice {
    pub key: Vec<u8>,
    pub columns: Vec<Column>,
}

/// Descriptor for a sub-block replica held by the co-located node: an
/// extent of an on-disk table file that can be mapped directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalBlock {
    pub file: String,
    pub offset: u64,
    pub length: u64,
}

/// Result of a locality-aware sub-block fetch.
#[derive(Debug, Clone)]
pub enum LocalOrRemoteBlock {
    Local(LocalBlock),
    Remote(Bytes),
}

/// Secondary-index declaration on a column of a column family.
#[derive(Debug, Clone)]
pub struct IndexedColumnDef {
    pub name: Vec<u8>,
    pub validation_class: String,
    pub index_name: String,
}

/// Column family definition, as created by the schema manager.
#[derive(Debug, Clone)]
pub struct ColumnFamilyDef {
    pub name: String,
    pub comparator: String,
    pub comment: String,
    pub indexed_columns: Vec<IndexedColumnDef>,
    pub min_compaction_threshold: u32,
    pub max_compaction_threshold: u32,
    pub memtable_flush_after_mins: u32,
    pub memtable_throughput_mb: u32,
    pub key_cache_size: u64,
    pub gc_grace_seconds: u32,
}

/// Keyspace definition.
#[derive(Debug, Clone)]
pub struct KeyspaceDef {
    pub name: String,
    pub strategy_class: String,
    pub strategy_options: HashMap<String, String>,
    pub durable_writes: bool,
    pub column_families: Vec<ColumnFamilyDef>,
}

/// The column store operations the filesystem store depends on. Absence is
/// reported as `Ok(None)`, never as an error.
#[async_trait]
pub trait ColumnRpc: Send + Sync {
    async fn describe_keyspace(&self, name: &str) -> Result<Option<KeyspaceDef>>;

    async fn add_keyspace(&self, keyspace: KeyspaceDef) -> Result<()>;

    /// Schema versions currently live in the cluster, mapped to the hosts
    /// reporting each version.
    async fn describe_schema_versions(&self) -> Result<HashMap<String, Vec<String>>>;

    async fn set_keyspace(&self, name: &str) -> Result<()>;

    async fn get(
        &self,
        key: &[u8],
        column_family: &str,
        column: &[u8],
        consistency: ConsistencyLevel,
    ) -> Result<Option<Column>>;

    async fn insert(
        &self,
        key: &[u8],
        column_family: &str,
        column: Column,
        consistency: ConsistencyLevel,
    ) -> Result<()>;

    async fn batch_mutate(
        &self,
        rows: Vec<RowMutations>,
        consistency: ConsistencyLevel,
    ) -> Result<()>;

    /// Remove a column, or the whole row when `column` is `None`.
    async fn remove(
        &self,
        key: &[u8],
        column_family: &str,
        column: Option<&[u8]>,
        timestamp: i64,
        consistency: ConsistencyLevel,
    ) -> Result<()>;

    async fn get_indexed_slices(
        &self,
        column_family: &str,
        clause: IndexClause,
        columns: Vec<Vec<u8>>,
        consistency: ConsistencyLevel,
    ) -> Result<Vec<KeySlice>>;

    /// Fetch a sub-block column, preferring a local-extent descriptor when
    /// the node named by `hostname` holds a replica.
    async fn get_sub_block(
        &self,
        hostname: &str,
        block_key: &[u8],
        column: &[u8],
        offset: u64,
        pool: StoragePool,
    ) -> Result<Option<LocalOrRemoteBlock>>;

    /// Replica endpoints for each row key, in request order.
    async fn describe_keys(
        &self,
        keyspace: &str,
        keys: Vec<Vec<u8>>,
    ) -> Result<Vec<Vec<String>>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_column_families() {
        assert_eq!(StoragePool::Regular.inode_cf(), "inode");
        assert_eq!(StoragePool::Regular.sblock_cf(), "sblocks");
        assert_eq!(StoragePool::Archive.inode_cf(), "inode_archive");
        assert_eq!(StoragePool::Archive.sblock_cf(), "sblocks_archive");
    }
}
