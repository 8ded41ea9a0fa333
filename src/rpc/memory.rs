//! Embedded in-memory column store for tests and single-process use.
//!
//! Implements the full [`ColumnRpc`] surface over sorted maps, including
//! last-writer-wins timestamps, secondary-index scans, and the local-block
//! spill mode that lets the memory-mapped read path run without a cluster.
//! Consistency levels are accepted and ignored; there is one replica.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;

use crate::common::error::{Error, Result};
use crate::common::local_hostname;
use crate::rpc::{
    Column, ColumnRpc, ConsistencyLevel, IndexClause, IndexExpression, IndexOperator, KeySlice,
    KeyspaceDef, LocalBlock, LocalOrRemoteBlock, Mutation, RowMutations, StoragePool,
};

type Row = BTreeMap<Vec<u8>, Column>;
type Family = BTreeMap<Vec<u8>, Row>;

#[derive(Default)]
struct State {
    keyspaces: HashMap<String, KeyspaceDef>,
    current: Option<String>,
    families: HashMap<String, Family>,
}

pub struct MemoryColumnStore {
    state: RwLock<State>,
    /// When set, sub-block fetches spill the column value to a file under
    /// this directory and answer with a local descriptor instead of a
    /// remote payload.
    spill_dir: Option<PathBuf>,
}

impl MemoryColumnStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
            spill_dir: None,
        }
    }

    pub fn with_spill_dir(dir: PathBuf) -> Self {
        Self {
            state: RwLock::new(State::default()),
            spill_dir: Some(dir),
        }
    }

    /// Number of rows currently held by a column family. Test hook.
    pub async fn row_count(&self, column_family: &str) -> usize {
        let state = self.state.read().await;
        state
            .families
            .get(column_family)
            .map(|f| f.len())
            .unwrap_or(0)
    }
}

impl Default for MemoryColumnStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ColumnRpc for MemoryColumnStore {
    async fn describe_keyspace(&self, name: &str) -> Result<Option<KeyspaceDef>> {
        let state = self.state.read().await;
        Ok(state.keyspaces.get(name).cloned())
    }

    async fn add_keyspace(&self, keyspace: KeyspaceDef) -> Result<()> {
        let mut state = self.state.write().await;
        if state.keyspaces.contains_key(&keyspace.name) {
            return Err(Error::Schema(format!(
                "keyspace already exists: {}",
                keyspace.name
            )));
        }
        for cf in &keyspace.column_families {
            state.families.insert(cf.name.clone(), Family::new());
        }
        state.keyspaces.insert(keyspace.name.clone(), keyspace);
        Ok(())
    }

    async fn describe_schema_versions(&self) -> Result<HashMap<String, Vec<String>>> {
        let mut versions = HashMap::new();
        versions.insert("1".to_string(), vec![local_hostname()]);
        Ok(versions)
    }

    async fn set_keyspace(&self, name: &str) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.keyspaces.contains_key(name) {
            return Err(Error::Rpc(format!("unknown keyspace: {name}")));
        }
        state.current = Some(name.to_string());
        Ok(())
    }

    async fn get(
        &self,
        key: &[u8],
        column_family: &str,
        column: &[u8],
        _consistency: ConsistencyLevel,
    ) -> Result<Option<Column>> {
        let state = self.state.read().await;
        let family = family(&state, column_family)?;
        Ok(family.get(key).and_then(|row| row.get(column)).cloned())
    }

    async fn insert(
        &self,
        key: &[u8],
        column_family: &str,
        column: Column,
        _consistency: ConsistencyLevel,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let family = family_mut(&mut state, column_family)?;
        upsert(family.entry(key.to_vec()).or_default(), column);
        Ok(())
    }

    async fn batch_mutate(
        &self,
        rows: Vec<RowMutations>,
        _consistency: ConsistencyLevel,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        for row_mutations in rows {
            let family = family_mut(&mut state, &row_mutations.column_family)?;
            let row = family.entry(row_mutations.key.clone()).or_default();
            for mutation in row_mutations.mutations {
                apply_mutation(row, mutation);
            }
            if row.is_empty() {
                family.remove(&row_mutations.key);
            }
        }
        Ok(())
    }

    async fn remove(
        &self,
        key: &[u8],
        column_family: &str,
        column: Option<&[u8]>,
        timestamp: i64,
        _consistency: ConsistencyLevel,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let family = family_mut(&mut state, column_family)?;
        let Some(row) = family.get_mut(key) else {
            return Ok(());
        };
        match column {
            Some(name) => {
                if row.get(name).is_some_and(|c| c.timestamp <= timestamp) {
                    row.remove(name);
                }
            }
            None => row.retain(|_, c| c.timestamp > timestamp),
        }
        if row.is_empty() {
            family.remove(key);
        }
        Ok(())
    }

    async fn get_indexed_slices(
        &self,
        column_family: &str,
        clause: IndexClause,
        columns: Vec<Vec<u8>>,
        _consistency: ConsistencyLevel,
    ) -> Result<Vec<KeySlice>> {
        if !clause
            .expressions
            .iter()
            .any(|e| e.op == IndexOperator::Eq)
        {
            return Err(Error::InvalidArgument(
                "indexed scan requires at least one equality predicate".to_string(),
            ));
        }

        let state = self.state.read().await;
        let family = family(&state, column_family)?;

        let mut slices = Vec::new();
        for (key, row) in family.iter() {
            if !clause.start_key.is_empty() && key.as_slice() < clause.start_key.as_slice() {
                continue;
            }
            if !clause.expressions.iter().all(|e| matches_row(row, e)) {
                continue;
            }
            slices.push(KeySlice {
                key: key.clone(),
                columns: columns
                    .iter()
                    .filter_map(|name| row.get(name).cloned())
                    .collect(),
            });
            if slices.len() >= clause.count {
                break;
            }
        }
        Ok(slices)
    }

    async fn get_sub_block(
        &self,
        _hostname: &str,
        block_key: &[u8],
        column: &[u8],
        _offset: u64,
        pool: StoragePool,
    ) -> Result<Option<LocalOrRemoteBlock>> {
        let state = self.state.read().await;
        let family = family(&state, pool.sblock_cf())?;
        let Some(value) = family.get(block_key).and_then(|row| row.get(column)) else {
            return Ok(None);
        };

        match &self.spill_dir {
            Some(dir) => {
                let name = format!(
                    "{}-{}.sblk",
                    String::from_utf8_lossy(block_key),
                    String::from_utf8_lossy(column)
                );
                let file = dir.join(name);
                std::fs::write(&file, &value.value)?;
                Ok(Some(LocalOrRemoteBlock::Local(LocalBlock {
                    file: file.to_string_lossy().into_owned(),
                    offset: 0,
                    length: value.value.len() as u64,
                })))
            }
            None => Ok(Some(LocalOrRemoteBlock::Remote(Bytes::from(
                value.value.clone(),
            )))),
        }
    }

    async fn describe_keys(
        &self,
        _keyspace: &str,
        keys: Vec<Vec<u8>>,
    ) -> Result<Vec<Vec<String>>> {
        Ok(keys.iter().map(|_| vec![local_hostname()]).collect())
    }
}

fn family<'a>(state: &'a State, name: &str) -> Result<&'a Family> {
    state
        .families
        .get(name)
        .ok_or_else(|| Error::Rpc(format!("unknown column family: {name}")))
}

fn family_mut<'a>(state: &'a mut State, name: &str) -> Result<&'a mut Family> {
    state
        .families
        .get_mut(name)
        .ok_or_else(|| Error::Rpc(format!("unknown column family: {name}")))
}

/// Last-writer-wins at column granularity: an equal or newer timestamp
/// replaces, an older one is dropped.
fn upsert(row: &mut Row, column: Column) {
    match row.get(&column.name) {
        Some(existing) if existing.timestamp > column.timestamp => {}
        _ => {
            row.insert(column.name.clone(), column);
        }
    }
}

fn apply_mutation(row: &mut Row, mutation: Mutation) {
    match mutation {
        Mutation::SetColumn(column) => upsert(row, column),
        Mutation::SetSuperColumn { name, columns } => {
            // Super columns flatten to composite names.
            for mut column in columns {
                let mut composite = name.clone();
                composite.extend_from_slice(&column.name);
                column.name = composite;
                upsert(row, column);
            }
        }
        Mutation::Delete { timestamp, columns } => match columns {
            Some(names) => {
                for name in names {
                    if row.get(&name).is_some_and(|c| c.timestamp <= timestamp) {
                        row.remove(&name);
                    }
                }
            }
            None => row.retain(|_, c| c.timestamp > timestamp),
        },
    }
}

fn matches_row(row: &Row, expr: &IndexExpression) -> bool {
    let Some(column) = row.get(&expr.column) else {
        return false;
    };
    let value = column.value.as_slice();
    let target = expr.value.as_slice();
    match expr.op {
        IndexOperator::Eq => value == target,
        IndexOperator::Gt => value > target,
        IndexOperator::Gte => value >= target,
        IndexOperator::Lt => value < target,
        IndexOperator::Lte => value <= target,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(name: &[u8], value: &[u8], timestamp: i64) -> Column {
        Column {
            name: name.to_vec(),
            value: value.to_vec(),
            timestamp,
        }
    }

    async fn store_with_cf(name: &str) -> MemoryColumnStore {
        let store = MemoryColumnStore::new();
        let keyspace = KeyspaceDef {
            name: "test".to_string(),
            strategy_class: "SimpleStrategy".to_string(),
            strategy_options: HashMap::new(),
            durable_writes: true,
            column_families: vec![crate::rpc::ColumnFamilyDef {
                name: name.to_string(),
                comparator: "BytesType".to_string(),
                comment: String::new(),
                indexed_columns: Vec::new(),
                min_compaction_threshold: 16,
                max_compaction_threshold: 64,
                memtable_flush_after_mins: 1,
                memtable_throughput_mb: 128,
                key_cache_size: 0,
                gc_grace_seconds: 60,
            }],
        };
        store.add_keyspace(keyspace).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_insert_get_lww() {
        let store = store_with_cf("cf").await;
        let cl = ConsistencyLevel::Quorum;

        store
            .insert(b"row", "cf", column(b"c", b"new", 10), cl)
            .await
            .unwrap();
        // A stale write must not clobber the newer value.
        store
            .insert(b"row", "cf", column(b"c", b"old", 5), cl)
            .await
            .unwrap();

        let got = store.get(b"row", "cf", b"c", cl).await.unwrap().unwrap();
        assert_eq!(got.value, b"new");
        assert_eq!(got.timestamp, 10);
    }

    #[tokio::test]
    async fn test_remove_row_respects_timestamp() {
        let store = store_with_cf("cf").await;
        let cl = ConsistencyLevel::Quorum;

        store
            .insert(b"row", "cf", column(b"c", b"v", 10), cl)
            .await
            .unwrap();
        store.remove(b"row", "cf", None, 5, cl).await.unwrap();
        assert!(store.get(b"row", "cf", b"c", cl).await.unwrap().is_some());

        store.remove(b"row", "cf", None, 11, cl).await.unwrap();
        assert!(store.get(b"row", "cf", b"c", cl).await.unwrap().is_none());
        assert_eq!(store.row_count("cf").await, 0);
    }

    #[tokio::test]
    async fn test_indexed_scan_requires_equality() {
        let store = store_with_cf("cf").await;
        let clause = IndexClause {
            expressions: vec![IndexExpression {
                column: b"c".to_vec(),
                op: IndexOperator::Gt,
                value: b"a".to_vec(),
            }],
            start_key: Vec::new(),
            count: 10,
        };
        let result = store
            .get_indexed_slices("cf", clause, vec![b"c".to_vec()], ConsistencyLevel::One)
            .await;
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_indexed_scan_filters_and_projects() {
        let store = store_with_cf("cf").await;
        let cl = ConsistencyLevel::Quorum;

        for (key, tag, value) in [(b"k1", b"x", b"aa"), (b"k2", b"x", b"bb"), (b"k3", b"y", b"cc")]
        {
            store
                .insert(key, "cf", column(b"tag", tag, 1), cl)
                .await
                .unwrap();
            store
                .insert(key, "cf", column(b"val", value, 1), cl)
                .await
                .unwrap();
        }

        let clause = IndexClause {
            expressions: vec![
                IndexExpression {
                    column: b"tag".to_vec(),
                    op: IndexOperator::Eq,
                    value: b"x".to_vec(),
                },
                IndexExpression {
                    column: b"val".to_vec(),
                    op: IndexOperator::Gt,
                    value: b"aa".to_vec(),
                },
            ],
            start_key: Vec::new(),
            count: 10,
        };
        let slices = store
            .get_indexed_slices("cf", clause, vec![b"val".to_vec()], cl)
            .await
            .unwrap();
        assert_eq!(slices.len(), 1);
        assert_eq!(slices[0].key, b"k2");
        assert_eq!(slices[0].columns[0].value, b"bb");
    }
}
