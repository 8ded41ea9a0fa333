//! gRPC client for the column store RPC surface.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use tonic::transport::Channel;
use tonic::Request;

use crate::common::error::{Error, Result};
use crate::rpc::{
    Column, ColumnFamilyDef, ColumnRpc, ConsistencyLevel, IndexClause, IndexedColumnDef, KeySlice,
    KeyspaceDef, LocalBlock, LocalOrRemoteBlock, Mutation, RowMutations, StoragePool,
};
use crate::wire;
use crate::wire::column_store_client::ColumnStoreClient;

/// Column store access over gRPC. Clones share the underlying channel,
/// which multiplexes requests internally.
#[derive(Clone)]
pub struct GrpcColumnStore {
    client: ColumnStoreClient<Channel>,
}

impl GrpcColumnStore {
    pub async fn connect(addr: String) -> Result<Self> {
        let client = ColumnStoreClient::connect(addr)
            .await
            .map_err(|e| Error::Rpc(format!("failed to connect to column store: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ColumnRpc for GrpcColumnStore {
    async fn describe_keyspace(&self, name: &str) -> Result<Option<KeyspaceDef>> {
        let mut client = self.client.clone();
        let response = client
            .describe_keyspace(Request::new(wire::DescribeKeyspaceRequest {
                name: name.to_string(),
            }))
            .await
            .map_err(|e| Error::Rpc(format!("describe_keyspace: {e}")))?;
        Ok(response.into_inner().keyspace.map(keyspace_from_wire))
    }

    async fn add_keyspace(&self, keyspace: KeyspaceDef) -> Result<()> {
        let mut client = self.client.clone();
        client
            .add_keyspace(Request::new(wire::AddKeyspaceRequest {
                keyspace: Some(keyspace_to_wire(keyspace)),
            }))
            .await
            .map_err(|e| Error::Rpc(format!("add_keyspace: {e}")))?;
        Ok(())
    }

    async fn describe_schema_versions(&self) -> Result<HashMap<String, Vec<String>>> {
        let mut client = self.client.clone();
        let response = client
            .describe_schema_versions(Request::new(wire::DescribeSchemaVersionsRequest {}))
            .await
            .map_err(|e| Error::Rpc(format!("describe_schema_versions: {e}")))?;
        Ok(response
            .into_inner()
            .versions
            .into_iter()
            .map(|v| (v.version, v.hosts))
            .collect())
    }

    async fn set_keyspace(&self, name: &str) -> Result<()> {
        let mut client = self.client.clone();
        client
            .set_keyspace(Request::new(wire::SetKeyspaceRequest {
                name: name.to_string(),
            }))
            .await
            .map_err(|e| Error::Rpc(format!("set_keyspace: {e}")))?;
        Ok(())
    }

    async fn get(
        &self,
        key: &[u8],
        column_family: &str,
        column: &[u8],
        consistency: ConsistencyLevel,
    ) -> Result<Option<Column>> {
        let mut client = self.client.clone();
        let response = client
            .get(Request::new(wire::GetRequest {
                key: key.to_vec(),
                column_family: column_family.to_string(),
                column: column.to_vec(),
                consistency: consistency_to_wire(consistency),
            }))
            .await
            .map_err(|e| Error::Rpc(format!("get: {e}")))?;
        Ok(response.into_inner().column.map(column_from_wire))
    }

    async fn insert(
        &self,
        key: &[u8],
        column_family: &str,
        column: Column,
        consistency: ConsistencyLevel,
    ) -> Result<()> {
        let mut client = self.client.clone();
        client
            .insert(Request::new(wire::InsertRequest {
                key: key.to_vec(),
                column_family: column_family.to_string(),
                column: Some(column_to_wire(column)),
                consistency: consistency_to_wire(consistency),
            }))
            .await
            .map_err(|e| Error::Rpc(format!("insert: {e}")))?;
        Ok(())
    }

    async fn batch_mutate(
        &self,
        rows: Vec<RowMutations>,
        consistency: ConsistencyLevel,
    ) -> Result<()> {
        let mut client = self.client.clone();
        client
            .batch_mutate(Request::new(wire::BatchMutateRequest {
                rows: rows.into_iter().map(row_mutations_to_wire).collect(),
                consistency: consistency_to_wire(consistency),
            }))
            .await
            .map_err(|e| Error::Rpc(format!("batch_mutate: {e}")))?;
        Ok(())
    }

    async fn remove(
        &self,
        key: &[u8],
        column_family: &str,
        column: Option<&[u8]>,
        timestamp: i64,
        consistency: ConsistencyLevel,
    ) -> Result<()> {
        let mut client = self.client.clone();
        client
            .remove(Request::new(wire::RemoveRequest {
                key: key.to_vec(),
                column_family: column_family.to_string(),
                column: column.map(|c| c.to_vec()),
                timestamp,
                consistency: consistency_to_wire(consistency),
            }))
            .await
            .map_err(|e| Error::Rpc(format!("remove: {e}")))?;
        Ok(())
    }

    async fn get_indexed_slices(
        &self,
        column_family: &str,
        clause: IndexClause,
        columns: Vec<Vec<u8>>,
        consistency: ConsistencyLevel,
    ) -> Result<Vec<KeySlice>> {
        let mut client = self.client.clone();
        let response = client
            .get_indexed_slices(Request::new(wire::GetIndexedSlicesRequest {
                column_family: column_family.to_string(),
                expressions: clause
                    .expressions
                    .into_iter()
                    .map(|e| wire::IndexExpression {
                        column: e.column,
                        operator: operator_to_wire(e.op),
                        value: e.value,
                    })
                    .collect(),
                start_key: clause.start_key,
                count: clause.count as u32,
                columns,
                consistency: consistency_to_wire(consistency),
            }))
            .await
            .map_err(|e| Error::Rpc(format!("get_indexed_slices: {e}")))?;
        Ok(response
            .into_inner()
            .slices
            .into_iter()
            .map(|s| KeySlice {
                key: s.key,
                columns: s.columns.into_iter().map(column_from_wire).collect(),
            })
            .collect())
    }

    async fn get_sub_block(
        &self,
        hostname: &str,
        block_key: &[u8],
        column: &[u8],
        offset: u64,
        pool: StoragePool,
    ) -> Result<Option<LocalOrRemoteBlock>> {
        let mut client = self.client.clone();
        let response = client
            .get_sub_block(Request::new(wire::GetSubBlockRequest {
                hostname: hostname.to_string(),
                block_key: block_key.to_vec(),
                column: column.to_vec(),
                offset,
                pool: pool_to_wire(pool),
            }))
            .await
            .map_err(|e| Error::Rpc(format!("get_sub_block: {e}")))?;

        Ok(response.into_inner().block.map(|block| match block {
            wire::get_sub_block_response::Block::Local(local) => {
                LocalOrRemoteBlock::Local(LocalBlock {
                    file: local.file,
                    offset: local.offset,
                    length: local.length,
                })
            }
            wire::get_sub_block_response::Block::Remote(data) => {
                LocalOrRemoteBlock::Remote(Bytes::from(data))
            }
        }))
    }

    async fn describe_keys(
        &self,
        keyspace: &str,
        keys: Vec<Vec<u8>>,
    ) -> Result<Vec<Vec<String>>> {
        let mut client = self.client.clone();
        let response = client
            .describe_keys(Request::new(wire::DescribeKeysRequest {
                keyspace: keyspace.to_string(),
                keys,
            }))
            .await
            .map_err(|e| Error::Rpc(format!("describe_keys: {e}")))?;
        Ok(response
            .into_inner()
            .endpoints
            .into_iter()
            .map(|e| e.hosts)
            .collect())
    }
}

fn consistency_to_wire(cl: ConsistencyLevel) -> i32 {
    let mapped = match cl {
        ConsistencyLevel::One => wire::Consistency::One,
        ConsistencyLevel::Quorum => wire::Consistency::Quorum,
        ConsistencyLevel::LocalQuorum => wire::Consistency::LocalQuorum,
        ConsistencyLevel::All => wire::Consistency::All,
    };
    mapped as i32
}

fn pool_to_wire(pool: StoragePool) -> i32 {
    let mapped = match pool {
        StoragePool::Regular => wire::Pool::Regular,
        StoragePool::Archive => wire::Pool::Archive,
    };
    mapped as i32
}

fn operator_to_wire(op: crate::rpc::IndexOperator) -> i32 {
    use crate::rpc::IndexOperator as Op;
    let mapped = match op {
        Op::Eq => wire::IndexOperator::Eq,
        Op::Gt => wire::IndexOperator::Gt,
        Op::Gte => wire::IndexOperator::Gte,
        Op::Lt => wire::IndexOperator::Lt,
        Op::Lte => wire::IndexOperator::Lte,
    };
    mapped as i32
}

fn column_to_wire(column: Column) -> wire::ColumnValue {
    wire::ColumnValue {
        name: column.name,
        value: column.value,
        timestamp: column.timestamp,
    }
}

fn column_from_wire(column: wire::ColumnValue) -> Column {
    Column {
        name: column.name,
        value: column.value,
        timestamp: column.timestamp,
    }
}

fn mutation_to_wire(mutation: Mutation) -> wire::Mutation {
    let op = match mutation {
        Mutation::SetColumn(column) => {
            wire::mutation::Op::SetColumn(column_to_wire(column))
        }
        Mutation::SetSuperColumn { name, columns } => {
            wire::mutation::Op::SetSuperColumn(wire::SuperColumnUpdate {
                name,
                columns: columns.into_iter().map(column_to_wire).collect(),
            })
        }
        Mutation::Delete { timestamp, columns } => wire::mutation::Op::Delete(wire::Deletion {
            timestamp,
            columns: columns.unwrap_or_default(),
        }),
    };
    wire::Mutation { op: Some(op) }
}

fn row_mutations_to_wire(rows: RowMutations) -> wire::RowMutations {
    wire::RowMutations {
        key: rows.key,
        column_family: rows.column_family,
        mutations: rows.mutations.into_iter().map(mutation_to_wire).collect(),
    }
}

fn keyspace_to_wire(ks: KeyspaceDef) -> wire::KeyspaceDef {
    wire::KeyspaceDef {
        name: ks.name,
        strategy_class: ks.strategy_class,
        strategy_options: ks.strategy_options,
        durable_writes: ks.durable_writes,
        column_families: ks.column_families.into_iter().map(cf_to_wire).collect(),
    }
}

fn keyspace_from_wire(ks: wire::KeyspaceDef) -> KeyspaceDef {
    KeyspaceDef {
        name: ks.name,
        strategy_class: ks.strategy_class,
        strategy_options: ks.strategy_options,
        durable_writes: ks.durable_writes,
        column_families: ks.column_families.into_iter().map(cf_from_wire).collect(),
    }
}

fn cf_to_wire(cf: ColumnFamilyDef) -> wire::ColumnFamilyDef {
    wire::ColumnFamilyDef {
        name: cf.name,
        comparator: cf.comparator,
        comment: cf.comment,
        indexed_columns: cf
            .indexed_columns
            .into_iter()
            .map(|c| wire::IndexedColumnDef {
                name: c.name,
                validation_class: c.validation_class,
                index_name: c.index_name,
            })
            .collect(),
        min_compaction_threshold: cf.min_compaction_threshold,
        max_compaction_threshold: cf.max_compaction_threshold,
        memtable_flush_after_mins: cf.memtable_flush_after_mins,
        memtable_throughput_mb: cf.memtable_throughput_mb,
        key_cache_size: cf.key_cache_size,
        gc_grace_seconds: cf.gc_grace_seconds,
    }
}

fn cf_from_wire(cf: wire::ColumnFamilyDef) -> ColumnFamilyDef {
    ColumnFamilyDef {
        name: cf.name,
        comparator: cf.comparator,
        comment: cf.comment,
        indexed_columns: cf
            .indexed_columns
            .into_iter()
            .map(|c| IndexedColumnDef {
                name: c.name,
                validation_class: c.validation_class,
                index_name: c.index_name,
            })
            .collect(),
        min_compaction_threshold: cf.min_compaction_threshold,
        max_compaction_threshold: cf.max_compaction_threshold,
        memtable_flush_after_mins: cf.memtable_flush_after_mins,
        memtable_throughput_mb: cf.memtable_throughput_mb,
        key_cache_size: cf.key_cache_size,
        gc_grace_seconds: cf.gc_grace_seconds,
    }
}
