//! The filesystem store: translates inode, block, and listing operations
//! into reads and writes against the column store.

pub mod compress;
pub mod consistency;
pub mod reader;
pub mod schema;

use std::collections::HashSet;
use std::io;
use std::sync::Arc;

use async_stream::try_stream;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use memmap2::MmapOptions;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::common::config::StoreConfig;
use crate::common::error::{Error, Result};
use crate::common::path::{normalize_path, parent_for_index, successor};
use crate::common::{keys, local_hostname, now_millis};
use crate::core::{Block, BlockLocation, INode, SubBlock};
use crate::rpc::grpc::GrpcColumnStore;
use crate::rpc::{
    Column, ColumnRpc, ConsistencyLevel, IndexClause, IndexExpression, IndexOperator, LocalBlock,
    LocalOrRemoteBlock, Mutation, RowMutations, StoragePool,
};
use crate::store::compress::CompressionContext;
use crate::store::consistency::ConsistencyPolicy;
use crate::store::reader::SubBlockReader;

const PATH_COL: &[u8] = b"path";
const PARENT_PATH_COL: &[u8] = b"parent_path";
const SENTINEL_COL: &[u8] = b"sentinel";
const DATA_COL: &[u8] = b"data";

/// The sentinel column carries a constant value; it exists because the
/// indexed-scan API demands at least one equality predicate.
const SENTINEL_VALUE: &[u8] = b"x";

/// Row cap on indexed scans. Hitting it is an error, never a truncation.
const INDEXED_ROW_CAP: usize = 100_000;

/// A parsed store URI. The scheme selects the storage pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreUri {
    pub pool: StoragePool,
    pub host: String,
    pub port: u16,
}

impl StoreUri {
    pub fn parse(uri: &str, default_port: u16) -> Result<Self> {
        let (scheme, rest) = uri
            .split_once("://")
            .ok_or_else(|| Error::InvalidUri(format!("missing scheme: {uri}")))?;

        let pool = match scheme {
            "cfs" => StoragePool::Regular,
            "cfs-archive" => StoragePool::Archive,
            other => {
                return Err(Error::InvalidUri(format!("unknown scheme: {other}")));
            }
        };

        let authority = rest.split('/').next().unwrap_or("");
        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| Error::InvalidUri(format!("bad port in {uri}")))?;
                (host, port)
            }
            None => (authority, default_port),
        };

        // The wrapper passes "null" for an unset host.
        let host = if host.is_empty() || host == "null" {
            local_hostname()
        } else {
            host.to_string()
        };

        Ok(StoreUri { pool, host, port })
    }
}

/// Handle to one storage pool of the column store. Cheap to clone; clones
/// share the RPC session and the compression context.
#[derive(Clone)]
pub struct FileStore {
    rpc: Arc<dyn ColumnRpc>,
    pool: StoragePool,
    policy: ConsistencyPolicy,
    compression: Arc<Mutex<CompressionContext>>,
    keyspace: String,
    local_host: String,
}

impl FileStore {
    /// Connect to the column store named by `uri` and ensure the schema
    /// exists. The URI scheme selects the regular or archive pool.
    pub async fn connect(uri: &str, config: StoreConfig) -> Result<FileStore> {
        let target = StoreUri::parse(uri, config.rpc_port)?;
        tracing::info!(host = %target.host, port = target.port, pool = ?target.pool, "connecting to column store");

        let rpc = GrpcColumnStore::connect(format!("http://{}:{}", target.host, target.port)).await?;
        Self::with_backend(Arc::new(rpc), target.pool, config).await
    }

    /// Build a store over an already-constructed backend. Used by tests
    /// and embedded setups; `connect` routes through here.
    pub async fn with_backend(
        rpc: Arc<dyn ColumnRpc>,
        pool: StoragePool,
        config: StoreConfig,
    ) -> Result<FileStore> {
        let keyspace_def = schema::ensure_keyspace(rpc.as_ref(), &config).await?;
        let policy = ConsistencyPolicy::from_keyspace(&config, &keyspace_def);

        Ok(FileStore {
            rpc,
            pool,
            policy,
            compression: Arc::new(Mutex::new(CompressionContext::new())),
            keyspace: config.keyspace,
            local_host: local_hostname(),
        })
    }

    pub fn pool(&self) -> StoragePool {
        self.pool
    }

    pub fn version(&self) -> String {
        format!("columnfs store {}", env!("CARGO_PKG_VERSION"))
    }

    /// Look up the inode stored under `path`, or `None` if there is none.
    pub async fn retrieve_inode(&self, path: &str) -> Result<Option<INode>> {
        let path = normalize_path(path)?;
        let key = keys::path_key(&path).into_bytes();

        let mut column = self.perform_get(&key, self.policy.read()).await?;

        // A miss at ONE may just mean the freshest replica wasn't asked.
        if column.is_none() {
            if let Some(retry) = self.policy.read_retry() {
                column = self.perform_get(&key, retry).await?;
            }
        }

        match column {
            Some(col) => Ok(Some(INode::deserialize(&col.value, col.timestamp)?)),
            None => Ok(None),
        }
    }

    async fn perform_get(
        &self,
        key: &[u8],
        consistency: ConsistencyLevel,
    ) -> Result<Option<Column>> {
        self.rpc
            .get(key, self.pool.inode_cf(), DATA_COL, consistency)
            .await
    }

    /// Write the inode row: the serialized blob plus the three indexed
    /// columns, all at one timestamp.
    pub async fn store_inode(&self, path: &str, inode: &INode) -> Result<()> {
        let path = normalize_path(path)?;
        tracing::debug!(path = %path, blocks = inode.blocks.len(), "writing inode");

        let ts = now_millis();
        let mutations = vec![
            set_column(PATH_COL, path.as_bytes().to_vec(), ts),
            set_column(PARENT_PATH_COL, parent_for_index(&path).into_bytes(), ts),
            set_column(SENTINEL_COL, SENTINEL_VALUE.to_vec(), ts),
            set_column(DATA_COL, inode.serialize().to_vec(), ts),
        ];

        let rows = vec![RowMutations {
            key: keys::path_key(&path).into_bytes(),
            column_family: self.pool.inode_cf().to_string(),
            mutations,
        }];

        self.rpc.batch_mutate(rows, self.policy.write()).await
    }

    pub async fn delete_inode(&self, path: &str) -> Result<()> {
        let path = normalize_path(path)?;
        self.rpc
            .remove(
                keys::path_key(&path).as_bytes(),
                self.pool.inode_cf(),
                None,
                now_millis(),
                self.policy.write(),
            )
            .await
    }

    /// Compress and store one sub-block under its parent block's row.
    pub async fn store_sub_block(
        &self,
        parent_block: Uuid,
        sub_block: &SubBlock,
        data: &[u8],
    ) -> Result<()> {
        let value = {
            let mut ctx = self.compression.lock().await;
            ctx.compress(data)?.to_vec()
        };

        tracing::debug!(
            block = %parent_block,
            sub_block = %sub_block.id,
            raw = data.len(),
            stored = value.len(),
            "storing sub-block"
        );

        let column = Column {
            name: keys::uuid_key(sub_block.id).into_bytes(),
            value,
            timestamp: now_millis(),
        };

        self.rpc
            .insert(
                keys::uuid_key(parent_block).as_bytes(),
                self.pool.sblock_cf(),
                column,
                self.policy.write(),
            )
            .await
    }

    /// Open one sub-block for reading, skipping `offset` decompressed
    /// bytes. Prefers a memory-mapped local replica over a remote payload.
    pub async fn retrieve_sub_block(
        &self,
        block: &Block,
        sub_block: &SubBlock,
        offset: u64,
    ) -> Result<SubBlockReader> {
        let fetched = self
            .rpc
            .get_sub_block(
                &self.local_host,
                keys::uuid_key(block.id).as_bytes(),
                keys::uuid_key(sub_block.id).as_bytes(),
                0,
                self.pool,
            )
            .await?;

        match fetched {
            Some(LocalOrRemoteBlock::Local(local)) => self.open_local(local, offset).await,
            Some(LocalOrRemoteBlock::Remote(payload)) => self.inflate(payload, offset).await,
            None => Err(Error::MissingBlock(sub_block.id.to_string())),
        }
    }

    /// Stream a block's data starting at `offset` bytes into the block.
    /// Each item is the unread remainder of one sub-block.
    pub async fn retrieve_block(
        &self,
        block: &Block,
        offset: u64,
    ) -> Result<BoxStream<'static, Result<Bytes>>> {
        if offset > block.length {
            return Err(Error::InvalidArgument(format!(
                "offset {offset} beyond block of {} bytes",
                block.length
            )));
        }

        let store = self.clone();
        let block = block.clone();

        let stream = try_stream! {
            let mut skip = offset;
            for sub in block.sub_blocks.clone() {
                if skip >= sub.length {
                    skip -= sub.length;
                    continue;
                }
                let reader = store.retrieve_sub_block(&block, &sub, skip).await?;
                skip = 0;
                yield reader.into_bytes();
            }
        };

        Ok(stream.boxed())
    }

    /// Delete every sub-block row referenced by the inode, as one batch of
    /// row-level deletions.
    pub async fn delete_sub_blocks(&self, inode: &INode) -> Result<()> {
        if inode.blocks.is_empty() {
            return Ok(());
        }

        let ts = now_millis();
        let rows = inode
            .blocks
            .iter()
            .map(|block| RowMutations {
                key: keys::uuid_key(block.id).into_bytes(),
                column_family: self.pool.sblock_cf().to_string(),
                mutations: vec![Mutation::Delete {
                    timestamp: ts,
                    columns: None,
                }],
            })
            .collect();

        self.rpc.batch_mutate(rows, self.policy.write()).await
    }

    /// Direct children of `path`, via the parent-path index.
    pub async fn list_sub_paths(&self, path: &str) -> Result<HashSet<String>> {
        let path = normalize_path(path)?;
        let expressions = vec![
            eq(SENTINEL_COL, SENTINEL_VALUE.to_vec()),
            eq(PARENT_PATH_COL, path.clone().into_bytes()),
        ];
        self.indexed_paths(&path, expressions).await
    }

    /// All descendants of `path`, via a range scan on the path index.
    ///
    /// The range is bounded by `path` with its last character advanced, so
    /// a sibling sharing the prefix bytes (listing `/p` also matches
    /// `/pa/...`) is included; callers filter by path components.
    pub async fn list_deep_sub_paths(&self, path: &str) -> Result<HashSet<String>> {
        let path = normalize_path(path)?;

        let mut expressions = vec![
            eq(SENTINEL_COL, SENTINEL_VALUE.to_vec()),
            IndexExpression {
                column: PATH_COL.to_vec(),
                op: IndexOperator::Gt,
                value: path.clone().into_bytes(),
            },
        ];
        if let Some(end) = successor(&path) {
            expressions.push(IndexExpression {
                column: PATH_COL.to_vec(),
                op: IndexOperator::Lt,
                value: end.into_bytes(),
            });
        }

        self.indexed_paths(&path, expressions).await
    }

    async fn indexed_paths(
        &self,
        path: &str,
        expressions: Vec<IndexExpression>,
    ) -> Result<HashSet<String>> {
        let clause = IndexClause {
            expressions,
            start_key: Vec::new(),
            count: INDEXED_ROW_CAP,
        };

        let slices = self
            .rpc
            .get_indexed_slices(
                self.pool.inode_cf(),
                clause,
                vec![PATH_COL.to_vec()],
                self.policy.read(),
            )
            .await?;

        if slices.len() >= INDEXED_ROW_CAP {
            return Err(Error::ListingOverflow {
                path: path.to_string(),
                cap: INDEXED_ROW_CAP,
            });
        }

        let mut matches = HashSet::with_capacity(slices.len());
        for slice in slices {
            for column in slice.columns {
                if column.name == PATH_COL {
                    let path = String::from_utf8(column.value)
                        .map_err(|_| Error::Corrupt("non-UTF-8 path column".to_string()))?;
                    matches.insert(path);
                }
            }
        }
        Ok(matches)
    }

    /// Replica endpoints for each block, resolved in one batched call.
    /// The first block's offset is clamped up to `start` so input splits
    /// line up with the requested byte range.
    pub async fn get_block_locations(
        &self,
        blocks: &[Block],
        start: u64,
        _len: u64,
    ) -> Result<Vec<BlockLocation>> {
        if blocks.is_empty() {
            return Ok(Vec::new());
        }

        let block_keys = blocks
            .iter()
            .map(|b| keys::uuid_key(b.id).into_bytes())
            .collect();
        let endpoints = self.rpc.describe_keys(&self.keyspace, block_keys).await?;

        if endpoints.len() != blocks.len() {
            return Err(Error::Rpc(format!(
                "endpoint discovery returned {} entries for {} blocks",
                endpoints.len(),
                blocks.len()
            )));
        }

        Ok(blocks
            .iter()
            .zip(endpoints)
            .enumerate()
            .map(|(i, (block, hosts))| BlockLocation {
                hosts,
                offset: if i == 0 {
                    start.max(block.offset)
                } else {
                    block.offset
                },
                length: block.length,
            })
            .collect())
    }

    /// Decompress a remote payload through the shared context.
    async fn inflate(&self, payload: Bytes, skip: u64) -> Result<SubBlockReader> {
        let mut ctx = self.compression.lock().await;
        match ctx.decompress(&payload)? {
            Some(out) => SubBlockReader::owned(Bytes::copy_from_slice(out), skip),
            // Legacy sub-block stored raw; serve the payload as is.
            None => SubBlockReader::owned(payload, skip),
        }
    }

    /// Map a co-located replica's extent and decompress it. A descriptor
    /// naming a file that no longer exists means a replica was lost out
    /// from under us, which is corruption, not a transient miss.
    async fn open_local(&self, local: LocalBlock, skip: u64) -> Result<SubBlockReader> {
        if local.file.is_empty() {
            return Err(Error::Corrupt("local block has no file name".to_string()));
        }
        if local.length == 0 {
            return SubBlockReader::owned(Bytes::new(), skip);
        }

        let file = std::fs::File::open(&local.file).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                Error::Corrupt(format!("local block file missing: {}", local.file))
            } else {
                Error::Io(e)
            }
        })?;

        tracing::debug!(file = %local.file, offset = local.offset, bytes = local.length, "mapping local block");

        let map = unsafe {
            MmapOptions::new()
                .offset(local.offset)
                .len(local.length as usize)
                .map(&file)
        }
        .map_err(|e| {
            Error::Corrupt(format!(
                "unable to map block {}[{},{}]: {e}",
                local.file, local.offset, local.length
            ))
        })?;

        let mut ctx = self.compression.lock().await;
        match ctx.decompress(&map)? {
            Some(out) => SubBlockReader::owned(Bytes::copy_from_slice(out), skip),
            None => SubBlockReader::mapped(map, skip),
        }
    }
}

fn set_column(name: &[u8], value: Vec<u8>, timestamp: i64) -> Mutation {
    Mutation::SetColumn(Column {
        name: name.to_vec(),
        value,
        timestamp,
    })
}

fn eq(column: &[u8], value: Vec<u8>) -> IndexExpression {
    IndexExpression {
        column: column.to_vec(),
        op: IndexOperator::Eq,
        value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uri_selects_pool() {
        let regular = StoreUri::parse("cfs://db1:9160/", 9160).unwrap();
        assert_eq!(regular.pool, StoragePool::Regular);
        assert_eq!(regular.host, "db1");
        assert_eq!(regular.port, 9160);

        let archive = StoreUri::parse("cfs-archive://db1:9161/", 9160).unwrap();
        assert_eq!(archive.pool, StoragePool::Archive);
        assert_eq!(archive.port, 9161);
    }

    #[test]
    fn test_uri_defaults() {
        let parsed = StoreUri::parse("cfs://null/", 9160).unwrap();
        assert_eq!(parsed.host, local_hostname());
        assert_eq!(parsed.port, 9160);

        let parsed = StoreUri::parse("cfs:///", 7000).unwrap();
        assert_eq!(parsed.host, local_hostname());
        assert_eq!(parsed.port, 7000);
    }

    #[test]
    fn test_uri_rejects_unknown_scheme() {
        assert!(matches!(
            StoreUri::parse("hdfs://x/", 9160),
            Err(Error::InvalidUri(_))
        ));
        assert!(matches!(
            StoreUri::parse("no-scheme", 9160),
            Err(Error::InvalidUri(_))
        ));
    }
}
