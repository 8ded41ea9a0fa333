use uuid::Uuid;

use crate::common::keys;

/// Logical file segment. A block is never stored as one value; its data
/// lives in the sub-block columns of its row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// Time-based UUID, also the sub-block row key.
    pub id: Uuid,
    /// Byte offset of this block within the file.
    pub offset: u64,
    /// Total length in bytes (sum of sub-block lengths).
    pub length: u64,
    /// Sub-blocks ordered by offset, contiguous from 0.
    pub sub_blocks: Vec<SubBlock>,
}

impl Block {
    pub fn new(offset: u64, sub_blocks: Vec<SubBlock>) -> Self {
        let length = sub_blocks.iter().map(|s| s.length).sum();
        Self {
            id: keys::time_uuid(),
            offset,
            length,
            sub_blocks,
        }
    }
}

/// Physical write unit: one column holding a compressed payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubBlock {
    pub id: Uuid,
    /// Byte offset within the parent block.
    pub offset: u64,
    /// Uncompressed length in bytes.
    pub length: u64,
}

impl SubBlock {
    pub fn new(offset: u64, length: u64) -> Self {
        Self {
            id: keys::time_uuid(),
            offset,
            length,
        }
    }
}

/// Placement of one block, as handed to the job scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockLocation {
    /// Replica hostnames, preferred first.
    pub hosts: Vec<String>,
    pub offset: u64,
    pub length: u64,
}
