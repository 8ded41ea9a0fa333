//! File and directory metadata records and their binary encoding.
//!
//! An inode is stored as one column value; the format is big-endian and
//! versioned so old records stay readable across upgrades.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use uuid::Uuid;

use crate::common::error::{Error, Result};
use crate::core::block::{Block, SubBlock};

const SERIAL_VERSION: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    File,
    Directory,
}

impl FileKind {
    fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(FileKind::File),
            1 => Some(FileKind::Directory),
            _ => None,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            FileKind::File => 0,
            FileKind::Directory => 1,
        }
    }
}

/// Metadata record for a file or directory. Identity is the path, which is
/// carried by the row key and the indexed `path` column, not by the blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct INode {
    pub user: String,
    pub group: String,
    pub permissions: u16,
    pub kind: FileKind,
    pub replication: u8,
    /// Target sub-block size in bytes for writers of this file.
    pub block_size: u64,
    /// Modification time, millis since epoch.
    pub mtime: i64,
    /// Blocks ordered by offset. Empty for directories and empty files.
    pub blocks: Vec<Block>,
    /// Write time of the storing column, set on retrieval. Not serialized.
    pub timestamp: i64,
}

impl INode {
    pub fn file(
        user: String,
        group: String,
        permissions: u16,
        replication: u8,
        block_size: u64,
        mtime: i64,
        blocks: Vec<Block>,
    ) -> Self {
        Self {
            user,
            group,
            permissions,
            kind: FileKind::File,
            replication,
            block_size,
            mtime,
            blocks,
            timestamp: 0,
        }
    }

    pub fn directory(user: String, group: String, permissions: u16, mtime: i64) -> Self {
        Self {
            user,
            group,
            permissions,
            kind: FileKind::Directory,
            replication: 0,
            block_size: 0,
            mtime,
            blocks: Vec::new(),
            timestamp: 0,
        }
    }

    pub fn is_file(&self) -> bool {
        self.kind == FileKind::File
    }

    pub fn is_directory(&self) -> bool {
        self.kind == FileKind::Directory
    }

    /// Total file length in bytes.
    pub fn length(&self) -> u64 {
        self.blocks.iter().map(|b| b.length).sum()
    }

    pub fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(64 + self.blocks.len() * 64);

        buf.put_u8(SERIAL_VERSION);
        put_string(&mut buf, &self.user);
        put_string(&mut buf, &self.group);
        buf.put_u16(self.permissions);
        buf.put_u8(self.kind.as_u8());
        buf.put_u8(self.replication);
        buf.put_u64(self.block_size);
        buf.put_i64(self.mtime);

        buf.put_u32(self.blocks.len() as u32);
        for block in &self.blocks {
            buf.put_slice(block.id.as_bytes());
            buf.put_u64(block.offset);
            buf.put_u64(block.length);
            buf.put_u32(block.sub_blocks.len() as u32);
            for sub in &block.sub_blocks {
                buf.put_slice(sub.id.as_bytes());
                buf.put_u64(sub.offset);
                buf.put_u64(sub.length);
            }
        }

        buf.freeze()
    }

    /// Decode an inode blob. `timestamp` is the write time of the column
    /// the blob came from.
    pub fn deserialize(data: &[u8], timestamp: i64) -> Result<INode> {
        let mut buf = data;

        let version = get_u8(&mut buf)?;
        if version != SERIAL_VERSION {
            return Err(Error::Corrupt(format!(
                "unsupported inode version: {version}"
            )));
        }

        let user = get_string(&mut buf)?;
        let group = get_string(&mut buf)?;
        let permissions = get_u16(&mut buf)?;
        let kind = FileKind::from_u8(get_u8(&mut buf)?)
            .ok_or_else(|| Error::Corrupt("bad inode kind".to_string()))?;
        let replication = get_u8(&mut buf)?;
        let block_size = get_u64(&mut buf)?;
        let mtime = get_i64(&mut buf)?;

        let block_count = get_u32(&mut buf)? as usize;
        let mut blocks = Vec::with_capacity(block_count);
        for _ in 0..block_count {
            let id = get_uuid(&mut buf)?;
            let offset = get_u64(&mut buf)?;
            let length = get_u64(&mut buf)?;
            let sub_count = get_u32(&mut buf)? as usize;
            let mut sub_blocks = Vec::with_capacity(sub_count);
            for _ in 0..sub_count {
                sub_blocks.push(SubBlock {
                    id: get_uuid(&mut buf)?,
                    offset: get_u64(&mut buf)?,
                    length: get_u64(&mut buf)?,
                });
            }
            blocks.push(Block {
                id,
                offset,
                length,
                sub_blocks,
            });
        }

        Ok(INode {
            user,
            group,
            permissions,
            kind,
            replication,
            block_size,
            mtime,
            blocks,
            timestamp,
        })
    }
}

fn put_string(buf: &mut BytesMut, s: &str) {
    buf.put_u16(s.len() as u16);
    buf.put_slice(s.as_bytes());
}

fn need(buf: &[u8], n: usize) -> Result<()> {
    if buf.remaining() < n {
        return Err(Error::Corrupt("truncated inode".to_string()));
    }
    Ok(())
}

fn get_u8(buf: &mut &[u8]) -> Result<u8> {
    need(buf, 1)?;
    Ok(buf.get_u8())
}

fn get_u16(buf: &mut &[u8]) -> Result<u16> {
    need(buf, 2)?;
    Ok(buf.get_u16())
}

fn get_u32(buf: &mut &[u8]) -> Result<u32> {
    need(buf, 4)?;
    Ok(buf.get_u32())
}

fn get_u64(buf: &mut &[u8]) -> Result<u64> {
    need(buf, 8)?;
    Ok(buf.get_u64())
}

fn get_i64(buf: &mut &[u8]) -> Result<i64> {
    need(buf, 8)?;
    Ok(buf.get_i64())
}

fn get_uuid(buf: &mut &[u8]) -> Result<Uuid> {
    need(buf, 16)?;
    let mut raw = [0u8; 16];
    buf.copy_to_slice(&mut raw);
    Ok(Uuid::from_bytes(raw))
}

fn get_string(buf: &mut &[u8]) -> Result<String> {
    let len = get_u16(buf)? as usize;
    need(buf, len)?;
    let raw = buf.copy_to_bytes(len);
    String::from_utf8(raw.to_vec()).map_err(|_| Error::Corrupt("bad inode string".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_file() -> INode {
        let subs = vec![SubBlock::new(0, 1024), SubBlock::new(1024, 512)];
        let block = Block::new(0, subs);
        INode::file(
            "alice".to_string(),
            "users".to_string(),
            0o644,
            2,
            2 * 1024 * 1024,
            1_700_000_000_000,
            vec![block],
        )
    }

    #[test]
    fn test_file_round_trip() {
        let inode = sample_file();
        let data = inode.serialize();
        let back = INode::deserialize(&data, 42).unwrap();

        assert_eq!(back.user, "alice");
        assert_eq!(back.group, "users");
        assert_eq!(back.permissions, 0o644);
        assert_eq!(back.kind, FileKind::File);
        assert_eq!(back.replication, 2);
        assert_eq!(back.block_size, 2 * 1024 * 1024);
        assert_eq!(back.mtime, 1_700_000_000_000);
        assert_eq!(back.blocks, inode.blocks);
        assert_eq!(back.timestamp, 42);
        assert_eq!(back.length(), 1536);
    }

    #[test]
    fn test_directory_round_trip() {
        let inode = INode::directory("bob".to_string(), "staff".to_string(), 0o755, 7);
        let back = INode::deserialize(&inode.serialize(), 1).unwrap();
        assert!(back.is_directory());
        assert!(back.blocks.is_empty());
        assert_eq!(back.length(), 0);
    }

    #[test]
    fn test_unknown_version_rejected() {
        let mut data = sample_file().serialize().to_vec();
        data[0] = 9;
        assert!(matches!(
            INode::deserialize(&data, 0),
            Err(Error::Corrupt(_))
        ));
    }

    #[test]
    fn test_truncated_input_rejected() {
        let data = sample_file().serialize();
        for cut in [0, 1, 5, data.len() / 2, data.len() - 1] {
            assert!(
                INode::deserialize(&data[..cut], 0).is_err(),
                "cut at {cut} should fail"
            );
        }
    }

    #[test]
    fn test_bad_kind_rejected() {
        let inode = INode::directory("c".to_string(), "c".to_string(), 0, 0);
        let mut data = inode.serialize().to_vec();
        // kind byte sits after version, two length-prefixed strings and u16 perms
        let kind_at = 1 + 2 + 1 + 2 + 1 + 2;
        data[kind_at] = 7;
        assert!(INode::deserialize(&data, 0).is_err());
    }
}
