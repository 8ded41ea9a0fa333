//! Row key derivation for the inode and sub-block column families.

use md5::{Digest, Md5};
use uuid::Uuid;

use crate::common::local_hostname;

/// Row key for an inode: the lowercase hex digest of the path bytes,
/// fixed width so keys spread evenly across the ring and stay printable.
pub fn path_key(path: &str) -> String {
    let digest = Md5::digest(path.as_bytes());
    hex::encode(digest)
}

/// Row key for a sub-block row (and column name for a sub-block column):
/// the lowercase hex encoding of the big-endian 16-byte UUID.
pub fn uuid_key(id: Uuid) -> String {
    hex::encode(id.as_bytes())
}

/// Time-based UUID for new blocks and sub-blocks. Column names sort by raw
/// bytes, so time-ordered ids keep columns in approximate write order.
pub fn time_uuid() -> Uuid {
    Uuid::now_v1(&node_id())
}

fn node_id() -> [u8; 6] {
    let digest = Md5::digest(local_hostname().as_bytes());
    let mut id = [0u8; 6];
    id.copy_from_slice(&digest[..6]);
    id
}
