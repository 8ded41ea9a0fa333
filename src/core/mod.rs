pub mod block;
pub mod inode;

pub use block::{Block, BlockLocation, SubBlock};
pub use inode::{FileKind, INode};
