//! Readers over fetched sub-block data.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use memmap2::Mmap;
use tokio::io::{AsyncRead, ReadBuf};

use crate::common::error::{Error, Result};

/// Decompressed (or verbatim legacy) sub-block bytes. The mapped variant
/// keeps the region alive for exactly as long as the reader; dropping the
/// reader unmaps it.
enum SubBlockData {
    Owned(Bytes),
    Mapped(Mmap),
}

impl SubBlockData {
    fn as_slice(&self) -> &[u8] {
        match self {
            SubBlockData::Owned(b) => b,
            SubBlockData::Mapped(m) => m,
        }
    }
}

/// Positioned reader over one sub-block.
pub struct SubBlockReader {
    data: SubBlockData,
    pos: usize,
}

impl SubBlockReader {
    pub(crate) fn owned(data: Bytes, skip: u64) -> Result<Self> {
        Self::new(SubBlockData::Owned(data), skip)
    }

    pub(crate) fn mapped(map: Mmap, skip: u64) -> Result<Self> {
        Self::new(SubBlockData::Mapped(map), skip)
    }

    fn new(data: SubBlockData, skip: u64) -> Result<Self> {
        let len = data.as_slice().len() as u64;
        if skip > len {
            return Err(Error::InvalidArgument(format!(
                "offset {skip} beyond sub-block of {len} bytes"
            )));
        }
        Ok(Self {
            data,
            pos: skip as usize,
        })
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> usize {
        self.data.as_slice().len() - self.pos
    }

    /// Consume the reader, returning the unread bytes. Owned data past a
    /// zero position is handed back without copying; mapped data is copied
    /// so the region can be released here.
    pub fn into_bytes(self) -> Bytes {
        match self.data {
            SubBlockData::Owned(b) if self.pos == 0 => b,
            SubBlockData::Owned(b) => b.slice(self.pos..),
            SubBlockData::Mapped(m) => Bytes::copy_from_slice(&m[self.pos..]),
        }
    }
}

impl AsyncRead for SubBlockReader {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let src = this.data.as_slice();
        let n = buf.remaining().min(src.len() - this.pos);
        if n > 0 {
            buf.put_slice(&src[this.pos..this.pos + n]);
            this.pos += n;
        }
        Poll::Ready(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_read_all() {
        let mut r = SubBlockReader::owned(Bytes::from_static(b"hello world"), 0).unwrap();
        assert_eq!(r.remaining(), 11);

        let mut out = Vec::new();
        r.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"hello world");
        assert_eq!(r.remaining(), 0);
    }

    #[tokio::test]
    async fn test_skip() {
        let mut r = SubBlockReader::owned(Bytes::from_static(b"hello world"), 6).unwrap();
        let mut out = Vec::new();
        r.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"world");
    }

    #[test]
    fn test_skip_past_end_rejected() {
        let r = SubBlockReader::owned(Bytes::from_static(b"abc"), 4);
        assert!(matches!(r, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_into_bytes_respects_position() {
        let r = SubBlockReader::owned(Bytes::from_static(b"abcdef"), 2).unwrap();
        assert_eq!(r.into_bytes(), Bytes::from_static(b"cdef"));
    }
}
