//! Sub-block compression over a pair of reusable buffers.
//!
//! Each store instance owns one context behind a mutex; the buffers grow
//! to the largest sub-block seen and are then reused for every call. A
//! returned slice is valid only until the next call on the same context,
//! so callers copy what they keep.

use snap::raw::{decompress_len, max_compress_len, Decoder, Encoder};

use crate::common::error::{Error, Result};

pub struct CompressionContext {
    encoder: Encoder,
    decoder: Decoder,
    compressed: Vec<u8>,
    uncompressed: Vec<u8>,
}

impl CompressionContext {
    pub fn new() -> Self {
        Self {
            encoder: Encoder::new(),
            decoder: Decoder::new(),
            compressed: Vec::new(),
            uncompressed: Vec::new(),
        }
    }

    /// Compress `input`, returning a slice of the internal buffer.
    pub fn compress(&mut self, input: &[u8]) -> Result<&[u8]> {
        let max = max_compress_len(input.len());
        if max == 0 {
            return Err(Error::InvalidArgument(format!(
                "sub-block of {} bytes exceeds the compressible size limit",
                input.len()
            )));
        }
        if self.compressed.len() < max {
            self.compressed.resize(max, 0);
        }

        let written = self
            .encoder
            .compress(input, &mut self.compressed)
            .map_err(|e| Error::Internal(format!("compression failed: {e}")))?;
        Ok(&self.compressed[..written])
    }

    /// Decompress `input`, returning a slice of the internal buffer.
    ///
    /// Sub-blocks written before compression was introduced are stored
    /// raw; anything that is not a valid snappy frame is reported as
    /// `None` and the caller uses the input verbatim.
    pub fn decompress(&mut self, input: &[u8]) -> Result<Option<&[u8]>> {
        let len = match decompress_len(input) {
            Ok(len) => len,
            Err(_) => return Ok(None),
        };
        if self.uncompressed.len() < len {
            self.uncompressed.resize(len, 0);
        }

        match self.decoder.decompress(input, &mut self.uncompressed) {
            Ok(written) => Ok(Some(&self.uncompressed[..written])),
            Err(_) => Ok(None),
        }
    }
}

impl Default for CompressionContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let mut ctx = CompressionContext::new();
        let input: Vec<u8> = (0..64 * 1024).map(|i| (i % 251) as u8).collect();

        let compressed = ctx.compress(&input).unwrap().to_vec();
        let restored = ctx.decompress(&compressed).unwrap().unwrap().to_vec();
        assert_eq!(restored, input);
    }

    #[test]
    fn test_buffers_are_reused_across_sizes() {
        let mut ctx = CompressionContext::new();
        for size in [10usize, 100_000, 17, 50_000] {
            let input = vec![7u8; size];
            let compressed = ctx.compress(&input).unwrap().to_vec();
            let restored = ctx.decompress(&compressed).unwrap().unwrap().to_vec();
            assert_eq!(restored, input);
        }
    }

    #[test]
    fn test_legacy_payload_passes_through() {
        let mut ctx = CompressionContext::new();
        // A plausible raw sub-block that never went through the encoder.
        let raw = b"not a snappy frame at all, stored before compression";
        assert!(ctx.decompress(raw).unwrap().is_none());
    }

    #[test]
    fn test_empty_input() {
        let mut ctx = CompressionContext::new();
        let compressed = ctx.compress(&[]).unwrap().to_vec();
        let restored = ctx.decompress(&compressed).unwrap().unwrap();
        assert!(restored.is_empty());
    }
}
