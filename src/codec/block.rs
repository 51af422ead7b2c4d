//! Hadoop block-framed codec adapter (SnappyCodec / LzoCodec).
//!
//! # On-disk layout (all lengths big-endian)
//!
//! ```text
//! [big block] := u32  uncompressed_size
//!                [chunk]+   until the decompressed sizes sum to uncompressed_size
//! [chunk]     := u32  compressed_size
//!                compressed_size bytes of codec payload
//! ```
//!
//! [`BlockReader`] re-chunks this into a plain byte source.  A big block is
//! decompressed chunk-by-chunk into one buffer of `uncompressed_size` bytes;
//! reads drain the not-yet-consumed tail of that buffer.  Stream end is only
//! legal on a big-block boundary — running dry between the chunks of a block
//! is corruption.

use byteorder::{BigEndian, ReadBytesExt};
use std::io::{self, Read};

/// The per-chunk decompression primitive under the block framing.
#[derive(Debug, Clone, Copy)]
pub enum BlockCodec {
    Snappy,
    Lzo,
}

impl BlockCodec {
    /// Decompress one chunk into `dst`, returning the decoded byte count.
    fn decompress(self, src: &[u8], dst: &mut [u8]) -> io::Result<usize> {
        match self {
            BlockCodec::Snappy => snap::raw::Decoder::new()
                .decompress(src, dst)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("snappy chunk: {e}"))),
            BlockCodec::Lzo => {
                let decoded = lzokay_native::decompress_all(src, Some(dst.len()))
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("lzo chunk: {e}")))?;
                if decoded.len() > dst.len() {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!(
                            "lzo chunk decoded to {} bytes, {} left in the block",
                            decoded.len(),
                            dst.len()
                        ),
                    ));
                }
                dst[..decoded.len()].copy_from_slice(&decoded);
                Ok(decoded.len())
            }
        }
    }
}

pub struct BlockReader<R> {
    inner: R,
    codec: BlockCodec,
    /// Decode buffer for the current big block, `limit` bytes long.
    buffer: Vec<u8>,
    /// Declared uncompressed size of the current big block.
    limit: usize,
    /// Bytes decompressed into `buffer` so far.
    decoded: usize,
    /// Consumed prefix of `buffer[..decoded]`.
    pos: usize,
    /// Reusable compressed-chunk scratch.
    chunk: Vec<u8>,
}

impl<R: Read> BlockReader<R> {
    pub fn new(inner: R, codec: BlockCodec) -> Self {
        Self {
            inner,
            codec,
            buffer: Vec::new(),
            limit: 0,
            decoded: 0,
            pos: 0,
            chunk: Vec::new(),
        }
    }

    /// Decode one more chunk, opening the next big block when the current
    /// one is complete.  Returns `false` on clean end of stream.
    fn fill(&mut self) -> io::Result<bool> {
        if self.decoded == self.limit {
            let mut head = [0u8; 4];
            match self.inner.read(&mut head) {
                Ok(0) => return Ok(false),
                Ok(n) => self
                    .inner
                    .read_exact(&mut head[n..])
                    .map_err(|e| mid_block(e, "big-block header"))?,
                Err(e) => return Err(e),
            }
            self.limit = u32::from_be_bytes(head) as usize;
            self.decoded = 0;
            self.pos = 0;
            self.buffer.resize(self.limit, 0);
            if self.limit == 0 {
                return Ok(true);
            }
        }

        let compressed_size = self
            .inner
            .read_u32::<BigEndian>()
            .map_err(|e| mid_block(e, "chunk header"))? as usize;
        self.chunk.resize(compressed_size, 0);
        self.inner
            .read_exact(&mut self.chunk)
            .map_err(|e| mid_block(e, "chunk payload"))?;

        let n = self
            .codec
            .decompress(&self.chunk, &mut self.buffer[self.decoded..self.limit])?;
        self.decoded += n;
        Ok(true)
    }
}

fn mid_block(e: io::Error, what: &str) -> io::Error {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("block-framed stream ended inside a {what}"),
        )
    } else {
        e
    }
}

impl<R: Read> Read for BlockReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let mut written = 0;
        while written < buf.len() {
            let pending = self.decoded - self.pos;
            if pending > 0 {
                let n = pending.min(buf.len() - written);
                buf[written..written + n].copy_from_slice(&self.buffer[self.pos..self.pos + n]);
                self.pos += n;
                written += n;
                continue;
            }
            if !self.fill()? {
                break;
            }
        }
        Ok(written)
    }
}
