//! LZOP stream reader (LzopCodec).
//!
//! # Container layout (all fields big-endian)
//!
//! ```text
//! magic          9 bytes  89 4C 5A 4F 00 0D 0A 1A 0A
//! version        u16      writer version
//! lib_version    u16
//! version_needed u16      only if version >= 0x0940
//! method         u8
//! level          u8       only if version >= 0x0940
//! flags          u32      checksum/extra-field presence bits
//! filter         u32      only if F_H_FILTER
//! mode           u32
//! mtime_low      u32
//! mtime_high     u32      only if version >= 0x0940
//! name           u8 length-prefixed
//! header_chksum  u32
//! extra field    u32 len + bytes + u32 chksum, only if F_H_EXTRA_FIELD
//!
//! block := u32 uncompressed_len        0 terminates the stream
//!          u32 compressed_len
//!          [d_adler32] [d_crc32]       per flags
//!          [c_adler32] [c_crc32]       per flags, only when actually compressed
//!          compressed_len bytes        stored verbatim when both lengths match
//! ```
//!
//! Checksum fields are skipped, not verified; the LZO1X primitive rejects
//! corrupt payloads on its own.  A block whose compressed length exceeds its
//! uncompressed length is malformed.

use byteorder::{BigEndian, ReadBytesExt};
use std::io::{self, Read};

const LZOP_MAGIC: [u8; 9] = [0x89, 0x4c, 0x5a, 0x4f, 0x00, 0x0d, 0x0a, 0x1a, 0x0a];

const F_ADLER32_D: u32 = 0x0000_0001;
const F_ADLER32_C: u32 = 0x0000_0002;
const F_H_EXTRA_FIELD: u32 = 0x0000_0040;
const F_CRC32_D: u32 = 0x0000_0100;
const F_CRC32_C: u32 = 0x0000_0200;
const F_H_FILTER: u32 = 0x0000_0800;

#[derive(Debug)]
pub struct LzopReader<R> {
    inner: R,
    flags: u32,
    /// Decoded bytes of the current block.
    buffer: Vec<u8>,
    /// Consumed prefix of `buffer`.
    pos: usize,
    done: bool,
}

impl<R: Read> LzopReader<R> {
    /// Parse the stream header; block decoding happens lazily on `read`.
    pub fn new(mut inner: R) -> io::Result<Self> {
        let mut magic = [0u8; 9];
        inner.read_exact(&mut magic)?;
        if magic != LZOP_MAGIC {
            return Err(bad("bad LZOP magic"));
        }

        let version = inner.read_u16::<BigEndian>()?;
        let _lib_version = inner.read_u16::<BigEndian>()?;
        if version >= 0x0940 {
            let _version_needed = inner.read_u16::<BigEndian>()?;
        }
        let _method = inner.read_u8()?;
        if version >= 0x0940 {
            let _level = inner.read_u8()?;
        }
        let flags = inner.read_u32::<BigEndian>()?;
        if flags & F_H_FILTER != 0 {
            let _filter = inner.read_u32::<BigEndian>()?;
        }
        let _mode = inner.read_u32::<BigEndian>()?;
        let _mtime_low = inner.read_u32::<BigEndian>()?;
        if version >= 0x0940 {
            let _mtime_high = inner.read_u32::<BigEndian>()?;
        }
        let name_len = inner.read_u8()? as usize;
        skip(&mut inner, name_len)?;
        let _header_chksum = inner.read_u32::<BigEndian>()?;
        if flags & F_H_EXTRA_FIELD != 0 {
            let extra_len = inner.read_u32::<BigEndian>()? as usize;
            skip(&mut inner, extra_len)?;
            let _extra_chksum = inner.read_u32::<BigEndian>()?;
        }

        Ok(Self {
            inner,
            flags,
            buffer: Vec::new(),
            pos: 0,
            done: false,
        })
    }

    /// Decode the next block into `buffer`.  Returns `false` once the zero
    /// terminator (or a clean end of stream) is reached.
    fn fill(&mut self) -> io::Result<bool> {
        if self.done {
            return Ok(false);
        }
        let uncompressed_len = match self.inner.read_u32::<BigEndian>() {
            Ok(n) => n as usize,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                self.done = true;
                return Ok(false);
            }
            Err(e) => return Err(e),
        };
        if uncompressed_len == 0 {
            self.done = true;
            return Ok(false);
        }
        let compressed_len = self.inner.read_u32::<BigEndian>()? as usize;
        if compressed_len > uncompressed_len {
            return Err(bad(format!(
                "LZOP block declares {compressed_len} compressed > {uncompressed_len} uncompressed bytes"
            )));
        }

        if self.flags & F_ADLER32_D != 0 {
            let _ = self.inner.read_u32::<BigEndian>()?;
        }
        if self.flags & F_CRC32_D != 0 {
            let _ = self.inner.read_u32::<BigEndian>()?;
        }
        if compressed_len < uncompressed_len {
            if self.flags & F_ADLER32_C != 0 {
                let _ = self.inner.read_u32::<BigEndian>()?;
            }
            if self.flags & F_CRC32_C != 0 {
                let _ = self.inner.read_u32::<BigEndian>()?;
            }
        }

        let mut compressed = vec![0u8; compressed_len];
        self.inner.read_exact(&mut compressed)?;

        self.buffer = if compressed_len == uncompressed_len {
            compressed
        } else {
            let decoded = lzokay_native::decompress_all(&compressed, Some(uncompressed_len))
                .map_err(|e| bad(format!("LZOP block: {e}")))?;
            if decoded.len() != uncompressed_len {
                return Err(bad(format!(
                    "LZOP block decoded to {} bytes, header declared {uncompressed_len}",
                    decoded.len()
                )));
            }
            decoded
        };
        self.pos = 0;
        Ok(true)
    }
}

fn bad(reason: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, reason.into())
}

fn skip<R: Read>(inner: &mut R, len: usize) -> io::Result<()> {
    io::copy(&mut inner.take(len as u64), &mut io::sink()).and_then(|n| {
        if n == len as u64 {
            Ok(())
        } else {
            Err(io::Error::from(io::ErrorKind::UnexpectedEof))
        }
    })
}

impl<R: Read> Read for LzopReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let mut written = 0;
        while written < buf.len() {
            let pending = self.buffer.len() - self.pos;
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

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal LZOP stream with every block stored (no compression), which
    /// exercises the full header and block framing.
    fn stored_stream(blocks: &[&[u8]]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&LZOP_MAGIC);
        out.extend_from_slice(&0x0940u16.to_be_bytes()); // version
        out.extend_from_slice(&0x2050u16.to_be_bytes()); // lib_version
        out.extend_from_slice(&0x0940u16.to_be_bytes()); // version_needed
        out.push(1); // method
        out.push(5); // level
        out.extend_from_slice(&(F_ADLER32_D).to_be_bytes()); // flags
        out.extend_from_slice(&0u32.to_be_bytes()); // mode
        out.extend_from_slice(&0u32.to_be_bytes()); // mtime_low
        out.extend_from_slice(&0u32.to_be_bytes()); // mtime_high
        out.push(0); // empty name
        out.extend_from_slice(&0u32.to_be_bytes()); // header checksum (unverified)
        for block in blocks {
            out.extend_from_slice(&(block.len() as u32).to_be_bytes());
            out.extend_from_slice(&(block.len() as u32).to_be_bytes());
            out.extend_from_slice(&0u32.to_be_bytes()); // d_adler32 (unverified)
            out.extend_from_slice(block);
        }
        out.extend_from_slice(&0u32.to_be_bytes()); // terminator
        out
    }

    #[test]
    fn stored_blocks_round_trip() {
        let stream = stored_stream(&[b"first block ", b"second block"]);
        let mut out = Vec::new();
        LzopReader::new(&stream[..])
            .unwrap()
            .read_to_end(&mut out)
            .unwrap();
        assert_eq!(out, b"first block second block");
    }

    #[test]
    fn bad_magic_is_rejected() {
        let err = LzopReader::new(&b"not an lzop stream"[..]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn oversized_compressed_length_is_rejected() {
        let mut stream = stored_stream(&[]);
        stream.truncate(stream.len() - 4); // drop the terminator
        stream.extend_from_slice(&4u32.to_be_bytes()); // uncompressed_len
        stream.extend_from_slice(&9u32.to_be_bytes()); // compressed_len > uncompressed
        let mut out = Vec::new();
        let err = LzopReader::new(&stream[..])
            .unwrap()
            .read_to_end(&mut out)
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
