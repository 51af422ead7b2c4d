//! Framed record decoder over one image section.
//!
//! Every section is a run of `uvarint length | payload` frames holding
//! protobuf messages.  A [`FrameReader`] wraps the byte range of one section
//! — raw, or behind the codec the summary names — and hands out frames from
//! a single scratch buffer.
//!
//! # End-of-section rules
//!
//! `Eof` is only legitimate at a frame boundary; it is how every per-section
//! loop terminates.  Anything else — a truncated varint, a frame overrunning
//! the section, the stream dying inside a payload — is `Broken`.  The raw
//! path enforces this against the section's declared length; the compressed
//! paths rely on the codec stream ending naturally.
//!
//! # Scratch buffer
//!
//! One 10 MiB buffer per reader absorbs every frame payload.  The slice
//! returned by [`FrameReader::read_frame`] aliases it and is only valid
//! until the next read; the borrow checker enforces exactly that.

use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use thiserror::Error;

use crate::codec::{self, CodecError};

/// Scratch buffer size; a frame larger than this is treated as corruption.
pub const SCRATCH_CAPACITY: usize = 10 * 1024 * 1024;

/// Longest legal protobuf varint.
const MAX_VARINT_LEN: usize = 10;

#[derive(Error, Debug)]
pub enum FrameError {
    /// Clean end of the section at a frame boundary.
    #[error("end of section")]
    Eof,
    #[error("broken section: {reason}")]
    Broken { reason: String },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("protobuf decode error: {0}")]
    Decode(#[from] prost::DecodeError),
}

fn broken(reason: impl Into<String>) -> FrameError {
    FrameError::Broken {
        reason: reason.into(),
    }
}

pub struct FrameReader<'a> {
    reader: Box<dyn Read + 'a>,
    buffer: Vec<u8>,
    /// Declared section length for the raw path; `None` when a codec stream
    /// delimits itself.
    limit: Option<u64>,
    consumed: u64,
}

impl<'a> FrameReader<'a> {
    /// Reader over an uncompressed byte range of the image.
    pub fn raw(file: &'a File, offset: u64, length: u64) -> io::Result<Self> {
        let mut f = file;
        f.seek(SeekFrom::Start(offset))?;
        Ok(Self::sized(BufReader::new(f.take(length)), length))
    }

    /// Reader over a section, behind the image's codec when one is set.
    pub fn open(file: &'a File, offset: u64, length: u64, codec: &str) -> Result<Self, CodecError> {
        if codec.is_empty() {
            return Ok(Self::raw(file, offset, length)?);
        }
        let mut f = file;
        f.seek(SeekFrom::Start(offset))?;
        let inner = BufReader::new(f.take(length));
        Ok(Self::streaming(codec::decoder(codec, inner)?))
    }

    pub fn sized(reader: impl Read + 'a, length: u64) -> Self {
        Self {
            reader: Box::new(reader),
            buffer: vec![0u8; SCRATCH_CAPACITY],
            limit: Some(length),
            consumed: 0,
        }
    }

    pub fn streaming(reader: impl Read + 'a) -> Self {
        Self {
            reader: Box::new(reader),
            buffer: vec![0u8; SCRATCH_CAPACITY],
            limit: None,
            consumed: 0,
        }
    }

    /// Decode one unsigned varint (1–10 bytes).
    ///
    /// `Eof` can only surface before the first byte; running dry inside a
    /// varint is corruption.
    pub fn read_uvarint(&mut self) -> Result<u64, FrameError> {
        if let Some(limit) = self.limit {
            if self.consumed >= limit {
                return Err(FrameError::Eof);
            }
        }
        let mut value: u64 = 0;
        for i in 0..MAX_VARINT_LEN {
            if i > 0 {
                if let Some(limit) = self.limit {
                    if self.consumed >= limit {
                        return Err(broken("section ended inside a varint"));
                    }
                }
            }
            let mut byte = [0u8; 1];
            let n = self.reader.read(&mut byte)?;
            if n == 0 {
                return Err(match (i, self.limit) {
                    (0, None) => FrameError::Eof,
                    (0, Some(_)) => broken("section shorter than its declared length"),
                    _ => broken("stream ended inside a varint"),
                });
            }
            self.consumed += 1;
            value |= u64::from(byte[0] & 0x7f) << (7 * i as u32);
            if byte[0] & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(broken("varint longer than 10 bytes"))
    }

    /// Read one `uvarint length | payload` frame.
    ///
    /// The returned slice aliases the scratch buffer and is invalidated by
    /// the next read on this reader.
    pub fn read_frame(&mut self) -> Result<&[u8], FrameError> {
        let length = self.read_uvarint()?;
        if length > self.buffer.len() as u64 {
            return Err(broken(format!(
                "frame of {length} bytes exceeds the {} byte scratch buffer",
                self.buffer.len()
            )));
        }
        if let Some(limit) = self.limit {
            if self.consumed + length > limit {
                return Err(broken(format!(
                    "frame of {length} bytes overruns the section ({} bytes left)",
                    limit - self.consumed
                )));
            }
        }
        let len = length as usize;
        self.reader
            .read_exact(&mut self.buffer[..len])
            .map_err(|e| match e.kind() {
                io::ErrorKind::UnexpectedEof => broken("section ended inside a frame"),
                _ => FrameError::Io(e),
            })?;
        self.consumed += length;
        Ok(&self.buffer[..len])
    }

    /// Read one frame and decode it as a protobuf message.
    pub fn read_message<M: prost::Message + Default>(&mut self) -> Result<M, FrameError> {
        let body = self.read_frame()?;
        Ok(M::decode(body)?)
    }
}
