//! Image summary — format anchor at the *end* of the file.
//!
//! # On-disk layout
//!
//! ```text
//! [ section payloads ... ]          raw or codec-compressed, back to back
//! [ FileSummary frame ]            uvarint length | protobuf, never compressed
//! [ summary_length ]               big-endian u32, last 4 bytes of the file
//! ```
//!
//! The `FileSummary` frame starts at `file_len - 4 - summary_length`.  It
//! names every section with its `(offset, length)` and carries the global
//! codec string; an empty codec string means the sections are stored raw.
//! Section payloads are either all raw or all compressed — there is no
//! per-section choice.

use byteorder::{BigEndian, ReadBytesExt};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Seek, SeekFrom};
use thiserror::Error;

use crate::frame::{FrameError, FrameReader};
use crate::proto::FileSummary;

pub const SECTION_STRING_TABLE: &str = "STRING_TABLE";
pub const SECTION_INODE: &str = "INODE";
pub const SECTION_INODE_DIR: &str = "INODE_DIR";
pub const SECTION_INODE_REFERENCE: &str = "INODE_REFERENCE";
pub const SECTION_SNAPSHOT: &str = "SNAPSHOT";
pub const SECTION_SNAPSHOT_DIFF: &str = "SNAPSHOT_DIFF";

#[derive(Error, Debug)]
pub enum SummaryError {
    #[error("file of {0} bytes is too short to hold an image summary")]
    TooShort(u64),
    #[error("summary length {summary_length} overruns the {file_len} byte file")]
    BadLength { summary_length: u32, file_len: u64 },
    #[error("summary frame at offset {offset}: {source}")]
    Frame {
        offset: u64,
        #[source]
        source: FrameError,
    },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Byte range of one section inside the image.
#[derive(Debug, Clone, Copy)]
pub struct Section {
    pub offset: u64,
    pub length: u64,
}

/// The decoded summary: section table plus the global codec string.
#[derive(Debug, Clone)]
pub struct ImageSummary {
    pub ondisk_version: u32,
    pub layout_version: u32,
    /// Hadoop codec class name; empty for uncompressed images.
    pub codec: String,
    sections: HashMap<String, Section>,
}

impl ImageSummary {
    /// Read the trailing big-endian length word, then decode the framed
    /// `FileSummary` message it points at.  The summary frame itself is
    /// always stored uncompressed.
    pub fn read(file: &File, file_len: u64) -> Result<Self, SummaryError> {
        if file_len < 4 {
            return Err(SummaryError::TooShort(file_len));
        }
        let mut f = file;
        f.seek(SeekFrom::Start(file_len - 4))?;
        let summary_length = f.read_u32::<BigEndian>()?;
        if u64::from(summary_length) + 4 > file_len {
            return Err(SummaryError::BadLength {
                summary_length,
                file_len,
            });
        }

        let offset = file_len - 4 - u64::from(summary_length);
        let mut fr = FrameReader::raw(file, offset, u64::from(summary_length))?;
        let summary: FileSummary = fr
            .read_message()
            .map_err(|source| SummaryError::Frame { offset, source })?;

        let mut sections = HashMap::with_capacity(summary.sections.len());
        for s in &summary.sections {
            log::debug!("section {} offset={} length={}", s.name, s.offset, s.length);
            sections.insert(
                s.name.clone(),
                Section {
                    offset: s.offset,
                    length: s.length,
                },
            );
        }

        Ok(Self {
            ondisk_version: summary.ondisk_version,
            layout_version: summary.layout_version,
            codec: summary.codec,
            sections,
        })
    }

    pub fn section(&self, name: &str) -> Option<Section> {
        self.sections.get(name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;
    use std::io::Write;

    fn write_image(sections: &[(&str, u64, u64)], codec: &str) -> tempfile::NamedTempFile {
        let summary = FileSummary {
            ondisk_version: 1,
            layout_version: 1,
            codec: codec.to_string(),
            sections: sections
                .iter()
                .map(|&(name, offset, length)| crate::proto::SummarySection {
                    name: name.to_string(),
                    offset,
                    length,
                })
                .collect(),
        };
        let mut frame = Vec::new();
        summary.encode_length_delimited(&mut frame).unwrap();

        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&[0u8; 32]).unwrap(); // stand-in section payloads
        tmp.write_all(&frame).unwrap();
        tmp.write_all(&(frame.len() as u32).to_be_bytes()).unwrap();
        tmp.flush().unwrap();
        tmp
    }

    #[test]
    fn reads_section_table_and_codec() {
        let tmp = write_image(
            &[("STRING_TABLE", 0, 10), ("INODE", 10, 22)],
            "org.apache.hadoop.io.compress.DefaultCodec",
        );
        let len = tmp.as_file().metadata().unwrap().len();
        let summary = ImageSummary::read(tmp.as_file(), len).unwrap();

        assert_eq!(summary.codec, "org.apache.hadoop.io.compress.DefaultCodec");
        let s = summary.section("INODE").unwrap();
        assert_eq!((s.offset, s.length), (10, 22));
        assert!(summary.section("SNAPSHOT").is_none());
    }

    #[test]
    fn short_file_is_rejected() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&[0u8; 2]).unwrap();
        tmp.flush().unwrap();
        let err = ImageSummary::read(tmp.as_file(), 2).unwrap_err();
        assert!(matches!(err, SummaryError::TooShort(2)));
    }

    #[test]
    fn overlong_summary_is_rejected() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&[0u8; 4]).unwrap();
        tmp.write_all(&1000u32.to_be_bytes()).unwrap();
        tmp.flush().unwrap();
        let err = ImageSummary::read(tmp.as_file(), 8).unwrap_err();
        assert!(matches!(err, SummaryError::BadLength { .. }));
    }
}
