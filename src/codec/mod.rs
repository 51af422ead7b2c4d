//! Codec dispatch: Hadoop codec class name → byte-stream decoder.
//!
//! The image summary names one codec for every section (or none).  The name
//! is matched exactly against the fixed table below; anything else fails
//! hard — there is no fallback and no negotiation.
//!
//! | Codec class name | Decoder |
//! |---|---|
//! | *(empty)* | raw bytes |
//! | `org.apache.hadoop.io.compress.DefaultCodec` | zlib |
//! | `org.apache.hadoop.io.compress.GzipCodec` | gzip |
//! | `org.apache.hadoop.io.compress.BZip2Codec` | bzip2 |
//! | `org.apache.hadoop.io.compress.SnappyCodec` | block-framed snappy |
//! | `com.hadoop.compression.lzo.LzoCodec` | block-framed LZO1X |
//! | `com.hadoop.compression.lzo.LzopCodec` | LZOP stream |
//!
//! The two block-framed codecs share the re-chunking adapter in
//! [`block::BlockReader`]; LZOP carries its own container framing in
//! [`lzop::LzopReader`].

pub mod block;
pub mod lzop;

use std::io::{self, Read};
use thiserror::Error;

use block::{BlockCodec, BlockReader};
use lzop::LzopReader;

pub const CODEC_DEFAULT: &str = "org.apache.hadoop.io.compress.DefaultCodec";
pub const CODEC_GZIP: &str = "org.apache.hadoop.io.compress.GzipCodec";
pub const CODEC_BZIP2: &str = "org.apache.hadoop.io.compress.BZip2Codec";
pub const CODEC_SNAPPY: &str = "org.apache.hadoop.io.compress.SnappyCodec";
pub const CODEC_LZO: &str = "com.hadoop.compression.lzo.LzoCodec";
pub const CODEC_LZOP: &str = "com.hadoop.compression.lzo.LzopCodec";

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("unsupported compression codec {0:?}")]
    Unsupported(String),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Wrap `inner` in the decoder for `codec`.
///
/// `codec` must be non-empty; the raw path never goes through a decoder so
/// that it can stay byte-accounted against the section length.
pub fn decoder<'a, R: Read + 'a>(codec: &str, inner: R) -> Result<Box<dyn Read + 'a>, CodecError> {
    match codec {
        CODEC_DEFAULT => Ok(Box::new(flate2::read::ZlibDecoder::new(inner))),
        CODEC_GZIP => Ok(Box::new(flate2::read::GzDecoder::new(inner))),
        CODEC_BZIP2 => Ok(Box::new(bzip2::read::BzDecoder::new(inner))),
        CODEC_SNAPPY => Ok(Box::new(BlockReader::new(inner, BlockCodec::Snappy))),
        CODEC_LZO => Ok(Box::new(BlockReader::new(inner, BlockCodec::Lzo))),
        CODEC_LZOP => Ok(Box::new(LzopReader::new(inner)?)),
        other => Err(CodecError::Unsupported(other.to_string())),
    }
}
