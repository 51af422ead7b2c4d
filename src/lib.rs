//! # fsimage-dump — HDFS NameNode fsimage → JSON Lines
//!
//! Decodes the sectioned fsimage container and emits one JSON record per
//! file or directory, with its absolute path resolved through the image's
//! snapshot overlays.
//!
//! Decoding guarantees:
//! - Sections are located through the trailing `FileSummary`; the summary
//!   frame itself is always uncompressed
//! - One codec covers every section: raw, zlib, gzip, bzip2, block-framed
//!   snappy/LZO, or LZOP — an unknown codec name aborts, no fallback
//! - End-of-section is only legal at a frame boundary; a truncated varint
//!   or frame is reported as a broken section, never silently tolerated
//! - Each inode keeps one placement per snapshot id; resolution falls back
//!   exact snapshot → live view → largest snapshot id, deterministically
//! - Trees are built in fixed pass order and frozen before emission;
//!   everything runs single-threaded over one scratch buffer per section

pub mod codec;
pub mod emit;
pub mod frame;
pub mod loader;
pub mod proto;
pub mod refs;
pub mod resolve;
pub mod summary;
pub mod tree;

// Flat re-exports for the most common types.
pub use frame::{FrameError, FrameReader};
pub use loader::{dump, DumpError, DumpOptions};
pub use refs::{RefEntry, RefTable};
pub use resolve::{resolve_paths, ResolveError};
pub use summary::{ImageSummary, Section, SummaryError};
pub use tree::{NodeTree, Placement, TreeError, ROOT_INODE};
