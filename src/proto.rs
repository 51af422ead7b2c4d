//! Fixed on-disk protobuf schema of the fsimage (`hadoop.hdfs.fsimage`).
//!
//! Field numbers and wire types mirror Hadoop's `fsimage.proto` /
//! `hdfs.proto` and are frozen — the decoder consumes this schema, it never
//! negotiates it.  Only the messages this tool reads are declared; unknown
//! fields inside a frame are skipped by prost.
//!
//! Presence conventions: scalar fields decode to their zero default when
//! absent, which is how every consumer here treats them.  The two reference
//! snapshot-id fields keep explicit presence because "absent" and "0" mean
//! different things there.

/// Trailing image descriptor: section table plus the global codec name.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FileSummary {
    #[prost(uint32, tag = "1")]
    pub ondisk_version: u32,
    #[prost(uint32, tag = "2")]
    pub layout_version: u32,
    /// Empty string means the sections are stored uncompressed.
    #[prost(string, tag = "3")]
    pub codec: String,
    #[prost(message, repeated, tag = "4")]
    pub sections: Vec<SummarySection>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SummarySection {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(uint64, tag = "2")]
    pub length: u64,
    #[prost(uint64, tag = "3")]
    pub offset: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StringTableSection {
    #[prost(uint32, tag = "1")]
    pub num_entry: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StringTableEntry {
    #[prost(uint32, tag = "1")]
    pub id: u32,
    #[prost(string, tag = "2")]
    pub str: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InodeSection {
    #[prost(uint64, tag = "1")]
    pub last_inode_id: u64,
    #[prost(uint64, tag = "2")]
    pub num_inodes: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum InodeType {
    File = 1,
    Directory = 2,
    Symlink = 3,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Inode {
    #[prost(enumeration = "InodeType", tag = "1")]
    pub r#type: i32,
    #[prost(uint64, tag = "2")]
    pub id: u64,
    /// Raw name bytes — not necessarily UTF-8.
    #[prost(bytes = "vec", tag = "3")]
    pub name: Vec<u8>,
    #[prost(message, optional, tag = "4")]
    pub file: Option<InodeFile>,
    #[prost(message, optional, tag = "5")]
    pub directory: Option<InodeDirectory>,
    #[prost(message, optional, tag = "6")]
    pub symlink: Option<InodeSymlink>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InodeFile {
    #[prost(uint32, tag = "1")]
    pub replication: u32,
    #[prost(uint64, tag = "2")]
    pub modification_time: u64,
    #[prost(uint64, tag = "3")]
    pub access_time: u64,
    #[prost(uint64, tag = "4")]
    pub preferred_block_size: u64,
    /// Packed word: user id in bits 63:40, group id in 39:16, mode in 15:0.
    #[prost(fixed64, tag = "5")]
    pub permission: u64,
    #[prost(message, repeated, tag = "6")]
    pub blocks: Vec<Block>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InodeDirectory {
    #[prost(uint64, tag = "1")]
    pub modification_time: u64,
    #[prost(uint64, tag = "2")]
    pub ns_quota: u64,
    #[prost(uint64, tag = "3")]
    pub ds_quota: u64,
    #[prost(fixed64, tag = "4")]
    pub permission: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InodeSymlink {
    #[prost(fixed64, tag = "1")]
    pub permission: u64,
    #[prost(bytes = "vec", tag = "2")]
    pub target: Vec<u8>,
    #[prost(uint64, tag = "3")]
    pub modification_time: u64,
    #[prost(uint64, tag = "4")]
    pub access_time: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Block {
    #[prost(uint64, tag = "1")]
    pub block_id: u64,
    #[prost(uint64, tag = "2")]
    pub gen_stamp: u64,
    #[prost(uint64, tag = "3")]
    pub num_bytes: u64,
}

/// One parent directory with its child lists from the directory section.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DirEntry {
    #[prost(uint64, tag = "1")]
    pub parent: u64,
    #[prost(uint64, repeated, tag = "2")]
    pub children: Vec<u64>,
    /// Positional indexes into the inode-reference section.
    #[prost(uint32, repeated, tag = "3")]
    pub ref_children: Vec<u32>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InodeReference {
    #[prost(uint64, tag = "1")]
    pub referred_id: u64,
    /// Name override for the referred inode under the reference's snapshot.
    #[prost(bytes = "vec", tag = "2")]
    pub name: Vec<u8>,
    #[prost(uint32, optional, tag = "3")]
    pub dst_snapshot_id: Option<u32>,
    #[prost(uint32, optional, tag = "4")]
    pub last_snapshot_id: Option<u32>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SnapshotSection {
    #[prost(uint32, tag = "1")]
    pub snapshot_counter: u32,
    #[prost(uint64, repeated, tag = "2")]
    pub snapshottable_dir: Vec<u64>,
    #[prost(uint32, tag = "3")]
    pub num_snapshots: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Snapshot {
    #[prost(uint32, tag = "1")]
    pub snapshot_id: u32,
    /// Directory copy whose id is the snapshottable directory's id and whose
    /// name is the snapshot's name.
    #[prost(message, optional, tag = "2")]
    pub root: Option<Inode>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum DiffType {
    FileDiff = 1,
    DirectoryDiff = 2,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DiffEntry {
    #[prost(enumeration = "DiffType", tag = "1")]
    pub r#type: i32,
    #[prost(uint64, tag = "2")]
    pub inode_id: u64,
    #[prost(uint32, tag = "3")]
    pub num_of_diff: u32,
}

/// Read and discarded — file diffs carry no path information this tool uses.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FileDiff {
    #[prost(uint32, tag = "1")]
    pub snapshot_id: u32,
    #[prost(uint64, tag = "2")]
    pub file_size: u64,
    #[prost(bytes = "vec", tag = "3")]
    pub name: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DirectoryDiff {
    #[prost(uint32, tag = "1")]
    pub snapshot_id: u32,
    #[prost(uint32, tag = "2")]
    pub children_size: u32,
    #[prost(bool, tag = "3")]
    pub is_snapshot_root: bool,
    /// The directory's own name at snapshot time; empty unless its
    /// attributes changed after the snapshot was taken.
    #[prost(bytes = "vec", tag = "4")]
    pub name: Vec<u8>,
    #[prost(message, optional, tag = "5")]
    pub snapshot_copy: Option<InodeDirectory>,
    /// Count of CreatedListEntry frames that follow this message.
    #[prost(uint32, tag = "6")]
    pub created_list_size: u32,
    #[prost(uint64, repeated, tag = "7")]
    pub deleted_inode: Vec<u64>,
    #[prost(uint32, repeated, tag = "8")]
    pub deleted_inode_ref: Vec<u32>,
}

/// Read and discarded — created entries only affect the live view, which
/// the directory section already covers.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CreatedListEntry {
    #[prost(bytes = "vec", tag = "1")]
    pub name: Vec<u8>,
}
