//! Inode-reference table.
//!
//! References are the image's indirection for inodes renamed across
//! snapshots: the directory section lists such children by *position* into
//! this table rather than by inode id.  Each entry names the referred inode,
//! the snapshot the reference belongs to, and an optional name override.

use crate::proto::InodeReference;

#[derive(Debug, Clone)]
pub struct RefEntry {
    pub referred: u64,
    pub snapshot: u32,
    /// Name the referred inode carries under this reference's snapshot;
    /// empty when the reference does not override the live name.
    pub name: Vec<u8>,
}

/// Flat, positionally indexed reference table.
#[derive(Default)]
pub struct RefTable {
    entries: Vec<RefEntry>,
}

impl RefTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, reference: InodeReference) {
        self.entries.push(RefEntry {
            referred: reference.referred_id,
            snapshot: reference
                .last_snapshot_id
                .or(reference.dst_snapshot_id)
                .unwrap_or(0),
            name: reference.name,
        });
    }

    pub fn get(&self, index: u32) -> Option<&RefEntry> {
        self.entries.get(index as usize)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
