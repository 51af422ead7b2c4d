//! Versioned directory tree.
//!
//! Every inode owns an ordered set of *placements* — `(snapshot, parent,
//! name)` tuples, at most one per snapshot id.  Snapshot 0 is the live view;
//! a non-zero placement records where the inode sat when that snapshot was
//! taken.  The loader writes placements across its passes, then the tree is
//! read-only for path resolution.
//!
//! # Storage
//!
//! Placements live in a slab arena (100 000 records per slab) and are
//! addressed by `u32` handles, so growing the arena never moves a record.
//! Each inode's placements form an intrusive singly-linked chain through the
//! arena, in insertion order; the id → chain-head map stores one handle per
//! inode.  Most inodes have exactly one placement.

use std::collections::HashMap;
use thiserror::Error;

/// Well-known id of the filesystem root directory.
pub const ROOT_INODE: u64 = 16385;

/// Placement records allocated per arena slab.
pub const SLAB_LEN: usize = 100_000;

/// Chain terminator handle.
const NIL: u32 = u32::MAX;

#[derive(Error, Debug)]
pub enum TreeError {
    #[error("name recorded for unknown inode {0}")]
    UnknownInode(u64),
}

#[derive(Debug, Clone)]
pub struct Placement {
    /// 0 = live view.
    pub snapshot: u32,
    pub parent: u64,
    /// Raw name bytes; empty until a naming pass fills it.
    pub name: Vec<u8>,
    next: u32,
}

#[derive(Default)]
pub struct NodeTree {
    slabs: Vec<Vec<Placement>>,
    heads: HashMap<u64, u32>,
}

impl NodeTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of inodes with at least one placement.
    pub fn len(&self) -> usize {
        self.heads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heads.is_empty()
    }

    fn alloc(&mut self, placement: Placement) -> u32 {
        if self.slabs.last().map_or(true, |s| s.len() == SLAB_LEN) {
            self.slabs.push(Vec::with_capacity(SLAB_LEN));
        }
        let slab_index = self.slabs.len() - 1;
        let slab = &mut self.slabs[slab_index];
        let handle = (slab_index * SLAB_LEN + slab.len()) as u32;
        slab.push(placement);
        handle
    }

    fn slot(&self, handle: u32) -> &Placement {
        let i = handle as usize;
        &self.slabs[i / SLAB_LEN][i % SLAB_LEN]
    }

    fn slot_mut(&mut self, handle: u32) -> &mut Placement {
        let i = handle as usize;
        &mut self.slabs[i / SLAB_LEN][i % SLAB_LEN]
    }

    /// Record `parent` for `key` under `snapshot`, overwriting the parent of
    /// an existing placement for that snapshot or appending a new one.
    pub fn set_parent(&mut self, key: u64, snapshot: u32, parent: u64) {
        let Some(head) = self.heads.get(&key).copied() else {
            let handle = self.alloc(Placement {
                snapshot,
                parent,
                name: Vec::new(),
                next: NIL,
            });
            self.heads.insert(key, handle);
            return;
        };
        let mut handle = head;
        loop {
            let (snap, next) = {
                let p = self.slot(handle);
                (p.snapshot, p.next)
            };
            if snap == snapshot {
                self.slot_mut(handle).parent = parent;
                return;
            }
            if next == NIL {
                break;
            }
            handle = next;
        }
        let appended = self.alloc(Placement {
            snapshot,
            parent,
            name: Vec::new(),
            next: NIL,
        });
        self.slot_mut(handle).next = appended;
    }

    /// Record `name` for `key` under `snapshot`.
    ///
    /// When no placement exists for that exact snapshot, the name is filled
    /// into every placement of `key` that is still unnamed — snapshot passes
    /// leave placeholders that the naming pass completes this way.  A name
    /// for an inode the tree has never seen means the image is corrupt.
    /// The root has no name; calls for it are ignored.
    pub fn set_name(&mut self, key: u64, snapshot: u32, name: &[u8]) -> Result<(), TreeError> {
        if key == ROOT_INODE {
            return Ok(());
        }
        let head = self
            .heads
            .get(&key)
            .copied()
            .ok_or(TreeError::UnknownInode(key))?;

        let mut handle = head;
        loop {
            let (snap, next) = {
                let p = self.slot(handle);
                (p.snapshot, p.next)
            };
            if snap == snapshot {
                self.slot_mut(handle).name = name.to_vec();
                return Ok(());
            }
            if next == NIL {
                break;
            }
            handle = next;
        }

        let mut handle = head;
        loop {
            let next = {
                let p = self.slot_mut(handle);
                if p.name.is_empty() {
                    p.name = name.to_vec();
                }
                p.next
            };
            if next == NIL {
                return Ok(());
            }
            handle = next;
        }
    }

    /// All placements of `key`, in insertion order.
    pub fn placements(&self, key: u64) -> Placements<'_> {
        Placements {
            tree: self,
            handle: self.heads.get(&key).copied().unwrap_or(NIL),
        }
    }

    /// The placement for exactly `(key, snapshot)`.
    pub fn exact(&self, key: u64, snapshot: u32) -> Option<&Placement> {
        self.placements(key).find(|p| p.snapshot == snapshot)
    }

    /// The live placement of `key`.
    pub fn live(&self, key: u64) -> Option<&Placement> {
        self.exact(key, 0)
    }

    /// The placement of `key` with the numerically largest snapshot id.
    pub fn max_snapshot(&self, key: u64) -> Option<&Placement> {
        self.placements(key).max_by_key(|p| p.snapshot)
    }
}

pub struct Placements<'a> {
    tree: &'a NodeTree,
    handle: u32,
}

impl<'a> Iterator for Placements<'a> {
    type Item = &'a Placement;

    fn next(&mut self) -> Option<&'a Placement> {
        if self.handle == NIL {
            return None;
        }
        let p = self.tree.slot(self.handle);
        self.handle = p.next;
        Some(p)
    }
}
