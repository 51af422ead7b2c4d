//! Path resolution over the versioned tree.
//!
//! An inode resolves to one absolute path per placement.  The leaf name is
//! the placement's own name when set, else the inode's live name.  Parents
//! are resolved under the placement's snapshot with a three-step fallback:
//! exact snapshot, then live, then the placement with the numerically
//! largest snapshot id — in which case resolution continues under *that*
//! snapshot.  The largest-id rule is a heuristic; it is kept deterministic
//! by always choosing the numeric maximum.
//!
//! Chains ending at the root yield ordinary absolute paths; chains that fall
//! off the tree (parent id 0, or an inode with no placements) are prefixed
//! `/(unknown)`.

use thiserror::Error;

use crate::tree::{NodeTree, Placement, ROOT_INODE};

/// Upper bound on parent-chain length; guards against cycles in corrupt
/// images.
const MAX_DEPTH: usize = 4096;

const UNKNOWN_PREFIX: &str = "/(unknown)";

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("inode {inode}: empty name on placement for snapshot {snapshot}")]
    EmptyName { inode: u64, snapshot: u32 },
    #[error("inode {inode}: parent chain exceeds {MAX_DEPTH} levels")]
    DepthExceeded { inode: u64 },
}

/// Resolve every path of `key`.
///
/// With `snap_cleanup`, a file keeps only its live placement when one
/// exists, else only the placement with the largest snapshot id, and a
/// directory keeps only live placements.  An inode with no surviving
/// placement synthesizes `/(unknown)/<live_name>` — except directories in
/// cleanup mode, which yield nothing.
pub fn resolve_paths(
    tree: &NodeTree,
    key: u64,
    live_name: &[u8],
    is_directory: bool,
    snap_cleanup: bool,
) -> Result<Vec<String>, ResolveError> {
    if key == ROOT_INODE {
        return Ok(vec!["/".to_string()]);
    }

    let mut placements: Vec<&Placement> = tree.placements(key).collect();
    if snap_cleanup {
        if is_directory {
            placements.retain(|p| p.snapshot == 0);
        } else if placements.len() > 1 {
            if placements.iter().any(|p| p.snapshot == 0) {
                placements.retain(|p| p.snapshot == 0);
            } else {
                let max = placements.iter().map(|p| p.snapshot).max().unwrap();
                placements.retain(|p| p.snapshot == max);
            }
        }
    }

    let mut paths = Vec::with_capacity(placements.len());
    for placement in placements {
        let name: &[u8] = if placement.name.is_empty() {
            live_name
        } else {
            &placement.name
        };
        if name.is_empty() {
            return Err(ResolveError::EmptyName {
                inode: key,
                snapshot: placement.snapshot,
            });
        }
        let prefix = parent_prefix(tree, placement.parent, placement.snapshot)?;
        paths.push(format!("{}/{}", prefix, String::from_utf8_lossy(name)));
    }

    if paths.is_empty() {
        if snap_cleanup && is_directory {
            return Ok(paths);
        }
        paths.push(format!(
            "{UNKNOWN_PREFIX}/{}",
            String::from_utf8_lossy(live_name)
        ));
    }
    Ok(paths)
}

/// Resolve the absolute path of `parent` under `snapshot`.
///
/// Returns `""` for the root, so callers can always append `/<name>`.
pub(crate) fn parent_prefix(
    tree: &NodeTree,
    mut parent: u64,
    mut snapshot: u32,
) -> Result<String, ResolveError> {
    let mut parts: Vec<Vec<u8>> = Vec::new();
    let unknown = loop {
        if parent == ROOT_INODE {
            break false;
        }
        if parent == 0 {
            break true;
        }
        if parts.len() >= MAX_DEPTH {
            return Err(ResolveError::DepthExceeded { inode: parent });
        }
        let placement = match tree.exact(parent, snapshot) {
            Some(p) => p,
            None => match tree.live(parent) {
                Some(p) => p,
                None => match tree.max_snapshot(parent) {
                    Some(p) => {
                        snapshot = p.snapshot;
                        p
                    }
                    None => break true,
                },
            },
        };
        if placement.name.is_empty() {
            return Err(ResolveError::EmptyName {
                inode: parent,
                snapshot: placement.snapshot,
            });
        }
        parts.push(placement.name.clone());
        parent = placement.parent;
    };

    let mut prefix = String::new();
    if unknown {
        prefix.push_str(UNKNOWN_PREFIX);
    }
    for part in parts.iter().rev() {
        prefix.push('/');
        prefix.push_str(&String::from_utf8_lossy(part));
    }
    Ok(prefix)
}
