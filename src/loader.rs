//! Image loader: the section passes that build the trees, then emission.
//!
//! Pass order is fixed — string table, references, directory tree, snapshot
//! diffs, directory names, snapshot roots — and only then are records
//! emitted.  Directory names must land before snapshot roots (inline
//! snapshot paths splice the live name) and both must land before emission;
//! everything naming a parent must follow the directory-tree pass.
//!
//! Each pass owns one [`FrameReader`] and consumes its section to `Eof`.
//! Any other error is fatal and reported with the section name, plus the
//! inode or reference id when one is at hand.

use prost::Message;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use thiserror::Error;

use crate::codec::CodecError;
use crate::emit;
use crate::frame::{FrameError, FrameReader};
use crate::proto::{
    CreatedListEntry, DiffEntry, DiffType, DirEntry, DirectoryDiff, FileDiff, Inode,
    InodeReference, InodeSection, Snapshot, SnapshotSection, StringTableEntry, StringTableSection,
};
use crate::refs::RefTable;
use crate::resolve::{self, ResolveError};
use crate::summary::{
    ImageSummary, Section, SummaryError, SECTION_INODE, SECTION_INODE_DIR,
    SECTION_INODE_REFERENCE, SECTION_SNAPSHOT, SECTION_SNAPSHOT_DIFF, SECTION_STRING_TABLE,
};
use crate::tree::{NodeTree, TreeError, ROOT_INODE};

#[derive(Debug, Clone, Default)]
pub struct DumpOptions {
    /// Attach snapshot roots under a virtual `(snapshot)` directory instead
    /// of inline `.snapshot` paths.
    pub snap_replace: bool,
    /// Collapse each file to a single current-state path and drop
    /// snapshot-only directory paths.
    pub snap_cleanup: bool,
    /// Static fields merged into every output record.
    pub extra_fields: Map<String, Value>,
}

#[derive(Error, Debug)]
pub enum DumpError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Summary(#[from] SummaryError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("required section {0} is missing from the image summary")]
    MissingSection(&'static str),
    #[error("{section} section: {source}")]
    Frame {
        section: &'static str,
        #[source]
        source: FrameError,
    },
    #[error("{section} section: {source}")]
    Tree {
        section: &'static str,
        #[source]
        source: TreeError,
    },
    #[error("{section} section: reference index {index} out of range ({len} entries)")]
    BadRefIndex {
        section: &'static str,
        index: u32,
        len: usize,
    },
    #[error("snapshot {snapshot}: root inode {inode} is not a directory")]
    FileSnapshotRoot { snapshot: u32, inode: u64 },
    #[error("snapshot {snapshot}: root inode {inode} has no live placement")]
    DetachedSnapshotRoot { snapshot: u32, inode: u64 },
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error("JSON encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

fn frame_err(section: &'static str) -> impl Fn(FrameError) -> DumpError {
    move |source| DumpError::Frame { section, source }
}

fn tree_err(section: &'static str) -> impl Fn(TreeError) -> DumpError {
    move |source| DumpError::Tree { section, source }
}

/// Decode the image at `path` and write one JSON record per inode path to
/// `out`.  Returns the number of records written.
pub fn dump<W: Write>(path: &Path, options: &DumpOptions, out: &mut W) -> Result<u64, DumpError> {
    let file = File::open(path)?;
    let file_len = file.metadata()?.len();
    let summary = ImageSummary::read(&file, file_len)?;
    log::debug!(
        "image {} ({} bytes, layout {}, codec {:?})",
        path.display(),
        file_len,
        summary.layout_version,
        summary.codec
    );

    let image = Image {
        file: &file,
        summary: &summary,
    };

    let strings = load_string_table(&mut image.require(SECTION_STRING_TABLE)?)?;

    let mut refs = RefTable::new();
    if let Some(mut fr) = image.open(SECTION_INODE_REFERENCE)? {
        load_references(&mut fr, &mut refs)?;
    }

    let mut tree = NodeTree::new();
    load_directory_tree(&mut image.require(SECTION_INODE_DIR)?, &refs, &mut tree)?;

    if let Some(mut fr) = image.open(SECTION_SNAPSHOT_DIFF)? {
        load_snapshot_diffs(&mut fr, &refs, &mut tree)?;
    }

    load_directory_names(&mut image.require(SECTION_INODE)?, &mut tree)?;

    if let Some(mut fr) = image.open(SECTION_SNAPSHOT)? {
        load_snapshot_roots(&mut fr, &mut tree, options.snap_replace)?;
    }

    let result = emit::emit_records(
        &mut image.require(SECTION_INODE)?,
        &tree,
        &strings,
        options,
        out,
    );
    result
}

/// Opens per-section frame readers against one image file.
struct Image<'a> {
    file: &'a File,
    summary: &'a ImageSummary,
}

impl<'a> Image<'a> {
    fn open(&self, name: &'static str) -> Result<Option<FrameReader<'a>>, DumpError> {
        let Some(Section { offset, length }) = self.summary.section(name) else {
            log::debug!("section {name} not present");
            return Ok(None);
        };
        Ok(Some(FrameReader::open(
            self.file,
            offset,
            length,
            &self.summary.codec,
        )?))
    }

    fn require(&self, name: &'static str) -> Result<FrameReader<'a>, DumpError> {
        self.open(name)?.ok_or(DumpError::MissingSection(name))
    }
}

/// Pass 1: id → string mapping used for user and group names.
fn load_string_table(fr: &mut FrameReader) -> Result<HashMap<u32, String>, DumpError> {
    let ctx = frame_err(SECTION_STRING_TABLE);
    let header: StringTableSection = fr.read_message().map_err(&ctx)?;
    let mut strings = HashMap::with_capacity(header.num_entry as usize);
    loop {
        let entry: StringTableEntry = match fr.read_message() {
            Ok(e) => e,
            Err(FrameError::Eof) => break,
            Err(e) => return Err(ctx(e)),
        };
        strings.insert(entry.id, entry.str);
    }
    log::debug!("string table: {} entries", strings.len());
    Ok(strings)
}

/// Pass 2: the positionally indexed reference table.
fn load_references(fr: &mut FrameReader, refs: &mut RefTable) -> Result<(), DumpError> {
    let ctx = frame_err(SECTION_INODE_REFERENCE);
    loop {
        let reference: InodeReference = match fr.read_message() {
            Ok(r) => r,
            Err(FrameError::Eof) => break,
            Err(e) => return Err(ctx(e)),
        };
        refs.push(reference);
    }
    log::debug!("reference table: {} entries", refs.len());
    Ok(())
}

/// Pass 3: live parent links, with reference children dereferenced through
/// the table onto their snapshot-scoped placements.
fn load_directory_tree(
    fr: &mut FrameReader,
    refs: &RefTable,
    tree: &mut NodeTree,
) -> Result<(), DumpError> {
    let ctx = frame_err(SECTION_INODE_DIR);
    loop {
        let entry: DirEntry = match fr.read_message() {
            Ok(e) => e,
            Err(FrameError::Eof) => break,
            Err(e) => return Err(ctx(e)),
        };
        for &child in &entry.children {
            tree.set_parent(child, 0, entry.parent);
        }
        for &index in &entry.ref_children {
            let r = refs.get(index).ok_or(DumpError::BadRefIndex {
                section: SECTION_INODE_DIR,
                index,
                len: refs.len(),
            })?;
            tree.set_parent(r.referred, r.snapshot, entry.parent);
        }
    }
    log::debug!("directory tree: {} inodes", tree.len());
    Ok(())
}

/// Pass 4: snapshot-scoped placements for inodes deleted or moved since a
/// snapshot was taken.
fn load_snapshot_diffs(
    fr: &mut FrameReader,
    refs: &RefTable,
    tree: &mut NodeTree,
) -> Result<(), DumpError> {
    let ctx = frame_err(SECTION_SNAPSHOT_DIFF);

    // The section sometimes opens with a header frame and sometimes goes
    // straight into entries; a first frame without a valid entry type is
    // the header.
    let mut pending: Option<DiffEntry> = None;
    match fr.read_message::<DiffEntry>() {
        Ok(first) => {
            if DiffType::try_from(first.r#type).is_ok() {
                pending = Some(first);
            }
        }
        Err(FrameError::Eof) => return Ok(()),
        Err(e) => return Err(ctx(e)),
    }

    loop {
        let entry = match pending.take() {
            Some(e) => e,
            None => match fr.read_message::<DiffEntry>() {
                Ok(e) => e,
                Err(FrameError::Eof) => break,
                Err(e) => return Err(ctx(e)),
            },
        };
        let diff_type = DiffType::try_from(entry.r#type).map_err(|_| {
            ctx(FrameError::Broken {
                reason: format!(
                    "diff entry for inode {} has unknown type {}",
                    entry.inode_id, entry.r#type
                ),
            })
        })?;

        for _ in 0..entry.num_of_diff {
            match diff_type {
                DiffType::FileDiff => {
                    // File diffs carry no placement information.
                    let _: FileDiff = fr.read_message().map_err(&ctx)?;
                }
                DiffType::DirectoryDiff => {
                    let diff: DirectoryDiff = fr.read_message().map_err(&ctx)?;
                    for &deleted in &diff.deleted_inode {
                        tree.set_parent(deleted, diff.snapshot_id, entry.inode_id);
                        if !diff.name.is_empty() {
                            tree.set_name(deleted, diff.snapshot_id, &diff.name)
                                .map_err(tree_err(SECTION_SNAPSHOT_DIFF))?;
                        }
                    }
                    for &index in &diff.deleted_inode_ref {
                        let r = refs.get(index).ok_or(DumpError::BadRefIndex {
                            section: SECTION_SNAPSHOT_DIFF,
                            index,
                            len: refs.len(),
                        })?;
                        tree.set_parent(r.referred, diff.snapshot_id, entry.inode_id);
                        if !r.name.is_empty() {
                            tree.set_name(r.referred, diff.snapshot_id, &r.name)
                                .map_err(tree_err(SECTION_SNAPSHOT_DIFF))?;
                        }
                    }
                    for _ in 0..diff.created_list_size {
                        // Created-list entries only matter to the live view.
                        let _: CreatedListEntry = fr.read_message().map_err(&ctx)?;
                    }
                }
            }
        }
    }
    Ok(())
}

/// Pass 5: directory names.  Parent links know ids only; names live on the
/// inode records, so directories are named from the inode section.
fn load_directory_names(fr: &mut FrameReader, tree: &mut NodeTree) -> Result<(), DumpError> {
    let ctx = frame_err(SECTION_INODE);
    let _header: InodeSection = fr.read_message().map_err(&ctx)?;
    loop {
        let body = match fr.read_frame() {
            Ok(b) => b,
            Err(FrameError::Eof) => break,
            Err(e) => return Err(ctx(e)),
        };
        // Files open with `field 1 = varint 1`; skip them without a decode.
        if body.len() >= 2 && body[0] == 0x08 && body[1] == 0x01 {
            continue;
        }
        let inode = Inode::decode(body).map_err(|e| ctx(e.into()))?;
        if inode.directory.is_some() {
            tree.set_name(inode.id, 0, &inode.name)
                .map_err(tree_err(SECTION_INODE))?;
        }
    }
    Ok(())
}

/// Pass 6: attach each snapshot root so snapshot-scoped placements resolve
/// to visible paths.
///
/// Inline mode splices `<live name>/.snapshot/<snapshot name>` under the
/// root directory's live parent; virtual mode rewrites the whole path to
/// `(snapshot)/<snapshot name><live path>` under the filesystem root.
fn load_snapshot_roots(
    fr: &mut FrameReader,
    tree: &mut NodeTree,
    snap_replace: bool,
) -> Result<(), DumpError> {
    let ctx = frame_err(SECTION_SNAPSHOT);
    let header: SnapshotSection = fr.read_message().map_err(&ctx)?;
    log::debug!("snapshot section: {} snapshots", header.num_snapshots);

    loop {
        let snapshot: Snapshot = match fr.read_message() {
            Ok(s) => s,
            Err(FrameError::Eof) => break,
            Err(e) => return Err(ctx(e)),
        };
        let Snapshot { snapshot_id, root } = snapshot;
        let root = root.ok_or_else(|| {
            ctx(FrameError::Broken {
                reason: format!("snapshot {snapshot_id} has no root inode"),
            })
        })?;
        if root.directory.is_none() {
            return Err(DumpError::FileSnapshotRoot {
                snapshot: snapshot_id,
                inode: root.id,
            });
        }
        if root.id == ROOT_INODE {
            // The resolver short-circuits the root by id, so a snapshot of /
            // cannot carry a distinct snapshot path.
            log::warn!("snapshot {snapshot_id} is rooted at /; its paths collapse to live paths");
            continue;
        }

        let live = tree
            .live(root.id)
            .ok_or(DumpError::DetachedSnapshotRoot {
                snapshot: snapshot_id,
                inode: root.id,
            })?;
        if live.name.is_empty() {
            return Err(ResolveError::EmptyName {
                inode: root.id,
                snapshot: 0,
            }
            .into());
        }

        let (parent, name) = if snap_replace {
            let prefix = resolve::parent_prefix(tree, live.parent, 0)?;
            let mut name = b"(snapshot)/".to_vec();
            name.extend_from_slice(&root.name);
            name.extend_from_slice(prefix.as_bytes());
            name.push(b'/');
            name.extend_from_slice(&live.name);
            (ROOT_INODE, name)
        } else {
            let mut name = live.name.clone();
            name.extend_from_slice(b"/.snapshot/");
            name.extend_from_slice(&root.name);
            (live.parent, name)
        };

        tree.set_parent(root.id, snapshot_id, parent);
        tree.set_name(root.id, snapshot_id, &name)
            .map_err(tree_err(SECTION_SNAPSHOT))?;
    }
    Ok(())
}
