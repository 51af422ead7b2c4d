//! Record emission: one JSON object per resolved inode path.
//!
//! Streams the inode section a second time and writes JSON Lines to the
//! output.  Formatted timestamps are UTC; the raw epoch-millisecond fields
//! are emitted alongside.  User-supplied extra fields are merged into every
//! record with the record's own fields winning on collision.  Symlinks are
//! skipped.

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::io::Write;

use chrono::TimeZone;

use crate::frame::{FrameError, FrameReader};
use crate::loader::{DumpError, DumpOptions};
use crate::proto::{Inode, InodeSection};
use crate::resolve::resolve_paths;
use crate::summary::SECTION_INODE;
use crate::tree::NodeTree;

const PERM_TRIPLET: [&str; 8] = ["---", "--x", "-w-", "-wx", "r--", "r-x", "rw-", "rwx"];

/// Unix-style permission string: `d`/`-` kind prefix plus the three rwx
/// triplets from the low mode bits of the packed permission word.
fn permission_string(kind: char, permission: u64) -> String {
    let mode = (permission & 0xffff) & 0x1ff;
    format!(
        "{kind}{}{}{}",
        PERM_TRIPLET[((mode >> 6) & 7) as usize],
        PERM_TRIPLET[((mode >> 3) & 7) as usize],
        PERM_TRIPLET[(mode & 7) as usize],
    )
}

/// User id lives in bits 63:40 of the permission word.
fn user_name(strings: &HashMap<u32, String>, permission: u64) -> String {
    strings
        .get(&((permission >> 40) as u32))
        .cloned()
        .unwrap_or_default()
}

/// Group id lives in bits 39:16 of the permission word.
fn group_name(strings: &HashMap<u32, String>, permission: u64) -> String {
    strings
        .get(&(((permission >> 16) & 0x00ff_ffff) as u32))
        .cloned()
        .unwrap_or_default()
}

fn format_timestamp(ms: u64) -> String {
    chrono::Utc
        .timestamp_millis_opt(ms as i64)
        .single()
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default()
}

/// Walk the inode section and emit one record per resolved path.  Returns
/// the number of records written.
pub fn emit_records<W: Write>(
    fr: &mut FrameReader,
    tree: &NodeTree,
    strings: &HashMap<u32, String>,
    options: &DumpOptions,
    out: &mut W,
) -> Result<u64, DumpError> {
    let ctx = |source| DumpError::Frame {
        section: SECTION_INODE,
        source,
    };
    let _header: InodeSection = fr.read_message().map_err(ctx)?;

    let mut emitted = 0u64;
    loop {
        let inode: Inode = match fr.read_message() {
            Ok(i) => i,
            Err(FrameError::Eof) => break,
            Err(e) => return Err(ctx(e)),
        };

        if let Some(file) = &inode.file {
            let file_size: u64 = file.blocks.iter().map(|b| b.num_bytes).sum();
            let paths = resolve_paths(tree, inode.id, &inode.name, false, options.snap_cleanup)?;
            for path in paths {
                let mut record = options.extra_fields.clone();
                record.insert("Path".into(), Value::String(path));
                record.insert("Replication".into(), file.replication.into());
                record.insert(
                    "ModificationTime".into(),
                    format_timestamp(file.modification_time).into(),
                );
                record.insert("ModificationTimeMs".into(), file.modification_time.into());
                record.insert(
                    "AccessTime".into(),
                    format_timestamp(file.access_time).into(),
                );
                record.insert("AccessTimeMs".into(), file.access_time.into());
                record.insert(
                    "PreferredBlockSize".into(),
                    file.preferred_block_size.into(),
                );
                record.insert("BlocksCount".into(), file.blocks.len().into());
                record.insert("FileSize".into(), file_size.into());
                record.insert("User".into(), user_name(strings, file.permission).into());
                record.insert("Group".into(), group_name(strings, file.permission).into());
                record.insert(
                    "Permission".into(),
                    permission_string('-', file.permission).into(),
                );
                write_record(out, record)?;
                emitted += 1;
            }
        } else if let Some(dir) = &inode.directory {
            let paths = resolve_paths(tree, inode.id, &inode.name, true, options.snap_cleanup)?;
            for path in paths {
                let mut record = options.extra_fields.clone();
                record.insert("Path".into(), Value::String(path));
                record.insert(
                    "ModificationTime".into(),
                    format_timestamp(dir.modification_time).into(),
                );
                record.insert("ModificationTimeMs".into(), dir.modification_time.into());
                record.insert("User".into(), user_name(strings, dir.permission).into());
                record.insert("Group".into(), group_name(strings, dir.permission).into());
                record.insert(
                    "Permission".into(),
                    permission_string('d', dir.permission).into(),
                );
                write_record(out, record)?;
                emitted += 1;
            }
        }
        // Symlink records carry no children and are not reported.
    }

    log::debug!("emitted {emitted} records");
    Ok(emitted)
}

fn write_record<W: Write>(out: &mut W, record: Map<String, Value>) -> Result<(), DumpError> {
    serde_json::to_writer(&mut *out, &Value::Object(record))?;
    out.write_all(b"\n")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_strings() {
        assert_eq!(permission_string('-', 0o644), "-rw-r--r--");
        assert_eq!(permission_string('d', 0o755), "drwxr-xr-x");
        assert_eq!(permission_string('-', 0o777), "-rwxrwxrwx");
        assert_eq!(permission_string('-', 0), "----------");
        // Only the low nine bits matter; sticky/setuid flags are dropped.
        assert_eq!(permission_string('-', 0o1644), "-rw-r--r--");
        // User and group ids in the high bits never leak into the mode.
        let packed = (7u64 << 40) | (9u64 << 16) | 0o600;
        assert_eq!(permission_string('-', packed), "-rw-------");
    }

    #[test]
    fn user_and_group_from_packed_word() {
        let mut strings = HashMap::new();
        strings.insert(7u32, "alice".to_string());
        strings.insert(9u32, "staff".to_string());
        let packed = (7u64 << 40) | (9u64 << 16) | 0o644;
        assert_eq!(user_name(&strings, packed), "alice");
        assert_eq!(group_name(&strings, packed), "staff");
        // Unknown ids render as empty strings.
        assert_eq!(user_name(&strings, 0), "");
    }

    #[test]
    fn timestamps_are_utc() {
        assert_eq!(format_timestamp(0), "1970-01-01 00:00:00");
        assert_eq!(format_timestamp(1_700_000_000_000), "2023-11-14 22:13:20");
    }
}
