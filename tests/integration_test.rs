use fsimage_dump::{dump, DumpOptions};
use fsimage_dump::proto::{
    Block, DiffEntry, DiffType, DirEntry, DirectoryDiff, Inode, InodeDirectory, InodeFile,
    InodeReference, InodeSection, InodeType, Snapshot, SnapshotSection, StringTableEntry,
    StringTableSection,
};
use prost::Message;
use serde_json::Value;
use std::io::Write;
use tempfile::NamedTempFile;

const ROOT: u64 = 16385;

// ── image construction ───────────────────────────────────────────────────────

fn frame<M: Message>(msg: &M) -> Vec<u8> {
    msg.encode_length_delimited_to_vec()
}

fn perm(user: u32, group: u32, mode: u64) -> u64 {
    (u64::from(user) << 40) | (u64::from(group) << 16) | mode
}

fn dir_inode(id: u64, name: &[u8], permission: u64) -> Inode {
    Inode {
        r#type: InodeType::Directory as i32,
        id,
        name: name.to_vec(),
        directory: Some(InodeDirectory {
            modification_time: 1_600_000_000_000,
            permission,
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn file_inode(id: u64, name: &[u8], permission: u64, block_sizes: &[u64]) -> Inode {
    Inode {
        r#type: InodeType::File as i32,
        id,
        name: name.to_vec(),
        file: Some(InodeFile {
            replication: 3,
            modification_time: 1_600_000_000_000,
            access_time: 1_600_000_100_000,
            preferred_block_size: 128 * 1024 * 1024,
            permission,
            blocks: block_sizes
                .iter()
                .enumerate()
                .map(|(i, &num_bytes)| Block {
                    block_id: 1000 + i as u64,
                    gen_stamp: 1,
                    num_bytes,
                })
                .collect(),
        }),
        ..Default::default()
    }
}

fn string_table(entries: &[(u32, &str)]) -> Vec<u8> {
    let mut out = frame(&StringTableSection {
        num_entry: entries.len() as u32,
    });
    for &(id, s) in entries {
        out.extend(frame(&StringTableEntry {
            id,
            str: s.to_string(),
        }));
    }
    out
}

fn inode_section(inodes: &[Inode]) -> Vec<u8> {
    let mut out = frame(&InodeSection {
        last_inode_id: 0,
        num_inodes: inodes.len() as u64,
    });
    for inode in inodes {
        out.extend(frame(inode));
    }
    out
}

fn dir_section(entries: &[DirEntry]) -> Vec<u8> {
    entries.iter().flat_map(|e| frame(e)).collect()
}

fn ref_section(refs: &[InodeReference]) -> Vec<u8> {
    refs.iter().flat_map(|r| frame(r)).collect()
}

fn snapshot_section(snapshots: &[(u32, Inode)]) -> Vec<u8> {
    let mut out = frame(&SnapshotSection {
        num_snapshots: snapshots.len() as u32,
        ..Default::default()
    });
    for (id, root) in snapshots {
        out.extend(frame(&Snapshot {
            snapshot_id: *id,
            root: Some(root.clone()),
        }));
    }
    out
}

/// Hadoop block framing: big blocks of `block_size` uncompressed bytes, each
/// split into snappy chunks of at most `chunk_size` bytes.
fn snappy_block_frame(data: &[u8], block_size: usize, chunk_size: usize) -> Vec<u8> {
    let mut out = Vec::new();
    for block in data.chunks(block_size) {
        out.extend_from_slice(&(block.len() as u32).to_be_bytes());
        for chunk in block.chunks(chunk_size) {
            let compressed = snap::raw::Encoder::new().compress_vec(chunk).unwrap();
            out.extend_from_slice(&(compressed.len() as u32).to_be_bytes());
            out.extend_from_slice(&compressed);
        }
    }
    out
}

struct ImageBuilder {
    codec: String,
    sections: Vec<(&'static str, Vec<u8>)>,
}

impl ImageBuilder {
    fn new() -> Self {
        Self {
            codec: String::new(),
            sections: Vec::new(),
        }
    }

    /// Compress every section as block-framed snappy, split into two big
    /// blocks of three chunks each.
    fn snappy(mut self) -> Self {
        self.codec = "org.apache.hadoop.io.compress.SnappyCodec".to_string();
        self
    }

    fn section(mut self, name: &'static str, payload: Vec<u8>) -> Self {
        self.sections.push((name, payload));
        self
    }

    fn build(self) -> NamedTempFile {
        let mut tmp = NamedTempFile::new().unwrap();
        let mut offset: u64 = 0;

        tmp.write_all(b"HDFSIMG1").unwrap();
        offset += 8;

        let mut summary = fsimage_dump::proto::FileSummary {
            ondisk_version: 1,
            layout_version: 1,
            codec: self.codec.clone(),
            sections: Vec::new(),
        };
        for (name, payload) in &self.sections {
            let on_disk = if self.codec.is_empty() {
                payload.clone()
            } else {
                let block = payload.len() / 2 + 1;
                let chunk = block / 3 + 1;
                snappy_block_frame(payload, block, chunk)
            };
            tmp.write_all(&on_disk).unwrap();
            summary.sections.push(fsimage_dump::proto::SummarySection {
                name: name.to_string(),
                length: on_disk.len() as u64,
                offset,
            });
            offset += on_disk.len() as u64;
        }

        let summary_frame = frame(&summary);
        tmp.write_all(&summary_frame).unwrap();
        tmp.write_all(&(summary_frame.len() as u32).to_be_bytes())
            .unwrap();
        tmp.flush().unwrap();
        tmp
    }
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn run_dump(image: &NamedTempFile, options: &DumpOptions) -> Vec<serde_json::Map<String, Value>> {
    let mut out = Vec::new();
    dump(image.path(), options, &mut out).unwrap();
    String::from_utf8(out)
        .unwrap()
        .lines()
        .map(|line| match serde_json::from_str(line).unwrap() {
            Value::Object(map) => map,
            other => panic!("expected a JSON object per line, got {other}"),
        })
        .collect()
}

fn by_path<'a>(
    records: &'a [serde_json::Map<String, Value>],
    path: &str,
) -> &'a serde_json::Map<String, Value> {
    records
        .iter()
        .find(|r| r["Path"] == path)
        .unwrap_or_else(|| panic!("no record for {path}"))
}

fn paths(records: &[serde_json::Map<String, Value>]) -> Vec<String> {
    let mut out: Vec<String> = records
        .iter()
        .map(|r| r["Path"].as_str().unwrap().to_string())
        .collect();
    out.sort();
    out
}

/// Live namespace of scenario two: `/a` (inode 42) holding `/a/b`
/// (inode 100, two 1024-byte blocks).
fn two_inode_image() -> ImageBuilder {
    ImageBuilder::new()
        .section("STRING_TABLE", string_table(&[(1, "u"), (2, "g")]))
        .section(
            "INODE",
            inode_section(&[
                dir_inode(ROOT, b"", perm(1, 2, 0o755)),
                dir_inode(42, b"a", perm(1, 2, 0o755)),
                file_inode(100, b"b", perm(1, 2, 0o644), &[1024, 1024]),
            ]),
        )
        .section(
            "INODE_DIR",
            dir_section(&[
                DirEntry {
                    parent: ROOT,
                    children: vec![42],
                    ref_children: vec![],
                },
                DirEntry {
                    parent: 42,
                    children: vec![100],
                    ref_children: vec![],
                },
            ]),
        )
}

// ── scenarios ────────────────────────────────────────────────────────────────

#[test]
fn minimal_image_emits_root_only() {
    let image = ImageBuilder::new()
        .section("STRING_TABLE", string_table(&[(1, "hdfs"), (2, "super")]))
        .section(
            "INODE",
            inode_section(&[dir_inode(ROOT, b"", perm(1, 2, 0o755))]),
        )
        .section("INODE_DIR", Vec::new())
        .build();

    let records = run_dump(&image, &DumpOptions::default());
    assert_eq!(records.len(), 1);
    let root = &records[0];
    assert_eq!(root["Path"], "/");
    assert_eq!(root["Permission"], "drwxr-xr-x");
    assert_eq!(root["User"], "hdfs");
    assert_eq!(root["Group"], "super");
    assert!(root.contains_key("ModificationTime"));
    assert!(!root.contains_key("FileSize"));
}

#[test]
fn directory_with_file() {
    let image = two_inode_image().build();
    let records = run_dump(&image, &DumpOptions::default());
    assert_eq!(paths(&records), ["/", "/a", "/a/b"]);

    let dir = by_path(&records, "/a");
    assert_eq!(dir["Permission"], "drwxr-xr-x");
    assert_eq!(dir["User"], "u");

    let file = by_path(&records, "/a/b");
    assert_eq!(file["Permission"], "-rw-r--r--");
    assert_eq!(file["FileSize"], 2048);
    assert_eq!(file["BlocksCount"], 2);
    assert_eq!(file["Replication"], 3);
    assert_eq!(file["PreferredBlockSize"], 128 * 1024 * 1024);
    assert_eq!(file["User"], "u");
    assert_eq!(file["Group"], "g");
    assert_eq!(file["ModificationTimeMs"], 1_600_000_000_000u64);
    assert_eq!(file["ModificationTime"], "2020-09-13 12:26:40");
}

/// `/a/b` existed when snapshot `s1` was taken, then was deleted from the
/// live tree.
fn snapshot_deleted_file_image(diff_header: bool) -> NamedTempFile {
    let mut diff_payload = Vec::new();
    if diff_header {
        // Some images open the section with an (empty) header frame.
        diff_payload.push(0x00);
    }
    diff_payload.extend(frame(&DiffEntry {
        r#type: DiffType::DirectoryDiff as i32,
        inode_id: 42,
        num_of_diff: 1,
    }));
    diff_payload.extend(frame(&DirectoryDiff {
        snapshot_id: 1,
        deleted_inode: vec![100],
        ..Default::default()
    }));

    ImageBuilder::new()
        .section("STRING_TABLE", string_table(&[(1, "u"), (2, "g")]))
        .section(
            "INODE",
            inode_section(&[
                dir_inode(ROOT, b"", perm(1, 2, 0o755)),
                dir_inode(42, b"a", perm(1, 2, 0o755)),
                file_inode(100, b"b", perm(1, 2, 0o644), &[2048]),
            ]),
        )
        .section(
            "INODE_DIR",
            dir_section(&[DirEntry {
                parent: ROOT,
                children: vec![42],
                ref_children: vec![],
            }]),
        )
        .section("SNAPSHOT_DIFF", diff_payload)
        .section(
            "SNAPSHOT",
            snapshot_section(&[(1, dir_inode(42, b"s1", perm(1, 2, 0o755)))]),
        )
        .build()
}

#[test]
fn deleted_file_appears_under_snapshot_path() {
    let image = snapshot_deleted_file_image(false);
    let records = run_dump(&image, &DumpOptions::default());
    assert_eq!(
        paths(&records),
        ["/", "/a", "/a/.snapshot/s1", "/a/.snapshot/s1/b"]
    );
    assert_eq!(by_path(&records, "/a/.snapshot/s1/b")["FileSize"], 2048);
}

#[test]
fn snapshot_diff_header_frame_is_tolerated() {
    let with = run_dump(&snapshot_deleted_file_image(true), &DumpOptions::default());
    let without = run_dump(&snapshot_deleted_file_image(false), &DumpOptions::default());
    assert_eq!(paths(&with), paths(&without));
}

#[test]
fn snap_replace_uses_virtual_snapshot_directory() {
    let image = snapshot_deleted_file_image(false);
    let options = DumpOptions {
        snap_replace: true,
        ..Default::default()
    };
    let records = run_dump(&image, &options);
    assert_eq!(
        paths(&records),
        ["/", "/(snapshot)/s1/a", "/(snapshot)/s1/a/b", "/a"]
    );
}

#[test]
fn snap_cleanup_keeps_one_path_per_file() {
    let image = snapshot_deleted_file_image(false);
    let options = DumpOptions {
        snap_cleanup: true,
        ..Default::default()
    };
    let records = run_dump(&image, &options);
    // The deleted file keeps its snapshot path; the directory keeps only
    // its live path.
    assert_eq!(paths(&records), ["/", "/a", "/a/.snapshot/s1/b"]);
}

#[test]
fn snap_cleanup_is_identity_without_snapshots() {
    let plain = run_dump(&two_inode_image().build(), &DumpOptions::default());
    let cleaned = run_dump(
        &two_inode_image().build(),
        &DumpOptions {
            snap_cleanup: true,
            ..Default::default()
        },
    );
    assert_eq!(plain, cleaned);
}

#[test]
fn reference_child_resolves_under_snapshot_parent() {
    // File 100 lives at /c/b and is also reachable through a reference
    // child of /a recorded for snapshot 1.
    let image = ImageBuilder::new()
        .section("STRING_TABLE", string_table(&[(1, "u"), (2, "g")]))
        .section(
            "INODE",
            inode_section(&[
                dir_inode(ROOT, b"", perm(1, 2, 0o755)),
                dir_inode(42, b"a", perm(1, 2, 0o755)),
                dir_inode(43, b"c", perm(1, 2, 0o755)),
                file_inode(100, b"b", perm(1, 2, 0o644), &[512]),
            ]),
        )
        .section(
            "INODE_REFERENCE",
            ref_section(&[InodeReference {
                referred_id: 100,
                name: Vec::new(),
                dst_snapshot_id: None,
                last_snapshot_id: Some(1),
            }]),
        )
        .section(
            "INODE_DIR",
            dir_section(&[
                DirEntry {
                    parent: ROOT,
                    children: vec![42, 43],
                    ref_children: vec![],
                },
                DirEntry {
                    parent: 43,
                    children: vec![100],
                    ref_children: vec![],
                },
                DirEntry {
                    parent: 42,
                    children: vec![],
                    ref_children: vec![0],
                },
            ]),
        )
        .build();

    let records = run_dump(&image, &DumpOptions::default());
    // The snapshot-scoped placement points at /a, not the live parent /c.
    assert_eq!(paths(&records), ["/", "/a", "/a/b", "/c", "/c/b"]);
}

#[test]
fn orphan_inode_gets_unknown_prefix() {
    let image = ImageBuilder::new()
        .section("STRING_TABLE", string_table(&[(1, "u"), (2, "g")]))
        .section(
            "INODE",
            inode_section(&[
                dir_inode(ROOT, b"", perm(1, 2, 0o755)),
                file_inode(100, b"lost", perm(1, 2, 0o600), &[7]),
            ]),
        )
        .section("INODE_DIR", Vec::new())
        .build();

    let records = run_dump(&image, &DumpOptions::default());
    assert_eq!(paths(&records), ["/", "/(unknown)/lost"]);
}

#[test]
fn extra_fields_are_merged_without_clobbering() {
    let mut extra = serde_json::Map::new();
    extra.insert("Cluster".into(), Value::String("prod".into()));
    extra.insert("Path".into(), Value::String("ignored".into()));
    let options = DumpOptions {
        extra_fields: extra,
        ..Default::default()
    };

    let records = run_dump(&two_inode_image().build(), &options);
    for record in &records {
        assert_eq!(record["Cluster"], "prod");
        assert_ne!(record["Path"], "ignored");
    }
}

#[test]
fn snappy_image_matches_uncompressed_control() {
    // Enough inodes that every section spans several compression chunks.
    let mut inodes = vec![
        dir_inode(ROOT, b"", perm(1, 2, 0o755)),
        dir_inode(42, b"a", perm(1, 2, 0o755)),
    ];
    let mut children = Vec::new();
    for i in 0..300u64 {
        let name = format!("f{i:04}");
        inodes.push(file_inode(
            1000 + i,
            name.as_bytes(),
            perm(1, 2, 0o644),
            &[i * 17],
        ));
        children.push(1000 + i);
    }
    let entries = [
        DirEntry {
            parent: ROOT,
            children: vec![42],
            ref_children: vec![],
        },
        DirEntry {
            parent: 42,
            children,
            ref_children: vec![],
        },
    ];

    let build = || {
        ImageBuilder::new()
            .section("STRING_TABLE", string_table(&[(1, "u"), (2, "g")]))
            .section("INODE", inode_section(&inodes))
            .section("INODE_DIR", dir_section(&entries))
    };

    let control = run_dump(&build().build(), &DumpOptions::default());
    let compressed = run_dump(&build().snappy().build(), &DumpOptions::default());
    assert_eq!(control.len(), 302);
    assert_eq!(control, compressed);
}

#[test]
fn unknown_codec_is_fatal() {
    let mut builder = two_inode_image();
    builder.codec = "org.example.MysteryCodec".to_string();
    let image = builder.build();
    let mut out = Vec::new();
    let err = dump(image.path(), &DumpOptions::default(), &mut out).unwrap_err();
    assert!(err.to_string().contains("MysteryCodec"));
}

#[test]
fn missing_required_section_is_fatal() {
    let image = ImageBuilder::new()
        .section("STRING_TABLE", string_table(&[]))
        .section("INODE", inode_section(&[]))
        .build();
    let mut out = Vec::new();
    let err = dump(image.path(), &DumpOptions::default(), &mut out).unwrap_err();
    assert!(err.to_string().contains("INODE_DIR"));
}

#[test]
fn truncated_section_is_reported_as_broken() {
    let payload = {
        // Frame that declares more bytes than the section holds.
        let mut p = vec![0x20];
        p.extend_from_slice(&[1, 2, 3]);
        p
    };
    let image = ImageBuilder::new()
        .section("STRING_TABLE", payload)
        .section("INODE", inode_section(&[]))
        .section("INODE_DIR", Vec::new())
        .build();
    let mut out = Vec::new();
    let err = dump(image.path(), &DumpOptions::default(), &mut out).unwrap_err();
    assert!(err.to_string().contains("STRING_TABLE"));
}
