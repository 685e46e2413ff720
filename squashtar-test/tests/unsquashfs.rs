mod common;

use assert_cmd::prelude::*;
use std::fs;
use std::io::Write;

use squashtar::compression::Compressor;
use squashtar::fstree::{FileInode, FileSource, FsTree, FsTreeDefaults, NodeMetadata, NodePayload};
use squashtar::kind::Kind;
use squashtar::{FilesystemCompressor, FilesystemWriter};

fn build_test_image() -> tempfile::TempPath {
    let mut tree = FsTree::new(FsTreeDefaults::default());
    tree.add_generic(
        "dir",
        NodeMetadata { mode: 0o40755, uid: 0, gid: 0, mtime: 0 },
        NodePayload::Directory { children: vec![], implicit: false },
    )
    .unwrap();
    tree.add_generic(
        "dir/nested.txt",
        NodeMetadata { mode: 0o100644, uid: 0, gid: 0, mtime: 0 },
        NodePayload::File {
            source: Some(FileSource::Reader(Box::new(std::io::Cursor::new(b"nested contents".to_vec())))),
            inode: FileInode { file_size: 15, ..Default::default() },
        },
    )
    .unwrap();
    tree.add_generic(
        "root.txt",
        NodeMetadata { mode: 0o100644, uid: 0, gid: 0, mtime: 0 },
        NodePayload::File {
            source: Some(FileSource::Reader(Box::new(std::io::Cursor::new(b"root contents".to_vec())))),
            inode: FileInode { file_size: 13, ..Default::default() },
        },
    )
    .unwrap();
    tree.post_process().unwrap();

    let mut writer = FilesystemWriter::new(Kind::from_target("le_v4_0").unwrap());
    writer.compressor = FilesystemCompressor::new(Compressor::Xz, None).unwrap();
    let mut out = std::io::Cursor::new(vec![]);
    writer.write(&mut tree, &mut out).unwrap();

    let named = tempfile::NamedTempFile::new().unwrap();
    {
        let mut file = named.reopen().unwrap();
        file.write_all(&out.into_inner()).unwrap();
    }
    named.into_temp_path()
}

#[test]
fn test_unsquashtar_list() {
    let image = build_test_image();

    let mut cmd = common::get_base_command("unsquashtar");
    cmd.arg("-l").arg(image.as_ref());
    let output = cmd.output().unwrap();
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("directory dir"));
    assert!(stdout.contains("file dir/nested.txt"));
    assert!(stdout.contains("file root.txt"));
}

#[test]
fn test_unsquashtar_extract() {
    let image = build_test_image();
    let dest = tempfile::tempdir().unwrap();

    let mut cmd = common::get_base_command("unsquashtar");
    cmd.arg("-d").arg(dest.path()).arg(image.as_ref());
    cmd.assert().success();

    assert_eq!(fs::read(dest.path().join("root.txt")).unwrap(), b"root contents");
    assert_eq!(fs::read(dest.path().join("dir/nested.txt")).unwrap(), b"nested contents");
}

#[test]
fn test_unsquashtar_extract_with_offset() {
    let mut tree = FsTree::new(FsTreeDefaults::default());
    tree.add_generic(
        "only.txt",
        NodeMetadata { mode: 0o100644, uid: 0, gid: 0, mtime: 0 },
        NodePayload::File {
            source: Some(FileSource::Reader(Box::new(std::io::Cursor::new(b"payload".to_vec())))),
            inode: FileInode { file_size: 7, ..Default::default() },
        },
    )
    .unwrap();
    tree.post_process().unwrap();

    let mut writer = FilesystemWriter::new(Kind::from_target("le_v4_0").unwrap());
    writer.compressor = FilesystemCompressor::new(Compressor::Xz, None).unwrap();
    let mut out = std::io::Cursor::new(vec![]);
    writer.write(&mut tree, &mut out).unwrap();
    let image_bytes = out.into_inner();

    let padding = vec![0u8; 1024];
    let mut combined = padding;
    combined.extend_from_slice(&image_bytes);

    let named = tempfile::NamedTempFile::new().unwrap();
    named.reopen().unwrap().write_all(&combined).unwrap();

    let dest = tempfile::tempdir().unwrap();
    let mut cmd = common::get_base_command("unsquashtar");
    cmd.arg("--offset").arg("1024").arg("-d").arg(dest.path()).arg(named.path());
    cmd.assert().success();

    assert_eq!(fs::read(dest.path().join("only.txt")).unwrap(), b"payload");
}
