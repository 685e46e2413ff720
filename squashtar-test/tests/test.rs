//! Round-trip tests: build a self-contained tree in a tempdir, pack it into
//! an image with every enabled compressor, read the image back, and check
//! that what comes out matches what was scanned in.

use std::fs;
use std::io::Read;
use std::os::unix::fs::{symlink, PermissionsExt};
use std::path::Path;

use squashtar::compression::Compressor;
use squashtar::dirent::{DirIterator, HardLinkFilter, TreeIterator, TreeWalkOptions};
use squashtar::fstree::{FsTree, FsTreeDefaults};
use squashtar::kind::Kind;
use squashtar::{FilesystemCompressor, FilesystemReader, FilesystemWriter, InodeId};

fn enabled_compressors() -> Vec<Compressor> {
    let mut out = vec![];
    #[cfg(feature = "xz")]
    out.push(Compressor::Xz);
    #[cfg(feature = "gzip")]
    out.push(Compressor::Gzip);
    #[cfg(feature = "zstd")]
    out.push(Compressor::Zstd);
    #[cfg(feature = "lz4")]
    out.push(Compressor::Lz4);
    out
}

/// Populate `root` with a representative mix of entry kinds: nested
/// directories, a regular file, a symlink, a hard link pair, and a larger
/// file that crosses a block boundary.
fn populate(root: &Path) -> std::io::Result<()> {
    fs::create_dir_all(root.join("a/b/c"))?;
    fs::write(root.join("a/hello.txt"), b"hello world")?;
    fs::write(root.join("a/b/c/deep.txt"), vec![0x42u8; 3000])?;
    symlink("hello.txt", root.join("a/link-to-hello"))?;
    fs::write(root.join("a/hardlink-src"), b"shared content")?;
    fs::hard_link(root.join("a/hardlink-src"), root.join("a/hardlink-dst"))?;
    fs::create_dir(root.join("empty-dir"))?;

    // Crosses the default 128 KiB block size so the block processor
    // exercises more than one full block plus a fragment tail.
    let big: Vec<u8> = (0..300_000u32).map(|i| (i % 251) as u8).collect();
    fs::write(root.join("a/big.bin"), &big)?;

    let mut perms = fs::metadata(root.join("a/hello.txt"))?.permissions();
    perms.set_mode(0o640);
    fs::set_permissions(root.join("a/hello.txt"), perms)?;
    Ok(())
}

fn build_tree(root: &Path) -> squashtar::Result<FsTree> {
    let mut tree = FsTree::new(FsTreeDefaults::default());
    let opts = TreeWalkOptions::default();
    let walker = TreeIterator::new(root, opts)?;
    let filtered: Box<dyn DirIterator> = Box::new(HardLinkFilter::new(walker));
    tree.from_dir_iterator(filtered)?;
    tree.post_process()?;
    Ok(tree)
}

fn write_image(tree: &mut FsTree, compressor: Compressor) -> squashtar::Result<Vec<u8>> {
    let mut writer = FilesystemWriter::new(Kind::from_target("le_v4_0").unwrap());
    writer.compressor = FilesystemCompressor::new(compressor, None)?;
    let mut out = std::io::Cursor::new(vec![]);
    writer.write(tree, &mut out)?;
    Ok(out.into_inner())
}

fn find_inode(reader: &FilesystemReader, path: &str) -> squashtar::Result<squashtar::Inode> {
    let mut current = reader.get_root_inode()?;
    for comp in path.split('/').filter(|c| !c.is_empty()) {
        let mut dir = reader.open_dir(&current)?;
        let mut next = None;
        while let Some(entry) = dir.read_dir_entry() {
            if entry.name == comp {
                next = Some(reader.get_inode(entry.inode_ref)?);
                break;
            }
        }
        current = next.ok_or_else(|| {
            squashtar::SquashTarError::NoEntry(format!("missing path component: {comp}"))
        })?;
    }
    Ok(current)
}

fn full_test(compressor: Compressor) {
    let tmp = tempfile::tempdir().unwrap();
    populate(tmp.path()).unwrap();

    let mut tree = build_tree(tmp.path()).unwrap();
    let image = write_image(&mut tree, compressor).unwrap();
    assert!(!image.is_empty());

    let reader = FilesystemReader::from_reader(std::io::Cursor::new(image)).unwrap();
    assert_eq!(reader.superblock.compressor, compressor);

    let hello = find_inode(&reader, "a/hello.txt").unwrap();
    assert_eq!(hello.id.into_base_type(), InodeId::BasicFile);
    assert_eq!(u32::from(hello.header.permissions) & 0o777, 0o640);
    let mut data = vec![];
    reader.file_reader(&hello).unwrap().read_to_end(&mut data).unwrap();
    assert_eq!(data, b"hello world");

    let deep = find_inode(&reader, "a/b/c/deep.txt").unwrap();
    let mut deep_data = vec![];
    reader.file_reader(&deep).unwrap().read_to_end(&mut deep_data).unwrap();
    assert_eq!(deep_data, vec![0x42u8; 3000]);

    let big = find_inode(&reader, "a/big.bin").unwrap();
    let mut big_data = vec![];
    reader.file_reader(&big).unwrap().read_to_end(&mut big_data).unwrap();
    let expected: Vec<u8> = (0..300_000u32).map(|i| (i % 251) as u8).collect();
    assert_eq!(big_data, expected);

    let link = find_inode(&reader, "a/link-to-hello").unwrap();
    assert_eq!(link.id.into_base_type(), InodeId::BasicSymlink);

    let src = find_inode(&reader, "a/hardlink-src").unwrap();
    let dst = find_inode(&reader, "a/hardlink-dst").unwrap();
    assert_eq!(src.header.inode_number, dst.header.inode_number);

    let empty = find_inode(&reader, "empty-dir").unwrap();
    assert_eq!(empty.id.into_base_type(), InodeId::BasicDirectory);
    let mut empty_dir = reader.open_dir(&empty).unwrap();
    assert!(empty_dir.read_dir_entry().is_none());
}

#[test]
fn test_round_trip_every_compressor() {
    for compressor in enabled_compressors() {
        full_test(compressor);
    }
}

#[test]
fn test_nested_directory_structure() {
    let tmp = tempfile::tempdir().unwrap();
    fs::create_dir_all(tmp.path().join("x/y/z")).unwrap();
    fs::write(tmp.path().join("x/y/z/leaf.txt"), b"leaf").unwrap();

    let mut tree = build_tree(tmp.path()).unwrap();
    let image = write_image(&mut tree, Compressor::Xz).unwrap();
    let reader = FilesystemReader::from_reader(std::io::Cursor::new(image)).unwrap();

    let leaf = find_inode(&reader, "x/y/z/leaf.txt").unwrap();
    let mut data = vec![];
    reader.file_reader(&leaf).unwrap().read_to_end(&mut data).unwrap();
    assert_eq!(data, b"leaf");
}

#[test]
fn test_many_small_files() {
    let tmp = tempfile::tempdir().unwrap();
    for i in 0..500 {
        fs::write(tmp.path().join(format!("file-{i:04}.txt")), format!("contents {i}")).unwrap();
    }
    let mut tree = build_tree(tmp.path()).unwrap();
    let image = write_image(&mut tree, Compressor::Xz).unwrap();
    let reader = FilesystemReader::from_reader(std::io::Cursor::new(image)).unwrap();

    let root = reader.get_root_inode().unwrap();
    let mut dir = reader.open_dir(&root).unwrap();
    let mut count = 0;
    while dir.read_dir_entry().is_some() {
        count += 1;
    }
    assert_eq!(count, 500);
}

#[test]
fn test_many_directories() {
    let tmp = tempfile::tempdir().unwrap();
    for i in 0..200 {
        fs::create_dir_all(tmp.path().join(format!("dir-{i:04}"))).unwrap();
    }
    let mut tree = build_tree(tmp.path()).unwrap();
    let image = write_image(&mut tree, Compressor::Xz).unwrap();
    let reader = FilesystemReader::from_reader(std::io::Cursor::new(image)).unwrap();

    let root = reader.get_root_inode().unwrap();
    let mut dir = reader.open_dir(&root).unwrap();
    let mut count = 0;
    while dir.read_dir_entry().is_some() {
        count += 1;
    }
    assert_eq!(count, 200);
}

#[test]
fn test_empty_tree() {
    let tmp = tempfile::tempdir().unwrap();
    let mut tree = build_tree(tmp.path()).unwrap();
    let image = write_image(&mut tree, Compressor::Xz).unwrap();
    let reader = FilesystemReader::from_reader(std::io::Cursor::new(image)).unwrap();
    let root = reader.get_root_inode().unwrap();
    assert_eq!(root.id.into_base_type(), InodeId::BasicDirectory);
    let mut dir = reader.open_dir(&root).unwrap();
    assert!(dir.read_dir_entry().is_none());
}

#[test]
fn test_xattrs_survive_round_trip() {
    // Building the tree directly (bypassing the host filesystem walker)
    // lets this test add xattrs even when the tempdir's filesystem
    // doesn't support them.
    use squashtar::fstree::{FileInode, FileSource, NodeMetadata, NodePayload};

    let mut tree = FsTree::new(FsTreeDefaults::default());
    let meta = NodeMetadata { mode: 0o100644, uid: 1000, gid: 1000, mtime: 1_700_000_000 };
    let id = tree
        .add_generic(
            "file-with-xattr.txt",
            meta,
            NodePayload::File {
                source: Some(FileSource::Reader(Box::new(std::io::Cursor::new(b"xattr carrier".to_vec())))),
                inode: FileInode { file_size: 13, ..Default::default() },
            },
        )
        .unwrap();
    tree.arena[id].xattrs.push(("user.comment".to_string(), b"hello".to_vec()));
    tree.post_process().unwrap();

    let image = write_image(&mut tree, Compressor::Xz).unwrap();
    let reader = FilesystemReader::from_reader(std::io::Cursor::new(image)).unwrap();
    let inode = find_inode(&reader, "file-with-xattr.txt").unwrap();
    let xattrs = reader.list_xattrs(&inode).unwrap();
    assert_eq!(xattrs, vec![("user.comment".to_string(), b"hello".to_vec())]);
}
