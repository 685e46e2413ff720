//! Low-level construction test: build a tree directly through
//! `FsTree::add_generic`, write it with a tuned compressor, and check the
//! super block records the invariants the writer guarantees rather than
//! hardcoded byte offsets that would be implementation-detail-fragile.

use squashtar::compression::Compressor;
use squashtar::fstree::{FileInode, FileSource, FsTree, FsTreeDefaults, NodeMetadata, NodePayload};
use squashtar::kind::Kind;
use squashtar::{CompressionExtra, ExtraXz, FilesystemCompressor, FilesystemWriter, Flags};

#[test]
fn test_raw_construction_xz_tuned() {
    let mut tree = FsTree::new(FsTreeDefaults::default());

    tree.add_generic(
        "dir",
        NodeMetadata { mode: 0o40755, uid: 0, gid: 0, mtime: 0 },
        NodePayload::Directory { children: vec![], implicit: false },
    )
    .unwrap();

    for name in ["dir/one.txt", "dir/two.txt", "three.txt"] {
        tree.add_generic(
            name,
            NodeMetadata { mode: 0o100644, uid: 0, gid: 0, mtime: 0 },
            NodePayload::File {
                source: Some(FileSource::Reader(Box::new(std::io::Cursor::new(
                    name.as_bytes().to_vec(),
                )))),
                inode: FileInode { file_size: name.len() as u64, ..Default::default() },
            },
        )
        .unwrap();
    }
    tree.post_process().unwrap();

    let mut writer = FilesystemWriter::new(Kind::from_target("le_v4_0").unwrap());
    writer.compressor = FilesystemCompressor::new(Compressor::Xz, None)
        .unwrap()
        .with_extra(CompressionExtra::Xz(ExtraXz { level: Some(9) }));
    writer.only_root_id = true;
    writer.exportable = false;

    let mut out = std::io::Cursor::new(vec![]);
    writer.write(&mut tree, &mut out).unwrap();
    let image = out.into_inner();

    let reader = squashtar::FilesystemReader::from_reader(std::io::Cursor::new(image.clone())).unwrap();
    let sb = reader.superblock;

    assert_eq!(sb.magic, Kind::from_target("le_v4_0").unwrap().magic());
    assert_eq!(sb.compressor, Compressor::Xz);
    assert_eq!(sb.version_major, 4);
    assert_eq!(sb.version_minor, 0);
    // root dir + "dir" + 3 files = 5 inodes.
    assert_eq!(sb.inode_count, 5);
    assert_ne!(sb.root_inode, 0);
    // with only_root_id, the id table collapses to one entry regardless of
    // how many distinct uid/gid values the tree had.
    assert_eq!(sb.id_count, 1);
    // exportable was turned off.
    assert_eq!(sb.export_table, u64::MAX);
    assert_eq!(sb.flags & Flags::Exportable as u16, 0);
    assert_eq!(image.len() as u64, sb.bytes_used.next_multiple_of(u64::from(squashtar::DEFAULT_PAD_LEN)));
}

#[test]
fn test_raw_construction_respects_block_size() {
    let mut tree = FsTree::new(FsTreeDefaults::default());
    tree.add_generic(
        "f",
        NodeMetadata { mode: 0o100644, uid: 0, gid: 0, mtime: 0 },
        NodePayload::File {
            source: Some(FileSource::Reader(Box::new(std::io::Cursor::new(vec![7u8; 4096])))),
            inode: FileInode { file_size: 4096, ..Default::default() },
        },
    )
    .unwrap();
    tree.post_process().unwrap();

    let mut writer = FilesystemWriter::new(Kind::from_target("le_v4_0").unwrap());
    writer.block_size = squashtar::MIN_BLOCK_SIZE;
    writer.compressor = FilesystemCompressor::new(Compressor::Gzip, None).unwrap();

    let mut out = std::io::Cursor::new(vec![]);
    writer.write(&mut tree, &mut out).unwrap();
    let image = out.into_inner();

    let reader = squashtar::FilesystemReader::from_reader(std::io::Cursor::new(image)).unwrap();
    assert_eq!(reader.superblock.block_size, squashtar::MIN_BLOCK_SIZE);
    assert_eq!(u32::from(reader.superblock.block_log), squashtar::MIN_BLOCK_SIZE.trailing_zeros());
}
