//! Random-access reads through `FilesystemReader::read`, exercising block
//! boundaries, the fragment tail, and out-of-range offsets.

use squashtar::compression::Compressor;
use squashtar::fstree::{FileInode, FileSource, FsTree, FsTreeDefaults, NodeMetadata, NodePayload};
use squashtar::kind::Kind;
use squashtar::{FilesystemCompressor, FilesystemReader, FilesystemWriter, DEFAULT_BLOCK_SIZE};

/// Build a single-file image holding `data` and return the reader plus the
/// file's inode.
fn build_single_file(data: Vec<u8>) -> (FilesystemReader<'static>, squashtar::Inode) {
    let mut tree = FsTree::new(FsTreeDefaults::default());
    let size = data.len() as u64;
    tree.add_generic(
        "payload.bin",
        NodeMetadata { mode: 0o100644, uid: 0, gid: 0, mtime: 0 },
        NodePayload::File {
            source: Some(FileSource::Reader(Box::new(std::io::Cursor::new(data)))),
            inode: FileInode { file_size: size, ..Default::default() },
        },
    )
    .unwrap();
    tree.post_process().unwrap();

    let mut writer = FilesystemWriter::new(Kind::from_target("le_v4_0").unwrap());
    writer.compressor = FilesystemCompressor::new(Compressor::Xz, None).unwrap();
    let mut out = std::io::Cursor::new(vec![]);
    writer.write(&mut tree, &mut out).unwrap();

    let reader = FilesystemReader::from_reader(std::io::Cursor::new(out.into_inner())).unwrap();
    let inode = {
        let root = reader.get_root_inode().unwrap();
        let mut dir = reader.open_dir(&root).unwrap();
        let entry = dir.read_dir_entry().unwrap();
        reader.get_inode(entry.inode_ref).unwrap()
    };
    (reader, inode)
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 256) as u8).collect()
}

#[test]
fn test_read_at_various_positions() {
    let block = DEFAULT_BLOCK_SIZE as usize;
    let data = pattern(block * 2 + 1500);
    let (reader, inode) = build_single_file(data.clone());

    // start of file
    assert_eq!(reader.read(&inode, 0, 16).unwrap(), data[0..16]);
    // exactly on a block boundary
    assert_eq!(reader.read(&inode, block as u64, 32).unwrap(), data[block..block + 32]);
    // spanning two blocks
    assert_eq!(
        reader.read(&inode, (block - 10) as u64, 20).unwrap(),
        data[block - 10..block + 10]
    );
    // into the fragment tail
    let tail_start = block * 2;
    assert_eq!(
        reader.read(&inode, tail_start as u64, 100).unwrap(),
        data[tail_start..tail_start + 100]
    );
    // reading exactly to the end
    let last = data.len() - 50;
    assert_eq!(reader.read(&inode, last as u64, 50).unwrap(), data[last..]);
}

#[test]
fn test_read_past_end_of_file_truncates() {
    let data = pattern(1000);
    let (reader, inode) = build_single_file(data.clone());

    // request straddling EOF returns only what's available.
    let got = reader.read(&inode, 900, 1000).unwrap();
    assert_eq!(got, data[900..1000]);
}

#[test]
fn test_read_at_exact_eof_is_empty() {
    let data = pattern(500);
    let (reader, inode) = build_single_file(data.clone());
    let got = reader.read(&inode, 500, 10).unwrap();
    assert!(got.is_empty());
}

#[test]
fn test_read_empty_file() {
    let (reader, inode) = build_single_file(vec![]);
    let got = reader.read(&inode, 0, 10).unwrap();
    assert!(got.is_empty());
}

#[test]
fn test_read_zero_length() {
    let data = pattern(100);
    let (reader, inode) = build_single_file(data);
    let got = reader.read(&inode, 10, 0).unwrap();
    assert!(got.is_empty());
}

#[test]
fn test_file_reader_matches_direct_read() {
    use std::io::Read;

    let block = DEFAULT_BLOCK_SIZE as usize;
    let data = pattern(block + 777);
    let (reader, inode) = build_single_file(data.clone());

    let mut via_reader = vec![];
    reader.file_reader(&inode).unwrap().read_to_end(&mut via_reader).unwrap();
    assert_eq!(via_reader, data);

    let via_read = reader.read(&inode, 0, data.len() as u64).unwrap();
    assert_eq!(via_read, data);
}
