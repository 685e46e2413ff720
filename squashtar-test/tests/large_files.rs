//! Multi-block and fragment-boundary-crossing files: generates seeded random
//! data of various sizes, packs it, reads it back, and compares by CRC32
//! rather than holding two copies of every file in memory at once.

use crc32fast::Hasher;
use squashtar::compression::Compressor;
use squashtar::fstree::{FileInode, FileSource, FsTree, FsTreeDefaults, NodeMetadata, NodePayload};
use squashtar::kind::Kind;
use squashtar::{FilesystemCompressor, FilesystemReader, FilesystemWriter};
use std::io::Read;

struct TestFileSpec {
    path: String,
    size: usize,
    seed: u64,
}

fn generate_random_data(size: usize, seed: u64) -> (Vec<u8>, u32) {
    let mut rng = fastrand::Rng::with_seed(seed);
    let mut data = vec![0u8; size];
    rng.fill(&mut data[..]);
    let mut hasher = Hasher::new();
    hasher.update(&data);
    (data, hasher.finalize())
}

fn write_squashfs_image(specs: &[TestFileSpec]) -> (Vec<u8>, Vec<(String, u32)>) {
    let mut tree = FsTree::new(FsTreeDefaults::default());
    let mut hashes = vec![];

    for spec in specs {
        let (data, crc) = generate_random_data(spec.size, spec.seed);
        hashes.push((spec.path.clone(), crc));
        tree.add_generic(
            &spec.path,
            NodeMetadata { mode: 0o100644, uid: 0, gid: 0, mtime: 0 },
            NodePayload::File {
                source: Some(FileSource::Reader(Box::new(std::io::Cursor::new(data)))),
                inode: FileInode { file_size: spec.size as u64, ..Default::default() },
            },
        )
        .unwrap();
    }
    tree.post_process().unwrap();

    let mut writer = FilesystemWriter::new(Kind::from_target("le_v4_0").unwrap());
    writer.compressor = FilesystemCompressor::new(Compressor::Xz, None).unwrap();
    writer.block_size = squashtar::DEFAULT_BLOCK_SIZE;
    let mut out = std::io::Cursor::new(vec![]);
    writer.write(&mut tree, &mut out).unwrap();
    (out.into_inner(), hashes)
}

fn find_inode(reader: &FilesystemReader, path: &str) -> squashtar::Inode {
    let mut current = reader.get_root_inode().unwrap();
    for comp in path.split('/').filter(|c| !c.is_empty()) {
        let mut dir = reader.open_dir(&current).unwrap();
        let mut next = None;
        while let Some(entry) = dir.read_dir_entry() {
            if entry.name == comp {
                next = Some(reader.get_inode(entry.inode_ref).unwrap());
                break;
            }
        }
        current = next.expect("path component must exist");
    }
    current
}

fn verify_squashfs_image(image: Vec<u8>, hashes: &[(String, u32)]) {
    let reader = FilesystemReader::from_reader(std::io::Cursor::new(image)).unwrap();
    for (path, expected_crc) in hashes {
        let inode = find_inode(&reader, path);
        let mut data = vec![];
        reader.file_reader(&inode).unwrap().read_to_end(&mut data).unwrap();
        let mut hasher = Hasher::new();
        hasher.update(&data);
        assert_eq!(hasher.finalize(), *expected_crc, "mismatch for {path}");
    }
}

fn run_test_scenario(specs: Vec<TestFileSpec>) {
    let (image, hashes) = write_squashfs_image(&specs);
    verify_squashfs_image(image, &hashes);
}

#[test]
fn test_small_and_large_mixed() {
    let specs = vec![
        TestFileSpec { path: "tiny.bin".into(), size: 17, seed: 1 },
        TestFileSpec { path: "one-block.bin".into(), size: squashtar::DEFAULT_BLOCK_SIZE as usize, seed: 2 },
        TestFileSpec {
            path: "few-blocks.bin".into(),
            size: squashtar::DEFAULT_BLOCK_SIZE as usize * 4 + 321,
            seed: 3,
        },
        TestFileSpec { path: "large.bin".into(), size: 16 * 1024 * 1024, seed: 4 },
    ];
    run_test_scenario(specs);
}

#[test]
fn test_full_spectrum_of_sizes() {
    let sizes = [0usize, 1, 511, 512, 513, 4095, 4096, 4097, 131_071, 131_072, 131_073, 1_000_003];
    let specs = sizes
        .iter()
        .enumerate()
        .map(|(i, &size)| TestFileSpec { path: format!("spectrum-{i}.bin"), size, seed: i as u64 + 100 })
        .collect();
    run_test_scenario(specs);
}

#[test]
fn test_unaligned_block_boundaries() {
    let block = squashtar::DEFAULT_BLOCK_SIZE as usize;
    let specs = vec![
        TestFileSpec { path: "under-by-one.bin".into(), size: block - 1, seed: 10 },
        TestFileSpec { path: "exact.bin".into(), size: block, seed: 11 },
        TestFileSpec { path: "over-by-one.bin".into(), size: block + 1, seed: 12 },
        TestFileSpec { path: "odd-tail.bin".into(), size: block * 3 + 12345, seed: 13 },
    ];
    run_test_scenario(specs);
}
