//! A custom `CompressionAction` paired with a non-default `Kind` (big-endian
//! v4.0 layout): write an image with it, then read it back through the same
//! custom compressor and check the image round-trips and that the custom
//! decompress path actually ran.

use std::sync::atomic::{AtomicUsize, Ordering};

use squashtar::compression::{CompressionAction, Compressor, DefaultCompressor};
use squashtar::fstree::{FileInode, FileSource, FsTree, FsTreeDefaults, NodeMetadata, NodePayload};
use squashtar::kind::{self, Kind};
use squashtar::{FilesystemCompressor, FilesystemReader, FilesystemWriter, SquashTarError, SuperBlock};

static DECOMPRESS_CALLS: AtomicUsize = AtomicUsize::new(0);

/// Only decompresses gzip, via `libdeflater` instead of `flate2`; compresses
/// and emits options by delegating to `DefaultCompressor`.
#[derive(Copy, Clone)]
struct CustomCompressor;

impl CompressionAction for CustomCompressor {
    fn decompress(&self, bytes: &[u8], out: &mut Vec<u8>, compressor: Compressor) -> Result<(), SquashTarError> {
        DECOMPRESS_CALLS.fetch_add(1, Ordering::SeqCst);
        match compressor {
            Compressor::Gzip => {
                out.resize(out.capacity().max(bytes.len() * 8), 0);
                let mut decompressor = libdeflater::Decompressor::new();
                let amt = decompressor
                    .zlib_decompress(bytes, out)
                    .map_err(|e| SquashTarError::Corrupted(format!("libdeflater: {e}")))?;
                out.truncate(amt);
                Ok(())
            }
            _ => unimplemented!("this test only ever writes gzip images"),
        }
    }

    fn compress(&self, bytes: &[u8], fc: FilesystemCompressor, block_size: u32) -> Result<Vec<u8>, SquashTarError> {
        DefaultCompressor.compress(bytes, fc, block_size)
    }

    fn compression_options(
        &self,
        superblock: &mut SuperBlock,
        kind: &Kind,
        fs_compressor: FilesystemCompressor,
    ) -> Result<Vec<u8>, SquashTarError> {
        DefaultCompressor.compression_options(superblock, kind, fs_compressor)
    }
}

#[test]
fn test_custom_compressor_round_trip() {
    static CUSTOM: CustomCompressor = CustomCompressor;
    let before = DECOMPRESS_CALLS.load(Ordering::SeqCst);

    let mut tree = FsTree::new(FsTreeDefaults::default());
    tree.add_generic(
        "payload.txt",
        NodeMetadata { mode: 0o100644, uid: 0, gid: 0, mtime: 0 },
        NodePayload::File {
            source: Some(FileSource::Reader(Box::new(std::io::Cursor::new(
                b"custom compressor payload".to_vec(),
            )))),
            inode: FileInode { file_size: 25, ..Default::default() },
        },
    )
    .unwrap();
    tree.post_process().unwrap();

    let custom_kind = Kind::new_with_const(&CUSTOM, kind::BE_V4_0);
    let mut writer = FilesystemWriter::new(custom_kind.clone());
    writer.compressor = FilesystemCompressor::new(Compressor::Gzip, None).unwrap();

    let mut out = std::io::Cursor::new(vec![]);
    writer.write(&mut tree, &mut out).unwrap();
    let image = out.into_inner();

    let reader =
        FilesystemReader::from_reader_with_offset_and_kind(std::io::Cursor::new(image), 0, custom_kind).unwrap();
    assert_eq!(reader.superblock.compressor, Compressor::Gzip);

    let root = reader.get_root_inode().unwrap();
    let mut dir = reader.open_dir(&root).unwrap();
    let entry = dir.read_dir_entry().unwrap();
    let inode = reader.get_inode(entry.inode_ref).unwrap();

    let mut data = vec![];
    use std::io::Read;
    reader.file_reader(&inode).unwrap().read_to_end(&mut data).unwrap();
    assert_eq!(data, b"custom compressor payload");

    // the metadata block(s) and the file's data block all went through the
    // custom decompress path.
    assert!(DECOMPRESS_CALLS.load(Ordering::SeqCst) > before);
}

#[test]
fn test_non_standard_be_v4_0_with_default_compressor() {
    let mut tree = FsTree::new(FsTreeDefaults::default());
    tree.add_generic(
        "f",
        NodeMetadata { mode: 0o100644, uid: 0, gid: 0, mtime: 0 },
        NodePayload::File {
            source: Some(FileSource::Reader(Box::new(std::io::Cursor::new(b"be image".to_vec())))),
            inode: FileInode { file_size: 8, ..Default::default() },
        },
    )
    .unwrap();
    tree.post_process().unwrap();

    let be_kind = Kind::from_const(kind::BE_V4_0).unwrap();
    let mut writer = FilesystemWriter::new(be_kind.clone());
    writer.compressor = FilesystemCompressor::new(Compressor::Xz, None).unwrap();
    let mut out = std::io::Cursor::new(vec![]);
    writer.write(&mut tree, &mut out).unwrap();
    let image = out.into_inner();

    let reader =
        FilesystemReader::from_reader_with_offset_and_kind(std::io::Cursor::new(image), 0, be_kind.clone())
            .unwrap();
    assert_eq!(reader.superblock.magic, be_kind.magic());
}
