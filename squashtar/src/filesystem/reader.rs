//! SquashFS reader (spec component I): opens an existing image, decodes the
//! super block, and exposes the root inode, directory listings, arbitrary
//! inode lookups, file data, and xattrs on demand rather than loading the
//! whole image up front. [`writer`](super::writer) is this module's
//! counterpart on the way out.

use std::collections::VecDeque;
use std::ffi::OsString;
use std::io::{Cursor, Read, Seek, SeekFrom};
use std::sync::{Arc, Mutex};

use deku::prelude::*;
use rustc_hash::FxHashMap;
use tracing::info;

use crate::compressor::{CompressionOptions, Compressor};
use crate::dir::Dir;
use crate::error::{Result, SquashTarError};
use crate::export::Export;
use crate::fragment::Fragment;
use crate::id::Id;
use crate::inode::{DataSize, Inode, InodeId, InodeInner};
use crate::kinds::{Kind, LE_V4_0};
use crate::metadata;
use crate::os_traits::OsStrExt;
use crate::reader::{BufReadSeek, SquashFsReader, SquashfsReaderWithOffset};
use crate::squashfs::{SuperBlock, MAX_BLOCK_SIZE, MIN_BLOCK_SIZE, NO_FRAGMENT_INDEX, NO_XATTR_INDEX, NOT_SET};
use crate::xattr::{self, XattrReader};

/// Upper bound on how many decompressed data/fragment blocks the block cache
/// keeps around at once. Unbounded caching of an entire large image would
/// defeat the point of streaming reads; this merely absorbs re-reads of a
/// fragment shared by several small files.
const BLOCK_CACHE_CAPACITY: usize = 64;

/// Small bounded cache, keyed by on-disk block position, of decompressed
/// block/fragment bytes. Squashtar carries no `lru` dependency, so this is a
/// hand-rolled FIFO eviction ring rather than a true LRU; good enough for the
/// access pattern (sequential file reads, occasional fragment reuse).
struct BlockCache {
    capacity: usize,
    order: VecDeque<u64>,
    bytes: FxHashMap<u64, Arc<Vec<u8>>>,
}

impl BlockCache {
    fn new(capacity: usize) -> Self {
        Self { capacity, order: VecDeque::with_capacity(capacity), bytes: FxHashMap::default() }
    }

    fn get(&self, pos: u64) -> Option<Arc<Vec<u8>>> {
        self.bytes.get(&pos).cloned()
    }

    fn insert(&mut self, pos: u64, data: Arc<Vec<u8>>) {
        if self.bytes.insert(pos, data).is_some() {
            return;
        }
        self.order.push_back(pos);
        if self.order.len() > self.capacity {
            if let Some(evict) = self.order.pop_front() {
                self.bytes.remove(&evict);
            }
        }
    }
}

/// One file's block-list view, regardless of whether it came from a
/// [`InodeInner::BasicFile`] or [`InodeInner::ExtendedFile`].
struct FileView<'a> {
    blocks_start: u64,
    frag_index: u32,
    block_offset: u32,
    file_size: u64,
    block_sizes: &'a [DataSize],
}

fn file_view(inode: &Inode) -> Result<FileView<'_>> {
    match &inode.inner {
        InodeInner::BasicFile(f) => Ok(FileView {
            blocks_start: u64::from(f.blocks_start),
            frag_index: f.frag_index,
            block_offset: f.block_offset,
            file_size: u64::from(f.file_size),
            block_sizes: &f.block_sizes,
        }),
        InodeInner::ExtendedFile(f) => Ok(FileView {
            blocks_start: f.blocks_start,
            frag_index: f.frag_index,
            block_offset: f.block_offset,
            file_size: f.file_size,
            block_sizes: &f.block_sizes,
        }),
        _ => Err(SquashTarError::NotFile("inode is not a regular file".into())),
    }
}

fn xattr_index_of(inode: &Inode) -> u32 {
    match &inode.inner {
        InodeInner::ExtendedDirectory(d) => d.xattr_index,
        InodeInner::ExtendedFile(d) => d.xattr_index,
        InodeInner::ExtendedSymlink(d) => d.xattr_index,
        InodeInner::ExtendedBlockDevice(d) | InodeInner::ExtendedCharDevice(d) => d.xattr_index,
        InodeInner::ExtendedFifo(d) | InodeInner::ExtendedSocket(d) => d.xattr_index,
        _ => NO_XATTR_INDEX,
    }
}

/// One entry out of an open directory listing: the entry's name (raw bytes,
/// reinterpreted through the platform's native string type), the inode
/// reference to pass to [`FilesystemReader::get_inode`], and the entry's
/// basic inode type tag.
#[derive(Debug, Clone)]
pub struct DirEntryRef {
    pub name: OsString,
    pub inode_ref: u64,
    pub inode_type: InodeId,
}

/// Iterator handed back by [`FilesystemReader::open_dir`]; yields every
/// entry already parsed out of the directory's metadata blocks.
pub struct DirReader {
    entries: std::vec::IntoIter<DirEntryRef>,
}

impl DirReader {
    /// Named to match spec wording; equivalent to [`Iterator::next`].
    pub fn read_dir_entry(&mut self) -> Option<DirEntryRef> {
        self.entries.next()
    }
}

impl Iterator for DirReader {
    type Item = DirEntryRef;
    fn next(&mut self) -> Option<Self::Item> {
        self.entries.next()
    }
}

/// An open SquashFS image: the parsed super block and small tables kept
/// in memory, everything else (inodes, directory listings, file data)
/// fetched and cached on demand.
pub struct FilesystemReader<'b> {
    pub kind: Kind,
    pub superblock: SuperBlock,
    pub block_size: u32,
    pub compressor: Compressor,
    pub compression_options: Option<CompressionOptions>,
    pub id_table: Vec<Id>,
    pub fragments: Option<Vec<Fragment>>,
    pub export: Option<Vec<Export>>,
    root_inode_ref: u64,
    dir_offsets: FxHashMap<u64, u64>,
    dir_bytes: Vec<u8>,
    xattr_reader: Option<XattrReader>,
    reader: Mutex<Box<dyn BufReadSeek + 'b>>,
    inode_cache: Mutex<FxHashMap<u64, Arc<Inode>>>,
    block_cache: Mutex<BlockCache>,
}

impl<'b> FilesystemReader<'b> {
    pub fn from_reader<R: BufReadSeek + 'b>(reader: R) -> Result<Self> {
        Self::from_reader_with_offset(reader, 0)
    }

    pub fn from_reader_with_offset<R: BufReadSeek + 'b>(reader: R, offset: u64) -> Result<Self> {
        Self::from_reader_with_offset_and_kind(reader, offset, Kind { inner: Arc::new(LE_V4_0) })
    }

    pub fn from_reader_with_offset_and_kind<R: BufReadSeek + 'b>(
        reader: R,
        offset: u64,
        kind: Kind,
    ) -> Result<Self> {
        let boxed: Box<dyn BufReadSeek + 'b> = if offset == 0 {
            Box::new(reader)
        } else {
            Box::new(SquashfsReaderWithOffset::new(reader, offset)?)
        };
        Self::build(boxed, kind)
    }

    fn build(mut reader: Box<dyn BufReadSeek + 'b>, kind: Kind) -> Result<Self> {
        let superblock = {
            let mut container = Reader::new(&mut reader);
            SuperBlock::from_reader_with_ctx(
                &mut container,
                (kind.inner.magic, kind.inner.version_major, kind.inner.version_minor, kind.inner.type_endian),
            )?
        };

        let power_of_two = superblock.block_size != 0 && superblock.block_size & (superblock.block_size - 1) == 0;
        if !(MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&superblock.block_size) || !power_of_two {
            return Err(SquashTarError::corrupted("block size is not a power of two in range"));
        }
        if u32::from(superblock.block_log) != superblock.block_size.trailing_zeros() {
            return Err(SquashTarError::corrupted("block_log does not match block_size"));
        }

        let compression_options = if superblock.compressor != Compressor::None
            && superblock.compressor_options_are_present()
        {
            let bytes = metadata::read_block(&mut reader, &superblock, &kind)?;
            let mut cursor = Cursor::new(&bytes);
            let mut r = Reader::new(&mut cursor);
            CompressionOptions::from_reader_with_ctx(&mut r, (kind.inner.type_endian, superblock.compressor)).ok()
        } else {
            None
        };

        let total_length = reader.seek(SeekFrom::End(0))?;
        reader.rewind()?;
        let table_in_range = |ptr: u64| ptr == NOT_SET || ptr <= total_length;
        if superblock.bytes_used > total_length
            || superblock.inode_table > total_length
            || superblock.dir_table > total_length
            || !table_in_range(superblock.id_table)
            || !table_in_range(superblock.xattr_table)
            || !table_in_range(superblock.frag_table)
            || !table_in_range(superblock.export_table)
        {
            return Err(SquashTarError::corrupted("a table offset lies beyond the end of the image"));
        }

        let root_inode_ref = superblock.root_inode;

        let fragments = reader.fragments(&superblock, &kind)?;
        let fragment_ptr = fragments.as_ref().map(|(ptr, _)| *ptr);
        let fragments = fragments.map(|(_, table)| table);

        let export = reader.export(&superblock, &kind)?;
        let export_ptr = export.as_ref().map(|(ptr, _)| *ptr);
        let export = export.map(|(_, table)| table);

        let (id_ptr, id_table) = reader.id(&superblock, &kind)?;

        let last_dir_position = fragment_ptr.or(export_ptr).unwrap_or(id_ptr);
        let raw_dir_blocks = reader.dir_blocks(&superblock, last_dir_position, &kind)?;
        let mut dir_offsets = FxHashMap::default();
        let mut dir_bytes = Vec::new();
        for (block_index, bytes) in raw_dir_blocks {
            dir_offsets.insert(block_index, dir_bytes.len() as u64);
            dir_bytes.extend_from_slice(&bytes);
        }

        let xattr_reader = xattr::read_xattr_table(&mut reader, &superblock, &kind)?;

        info!(
            "opened squashfs image: {} inodes, block size {:#x}, compressor {:?}",
            superblock.inode_count, superblock.block_size, superblock.compressor
        );

        Ok(Self {
            block_size: superblock.block_size,
            compressor: superblock.compressor,
            compression_options,
            id_table,
            fragments,
            export,
            root_inode_ref,
            dir_offsets,
            dir_bytes,
            xattr_reader,
            kind,
            superblock,
            reader: Mutex::new(reader),
            inode_cache: Mutex::new(FxHashMap::default()),
            block_cache: Mutex::new(BlockCache::new(BLOCK_CACHE_CAPACITY)),
        })
    }

    /// The root directory's inode, decoded fresh each call (cheap: it's a
    /// single metadata-block lookup, and [`Self::get_inode`] caches it after
    /// the first call anyway).
    pub fn get_root_inode(&self) -> Result<Inode> {
        self.get_inode(self.root_inode_ref)
    }

    /// Decode the inode at `inode_ref` (a packed `(metadata_block_start <<
    /// 16) | block_offset` pair, relative to the inode table — the same
    /// format the directory table and export table use), consulting and
    /// populating an `inode_ref`-keyed cache.
    pub fn get_inode(&self, inode_ref: u64) -> Result<Inode> {
        if let Some(inode) = self.inode_cache.lock().unwrap().get(&inode_ref) {
            return Ok((**inode).clone());
        }

        let start = inode_ref >> 16;
        let offset = (inode_ref & 0xffff) as usize;
        if start > self.superblock.bytes_used {
            return Err(SquashTarError::corrupted("inode reference offset out of range"));
        }

        let ctx = (
            self.superblock.bytes_used,
            self.superblock.block_size,
            self.superblock.block_log,
            self.kind.inner.type_endian,
        );

        let mut reader = self.reader.lock().unwrap();
        reader.seek(SeekFrom::Start(self.superblock.inode_table + start))?;
        let mut bytes = metadata::read_block(&mut *reader, &self.superblock, &self.kind)?;
        if offset > bytes.len() {
            return Err(SquashTarError::corrupted("inode reference offset beyond metadata block"));
        }

        let decoded = {
            let mut cursor = Cursor::new(&bytes[offset..]);
            let mut container = Reader::new(&mut cursor);
            Inode::from_reader_with_ctx(&mut container, ctx)
        };
        let inode = match decoded {
            Ok(inode) => inode,
            Err(_) => {
                // Spans into the next metadata block; pull one more and retry.
                let more = metadata::read_block(&mut *reader, &self.superblock, &self.kind)?;
                bytes.extend_from_slice(&more);
                if offset > bytes.len() {
                    return Err(SquashTarError::corrupted("inode reference offset beyond metadata block"));
                }
                let mut cursor = Cursor::new(&bytes[offset..]);
                let mut container = Reader::new(&mut cursor);
                Inode::from_reader_with_ctx(&mut container, ctx)?
            }
        };
        drop(reader);

        self.inode_cache.lock().unwrap().insert(inode_ref, Arc::new(inode.clone()));
        Ok(inode)
    }

    /// Parse the [`Dir`] headers a directory inode's `(block_index,
    /// file_size, block_offset)` triple points at.
    fn dir_from_index(&self, block_index: u64, file_size: u32, block_offset: usize) -> Result<Vec<Dir>> {
        if file_size < 4 {
            return Ok(vec![]);
        }
        let bytes_offset = *self
            .dir_offsets
            .get(&block_index)
            .ok_or_else(|| SquashTarError::corrupted("directory block_index not present in directory table"))?;

        let start = bytes_offset as usize + block_offset;
        let end = start + (file_size as usize - 3);
        let block = self
            .dir_bytes
            .get(start..end)
            .ok_or_else(|| SquashTarError::OutOfBounds("directory listing out of range".into()))?;

        let mut dirs = vec![];
        let mut cursor = Cursor::new(block);
        let mut reader = Reader::new(&mut cursor);
        while let Ok(dir) = Dir::from_reader_with_ctx(&mut reader, self.kind.inner.type_endian) {
            dirs.push(dir);
        }
        Ok(dirs)
    }

    /// Open `inode`'s directory listing. Fails with [`SquashTarError::NotFile`]
    /// if `inode` isn't a directory.
    pub fn open_dir(&self, inode: &Inode) -> Result<DirReader> {
        let (block_index, file_size, block_offset) = match &inode.inner {
            InodeInner::BasicDirectory(d) => {
                (u64::from(d.block_index), u32::from(d.file_size), d.block_offset as usize)
            }
            InodeInner::ExtendedDirectory(d) => (u64::from(d.block_index), d.file_size, d.block_offset as usize),
            _ => return Err(SquashTarError::NotFile("inode is not a directory".into())),
        };

        let dirs = self.dir_from_index(block_index, file_size, block_offset)?;
        let mut entries = Vec::new();
        for dir in &dirs {
            for entry in &dir.dir_entries {
                let inode_ref = (u64::from(dir.start) << 16) | u64::from(entry.offset);
                let name = OsStrExt::from_bytes(entry.name.as_slice()).to_os_string();
                entries.push(DirEntryRef { name, inode_ref, inode_type: entry.t });
            }
        }
        Ok(DirReader { entries: entries.into_iter() })
    }

    /// `inode`'s extended attributes, or an empty list if it has none (or
    /// the image carries no xattr tables at all).
    pub fn list_xattrs(&self, inode: &Inode) -> Result<Vec<(String, Vec<u8>)>> {
        let index = xattr_index_of(inode);
        if index == NO_XATTR_INDEX {
            return Ok(vec![]);
        }
        match &self.xattr_reader {
            Some(reader) => Ok(reader.get(index)?.to_vec()),
            None => Ok(vec![]),
        }
    }

    /// Read `size` bytes of `inode`'s data starting at `offset`, clamped to
    /// the file's actual length. Partitions the request across full data
    /// blocks and a possible fragment tail, fetching each through the
    /// bounded block cache.
    pub fn read(&self, inode: &Inode, offset: u64, size: u64) -> Result<Vec<u8>> {
        let view = file_view(inode)?;
        if offset >= view.file_size || size == 0 {
            return Ok(vec![]);
        }
        let end = (offset + size).min(view.file_size);
        let block_size = u64::from(self.block_size);
        let full_blocks = (view.file_size / block_size) as usize;

        let mut out = Vec::with_capacity((end - offset) as usize);
        let mut pos = view.blocks_start;
        for (i, block) in view.block_sizes.iter().enumerate() {
            let block_start = i as u64 * block_size;
            let block_end = block_start + block_size;
            let overlaps = block_end > offset && block_start < end;

            if block.is_sparse() {
                if overlaps {
                    let lo = offset.max(block_start) - block_start;
                    let hi = end.min(block_end) - block_start;
                    out.extend(std::iter::repeat(0u8).take((hi - lo) as usize));
                }
                continue;
            }

            if overlaps {
                let bytes = self.read_block_at(pos, *block)?;
                let lo = (offset.max(block_start) - block_start) as usize;
                let hi = (end.min(block_end) - block_start) as usize;
                out.extend_from_slice(&bytes[lo..hi]);
            }
            pos += u64::from(block.size());
        }

        if view.frag_index != NO_FRAGMENT_INDEX {
            let frag_start = full_blocks as u64 * block_size;
            if frag_start < end {
                let fragment = self
                    .fragments
                    .as_ref()
                    .and_then(|table| table.get(view.frag_index as usize))
                    .ok_or_else(|| SquashTarError::OutOfBounds("fragment index".into()))?;
                let frag_bytes = self.read_block_at(fragment.start, fragment.size)?;
                let lo = (offset.max(frag_start) - frag_start) as usize + view.block_offset as usize;
                let hi = (end - frag_start) as usize + view.block_offset as usize;
                let slice = frag_bytes
                    .get(lo..hi)
                    .ok_or_else(|| SquashTarError::OutOfBounds("fragment tail out of range".into()))?;
                out.extend_from_slice(slice);
            }
        }

        Ok(out)
    }

    /// Read and decompress the block/fragment of size-record `size` starting
    /// at file position `pos`, serving from (and populating) the block cache.
    fn read_block_at(&self, pos: u64, size: DataSize) -> Result<Arc<Vec<u8>>> {
        if let Some(cached) = self.block_cache.lock().unwrap().get(pos) {
            return Ok(cached);
        }

        let mut raw = vec![0u8; size.size() as usize];
        {
            let mut reader = self.reader.lock().unwrap();
            reader.seek(SeekFrom::Start(pos))?;
            reader.read_exact(&mut raw)?;
        }

        let bytes = if size.uncompressed() {
            raw
        } else {
            let mut out = Vec::with_capacity(self.block_size as usize);
            self.kind.inner.compressor.decompress(&raw, &mut out, self.compressor)?;
            out
        };

        let bytes = Arc::new(bytes);
        self.block_cache.lock().unwrap().insert(pos, bytes.clone());
        Ok(bytes)
    }

    /// A buffered, sequential [`Read`] handle over one file's data — the
    /// ergonomic form [`Self::read`] lacks, for CLI extraction call sites
    /// that want `std::io::copy` rather than manual offset bookkeeping.
    pub fn file_reader<'a>(&'a self, inode: &Inode) -> Result<FileReader<'a, 'b>> {
        FileReader::new(self, inode.clone())
    }
}

/// Sequential [`Read`] adapter over [`FilesystemReader::read`].
pub struct FileReader<'a, 'b> {
    fs: &'a FilesystemReader<'b>,
    inode: Inode,
    pos: u64,
    len: u64,
}

impl<'a, 'b> FileReader<'a, 'b> {
    fn new(fs: &'a FilesystemReader<'b>, inode: Inode) -> Result<Self> {
        let len = file_view(&inode)?.file_size;
        Ok(Self { fs, inode, pos: 0, len })
    }
}

impl Read for FileReader<'_, '_> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.pos >= self.len || buf.is_empty() {
            return Ok(0);
        }
        let want = (self.len - self.pos).min(buf.len() as u64);
        let data = self.fs.read(&self.inode, self.pos, want).map_err(std::io::Error::from)?;
        buf[..data.len()].copy_from_slice(&data);
        self.pos += data.len() as u64;
        Ok(data.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compressor::Compressor;
    use crate::filesystem::writer::{FilesystemCompressor, FilesystemWriter};
    use crate::fstree::node::{FileInode, FileSource, FsTree, FsTreeDefaults, NodeMetadata, NodePayload};
    use std::io::Cursor;

    fn kind() -> Kind {
        Kind { inner: Arc::new(LE_V4_0) }
    }

    fn build_image(tree: &mut FsTree) -> Vec<u8> {
        let mut writer = FilesystemWriter::new(kind());
        writer.compressor = FilesystemCompressor::new(Compressor::None, None).unwrap();
        let mut out = Cursor::new(Vec::new());
        writer.write(tree, &mut out).unwrap();
        out.into_inner()
    }

    #[test]
    fn round_trips_root_directory_listing_and_file_contents() {
        let mut tree = FsTree::new(FsTreeDefaults::default());
        let meta = NodeMetadata { mode: 0o100644, uid: 1000, gid: 1000, mtime: 0 };
        tree.add_generic(
            "hello.txt",
            meta,
            NodePayload::File {
                source: Some(FileSource::Reader(Box::new(Cursor::new(b"hello world".to_vec())))),
                inode: FileInode { file_size: 11, ..FileInode::default() },
            },
        )
        .unwrap();

        let bytes = build_image(&mut tree);
        let fs = FilesystemReader::from_reader(Cursor::new(bytes)).unwrap();

        let root = fs.get_root_inode().unwrap();
        let mut dir = fs.open_dir(&root).unwrap();
        let entry = dir.read_dir_entry().expect("one entry");
        assert_eq!(entry.name, OsString::from("hello.txt"));
        assert_eq!(entry.inode_type, InodeId::BasicFile);
        assert!(dir.read_dir_entry().is_none());

        let file_inode = fs.get_inode(entry.inode_ref).unwrap();
        let data = fs.read(&file_inode, 0, 11).unwrap();
        assert_eq!(data, b"hello world");

        let partial = fs.read(&file_inode, 6, 5).unwrap();
        assert_eq!(partial, b"world");
    }

    #[test]
    fn file_reader_streams_full_contents() {
        let mut tree = FsTree::new(FsTreeDefaults::default());
        let payload = b"stream me please".repeat(50);
        let meta = NodeMetadata { mode: 0o100644, uid: 0, gid: 0, mtime: 0 };
        tree.add_generic(
            "big.bin",
            meta,
            NodePayload::File {
                source: Some(FileSource::Reader(Box::new(Cursor::new(payload.clone())))),
                inode: FileInode { file_size: payload.len() as u64, ..FileInode::default() },
            },
        )
        .unwrap();

        let bytes = build_image(&mut tree);
        let fs = FilesystemReader::from_reader(Cursor::new(bytes)).unwrap();
        let root = fs.get_root_inode().unwrap();
        let mut dir = fs.open_dir(&root).unwrap();
        let entry = dir.read_dir_entry().unwrap();
        let inode = fs.get_inode(entry.inode_ref).unwrap();

        let mut out = Vec::new();
        fs.file_reader(&inode).unwrap().read_to_end(&mut out).unwrap();
        assert_eq!(out, payload);
    }

    #[test]
    fn nested_directories_and_xattrs_round_trip() {
        let mut tree = FsTree::new(FsTreeDefaults::default());
        let dir_meta = NodeMetadata { mode: 0o040755, uid: 0, gid: 0, mtime: 0 };
        tree.add_generic("sub", dir_meta, NodePayload::Directory { children: vec![], implicit: false }).unwrap();
        let file_meta = NodeMetadata { mode: 0o100644, uid: 0, gid: 0, mtime: 0 };
        let id = tree
            .add_generic(
                "sub/leaf.txt",
                file_meta,
                NodePayload::File {
                    source: Some(FileSource::Reader(Box::new(Cursor::new(b"leaf".to_vec())))),
                    inode: FileInode { file_size: 4, ..FileInode::default() },
                },
            )
            .unwrap();
        tree.arena[id].xattrs.push(("user.note".to_string(), b"hi".to_vec()));

        let bytes = build_image(&mut tree);
        let fs = FilesystemReader::from_reader(Cursor::new(bytes)).unwrap();

        let root = fs.get_root_inode().unwrap();
        let mut root_dir = fs.open_dir(&root).unwrap();
        let sub_entry = root_dir.read_dir_entry().expect("sub directory entry");
        assert_eq!(sub_entry.name, OsString::from("sub"));

        let sub_inode = fs.get_inode(sub_entry.inode_ref).unwrap();
        let mut sub_dir = fs.open_dir(&sub_inode).unwrap();
        let leaf_entry = sub_dir.read_dir_entry().expect("leaf entry");
        assert_eq!(leaf_entry.name, OsString::from("leaf.txt"));

        let leaf_inode = fs.get_inode(leaf_entry.inode_ref).unwrap();
        assert_eq!(fs.read(&leaf_inode, 0, 4).unwrap(), b"leaf");
        let xattrs = fs.list_xattrs(&leaf_inode).unwrap();
        assert_eq!(xattrs, vec![("user.note".to_string(), b"hi".to_vec())]);
    }
}
