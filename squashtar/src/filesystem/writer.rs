//! SquashFS writer (spec component J): assembles a post-processed
//! [`FsTree`] into an on-disk image, driving the block processor
//! ([`crate::data::BlockProcessor`]) and the table writers
//! ([`crate::table`], [`crate::metadata::MetadataWriter`]) over it in the
//! strictly sequential order spec §4.J describes.

use std::io::{Cursor, Seek, SeekFrom, Write};

use rustc_hash::FxHashMap;
use tracing::{info, trace};

use crate::compressor::CompressionOptions;
use crate::data::{BlockFlags, BlockProcessor};
use crate::dir::{self, PendingEntry};
use crate::error::{Result, SquashTarError};
use crate::export::Export;
use crate::fstree::node::{FileSource, FsTree, HardLinkState, NodeId, NodePayload};
use crate::id::Id;
use crate::inode::{
    BasicDeviceSpecialFile, BasicDirectory, BasicFile, BasicIpc, BasicSymlink, DataSize,
    ExtendedDeviceSpecialFile, ExtendedDirectory, ExtendedFile, ExtendedIpc, ExtendedSymlink, Inode,
    InodeHeader, InodeId, InodeInner,
};
use crate::kinds::Kind;
use crate::metadata::MetadataWriter;
use crate::squashfs::{SuperBlock, DEFAULT_PAD_LEN, NOT_SET};
use crate::table;
use crate::xattr::{XattrSet, XattrWriterDedup};

/// Compressor selection plus the optional compression-options record stored
/// after the super block, exactly as the super block's `compressor` field and
/// `COMP_OPT` flag describe.
#[derive(Debug, Clone, Copy)]
pub struct FilesystemCompressor {
    pub id: crate::compressor::Compressor,
    pub options: Option<CompressionOptions>,
    pub extra: Option<CompressionExtra>,
}

impl FilesystemCompressor {
    pub fn new(id: crate::compressor::Compressor, options: Option<CompressionOptions>) -> Result<Self> {
        if let Some(options) = &options {
            let matches = matches!(
                (id, options),
                (crate::compressor::Compressor::Gzip, CompressionOptions::Gzip(_))
                    | (crate::compressor::Compressor::Lzo, CompressionOptions::Lzo(_))
                    | (crate::compressor::Compressor::Xz, CompressionOptions::Xz(_))
                    | (crate::compressor::Compressor::Lz4, CompressionOptions::Lz4(_))
                    | (crate::compressor::Compressor::Zstd, CompressionOptions::Zstd(_))
                    | (crate::compressor::Compressor::Lzma, CompressionOptions::Lzma)
            );
            if !matches {
                return Err(SquashTarError::Unsupported(format!(
                    "compression options {options:?} do not match compressor {id:?}"
                )));
            }
        }
        Ok(Self { id, options, extra: None })
    }

    pub fn with_extra(mut self, extra: CompressionExtra) -> Self {
        self.extra = Some(extra);
        self
    }
}

/// Tuning knobs that affect how a block is compressed but aren't part of the
/// on-disk compression-options record (so they aren't read back from an
/// existing image — only set by a writer).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionExtra {
    Xz(ExtraXz),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtraXz {
    pub level: Option<u32>,
}

/// Writer-side configuration: block size, compressor, padding, and the
/// ownership/permission overrides the original's `gensquashfs`/`mksquashfs`
/// front ends expose as `--force-uid`/`--force-gid`/`--default-mode` etc.
#[derive(Clone)]
pub struct FilesystemWriter {
    pub kind: Kind,
    pub block_size: u32,
    pub pad_len: u32,
    pub compressor: FilesystemCompressor,
    pub mod_time: u32,
    /// Emit every uid/gid as `0` (root), collapsing the id table to one entry.
    pub only_root_id: bool,
    pub worker_count: usize,
    pub max_backlog: usize,
    pub exportable: bool,
    pub no_xattrs: bool,
}

impl FilesystemWriter {
    pub fn new(kind: Kind) -> Self {
        Self {
            kind,
            block_size: crate::squashfs::DEFAULT_BLOCK_SIZE,
            pad_len: DEFAULT_PAD_LEN,
            compressor: FilesystemCompressor::new(crate::compressor::Compressor::Xz, None).unwrap(),
            mod_time: 0,
            only_root_id: false,
            worker_count: 0,
            max_backlog: 64,
            exportable: true,
            no_xattrs: false,
        }
    }

    /// Build a complete image for `tree` (calling [`FsTree::post_process`]
    /// if it hasn't already run) and write it to `out`.
    pub fn write<W: Write + Seek>(&self, tree: &mut FsTree, mut out: W) -> Result<()> {
        tree.post_process()?;
        info!("writing image: {} inodes", tree.inode_ptrs.len());

        let block_log = self.block_size.trailing_zeros() as u16;
        let type_endian = self.kind.inner.type_endian;

        // 1. reserve super-block bytes.
        out.write_all(&[0u8; 96])?;

        // 2. block processor over every regular file, in the tree's current
        // (post-sort-file) order.
        let mut block_results = FxHashMap::default();
        let mut bp = BlockProcessor::new(
            &mut out,
            self.worker_count,
            self.max_backlog,
            self.compressor,
            Kind::from_kind(&self.kind),
            self.block_size,
            self.pad_len,
        );
        for &id in &tree.file_list {
            let NodePayload::File { source, inode } = &tree.arena[id].payload else { unreachable!() };
            let flags = BlockFlags {
                dont_compress: inode.flags.has(crate::fstree::node::FileFlag::DontCompress),
                dont_fragment: inode.flags.has(crate::fstree::node::FileFlag::DontFragment),
                align: inode.flags.has(crate::fstree::node::FileFlag::Align),
                no_sparse: inode.flags.has(crate::fstree::node::FileFlag::NoSparse),
            };
            let reader: Box<dyn std::io::Read + Send> = match source {
                Some(FileSource::Path(p)) => Box::new(std::fs::File::open(p)?),
                Some(FileSource::Reader(_)) => {
                    // Reader sources were constructed with `Option::take` in
                    // mind elsewhere; the writer only ever sees a tree freshly
                    // drained from a directory iterator, whose readers are
                    // consumed exactly once here.
                    let NodePayload::File { source, .. } = &mut tree.arena[id].payload else {
                        unreachable!()
                    };
                    match source.take() {
                        Some(FileSource::Reader(r)) => r,
                        _ => unreachable!(),
                    }
                }
                None => Box::new(std::io::empty()),
            };
            let result = bp.add_file(reader, inode.file_size, flags)?;
            block_results.insert(id, result);
        }
        bp.flush_fragment()?;
        let fragments = bp.fragments().to_vec();

        // 3 & 4: walk inode_ptrs bottom-up (children precede parents by
        // construction), writing each directory's entry listing before its
        // own inode so the inode can reference the listing's address.
        let mut inode_writer = MetadataWriter::new(self.compressor, self.block_size, Kind::from_kind(&self.kind));
        let mut dir_writer = MetadataWriter::new(self.compressor, self.block_size, Kind::from_kind(&self.kind));
        let mut xattr_dedup = XattrWriterDedup::new();
        let mut inode_addr: FxHashMap<NodeId, (u32, u16)> = FxHashMap::default();
        let mut inode_type: FxHashMap<NodeId, InodeId> = FxHashMap::default();
        let mut id_table = vec![Id::new(0)];
        let mut id_index: FxHashMap<u32, u16> = FxHashMap::default();
        id_index.insert(0, 0);

        let mut id_for = |val: u32, id_table: &mut Vec<Id>, id_index: &mut FxHashMap<u32, u16>| -> u16 {
            if let Some(&i) = id_index.get(&val) {
                return i;
            }
            let i = id_table.len() as u16;
            id_table.push(Id::new(val));
            id_index.insert(val, i);
            i
        };

        let order = tree.inode_ptrs.clone();
        for &id in &order {
            let node_xattr_index = if self.no_xattrs || tree.arena[id].xattrs.is_empty() {
                crate::squashfs::NO_XATTR_INDEX
            } else {
                let mut set = XattrSet::default();
                for (k, v) in &tree.arena[id].xattrs {
                    set.insert(k.clone(), v.clone());
                }
                xattr_dedup.add(set)
            };
            tree.arena[id].xattr_index = node_xattr_index;

            let link_count = tree.link_count(id);
            let (uid, gid) = if self.only_root_id {
                (0, 0)
            } else {
                (tree.arena[id].uid, tree.arena[id].gid)
            };
            let uid_idx = id_for(uid, &mut id_table, &mut id_index);
            let gid_idx = id_for(gid, &mut id_table, &mut id_index);
            let mtime = tree.arena[id].mtime.clamp(0, u32::MAX as i64) as u32;
            let header = InodeHeader {
                permissions: (tree.arena[id].mode & 0o7777) as u16,
                uid: uid_idx,
                gid: gid_idx,
                mtime,
                inode_number: tree.arena[id].inode_number,
            };

            let (inode_id, inner) = match &tree.arena[id].payload {
                NodePayload::Directory { children, .. } => {
                    let (dir_start, dir_offset, dir_size, dir_index_entries) =
                        self.write_directory_entries(tree, id, children, &inode_addr, &inode_type, &mut dir_writer)?;
                    let parent_inode = tree.arena[id].parent.map(|p| tree.arena[p].inode_number).unwrap_or(1);
                    let needs_extended =
                        node_xattr_index != crate::squashfs::NO_XATTR_INDEX || !dir_index_entries.is_empty() || dir_size > 0xffff;
                    if needs_extended {
                        (
                            InodeId::ExtendedDirectory,
                            InodeInner::ExtendedDirectory(ExtendedDirectory {
                                link_count,
                                file_size: dir_size as u32,
                                block_index: dir_start,
                                parent_inode,
                                index_count: dir_index_entries.len() as u16,
                                block_offset: dir_offset,
                                xattr_index: node_xattr_index,
                                dir_index: dir_index_entries,
                            }),
                        )
                    } else {
                        (
                            InodeId::BasicDirectory,
                            InodeInner::BasicDirectory(BasicDirectory {
                                block_index: dir_start,
                                link_count,
                                file_size: dir_size as u16,
                                block_offset: dir_offset,
                                parent_inode,
                            }),
                        )
                    }
                }
                NodePayload::File { inode, .. } => {
                    let result = block_results.get(&id).cloned().unwrap_or_default();
                    let sparse = result.sparse;
                    let needs_extended = link_count > 1
                        || node_xattr_index != crate::squashfs::NO_XATTR_INDEX
                        || sparse > 0
                        || result.blocks_start > u64::from(u32::MAX);
                    if needs_extended {
                        (
                            InodeId::ExtendedFile,
                            InodeInner::ExtendedFile(ExtendedFile {
                                blocks_start: result.blocks_start,
                                file_size: inode.file_size,
                                sparse,
                                link_count,
                                frag_index: if result.block_sizes.is_empty() && inode.file_size > 0 {
                                    result.frag_index
                                } else if inode.file_size % u64::from(self.block_size) != 0
                                    && !inode
                                        .flags
                                        .has(crate::fstree::node::FileFlag::DontFragment)
                                {
                                    result.frag_index
                                } else {
                                    crate::squashfs::NO_FRAGMENT_INDEX
                                },
                                block_offset: result.frag_offset,
                                xattr_index: node_xattr_index,
                                block_sizes: result.block_sizes,
                            }),
                        )
                    } else {
                        (
                            InodeId::BasicFile,
                            InodeInner::BasicFile(BasicFile {
                                blocks_start: result.blocks_start as u32,
                                frag_index: if inode.file_size % u64::from(self.block_size) != 0
                                    && !inode
                                        .flags
                                        .has(crate::fstree::node::FileFlag::DontFragment)
                                {
                                    result.frag_index
                                } else {
                                    crate::squashfs::NO_FRAGMENT_INDEX
                                },
                                block_offset: result.frag_offset,
                                file_size: inode.file_size as u32,
                                block_sizes: result.block_sizes,
                            }),
                        )
                    }
                }
                NodePayload::Symlink { target } => {
                    let needs_extended = link_count > 1 || node_xattr_index != crate::squashfs::NO_XATTR_INDEX;
                    if needs_extended {
                        (
                            InodeId::ExtendedSymlink,
                            InodeInner::ExtendedSymlink(ExtendedSymlink {
                                link_count,
                                target_size: target.len() as u32,
                                target_path: target.clone(),
                                xattr_index: node_xattr_index,
                            }),
                        )
                    } else {
                        (
                            InodeId::BasicSymlink,
                            InodeInner::BasicSymlink(BasicSymlink {
                                link_count,
                                target_size: target.len() as u32,
                                target_path: target.clone(),
                            }),
                        )
                    }
                }
                NodePayload::Device { major, minor } => {
                    let device_number = BasicDeviceSpecialFile::pack(*major, *minor);
                    let needs_extended = link_count > 1 || node_xattr_index != crate::squashfs::NO_XATTR_INDEX;
                    let is_char = tree.arena[id].mode & 0o170000 == 0o020000;
                    let (basic_id, ext_id) = if is_char {
                        (InodeId::BasicCharacterDevice, InodeId::ExtendedCharDevice)
                    } else {
                        (InodeId::BasicBlockDevice, InodeId::ExtendedBlockDevice)
                    };
                    if needs_extended {
                        (
                            ext_id,
                            InodeInner::ExtendedBlockDevice(ExtendedDeviceSpecialFile {
                                link_count,
                                device_number,
                                xattr_index: node_xattr_index,
                            }),
                        )
                    } else {
                        (basic_id, InodeInner::BasicBlockDevice(BasicDeviceSpecialFile { link_count, device_number }))
                    }
                }
                NodePayload::Fifo | NodePayload::Socket => {
                    let is_fifo = matches!(tree.arena[id].payload, NodePayload::Fifo);
                    let needs_extended = link_count > 1 || node_xattr_index != crate::squashfs::NO_XATTR_INDEX;
                    let (basic_id, ext_id) = if is_fifo {
                        (InodeId::BasicFifo, InodeId::ExtendedFifo)
                    } else {
                        (InodeId::BasicSocket, InodeId::ExtendedSocket)
                    };
                    if needs_extended {
                        (ext_id, InodeInner::ExtendedFifo(ExtendedIpc { link_count, xattr_index: node_xattr_index }))
                    } else {
                        (basic_id, InodeInner::BasicFifo(BasicIpc { link_count }))
                    }
                }
                NodePayload::HardLink(_) => unreachable!("hard links are filtered out of inode_ptrs"),
            };

            let inode = Inode::new(inode_id, header, inner);
            let addr = inode.write(&mut inode_writer, type_endian)?;
            inode_addr.insert(id, addr);
            inode_type.insert(id, inode_id.into_base_type());
        }

        let root_id = tree.root();
        let root_addr = *inode_addr.get(&root_id).expect("root inode was written");
        let root_inode = (u64::from(root_addr.0) << 16) | u64::from(root_addr.1);

        // 5. flush fragment/id/export/xattr tables.
        let mut superblock = SuperBlock::new(self.compressor.id, Kind::from_kind(&self.kind));
        superblock.block_size = self.block_size;
        superblock.block_log = block_log;
        superblock.mod_time = self.mod_time;
        superblock.inode_count = tree.inode_ptrs.len() as u32;
        superblock.root_inode = root_inode;
        superblock.set_exportable(self.exportable);

        let compressor_options_bytes =
            self.kind.inner.compressor.compression_options(&mut superblock, &self.kind, self.compressor)?;
        out.seek(SeekFrom::Start(96))?;
        out.write_all(&compressor_options_bytes)?;

        let inode_table_start = out.stream_position()?;
        inode_writer.finalize(&mut out)?;
        superblock.inode_table = inode_table_start;

        let dir_table_start = out.stream_position()?;
        dir_writer.finalize(&mut out)?;
        superblock.dir_table = dir_table_start;

        superblock.bytes_used = out.stream_position()?;

        if !fragments.is_empty() {
            superblock.frag_count = fragments.len() as u32;
            let frag_table = table::write_table(&mut out, &fragments, self.compressor, self.block_size, &self.kind)?;
            superblock.frag_table = frag_table;
            superblock.set_always_fragments(false);
        } else {
            superblock.set_no_fragments(true);
        }

        superblock.id_count = id_table.len() as u16;
        let id_table_ptr = table::write_table(&mut out, &id_table, self.compressor, self.block_size, &self.kind)?;
        superblock.id_table = id_table_ptr;

        if self.exportable {
            let mut exports = vec![Export::new(0, 0); tree.inode_ptrs.len()];
            for (&id, &(start, offset)) in &inode_addr {
                let num = tree.arena[id].inode_number;
                if num > 0 {
                    exports[(num - 1) as usize] = Export::new(start, offset);
                }
            }
            let export_table = table::write_table(&mut out, &exports, self.compressor, self.block_size, &self.kind)?;
            superblock.export_table = export_table;
        }

        if xattr_dedup.sets().is_empty() || self.no_xattrs {
            superblock.set_no_xattrs(true);
        } else {
            let xattr_table = self.write_xattr_tables(&mut out, xattr_dedup.sets())?;
            superblock.xattr_table = xattr_table;
        }

        let pos = out.stream_position()?;
        let pad = (u64::from(self.pad_len) - pos % u64::from(self.pad_len)) % u64::from(self.pad_len);
        if pad > 0 {
            out.write_all(&vec![0u8; pad as usize])?;
        }
        superblock.bytes_used = pos;

        out.seek(SeekFrom::Start(0))?;
        let mut buf = Cursor::new(Vec::new());
        let mut writer = deku::writer::Writer::new(&mut buf);
        deku::DekuWriter::to_writer(
            &superblock,
            &mut writer,
            (self.kind.inner.magic, self.kind.inner.version_major, self.kind.inner.version_minor, type_endian),
        )?;
        out.write_all(&buf.into_inner())?;
        trace!("image complete: {} bytes used", superblock.bytes_used);
        Ok(())
    }

    /// Build the directory-table entries for `children` of directory `id`,
    /// writing them to `dir_writer` and returning `(start, offset, uncompressed
    /// size, dir_index entries)` for the owning inode.
    fn write_directory_entries(
        &self,
        tree: &FsTree,
        _id: NodeId,
        children: &[NodeId],
        inode_addr: &FxHashMap<NodeId, (u32, u16)>,
        inode_type: &FxHashMap<NodeId, InodeId>,
        dir_writer: &mut MetadataWriter,
    ) -> Result<(u32, u16, u64, Vec<crate::dir::DirectoryIndex>)> {
        let mut named: Vec<(Vec<u8>, NodeId)> = children
            .iter()
            .map(|&c| (tree.arena[c].name.clone(), c))
            .collect();
        named.sort_by(|a, b| a.0.cmp(&b.0));

        let mut pending = vec![];
        for (name, child) in named {
            let resolved = match &tree.arena[child].payload {
                NodePayload::HardLink(HardLinkState::Resolved(target)) => *target,
                _ => child,
            };
            let (start, offset) = *inode_addr
                .get(&resolved)
                .ok_or_else(|| SquashTarError::Internal("child inode written out of order".into()))?;
            let inode_type = *inode_type.get(&resolved).expect("child inode type recorded");
            pending.push(PendingEntry {
                start,
                inode_number: tree.arena[resolved].inode_number,
                offset,
                inode_type,
                name,
            });
        }

        let start = dir_writer.metadata_start;
        let offset = dir_writer.buffered_len() as u16;
        if pending.is_empty() {
            return Ok((start, offset, 0, vec![]));
        }

        let dirs = dir::build_headers(&pending);
        let mut dir_index = vec![];
        let mut cumulative = 0u32;
        for (i, d) in dirs.iter().enumerate() {
            let mut buf = Cursor::new(Vec::new());
            let mut writer = deku::writer::Writer::new(&mut buf);
            deku::DekuWriter::to_writer(d, &mut writer, self.kind.inner.type_endian)?;
            let bytes = buf.into_inner();
            if i > 0 {
                let first_name = d.dir_entries.first().map(|e| e.name.clone()).unwrap_or_default();
                dir_index.push(crate::dir::DirectoryIndex {
                    index: cumulative,
                    start: dir_writer.metadata_start - start,
                    name_size: first_name.len().saturating_sub(1) as u32,
                    name: first_name,
                });
            }
            cumulative += bytes.len() as u32;
            dir_writer.write_all(&bytes)?;
        }

        Ok((start, offset, cumulative as u64, dir_index))
    }

    /// Serialize the three-level xattr structure (spec §4.D supplement):
    /// key/value pairs deduplicated into one meta-block stream, an id table
    /// of `(ref, count, size)` triples, and the small header super block's
    /// `xattr_table` field points at.
    fn write_xattr_tables<W: Write + Seek>(&self, out: &mut W, sets: &[XattrSet]) -> Result<u64> {
        let mut kv_writer = MetadataWriter::new(self.compressor, self.block_size, Kind::from_kind(&self.kind));
        let mut ids = vec![];

        for set in sets {
            let start = kv_writer.metadata_start;
            let offset = kv_writer.buffered_len() as u16;
            let mut size = 0u32;
            for (key, value) in &set.pairs {
                let (prefix, suffix) = split_xattr_key(key);
                let entry = crate::xattr::XattrEntry {
                    kind: prefix as u16,
                    name_size: suffix.len() as u16,
                    name: suffix.as_bytes().to_vec(),
                };
                let mut buf = Cursor::new(Vec::new());
                let mut writer = deku::writer::Writer::new(&mut buf);
                deku::DekuWriter::to_writer(&entry, &mut writer, self.kind.inner.type_endian)?;
                let entry_bytes = buf.into_inner();
                size += entry_bytes.len() as u32;
                kv_writer.write_all(&entry_bytes)?;

                let value_rec = crate::xattr::XattrValue { size: value.len() as u32, value: value.clone() };
                let mut vbuf = Cursor::new(Vec::new());
                let mut vwriter = deku::writer::Writer::new(&mut vbuf);
                deku::DekuWriter::to_writer(&value_rec, &mut vwriter, self.kind.inner.type_endian)?;
                let value_bytes = vbuf.into_inner();
                size += value_bytes.len() as u32;
                kv_writer.write_all(&value_bytes)?;
            }
            let xattr_ref = (u64::from(start) << 16) | u64::from(offset);
            ids.push(crate::xattr::XattrId { xattr_ref, count: set.pairs.len() as u32, size });
        }

        let kv_table_start = out.stream_position()?;
        kv_writer.finalize(out)?;

        let id_table_start =
            table::write_table(out, &ids, self.compressor, self.block_size, &self.kind)?;

        let header_pos = out.stream_position()?;
        let header = crate::xattr::XattrIdTable {
            xattr_table_start: id_table_start,
            xattr_ids: ids.len() as u32,
            unused: 0,
        };
        let mut buf = Cursor::new(Vec::new());
        let mut writer = deku::writer::Writer::new(&mut buf);
        deku::DekuWriter::to_writer(&header, &mut writer, self.kind.inner.type_endian)?;
        out.write_all(&buf.into_inner())?;
        let _ = kv_table_start;
        Ok(header_pos)
    }
}

/// Split a fully-qualified xattr key (`user.foo`) into its prefix enum and
/// the bare suffix (`foo`) stored on disk.
fn split_xattr_key(key: &str) -> (crate::xattr::XattrPrefix, &str) {
    use crate::xattr::XattrPrefix;
    for (prefix, enum_val) in [
        ("user.", XattrPrefix::User),
        ("trusted.", XattrPrefix::Trusted),
        ("security.", XattrPrefix::Security),
    ] {
        if let Some(suffix) = key.strip_prefix(prefix) {
            return (enum_val, suffix);
        }
    }
    (XattrPrefix::User, key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compressor::Compressor;
    use crate::fstree::node::{FileInode, FsTreeDefaults, NodeMetadata};
    use crate::kinds::LE_V4_0;
    use std::io::Cursor;
    use std::sync::Arc;

    fn kind() -> Kind {
        Kind { inner: Arc::new(LE_V4_0) }
    }

    #[test]
    fn writes_superblock_with_expected_magic_and_root() {
        let mut tree = FsTree::new(FsTreeDefaults::default());
        let meta = NodeMetadata { mode: 0o100644, uid: 0, gid: 0, mtime: 0 };
        tree.add_generic(
            "hello.txt",
            meta,
            NodePayload::File {
                source: Some(FileSource::Reader(Box::new(Cursor::new(b"hi".to_vec())))),
                inode: FileInode { file_size: 2, ..FileInode::default() },
            },
        )
        .unwrap();

        let mut writer = FilesystemWriter::new(kind());
        writer.compressor = FilesystemCompressor::new(Compressor::None, None).unwrap();
        let mut out = Cursor::new(Vec::new());
        writer.write(&mut tree, &mut out).unwrap();

        let bytes = out.into_inner();
        assert_eq!(&bytes[0..4], b"hsqs");
        assert!(bytes.len() >= 96);
    }

    #[test]
    fn empty_root_directory_round_trips() {
        let mut tree = FsTree::new(FsTreeDefaults::default());
        let writer = FilesystemWriter::new(kind());
        let mut out = Cursor::new(Vec::new());
        writer.write(&mut tree, &mut out).unwrap();
        assert_eq!(&out.into_inner()[0..4], b"hsqs");
    }
}
