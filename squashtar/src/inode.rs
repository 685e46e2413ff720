//! On-disk inode records: the basic/extended variants for each file type and
//! the size-record bit layout shared by block lists and fragment entries.

use core::fmt;
use std::io::Cursor;

use deku::prelude::*;
use deku::writer::Writer;

use crate::dir::DirectoryIndex;
use crate::error::Result;
use crate::metadata::MetadataWriter;
use crate::squashfs::{NO_FRAGMENT_INDEX, NO_XATTR_INDEX};

/// bit 24 of a block/fragment size record: clear means compressed.
const DATA_STORED_UNCOMPRESSED: u32 = 1 << 24;

/// A 32-bit per-block size record: low 24 bits are the on-disk size, bit 24
/// is the "stored uncompressed" flag. Zero means "sparse hole".
#[derive(Copy, Clone, Debug, Default, DekuRead, DekuWrite, PartialEq, Eq)]
#[deku(endian = "endian", ctx = "endian: deku::ctx::Endian")]
pub struct DataSize(u32);

impl DataSize {
    pub fn new(size: u32, uncompressed: bool) -> Self {
        assert!(size <= DATA_STORED_UNCOMPRESSED, "block size overflows 24 bits");
        Self(size | if uncompressed { DATA_STORED_UNCOMPRESSED } else { 0 })
    }

    pub fn sparse() -> Self {
        Self(0)
    }

    pub fn is_sparse(&self) -> bool {
        self.size() == 0
    }

    pub fn uncompressed(&self) -> bool {
        self.0 & DATA_STORED_UNCOMPRESSED != 0
    }

    pub fn size(&self) -> u32 {
        self.0 & !DATA_STORED_UNCOMPRESSED
    }
}

#[derive(Debug, DekuRead, DekuWrite, Clone, Copy, PartialEq, Eq)]
#[deku(type = "u16")]
#[deku(endian = "endian", ctx = "endian: deku::ctx::Endian")]
#[rustfmt::skip]
pub enum InodeId {
    BasicDirectory       = 1,
    BasicFile            = 2,
    BasicSymlink         = 3,
    BasicBlockDevice     = 4,
    BasicCharacterDevice = 5,
    BasicFifo            = 6,
    BasicSocket          = 7,
    ExtendedDirectory    = 8,
    ExtendedFile         = 9,
    ExtendedSymlink      = 10,
    ExtendedBlockDevice  = 11,
    ExtendedCharDevice   = 12,
    ExtendedFifo         = 13,
    ExtendedSocket       = 14,
}

impl InodeId {
    /// The basic variant an extended inode "degrades to" for directory-entry
    /// type tags (directories and regular files only — the others have no
    /// distinct basic/extended split in the entry type tag).
    pub fn into_base_type(self) -> Self {
        match self {
            Self::ExtendedDirectory => Self::BasicDirectory,
            Self::ExtendedFile => Self::BasicFile,
            Self::ExtendedSymlink => Self::BasicSymlink,
            Self::ExtendedBlockDevice => Self::BasicBlockDevice,
            Self::ExtendedCharDevice => Self::BasicCharacterDevice,
            Self::ExtendedFifo => Self::BasicFifo,
            Self::ExtendedSocket => Self::BasicSocket,
            other => other,
        }
    }
}

#[derive(Debug, DekuRead, DekuWrite, Clone, Copy, PartialEq, Eq, Default)]
#[deku(endian = "endian", ctx = "endian: deku::ctx::Endian")]
pub struct InodeHeader {
    pub permissions: u16,
    /// index into the id table
    pub uid: u16,
    /// index into the id table
    pub gid: u16,
    pub mtime: u32,
    pub inode_number: u32,
}

#[derive(Debug, DekuRead, DekuWrite, Clone, PartialEq, Eq)]
#[deku(ctx = "bytes_used: u64, block_size: u32, block_log: u16, type_endian: deku::ctx::Endian")]
#[deku(endian = "type_endian")]
pub struct Inode {
    pub id: InodeId,
    pub header: InodeHeader,
    #[deku(ctx = "*id, bytes_used, block_size, block_log")]
    pub inner: InodeInner,
}

impl Inode {
    pub fn new(id: InodeId, header: InodeHeader, inner: InodeInner) -> Self {
        Self { id, header, inner }
    }

    /// Serialize into `m_writer`, returning the `(start, offset)` address at
    /// which the inode now lives — the directory table stores this pair as
    /// the entry's inode reference.
    pub fn write(
        &self,
        m_writer: &mut MetadataWriter,
        type_endian: deku::ctx::Endian,
    ) -> Result<(u32, u16)> {
        let mut buf = Cursor::new(Vec::new());
        let mut writer = Writer::new(&mut buf);
        self.to_writer(&mut writer, (0xffff_ffff_ffff_ffff, u32::MAX, u16::MAX, type_endian))?;
        let start = m_writer.metadata_start;
        let offset = m_writer.buffered_len() as u16;
        std::io::Write::write_all(m_writer, &buf.into_inner())?;
        Ok((start, offset))
    }
}

#[derive(Debug, DekuRead, DekuWrite, Clone, PartialEq, Eq)]
#[deku(
    ctx = "endian: deku::ctx::Endian, id: InodeId, bytes_used: u64, block_size: u32, block_log: u16"
)]
#[deku(endian = "endian")]
#[deku(id = "id")]
pub enum InodeInner {
    #[deku(id = "InodeId::BasicDirectory")]
    BasicDirectory(BasicDirectory),
    #[deku(id = "InodeId::BasicFile")]
    BasicFile(#[deku(ctx = "block_size, block_log")] BasicFile),
    #[deku(id = "InodeId::BasicSymlink")]
    BasicSymlink(BasicSymlink),
    #[deku(id = "InodeId::BasicBlockDevice")]
    BasicBlockDevice(BasicDeviceSpecialFile),
    #[deku(id = "InodeId::BasicCharacterDevice")]
    BasicCharacterDevice(BasicDeviceSpecialFile),
    #[deku(id = "InodeId::BasicFifo")]
    BasicFifo(BasicIpc),
    #[deku(id = "InodeId::BasicSocket")]
    BasicSocket(BasicIpc),
    #[deku(id = "InodeId::ExtendedDirectory")]
    ExtendedDirectory(ExtendedDirectory),
    #[deku(id = "InodeId::ExtendedFile")]
    ExtendedFile(#[deku(ctx = "bytes_used, block_size, block_log")] ExtendedFile),
    #[deku(id = "InodeId::ExtendedSymlink")]
    ExtendedSymlink(ExtendedSymlink),
    #[deku(id = "InodeId::ExtendedBlockDevice")]
    ExtendedBlockDevice(ExtendedDeviceSpecialFile),
    #[deku(id = "InodeId::ExtendedCharDevice")]
    ExtendedCharDevice(ExtendedDeviceSpecialFile),
    #[deku(id = "InodeId::ExtendedFifo")]
    ExtendedFifo(ExtendedIpc),
    #[deku(id = "InodeId::ExtendedSocket")]
    ExtendedSocket(ExtendedIpc),
}

#[derive(Debug, DekuRead, DekuWrite, Clone, PartialEq, Eq)]
#[deku(endian = "endian", ctx = "endian: deku::ctx::Endian")]
pub struct BasicDirectory {
    pub block_index: u32,
    pub link_count: u32,
    pub file_size: u16,
    pub block_offset: u16,
    pub parent_inode: u32,
}

#[derive(Debug, DekuRead, DekuWrite, Clone, PartialEq, Eq)]
#[deku(endian = "endian", ctx = "endian: deku::ctx::Endian")]
pub struct ExtendedDirectory {
    pub link_count: u32,
    pub file_size: u32,
    pub block_index: u32,
    pub parent_inode: u32,
    #[deku(assert = "*index_count < 256")]
    pub index_count: u16,
    pub block_offset: u16,
    pub xattr_index: u32,
    #[deku(count = "*index_count")]
    pub dir_index: Vec<DirectoryIndex>,
}

#[derive(Debug, DekuRead, DekuWrite, Clone, PartialEq, Eq)]
#[deku(endian = "endian", ctx = "endian: deku::ctx::Endian, block_size: u32, block_log: u16")]
pub struct BasicFile {
    pub blocks_start: u32,
    pub frag_index: u32,
    pub block_offset: u32,
    pub file_size: u32,
    #[deku(count = "block_count(block_size, block_log, *frag_index, *file_size as u64)")]
    pub block_sizes: Vec<DataSize>,
}

#[derive(Debug, DekuRead, DekuWrite, Clone, PartialEq, Eq)]
#[deku(endian = "endian", ctx = "endian: deku::ctx::Endian, bytes_used: u64, block_size: u32, block_log: u16")]
pub struct ExtendedFile {
    pub blocks_start: u64,
    pub file_size: u64,
    /// total bytes skipped by sparse (zero-size) blocks in this file.
    pub sparse: u64,
    pub link_count: u32,
    pub frag_index: u32,
    pub block_offset: u32,
    pub xattr_index: u32,
    #[deku(count = "block_count(block_size, block_log, *frag_index, *file_size)")]
    pub block_sizes: Vec<DataSize>,
}

impl From<&ExtendedFile> for BasicFile {
    fn from(f: &ExtendedFile) -> Self {
        Self {
            blocks_start: f.blocks_start as u32,
            frag_index: f.frag_index,
            block_offset: f.block_offset,
            file_size: f.file_size as u32,
            block_sizes: f.block_sizes.clone(),
        }
    }
}

fn block_count(block_size: u32, block_log: u16, fragment: u32, file_size: u64) -> u64 {
    if fragment == NO_FRAGMENT_INDEX {
        (file_size + u64::from(block_size) - 1) >> block_log
    } else {
        file_size >> block_log
    }
}

#[derive(DekuRead, DekuWrite, Clone, PartialEq, Eq)]
#[deku(endian = "endian", ctx = "endian: deku::ctx::Endian")]
pub struct BasicSymlink {
    pub link_count: u32,
    #[deku(assert = "*target_size < 65536")]
    pub target_size: u32,
    #[deku(count = "target_size")]
    pub target_path: Vec<u8>,
}

impl fmt::Debug for BasicSymlink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicSymlink")
            .field("link_count", &self.link_count)
            .field("target_size", &self.target_size)
            .field("target_path", &self.target())
            .finish()
    }
}

impl BasicSymlink {
    pub fn target(&self) -> String {
        String::from_utf8_lossy(&self.target_path).into_owned()
    }
}

#[derive(Debug, DekuRead, DekuWrite, Clone, PartialEq, Eq)]
#[deku(endian = "endian", ctx = "endian: deku::ctx::Endian")]
pub struct BasicDeviceSpecialFile {
    pub link_count: u32,
    pub device_number: u32,
}

impl BasicDeviceSpecialFile {
    pub fn major(&self) -> u32 {
        self.device_number >> 8
    }
    pub fn minor(&self) -> u32 {
        self.device_number & 0xff
    }
    pub fn pack(major: u32, minor: u32) -> u32 {
        (major << 8) | (minor & 0xff)
    }
}

/// Fifo / socket: no payload beyond the link count.
#[derive(Debug, DekuRead, DekuWrite, Clone, PartialEq, Eq)]
#[deku(endian = "endian", ctx = "endian: deku::ctx::Endian")]
pub struct BasicIpc {
    pub link_count: u32,
}

/// Extended symlink: adds an xattr index after the basic symlink's payload.
/// Used whenever a symlink carries xattrs (its link count is always 1 —
/// symlinks can't be hard-linked to — so only the xattr case promotes it).
#[derive(DekuRead, DekuWrite, Clone, PartialEq, Eq)]
#[deku(endian = "endian", ctx = "endian: deku::ctx::Endian")]
pub struct ExtendedSymlink {
    pub link_count: u32,
    #[deku(assert = "*target_size < 65536")]
    pub target_size: u32,
    #[deku(count = "target_size")]
    pub target_path: Vec<u8>,
    pub xattr_index: u32,
}

impl fmt::Debug for ExtendedSymlink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtendedSymlink")
            .field("link_count", &self.link_count)
            .field("target_size", &self.target_size)
            .field("target_path", &self.target())
            .field("xattr_index", &self.xattr_index)
            .finish()
    }
}

impl ExtendedSymlink {
    pub fn target(&self) -> String {
        String::from_utf8_lossy(&self.target_path).into_owned()
    }
}

/// Extended block/char device: adds an xattr index after the basic payload.
#[derive(Debug, DekuRead, DekuWrite, Clone, PartialEq, Eq)]
#[deku(endian = "endian", ctx = "endian: deku::ctx::Endian")]
pub struct ExtendedDeviceSpecialFile {
    pub link_count: u32,
    pub device_number: u32,
    pub xattr_index: u32,
}

impl ExtendedDeviceSpecialFile {
    pub fn major(&self) -> u32 {
        self.device_number >> 8
    }
    pub fn minor(&self) -> u32 {
        self.device_number & 0xff
    }
}

/// Extended fifo/socket: adds an xattr index after the link count.
#[derive(Debug, DekuRead, DekuWrite, Clone, PartialEq, Eq)]
#[deku(endian = "endian", ctx = "endian: deku::ctx::Endian")]
pub struct ExtendedIpc {
    pub link_count: u32,
    pub xattr_index: u32,
}

pub fn xattr_index_none() -> u32 {
    NO_XATTR_INDEX
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_size_bit_layout() {
        let s = DataSize::new(0x1234, false);
        assert_eq!(s.size(), 0x1234);
        assert!(!s.uncompressed());

        let s = DataSize::new(0x1234, true);
        assert_eq!(s.size(), 0x1234);
        assert!(s.uncompressed());

        assert!(DataSize::sparse().is_sparse());
    }

    #[test]
    fn device_number_pack_roundtrip() {
        let packed = BasicDeviceSpecialFile::pack(4, 2);
        let dev = BasicDeviceSpecialFile { link_count: 1, device_number: packed };
        assert_eq!(dev.major(), 4);
        assert_eq!(dev.minor(), 2);
    }
}
