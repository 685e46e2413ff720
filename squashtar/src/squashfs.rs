//! The super block: the 96-byte header at the start of every image, plus the
//! flag bits and size constants that govern the rest of the layout.

use deku::prelude::*;

use crate::compressor::Compressor;
use crate::kinds::Kind;

/// 128 KiB, the default data block size.
pub const DEFAULT_BLOCK_SIZE: u32 = 0x20000;

/// 4 KiB device-block padding, applied to the final image length.
pub const DEFAULT_PAD_LEN: u32 = 0x1000;

const DEFAULT_BLOCK_LOG: u16 = 0x11;

/// 1 MiB, the largest legal data block size.
pub const MAX_BLOCK_SIZE: u32 = 0x10_0000;

/// 4 KiB, the smallest legal data block size.
pub const MIN_BLOCK_SIZE: u32 = 0x1000;

/// Sentinel used in on-disk table-offset fields for "table absent".
pub const NOT_SET: u64 = 0xffff_ffff_ffff_ffff;

/// Sentinel `frag_index`/`xattr_index` value meaning "none".
pub const NO_XATTR_INDEX: u32 = 0xffff_ffff;
pub const NO_FRAGMENT_INDEX: u32 = 0xffff_ffff;

/// The 96-byte header that opens every image and records where every other
/// table lives.
#[derive(Debug, Copy, Clone, DekuRead, DekuWrite, PartialEq, Eq)]
#[deku(
    endian = "ctx_type_endian",
    ctx = "ctx_magic: [u8; 4], ctx_version_major: u16, ctx_version_minor: u16, ctx_type_endian: deku::ctx::Endian"
)]
pub struct SuperBlock {
    #[deku(assert_eq = "ctx_magic")]
    pub magic: [u8; 4],
    pub inode_count: u32,
    pub mod_time: u32,
    pub block_size: u32,
    pub frag_count: u32,
    pub compressor: Compressor,
    pub block_log: u16,
    pub flags: u16,
    pub id_count: u16,
    #[deku(assert_eq = "ctx_version_major")]
    pub version_major: u16,
    #[deku(assert_eq = "ctx_version_minor")]
    pub version_minor: u16,
    pub root_inode: u64,
    pub bytes_used: u64,
    pub id_table: u64,
    pub xattr_table: u64,
    pub inode_table: u64,
    pub dir_table: u64,
    pub frag_table: u64,
    pub export_table: u64,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u16)]
#[rustfmt::skip]
pub enum Flags {
    InodesStoredUncompressed    = 0b0000_0000_0000_0001,
    DataBlockStoredUncompressed = 0b0000_0000_0000_0010,
    Unused                      = 0b0000_0000_0000_0100,
    FragmentsStoredUncompressed = 0b0000_0000_0000_1000,
    NoFragments                 = 0b0000_0000_0001_0000,
    AlwaysFragments             = 0b0000_0000_0010_0000,
    DataHasBeenDeduplicated     = 0b0000_0000_0100_0000,
    Exportable                  = 0b0000_0000_1000_0000,
    XattrsAreStoredUncompressed = 0b0000_0001_0000_0000,
    NoXattrs                    = 0b0000_0010_0000_0000,
    CompressorOptionsArePresent = 0b0000_0100_0000_0000,
}

impl SuperBlock {
    pub fn new(compressor: Compressor, kind: Kind) -> Self {
        Self {
            magic: kind.inner.magic,
            inode_count: 0,
            mod_time: 0,
            block_size: DEFAULT_BLOCK_SIZE,
            frag_count: 0,
            compressor,
            block_log: DEFAULT_BLOCK_LOG,
            flags: 0,
            id_count: 0,
            version_major: kind.inner.version_major,
            version_minor: kind.inner.version_minor,
            root_inode: 0,
            bytes_used: 0,
            id_table: NOT_SET,
            xattr_table: NOT_SET,
            inode_table: NOT_SET,
            dir_table: NOT_SET,
            frag_table: NOT_SET,
            export_table: NOT_SET,
        }
    }

    fn flag(&self, f: Flags) -> bool {
        self.flags & f as u16 != 0
    }

    fn set_flag(&mut self, f: Flags, on: bool) {
        if on {
            self.flags |= f as u16;
        } else {
            self.flags &= !(f as u16);
        }
    }

    pub fn set_no_fragments(&mut self, on: bool) {
        self.set_flag(Flags::NoFragments, on);
    }

    pub fn set_always_fragments(&mut self, on: bool) {
        self.set_flag(Flags::AlwaysFragments, on);
    }

    pub fn set_data_has_been_deduplicated(&mut self, on: bool) {
        self.set_flag(Flags::DataHasBeenDeduplicated, on);
    }

    pub fn set_exportable(&mut self, on: bool) {
        self.set_flag(Flags::Exportable, on);
    }

    pub fn set_no_xattrs(&mut self, on: bool) {
        self.set_flag(Flags::NoXattrs, on);
    }

    pub fn set_compressor_options_are_present(&mut self, on: bool) {
        self.set_flag(Flags::CompressorOptionsArePresent, on);
    }

    pub fn inodes_uncompressed(&self) -> bool {
        self.flag(Flags::InodesStoredUncompressed)
    }
    pub fn data_block_stored_uncompressed(&self) -> bool {
        self.flag(Flags::DataBlockStoredUncompressed)
    }
    pub fn fragments_stored_uncompressed(&self) -> bool {
        self.flag(Flags::FragmentsStoredUncompressed)
    }
    pub fn no_fragments(&self) -> bool {
        self.flag(Flags::NoFragments)
    }
    pub fn always_fragments(&self) -> bool {
        self.flag(Flags::AlwaysFragments)
    }
    pub fn data_has_been_deduplicated(&self) -> bool {
        self.flag(Flags::DataHasBeenDeduplicated)
    }
    pub fn exportable(&self) -> bool {
        self.flag(Flags::Exportable)
    }
    /// Alias for [`Self::exportable`] matching the name used at NFS-export
    /// call sites.
    pub fn nfs_export_table_exists(&self) -> bool {
        self.exportable()
    }
    pub fn xattrs_are_stored_uncompressed(&self) -> bool {
        self.flag(Flags::XattrsAreStoredUncompressed)
    }
    pub fn no_xattrs(&self) -> bool {
        self.flag(Flags::NoXattrs)
    }
    pub fn compressor_options_are_present(&self) -> bool {
        self.flag(Flags::CompressorOptionsArePresent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinds::LE_V4_0;
    use std::sync::Arc;

    #[test]
    fn new_superblock_has_not_set_tables() {
        let sb = SuperBlock::new(Compressor::Xz, Kind { inner: Arc::new(LE_V4_0) });
        assert_eq!(sb.id_table, NOT_SET);
        assert_eq!(sb.magic, *b"hsqs");
        assert_eq!(sb.version_major, 4);
        assert_eq!(sb.version_minor, 0);
    }

    #[test]
    fn no_fragments_overrides_always_fragments() {
        let mut sb = SuperBlock::new(Compressor::Xz, Kind { inner: Arc::new(LE_V4_0) });
        sb.flags |= Flags::AlwaysFragments as u16;
        sb.flags &= !(Flags::AlwaysFragments as u16);
        sb.flags |= Flags::NoFragments as u16;
        assert!(sb.no_fragments());
        assert!(!sb.always_fragments());
    }
}
