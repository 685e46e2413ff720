//! Storage of directories with references to inodes
//!
//! For each directory inode, the directory table stores a linear list of all entries,
//! with references back to the inodes that describe those entries.

use std::ffi::OsStr;
use std::path::{Component, Path};

use deku::prelude::*;

use crate::error::SquashTarError;
use crate::inode::InodeId;
use crate::os_traits::OsStrExt;

#[derive(Debug, DekuRead, DekuWrite, Clone, PartialEq, Eq)]
#[deku(ctx = "type_endian: deku::ctx::Endian")]
#[deku(endian = "type_endian")]
pub struct Dir {
    /// Number of entries following the header.
    ///
    /// A header must be followed by AT MOST 256 entries. If there are more entries, a new header MUST be emitted.
    #[deku(assert = "*count <= 256")]
    pub(crate) count: u32,
    /// The location of the metadata block in the inode table where the inodes are stored.
    /// This is relative to the inode table start from the super block.
    pub(crate) start: u32,
    /// An arbitrary inode number.
    /// The entries that follow store their inode number as a difference to this.
    pub(crate) inode_num: u32,
    #[deku(count = "*count + 1")]
    pub(crate) dir_entries: Vec<DirEntry>,
}

impl Dir {
    pub fn new(lowest_inode: u32) -> Self {
        Self {
            count: u32::default(),
            start: u32::default(),
            inode_num: lowest_inode,
            dir_entries: vec![],
        }
    }

    pub fn push(&mut self, entry: DirEntry) {
        self.dir_entries.push(entry);
        self.count = (self.dir_entries.len() - 1) as u32;
    }
}

#[derive(Debug, DekuRead, DekuWrite, Clone, PartialEq, Eq)]
#[deku(endian = "endian", ctx = "endian: deku::ctx::Endian")]
pub struct DirEntry {
    /// An offset into the uncompressed inode metadata block.
    pub(crate) offset: u16,
    /// The difference of this inode’s number to the reference stored in the header.
    pub(crate) inode_offset: i16,
    /// The inode type. For extended inodes, the basic type is stored here instead.
    pub(crate) t: InodeId,
    /// One less than the size of the entry name.
    pub(crate) name_size: u16,
    // TODO: CString
    /// The file name of the entry without a trailing null byte. Has name size + 1 bytes.
    #[deku(count = "*name_size + 1")]
    pub(crate) name: Vec<u8>,
}

impl DirEntry {
    pub fn name(&self) -> Result<&Path, SquashTarError> {
        // allow root and nothing else
        if self.name == Component::RootDir.as_os_str().as_bytes() {
            return Ok(Path::new(Component::RootDir.as_os_str()));
        }
        let path = Path::new(OsStr::from_bytes(&self.name));
        // if not a simple filename, return an error
        let filename = path.file_name().map(OsStrExt::as_bytes);
        if filename != Some(&self.name) {
            return Err(SquashTarError::corrupted("directory entry name is not a simple path component"));
        }
        Ok(path)
    }
}

#[derive(Debug, DekuRead, DekuWrite, Clone, PartialEq, Eq)]
#[deku(endian = "endian", ctx = "endian: deku::ctx::Endian")]
pub struct DirectoryIndex {
    /// This stores a byte offset from the first directory header to the current header,
    /// as if the uncompressed directory metadata blocks were laid out in memory consecutively.
    pub(crate) index: u32,
    /// Start offset of a directory table metadata block, relative to the directory table start.
    pub(crate) start: u32,
    #[deku(assert = "*name_size < 256")]
    pub(crate) name_size: u32,
    #[deku(count = "*name_size + 1")]
    pub(crate) name: Vec<u8>,
}

impl DirectoryIndex {
    pub fn name(&self) -> String {
        std::str::from_utf8(&self.name).unwrap().to_string()
    }
}

/// One directory entry pending assignment to a header, as handed to
/// [`build_headers`] by the tree writer.
pub struct PendingEntry {
    /// Metadata block this entry's inode lives in, relative to the inode
    /// table start.
    pub start: u32,
    /// Full inode number (not yet reduced to a header-relative delta).
    pub inode_number: u32,
    /// Offset into that metadata block's uncompressed bytes.
    pub offset: u16,
    /// Basic inode type tag (extended inodes already reduced via
    /// [`InodeId::into_base_type`]).
    pub inode_type: InodeId,
    pub name: Vec<u8>,
}

/// Split entries (already sorted by name) into one or more [`Dir`] headers.
///
/// A new header is started whenever any of the following would otherwise be
/// violated: the entry's metadata block differs from the header's `start`,
/// the signed 16-bit delta from the header's `inode_num` would overflow, or
/// the header would exceed 256 entries.
pub fn build_headers(entries: &[PendingEntry]) -> Vec<Dir> {
    let mut dirs = vec![];
    if entries.is_empty() {
        return dirs;
    }

    let mut iter = entries.iter().peekable();
    while iter.peek().is_some() {
        let start = iter.peek().unwrap().start;
        let inode_num = iter.peek().unwrap().inode_number;
        let mut dir = Dir::new(inode_num);
        dir.start = start;

        while let Some(e) = iter.peek() {
            if e.start != start || dir.dir_entries.len() >= 256 {
                break;
            }
            let delta = i64::from(e.inode_number) - i64::from(inode_num);
            let Ok(inode_offset) = i16::try_from(delta) else { break };

            let e = iter.next().unwrap();
            dir.push(DirEntry {
                offset: e.offset,
                inode_offset,
                t: e.inode_type,
                name_size: (e.name.len() - 1) as u16,
                name: e.name.clone(),
            });
        }

        dirs.push(dir);
    }

    dirs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_headers_splits_on_block_change() {
        let entries = vec![
            PendingEntry { start: 0, inode_number: 1, offset: 0, inode_type: InodeId::BasicFile, name: b"a".to_vec() },
            PendingEntry { start: 0, inode_number: 2, offset: 4, inode_type: InodeId::BasicFile, name: b"b".to_vec() },
            PendingEntry { start: 8, inode_number: 3, offset: 0, inode_type: InodeId::BasicFile, name: b"c".to_vec() },
        ];
        let dirs = build_headers(&entries);
        assert_eq!(dirs.len(), 2);
        assert_eq!(dirs[0].dir_entries.len(), 2);
        assert_eq!(dirs[1].dir_entries.len(), 1);
    }

    #[test]
    fn build_headers_splits_on_inode_delta_overflow() {
        let mut entries = vec![PendingEntry {
            start: 0,
            inode_number: 1,
            offset: 0,
            inode_type: InodeId::BasicFile,
            name: b"a".to_vec(),
        }];
        entries.push(PendingEntry {
            start: 0,
            inode_number: 1 + i32::from(i16::MAX) as u32 + 1,
            offset: 0,
            inode_type: InodeId::BasicFile,
            name: b"b".to_vec(),
        });
        let dirs = build_headers(&entries);
        assert_eq!(dirs.len(), 2);
    }

    #[test]
    fn build_headers_splits_on_256_cap() {
        let entries: Vec<PendingEntry> = (0..300)
            .map(|i| PendingEntry {
                start: 0,
                inode_number: 1 + i as u32,
                offset: 0,
                inode_type: InodeId::BasicFile,
                name: format!("f{i}").into_bytes(),
            })
            .collect();
        let dirs = build_headers(&entries);
        assert_eq!(dirs[0].dir_entries.len(), 256);
        assert_eq!(dirs.iter().map(|d| d.dir_entries.len()).sum::<usize>(), 300);
    }

    #[test]
    fn no_invalid_dir_entry() {
        // just root
        let dir = DirEntry {
            offset: 0x300,
            inode_offset: 0x0,
            t: InodeId::BasicDirectory,
            name_size: 0x1,
            name: b"/".to_vec(),
        };
        assert_eq!(Path::new("/"), dir.name().unwrap());

        // InvalidFilePath
        let dir = DirEntry {
            offset: 0x300,
            inode_offset: 0x0,
            t: InodeId::BasicDirectory,
            name_size: 0x1,
            name: b"/nice/".to_vec(),
        };
        assert!(dir.name().is_err());
    }
}
