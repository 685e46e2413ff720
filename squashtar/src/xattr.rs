//! Extended attributes.
//!
//! SquashFS stores xattrs with three levels of indirection: the key/value
//! pairs of each unique xattr set are deduplicated and packed consecutively
//! into meta-blocks; an "xattr id" table of fixed-size records points at the
//! first pair of each unique set along with a count and byte size; and a
//! small header (whose own location is recorded in the super block) points
//! at the meta-blocks backing the id table.

use std::collections::HashMap;
use std::io::{Cursor, Read, Seek, SeekFrom};

use deku::prelude::*;
use rustc_hash::FxHashMap;

use crate::error::{Result, SquashTarError};
use crate::kinds::Kind;
use crate::metadata;
use crate::reader::BufReadSeek;
use crate::squashfs::{SuperBlock, NOT_SET};

/// bit of [`XattrEntry::kind`] meaning the value is stored out-of-line:
/// the "value" that follows is itself an 8-byte reference to another
/// `XattrValue` elsewhere in the key/value stream.
const XATTR_VALUE_OOL: u16 = 0x100;

/// The three xattr namespaces SquashFS distinguishes in `kind`'s low byte.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum XattrPrefix {
    User,
    Trusted,
    Security,
}

/// One key, as stored in the key/value meta-block stream: a namespace
/// prefix, an is-out-of-line flag, and the suffix bytes that follow the
/// prefix's well-known string (`user.`, `trusted.`, `security.`).
#[derive(Debug, Clone, DekuRead, DekuWrite, PartialEq, Eq)]
#[deku(endian = "endian", ctx = "endian: deku::ctx::Endian")]
pub struct XattrEntry {
    /// low byte: [`XattrPrefix`] discriminant. Bit 8 (`XATTR_VALUE_OOL`):
    /// the paired value is out-of-line.
    pub(crate) kind: u16,
    #[deku(assert = "*name_size < 65536")]
    pub(crate) name_size: u16,
    #[deku(count = "*name_size")]
    pub(crate) name: Vec<u8>,
}

impl XattrEntry {
    pub fn is_out_of_line(&self) -> bool {
        self.kind & XATTR_VALUE_OOL != 0
    }

    pub fn prefix(&self) -> Result<XattrPrefix> {
        match self.kind & 0xff {
            0 => Ok(XattrPrefix::User),
            1 => Ok(XattrPrefix::Trusted),
            2 => Ok(XattrPrefix::Security),
            other => Err(SquashTarError::Unsupported(format!("xattr prefix {other}"))),
        }
    }
}

impl XattrPrefix {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user.",
            Self::Trusted => "trusted.",
            Self::Security => "security.",
        }
    }
}

/// The value half of a key/value pair: either the inline bytes, or (if
/// [`XattrEntry::is_out_of_line`]) an 8-byte pointer to the real value
/// elsewhere in the stream.
#[derive(Debug, Clone, DekuRead, DekuWrite, PartialEq, Eq)]
#[deku(endian = "endian", ctx = "endian: deku::ctx::Endian")]
pub struct XattrValue {
    pub(crate) size: u32,
    #[deku(count = "*size")]
    pub(crate) value: Vec<u8>,
}

/// One entry of the xattr id table: points at the first key/value pair of a
/// unique xattr set, along with how many pairs follow and their total
/// uncompressed size (inline bytes only, not out-of-line values).
#[derive(Copy, Clone, Debug, PartialEq, Eq, DekuRead, DekuWrite)]
#[deku(endian = "endian", ctx = "endian: deku::ctx::Endian")]
pub struct XattrId {
    /// `(start << 16) | offset` into the key/value meta-block stream.
    pub xattr_ref: u64,
    pub count: u32,
    pub size: u32,
}

pub(crate) const XATTR_ID_SIZE: usize = 16;

/// The tiny header at the location the super block's `xattr_table` field
/// points at: where the id table's meta-blocks are, and how many ids exist.
#[derive(Copy, Clone, Debug, PartialEq, Eq, DekuRead, DekuWrite)]
#[deku(endian = "endian", ctx = "endian: deku::ctx::Endian")]
pub struct XattrIdTable {
    pub xattr_table_start: u64,
    pub xattr_ids: u32,
    pub unused: u32,
}

/// An in-memory, order-preserving set of key/value pairs attached to one
/// inode, keyed by the fully-qualified name (`user.foo`, `trusted.bar`, ...).
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct XattrSet {
    pub pairs: Vec<(String, Vec<u8>)>,
}

impl XattrSet {
    pub fn insert(&mut self, key: String, value: Vec<u8>) {
        self.pairs.push((key, value));
    }
}

/// Deduplicates identical xattr sets across inodes as they're collected, so
/// that only one copy of each unique set is written to the key/value stream.
///
/// Mirrors the dedup strategy used for data blocks: a set is hashed by its
/// fully-qualified contents and looked up in `known` before allocating a new
/// `XattrId`.
#[derive(Default)]
pub struct XattrWriterDedup {
    known: FxHashMap<Vec<(String, Vec<u8>)>, u32>,
    sets: Vec<XattrSet>,
}

impl XattrWriterDedup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `set`, returning the xattr index to stamp into the owning
    /// inode's `xattr_index` field.
    pub fn add(&mut self, set: XattrSet) -> u32 {
        if set.pairs.is_empty() {
            return crate::squashfs::NO_XATTR_INDEX;
        }
        if let Some(idx) = self.known.get(&set.pairs) {
            return *idx;
        }
        let idx = self.sets.len() as u32;
        self.known.insert(set.pairs.clone(), idx);
        self.sets.push(set);
        idx
    }

    pub fn sets(&self) -> &[XattrSet] {
        &self.sets
    }
}

/// Resolves xattr indices back to key/value pairs, as read from an image's
/// three xattr tables.
pub struct XattrReader {
    ids: Vec<XattrId>,
    pairs_by_ref: HashMap<u64, Vec<(String, Vec<u8>)>>,
}

impl XattrReader {
    pub fn new(ids: Vec<XattrId>, pairs_by_ref: HashMap<u64, Vec<(String, Vec<u8>)>>) -> Self {
        Self { ids, pairs_by_ref }
    }

    pub fn get(&self, xattr_index: u32) -> Result<&[(String, Vec<u8>)]> {
        let id = self
            .ids
            .get(xattr_index as usize)
            .ok_or_else(|| SquashTarError::OutOfBounds("xattr index".into()))?;
        self.pairs_by_ref
            .get(&id.xattr_ref)
            .map(Vec::as_slice)
            .ok_or_else(|| SquashTarError::corrupted("xattr ref not present in key/value stream"))
    }
}

/// Read `[start, start+len)` of the decoded key/value meta-block stream and
/// decode one field out of it, returning the field and the number of bytes
/// it occupied.
fn decode_at<T>(kv_bytes: &[u8], pos: usize, endian: deku::ctx::Endian) -> Result<(T, usize)>
where
    T: for<'a> DekuReader<'a, deku::ctx::Endian>,
{
    if pos > kv_bytes.len() {
        return Err(SquashTarError::OutOfBounds("xattr key/value offset".into()));
    }
    let mut cursor = Cursor::new(&kv_bytes[pos..]);
    let mut reader = Reader::new(&mut cursor);
    let value = T::from_reader_with_ctx(&mut reader, endian)?;
    Ok((value, reader.bits_read / 8))
}

/// Parse an image's three xattr tables (spec component I) into an
/// [`XattrReader`]. Returns `None` if the image carries no xattrs at all
/// (`NoXattrs` flag set, or `xattr_table` unset).
///
/// Layout: the super block's `xattr_table` field points at a 16-byte
/// [`XattrIdTable`] header, immediately followed by the key/value
/// meta-block stream; `xattr_table_start` (inside that header) is where the
/// id-table's own meta-blocks begin. A value whose entry has
/// [`XattrEntry::is_out_of_line`] set stores, in place of the value, an
/// 8-byte reference to the real [`XattrValue`] elsewhere in the stream —
/// squashfs's way of deduplicating repeated large values.
pub fn read_xattr_table<R: BufReadSeek>(
    reader: &mut R,
    superblock: &SuperBlock,
    kind: &Kind,
) -> Result<Option<XattrReader>> {
    if superblock.no_xattrs() || superblock.xattr_table == NOT_SET {
        return Ok(None);
    }
    let endian = kind.inner.type_endian;

    reader.seek(SeekFrom::Start(superblock.xattr_table))?;
    let mut header_bytes = [0u8; 16];
    reader.read_exact(&mut header_bytes)?;
    let mut cursor = Cursor::new(&header_bytes[..]);
    let mut header_reader = Reader::new(&mut cursor);
    let header = XattrIdTable::from_reader_with_ctx(&mut header_reader, endian)?;

    // key/value stream: every meta-block between the header and the id table.
    reader.seek(SeekFrom::Start(superblock.xattr_table + 16))?;
    let mut kv_bytes = vec![];
    while reader.stream_position()? < header.xattr_table_start {
        kv_bytes.append(&mut metadata::read_block(reader, superblock, kind)?);
    }

    // id table: `xattr_ids` fixed-size records packed into meta-blocks.
    let id_table_size = u64::from(header.xattr_ids) * XATTR_ID_SIZE as u64;
    let block_count = (id_table_size as f32 / metadata::METADATA_MAXSIZE as f32).ceil() as u64;
    reader.seek(SeekFrom::Start(header.xattr_table_start))?;
    let mut id_bytes = vec![];
    for _ in 0..block_count {
        id_bytes.append(&mut metadata::read_block(reader, superblock, kind)?);
    }
    let mut cursor = Cursor::new(id_bytes);
    let mut container = Reader::new(&mut cursor);
    let mut ids = vec![];
    while let Ok(id) = XattrId::from_reader_with_ctx(&mut container, endian) {
        ids.push(id);
    }

    let mut pairs_by_ref = HashMap::new();
    for id in &ids {
        if pairs_by_ref.contains_key(&id.xattr_ref) {
            continue;
        }
        let start = (id.xattr_ref >> 16) as usize;
        let mut pos = start + (id.xattr_ref & 0xffff) as usize;
        let mut pairs = Vec::with_capacity(id.count as usize);
        for _ in 0..id.count {
            let (entry, len): (XattrEntry, usize) = decode_at(&kv_bytes, pos, endian)?;
            pos += len;
            let key = format!("{}{}", entry.prefix()?.as_str(), String::from_utf8_lossy(&entry.name));

            let value = if entry.is_out_of_line() {
                let (ool_ref, len): (u64, usize) = decode_at(&kv_bytes, pos, endian)?;
                pos += len;
                let ool_pos = (ool_ref >> 16) as usize + (ool_ref & 0xffff) as usize;
                let (val, _): (XattrValue, usize) = decode_at(&kv_bytes, ool_pos, endian)?;
                val.value
            } else {
                let (val, len): (XattrValue, usize) = decode_at(&kv_bytes, pos, endian)?;
                pos += len;
                val.value
            };

            pairs.push((key, value));
        }
        pairs_by_ref.insert(id.xattr_ref, pairs);
    }

    Ok(Some(XattrReader::new(ids, pairs_by_ref)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_reuses_identical_sets() {
        let mut w = XattrWriterDedup::new();
        let mut a = XattrSet::default();
        a.insert("user.foo".into(), b"bar".to_vec());
        let mut b = a.clone();
        b.insert("user.foo".into(), b"bar".to_vec());

        let idx_a = w.add(a.clone());
        let idx_a2 = w.add(a);
        assert_eq!(idx_a, idx_a2);
        assert_eq!(w.sets().len(), 1);

        // `b` has two pairs, so it's a distinct set.
        let idx_b = w.add(b);
        assert_ne!(idx_a, idx_b);
        assert_eq!(w.sets().len(), 2);
    }

    #[test]
    fn empty_set_is_no_xattr() {
        let mut w = XattrWriterDedup::new();
        assert_eq!(w.add(XattrSet::default()), crate::squashfs::NO_XATTR_INDEX);
    }

    #[test]
    fn prefix_as_str() {
        assert_eq!(XattrPrefix::User.as_str(), "user.");
        assert_eq!(XattrPrefix::Trusted.as_str(), "trusted.");
        assert_eq!(XattrPrefix::Security.as_str(), "security.");
    }
}
