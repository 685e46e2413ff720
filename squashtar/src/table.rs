//! Generic compressed lookup tables: the id, fragment, export and xattr-id
//! tables all share the same on-disk shape — fixed-size records packed into
//! one or more metadata blocks, with a flat array of 8-byte pointers to
//! those blocks stored separately and a single 8-byte pointer to that array
//! stored in the super block (or, for the xattr table, in its own header).

use std::io::{Cursor, Read, Seek, SeekFrom, Write};

use deku::prelude::*;
use deku::reader::Reader;
use deku::writer::Writer;
use tracing::trace;

use crate::error::Result;
use crate::filesystem::writer::FilesystemCompressor;
use crate::kinds::Kind;
use crate::metadata::{self, MetadataWriter, METADATA_MAXSIZE};
use crate::squashfs::SuperBlock;

/// Read the 8-byte array of metadata-block pointers starting at `seek`,
/// covering `block_count` blocks, then decode every `T` record packed into
/// those blocks.
pub fn read_table<R: Read + Seek, T>(
    reader: &mut R,
    superblock: &SuperBlock,
    seek: u64,
    record_count: u64,
    record_size: u64,
    kind: &Kind,
) -> Result<(u64, Vec<T>)>
where
    T: for<'a> DekuReader<'a, deku::ctx::Endian>,
{
    if record_count == 0 {
        return Ok((seek, vec![]));
    }
    let block_count = (record_count * record_size).div_ceil(METADATA_MAXSIZE as u64).max(1);

    reader.seek(SeekFrom::Start(seek))?;
    let mut ptr_buf = vec![0u8; 8 * block_count as usize];
    reader.read_exact(&mut ptr_buf)?;
    let mut cursor = Cursor::new(&ptr_buf);
    let mut ptr_reader = Reader::new(&mut cursor);
    let first_ptr = u64::from_reader_with_ctx(&mut ptr_reader, kind.inner.type_endian)?;

    trace!("table: first block at {first_ptr:#x}, {block_count} block(s), {record_count} records");

    reader.seek(SeekFrom::Start(first_ptr))?;
    let mut all_bytes = vec![];
    for _ in 0..block_count {
        all_bytes.extend(metadata::read_block(reader, superblock, kind)?);
    }

    let mut cursor = Cursor::new(all_bytes);
    let mut container = Reader::new(&mut cursor);
    let mut records = Vec::with_capacity(record_count as usize);
    for _ in 0..record_count {
        records.push(T::from_reader_with_ctx(&mut container, kind.inner.type_endian)?);
    }

    Ok((seek + 8 * block_count, records))
}

/// Serialize `records` through a [`MetadataWriter`], then write the
/// resulting blocks followed by the flat pointer array, returning the file
/// offset of that pointer array (what callers stamp into the super block).
pub fn write_table<W: Write + Seek, T>(
    w: &mut W,
    records: &[T],
    compressor: FilesystemCompressor,
    block_size: u32,
    kind: &Kind,
) -> Result<u64>
where
    T: DekuWriter<deku::ctx::Endian>,
{
    let mut m_writer = MetadataWriter::new(compressor, block_size, Kind::from_kind(kind));
    for r in records {
        let mut buf = Cursor::new(Vec::new());
        let mut writer = Writer::new(&mut buf);
        r.to_writer(&mut writer, kind.inner.type_endian)?;
        m_writer.write_all(&buf.into_inner())?;
    }

    let mut block_positions = vec![];
    let table_start = w.stream_position()?;
    m_writer.finalize_with_positions(w, &mut block_positions)?;

    let ptr_table_pos = w.stream_position()?;
    for pos in &block_positions {
        let mut buf = Cursor::new(Vec::new());
        let mut writer = Writer::new(&mut buf);
        pos.to_writer(&mut writer, kind.inner.type_endian)?;
        w.write_all(&buf.into_inner())?;
    }
    debug_assert!(table_start <= ptr_table_pos);

    Ok(ptr_table_pos)
}
