//! Meta-block (de)serialization: the 8 KiB-uncompressed, length-prefixed
//! chunks that back every table in the image (inode table, directory table,
//! fragment/id/export tables) as well as directory-entry data.

use std::collections::VecDeque;
use std::io;
use std::io::{Read, Seek, Write};

use deku::prelude::*;
use deku::reader::Reader;
use deku::writer::Writer;
use tracing::trace;

use crate::compressor::Compressor;
use crate::error::{Result, SquashTarError};
use crate::filesystem::writer::FilesystemCompressor;
use crate::kinds::Kind;
use crate::squashfs::SuperBlock;

/// Maximum size, in bytes, of a single meta-block's *uncompressed* payload.
pub const METADATA_MAXSIZE: usize = 0x2000;

const METADATA_UNCOMPRESSED: u16 = 1 << 15;

/// Check the is-compressed bit within a raw on-disk `len` field.
pub fn is_compressed(len: u16) -> bool {
    len & METADATA_UNCOMPRESSED == 0
}

/// Strip the is-compressed bit, returning the actual byte length that follows.
pub fn data_len(len: u16) -> u16 {
    len & !METADATA_UNCOMPRESSED
}

pub fn set_if_uncompressed(len: u16) -> u16 {
    len | METADATA_UNCOMPRESSED
}

/// Read one meta-block at the reader's current position, returning its
/// decompressed bytes.
pub fn read_block<R: Read + Seek>(
    reader: &mut R,
    superblock: &SuperBlock,
    kind: &Kind,
) -> Result<Vec<u8>> {
    let mut deku_reader = Reader::new(&mut *reader);
    let len = u16::from_reader_with_ctx(&mut deku_reader, kind.inner.data_endian)?;

    let byte_len = data_len(len);
    trace!("metadata block len: {:#x}", byte_len);
    let mut buf = vec![0u8; byte_len as usize];
    reader.read_exact(&mut buf)?;

    let bytes = if is_compressed(len) {
        let mut out = Vec::with_capacity(METADATA_MAXSIZE);
        kind.inner.compressor.decompress(&buf, &mut out, superblock.compressor)?;
        out
    } else {
        buf
    };

    if bytes.len() > METADATA_MAXSIZE {
        return Err(SquashTarError::Corrupted(format!(
            "metadata block of {} bytes exceeds {METADATA_MAXSIZE}",
            bytes.len()
        )));
    }

    Ok(bytes)
}

/// Accumulates written bytes into 8 KiB meta-blocks, compressing each as it
/// fills, and tracks the running `(block, offset)` cursor callers need to
/// record references (e.g. an inode's location in the inode table).
pub struct MetadataWriter {
    compressor: FilesystemCompressor,
    block_size: u32,
    data_endian: deku::ctx::Endian,
    kind: Kind,
    /// Byte offset, from the start of this writer's output, of the next
    /// byte that would be written — used by callers to stamp back-references.
    pub metadata_start: u32,
    uncompressed_bytes: VecDeque<u8>,
    final_bytes: Vec<(bool, Vec<u8>)>,
}

impl MetadataWriter {
    /// Number of not-yet-flushed uncompressed bytes buffered so far; combined
    /// with `metadata_start` this is the `(block, offset)` address a caller
    /// should stamp for data it is about to append.
    pub fn buffered_len(&self) -> usize {
        self.uncompressed_bytes.len()
    }

    pub fn new(compressor: FilesystemCompressor, block_size: u32, kind: Kind) -> Self {
        Self {
            compressor,
            block_size,
            data_endian: kind.inner.data_endian,
            kind,
            metadata_start: 0,
            uncompressed_bytes: VecDeque::new(),
            final_bytes: vec![],
        }
    }

    fn add_block(&mut self) -> Result<()> {
        let uncompressed_len = self.uncompressed_bytes.len().min(METADATA_MAXSIZE);
        if uncompressed_len == 0 {
            return Ok(());
        }

        if self.uncompressed_bytes.as_slices().0.len() < uncompressed_len {
            self.uncompressed_bytes.make_contiguous();
        }
        let uncompressed = &self.uncompressed_bytes.as_slices().0[0..uncompressed_len];

        let compressed =
            self.kind.inner.compressor.compress(uncompressed, self.compressor, self.block_size)?;

        let (stored_compressed, metadata) = if compressed.len() >= uncompressed_len {
            let uncompressed = self.uncompressed_bytes.drain(0..uncompressed_len).collect();
            (false, uncompressed)
        } else {
            self.uncompressed_bytes.drain(0..uncompressed_len);
            (true, compressed)
        };

        self.metadata_start += 2 + metadata.len() as u32;
        self.final_bytes.push((stored_compressed, metadata));
        Ok(())
    }

    /// Flush any remaining buffered bytes and write every meta-block to `out`.
    pub fn finalize<W: Write + Seek>(&mut self, mut out: W) -> Result<()> {
        self.finalize_with_positions(&mut out, &mut vec![])
    }

    /// Like [`Self::finalize`], but also records the file offset at which
    /// each meta-block starts — the positions a table's pointer array
    /// needs, one per block, in writing order.
    pub fn finalize_with_positions<W: Write + Seek>(
        &mut self,
        mut out: W,
        positions: &mut Vec<u64>,
    ) -> Result<()> {
        while !self.uncompressed_bytes.is_empty() {
            self.add_block()?;
        }

        for (compressed, bytes) in &self.final_bytes {
            positions.push(out.stream_position()?);
            let len = bytes.len() as u16 | if *compressed { 0 } else { METADATA_UNCOMPRESSED };
            let mut writer = Writer::new(&mut out);
            len.to_writer(&mut writer, self.data_endian)?;
            out.write_all(bytes)?;
        }

        Ok(())
    }
}

impl Write for MetadataWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.uncompressed_bytes.extend(buf.iter().copied());
        while self.uncompressed_bytes.len() >= METADATA_MAXSIZE {
            self.add_block().map_err(io::Error::from)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[allow(dead_code)]
fn _assert_compressor_kind(_: Compressor) {}
