//! Block processor: turns a file's byte stream into on-disk data blocks and
//! fragment-tail packing, deduplicating identical blocks by content hash and
//! driving compression through the shared [`ThreadPool`].
//!
//! Work items (one per data block) are submitted with a ticket and dequeued
//! strictly in submission order (spec component H / §5), so the output file
//! receives blocks in the same order the input file produced them even
//! though compression itself runs across several worker threads.

use std::collections::HashMap;
use std::io::{Read, Seek, Write};

use rustc_hash::FxHashMap;
use tracing::trace;

use crate::error::Result;
use crate::filesystem::writer::FilesystemCompressor;
use crate::fragment::Fragment;
use crate::inode::DataSize;
use crate::kinds::Kind;
use crate::threadpool::ThreadPool;
use crate::util::xxhash32;

/// Per-file flags recognized by the per-block policy (spec §4.H).
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockFlags {
    pub dont_compress: bool,
    pub dont_fragment: bool,
    pub align: bool,
    pub no_sparse: bool,
}

/// Everything the block processor produced for one file.
#[derive(Debug, Default, Clone)]
pub struct FileBlocksResult {
    pub block_sizes: Vec<DataSize>,
    pub frag_index: u32,
    pub frag_offset: u32,
    pub blocks_start: u64,
    pub sparse: u64,
}

struct CompressedBlock {
    data: Vec<u8>,
    uncompressed: bool,
    hash: u32,
    raw_len: usize,
}

/// Drives compression, dedup, fragment packing and output placement for
/// every file the writer hands it. Owns the output writer and the pending
/// fragment accumulator; one instance is used for an entire image build.
pub struct BlockProcessor<W: Write + Seek> {
    out: W,
    pool: ThreadPool<CompressedBlock>,
    fc: FilesystemCompressor,
    kind: Kind,
    block_size: u32,
    /// content hash -> (block start offset, on-disk size record), for
    /// whole-block dedup.
    block_dedup: FxHashMap<u32, Vec<(u64, DataSize)>>,
    block_bytes: HashMap<u64, Vec<u8>>,
    fragments: Vec<Fragment>,
    fragment_dedup: FxHashMap<u32, u32>,
    pending_fragment: Vec<u8>,
    device_block_size: u32,
}

impl<W: Write + Seek> BlockProcessor<W> {
    pub fn new(
        out: W,
        worker_count: usize,
        max_backlog: usize,
        fc: FilesystemCompressor,
        kind: Kind,
        block_size: u32,
        device_block_size: u32,
    ) -> Self {
        Self {
            out,
            pool: ThreadPool::new(worker_count, max_backlog),
            fc,
            kind,
            block_size,
            block_dedup: FxHashMap::default(),
            block_bytes: HashMap::new(),
            fragments: vec![],
            fragment_dedup: FxHashMap::default(),
            pending_fragment: vec![],
            device_block_size,
        }
    }

    /// Process one file's entire byte stream, writing deduplicated/
    /// compressed blocks to the output as they resolve, and (for an eligible
    /// final short block) routing the tail into the current fragment.
    pub fn add_file(
        &mut self,
        mut reader: Box<dyn Read + Send>,
        file_size: u64,
        flags: BlockFlags,
    ) -> Result<FileBlocksResult> {
        if flags.align {
            let pos = self.out.stream_position()?;
            let pad = (u64::from(self.device_block_size) - pos % u64::from(self.device_block_size))
                % u64::from(self.device_block_size);
            if pad > 0 {
                self.out.write_all(&vec![0u8; pad as usize])?;
            }
        }

        let blocks_start = self.out.stream_position()?;
        let mut result = FileBlocksResult { blocks_start, ..Default::default() };

        let full_blocks = file_size / u64::from(self.block_size);
        let tail_len = (file_size % u64::from(self.block_size)) as usize;
        let has_tail = tail_len > 0;

        let mut tickets = vec![];
        for _ in 0..full_blocks {
            let mut buf = vec![0u8; self.block_size as usize];
            reader.read_exact(&mut buf)?;
            tickets.push(self.submit_block(buf, flags)?);
        }

        for ticket in tickets {
            self.dequeue_and_place(ticket, &mut result)?;
        }

        if has_tail {
            let mut tail = vec![0u8; tail_len];
            reader.read_exact(&mut tail)?;
            if flags.dont_fragment {
                let ticket = self.submit_block(tail, flags)?;
                self.dequeue_and_place(ticket, &mut result)?;
            } else {
                self.route_to_fragment(&tail, &mut result)?;
            }
        }

        result.sparse = result
            .block_sizes
            .iter()
            .filter(|s| s.is_sparse())
            .count() as u64
            * u64::from(self.block_size);
        Ok(result)
    }

    fn submit_block(&mut self, buf: Vec<u8>, flags: BlockFlags) -> Result<crate::threadpool::Ticket> {
        let fc = self.fc;
        let kind = Kind::from_kind(&self.kind);
        let block_size = self.block_size;
        self.pool.submit(move || {
            let hash = xxhash32(&buf);
            let all_zero = !flags.no_sparse && buf.iter().all(|&b| b == 0);
            if all_zero {
                return Ok(CompressedBlock { data: vec![], uncompressed: false, hash, raw_len: buf.len() });
            }

            let compressed = if flags.dont_compress {
                None
            } else {
                Some(kind.inner.compressor.compress(&buf, fc, block_size)?)
            };
            match compressed {
                Some(c) if c.len() < buf.len() => {
                    Ok(CompressedBlock { data: c, uncompressed: false, hash, raw_len: buf.len() })
                }
                _ => Ok(CompressedBlock { data: buf.clone(), uncompressed: true, hash, raw_len: buf.len() }),
            }
        })
    }

    fn dequeue_and_place(
        &mut self,
        ticket: crate::threadpool::Ticket,
        result: &mut FileBlocksResult,
    ) -> Result<()> {
        let _ = ticket;
        let block = self.pool.dequeue()?;

        if block.data.is_empty() && block.raw_len > 0 {
            // all-zero sparse block
            result.block_sizes.push(DataSize::sparse());
            return Ok(());
        }

        if let Some(existing) = self.find_dedup_match(block.hash, &block.data, block.uncompressed) {
            result.block_sizes.push(existing);
            return Ok(());
        }

        let offset = self.out.stream_position()?;
        self.out.write_all(&block.data)?;
        let size = DataSize::new(block.data.len() as u32, block.uncompressed);
        self.block_dedup.entry(block.hash).or_default().push((offset, size));
        self.block_bytes.insert(offset, block.data);
        result.block_sizes.push(size);
        Ok(())
    }

    fn find_dedup_match(&self, hash: u32, data: &[u8], uncompressed: bool) -> Option<DataSize> {
        let candidates = self.block_dedup.get(&hash)?;
        for (offset, size) in candidates {
            if size.uncompressed() != uncompressed {
                continue;
            }
            if self.block_bytes.get(offset).map(|b| b.as_slice()) == Some(data) {
                trace!("dedup hit at {offset:#x}");
                return Some(*size);
            }
        }
        None
    }

    fn route_to_fragment(&mut self, tail: &[u8], result: &mut FileBlocksResult) -> Result<()> {
        if self.pending_fragment.len() + tail.len() > self.block_size as usize {
            self.flush_fragment()?;
        }
        let offset = self.pending_fragment.len() as u32;
        self.pending_fragment.extend_from_slice(tail);

        result.frag_index = self.fragments.len() as u32;
        result.frag_offset = offset;
        Ok(())
    }

    /// Close, compress, and append the currently-open fragment block (if
    /// any) to the output, recording its [`Fragment`] table entry. A file's
    /// `frag_index` is stamped eagerly in [`Self::route_to_fragment`] to the
    /// index this fragment *will* occupy, so `flush_fragment` must be called
    /// at most once per accumulation cycle.
    pub fn flush_fragment(&mut self) -> Result<()> {
        if self.pending_fragment.is_empty() {
            return Ok(());
        }
        let raw = std::mem::take(&mut self.pending_fragment);

        let hash = xxhash32(&raw);
        if let Some(&idx) = self.fragment_dedup.get(&hash) {
            if self.fragments[idx as usize].size.size() as usize == raw.len() {
                return Ok(());
            }
        }

        let compressed = self.kind.inner.compressor.compress(&raw, self.fc, self.block_size)?;
        let (bytes, uncompressed) =
            if compressed.len() < raw.len() { (compressed, false) } else { (raw.clone(), true) };

        let start = self.out.stream_position()?;
        self.out.write_all(&bytes)?;
        let size = DataSize::new(bytes.len() as u32, uncompressed);
        self.fragment_dedup.insert(hash, self.fragments.len() as u32);
        self.fragments.push(Fragment::new(start, size, 0));
        Ok(())
    }

    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compressor::Compressor;
    use crate::kinds::LE_V4_0;
    use std::io::Cursor;
    use std::sync::Arc;

    fn processor(out: Cursor<Vec<u8>>) -> BlockProcessor<Cursor<Vec<u8>>> {
        let kind = Kind { inner: Arc::new(LE_V4_0) };
        let fc = FilesystemCompressor::new(Compressor::None, None).unwrap();
        BlockProcessor::new(out, 0, 4, fc, kind, 0x2000, 0x1000)
    }

    #[test]
    fn sparse_block_is_skipped_and_credited() {
        let mut bp = processor(Cursor::new(vec![]));
        let data = vec![0u8; 0x2000];
        let result = bp.add_file(Box::new(Cursor::new(data)), 0x2000, BlockFlags::default()).unwrap();
        assert!(result.block_sizes[0].is_sparse());
        assert_eq!(result.sparse, 0x2000);
    }

    #[test]
    fn identical_blocks_dedup_to_same_offset() {
        let mut bp = processor(Cursor::new(vec![]));
        let data = vec![7u8; 0x4000];
        let a = bp.add_file(Box::new(Cursor::new(data.clone())), 0x4000, BlockFlags::default()).unwrap();
        let b = bp.add_file(Box::new(Cursor::new(data)), 0x4000, BlockFlags::default()).unwrap();
        assert_eq!(a.block_sizes, b.block_sizes);
    }

    #[test]
    fn short_tail_routes_to_fragment() {
        let mut bp = processor(Cursor::new(vec![]));
        let data = vec![1u8; 100];
        let result = bp.add_file(Box::new(Cursor::new(data)), 100, BlockFlags::default()).unwrap();
        assert!(result.block_sizes.is_empty());
        assert_eq!(result.frag_offset, 0);
        bp.flush_fragment().unwrap();
        assert_eq!(bp.fragments().len(), 1);
    }

    #[test]
    fn dont_fragment_forces_full_block() {
        let mut bp = processor(Cursor::new(vec![]));
        let data = vec![1u8; 100];
        let flags = BlockFlags { dont_fragment: true, ..Default::default() };
        let result = bp.add_file(Box::new(Cursor::new(data)), 100, flags).unwrap();
        assert_eq!(result.block_sizes.len(), 1);
        assert!(bp.fragments().is_empty());
    }
}
