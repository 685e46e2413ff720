//! Types of supported compression algorithms for SquashFS data/meta blocks.
//!
//! Bzip2 is *not* one of these: the SquashFS on-disk compressor-id
//! enumeration below is fixed by the published format and has no bzip2
//! entry. Bzip2 (and the other archive-stream codecs) live in
//! [`crate::stream::transform`] and are used for tar/auxiliary-file byte
//! streams instead (spec component A), not for SquashFS blocks.

use std::io::{Cursor, Read, Write};

use deku::prelude::*;
use deku::writer::Writer;
#[cfg(feature = "gzip")]
use flate2::read::ZlibEncoder;
#[cfg(feature = "gzip")]
use flate2::Compression;
use tracing::trace;
#[cfg(any(feature = "xz", feature = "lzma"))]
use xz2::read::{XzDecoder, XzEncoder};
#[cfg(feature = "xz")]
use xz2::stream::{Check, Filters, LzmaOptions, MtStreamBuilder};
#[cfg(feature = "lzma")]
use xz2::stream::{LzmaOptions as RawLzmaOptions, Stream as XzStream};

use crate::error::SquashTarError;
use crate::filesystem::writer::{CompressionExtra, FilesystemCompressor};
use crate::kinds::Kind;
use crate::metadata::MetadataWriter;
use crate::squashfs::{Flags, SuperBlock};

#[derive(Copy, Clone, Debug, PartialEq, Eq, DekuRead, DekuWrite, Default)]
#[deku(endian = "endian", ctx = "endian: deku::ctx::Endian")]
#[deku(id_type = "u16")]
#[rustfmt::skip]
pub enum Compressor {
    None = 0,
    Gzip = 1,
    Lzma = 2,
    Lzo =  3,
    #[default]
    Xz =   4,
    Lz4 =  5,
    Zstd = 6,
}

#[derive(Debug, DekuRead, DekuWrite, PartialEq, Eq, Clone, Copy)]
#[deku(endian = "endian", ctx = "endian: deku::ctx::Endian, compressor: Compressor")]
#[deku(id = "compressor")]
pub enum CompressionOptions {
    #[deku(id = "Compressor::Gzip")]
    Gzip(Gzip),

    #[deku(id = "Compressor::Lzo")]
    Lzo(Lzo),

    #[deku(id = "Compressor::Xz")]
    Xz(Xz),

    #[deku(id = "Compressor::Lz4")]
    Lz4(Lz4),

    #[deku(id = "Compressor::Zstd")]
    Zstd(Zstd),

    #[deku(id = "Compressor::Lzma")]
    Lzma,
}

#[derive(Debug, DekuRead, DekuWrite, PartialEq, Eq, Clone, Copy)]
#[deku(endian = "endian", ctx = "endian: deku::ctx::Endian")]
pub struct Gzip {
    pub compression_level: u32,
    pub window_size: u16,
    pub strategies: u16,
}

#[derive(Debug, DekuRead, DekuWrite, PartialEq, Eq, Clone, Copy)]
#[deku(endian = "endian", ctx = "endian: deku::ctx::Endian")]
pub struct Lzo {
    pub algorithm: u32,
    pub compression_level: u32,
}

#[derive(Debug, DekuRead, DekuWrite, PartialEq, Eq, Clone, Copy)]
#[deku(endian = "endian", ctx = "endian: deku::ctx::Endian")]
pub struct Xz {
    pub dictionary_size: u32,
    pub filters: XzFilter,
    #[deku(cond = "!deku::reader.end()")]
    pub bit_opts: Option<u16>,
    #[deku(cond = "!deku::reader.end()")]
    pub fb: Option<u16>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, DekuRead, DekuWrite)]
#[deku(endian = "endian", ctx = "endian: deku::ctx::Endian")]
pub struct XzFilter(u32);

impl XzFilter {
    fn x86(&self) -> bool {
        self.0 & 0x0001 == 0x0001
    }
    fn powerpc(&self) -> bool {
        self.0 & 0x0002 == 0x0002
    }
    fn ia64(&self) -> bool {
        self.0 & 0x0004 == 0x0004
    }
    fn arm(&self) -> bool {
        self.0 & 0x0008 == 0x0008
    }
    fn armthumb(&self) -> bool {
        self.0 & 0x0010 == 0x0010
    }
    fn sparc(&self) -> bool {
        self.0 & 0x0020 == 0x0020
    }
}

#[derive(Debug, DekuRead, DekuWrite, PartialEq, Eq, Clone, Copy)]
#[deku(endian = "endian", ctx = "endian: deku::ctx::Endian")]
pub struct Lz4 {
    pub version: u32,
    pub flags: u32,
}

#[derive(Debug, DekuRead, DekuWrite, PartialEq, Eq, Clone, Copy)]
#[deku(endian = "endian", ctx = "endian: deku::ctx::Endian")]
pub struct Zstd {
    pub compression_level: u32,
}

/// Custom compression support.
///
/// For most uses, [`DefaultCompressor`] is the right choice — it implements
/// the compressors found in `squashfs-tools` and the Linux kernel. Vendor
/// firmware images sometimes use a variant codec under a standard id;
/// implement [`CompressionAction`] to override.
pub trait CompressionAction {
    /// Decompress `bytes` (the compressor id comes from the super block, or
    /// from a custom `Kind`).
    fn decompress(
        &self,
        bytes: &[u8],
        out: &mut Vec<u8>,
        compressor: Compressor,
    ) -> Result<(), SquashTarError>;

    /// Compress `bytes` using the filesystem's configured compressor and
    /// options.
    fn compress(
        &self,
        bytes: &[u8],
        fc: FilesystemCompressor,
        block_size: u32,
    ) -> Result<Vec<u8>, SquashTarError>;

    /// Build the bytes of the compression-options section following the
    /// super block, if the compressor carries non-default options.
    fn compression_options(
        &self,
        superblock: &mut SuperBlock,
        kind: &Kind,
        fs_compressor: FilesystemCompressor,
    ) -> Result<Vec<u8>, SquashTarError>;
}

/// Default compressor that handles whichever of gzip/xz/lzo/lz4/zstd/lzma
/// are enabled at build time.
#[derive(Copy, Clone)]
pub struct DefaultCompressor;

impl CompressionAction for DefaultCompressor {
    fn decompress(
        &self,
        bytes: &[u8],
        out: &mut Vec<u8>,
        compressor: Compressor,
    ) -> Result<(), SquashTarError> {
        match compressor {
            Compressor::None => out.extend_from_slice(bytes),
            #[cfg(feature = "gzip")]
            Compressor::Gzip => {
                let mut decoder = flate2::read::ZlibDecoder::new(bytes);
                decoder.read_to_end(out)?;
            }
            #[cfg(feature = "xz")]
            Compressor::Xz => {
                let mut decoder = XzDecoder::new(bytes);
                decoder.read_to_end(out)?;
            }
            #[cfg(feature = "lzma")]
            Compressor::Lzma => {
                let stream = XzStream::new_lzma_decoder(u64::MAX)
                    .map_err(|e| SquashTarError::Unsupported(format!("lzma stream: {e}")))?;
                let mut decoder = xz2::read::XzDecoder::new_stream(bytes, stream);
                decoder.read_to_end(out)?;
            }
            #[cfg(feature = "lzo")]
            Compressor::Lzo => {
                out.resize(out.capacity(), 0);
                let (out_size, error) = rust_lzo::LZOContext::decompress_to_slice(bytes, out);
                let out_size = out_size.len();
                out.truncate(out_size);
                if error != rust_lzo::LZOError::OK {
                    return Err(SquashTarError::Corrupted("lzo decompress failed".into()));
                }
            }
            #[cfg(feature = "zstd")]
            Compressor::Zstd => {
                let mut decoder = zstd::bulk::Decompressor::new()
                    .map_err(|e| SquashTarError::Internal(format!("zstd: {e}")))?;
                decoder
                    .decompress_to_buffer(bytes, out)
                    .map_err(|e| SquashTarError::Corrupted(format!("zstd decompress: {e}")))?;
            }
            #[cfg(feature = "lz4")]
            Compressor::Lz4 => {
                out.resize(out.capacity(), 0u8);
                let out_size = lz4_flex::decompress_into(bytes, out.as_mut_slice())
                    .map_err(|e| SquashTarError::Corrupted(format!("lz4 decompress: {e}")))?;
                out.truncate(out_size);
            }
            _ => {
                return Err(SquashTarError::Unsupported(format!(
                    "compressor {compressor:?} not enabled in this build"
                )))
            }
        }
        Ok(())
    }

    fn compress(
        &self,
        bytes: &[u8],
        fc: FilesystemCompressor,
        block_size: u32,
    ) -> Result<Vec<u8>, SquashTarError> {
        match (fc.id, fc.options, fc.extra) {
            (Compressor::None, None, _) => Ok(bytes.to_vec()),
            #[cfg(feature = "xz")]
            (Compressor::Xz, option @ (Some(CompressionOptions::Xz(_)) | None), extra) => {
                let dict_size = match option {
                    None => block_size,
                    Some(CompressionOptions::Xz(option)) => option.dictionary_size,
                    Some(_) => unreachable!(),
                };
                let default_level = 6;
                let level = match extra {
                    None => default_level,
                    Some(CompressionExtra::Xz(xz)) => xz.level.unwrap_or(default_level),
                };
                let check = Check::Crc32;
                let mut opts = LzmaOptions::new_preset(level)
                    .map_err(|e| SquashTarError::Internal(format!("xz options: {e}")))?;
                opts.dict_size(dict_size);

                let mut filters = Filters::new();
                if let Some(CompressionOptions::Xz(xz)) = option {
                    if xz.filters.x86() {
                        filters.x86();
                    }
                    if xz.filters.powerpc() {
                        filters.powerpc();
                    }
                    if xz.filters.ia64() {
                        filters.ia64();
                    }
                    if xz.filters.arm() {
                        filters.arm();
                    }
                    if xz.filters.armthumb() {
                        filters.arm_thumb();
                    }
                    if xz.filters.sparc() {
                        filters.sparc();
                    }
                }
                filters.lzma2(&opts);

                let stream = MtStreamBuilder::new()
                    .threads(2)
                    .filters(filters)
                    .check(check)
                    .encoder()
                    .map_err(|e| SquashTarError::Internal(format!("xz encoder: {e}")))?;

                let mut encoder = XzEncoder::new_stream(Cursor::new(bytes), stream);
                let mut buf = vec![];
                encoder.read_to_end(&mut buf)?;
                Ok(buf)
            }
            #[cfg(feature = "lzma")]
            (Compressor::Lzma, _, _) => {
                let opts = RawLzmaOptions::new_preset(6)
                    .map_err(|e| SquashTarError::Internal(format!("lzma options: {e}")))?;
                let stream = XzStream::new_lzma_encoder(&opts)
                    .map_err(|e| SquashTarError::Internal(format!("lzma encoder: {e}")))?;
                let mut encoder = xz2::read::XzEncoder::new_stream(Cursor::new(bytes), stream);
                let mut buf = vec![];
                encoder.read_to_end(&mut buf)?;
                Ok(buf)
            }
            #[cfg(feature = "gzip")]
            (Compressor::Gzip, option @ (Some(CompressionOptions::Gzip(_)) | None), _) => {
                let compression_level = match option {
                    None => Compression::best(),
                    Some(CompressionOptions::Gzip(option)) => {
                        Compression::new(option.compression_level)
                    }
                    Some(_) => unreachable!(),
                };
                let mut encoder = ZlibEncoder::new(Cursor::new(bytes), compression_level);
                let mut buf = vec![];
                encoder.read_to_end(&mut buf)?;
                Ok(buf)
            }
            #[cfg(feature = "lzo")]
            (Compressor::Lzo, _, _) => {
                let mut lzo = rust_lzo::LZOContext::new();
                let mut buf = vec![0; rust_lzo::worst_compress(bytes.len())];
                let error = lzo.compress(bytes, &mut buf);
                if error != rust_lzo::LZOError::OK {
                    return Err(SquashTarError::Internal("lzo compress failed".into()));
                }
                Ok(buf)
            }
            #[cfg(feature = "zstd")]
            (Compressor::Zstd, option @ (Some(CompressionOptions::Zstd(_)) | None), _) => {
                let compression_level = match option {
                    None => 3,
                    Some(CompressionOptions::Zstd(option)) => option.compression_level,
                    Some(_) => unreachable!(),
                };
                let mut encoder = zstd::bulk::Compressor::new(compression_level as i32)
                    .map_err(|e| SquashTarError::Internal(format!("zstd: {e}")))?;
                let buffer_len = zstd_safe::compress_bound(bytes.len());
                let mut buf = Vec::with_capacity(buffer_len);
                encoder
                    .compress_to_buffer(bytes, &mut buf)
                    .map_err(|e| SquashTarError::Internal(format!("zstd compress: {e}")))?;
                Ok(buf)
            }
            #[cfg(feature = "lz4")]
            (Compressor::Lz4, _option, _) => Ok(lz4_flex::compress(bytes)),
            _ => Err(SquashTarError::Unsupported(format!(
                "compressor {:?} not enabled in this build",
                fc.id
            ))),
        }
    }

    fn compression_options(
        &self,
        superblock: &mut SuperBlock,
        kind: &Kind,
        fs_compressor: FilesystemCompressor,
    ) -> Result<Vec<u8>, SquashTarError> {
        let mut w = Cursor::new(vec![]);

        if let Some(options) = &fs_compressor.options {
            trace!("writing compression options");
            superblock.flags |= Flags::CompressorOptionsArePresent as u16;
            let mut compression_opt_buf_out = Cursor::new(vec![]);
            let mut writer = Writer::new(&mut compression_opt_buf_out);
            match options {
                CompressionOptions::Gzip(gzip) => {
                    gzip.to_writer(&mut writer, kind.inner.type_endian)?
                }
                CompressionOptions::Lz4(lz4) => {
                    lz4.to_writer(&mut writer, kind.inner.type_endian)?
                }
                CompressionOptions::Zstd(zstd) => {
                    zstd.to_writer(&mut writer, kind.inner.type_endian)?
                }
                CompressionOptions::Xz(xz) => xz.to_writer(&mut writer, kind.inner.type_endian)?,
                CompressionOptions::Lzo(lzo) => {
                    lzo.to_writer(&mut writer, kind.inner.type_endian)?
                }
                CompressionOptions::Lzma => {}
            }
            let mut metadata =
                MetadataWriter::new(fs_compressor, superblock.block_size, Kind::from_kind(kind));
            metadata.write_all(compression_opt_buf_out.get_ref())?;
            metadata.finalize(&mut w)?;
        }

        Ok(w.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(feature = "gzip")]
    #[test]
    fn gzip_round_trip() {
        let data = b"the quick brown fox jumps over the lazy dog".repeat(50);
        let fc = FilesystemCompressor::new(Compressor::Gzip, None).unwrap();
        let compressed = DefaultCompressor.compress(&data, fc, 0x20000).unwrap();
        let mut out = Vec::with_capacity(data.len());
        DefaultCompressor
            .decompress(&compressed, &mut out, Compressor::Gzip)
            .unwrap();
        assert_eq!(out, data);
    }

    #[cfg(feature = "xz")]
    #[test]
    fn xz_round_trip() {
        let data = b"the quick brown fox jumps over the lazy dog".repeat(50);
        let fc = FilesystemCompressor::new(Compressor::Xz, None).unwrap();
        let compressed = DefaultCompressor.compress(&data, fc, 0x20000).unwrap();
        let mut out = Vec::with_capacity(data.len());
        DefaultCompressor
            .decompress(&compressed, &mut out, Compressor::Xz)
            .unwrap();
        assert_eq!(out, data);
    }
}
