//! Compress/decompress stream wrappers used by the tar codec's auxiliary
//! byte streams (spec component A). SquashFS data/meta blocks instead go
//! through [`crate::compressor::CompressionAction`] directly, since those
//! are whole-block, not streaming, operations.

use std::io::{self, Read, Write};

use crate::compressor::Compressor;
use crate::error::SquashTarError;

/// Wraps a base reader, decompressing bytes as they're pulled through.
/// Concatenates consecutive compressed members for every format except
/// gzip, whose single-member framing this stream's callers (tar auxiliary
/// payloads) always use.
pub struct TransformReader<R: Read> {
    inner: DecoderInner<R>,
}

enum DecoderInner<R: Read> {
    None(R),
    #[cfg(feature = "gzip")]
    Gzip(flate2::read::ZlibDecoder<R>),
    #[cfg(feature = "xz")]
    Xz(xz2::read::XzDecoder<R>),
    #[cfg(feature = "bzip2")]
    Bzip2(bzip2::read::BzDecoder<R>),
    #[cfg(feature = "zstd")]
    Zstd(zstd::stream::read::Decoder<'static, io::BufReader<R>>),
}

impl<R: Read> TransformReader<R> {
    pub fn new(inner: R, compressor: Compressor) -> Result<Self, SquashTarError> {
        let inner = match compressor {
            Compressor::None => DecoderInner::None(inner),
            #[cfg(feature = "gzip")]
            Compressor::Gzip => DecoderInner::Gzip(flate2::read::ZlibDecoder::new(inner)),
            #[cfg(feature = "xz")]
            Compressor::Xz => DecoderInner::Xz(xz2::read::XzDecoder::new_multi_decoder(inner)),
            other => {
                return Err(SquashTarError::Unsupported(format!(
                    "streaming decompression for {other:?} not enabled in this build"
                )))
            }
        };
        Ok(Self { inner })
    }

    /// Separate constructor for the two non-SquashFS-compressor tar codecs
    /// (bzip2, zstd): tar's `.tar.bz2`/`.tar.zst` framing isn't one of the
    /// SquashFS [`Compressor`] variants, so it's selected directly rather
    /// than through that enum.
    pub fn new_bzip2(inner: R) -> Result<Self, SquashTarError> {
        #[cfg(feature = "bzip2")]
        {
            Ok(Self { inner: DecoderInner::Bzip2(bzip2::read::BzDecoder::new(inner)) })
        }
        #[cfg(not(feature = "bzip2"))]
        {
            let _ = inner;
            Err(SquashTarError::Unsupported("bzip2 not enabled in this build".into()))
        }
    }

    pub fn new_zstd(inner: R) -> Result<Self, SquashTarError> {
        #[cfg(feature = "zstd")]
        {
            let decoder = zstd::stream::read::Decoder::new(inner).map_err(SquashTarError::Io)?;
            Ok(Self { inner: DecoderInner::Zstd(decoder) })
        }
        #[cfg(not(feature = "zstd"))]
        {
            let _ = inner;
            Err(SquashTarError::Unsupported("zstd not enabled in this build".into()))
        }
    }
}

impl<R: Read> Read for TransformReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.inner {
            DecoderInner::None(r) => r.read(buf),
            #[cfg(feature = "gzip")]
            DecoderInner::Gzip(r) => r.read(buf),
            #[cfg(feature = "xz")]
            DecoderInner::Xz(r) => r.read(buf),
            #[cfg(feature = "bzip2")]
            DecoderInner::Bzip2(r) => r.read(buf),
            #[cfg(feature = "zstd")]
            DecoderInner::Zstd(r) => r.read(buf),
        }
    }
}

/// Wraps a base writer, compressing bytes as they're pushed through and
/// flushing the compressor's trailer on [`Write::flush`].
pub struct TransformWriter<W: Write> {
    inner: EncoderInner<W>,
}

enum EncoderInner<W: Write> {
    None(W),
    #[cfg(feature = "gzip")]
    Gzip(flate2::write::ZlibEncoder<W>),
    #[cfg(feature = "bzip2")]
    Bzip2(bzip2::write::BzEncoder<W>),
    #[cfg(feature = "zstd")]
    Zstd(zstd::stream::write::Encoder<'static, W>),
}

impl<W: Write> TransformWriter<W> {
    pub fn new(inner: W, compressor: Compressor) -> Result<Self, SquashTarError> {
        let inner = match compressor {
            Compressor::None => EncoderInner::None(inner),
            #[cfg(feature = "gzip")]
            Compressor::Gzip => {
                EncoderInner::Gzip(flate2::write::ZlibEncoder::new(inner, flate2::Compression::default()))
            }
            other => {
                return Err(SquashTarError::Unsupported(format!(
                    "streaming compression for {other:?} not enabled in this build"
                )))
            }
        };
        Ok(Self { inner })
    }

    /// Mirrors [`TransformReader::new_bzip2`]/[`TransformReader::new_zstd`]:
    /// tar's auxiliary `.tar.bz2`/`.tar.zst` framing isn't reachable through
    /// the SquashFS [`Compressor`] enum.
    pub fn new_bzip2(inner: W) -> Result<Self, SquashTarError> {
        #[cfg(feature = "bzip2")]
        {
            Ok(Self { inner: EncoderInner::Bzip2(bzip2::write::BzEncoder::new(inner, bzip2::Compression::default())) })
        }
        #[cfg(not(feature = "bzip2"))]
        {
            let _ = inner;
            Err(SquashTarError::Unsupported("bzip2 not enabled in this build".into()))
        }
    }

    pub fn new_zstd(inner: W) -> Result<Self, SquashTarError> {
        #[cfg(feature = "zstd")]
        {
            let encoder = zstd::stream::write::Encoder::new(inner, 0).map_err(SquashTarError::Io)?;
            Ok(Self { inner: EncoderInner::Zstd(encoder) })
        }
        #[cfg(not(feature = "zstd"))]
        {
            let _ = inner;
            Err(SquashTarError::Unsupported("zstd not enabled in this build".into()))
        }
    }
}

impl<W: Write> TransformWriter<W> {
    /// Finish the compressed stream (writing any trailer) and hand back the
    /// wrapped writer.
    pub fn finish(self) -> io::Result<W> {
        match self.inner {
            EncoderInner::None(w) => Ok(w),
            #[cfg(feature = "gzip")]
            EncoderInner::Gzip(w) => w.finish(),
            #[cfg(feature = "bzip2")]
            EncoderInner::Bzip2(w) => w.finish(),
            #[cfg(feature = "zstd")]
            EncoderInner::Zstd(w) => w.finish(),
        }
    }
}

impl<W: Write> Write for TransformWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut self.inner {
            EncoderInner::None(w) => w.write(buf),
            #[cfg(feature = "gzip")]
            EncoderInner::Gzip(w) => w.write(buf),
            #[cfg(feature = "bzip2")]
            EncoderInner::Bzip2(w) => w.write(buf),
            #[cfg(feature = "zstd")]
            EncoderInner::Zstd(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.inner {
            EncoderInner::None(w) => w.flush(),
            #[cfg(feature = "gzip")]
            EncoderInner::Gzip(w) => w.flush(),
            #[cfg(feature = "bzip2")]
            EncoderInner::Bzip2(w) => w.flush(),
            #[cfg(feature = "zstd")]
            EncoderInner::Zstd(w) => w.flush(),
        }
    }
}

#[cfg(test)]
#[cfg(feature = "gzip")]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn gzip_stream_round_trip() {
        let payload = b"stream transform round trip".repeat(20);
        let mut compressed = Vec::new();
        {
            let w = TransformWriter::new(Cursor::new(Vec::new()), Compressor::Gzip).unwrap();
            let mut w = w;
            w.write_all(&payload).unwrap();
            compressed = w.finish().unwrap().into_inner();
        }

        let mut r = TransformReader::new(Cursor::new(compressed), Compressor::Gzip).unwrap();
        let mut out = Vec::new();
        r.read_to_end(&mut out).unwrap();
        assert_eq!(out, payload);
    }
}
