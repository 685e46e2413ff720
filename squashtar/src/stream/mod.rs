//! Byte-stream abstractions shared by the tar codec and the SquashFS data
//! reader/writer: a narrow `Read`/`Write`-like vocabulary plus the transform
//! (compress/decompress) wrapper that both sides layer over a base stream.

mod transform;

pub use transform::{TransformReader, TransformWriter};

use std::io::{self, Read, Write};

use crate::error::{Result, SquashTarError};

/// A named, fallible source of bytes. Implemented directly by anything that
/// is already `Read` via the blanket impl below; named so error messages and
/// `splice`/`read_line` can report a filename without threading one
/// separately through every call site.
pub trait InputStream: Read {
    fn name(&self) -> &str;
}

/// A named, fallible sink of bytes, with sparse-hole support for the
/// writer side of the data-block pipeline.
pub trait OutputStream: Write {
    fn name(&self) -> &str;

    /// Logically write `n` zero bytes. The default implementation writes
    /// real zeroes; sinks backed by a real file can override this to punch
    /// a hole instead.
    fn append_sparse(&mut self, n: u64) -> io::Result<()> {
        let mut remaining = n;
        let zeros = [0u8; 8192];
        while remaining > 0 {
            let chunk = remaining.min(zeros.len() as u64) as usize;
            self.write_all(&zeros[..chunk])?;
            remaining -= chunk as u64;
        }
        Ok(())
    }
}

/// Flags controlling [`read_line`].
#[derive(Copy, Clone, Debug, Default)]
pub struct ReadLineFlags {
    /// Strip a trailing `\n` (and a preceding `\r`) from the returned line.
    pub trim: bool,
    /// Silently skip lines that are empty after trimming.
    pub skip_empty: bool,
}

/// Read bytes until (and including, unless trimmed) a `\n`, or EOF. Returns
/// `Ok(None)` at a clean EOF with nothing left to return.
pub fn read_line<R: Read>(r: &mut R, flags: ReadLineFlags) -> Result<Option<String>> {
    loop {
        let mut line = Vec::new();
        let mut byte = [0u8; 1];
        let mut saw_any = false;
        loop {
            match r.read(&mut byte) {
                Ok(0) => break,
                Ok(_) => {
                    saw_any = true;
                    if byte[0] == b'\n' {
                        if !flags.trim {
                            line.push(byte[0]);
                        }
                        break;
                    }
                    line.push(byte[0]);
                }
                Err(e) => return Err(SquashTarError::Io(e)),
            }
        }
        if !saw_any && line.is_empty() {
            return Ok(None);
        }
        if flags.trim && line.last() == Some(&b'\r') {
            line.pop();
        }
        let line = String::from_utf8(line).map_err(|e| SquashTarError::StringUtf8(e.utf8_error()))?;
        if flags.skip_empty && line.is_empty() {
            if !saw_any {
                return Ok(None);
            }
            continue;
        }
        return Ok(Some(line));
    }
}

/// Copy exactly `n` bytes from `input` to `output`, in fixed-size chunks.
pub fn splice<R: Read, W: Write>(input: &mut R, output: &mut W, n: u64) -> Result<()> {
    let mut remaining = n;
    let mut buf = [0u8; 65536];
    while remaining > 0 {
        let chunk = remaining.min(buf.len() as u64) as usize;
        input.read_exact(&mut buf[..chunk])?;
        output.write_all(&buf[..chunk])?;
        remaining -= chunk as u64;
    }
    Ok(())
}

/// Read exactly `n` bytes, returning an `UnexpectedEof`-mapped error instead
/// of panicking on short reads.
pub fn read_exact_bytes<R: Read>(r: &mut R, n: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; n];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn read_line_trims_and_skips_empty() {
        let mut c = Cursor::new(b"a\n\nb\r\n".to_vec());
        let flags = ReadLineFlags { trim: true, skip_empty: true };
        assert_eq!(read_line(&mut c, flags).unwrap(), Some("a".into()));
        assert_eq!(read_line(&mut c, flags).unwrap(), Some("b".into()));
        assert_eq!(read_line(&mut c, flags).unwrap(), None);
    }

    #[test]
    fn splice_copies_exact_count() {
        let mut input = Cursor::new(b"hello world".to_vec());
        let mut output = Vec::new();
        splice(&mut input, &mut output, 5).unwrap();
        assert_eq!(output, b"hello");
    }
}
