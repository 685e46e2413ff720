//! Decoding and encoding of individual tar members.

use std::collections::BTreeMap;
use std::io::{Read, Write};

use crate::error::{Result, SquashTarError};
use crate::tar::{block_round, pax, sparse::SparseMap, BLOCK_SIZE};

/// File-type discriminant, matching the tar `typeflag` byte one-to-one
/// except that `HardLink` layers a flag on top of whatever the target's own
/// type would be (tar headers say "it's a hard link", not what kind of file
/// the link points at).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Regular,
    HardLink,
    Symlink,
    CharDevice,
    BlockDevice,
    Directory,
    Fifo,
}

impl EntryKind {
    fn typeflag(self) -> u8 {
        match self {
            Self::Regular => b'0',
            Self::HardLink => b'1',
            Self::Symlink => b'2',
            Self::CharDevice => b'3',
            Self::BlockDevice => b'4',
            Self::Directory => b'5',
            Self::Fifo => b'6',
        }
    }

    fn from_typeflag(b: u8) -> Option<Self> {
        match b {
            b'0' | 0 => Some(Self::Regular),
            b'1' => Some(Self::HardLink),
            b'2' => Some(Self::Symlink),
            b'3' => Some(Self::CharDevice),
            b'4' => Some(Self::BlockDevice),
            b'5' => Some(Self::Directory),
            b'6' => Some(Self::Fifo),
            _ => None,
        }
    }
}

/// A decoded tar member, with every pax/GNU override already folded in.
#[derive(Debug, Clone)]
pub struct TarEntry {
    pub name: String,
    pub kind: EntryKind,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub uname: String,
    pub gname: String,
    pub size: u64,
    pub mtime: u64,
    pub link_name: String,
    pub rdev_major: u32,
    pub rdev_minor: u32,
    pub xattrs: Vec<(String, Vec<u8>)>,
    pub sparse: Option<SparseMap>,
    /// The member's content, read eagerly by [`TarReader::next`]. Empty for
    /// directories, symlinks, devices and fifos.
    pub data: Vec<u8>,
}

impl Default for TarEntry {
    fn default() -> Self {
        Self {
            name: String::new(),
            kind: EntryKind::Regular,
            mode: 0o644,
            uid: 0,
            gid: 0,
            uname: String::new(),
            gname: String::new(),
            size: 0,
            mtime: 0,
            link_name: String::new(),
            rdev_major: 0,
            rdev_minor: 0,
            xattrs: vec![],
            sparse: None,
            data: vec![],
        }
    }
}

fn checksum(block: &[u8; BLOCK_SIZE]) -> u64 {
    let mut buf = *block;
    buf[148..156].fill(b' ');
    buf.iter().map(|&b| u64::from(b)).sum()
}

fn parse_octal(field: &[u8]) -> Result<u64> {
    // GNU base-256: top bit of the first byte set means the remaining bytes
    // (after clearing that bit) are a big-endian binary integer.
    if field[0] & 0x80 != 0 {
        let mut v: u64 = (field[0] & 0x7f) as u64;
        for &b in &field[1..] {
            v = (v << 8) | u64::from(b);
        }
        return Ok(v);
    }
    let s = std::str::from_utf8(field).map_err(|e| SquashTarError::StrUtf8(e))?;
    let s = s.trim_matches(|c: char| c == '\0' || c.is_whitespace());
    if s.is_empty() {
        return Ok(0);
    }
    u64::from_str_radix(s, 8).map_err(|_| SquashTarError::corrupted("non-octal numeric tar field"))
}

fn write_octal(buf: &mut [u8], value: u64) {
    let width = buf.len() - 1;
    let s = format!("{value:0width$o}", width = width);
    let s = if s.len() > width { &s[s.len() - width..] } else { &s };
    buf[..width].copy_from_slice(s.as_bytes());
    buf[width] = 0;
}

fn cstr_field(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

fn put_field(buf: &mut [u8], s: impl AsRef<[u8]>) {
    let bytes = s.as_ref();
    let n = bytes.len().min(buf.len());
    buf[..n].copy_from_slice(&bytes[..n]);
}

/// Decodes a stream of 512-byte tar records into [`TarEntry`]s plus the
/// associated file-content reader, folding pax/GNU long-name precedence.
pub struct TarReader<R: Read> {
    inner: R,
    pending_long_name: Option<String>,
    pending_long_link: Option<String>,
    pending_pax: Option<BTreeMap<String, String>>,
    global_pax: BTreeMap<String, String>,
}

impl<R: Read> TarReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            pending_long_name: None,
            pending_long_link: None,
            pending_pax: None,
            global_pax: BTreeMap::new(),
        }
    }

    fn read_block(&mut self) -> Result<[u8; BLOCK_SIZE]> {
        let mut buf = [0u8; BLOCK_SIZE];
        self.inner.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn read_payload(&mut self, size: u64) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; size as usize];
        self.inner.read_exact(&mut buf)?;
        let padded = block_round(size) - size;
        if padded > 0 {
            let mut pad = vec![0u8; padded as usize];
            self.inner.read_exact(&mut pad)?;
        }
        Ok(buf)
    }

    /// Read the next member. Returns `Ok(None)` at the two-zero-block
    /// end-of-archive marker.
    pub fn next(&mut self) -> Result<Option<TarEntry>> {
        loop {
            let block = self.read_block()?;
            if block.iter().all(|&b| b == 0) {
                return Ok(None);
            }

            let stored_checksum = parse_octal(&block[148..156])?;
            if checksum(&block) != stored_checksum {
                return Err(SquashTarError::corrupted("tar header checksum mismatch"));
            }

            let typeflag = block[156];
            let size = parse_octal(&block[124..136])?;

            match typeflag {
                b'L' => {
                    let data = self.read_payload(size)?;
                    self.pending_long_name = Some(cstr_field(&data));
                    continue;
                }
                b'K' => {
                    let data = self.read_payload(size)?;
                    self.pending_long_link = Some(cstr_field(&data));
                    continue;
                }
                b'x' => {
                    let data = self.read_payload(size)?;
                    self.pending_pax = Some(pax::decode(&data)?);
                    continue;
                }
                b'g' => {
                    let data = self.read_payload(size)?;
                    self.global_pax.extend(pax::decode(&data)?);
                    continue;
                }
                _ => {}
            }

            let kind = EntryKind::from_typeflag(typeflag)
                .ok_or_else(|| SquashTarError::Unsupported(format!("tar typeflag {typeflag:#x}")))?;

            let mut entry = TarEntry {
                name: cstr_field(&block[0..100]),
                kind,
                mode: parse_octal(&block[100..108])? as u32,
                uid: parse_octal(&block[108..116])? as u32,
                gid: parse_octal(&block[116..124])? as u32,
                size,
                mtime: parse_octal(&block[136..148])?,
                link_name: cstr_field(&block[157..257]),
                uname: cstr_field(&block[265..297]),
                gname: cstr_field(&block[297..329]),
                rdev_major: parse_octal(&block[329..337])? as u32,
                rdev_minor: parse_octal(&block[337..345])? as u32,
                xattrs: vec![],
                sparse: None,
                data: vec![],
            };

            // ustar prefix/name split.
            let magic = &block[257..263];
            if magic == b"ustar\0" || magic == b"ustar " {
                let prefix = cstr_field(&block[345..500]);
                if !prefix.is_empty() {
                    entry.name = format!("{prefix}/{}", entry.name);
                }
            }

            if let Some(name) = self.pending_long_name.take() {
                entry.name = name;
            }
            if let Some(link) = self.pending_long_link.take() {
                entry.link_name = link;
            }

            let mut pax_map = self.global_pax.clone();
            if let Some(p) = self.pending_pax.take() {
                pax_map.extend(p);
            }
            for (key, value) in &pax_map {
                match key.as_str() {
                    "path" => entry.name = value.clone(),
                    "linkpath" => entry.link_name = value.clone(),
                    "size" => entry.size = value.parse().unwrap_or(entry.size),
                    "mtime" => {
                        entry.mtime = value.split('.').next().unwrap_or("0").parse().unwrap_or(entry.mtime)
                    }
                    "uid" => entry.uid = value.parse().unwrap_or(entry.uid),
                    "gid" => entry.gid = value.parse().unwrap_or(entry.gid),
                    "uname" => entry.uname = value.clone(),
                    "gname" => entry.gname = value.clone(),
                    "GNU.sparse.realsize" | "GNU.sparse.size" => {
                        let map = entry.sparse.get_or_insert_with(SparseMap::default);
                        map.real_size = value.parse().unwrap_or(0);
                    }
                    "GNU.sparse.map" => {
                        if let Some(map) = SparseMap::from_comma_map(value) {
                            let real_size = entry.sparse.as_ref().map(|m| m.real_size).unwrap_or(0);
                            entry.sparse = Some(SparseMap { real_size, ..map });
                        }
                    }
                    key if key.starts_with("SCHILY.xattr.") => {
                        let name = key.trim_start_matches("SCHILY.xattr.").to_string();
                        entry.xattrs.push((name, value.clone().into_bytes()));
                    }
                    _ => {}
                }
            }

            // directories/symlinks/devices/fifos carry no content blocks
            // regardless of a nonzero `size` field some writers leave set.
            let has_payload = matches!(kind, EntryKind::Regular | EntryKind::HardLink);
            entry.data = if has_payload { self.read_payload(entry.size)? } else { vec![] };
            return Ok(Some(entry));
        }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

/// Encodes [`TarEntry`]s (each paired with its content) into a tar stream,
/// synthesizing pax/GNU long-name records as needed.
pub struct TarWriter<W: Write> {
    inner: W,
}

impl<W: Write> TarWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn write_entry(&mut self, entry: &TarEntry, data: &[u8]) -> Result<()> {
        let mut pax_fields: Vec<(String, String)> = vec![];

        let name_fits = entry.name.len() <= 100 && !entry.name.contains('\0');
        let link_fits = entry.link_name.len() <= 100;

        if !name_fits {
            self.write_gnu_long(b'L', &entry.name)?;
        }
        if !link_fits {
            self.write_gnu_long(b'K', &entry.link_name)?;
        }

        for (key, value) in &entry.xattrs {
            pax_fields.push((format!("SCHILY.xattr.{key}"), String::from_utf8_lossy(value).into_owned()));
        }
        if entry.size > 0o7_777_777_777 {
            pax_fields.push(("size".to_string(), entry.size.to_string()));
        }

        if !pax_fields.is_empty() {
            let payload = pax::encode(&pax_fields);
            let pax_entry = TarEntry {
                name: format!("PaxHeaders.0/{}", entry.name),
                size: payload.len() as u64,
                ..TarEntry::default()
            };
            self.write_raw_entry(&pax_entry, b'x', &payload)?;
        }

        self.write_raw_entry(entry, entry.kind.typeflag(), data)
    }

    fn write_gnu_long(&mut self, typeflag: u8, value: &str) -> Result<()> {
        let mut data = value.as_bytes().to_vec();
        data.push(0);
        let long_entry = TarEntry {
            name: "././@LongLink".to_string(),
            size: data.len() as u64,
            ..TarEntry::default()
        };
        self.write_raw_entry(&long_entry, typeflag, &data)
    }

    fn write_raw_entry(&mut self, entry: &TarEntry, typeflag: u8, data: &[u8]) -> Result<()> {
        let mut block = [0u8; BLOCK_SIZE];
        let name = if entry.name.len() <= 100 { entry.name.as_str() } else { &entry.name[entry.name.len() - 100..] };
        put_field(&mut block[0..100], name);
        write_octal(&mut block[100..108], u64::from(entry.mode));
        write_octal(&mut block[108..116], u64::from(entry.uid));
        write_octal(&mut block[116..124], u64::from(entry.gid));
        write_octal(&mut block[124..136], entry.size.min(0o7_777_777_777));
        write_octal(&mut block[136..148], entry.mtime);
        block[148..156].fill(b' ');
        block[156] = typeflag;
        put_field(&mut block[157..257], &entry.link_name);
        put_field(&mut block[257..263], b"ustar\0");
        put_field(&mut block[263..265], b"00");
        put_field(&mut block[265..297], &entry.uname);
        put_field(&mut block[297..329], &entry.gname);
        write_octal(&mut block[329..337], u64::from(entry.rdev_major));
        write_octal(&mut block[337..345], u64::from(entry.rdev_minor));

        let sum = checksum(&block);
        write_octal(&mut block[148..154], sum);
        block[154] = 0;
        block[155] = b' ';

        self.inner.write_all(&block)?;
        self.inner.write_all(data)?;
        let pad = block_round(data.len() as u64) - data.len() as u64;
        if pad > 0 {
            self.inner.write_all(&vec![0u8; pad as usize])?;
        }
        Ok(())
    }

    /// Write the archive's two terminating all-zero records.
    pub fn finish(mut self) -> Result<W> {
        self.inner.write_all(&[0u8; BLOCK_SIZE * 2])?;
        Ok(self.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn round_trip_regular_file() {
        let entry = TarEntry {
            name: "hello.txt".to_string(),
            kind: EntryKind::Regular,
            mode: 0o644,
            size: 13,
            mtime: 1_700_000_000,
            uname: "goliath".to_string(),
            ..TarEntry::default()
        };
        let mut buf = Vec::new();
        let mut w = TarWriter::new(&mut buf);
        w.write_entry(&entry, b"Hello, World!").unwrap();
        w.finish().unwrap();

        let mut r = TarReader::new(Cursor::new(buf));
        let decoded = r.next().unwrap().unwrap();
        assert_eq!(decoded.name, "hello.txt");
        assert_eq!(decoded.size, 13);
        assert_eq!(decoded.uname, "goliath");
        assert_eq!(decoded.data, b"Hello, World!");
        assert!(r.next().unwrap().is_none());
    }

    #[test]
    fn long_name_round_trips_via_gnu_longlink() {
        let long_name = "a/".repeat(60) + "file.bin";
        let entry = TarEntry { name: long_name.clone(), size: 4, ..TarEntry::default() };
        let mut buf = Vec::new();
        let mut w = TarWriter::new(&mut buf);
        w.write_entry(&entry, b"data").unwrap();
        w.finish().unwrap();

        let mut r = TarReader::new(Cursor::new(buf));
        let decoded = r.next().unwrap().unwrap();
        assert_eq!(decoded.name, long_name);
    }

    #[test]
    fn xattrs_round_trip_via_pax() {
        let entry = TarEntry {
            name: "test.exe".to_string(),
            size: 0,
            xattrs: vec![("user.mime_type".to_string(), b"blob/magic".to_vec())],
            ..TarEntry::default()
        };
        let mut buf = Vec::new();
        let mut w = TarWriter::new(&mut buf);
        w.write_entry(&entry, b"").unwrap();
        w.finish().unwrap();

        let mut r = TarReader::new(Cursor::new(buf));
        let decoded = r.next().unwrap().unwrap();
        assert_eq!(decoded.xattrs, vec![("user.mime_type".to_string(), b"blob/magic".to_vec())]);
    }

    #[test]
    fn archive_is_512_aligned() {
        let entry = TarEntry { name: "a".to_string(), size: 3, ..TarEntry::default() };
        let mut buf = Vec::new();
        let mut w = TarWriter::new(&mut buf);
        w.write_entry(&entry, b"abc").unwrap();
        let buf = w.finish().unwrap();
        assert_eq!(buf.len() % BLOCK_SIZE, 0);
    }
}
