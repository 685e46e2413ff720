//! Pack-file description parser: the line-oriented pseudo-file format used
//! to build a tree without a real source filesystem, one record per
//! filesystem entry.
//!
//! ```text
//! dir  /etc           0755 0 0
//! file /etc/motd      0644 0 0 /home/me/build/motd
//! slink /bin/sh       0777 0 0 busybox
//! nod  /dev/console   0600 0 0 c 5 1
//! ```

use std::io::BufRead;

use crate::dirent::TreeWalkOptions;
use crate::error::{Result, SquashTarError};
use crate::fstree::node::{FsTree, HardLinkState, NodeMetadata, NodePayload};

/// One parsed line from a description file, before it has been turned into
/// a tree node (a `glob` line instead triggers a host-filesystem scan).
enum Record {
    Dir { path: String, mode: u32, uid: u32, gid: u32 },
    Symlink { path: String, mode: u32, uid: u32, gid: u32, target: String },
    HardLink { path: String, mode: u32, uid: u32, gid: u32, target: String },
    Node { path: String, mode: u32, uid: u32, gid: u32, dev_type: char, major: u32, minor: u32 },
    Fifo { path: String, mode: u32, uid: u32, gid: u32 },
    Socket { path: String, mode: u32, uid: u32, gid: u32 },
    File { path: String, mode: u32, uid: u32, gid: u32, source: String },
    Glob { path: String, mode: Option<u32>, uid: Option<u32>, gid: Option<u32>, rest: Vec<String> },
}

/// Split a line into whitespace-separated fields, honoring `"..."` quoting
/// with `\"` and `\\` escapes for fields (normally paths) that contain
/// spaces.
fn tokenize(line: &str) -> Result<Vec<String>> {
    let mut tokens = vec![];
    let mut chars = line.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        let mut tok = String::new();
        if c == '"' {
            chars.next();
            loop {
                match chars.next() {
                    Some('"') => break,
                    Some('\\') => match chars.next() {
                        Some('"') => tok.push('"'),
                        Some('\\') => tok.push('\\'),
                        Some(other) => {
                            tok.push('\\');
                            tok.push(other);
                        }
                        None => return Err(SquashTarError::Corrupted("unterminated escape".into())),
                    },
                    Some(other) => tok.push(other),
                    None => return Err(SquashTarError::Corrupted("unterminated quoted field".into())),
                }
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() {
                    break;
                }
                tok.push(c);
                chars.next();
            }
        }
        tokens.push(tok);
    }
    Ok(tokens)
}

fn parse_octal_mode(s: &str) -> Result<u32> {
    let v = u32::from_str_radix(s, 8).map_err(|_| SquashTarError::Corrupted(format!("bad mode: {s}")))?;
    if v > 0o7777 {
        return Err(SquashTarError::Corrupted(format!("mode out of range: {s}")));
    }
    Ok(v)
}

fn parse_id(s: &str) -> Result<u32> {
    s.parse().map_err(|_| SquashTarError::Corrupted(format!("bad id: {s}")))
}

fn parse_record(tokens: &[String]) -> Result<Record> {
    let bad = || SquashTarError::Corrupted(format!("malformed description line: {}", tokens.join(" ")));
    let kind = tokens.first().ok_or_else(bad)?.as_str();
    let path = tokens.get(1).ok_or_else(bad)?.clone();

    if kind == "glob" {
        let mode = tokens.get(2).filter(|s| *s != "*").map(|s| parse_octal_mode(s)).transpose()?;
        let uid = tokens.get(3).filter(|s| *s != "*").map(|s| parse_id(s)).transpose()?;
        let gid = tokens.get(4).filter(|s| *s != "*").map(|s| parse_id(s)).transpose()?;
        let rest = tokens.get(5..).map(|s| s.to_vec()).unwrap_or_default();
        return Ok(Record::Glob { path, mode, uid, gid, rest });
    }

    let mode = parse_octal_mode(tokens.get(2).ok_or_else(bad)?)?;
    let uid = parse_id(tokens.get(3).ok_or_else(bad)?)?;
    let gid = parse_id(tokens.get(4).ok_or_else(bad)?)?;

    Ok(match kind {
        "dir" => Record::Dir { path, mode, uid, gid },
        "slink" => Record::Symlink { path, mode, uid, gid, target: tokens.get(5).ok_or_else(bad)?.clone() },
        "link" => Record::HardLink { path, mode, uid, gid, target: tokens.get(5).ok_or_else(bad)?.clone() },
        "pipe" => Record::Fifo { path, mode, uid, gid },
        "sock" => Record::Socket { path, mode, uid, gid },
        "file" => Record::File { path, mode, uid, gid, source: tokens.get(5).ok_or_else(bad)?.clone() },
        "nod" => {
            let dev_type = tokens.get(5).ok_or_else(bad)?.chars().next().ok_or_else(bad)?;
            if dev_type != 'c' && dev_type != 'b' {
                return Err(bad());
            }
            let major = parse_id(tokens.get(6).ok_or_else(bad)?)?;
            let minor = parse_id(tokens.get(7).ok_or_else(bad)?)?;
            Record::Node { path, mode, uid, gid, dev_type, major, minor }
        }
        other => return Err(SquashTarError::Unsupported(format!("unknown description kind: {other}"))),
    })
}

impl FsTree {
    /// Parse a pack-file description from `reader` and apply every record to
    /// this tree. `glob` records recurse into the host filesystem rooted at
    /// their path.
    pub fn from_description<R: BufRead>(&mut self, reader: R) -> Result<()> {
        for line in reader.lines() {
            let line = line?;
            let line = line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let tokens = tokenize(line)?;
            if tokens.is_empty() {
                continue;
            }
            let record = parse_record(&tokens)?;
            self.apply_record(record)?;
        }
        Ok(())
    }

    fn apply_record(&mut self, record: Record) -> Result<()> {
        match record {
            Record::Dir { path, mode, uid, gid } => {
                let meta = NodeMetadata { mode: 0o40000 | mode, uid, gid, mtime: self.defaults.mtime };
                self.add_generic(&path, meta, NodePayload::Directory { children: vec![], implicit: false })?;
            }
            Record::Symlink { path, mode, uid, gid, target } => {
                let meta = NodeMetadata { mode: 0o120000 | mode, uid, gid, mtime: self.defaults.mtime };
                self.add_generic(&path, meta, NodePayload::Symlink { target: target.into_bytes() })?;
            }
            Record::HardLink { path, mode, uid, gid, target } => {
                let meta = NodeMetadata { mode, uid, gid, mtime: self.defaults.mtime };
                self.add_generic(&path, meta, NodePayload::HardLink(HardLinkState::Unresolved(target)))?;
            }
            Record::Node { path, mode, uid, gid, dev_type, major, minor } => {
                let type_bits = if dev_type == 'c' { 0o20000 } else { 0o60000 };
                let meta = NodeMetadata { mode: type_bits | mode, uid, gid, mtime: self.defaults.mtime };
                self.add_generic(&path, meta, NodePayload::Device { major, minor })?;
            }
            Record::Fifo { path, mode, uid, gid } => {
                let meta = NodeMetadata { mode: 0o10000 | mode, uid, gid, mtime: self.defaults.mtime };
                self.add_generic(&path, meta, NodePayload::Fifo)?;
            }
            Record::Socket { path, mode, uid, gid } => {
                let meta = NodeMetadata { mode: 0o140000 | mode, uid, gid, mtime: self.defaults.mtime };
                self.add_generic(&path, meta, NodePayload::Socket)?;
            }
            Record::File { path, mode, uid, gid, source } => {
                let meta = NodeMetadata { mode: 0o100000 | mode, uid, gid, mtime: self.defaults.mtime };
                let size = std::fs::metadata(&source).map(|m| m.len()).unwrap_or(0);
                self.add_generic(
                    &path,
                    meta,
                    NodePayload::File {
                        source: Some(crate::fstree::node::FileSource::Path(source.into())),
                        inode: crate::fstree::node::FileInode { file_size: size, ..Default::default() },
                    },
                )?;
            }
            Record::Glob { path, mode, uid, gid, rest } => {
                self.apply_glob(&path, mode, uid, gid, &rest)?;
            }
        }
        Ok(())
    }

    fn apply_glob(
        &mut self,
        anchor: &str,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        args: &[String],
    ) -> Result<()> {
        let mut opts = TreeWalkOptions { prefix: format!("{anchor}/"), ..Default::default() };
        let mut host_root = anchor.to_string();
        let mut keeptime = true;
        let mut i = 0;
        while i < args.len() {
            match args[i].as_str() {
                "-xdev" => opts.one_file_system = true,
                "-nonrecursive" => {}
                "-keeptime" => keeptime = true,
                "-name" | "-path" => {
                    opts.match_full_path = args[i] == "-path";
                    i += 1;
                    opts.glob = args.get(i).cloned();
                }
                "-type" | "--" => {
                    i += 1;
                }
                root if i == 0 || args[i - 1] != "-name" && args[i - 1] != "-path" => {
                    host_root = root.to_string();
                }
                _ => {}
            }
            i += 1;
        }
        let _ = keeptime;

        let iter = crate::dirent::TreeIterator::new(&host_root, opts)?;
        self.drain_iterator_override(Box::new(iter), mode, uid, gid)?;
        Ok(())
    }

    fn drain_iterator_override(
        &mut self,
        iter: Box<dyn crate::dirent::DirIterator>,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
    ) -> Result<()> {
        // Overrides apply uniformly: "*" (None here) means inherit from
        // host, matching `from_description`'s asterisk convention.
        self.from_dir_iterator(iter)?;
        if mode.is_none() && uid.is_none() && gid.is_none() {
            return Ok(());
        }
        for node in &mut self.arena {
            if let Some(m) = mode {
                let type_bits = node.mode & !0o7777;
                node.mode = type_bits | m;
            }
            if let Some(u) = uid {
                node.uid = u;
            }
            if let Some(g) = gid {
                node.gid = g;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fstree::node::FsTreeDefaults;
    use std::io::Cursor;

    fn tree_from(text: &str) -> FsTree {
        let mut tree = FsTree::new(FsTreeDefaults::default());
        tree.from_description(Cursor::new(text.as_bytes())).unwrap();
        tree
    }

    #[test]
    fn tokenize_handles_quotes_and_escapes() {
        let toks = tokenize(r#"dir "/foo bar/ test \"/" 0755 0 0"#).unwrap();
        assert_eq!(toks, vec!["dir", "/foo bar/ test \"/", "0755", "0", "0"]);
    }

    #[test]
    fn comments_and_blank_lines_are_skipped() {
        let tree = tree_from("# a comment\n\ndir /etc 0755 0 0\n");
        assert_eq!(tree.arena.len(), 2);
    }

    #[test]
    fn nine_line_description_builds_expected_tree() {
        let text = "\
dir /a 0755 0 0
dir /a/b 0755 0 0
dir /a/c 0755 0 0
dir /d 0755 0 0
dir /e 0755 0 0
dir /f 0755 0 0
dir /g 0755 0 0
slink /slink 0644 2 3 slinktarget
file /f/one 0644 0 0 /dev/null
";
        let mut tree = tree_from(text);
        tree.post_process().unwrap();
        assert_eq!(tree.link_count(tree.root()), 9);

        let slink = tree
            .arena
            .iter()
            .position(|n| n.name == b"slink")
            .expect("slink node present");
        assert_eq!(tree.arena[slink].mode & 0o170000, 0o120000);
        assert_eq!(tree.link_count(slink), 1);
        let NodePayload::Symlink { target } = &tree.arena[slink].payload else { panic!("not a symlink") };
        assert_eq!(target, b"slinktarget");
    }

    #[test]
    fn implicit_parents_are_created() {
        let tree = tree_from("slink \"/foo bar/ test \\\"/\" 0644 0 0 x\n");
        // the parent "foo bar/ test \"" should exist, marked implicit
        let root_children = match &tree.arena[tree.root()].payload {
            NodePayload::Directory { children, .. } => children.clone(),
            _ => unreachable!(),
        };
        assert_eq!(root_children.len(), 1);
        let parent = &tree.arena[root_children[0]];
        assert!(matches!(parent.payload, NodePayload::Directory { implicit: true, .. }));
    }

    #[test]
    fn mode_must_be_valid_octal_and_in_range() {
        let mut tree = FsTree::new(FsTreeDefaults::default());
        assert!(tree.from_description(Cursor::new(b"dir /x 17777 0 0\n".as_slice())).is_err());
    }

    #[test]
    fn device_node_records_major_minor() {
        let tree = tree_from("nod /dev/console 0600 0 0 c 5 1\n");
        let id = tree.arena.iter().position(|n| n.name == b"console").unwrap();
        assert_eq!(tree.arena[id].mode & 0o170000, 0o20000);
        let NodePayload::Device { major, minor } = tree.arena[id].payload else { panic!("not a device") };
        assert_eq!((major, minor), (5, 1));
    }
}
