//! Sort-file parser and application: reassigns each file's packing priority
//! and OR-merges its per-file flags based on a glob/path match, then exposes
//! a stable ascending-priority ordering for the block processor.
//!
//! ```text
//! -10000 [dont_compress,dont_fragment,align] usr/share/bla.txt
//! 0                                          lib/*
//! 10                                         /bin/mk*
//! 20                                         /bin/ch*
//! ```

use std::io::BufRead;

use crate::dirent::glob_match;
use crate::error::{Result, SquashTarError};
use crate::fstree::node::{FileFlag, FileFlags, FsTree, NodePayload};

struct SortRule {
    priority: i64,
    flags: FileFlags,
    pattern: String,
    is_glob: bool,
}

fn parse_flags(field: &str) -> Result<FileFlags> {
    let mut flags = FileFlags::default();
    for name in field.split(',').filter(|s| !s.is_empty()) {
        let flag = match name {
            "dont_compress" => FileFlag::DontCompress,
            "dont_fragment" => FileFlag::DontFragment,
            "align" => FileFlag::Align,
            "nosparse" => FileFlag::NoSparse,
            "glob" => continue,
            other => return Err(SquashTarError::Unsupported(format!("unknown sort-file flag: {other}"))),
        };
        flags.set(flag);
    }
    Ok(flags)
}

fn parse_line(line: &str) -> Result<SortRule> {
    let bad = || SquashTarError::Corrupted(format!("malformed sort-file line: {line}"));
    let mut fields = line.split_whitespace();
    let priority: i64 = fields.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;

    let rest: Vec<&str> = fields.collect();
    let (flag_field, pattern) = match rest.as_slice() {
        [a, b] if a.starts_with('[') && a.ends_with(']') => (Some(&a[1..a.len() - 1]), b.to_string()),
        [a] => (None, a.to_string()),
        _ => return Err(bad()),
    };

    let is_glob = flag_field.map(|f| f.split(',').any(|t| t == "glob")).unwrap_or(false)
        || pattern.contains(['*', '?']);
    let flags = flag_field.map(parse_flags).transpose()?.unwrap_or_default();

    Ok(SortRule { priority, flags, pattern, is_glob })
}

impl FsTree {
    /// Apply `reader`'s sort rules to every entry already in [`Self::file_list`]
    /// (call after [`Self::post_process`]), then stable-sort the list
    /// ascending by priority. Later matching rules override earlier ones for
    /// the same file, per spec.
    pub fn apply_sort_file<R: BufRead>(&mut self, reader: R) -> Result<()> {
        let mut rules = vec![];
        for line in reader.lines() {
            let line = line?;
            let line = line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            rules.push(parse_line(line)?);
        }

        let paths: Vec<String> = self.file_list.iter().map(|&id| self.full_path(id)).collect();
        for rule in &rules {
            for (i, &id) in self.file_list.clone().iter().enumerate() {
                let matches = if rule.is_glob {
                    glob_match(&rule.pattern, &paths[i])
                } else {
                    paths[i] == rule.pattern
                };
                if !matches {
                    continue;
                }
                if let NodePayload::File { inode, .. } = &mut self.arena[id].payload {
                    inode.priority = rule.priority;
                    inode.flags.0 |= rule.flags.0;
                }
            }
        }

        self.file_list.sort_by_key(|&id| match &self.arena[id].payload {
            NodePayload::File { inode, .. } => inode.priority,
            _ => 0,
        });
        Ok(())
    }

    /// Slash-joined path from the root to `id`, without a leading slash.
    pub fn full_path(&self, id: usize) -> String {
        let mut parts = vec![];
        let mut current = id;
        while let Some(parent) = self.arena[current].parent {
            parts.push(String::from_utf8_lossy(&self.arena[current].name).into_owned());
            current = parent;
        }
        parts.reverse();
        parts.join("/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fstree::node::{FileInode, FileSource, FsTreeDefaults, NodeMetadata};
    use std::io::Cursor;

    fn push_file(tree: &mut FsTree, path: &str) {
        let meta = NodeMetadata { mode: 0o100644, uid: 0, gid: 0, mtime: 0 };
        tree.add_generic(
            path,
            meta,
            NodePayload::File { source: Some(FileSource::Path("/dev/null".into())), inode: FileInode::default() },
        )
        .unwrap();
    }

    #[test]
    fn applies_priority_and_flags_then_sorts() {
        let mut tree = FsTree::new(FsTreeDefaults::default());
        for p in ["usr/share/bla.txt", "lib/a.so", "lib/b.so", "lib/c.so", "bin/mkfs", "bin/chmod"] {
            push_file(&mut tree, p);
        }
        tree.post_process().unwrap();

        let sort_file = "\
-10000 [dont_compress,dont_fragment,align] usr/share/bla.txt
0 lib/*
10 /bin/mk*
20 /bin/ch*
";
        tree.apply_sort_file(Cursor::new(sort_file.as_bytes())).unwrap();

        let ordered: Vec<String> = tree.file_list.iter().map(|&id| tree.full_path(id)).collect();
        assert_eq!(ordered[0], "usr/share/bla.txt");
        assert_eq!(ordered.last().unwrap(), "bin/chmod");

        let first = tree.file_list[0];
        let NodePayload::File { inode, .. } = &tree.arena[first].payload else { panic!() };
        assert!(inode.flags.has(FileFlag::DontCompress));
        assert!(inode.flags.has(FileFlag::DontFragment));
        assert!(inode.flags.has(FileFlag::Align));
        assert_eq!(inode.priority, -10000);
    }

    #[test]
    fn later_rule_overrides_earlier_for_same_file() {
        let mut tree = FsTree::new(FsTreeDefaults::default());
        push_file(&mut tree, "a.txt");
        tree.post_process().unwrap();
        tree.apply_sort_file(Cursor::new(b"5 a.txt\n9 a.txt\n".as_slice())).unwrap();
        let id = tree.file_list[0];
        let NodePayload::File { inode, .. } = &tree.arena[id].payload else { panic!() };
        assert_eq!(inode.priority, 9);
    }
}
