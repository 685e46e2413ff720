//! The in-memory filesystem tree: an arena of [`Node`]s assembled by a
//! description file, a directory scan, or a tar stream, and normalized by
//! [`FsTree::post_process`] before being handed to the block processor and
//! SquashFS writer.
//!
//! Parent/child/hard-link relationships that the original implementation
//! expresses with raw and reference-counted pointers become arena indices
//! here: a child is owned by its parent's `children` vector, a parent is a
//! plain index back into the arena, and a hard-link target is an index
//! resolved once, during [`FsTree::post_process`]. Nothing is reference
//! counted.

use std::collections::HashMap;
use std::io::Read;

use crate::dirent::{DirEntryInfo, DirIterator, EntryType};
use crate::error::{Result, SquashTarError};
use crate::inode::DataSize;

/// Index into [`FsTree::arena`]. `0` is always the root.
pub type NodeId = usize;

/// Per-file flags a sort-file entry (or an explicit push) can set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FileFlag {
    DontCompress = 0b0001,
    DontFragment = 0b0010,
    Align = 0b0100,
    NoSparse = 0b1000,
}

/// Bitset of [`FileFlag`]s, stored the same way [`crate::squashfs::Flags`]
/// stores super-block flags: a plain integer tested and set with `as u8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileFlags(pub u8);

impl FileFlags {
    pub fn set(&mut self, f: FileFlag) {
        self.0 |= f as u8;
    }

    pub fn has(&self, f: FileFlag) -> bool {
        self.0 & f as u8 != 0
    }
}

/// Where a regular file's bytes come from.
pub enum FileSource {
    /// A path on the host filesystem, opened lazily by the block processor.
    Path(std::path::PathBuf),
    /// An already in-memory (or otherwise opaque) reader.
    Reader(Box<dyn Read + Send>),
}

impl std::fmt::Debug for FileSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Path(p) => write!(f, "FileSource::Path({p:?})"),
            Self::Reader(_) => write!(f, "FileSource::Reader(..)"),
        }
    }
}

/// A file's inode-fragment payload: block-size list, fragment placement,
/// and the packing hints a sort file may have assigned.
#[derive(Debug, Default)]
pub struct FileInode {
    pub block_sizes: Vec<DataSize>,
    pub frag_index: u32,
    pub frag_offset: u32,
    pub file_size: u64,
    pub sparse: u64,
    pub priority: i64,
    pub flags: FileFlags,
}

/// A hard link that has not yet been resolved to its target node, or has.
#[derive(Debug, Clone)]
pub enum HardLinkState {
    Unresolved(String),
    Resolved(NodeId),
}

#[derive(Debug)]
pub enum NodePayload {
    Directory {
        children: Vec<NodeId>,
        /// Created implicitly by [`FsTree::add_generic`] to fill in a
        /// missing intermediate path component; upgraded in place (metadata
        /// copied in, flag cleared) if a real directory is later inserted at
        /// the same path.
        implicit: bool,
    },
    File {
        source: Option<FileSource>,
        inode: FileInode,
    },
    Symlink {
        target: Vec<u8>,
    },
    Device {
        major: u32,
        minor: u32,
    },
    HardLink(HardLinkState),
    Fifo,
    Socket,
}

impl NodePayload {
    pub fn is_directory(&self) -> bool {
        matches!(self, Self::Directory { .. })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct NodeMetadata {
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub mtime: i64,
}

/// Any filesystem entity: directory, file, symlink, device, fifo, socket, or
/// hard link.
#[derive(Debug)]
pub struct Node {
    pub name: Vec<u8>,
    pub parent: Option<NodeId>,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    /// Clamped to `0..=u32::MAX` at serialization time, per spec.
    pub mtime: i64,
    /// `0` until [`FsTree::post_process`] allocates it.
    pub inode_number: u32,
    /// `0xFFFF_FFFF` (see [`crate::squashfs::NO_XATTR_INDEX`]) when absent.
    pub xattr_index: u32,
    pub xattrs: Vec<(String, Vec<u8>)>,
    pub payload: NodePayload,
}

impl Node {
    fn new(name: Vec<u8>, parent: Option<NodeId>, meta: NodeMetadata, payload: NodePayload) -> Self {
        Self {
            name,
            parent,
            mode: meta.mode,
            uid: meta.uid,
            gid: meta.gid,
            mtime: meta.mtime,
            inode_number: 0,
            xattr_index: crate::squashfs::NO_XATTR_INDEX,
            xattrs: vec![],
            payload,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FsTreeDefaults {
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub mtime: i64,
}

impl Default for FsTreeDefaults {
    fn default() -> Self {
        Self { mode: 0o755, uid: 0, gid: 0, mtime: 0 }
    }
}

/// Owns the whole tree: the node arena, defaults, the post-processed inode
/// array, the depth-first regular-file list, and link-count bookkeeping.
pub struct FsTree {
    pub arena: Vec<Node>,
    pub defaults: FsTreeDefaults,
    /// Valid only after [`Self::post_process`]: indexed by `inode_number - 1`.
    pub inode_ptrs: Vec<NodeId>,
    /// Valid only after [`Self::post_process`]: regular files in depth-first
    /// order, the order the block processor consumes them in.
    pub file_list: Vec<NodeId>,
    /// Extra link count credited to each node by resolved hard links,
    /// populated during [`Self::post_process`].
    link_counts: HashMap<NodeId, u32>,
    processed: bool,
}

impl FsTree {
    pub fn new(defaults: FsTreeDefaults) -> Self {
        let root = Node::new(
            vec![],
            None,
            NodeMetadata { mode: 0o40000 | defaults.mode, uid: defaults.uid, gid: defaults.gid, mtime: defaults.mtime },
            NodePayload::Directory { children: vec![], implicit: false },
        );
        Self {
            arena: vec![root],
            defaults,
            inode_ptrs: vec![],
            file_list: vec![],
            link_counts: HashMap::new(),
            processed: false,
        }
    }

    pub fn root(&self) -> NodeId {
        0
    }

    fn split_path(path: &str) -> Vec<&str> {
        path.split('/').filter(|c| !c.is_empty()).collect()
    }

    fn find_child(&self, parent: NodeId, name: &[u8]) -> Option<NodeId> {
        let NodePayload::Directory { children, .. } = &self.arena[parent].payload else { return None };
        children.iter().copied().find(|&c| self.arena[c].name == name)
    }

    /// Walk `path`, creating missing intermediate directories (marked
    /// implicit, per spec §4.G). Fails with `Corrupted`/`Unsupported` on a
    /// genuine name collision; upgrades an implicit directory in place when
    /// the caller's own payload is also a directory.
    pub fn add_generic(
        &mut self,
        path: &str,
        meta: NodeMetadata,
        payload: NodePayload,
    ) -> Result<NodeId> {
        let components = Self::split_path(path);
        if components.is_empty() {
            return Err(SquashTarError::Unsupported("cannot add the root itself".into()));
        }

        let mut current = self.root();
        let mut payload = Some(payload);
        for (i, comp) in components.iter().enumerate() {
            let last = i == components.len() - 1;
            let name = comp.as_bytes().to_vec();

            if let Some(existing) = self.find_child(current, &name) {
                if !last {
                    if !self.arena[existing].payload.is_directory() {
                        return Err(SquashTarError::Corrupted(format!(
                            "path component is not a directory: {comp}"
                        )));
                    }
                    current = existing;
                    continue;
                }

                let existing_implicit_dir = matches!(
                    &self.arena[existing].payload,
                    NodePayload::Directory { implicit: true, .. }
                );
                let incoming = payload.take().expect("payload consumed once");
                if existing_implicit_dir && incoming.is_directory() {
                    let node = &mut self.arena[existing];
                    node.mode = meta.mode;
                    node.uid = meta.uid;
                    node.gid = meta.gid;
                    node.mtime = meta.mtime;
                    if let NodePayload::Directory { implicit, .. } = &mut node.payload {
                        *implicit = false;
                    }
                    return Ok(existing);
                }
                return Err(SquashTarError::Corrupted(format!("path already exists: {path}")));
            }

            let (node_payload, node_meta) = if last {
                (payload.take().expect("payload consumed once"), meta)
            } else {
                (
                    NodePayload::Directory { children: vec![], implicit: true },
                    NodeMetadata {
                        mode: 0o40000 | self.defaults.mode,
                        uid: self.defaults.uid,
                        gid: self.defaults.gid,
                        mtime: self.defaults.mtime,
                    },
                )
            };
            let id = self.arena.len();
            self.arena.push(Node::new(name, Some(current), node_meta, node_payload));
            if let NodePayload::Directory { children, .. } = &mut self.arena[current].payload {
                children.push(id);
            }
            current = id;
        }
        Ok(current)
    }

    /// Resolve each unresolved hard link, allocate inode numbers depth-first,
    /// reorder so every target precedes its links, and build the flat file
    /// list. Idempotent: calling this twice is a no-op the second time.
    pub fn post_process(&mut self) -> Result<()> {
        if self.processed {
            return Ok(());
        }
        self.resolve_hard_links()?;
        self.allocate_inodes();
        self.reorder_for_forward_links();
        self.build_file_list();
        self.processed = true;
        Ok(())
    }

    fn path_lookup(&self, path: &str) -> Option<NodeId> {
        let mut current = self.root();
        for comp in Self::split_path(path) {
            current = self.find_child(current, comp.as_bytes())?;
        }
        Some(current)
    }

    fn resolve_hard_links(&mut self) -> Result<()> {
        let unresolved: Vec<NodeId> = self
            .arena
            .iter()
            .enumerate()
            .filter_map(|(i, n)| matches!(n.payload, NodePayload::HardLink(HardLinkState::Unresolved(_))).then_some(i))
            .collect();

        for link_id in unresolved {
            let NodePayload::HardLink(HardLinkState::Unresolved(target_path)) = &self.arena[link_id].payload else {
                continue;
            };
            let target_path = target_path.clone();
            let mut target = self
                .path_lookup(&target_path)
                .ok_or_else(|| SquashTarError::NoEntry(format!("hard link target not found: {target_path}")))?;

            // Follow at most N = node count hops, in case the target is
            // itself an unresolved hard link; fail on a cycle.
            let max_hops = self.arena.len() + 1;
            let mut hops = 0;
            loop {
                match &self.arena[target].payload {
                    NodePayload::HardLink(HardLinkState::Resolved(t)) => {
                        target = *t;
                    }
                    NodePayload::HardLink(HardLinkState::Unresolved(p)) => {
                        let p = p.clone();
                        target = self
                            .path_lookup(&p)
                            .ok_or_else(|| SquashTarError::NoEntry(format!("hard link target not found: {p}")))?;
                    }
                    _ => break,
                }
                hops += 1;
                if hops > max_hops {
                    return Err(SquashTarError::Corrupted("hard link cycle".into()));
                }
            }

            if self.arena[target].payload.is_directory() {
                return Err(SquashTarError::Unsupported("hard link to a directory".into()));
            }

            self.arena[link_id].payload = NodePayload::HardLink(HardLinkState::Resolved(target));
            *self.link_counts.entry(target).or_insert(0) += 1;
        }
        Ok(())
    }

    fn allocate_inodes(&mut self) {
        self.inode_ptrs.clear();
        let mut order = vec![];
        fn visit(tree: &FsTree, id: NodeId, order: &mut Vec<NodeId>) {
            if let NodePayload::Directory { children, .. } = &tree.arena[id].payload {
                for &c in children {
                    visit(tree, c, order);
                }
            }
            if !matches!(tree.arena[id].payload, NodePayload::HardLink(_)) {
                order.push(id);
            }
        }
        visit(self, self.root(), &mut order);

        for (i, id) in order.iter().enumerate() {
            self.arena[*id].inode_number = (i + 1) as u32;
        }
        self.inode_ptrs = order;
    }

    /// Slide a hard-link target to immediately before its link whenever the
    /// target was allocated a *later* inode number, renumbering everything
    /// in between by +1. Guarantees `target.inode_number < link.inode_number`
    /// for every resolved link, which the export table needs.
    fn reorder_for_forward_links(&mut self) {
        loop {
            let mut moved = false;
            for link_id in 0..self.arena.len() {
                let NodePayload::HardLink(HardLinkState::Resolved(target)) = self.arena[link_id].payload else {
                    continue;
                };
                let link_num = self.arena[link_id].inode_number;
                let target_num = self.arena[target].inode_number;
                if target_num == 0 || link_num == 0 || target_num < link_num {
                    continue;
                }
                // target currently sits at or after the link; slide it to
                // link_num - 1 and bump everything in between down by one.
                let new_target_num = link_num - 1;
                for id in &self.inode_ptrs {
                    let n = self.arena[*id].inode_number;
                    if n >= new_target_num && n < target_num {
                        self.arena[*id].inode_number = n + 1;
                    }
                }
                self.arena[target].inode_number = new_target_num;
                moved = true;
            }
            if !moved {
                break;
            }
        }
        self.inode_ptrs.sort_by_key(|&id| self.arena[id].inode_number);
    }

    fn build_file_list(&mut self) {
        self.file_list.clear();
        fn visit(tree: &mut FsTree, id: NodeId) {
            let is_dir = tree.arena[id].payload.is_directory();
            if is_dir {
                let children = match &tree.arena[id].payload {
                    NodePayload::Directory { children, .. } => children.clone(),
                    _ => unreachable!(),
                };
                for c in children {
                    visit(tree, c);
                }
            } else if matches!(tree.arena[id].payload, NodePayload::File { .. }) {
                tree.file_list.push(id);
            }
        }
        visit(self, self.root());
    }

    /// Resolved link count for `id`, valid any time (directories don't need
    /// hard-link resolution to know their own count).
    pub fn link_count(&self, id: NodeId) -> u32 {
        match &self.arena[id].payload {
            NodePayload::Directory { children, .. } => {
                let subdirs = children.iter().filter(|&&c| self.arena[c].payload.is_directory()).count();
                2 + subdirs as u32
            }
            _ => 1 + self.link_counts.get(&id).copied().unwrap_or(0),
        }
    }

    /// Drain every entry `iter` yields (recursing into subdirectories via
    /// `open_subdir`) into the tree. Each entry's `name` is already the full
    /// path relative to the walk's root, per [`DirIterator`]'s contract, so
    /// no prefix bookkeeping is needed here.
    pub fn from_dir_iterator(&mut self, mut iter: Box<dyn DirIterator>) -> Result<()> {
        self.drain_iterator(iter.as_mut())
    }

    fn drain_iterator(&mut self, iter: &mut dyn DirIterator) -> Result<()> {
        while let Some(entry) = iter.next()? {
            let full_path = entry.name.clone();
            let meta = NodeMetadata {
                mode: mode_for(&entry),
                uid: entry.uid,
                gid: entry.gid,
                mtime: entry.mtime as i64,
            };
            match entry.kind {
                EntryType::Directory => {
                    self.add_generic(
                        &full_path,
                        meta,
                        NodePayload::Directory { children: vec![], implicit: false },
                    )?;
                    let mut sub = iter.open_subdir()?;
                    self.drain_iterator(sub.as_mut())?;
                }
                EntryType::Symlink => {
                    let target = iter.read_link()?;
                    self.add_generic(&full_path, meta, NodePayload::Symlink { target: target.into_bytes() })?;
                }
                EntryType::HardLink => {
                    let target = iter.read_link()?;
                    self.add_generic(
                        &full_path,
                        meta,
                        NodePayload::HardLink(HardLinkState::Unresolved(target)),
                    )?;
                }
                EntryType::CharDevice | EntryType::BlockDevice => {
                    let (major, minor) = ((entry.rdev >> 8) & 0xff, entry.rdev & 0xff);
                    self.add_generic(&full_path, meta, NodePayload::Device { major, minor })?;
                }
                EntryType::Fifo => {
                    self.add_generic(&full_path, meta, NodePayload::Fifo)?;
                }
                EntryType::Socket => {
                    self.add_generic(&full_path, meta, NodePayload::Socket)?;
                }
                EntryType::Regular => {
                    let reader = iter.open_file_ro()?;
                    let xattrs = iter.read_xattr().unwrap_or_default();
                    let id = self.add_generic(
                        &full_path,
                        meta,
                        NodePayload::File {
                            source: Some(FileSource::Reader(reader)),
                            inode: FileInode { file_size: entry.size, ..FileInode::default() },
                        },
                    )?;
                    self.arena[id].xattrs = xattrs;
                }
            }
        }
        Ok(())
    }
}

fn mode_for(entry: &DirEntryInfo) -> u32 {
    let type_bits: u32 = match entry.kind {
        EntryType::Directory => 0o40000,
        EntryType::Symlink => 0o120000,
        EntryType::CharDevice => 0o20000,
        EntryType::BlockDevice => 0o60000,
        EntryType::Fifo => 0o10000,
        EntryType::Socket => 0o140000,
        EntryType::Regular | EntryType::HardLink => 0o100000,
    };
    type_bits | (entry.mode & 0o7777)
}
