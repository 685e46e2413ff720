//! In-memory filesystem tree: the canonical representation directories,
//! files, symlinks, devices, fifos, sockets, and hard links are normalized
//! into before the block processor and SquashFS/tar writers ever see them.
//!
//! An arena ([`node::FsTree::arena`]) replaces the parent/child/hard-link
//! pointer graph a native tree would use — see [`node`] for why.

pub mod description;
pub mod node;
pub mod sortfile;

pub use node::{
    FileFlag, FileFlags, FileInode, FileSource, FsTree, FsTreeDefaults, HardLinkState, Node, NodeId, NodeMetadata,
    NodePayload,
};
