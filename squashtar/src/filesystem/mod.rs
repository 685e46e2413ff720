//! SquashFS image assembly and disassembly: [`writer`] drives the block
//! processor and table writers over a post-processed [`crate::fstree::FsTree`]
//! to produce an image; [`reader`] (this module's sibling) opens one back up.

pub mod reader;
pub mod writer;
