//! Library and binaries for reading, creating, and converting between
//! [SquashFS](https://en.wikipedia.org/wiki/SquashFS) filesystem images and
//! POSIX tar archives.
//!
//! ## Library
//! Add the following to your `Cargo.toml` file:
//! ```toml
//! [dependencies]
//! squashtar = "0.1.0"
//! ```
//!
//! ### Reading
//! For opening an existing image and extracting its contents, build a
//! [`FilesystemReader`] over any [`BufReadSeek`] source with
//! [`FilesystemReader::from_reader`], then walk it from
//! [`FilesystemReader::get_root_inode`] via [`FilesystemReader::open_dir`].
//!
//! ### Writing
//! For assembling a new image from scratch, build an in-memory
//! [`fstree::FsTree`], then drive a [`FilesystemWriter`] over it.
//!
//! ### Example
//! ```rust,no_run
//! # use std::fs::File;
//! # use std::io::BufReader;
//! # use squashtar::FilesystemReader;
//! // read an existing image
//! let file = BufReader::new(File::open("image.squashfs").unwrap());
//! let read_filesystem = FilesystemReader::from_reader(file).unwrap();
//! let root = read_filesystem.get_root_inode().unwrap();
//! let mut dir = read_filesystem.open_dir(&root).unwrap();
//! while let Some(entry) = dir.read_dir_entry() {
//!     println!("{:?}", entry.name);
//! }
//! ```
//!
//! # Features
#![cfg_attr(feature = "document-features", doc = document_features::document_features!())]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Allow docs.rs to run with --all-features, everything else is compile_error
#[cfg(all(not(docsrs), feature = "gzip", feature = "gzip-zune-inflate"))]
compile_error!("gzip and gzip-zune-inflate are mutually exclusive and cannot be enabled together");

mod compressor;
mod data;
mod dir;
pub mod dirent;
mod error;
mod export;
mod filesystem;
mod fragment;
pub mod fstree;
mod id;
mod inode;
mod kinds;
mod metadata;
mod os_traits;
mod reader;
mod squashfs;
mod stream;
mod table;
mod tar;
mod threadpool;
mod util;
mod xattr;

pub use crate::error::{Result, SquashTarError};
pub use crate::export::Export;
pub use crate::filesystem::reader::{DirEntryRef, DirReader, FileReader, FilesystemReader};
pub use crate::filesystem::writer::{CompressionExtra, ExtraXz, FilesystemCompressor, FilesystemWriter};
pub use crate::fragment::Fragment;
pub use crate::id::Id;
pub use crate::inode::{BasicFile, Inode, InodeId, InodeInner};
pub use crate::reader::BufReadSeek;
pub use crate::squashfs::{
    Flags, SuperBlock, DEFAULT_BLOCK_SIZE, DEFAULT_PAD_LEN, MAX_BLOCK_SIZE, MIN_BLOCK_SIZE,
};
pub use crate::tar::{EntryKind, SparseMap, TarEntry, TarReader, TarWriter};

/// Support for the SquashFS vendor-variant wire formats in the wild.
pub mod kind {
    pub use crate::kinds::{Endian, Kind, Magic, AVM_BE_V4_0, BE_V4_0, LE_V4_0};
}

/// Compression choice and options.
pub mod compression {
    pub use crate::compressor::{CompressionAction, CompressionOptions, Compressor, DefaultCompressor, Gzip, Lz4, Lzo, Xz, Zstd};
}
