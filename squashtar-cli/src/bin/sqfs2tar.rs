//! Emit a POSIX tar stream from the contents of a SquashFS image.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use squashtar::{DirEntryRef, EntryKind, FilesystemReader, Inode, InodeId, InodeInner, TarEntry, TarWriter};

#[derive(Parser)]
#[command(
    author,
    version,
    name = "sqfs2tar",
    max_term_width = 98,
    styles = squashtar_cli::styles(),
    after_help = squashtar_cli::after_help_common(),
)]
struct Args {
    /// Image to read.
    filesystem: PathBuf,

    /// Write the tar stream here instead of stdout.
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// Byte offset of the image inside `filesystem`.
    #[arg(long, default_value = "0")]
    offset: u64,
}

fn entry_kind(id: InodeId) -> Option<EntryKind> {
    Some(match id.into_base_type() {
        InodeId::BasicDirectory => EntryKind::Directory,
        InodeId::BasicFile => EntryKind::Regular,
        InodeId::BasicSymlink => EntryKind::Symlink,
        InodeId::BasicBlockDevice => EntryKind::BlockDevice,
        InodeId::BasicCharacterDevice => EntryKind::CharDevice,
        InodeId::BasicFifo => EntryKind::Fifo,
        // POSIX tar has no socket typeflag; sockets are dropped, same as the
        // original mksquashfs/unsquashfs pair does at the tar boundary.
        InodeId::BasicSocket => return None,
        _ => unreachable!("into_base_type only returns basic variants"),
    })
}

fn device_numbers(inode: &Inode) -> (u32, u32) {
    match &inode.inner {
        InodeInner::BasicBlockDevice(d) | InodeInner::BasicCharacterDevice(d) => (d.major(), d.minor()),
        InodeInner::ExtendedBlockDevice(d) | InodeInner::ExtendedCharDevice(d) => (d.major(), d.minor()),
        _ => (0, 0),
    }
}

fn symlink_target(inode: &Inode) -> String {
    match &inode.inner {
        InodeInner::BasicSymlink(s) => s.target(),
        InodeInner::ExtendedSymlink(s) => s.target(),
        _ => String::new(),
    }
}

fn walk<W: Write>(
    image: &FilesystemReader,
    dir_inode: &Inode,
    rel: &Path,
    seen: &mut HashMap<u64, String>,
    writer: &mut TarWriter<W>,
) -> squashtar::Result<()> {
    let mut dir = image.open_dir(dir_inode)?;
    while let Some(entry) = dir.read_dir_entry() {
        let DirEntryRef { name, inode_ref, inode_type } = entry;
        let child_rel = rel.join(&name);
        let path = child_rel.to_string_lossy().into_owned();
        let inode = image.get_inode(inode_ref)?;

        let Some(kind) = entry_kind(inode_type) else { continue };

        if inode_type != InodeId::BasicDirectory {
            if let Some(first) = seen.get(&inode_ref) {
                let mut tar_entry = TarEntry {
                    name: path,
                    kind: EntryKind::HardLink,
                    mode: u32::from(inode.header.permissions),
                    uid: 0,
                    gid: 0,
                    mtime: u64::from(inode.header.mtime),
                    link_name: first.clone(),
                    ..Default::default()
                };
                writer.write_entry(&tar_entry, &[])?;
                continue;
            }
            seen.insert(inode_ref, path.clone());
        }

        let xattrs = image.list_xattrs(&inode).unwrap_or_default();
        let mut tar_entry = TarEntry {
            name: path.clone(),
            kind,
            mode: u32::from(inode.header.permissions),
            uid: 0,
            gid: 0,
            mtime: u64::from(inode.header.mtime),
            xattrs,
            ..Default::default()
        };

        match kind {
            EntryKind::Symlink => {
                tar_entry.link_name = symlink_target(&inode);
                writer.write_entry(&tar_entry, &[])?;
            }
            EntryKind::CharDevice | EntryKind::BlockDevice => {
                let (major, minor) = device_numbers(&inode);
                tar_entry.rdev_major = major;
                tar_entry.rdev_minor = minor;
                writer.write_entry(&tar_entry, &[])?;
            }
            EntryKind::Fifo => {
                writer.write_entry(&tar_entry, &[])?;
            }
            EntryKind::Regular => {
                let mut data = vec![];
                image.file_reader(&inode)?.read_to_end(&mut data)?;
                tar_entry.size = data.len() as u64;
                writer.write_entry(&tar_entry, &data)?;
            }
            EntryKind::Directory => {
                writer.write_entry(&tar_entry, &[])?;
                walk(image, &inode, &child_rel, seen, writer)?;
            }
            EntryKind::HardLink => unreachable!("hard links are detected above, not tagged by entry_kind"),
        }
    }
    Ok(())
}

fn run(args: Args) -> squashtar::Result<()> {
    let file = BufReader::new(File::open(&args.filesystem)?);
    let image = FilesystemReader::from_reader_with_offset(file, args.offset)?;
    let root = image.get_root_inode()?;

    let mut seen = HashMap::new();
    match args.output {
        Some(path) => {
            let mut writer = TarWriter::new(File::create(path)?);
            walk(&image, &root, Path::new(""), &mut seen, &mut writer)?;
            writer.finish()?;
        }
        None => {
            let mut writer = TarWriter::new(io::stdout().lock());
            walk(&image, &root, Path::new(""), &mut seen, &mut writer)?;
            writer.finish()?;
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} sqfs2tar: {e}", squashtar_cli::RED_BOLD.apply_to("error:"));
            ExitCode::FAILURE
        }
    }
}
