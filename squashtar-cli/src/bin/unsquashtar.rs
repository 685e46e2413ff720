//! List or extract the contents of a SquashFS image to the host filesystem.

use std::fs::{self, File};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
#[cfg(unix)]
use nix::sys::stat::{dev_t, mknod, mode_t, umask, Mode, SFlag};
use squashtar::{DirEntryRef, FilesystemReader, Inode, InodeId, InodeInner};

#[derive(Parser)]
#[command(
    author,
    version,
    name = "unsquashtar",
    max_term_width = 98,
    styles = squashtar_cli::styles(),
    after_help = squashtar_cli::after_help_common(),
)]
struct Args {
    /// Image to read.
    filesystem: PathBuf,

    /// Only print the listing, don't extract anything.
    #[arg(short = 'l', long)]
    list: bool,

    /// Directory to extract into.
    #[arg(short = 'd', long, default_value = "squashtar-root")]
    dest: PathBuf,

    /// Byte offset of the image inside `filesystem`.
    #[arg(long, default_value = "0")]
    offset: u64,

    #[arg(long, short = 'q')]
    quiet: bool,
}

fn inode_kind(inode: &Inode) -> &'static str {
    match inode.id.into_base_type() {
        InodeId::BasicDirectory => "directory",
        InodeId::BasicFile => "file",
        InodeId::BasicSymlink => "symlink",
        InodeId::BasicBlockDevice => "block device",
        InodeId::BasicCharacterDevice => "char device",
        InodeId::BasicFifo => "fifo",
        InodeId::BasicSocket => "socket",
        _ => unreachable!("into_base_type only returns basic variants"),
    }
}

fn walk(
    image: &FilesystemReader,
    dir_inode: &Inode,
    rel: &Path,
    dest: Option<&Path>,
    list: bool,
) -> squashtar::Result<()> {
    let mut dir = image.open_dir(dir_inode)?;
    while let Some(entry) = dir.read_dir_entry() {
        let DirEntryRef { name, inode_ref, inode_type } = entry;
        let child_rel = rel.join(&name);
        let inode = image.get_inode(inode_ref)?;

        if list {
            println!("{} {}", inode_kind(&inode), child_rel.display());
        }

        match inode_type {
            InodeId::BasicDirectory => {
                if let Some(dest) = dest {
                    let path = dest.join(&child_rel);
                    fs::create_dir_all(&path)?;
                    set_permissions(&path, &inode);
                }
                walk(image, &inode, &child_rel, dest, list)?;
            }
            InodeId::BasicFile => {
                if let Some(dest) = dest {
                    extract_file(image, &inode, &dest.join(&child_rel))?;
                }
            }
            InodeId::BasicSymlink => {
                if let Some(dest) = dest {
                    extract_symlink(&inode, &dest.join(&child_rel))?;
                }
            }
            InodeId::BasicBlockDevice | InodeId::BasicCharacterDevice => {
                if let Some(dest) = dest {
                    extract_device(&inode, &dest.join(&child_rel));
                }
            }
            InodeId::BasicFifo | InodeId::BasicSocket => {
                if let Some(dest) = dest {
                    extract_ipc(&inode, &dest.join(&child_rel));
                }
            }
            _ => unreachable!("directory entries only carry basic type tags"),
        }
    }
    Ok(())
}

fn extract_file(image: &FilesystemReader, inode: &Inode, path: &Path) -> squashtar::Result<()> {
    let mut reader = image.file_reader(inode)?;
    let mut out = File::create(path)?;
    std::io::copy(&mut reader, &mut out)?;
    set_permissions(path, inode);
    Ok(())
}

fn extract_symlink(inode: &Inode, path: &Path) -> squashtar::Result<()> {
    let target = match &inode.inner {
        InodeInner::BasicSymlink(s) => s.target(),
        InodeInner::ExtendedSymlink(s) => s.target(),
        _ => unreachable!("symlink entries carry a symlink inode"),
    };
    #[cfg(unix)]
    std::os::unix::fs::symlink(target, path)?;
    #[cfg(not(unix))]
    let _ = target;
    Ok(())
}

#[cfg(unix)]
fn extract_device(inode: &Inode, path: &Path) {
    let (device_number, is_char) = match &inode.inner {
        InodeInner::BasicBlockDevice(d) => (d.device_number, false),
        InodeInner::ExtendedBlockDevice(d) => (d.device_number, false),
        InodeInner::BasicCharacterDevice(d) => (d.device_number, true),
        InodeInner::ExtendedCharDevice(d) => (d.device_number, true),
        _ => unreachable!("device entries carry a device inode"),
    };
    let kind = if is_char { SFlag::S_IFCHR } else { SFlag::S_IFBLK };
    let mode = Mode::from_bits(mode_t::from(inode.header.permissions)).unwrap_or(Mode::empty());
    let Ok(dev) = dev_t::try_from(device_number) else { return };
    if let Err(e) = mknod(path, kind, mode, dev) {
        tracing::warn!(path = %path.display(), error = %e, "could not create device node (requires privileges)");
    }
}

#[cfg(not(unix))]
fn extract_device(_inode: &Inode, _path: &Path) {}

#[cfg(unix)]
fn extract_ipc(inode: &Inode, path: &Path) {
    let is_fifo = matches!(inode.inner, InodeInner::BasicFifo(_) | InodeInner::ExtendedFifo(_));
    let kind = if is_fifo { SFlag::S_IFIFO } else { SFlag::S_IFSOCK };
    let mode = Mode::from_bits(mode_t::from(inode.header.permissions)).unwrap_or(Mode::empty());
    if let Err(e) = mknod(path, kind, mode, 0) {
        tracing::warn!(path = %path.display(), error = %e, "could not create fifo/socket node");
    }
}

#[cfg(not(unix))]
fn extract_ipc(_inode: &Inode, _path: &Path) {}

#[cfg(unix)]
fn set_permissions(path: &Path, inode: &Inode) {
    use std::os::unix::fs::PermissionsExt;
    let _ = fs::set_permissions(path, fs::Permissions::from_mode(u32::from(inode.header.permissions)));
}

#[cfg(not(unix))]
fn set_permissions(_path: &Path, _inode: &Inode) {}

fn run(args: Args) -> squashtar::Result<()> {
    #[cfg(unix)]
    umask(Mode::from_bits(0).unwrap());

    let file = BufReader::new(File::open(&args.filesystem)?);
    let reader = FilesystemReader::from_reader_with_offset(file, args.offset)?;
    let root = reader.get_root_inode()?;

    let dest = if args.list { None } else { Some(args.dest.as_path()) };
    if let Some(dest) = dest {
        fs::create_dir_all(dest)?;
    }
    walk(&reader, &root, Path::new(""), dest, args.list)?;

    if !args.quiet && !args.list {
        let mut stdout = std::io::stdout();
        let _ = writeln!(stdout, "extracted to {}", args.dest.display());
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
            eprintln!("{} unsquashtar: {e}", squashtar_cli::RED_BOLD.apply_to("error:"));
            ExitCode::FAILURE
        }
    }
}
