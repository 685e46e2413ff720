//! Build a SquashFS image from a host directory, a pack-file description, or both.

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use squashtar::dirent::{DirIterator, HardLinkFilter, TreeIterator, TreeWalkOptions};
use squashtar::fstree::{FsTree, FsTreeDefaults};
use squashtar::kind::Kind;
use squashtar::{FilesystemCompressor, FilesystemWriter};
use squashtar_cli::parse::{parse_block_size, parse_compressor, parse_gid, parse_octal, parse_uid};

#[derive(Parser)]
#[command(
    author,
    version,
    name = "mksquashtar",
    max_term_width = 98,
    styles = squashtar_cli::styles(),
    after_help = squashtar_cli::after_help_compressors(),
)]
struct Args {
    /// Directory to pack into the image. May be omitted if `--pseudo-file` supplies
    /// every entry.
    source: Option<PathBuf>,

    /// Path of the image to create.
    dest: PathBuf,

    /// Pack-file description: one record per filesystem entry, layered on top of
    /// (or instead of) `source`.
    #[arg(long = "pseudo-file", short = 'p')]
    pseudo_file: Option<PathBuf>,

    /// Sort-file: per-entry packing priority and flags, applied after the tree is
    /// built.
    #[arg(long = "sort")]
    sort_file: Option<PathBuf>,

    #[arg(long, value_parser = parse_compressor, default_value = "xz")]
    comp: squashtar::compression::Compressor,

    #[arg(long, value_parser = parse_block_size, default_value = "131072")]
    block_size: u32,

    /// Prefix every entry's path with this string inside the image.
    #[arg(long, default_value = "")]
    prefix: String,

    /// Don't cross mount points while scanning `source`.
    #[arg(long)]
    one_file_system: bool,

    /// Force every file/directory's owning uid, overriding the host filesystem.
    #[arg(long = "force-uid", value_parser = parse_uid)]
    force_uid: Option<u32>,

    /// Force every file/directory's owning gid, overriding the host filesystem.
    #[arg(long = "force-gid", value_parser = parse_gid)]
    force_gid: Option<u32>,

    /// Directory permission bits used for implicitly-created parent directories.
    #[arg(long = "default-mode", value_parser = parse_octal, default_value = "0755")]
    default_mode: u32,

    /// Collapse every id-table entry to root (uid=gid=0).
    #[arg(long)]
    only_root_id: bool,

    /// Omit the export table.
    #[arg(long)]
    no_exports: bool,

    /// Don't carry extended attributes into the image.
    #[arg(long)]
    no_xattrs: bool,

    /// Parallel block-compressor worker count (0 = number of CPUs).
    #[arg(long, default_value = "0")]
    workers: usize,

    #[arg(long, short = 'q')]
    quiet: bool,
}

fn run(args: Args) -> squashtar::Result<()> {
    let defaults = FsTreeDefaults {
        mode: args.default_mode,
        uid: args.force_uid.unwrap_or(0),
        gid: args.force_gid.unwrap_or(0),
        mtime: 0,
    };
    let mut tree = FsTree::new(defaults);

    if let Some(source) = &args.source {
        let opts = TreeWalkOptions { one_file_system: args.one_file_system, prefix: args.prefix.clone(), ..Default::default() };
        let walker = TreeIterator::new(source.as_path(), opts)?;
        let filtered: Box<dyn DirIterator> = Box::new(HardLinkFilter::new(walker));
        tree.from_dir_iterator(filtered)?;
    }

    if let Some(pseudo) = &args.pseudo_file {
        let file = std::io::BufReader::new(File::open(pseudo)?);
        tree.from_description(file)?;
    }

    tree.post_process()?;

    if let Some(sort_file) = &args.sort_file {
        let file = std::io::BufReader::new(File::open(sort_file)?);
        tree.apply_sort_file(file)?;
    }

    let mut writer = FilesystemWriter::new(
        Kind::from_target("le_v4_0").map_err(squashtar::SquashTarError::Unsupported)?,
    );
    writer.block_size = args.block_size;
    writer.only_root_id = args.only_root_id;
    writer.exportable = !args.no_exports;
    writer.no_xattrs = args.no_xattrs;
    writer.worker_count = args.workers;
    writer.compressor = FilesystemCompressor::new(args.comp, None)?;

    let mut out = BufWriter::new(File::create(&args.dest)?);
    writer.write(&mut tree, &mut out)?;

    if !args.quiet {
        tracing::info!(dest = %args.dest.display(), "wrote image");
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
            eprintln!("{} mksquashtar: {e}", squashtar_cli::RED_BOLD.apply_to("error:"));
            ExitCode::FAILURE
        }
    }
}
