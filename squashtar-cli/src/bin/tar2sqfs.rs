//! Build a SquashFS image from a POSIX tar stream.

use std::fs::File;
use std::io::{self, BufReader, BufWriter};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use squashtar::dirent::{DirIterator, HardLinkFilter, TarDirIterator};
use squashtar::fstree::{FsTree, FsTreeDefaults};
use squashtar::kind::Kind;
use squashtar_cli::parse::{parse_block_size, parse_compressor};

#[derive(Parser)]
#[command(
    author,
    version,
    name = "tar2sqfs",
    max_term_width = 98,
    styles = squashtar_cli::styles(),
    after_help = squashtar_cli::after_help_compressors(),
)]
struct Args {
    /// Image to create.
    dest: PathBuf,

    /// Read the tar stream from here instead of stdin.
    #[arg(short = 'i', long)]
    input: Option<PathBuf>,

    #[arg(long, value_parser = parse_compressor, default_value = "xz")]
    comp: squashtar::compression::Compressor,

    #[arg(long, value_parser = parse_block_size, default_value = "131072")]
    block_size: u32,

    /// Collapse every id-table entry to root (uid=gid=0).
    #[arg(long)]
    only_root_id: bool,

    /// Omit the export table.
    #[arg(long)]
    no_exports: bool,

    #[arg(long, short = 'q')]
    quiet: bool,
}

fn run(args: Args) -> squashtar::Result<()> {
    let mut tree = FsTree::new(FsTreeDefaults::default());

    match args.input {
        Some(path) => {
            let reader = TarDirIterator::new(BufReader::new(File::open(path)?));
            let iter: Box<dyn DirIterator> = Box::new(HardLinkFilter::new(reader));
            tree.from_dir_iterator(iter)?;
        }
        None => {
            let reader = TarDirIterator::new(io::stdin().lock());
            let iter: Box<dyn DirIterator> = Box::new(HardLinkFilter::new(reader));
            tree.from_dir_iterator(iter)?;
        }
    }
    tree.post_process()?;

    let mut writer = squashtar::FilesystemWriter::new(
        Kind::from_target("le_v4_0").map_err(squashtar::SquashTarError::Unsupported)?,
    );
    writer.block_size = args.block_size;
    writer.only_root_id = args.only_root_id;
    writer.exportable = !args.no_exports;
    writer.compressor = squashtar::FilesystemCompressor::new(args.comp, None)?;

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
            eprintln!("{} tar2sqfs: {e}", squashtar_cli::RED_BOLD.apply_to("error:"));
            ExitCode::FAILURE
        }
    }
}
