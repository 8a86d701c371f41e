use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about = "zipstreamdev CLI", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum SymlinkArg {
    Follow,
    Skip,
    ErrorOnCycle,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Stream a directory as a ZIP archive to a file or stdout
    Pack {
        /// configured root the request path is resolved against
        root: PathBuf,
        /// root-relative path to archive (e.g. "/docs")
        #[arg(default_value = "/")]
        path: String,
        /// output file; "-" streams to stdout
        #[arg(long, default_value = "-")]
        out: PathBuf,

        #[arg(long, default_value_t = 4)]
        workers: usize,

        /// content read/forward buffer size in bytes
        #[arg(long, default_value_t = 64 * 1024)]
        chunk_size: usize,

        #[arg(long, value_enum, default_value_t = SymlinkArg::Skip)]
        symlinks: SymlinkArg,

        /// archive dotfiles and dot-directories
        #[arg(long)]
        hidden: bool,

        /// abort the stream on the first bad entry instead of skipping it
        #[arg(long)]
        abort_on_error: bool,

        #[arg(long)]
        max_depth: Option<usize>,

        /// zero timestamps for byte-identical output across runs
        #[arg(long)]
        deterministic: bool,
    },

    /// Print the walk in archive order (what `pack` would emit)
    Ls {
        root: PathBuf,
        #[arg(default_value = "/")]
        path: String,

        #[arg(long, value_enum, default_value_t = SymlinkArg::Skip)]
        symlinks: SymlinkArg,

        #[arg(long)]
        hidden: bool,

        #[arg(long)]
        max_depth: Option<usize>,

        /// show long format with size/mtime
        #[arg(long)]
        long: bool,
    },
}
