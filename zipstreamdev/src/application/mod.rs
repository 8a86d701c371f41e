pub mod handlers;

use crate::presentation::cli::{Cli, Commands};
use clap::Parser;
use handlers::WalkArgs;
use zipstream_core::error::Result;

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Pack {
            root,
            path,
            out,
            workers,
            chunk_size,
            symlinks,
            hidden,
            abort_on_error,
            max_depth,
            deterministic,
        } => handlers::handle_pack(
            root,
            path,
            out,
            workers,
            chunk_size,
            WalkArgs {
                symlinks,
                hidden,
                max_depth,
            },
            abort_on_error,
            deterministic,
        ),
        Commands::Ls {
            root,
            path,
            symlinks,
            hidden,
            max_depth,
            long,
        } => handlers::handle_ls(
            root,
            path,
            WalkArgs {
                symlinks,
                hidden,
                max_depth,
            },
            long,
        ),
    }
}
