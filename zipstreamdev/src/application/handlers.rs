use std::io::Write;
use std::path::PathBuf;

use zipstream_core::error::Result;
use zipstream_core::walk::{EntryKind, Walker};
use zipstream_core::{resolve, Archiver, ArchiveConfig, FailurePolicy, SymlinkPolicy};

use crate::presentation::cli::SymlinkArg;

impl From<SymlinkArg> for SymlinkPolicy {
    fn from(arg: SymlinkArg) -> Self {
        match arg {
            SymlinkArg::Follow => SymlinkPolicy::Follow,
            SymlinkArg::Skip => SymlinkPolicy::Skip,
            SymlinkArg::ErrorOnCycle => SymlinkPolicy::ErrorOnCycle,
        }
    }
}

pub struct WalkArgs {
    pub symlinks: SymlinkArg,
    pub hidden: bool,
    pub max_depth: Option<usize>,
}

fn config_from(walk: &WalkArgs) -> ArchiveConfig {
    ArchiveConfig {
        symlinks: walk.symlinks.into(),
        include_hidden: walk.hidden,
        max_depth: walk.max_depth,
        ..Default::default()
    }
}

#[allow(clippy::too_many_arguments)]
pub fn handle_pack(
    root: PathBuf,
    path: String,
    out: PathBuf,
    workers: usize,
    chunk_size: usize,
    walk: WalkArgs,
    abort_on_error: bool,
    deterministic: bool,
) -> Result<()> {
    let cfg = ArchiveConfig {
        workers_per_job: workers.max(1),
        chunk_size: chunk_size.max(1),
        on_entry_failure: if abort_on_error {
            FailurePolicy::AbortOnError
        } else {
            FailurePolicy::SkipAndReport
        },
        deterministic,
        ..config_from(&walk)
    };

    let archiver = Archiver::new(root, cfg);
    let job = archiver.begin(&path)?;

    let report = if out.as_os_str() == "-" {
        let stdout = std::io::stdout().lock();
        job.write_to(stdout)?
    } else {
        let file = std::fs::File::create(&out)?;
        job.write_to(file)?
    };

    for skip in &report.skipped {
        eprintln!("skip: {}: {}", skip.rel_path, skip.failure);
    }
    eprintln!(
        "pack: {} entries ({} files), {} -> {} bytes, {} skipped in {:?}",
        report.entries_written,
        report.files_written,
        report.bytes_read,
        report.bytes_written,
        report.skipped.len(),
        report.elapsed,
    );
    Ok(())
}

pub fn handle_ls(root: PathBuf, path: String, walk: WalkArgs, long: bool) -> Result<()> {
    let cfg = config_from(&walk);
    let target = resolve::resolve(&root, &path)?;

    let mut out = std::io::stdout().lock();
    print_walk(&mut out, &target, &cfg, long)
}

fn print_walk<W: Write>(
    out: &mut W,
    target: &zipstream_core::resolve::ResolvedPath,
    cfg: &ArchiveConfig,
    long: bool,
) -> Result<()> {
    for entry in Walker::new(target, cfg) {
        match &entry.kind {
            EntryKind::Dir => writeln!(out, "{}/", entry.rel_path)?,
            EntryKind::File { size } => {
                if long {
                    writeln!(out, "{:>12}  {:>10}  {}", size, entry.mtime, entry.rel_path)?;
                } else {
                    writeln!(out, "{}", entry.rel_path)?;
                }
            }
            EntryKind::Unreadable { reason } => {
                eprintln!("unreadable: {}: {}", entry.rel_path, reason)
            }
            EntryKind::Cycle { ancestor } => {
                eprintln!("cycle: {} -> {}", entry.rel_path, ancestor.display())
            }
        }
    }
    Ok(())
}
