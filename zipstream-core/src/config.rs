use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What happens when a symlink is met during the walk.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SymlinkPolicy {
    /// Follow symlinks; a detected cycle skips the offending subtree and is
    /// recorded in the job report.
    Follow,
    /// Do not follow symlinks (default). Symlinked files are not archived.
    #[default]
    Skip,
    /// Follow symlinks; a detected cycle aborts the whole job.
    ErrorOnCycle,
}

/// What happens when one entry fails to read or encode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Keep the stream valid, drop the bad entry, record it (default).
    #[default]
    SkipAndReport,
    /// Terminate the stream early; the consumer sees a truncated archive.
    AbortOnError,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Server-wide cap on concurrently running archive jobs.
    pub max_jobs: usize,
    /// Parallel read/encode workers within one job.
    pub workers_per_job: usize,
    /// Content is read and forwarded in buffers of this size.
    pub chunk_size: usize,
    /// Maximum walk depth below the archived directory. `None` is unbounded.
    pub max_depth: Option<usize>,
    /// Archive dotfiles and dot-directories.
    pub include_hidden: bool,
    pub symlinks: SymlinkPolicy,
    pub on_entry_failure: FailurePolicy,
    /// How long `begin` may wait for a job slot. Zero means fail fast.
    pub acquire_timeout: Duration,
    /// Deadline for a worker slot inside a running job. Exceeding it aborts
    /// the job instead of hanging the walk.
    pub worker_acquire_timeout: Duration,
    /// Extensions (lowercase, no dot) stored without compression.
    pub store_extensions: Vec<String>,
    /// Zero all timestamps so an unchanged tree archives byte-identically.
    pub deterministic: bool,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            max_jobs: 4,
            workers_per_job: 4,
            chunk_size: 64 * 1024,
            max_depth: None,
            include_hidden: false,
            symlinks: SymlinkPolicy::default(),
            on_entry_failure: FailurePolicy::default(),
            acquire_timeout: Duration::ZERO,
            worker_acquire_timeout: Duration::from_secs(30),
            store_extensions: default_store_extensions(),
            deterministic: false,
        }
    }
}

impl ArchiveConfig {
    /// True if `name`'s extension marks it as already compressed.
    pub fn is_store_name(&self, name: &str) -> bool {
        let ext = match name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => ext,
            _ => return false,
        };
        self.store_extensions
            .iter()
            .any(|s| s.eq_ignore_ascii_case(ext))
    }
}

fn default_store_extensions() -> Vec<String> {
    [
        "zip", "gz", "tgz", "bz2", "xz", "zst", "7z", "rar", "jpg", "jpeg", "png", "gif", "webp",
        "mp3", "mp4", "mkv", "webm", "ogg", "woff", "woff2",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
