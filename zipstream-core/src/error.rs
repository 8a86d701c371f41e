use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Job-level failures. `InvalidPath` and `TooManyJobs` are returned before
/// any byte reaches the sink; every other variant means the output stream is
/// truncated and must not be served as a finished archive.
#[derive(Error, Debug)]
pub enum JobError {
    #[error("invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("too many concurrent archive jobs (limit {limit})")]
    TooManyJobs { limit: usize },

    /// Explicit cancellation, client disconnect, or a timed-out slot
    /// acquisition inside a running job.
    #[error("archive job cancelled")]
    Cancelled,

    /// An entry failed while the policy is abort-on-error.
    #[error("entry {path:?} failed: {failure}")]
    EntryAborted { path: String, failure: EntryFailure },

    #[error("output sink error: {0}")]
    Sink(#[source] std::io::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-entry failures. These are values carried in the job report, not
/// errors propagated across the pipeline, unless the failure policy
/// escalates them to `JobError::EntryAborted`.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryFailure {
    #[error("symlink cycle back to {0:?}")]
    SymlinkCycle(PathBuf),

    #[error("unreadable: {0}")]
    Unreadable(String),

    #[error("read failed mid-entry: {0}")]
    Read(String),

    #[error("encode failed: {0}")]
    Encode(String),
}

// Convenient crate-wide result type
pub type Result<T, E = JobError> = std::result::Result<T, E>;
