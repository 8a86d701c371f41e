use crate::error::EntryFailure;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One entry the job left out of the archive, and why.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedEntry {
    pub rel_path: String,
    pub failure: EntryFailure,
}

/// Completion summary for one archive job. Entry-level failures end up
/// here, next to a still-valid archive, instead of failing the job.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct JobReport {
    /// Entries named by the central directory (files + directories).
    pub entries_written: u64,
    pub files_written: u64,
    /// Uncompressed content bytes read.
    pub bytes_read: u64,
    /// Total archive bytes emitted, records included.
    pub bytes_written: u64,
    pub skipped: Vec<SkippedEntry>,
    pub elapsed: Duration,
}

impl JobReport {
    pub fn record_skip(&mut self, rel_path: impl Into<String>, failure: EntryFailure) {
        self.skipped.push(SkippedEntry {
            rel_path: rel_path.into(),
            failure,
        });
    }
}
