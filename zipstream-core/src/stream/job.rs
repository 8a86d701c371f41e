use crate::config::ArchiveConfig;
use crate::error::JobError;
use crate::gate::{CancelFlag, ConcurrencyGate, Permit};
use crate::report::JobReport;
use crate::resolve::{self, ResolvedPath};
use crate::stream::pipeline;
use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, info_span, warn};

/// Entry point for archive generation over one configured root. Owns the
/// job gate, so all admission control for a root goes through one value.
#[derive(Debug)]
pub struct Archiver {
    root: PathBuf,
    cfg: ArchiveConfig,
    gate: ConcurrencyGate,
}

impl Archiver {
    pub fn new(root: impl Into<PathBuf>, cfg: ArchiveConfig) -> Self {
        let gate = ConcurrencyGate::new(cfg.max_jobs.max(1));
        Self {
            root: root.into(),
            cfg,
            gate,
        }
    }

    pub fn config(&self) -> &ArchiveConfig {
        &self.cfg
    }

    pub fn jobs_in_use(&self) -> usize {
        self.gate.jobs_in_use()
    }

    /// Resolve `raw_path` and admit a job for it. Nothing is read or
    /// written yet; dropping the returned job releases its slot.
    pub fn begin(&self, raw_path: &str) -> Result<ArchiveJob, JobError> {
        let target = resolve::resolve(&self.root, raw_path)?;
        let permit = self.gate.acquire_job(self.cfg.acquire_timeout)?;
        Ok(ArchiveJob {
            target,
            cfg: self.cfg.clone(),
            cancel: CancelFlag::new(),
            created: Instant::now(),
            _permit: permit,
        })
    }

    /// `begin` + `write_to` in one call.
    pub fn archive_to<W: Write>(&self, raw_path: &str, sink: W) -> Result<JobReport, JobError> {
        self.begin(raw_path)?.write_to(sink)
    }
}

/// One admitted, not-yet-finished archive request. The admission permit
/// lives exactly as long as this value, so every exit path gives the slot
/// back.
#[derive(Debug)]
pub struct ArchiveJob {
    target: ResolvedPath,
    cfg: ArchiveConfig,
    cancel: CancelFlag,
    created: Instant,
    _permit: Permit,
}

impl ArchiveJob {
    pub fn target(&self) -> &ResolvedPath {
        &self.target
    }

    /// Handle for cancelling this job from another thread. Valid for the
    /// whole streaming run; cancelling after completion is a no-op.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(self.cancel.clone())
    }

    /// Stream the archive into `sink`. On `Ok` the sink holds a complete
    /// archive and the report lists any skipped entries; on `Err` the sink
    /// holds a truncated stream that must be discarded.
    pub fn write_to<W: Write>(self, mut sink: W) -> Result<JobReport, JobError> {
        let span = info_span!("archive_job", path = self.target.rel());
        let _guard = span.enter();

        let result = pipeline::run(&self.target, &self.cfg, &self.cancel, self.created, &mut sink);
        match &result {
            Ok(report) => info!(
                entries = report.entries_written,
                files = report.files_written,
                bytes_read = report.bytes_read,
                bytes_written = report.bytes_written,
                skipped = report.skipped.len(),
                elapsed_ms = report.elapsed.as_millis() as u64,
                "archive complete"
            ),
            Err(err) => warn!(%err, "archive aborted"),
        }
        result
    }
}

/// Cloneable cancellation handle tied to one job.
#[derive(Clone, Debug)]
pub struct CancelHandle(CancelFlag);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.is_cancelled()
    }
}
