use crate::codec::Method;
use crate::config::{ArchiveConfig, FailurePolicy, SymlinkPolicy};
use crate::error::{EntryFailure, JobError};
use crate::gate::{self, CancelFlag, Permit, Semaphore};
use crate::report::JobReport;
use crate::resolve::ResolvedPath;
use crate::stream::encoder::{self, EntryMsg};
use crate::walk::{EntryKind, WalkedEntry, Walker};
use crate::zip::dostime::dos_datetime;
use crate::zip::record::{
    CentralEntry, DataDescriptor, FLAG_STREAMED, FLAG_UTF8, LocalHeader, ZIP64_LIMIT,
    unix_external_attrs, write_end_of_directory,
};
use crossbeam_channel::{Receiver, Sender, bounded};
use std::io::Write;
use std::sync::Mutex;
use std::time::Instant;
use tracing::warn;

/// Compressed chunks buffered per in-flight entry. Peak content memory is
/// workers × (this + 1) × chunk_size.
const CHUNKS_PER_ENTRY: usize = 2;

/// Small Write adapter that counts bytes written
struct CountingWriter<'a, W: Write> {
    inner: &'a mut W,
    n: u64,
}

impl<'a, W: Write> CountingWriter<'a, W> {
    fn new(inner: &'a mut W) -> Self {
        Self { inner, n: 0 }
    }
}

impl<W: Write> Write for CountingWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let k = self.inner.write(buf)?;
        self.n += k as u64;
        Ok(k)
    }
    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

/// One walk entry in emission order. Files carry the channel their encode
/// task fills; everything else is consumed directly.
enum Slot {
    Plain(WalkedEntry),
    File(WalkedEntry, Receiver<EntryMsg>),
}

struct EncodeTask {
    entry: WalkedEntry,
    tx: Sender<EntryMsg>,
    /// Worker slot, held until the task is finished or dropped.
    _permit: Permit,
}

/// Drive one job: single walker/dispatcher thread, bounded worker pool,
/// and the in-order consumer on the caller's thread. Entry order on the
/// wire always equals walk order; parallelism lives entirely between the
/// dispatch and the per-entry channels.
pub(crate) fn run<W: Write>(
    target: &ResolvedPath,
    cfg: &ArchiveConfig,
    cancel: &CancelFlag,
    started: Instant,
    sink: &mut W,
) -> Result<JobReport, JobError> {
    let workers = cfg.workers_per_job.max(1);
    let worker_sem = Semaphore::new(workers);

    let (slot_tx, slot_rx) = bounded::<Slot>(workers * 2);
    let (task_tx, task_rx) = bounded::<EncodeTask>(workers);

    // A dispatch failure (worker-slot deadline) surfaces here; the consumer
    // picks it up once the slot channel drains.
    let dispatch_err: Mutex<Option<JobError>> = Mutex::new(None);

    let result = std::thread::scope(|scope| {
        let worker_sem = &worker_sem;
        let dispatch_err = &dispatch_err;

        scope.spawn(move || {
            let walker = Walker::new(target, cfg);
            for entry in walker {
                if cancel.is_cancelled() {
                    return;
                }
                if entry.is_file() {
                    let permit =
                        match gate::acquire_worker(worker_sem, cfg.worker_acquire_timeout, cancel) {
                            Ok(p) => p,
                            Err(e) => {
                                *dispatch_err.lock().unwrap_or_else(|p| p.into_inner()) = Some(e);
                                cancel.cancel();
                                return;
                            }
                        };
                    let (tx, rx) = bounded::<EntryMsg>(CHUNKS_PER_ENTRY);
                    if slot_tx.send(Slot::File(entry.clone(), rx)).is_err() {
                        return;
                    }
                    if task_tx
                        .send(EncodeTask {
                            entry,
                            tx,
                            _permit: permit,
                        })
                        .is_err()
                    {
                        return;
                    }
                } else if slot_tx.send(Slot::Plain(entry)).is_err() {
                    return;
                }
            }
        });

        for _ in 0..workers {
            let task_rx = task_rx.clone();
            scope.spawn(move || {
                for task in task_rx.iter() {
                    if cancel.is_cancelled() {
                        // dropping the task releases its permit and closes
                        // its channel
                        continue;
                    }
                    encoder::encode_entry(&task.entry, cfg, cancel, &task.tx);
                }
            });
        }
        drop(task_rx);

        consume(slot_rx, cfg, cancel, started, sink)
    });

    if let Some(e) = dispatch_err.lock().unwrap_or_else(|p| p.into_inner()).take() {
        return Err(e);
    }
    if result.is_err() {
        cancel.cancel();
    }
    result
}

fn consume<W: Write>(
    slot_rx: Receiver<Slot>,
    cfg: &ArchiveConfig,
    cancel: &CancelFlag,
    started: Instant,
    sink: &mut W,
) -> Result<JobReport, JobError> {
    let mut out = CountingWriter::new(sink);
    let mut central: Vec<CentralEntry> = Vec::new();
    let mut report = JobReport::default();

    for slot in slot_rx.iter() {
        if cancel.is_cancelled() {
            return Err(JobError::Cancelled);
        }
        match slot {
            Slot::Plain(entry) => match entry.kind.clone() {
                EntryKind::Dir => write_dir(&mut out, &entry, cfg, &mut central)?,
                EntryKind::Unreadable { reason } => {
                    entry_failed(&entry.rel_path, EntryFailure::Unreadable(reason), cfg, &mut report)?
                }
                EntryKind::Cycle { ancestor } => {
                    let failure = EntryFailure::SymlinkCycle(ancestor);
                    if cfg.symlinks == SymlinkPolicy::ErrorOnCycle {
                        return Err(JobError::EntryAborted {
                            path: entry.rel_path,
                            failure,
                        });
                    }
                    entry_failed(&entry.rel_path, failure, cfg, &mut report)?
                }
                EntryKind::File { .. } => {
                    debug_assert!(false, "file entries arrive as Slot::File");
                }
            },
            Slot::File(entry, rx) => {
                stream_file(&mut out, &entry, rx, cfg, &mut central, &mut report)?
            }
        }
    }
    if cancel.is_cancelled() {
        return Err(JobError::Cancelled);
    }

    // closing index: central directory, then the end records
    let cd_off = out.n;
    for ce in &central {
        ce.write_to(&mut out).map_err(JobError::Sink)?;
    }
    let cd_size = out.n - cd_off;
    write_end_of_directory(&mut out, central.len() as u64, cd_off, cd_size)
        .map_err(JobError::Sink)?;
    out.flush().map_err(JobError::Sink)?;

    report.entries_written = central.len() as u64;
    report.bytes_written = out.n;
    report.elapsed = started.elapsed();
    Ok(report)
}

fn entry_failed(
    rel_path: &str,
    failure: EntryFailure,
    cfg: &ArchiveConfig,
    report: &mut JobReport,
) -> Result<(), JobError> {
    match cfg.on_entry_failure {
        FailurePolicy::SkipAndReport => {
            warn!(path = rel_path, %failure, "skipping entry");
            report.record_skip(rel_path, failure);
            Ok(())
        }
        FailurePolicy::AbortOnError => Err(JobError::EntryAborted {
            path: rel_path.to_string(),
            failure,
        }),
    }
}

fn timestamps(entry: &WalkedEntry, cfg: &ArchiveConfig) -> (u16, u16) {
    if cfg.deterministic {
        (0, 0)
    } else {
        dos_datetime(entry.mtime)
    }
}

fn write_dir<W: Write>(
    out: &mut CountingWriter<'_, W>,
    entry: &WalkedEntry,
    cfg: &ArchiveConfig,
    central: &mut Vec<CentralEntry>,
) -> Result<(), JobError> {
    let name = format!("{}/", entry.rel_path);
    let (dos_date, dos_time) = timestamps(entry, cfg);
    let local_off = out.n;

    LocalHeader {
        name: &name,
        method: Method::Store,
        flags: FLAG_UTF8,
        dos_time,
        dos_date,
        crc32: 0,
        c_size: 0,
        u_size: 0,
        zip64: false,
    }
    .write_to(&mut *out)
    .map_err(JobError::Sink)?;

    central.push(CentralEntry {
        name,
        method: Method::Store,
        flags: FLAG_UTF8,
        dos_time,
        dos_date,
        crc32: 0,
        c_size: 0,
        u_size: 0,
        local_off,
        external_attrs: unix_external_attrs(entry.mode, true),
        zip64_stream: false,
    });
    Ok(())
}

// Deflate can expand incompressible input slightly, so an entry goes Zip64
// a little before its size hint reaches the 32-bit sentinel.
fn needs_zip64(size_hint: u64) -> bool {
    size_hint + (size_hint >> 9) + (64 << 10) >= ZIP64_LIMIT
}

fn stream_file<W: Write>(
    out: &mut CountingWriter<'_, W>,
    entry: &WalkedEntry,
    rx: Receiver<EntryMsg>,
    cfg: &ArchiveConfig,
    central: &mut Vec<CentralEntry>,
    report: &mut JobReport,
) -> Result<(), JobError> {
    let size_hint = match entry.kind {
        EntryKind::File { size } => size,
        _ => 0,
    };
    let zip64 = needs_zip64(size_hint);
    let method = if cfg.is_store_name(&entry.rel_path) {
        Method::Store
    } else {
        Method::Deflate
    };
    let (dos_date, dos_time) = timestamps(entry, cfg);
    let local_off = out.n;

    LocalHeader {
        name: &entry.rel_path,
        method,
        flags: FLAG_STREAMED | FLAG_UTF8,
        dos_time,
        dos_date,
        crc32: 0,
        c_size: 0,
        u_size: 0,
        zip64,
    }
    .write_to(&mut *out)
    .map_err(JobError::Sink)?;

    let mut trailer = None;
    for msg in rx.iter() {
        match msg {
            EntryMsg::Chunk(chunk) => out.write_all(&chunk).map_err(JobError::Sink)?,
            EntryMsg::Done(t) => {
                trailer = Some(t);
                break;
            }
        }
    }
    // A closed channel without a trailer means the encode task bailed out:
    // cancellation or teardown, never a per-entry condition.
    let Some(trailer) = trailer else {
        return Err(JobError::Cancelled);
    };

    DataDescriptor {
        crc32: trailer.crc32,
        c_size: trailer.c_size,
        u_size: trailer.u_size,
        zip64,
    }
    .write_to(&mut *out)
    .map_err(JobError::Sink)?;

    report.bytes_read += trailer.u_size;

    match trailer.failure {
        None => {
            central.push(CentralEntry {
                name: entry.rel_path.clone(),
                method,
                flags: FLAG_STREAMED | FLAG_UTF8,
                dos_time,
                dos_date,
                crc32: trailer.crc32,
                c_size: trailer.c_size,
                u_size: trailer.u_size,
                local_off,
                external_attrs: unix_external_attrs(entry.mode, false),
                zip64_stream: zip64,
            });
            report.files_written += 1;
            Ok(())
        }
        // The entry's bytes stay in the stream but the index never names
        // it, so prior records remain valid.
        Some(failure) => entry_failed(&entry.rel_path, failure, cfg, report),
    }
}
