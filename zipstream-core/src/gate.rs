use crate::error::JobError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// Blocked acquisitions re-check their cancel flag at this interval, so
/// cancellation propagates within one slice even without a dedicated wakeup.
const CANCEL_POLL: Duration = Duration::from_millis(25);

/// Cooperative cancellation flag shared by one job's walker, workers, and
/// any acquisition blocked on its behalf.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Fixed-capacity counting semaphore with RAII permits.
#[derive(Debug)]
pub struct Semaphore {
    cap: usize,
    avail: Mutex<usize>,
    cv: Condvar,
}

impl Semaphore {
    pub fn new(cap: usize) -> Arc<Self> {
        assert!(cap > 0, "semaphore capacity must be > 0");
        Arc::new(Self {
            cap,
            avail: Mutex::new(cap),
            cv: Condvar::new(),
        })
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Permits currently held. Snapshot only.
    pub fn in_use(&self) -> usize {
        self.cap - *self.lock_or_recover()
    }

    pub fn try_acquire(self: &Arc<Self>) -> Option<Permit> {
        let mut avail = self.lock_or_recover();
        if *avail == 0 {
            return None;
        }
        *avail -= 1;
        Some(Permit::new(self))
    }

    /// Block up to `timeout` for a permit. A zero timeout degenerates to
    /// `try_acquire`. Returns `None` when the deadline passes or `cancel`
    /// fires first.
    pub fn acquire_timeout(
        self: &Arc<Self>,
        timeout: Duration,
        cancel: Option<&CancelFlag>,
    ) -> Option<Permit> {
        let deadline = Instant::now() + timeout;
        let mut avail = self.lock_or_recover();
        while *avail == 0 {
            if cancel.is_some_and(CancelFlag::is_cancelled) {
                return None;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            let (guard, _) = self
                .cv
                .wait_timeout(avail, remaining.min(CANCEL_POLL))
                .unwrap_or_else(|p| p.into_inner());
            avail = guard;
        }
        *avail -= 1;
        Some(Permit::new(self))
    }

    fn release(&self) {
        let mut avail = self.lock_or_recover();
        *avail += 1;
        debug_assert!(*avail <= self.cap, "semaphore over-release");
        drop(avail);
        // notify_all: a single permit may unblock whichever waiter the OS
        // would otherwise strand.
        self.cv.notify_all();
    }

    // Permits must come back even if another holder panicked, so recover
    // from poisoning instead of propagating it out of Drop.
    fn lock_or_recover(&self) -> std::sync::MutexGuard<'_, usize> {
        self.avail.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// One capacity token. Releasing is idempotent: explicit `release` and the
/// eventual drop both return the slot exactly once.
#[derive(Debug)]
pub struct Permit {
    sem: Arc<Semaphore>,
    released: bool,
}

impl Permit {
    fn new(sem: &Arc<Semaphore>) -> Self {
        Self {
            sem: Arc::clone(sem),
            released: false,
        }
    }

    pub fn release(mut self) {
        self.release_once();
    }

    fn release_once(&mut self) {
        if !self.released {
            self.released = true;
            self.sem.release();
        }
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        self.release_once();
    }
}

/// Admission control for archive jobs. The job semaphore is the only state
/// shared across concurrent jobs; each job builds its own worker semaphore.
#[derive(Debug)]
pub struct ConcurrencyGate {
    jobs: Arc<Semaphore>,
}

impl ConcurrencyGate {
    pub fn new(max_jobs: usize) -> Self {
        Self {
            jobs: Semaphore::new(max_jobs),
        }
    }

    /// Admit one job, waiting up to `timeout` when saturated.
    pub fn acquire_job(&self, timeout: Duration) -> Result<Permit, JobError> {
        let permit = if timeout.is_zero() {
            self.jobs.try_acquire()
        } else {
            self.jobs.acquire_timeout(timeout, None)
        };
        permit.ok_or(JobError::TooManyJobs {
            limit: self.jobs.cap(),
        })
    }

    pub fn jobs_in_use(&self) -> usize {
        self.jobs.in_use()
    }
}

/// Acquire one worker slot for a running job. Blocks until a slot frees,
/// `timeout` passes, or the job is cancelled; the latter two surface as
/// `Cancelled` so the job aborts rather than hangs.
pub fn acquire_worker(
    workers: &Arc<Semaphore>,
    timeout: Duration,
    cancel: &CancelFlag,
) -> Result<Permit, JobError> {
    workers
        .acquire_timeout(timeout, Some(cancel))
        .ok_or(JobError::Cancelled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn try_acquire_respects_capacity() {
        let sem = Semaphore::new(2);
        let a = sem.try_acquire().unwrap();
        let _b = sem.try_acquire().unwrap();
        assert!(sem.try_acquire().is_none());
        assert_eq!(sem.in_use(), 2);

        drop(a);
        assert_eq!(sem.in_use(), 1);
        assert!(sem.try_acquire().is_some());
    }

    #[test]
    fn explicit_release_is_idempotent_with_drop() {
        let sem = Semaphore::new(1);
        let p = sem.try_acquire().unwrap();
        p.release();
        assert_eq!(sem.in_use(), 0);
        assert!(sem.try_acquire().is_some());
    }

    #[test]
    fn blocked_acquire_resumes_on_release() {
        let sem = Semaphore::new(1);
        let held = sem.try_acquire().unwrap();

        let sem2 = Arc::clone(&sem);
        let waiter = thread::spawn(move || {
            sem2.acquire_timeout(Duration::from_secs(5), None)
                .is_some()
        });

        thread::sleep(Duration::from_millis(50));
        drop(held);
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn acquire_times_out_when_saturated() {
        let sem = Semaphore::new(1);
        let _held = sem.try_acquire().unwrap();
        let got = sem.acquire_timeout(Duration::from_millis(50), None);
        assert!(got.is_none());
        assert_eq!(sem.in_use(), 1);
    }

    #[test]
    fn cancel_unblocks_waiting_acquire() {
        let sem = Semaphore::new(1);
        let _held = sem.try_acquire().unwrap();
        let cancel = CancelFlag::new();

        let sem2 = Arc::clone(&sem);
        let cancel2 = cancel.clone();
        let waiter = thread::spawn(move || {
            acquire_worker(&sem2, Duration::from_secs(30), &cancel2)
        });

        thread::sleep(Duration::from_millis(50));
        cancel.cancel();
        assert!(matches!(waiter.join().unwrap(), Err(JobError::Cancelled)));
    }

    #[test]
    fn gate_rejects_over_admission_and_recovers() {
        let gate = ConcurrencyGate::new(1);
        let first = gate.acquire_job(Duration::ZERO).unwrap();
        let err = gate.acquire_job(Duration::ZERO).unwrap_err();
        assert!(matches!(err, JobError::TooManyJobs { limit: 1 }));

        drop(first);
        assert_eq!(gate.jobs_in_use(), 0);
        gate.acquire_job(Duration::ZERO).unwrap();
    }

    #[test]
    fn permit_released_when_holder_panics() {
        let sem = Semaphore::new(1);
        let sem2 = Arc::clone(&sem);
        let _ = thread::spawn(move || {
            let _p = sem2.try_acquire().unwrap();
            panic!("holder dies");
        })
        .join();
        assert_eq!(sem.in_use(), 0);
    }
}
