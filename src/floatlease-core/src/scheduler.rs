//! Single-slot renewal timer.
//!
//! One background thread services one timer slot. Arming replaces any
//! pending slot; cancelling clears it. The fire handler takes the armed
//! job under the same slot lock that `cancel` clears it under, so once
//! `cancel` returns no further fire can happen. A job already taken is
//! "in flight" and its effect is discarded by the lease manager's epoch
//! check instead.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use tracing::{debug, trace};

/// Work executed when the timer fires.
pub type TimerJob = Box<dyn FnOnce() + Send + 'static>;

#[derive(Default)]
struct Slot {
    deadline: Option<Instant>,
    job: Option<TimerJob>,
    shutdown: bool,
}

struct Shared {
    slot: Mutex<Slot>,
    signal: Condvar,
}

/// Single-slot timer that drives lease renewal on a background thread.
///
/// The worker thread is spawned lazily on first arm and joined when the
/// scheduler is dropped.
pub struct RenewalScheduler {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl RenewalScheduler {
    /// New scheduler with no armed slot and no thread.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                slot: Mutex::new(Slot::default()),
                signal: Condvar::new(),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Arm the timer, replacing any pending slot.
    pub fn arm(&self, deadline: Instant, job: impl FnOnce() + Send + 'static) {
        self.ensure_worker();
        let mut slot = lock_slot(&self.shared.slot);
        let replaced = slot.deadline.is_some();
        slot.deadline = Some(deadline);
        slot.job = Some(Box::new(job));
        drop(slot);
        self.shared.signal.notify_all();
        debug!(replaced, "scheduler: renewal timer armed");
    }

    /// Clear the armed slot. No-op on an already-cancelled or never-armed
    /// scheduler.
    pub fn cancel(&self) {
        let mut slot = lock_slot(&self.shared.slot);
        let was_armed = slot.deadline.take().is_some();
        slot.job = None;
        drop(slot);
        self.shared.signal.notify_all();
        if was_armed {
            debug!("scheduler: renewal timer cancelled");
        }
    }

    /// Check whether a fire is pending.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        lock_slot(&self.shared.slot).deadline.is_some()
    }

    fn ensure_worker(&self) {
        let mut worker = match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if worker.is_some() {
            return;
        }
        let shared = Arc::clone(&self.shared);
        match thread::Builder::new()
            .name("floatlease-renewal".into())
            .spawn(move || worker_loop(&shared))
        {
            Ok(handle) => *worker = Some(handle),
            Err(e) => tracing::error!("scheduler: failed to spawn renewal timer thread: {e}"),
        }
    }
}

impl Default for RenewalScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RenewalScheduler {
    fn drop(&mut self) {
        {
            let mut slot = lock_slot(&self.shared.slot);
            slot.shutdown = true;
            slot.deadline = None;
            slot.job = None;
        }
        self.shared.signal.notify_all();
        let handle = match self.worker.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            // The armed job can own the last reference to the struct
            // holding this scheduler, in which case drop runs on the
            // worker thread itself. Joining there would deadlock, so
            // detach instead; the worker exits once the job returns
            // and sees the shutdown flag.
            if handle.thread().id() == thread::current().id() {
                return;
            }
            let _ = handle.join();
        }
    }
}

fn lock_slot(slot: &Mutex<Slot>) -> MutexGuard<'_, Slot> {
    match slot.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn worker_loop(shared: &Shared) {
    let mut slot = lock_slot(&shared.slot);
    loop {
        if slot.shutdown {
            trace!("scheduler: worker shutting down");
            return;
        }
        match slot.deadline {
            None => {
                slot = match shared.signal.wait(slot) {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
            },
            Some(deadline) => {
                let now = Instant::now();
                if now < deadline {
                    let (guard, _) = match shared.signal.wait_timeout(slot, deadline - now) {
                        Ok(result) => result,
                        Err(poisoned) => poisoned.into_inner(),
                    };
                    slot = guard;
                    continue;
                }
                // Due: take the job under the slot lock, run it unlocked.
                let job = slot.job.take();
                slot.deadline = None;
                drop(slot);
                if let Some(job) = job {
                    trace!("scheduler: renewal timer fired");
                    job();
                }
                slot = lock_slot(&shared.slot);
            },
        }
    }
}
