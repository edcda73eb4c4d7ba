//! Periodic background reclamation.
//!
//! One dedicated OS thread drives a set of targets, each on its own interval:
//! cache stores drop expired entries and write their snapshot, the admission
//! controller drops idle client windows. The thread parks on a
//! `parking_lot::Condvar` so shutdown interrupts the wait immediately.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info, warn};

use crate::core::admission::AdmissionController;
use crate::core::cache::CacheStore;
use crate::util::clock::duration_ms;

/// Work performed on every reclamation pass.
pub trait Reclaim: Send + Sync {
    /// One periodic sweep.
    fn reclaim(&self);

    /// Called once when the reclaimer stops.
    fn finish(&self) {}
}

impl<V> Reclaim for CacheStore<V>
where
    V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn reclaim(&self) {
        self.purge_expired();
        if self.snapshot_path().is_some() {
            self.save_snapshot();
        }
    }

    fn finish(&self) {
        if self.snapshot_path().is_some() {
            self.save_snapshot();
        }
    }
}

impl Reclaim for AdmissionController {
    fn reclaim(&self) {
        let pruned = self.prune_idle();
        if pruned > 0 {
            debug!(pruned, remaining = self.tracked_windows(), "idle admission windows dropped");
        }
    }
}

/// A named target swept every `every`.
pub struct ReclaimTarget {
    label: String,
    job: Arc<dyn Reclaim>,
    every: Duration,
}

impl ReclaimTarget {
    /// Sweep `job` every `every`.
    pub fn new<R: Reclaim + 'static>(label: impl Into<String>, job: Arc<R>, every: Duration) -> Self {
        Self {
            label: label.into(),
            job,
            every,
        }
    }
}

/// Shutdown signal shared with the reclamation thread.
struct ReclaimState {
    shutdown: bool,
}

/// Handle to the reclamation thread.
pub struct Reclaimer {
    state: Arc<(Mutex<ReclaimState>, Condvar)>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

/// Longest interval honoured; keeps deadline arithmetic in range.
const MAX_INTERVAL: Duration = Duration::from_secs(365 * 24 * 3600);

fn next_due(from: Instant, every: Duration) -> Instant {
    from.checked_add(every.min(MAX_INTERVAL)).unwrap_or(from)
}

impl Reclaimer {
    /// Start sweeping every target on its own interval.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the thread cannot be spawned.
    pub fn spawn(targets: Vec<ReclaimTarget>) -> std::io::Result<Self> {
        let state = Arc::new((Mutex::new(ReclaimState { shutdown: false }), Condvar::new()));
        let thread_state = Arc::clone(&state);
        let count = targets.len();

        let worker = thread::Builder::new()
            .name("reclaimer".into())
            .spawn(move || run(&thread_state, targets))?;

        info!(targets = count, "reclaimer spawned");
        Ok(Self {
            state,
            worker: Mutex::new(Some(worker)),
        })
    }

    fn signal(&self) {
        let (lock, condvar) = &*self.state;
        lock.lock().shutdown = true;
        condvar.notify_all();
    }

    /// Stop the thread and wait for it. Every target gets its final
    /// `finish` call, so caches write their snapshot. Idempotent.
    pub fn shutdown(&self) {
        self.signal();
        let Some(worker) = self.worker.lock().take() else {
            return;
        };
        if worker.join().is_err() {
            warn!("reclaimer thread panicked");
        }
    }
}

fn run(state: &(Mutex<ReclaimState>, Condvar), targets: Vec<ReclaimTarget>) {
    let (lock, condvar) = state;
    let started = Instant::now();
    let mut schedule: Vec<(ReclaimTarget, Instant)> = targets
        .into_iter()
        .map(|target| {
            debug!(name = %target.label, interval_ms = duration_ms(target.every), "reclaim target registered");
            let due = next_due(started, target.every);
            (target, due)
        })
        .collect();

    'run: loop {
        {
            let mut guard = lock.lock();
            loop {
                if guard.shutdown {
                    break 'run;
                }
                match schedule.iter().map(|(_, due)| *due).min() {
                    Some(due) if Instant::now() >= due => break,
                    Some(due) => {
                        condvar.wait_until(&mut guard, due);
                    }
                    None => condvar.wait(&mut guard),
                }
            }
        }

        let now = Instant::now();
        for (target, due) in &mut schedule {
            if *due <= now {
                target.job.reclaim();
                *due = next_due(now, target.every);
            }
        }
    }

    for (target, _) in &schedule {
        target.job.finish();
    }
    debug!("reclaimer exiting");
}

impl Drop for Reclaimer {
    fn drop(&mut self) {
        // Signal only; explicit shutdown() is required to wait for the final snapshot.
        self.signal();
    }
}
