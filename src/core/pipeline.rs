//! Paced participation pipeline: a bounded FIFO queue drained by one dedicated worker.
//!
//! The worker is an OS thread owning a current-thread tokio runtime, so the
//! pacing delay and the (retried) automation call never block request
//! handlers. Producers enqueue without blocking and fail fast when the queue
//! is at `max_queue_depth`.

mod worker;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Sender, TrySendError};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{Category, PacingConfig, PipelineConfig, ProxyConfig};
use crate::core::admission::AdmissionController;
use crate::core::automation::AutomationClient;
use crate::core::job::{JobStatus, OpportunityId, ParticipationJob};
use crate::core::recorder::OutcomeRecorder;
use crate::core::retry::RetryPolicy;
use crate::core::PipelineError;

use worker::WorkerContext;

/// Immutable per-job settings. The worker reads one snapshot per job, so a
/// swap never changes a job halfway through.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    /// Pacing delay range.
    pub pacing: PacingConfig,
    /// Proxy policy.
    pub proxies: ProxyConfig,
    /// Retry policy for the automation call.
    pub retry: RetryPolicy,
    /// Timeout applied to every call attempt.
    pub call_timeout: Duration,
    /// Extra options forwarded in the call config.
    pub automation_options: serde_json::Map<String, serde_json::Value>,
}

impl PipelineSettings {
    /// Build a validated snapshot from configuration.
    ///
    /// # Errors
    ///
    /// `PipelineError::InvalidConfig` when `config.validate()` fails.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, PipelineError> {
        config.validate().map_err(PipelineError::InvalidConfig)?;
        Ok(Self {
            pacing: config.pacing,
            proxies: config.proxies.clone(),
            retry: RetryPolicy::from(&config.retry),
            call_timeout: Duration::from_secs(config.call_timeout_secs),
            automation_options: config.automation_options.clone(),
        })
    }
}

/// Receipt returned to the producer for an accepted job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct JobTicket {
    /// Unique submission identifier.
    pub ticket_id: Uuid,
    /// Opportunity the job acts on.
    pub job_id: OpportunityId,
}

/// Lock-free counters shared with the worker.
#[derive(Debug, Default)]
pub(crate) struct PipelineCounters {
    pub submitted: AtomicU64,
    pub rejected: AtomicU64,
    pub queued: AtomicU64,
    pub active: AtomicU64,
    pub succeeded: AtomicU64,
    pub failed: AtomicU64,
    pub awaiting_confirmation: AtomicU64,
}

impl PipelineCounters {
    pub fn snapshot(&self, capacity: usize) -> PipelineStats {
        PipelineStats {
            capacity,
            submitted: self.submitted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            queued: self.queued.load(Ordering::Relaxed),
            active: self.active.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            awaiting_confirmation: self.awaiting_confirmation.load(Ordering::Relaxed),
        }
    }

    pub fn record_outcome(&self, status: JobStatus) {
        let counter = match status {
            JobStatus::Succeeded => &self.succeeded,
            JobStatus::AwaitingConfirmation => &self.awaiting_confirmation,
            _ => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Point-in-time pipeline statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PipelineStats {
    /// Configured queue depth.
    pub capacity: usize,
    /// Jobs accepted into the queue.
    pub submitted: u64,
    /// Submissions refused (full queue or rate limited).
    pub rejected: u64,
    /// Jobs waiting in the queue.
    pub queued: u64,
    /// Jobs being processed (0 or 1).
    pub active: u64,
    /// Jobs that ended `Succeeded`.
    pub succeeded: u64,
    /// Jobs that ended `Failed`.
    pub failed: u64,
    /// Jobs that ended `AwaitingConfirmation`.
    pub awaiting_confirmation: u64,
}

impl PipelineStats {
    /// Jobs that reached a terminal status.
    #[must_use]
    pub const fn completed(&self) -> u64 {
        self.succeeded + self.failed + self.awaiting_confirmation
    }
}

/// The participation pipeline.
///
/// ```rust,ignore
/// let pipeline = ParticipationPipeline::new(&config.pipeline, client, recorder)?;
/// let ticket = pipeline.submit(ParticipationJob::new(1, "https://example.com/f", json!({}), false, 7)?)?;
/// pipeline.shutdown();
/// ```
pub struct ParticipationPipeline<C: AutomationClient> {
    capacity: usize,
    /// Option allows shutdown by dropping the sender.
    task_tx: Mutex<Option<Sender<ParticipationJob>>>,
    settings: Arc<RwLock<Arc<PipelineSettings>>>,
    counters: Arc<PipelineCounters>,
    recorder: Arc<dyn OutcomeRecorder>,
    shutdown: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
    _client: std::marker::PhantomData<fn() -> C>,
}

impl<C: AutomationClient> ParticipationPipeline<C> {
    /// Validate `config`, build the worker runtime and start the worker thread.
    ///
    /// # Errors
    ///
    /// - `PipelineError::InvalidConfig` if the configuration is invalid
    /// - `PipelineError::Internal` if the runtime or thread cannot be created
    pub fn new(
        config: &PipelineConfig,
        client: Arc<C>,
        recorder: Arc<dyn OutcomeRecorder>,
    ) -> Result<Self, PipelineError> {
        let settings = Arc::new(RwLock::new(Arc::new(PipelineSettings::from_config(config)?)));
        let (task_tx, task_rx) = bounded::<ParticipationJob>(config.max_queue_depth);
        let counters = Arc::new(PipelineCounters::default());
        let shutdown = Arc::new(AtomicBool::new(false));

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| PipelineError::Internal(format!("worker runtime: {e}")))?;

        let ctx = WorkerContext {
            rx: task_rx,
            client,
            recorder: Arc::clone(&recorder),
            settings: Arc::clone(&settings),
            counters: Arc::clone(&counters),
            shutdown: Arc::clone(&shutdown),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
        };
        let handle = thread::Builder::new()
            .name("participation-worker".into())
            .spawn(move || worker::run(ctx, &runtime))
            .map_err(|e| PipelineError::Internal(format!("spawn worker: {e}")))?;

        info!(
            max_queue_depth = config.max_queue_depth,
            poll_interval_ms = config.poll_interval_ms,
            "participation pipeline started"
        );

        Ok(Self {
            capacity: config.max_queue_depth,
            task_tx: Mutex::new(Some(task_tx)),
            settings,
            counters,
            recorder,
            shutdown,
            worker: Mutex::new(Some(handle)),
            _client: std::marker::PhantomData,
        })
    }

    /// Enqueue a job without blocking and report it as `Pending`.
    ///
    /// # Errors
    ///
    /// - `PipelineError::QueueFull` if `max_queue_depth` jobs are waiting
    /// - `PipelineError::Shutdown` if the pipeline has been shut down
    pub fn submit(&self, job: ParticipationJob) -> Result<JobTicket, PipelineError> {
        if self.shutdown.load(Ordering::Acquire) {
            return Err(PipelineError::Shutdown);
        }
        let job_id = job.id();

        // Holding the sender lock serializes producers; the worker only
        // removes jobs, so a queue seen as not full here accepts the send.
        let task_tx_guard = self.task_tx.lock();
        let Some(task_tx) = task_tx_guard.as_ref() else {
            return Err(PipelineError::Shutdown);
        };
        if task_tx.is_full() {
            return Err(self.reject_full(job_id));
        }

        self.enqueue(task_tx, job)
    }

    /// Record the job as queued and hand it to the worker. A send that fails
    /// after the "queued" record reports a compensating `Failed` status.
    fn enqueue(
        &self,
        task_tx: &Sender<ParticipationJob>,
        job: ParticipationJob,
    ) -> Result<JobTicket, PipelineError> {
        let job_id = job.id();
        // Reported before the send so "queued" always precedes the worker's updates.
        if let Err(e) = self.recorder.update_status(job_id, JobStatus::Pending, "queued") {
            warn!(job_id, error = %e, "failed to record queued status");
        }
        self.counters.queued.fetch_add(1, Ordering::Relaxed);
        let err = match task_tx.try_send(job) {
            Ok(()) => {
                self.counters.submitted.fetch_add(1, Ordering::Relaxed);
                let ticket = JobTicket {
                    ticket_id: Uuid::new_v4(),
                    job_id,
                };
                debug!(job_id, ticket = %ticket.ticket_id, "participation job queued");
                return Ok(ticket);
            }
            Err(TrySendError::Full(_)) => self.reject_full(job_id),
            Err(TrySendError::Disconnected(_)) => PipelineError::Shutdown,
        };
        self.counters.queued.fetch_sub(1, Ordering::Relaxed);
        if let Err(e) =
            self.recorder
                .update_status(job_id, JobStatus::Failed, &format!("not queued: {err}"))
        {
            warn!(job_id, error = %e, "failed to record rejected submission");
        }
        Err(err)
    }

    /// Admit `client_id` on the `heavy` category, then [`submit`](Self::submit).
    ///
    /// # Errors
    ///
    /// `PipelineError::RateLimited` when the controller rejects the client,
    /// otherwise the errors of `submit`.
    pub fn submit_gated(
        &self,
        limiter: &AdmissionController,
        client_id: &str,
        job: ParticipationJob,
    ) -> Result<JobTicket, PipelineError> {
        if !limiter.is_allowed(client_id, Category::Heavy) {
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            return Err(PipelineError::RateLimited {
                client_id: client_id.to_owned(),
                category: Category::Heavy,
            });
        }
        self.submit(job)
    }

    fn reject_full(&self, job_id: OpportunityId) -> PipelineError {
        self.counters.rejected.fetch_add(1, Ordering::Relaxed);
        warn!(job_id, capacity = self.capacity, "participation queue is full");
        PipelineError::QueueFull(self.capacity)
    }

    /// Current statistics.
    #[must_use]
    pub fn stats(&self) -> PipelineStats {
        self.counters.snapshot(self.capacity)
    }

    /// Configured queue depth.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Settings snapshot the next job will use.
    #[must_use]
    pub fn settings(&self) -> Arc<PipelineSettings> {
        Arc::clone(&*self.settings.read())
    }

    /// Swap the settings snapshot. The in-flight job keeps the one it started with.
    pub fn update_settings(&self, settings: PipelineSettings) {
        *self.settings.write() = Arc::new(settings);
        info!("pipeline settings updated");
    }

    /// Whether [`shutdown`](Self::shutdown) has been requested.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Signal cancellation and block until the worker exits. An in-flight job
    /// is completed first; jobs still queued stay `Pending`. Idempotent.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        self.task_tx.lock().take();
        let Some(handle) = self.worker.lock().take() else {
            return;
        };
        info!("shutting down participation pipeline");
        if handle.join().is_err() {
            warn!("participation worker panicked");
        }
        info!("participation pipeline shut down");
    }
}

impl<C: AutomationClient> Drop for ParticipationPipeline<C> {
    fn drop(&mut self) {
        // Signal only; joining here could hang on an in-flight job.
        if !self.shutdown.swap(true, Ordering::AcqRel) {
            self.task_tx.lock().take();
            debug!("pipeline dropped without explicit shutdown, worker detached");
        }
    }
}
