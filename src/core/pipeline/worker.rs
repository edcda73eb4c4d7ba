//! The dedicated participation worker loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use parking_lot::RwLock;
use rand::Rng;
use tracing::{debug, error, info, warn};

use crate::config::PacingConfig;
use crate::core::automation::{
    AutomationCallConfig, AutomationClient, AutomationRequest, AutomationResponse,
};
use crate::core::job::{JobStatus, OpportunityId, ParticipationJob};
use crate::core::proxy::ProxySelector;
use crate::core::recorder::{ConfirmationDetails, HistoryTag, OutcomeRecorder};
use crate::core::retry::retry_with_backoff;
use crate::core::{AutomationError, PipelineError};
use crate::util::clock::{duration_ms, now_ms};

use super::{PipelineCounters, PipelineSettings};

/// Everything the worker thread owns or shares with the pipeline handle.
pub(super) struct WorkerContext<C> {
    pub rx: Receiver<ParticipationJob>,
    pub client: Arc<C>,
    pub recorder: Arc<dyn OutcomeRecorder>,
    pub settings: Arc<RwLock<Arc<PipelineSettings>>>,
    pub counters: Arc<PipelineCounters>,
    pub shutdown: Arc<AtomicBool>,
    pub poll_interval: Duration,
}

/// Drain the queue until cancelled. One job at a time, never preempted.
pub(super) fn run<C: AutomationClient>(ctx: WorkerContext<C>, runtime: &tokio::runtime::Runtime) {
    info!("participation worker started");
    // owned by this thread alone, so rotation needs no lock
    let mut selector = ProxySelector::new();
    // received after cancellation and left unprocessed
    let mut held_back = 0;

    loop {
        if ctx.shutdown.load(Ordering::Acquire) {
            break;
        }
        let job = match ctx.rx.recv_timeout(ctx.poll_interval) {
            Ok(job) => job,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };
        if ctx.shutdown.load(Ordering::Acquire) {
            debug!(job_id = job.id(), "job received after cancellation, leaving it pending");
            held_back += 1;
            break;
        }

        ctx.counters.queued.fetch_sub(1, Ordering::Relaxed);
        ctx.counters.active.fetch_add(1, Ordering::Relaxed);

        let job_id = job.id();
        let owner_id = job.owner_id();
        let settings = Arc::clone(&*ctx.settings.read());
        let proxy = selector.select(&settings.proxies);

        let task = runtime.spawn(process_job(
            job,
            Arc::clone(&ctx.client),
            Arc::clone(&ctx.recorder),
            settings,
            proxy,
        ));
        let status = match runtime.block_on(task) {
            Ok(status) => status,
            Err(e) => {
                error!(job_id, error = %e, "participation job aborted");
                report(
                    ctx.recorder.update_status(
                        job_id,
                        JobStatus::Failed,
                        "participation failed: unexpected internal error",
                    ),
                    job_id,
                    "status",
                );
                report(
                    ctx.recorder.add_history(job_id, HistoryTag::Failed, owner_id),
                    job_id,
                    "history",
                );
                JobStatus::Failed
            }
        };

        ctx.counters.record_outcome(status);
        ctx.counters.active.fetch_sub(1, Ordering::Relaxed);
    }

    let abandoned = ctx.rx.len() + held_back;
    if abandoned > 0 {
        warn!(abandoned, "participation worker stopping with jobs still queued");
    }
    info!("participation worker stopped");
}

/// Run one job to a terminal status, reporting every step. Spawned as a task
/// so a panic surfaces as a `JoinError` instead of unwinding the worker.
async fn process_job<C: AutomationClient>(
    mut job: ParticipationJob,
    client: Arc<C>,
    recorder: Arc<dyn OutcomeRecorder>,
    settings: Arc<PipelineSettings>,
    proxy: Option<String>,
) -> JobStatus {
    let recorder = recorder.as_ref();
    let job_id = job.id();
    if let Err(e) = job.transition(JobStatus::Processing) {
        error!(job_id, error = %e, "dequeued job was not pending");
        return JobStatus::Failed;
    }

    let delay = pacing_delay(&settings.pacing);
    info!(job_id, delay_ms = duration_ms(delay), "job processing");
    report(
        recorder.update_status(
            job_id,
            JobStatus::Processing,
            &format!("waiting {:.1}s before acting", delay.as_secs_f64()),
        ),
        job_id,
        "status",
    );
    tokio::time::sleep(delay).await;
    report(
        recorder.update_status(job_id, JobStatus::Processing, "starting participation"),
        job_id,
        "status",
    );

    let request = AutomationRequest {
        url: job.target_url().to_owned(),
        form_data: job.form_data().clone(),
        config: AutomationCallConfig {
            delay_seconds_min: settings.pacing.delay_seconds_min,
            delay_seconds_max: settings.pacing.delay_seconds_max,
            proxy,
            options: settings.automation_options.clone(),
        },
    };
    if let Some(proxy) = &request.config.proxy {
        debug!(job_id, proxy = %proxy, "using proxy");
    }

    let timeout = settings.call_timeout;
    let client = client.as_ref();
    let request = &request;
    let result = retry_with_backoff(&settings.retry, |attempt| async move {
        debug!(job_id, attempt, "calling automation service");
        tokio::time::timeout(timeout, client.fill_form(request))
            .await
            .unwrap_or(Err(AutomationError::Timeout(timeout)))
    })
    .await;

    complete(&mut job, result, settings.retry.max_attempts, recorder)
}

fn complete(
    job: &mut ParticipationJob,
    result: Result<AutomationResponse, AutomationError>,
    max_attempts: u32,
    recorder: &dyn OutcomeRecorder,
) -> JobStatus {
    let job_id = job.id();
    let (status, message, tag) = match result {
        Ok(response) if response.success => {
            let message = response
                .message
                .unwrap_or_else(|| "participation submitted".to_owned());
            if job.requires_confirmation() {
                (JobStatus::AwaitingConfirmation, message, HistoryTag::Participated)
            } else {
                (JobStatus::Succeeded, message, HistoryTag::Participated)
            }
        }
        Ok(response) => {
            let reason = response.error.unwrap_or_else(|| "unknown error".to_owned());
            (
                JobStatus::Failed,
                format!("participation failed: {reason}"),
                HistoryTag::Failed,
            )
        }
        Err(e) => (
            JobStatus::Failed,
            format!("automation call failed after {max_attempts} attempt(s): {e}"),
            HistoryTag::Failed,
        ),
    };

    if let Err(e) = job.transition(status) {
        error!(job_id, error = %e, "unexpected job state");
    }

    if status == JobStatus::AwaitingConfirmation {
        let details = ConfirmationDetails {
            domain: job.callback_domain(),
            submitted_at_ms: now_ms(),
        };
        report(
            recorder.set_confirmation_pending(job_id, &details),
            job_id,
            "confirmation",
        );
    } else {
        report(recorder.update_status(job_id, status, &message), job_id, "status");
    }
    report(
        recorder.add_history(job_id, tag, job.owner_id()),
        job_id,
        "history",
    );

    match status {
        JobStatus::Failed => warn!(job_id, reason = %message, "job failed"),
        _ => info!(job_id, status = %status, "job completed"),
    }
    status
}

/// Uniform delay in `[min, max]` seconds; `min` when the range is empty.
pub(super) fn pacing_delay(pacing: &PacingConfig) -> Duration {
    let (min, max) = (pacing.delay_seconds_min, pacing.delay_seconds_max);
    let secs = if max > min && max.is_finite() {
        rand::rng().random_range(min..=max)
    } else {
        min
    };
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO)
}

fn report(result: Result<(), PipelineError>, job_id: OpportunityId, what: &str) {
    if let Err(e) = result {
        warn!(job_id, error = %e, "failed to record job {what}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::infra::InMemoryRecorder;
    use async_trait::async_trait;
    use serde_json::json;
    use std::thread;

    struct AlwaysOk;

    #[async_trait]
    impl AutomationClient for AlwaysOk {
        async fn fill_form(
            &self,
            _request: &AutomationRequest,
        ) -> Result<AutomationResponse, AutomationError> {
            Ok(AutomationResponse::succeeded("ok"))
        }
    }

    #[test]
    fn test_job_received_after_cancellation_stays_pending() {
        let mut config = PipelineConfig::default();
        config.pacing.delay_seconds_min = 0.0;
        config.pacing.delay_seconds_max = 0.0;
        let settings = PipelineSettings::from_config(&config).unwrap();

        let (tx, rx) = crossbeam_channel::bounded(4);
        let recorder = Arc::new(InMemoryRecorder::new());
        let counters = Arc::new(PipelineCounters::default());
        let shutdown = Arc::new(AtomicBool::new(false));
        let recorder_handle: Arc<dyn OutcomeRecorder> = recorder.clone();
        let ctx = WorkerContext {
            rx,
            client: Arc::new(AlwaysOk),
            recorder: recorder_handle,
            settings: Arc::new(RwLock::new(Arc::new(settings))),
            counters: Arc::clone(&counters),
            shutdown: Arc::clone(&shutdown),
            poll_interval: Duration::from_secs(5),
        };
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let worker = thread::spawn(move || run(ctx, &runtime));

        // the worker is now parked on the empty queue
        thread::sleep(Duration::from_millis(100));
        shutdown.store(true, Ordering::Release);
        counters.queued.fetch_add(1, Ordering::Relaxed);
        tx.send(ParticipationJob::new(7, "https://a.example.com/f", json!({}), false, 1).unwrap())
            .unwrap();
        worker.join().unwrap();

        assert!(recorder.updates_for(7).is_empty());
        let stats = counters.snapshot(4);
        assert_eq!(stats.completed(), 0);
        assert_eq!(stats.queued, 1);
    }

    #[test]
    fn test_pacing_delay_stays_in_range() {
        let pacing = PacingConfig {
            delay_seconds_min: 0.5,
            delay_seconds_max: 1.5,
        };
        for _ in 0..100 {
            let delay = pacing_delay(&pacing);
            assert!(delay >= Duration::from_millis(500) && delay <= Duration::from_millis(1500));
        }
    }

    #[test]
    fn test_pacing_delay_degenerate_ranges() {
        let fixed = PacingConfig {
            delay_seconds_min: 2.0,
            delay_seconds_max: 2.0,
        };
        assert_eq!(pacing_delay(&fixed), Duration::from_secs(2));

        let broken = PacingConfig {
            delay_seconds_min: -1.0,
            delay_seconds_max: -1.0,
        };
        assert_eq!(pacing_delay(&broken), Duration::ZERO);
    }
}
