//! Request-layer models and glue over the services.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{CacheKind, Category};
use crate::core::{
    AdmissionController, AutomationClient, CacheStats, JobTicket, ParticipationJob,
    ParticipationPipeline, ParticipationRequest, PipelineError, PipelineStats,
};
use crate::builders::CacheSet;

/// Share of queue capacity above which health reports `Degraded`.
pub const QUEUE_DEGRADED_RATIO: f64 = 0.8;

/// Immediate acknowledgement of a participation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionAck {
    /// Whether the job was queued.
    pub accepted: bool,
    /// Ticket for an accepted job.
    pub ticket: Option<JobTicket>,
    /// Human-readable outcome.
    pub message: String,
}

impl SubmissionAck {
    fn accepted(ticket: JobTicket) -> Self {
        Self {
            accepted: true,
            ticket: Some(ticket),
            message: "participation queued".into(),
        }
    }

    fn rejected(err: &PipelineError) -> Self {
        Self {
            accepted: false,
            ticket: None,
            message: err.to_string(),
        }
    }
}

/// Validate, admit on the `heavy` category and enqueue a participation request.
///
/// Never blocks on the job itself; the outcome is reported to the recorder later.
pub fn submit_participation<C: AutomationClient>(
    pipeline: &ParticipationPipeline<C>,
    limiter: &AdmissionController,
    client_id: &str,
    request: ParticipationRequest,
) -> SubmissionAck {
    let result = ParticipationJob::try_from(request)
        .and_then(|job| pipeline.submit_gated(limiter, client_id, job));
    match result {
        Ok(ticket) => {
            info!(client_id, job_id = ticket.job_id, "participation accepted");
            SubmissionAck::accepted(ticket)
        }
        Err(e) => {
            warn!(client_id, category = %Category::Heavy, error = %e, "participation rejected");
            SubmissionAck::rejected(&e)
        }
    }
}

/// Overall service condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Accepting work normally.
    Healthy,
    /// Queue above the degraded threshold.
    Degraded,
    /// Pipeline no longer accepts work.
    Stopped,
}

/// Health snapshot for monitoring endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// Overall condition.
    pub status: HealthStatus,
    /// Jobs waiting in the queue.
    pub queue_depth: u64,
    /// Configured queue capacity.
    pub queue_capacity: usize,
    /// Pipeline counters.
    pub pipeline: PipelineStats,
    /// Statistics of every cache.
    pub caches: BTreeMap<CacheKind, CacheStats>,
}

/// Current health of the pipeline and caches.
pub fn health<C: AutomationClient>(
    pipeline: &ParticipationPipeline<C>,
    caches: &CacheSet,
) -> HealthReport {
    let stats = pipeline.stats();
    let status = if pipeline.is_shutdown() {
        HealthStatus::Stopped
    } else if queue_is_degraded(stats.queued, stats.capacity) {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    };
    HealthReport {
        status,
        queue_depth: stats.queued,
        queue_capacity: stats.capacity,
        pipeline: stats,
        caches: caches.stats(),
    }
}

#[allow(clippy::cast_precision_loss)]
fn queue_is_degraded(queued: u64, capacity: usize) -> bool {
    capacity > 0 && queued as f64 > capacity as f64 * QUEUE_DEGRADED_RATIO
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_degraded_threshold() {
        assert!(!queue_is_degraded(800, 1000));
        assert!(queue_is_degraded(801, 1000));
        assert!(!queue_is_degraded(0, 0));
    }
}
