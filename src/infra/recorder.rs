//! In-memory outcome recorder for development and testing.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::core::job::{JobStatus, OpportunityId, ProfileId};
use crate::core::recorder::{ConfirmationDetails, HistoryTag, OutcomeRecorder};
use crate::core::PipelineError;
use crate::util::clock::now_ms;

/// One recorded status update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    /// Job the update belongs to.
    pub job_id: OpportunityId,
    /// New status.
    pub status: JobStatus,
    /// Log line.
    pub message: String,
    /// Timestamp milliseconds.
    pub recorded_at_ms: u64,
}

/// One recorded history entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    /// Job the entry belongs to.
    pub job_id: OpportunityId,
    /// Outcome tag.
    pub tag: HistoryTag,
    /// Acting profile.
    pub owner_id: ProfileId,
    /// Timestamp milliseconds.
    pub recorded_at_ms: u64,
}

#[derive(Default)]
struct Records {
    updates: Vec<StatusUpdate>,
    confirmations: HashMap<OpportunityId, ConfirmationDetails>,
    history: Vec<HistoryEntry>,
}

/// Recorder keeping every update in memory.
#[derive(Default)]
pub struct InMemoryRecorder {
    records: Mutex<Records>,
    history_added: Condvar,
}

impl InMemoryRecorder {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All status updates, oldest first.
    pub fn updates(&self) -> Vec<StatusUpdate> {
        self.records.lock().updates.clone()
    }

    /// Status updates for one job, oldest first.
    pub fn updates_for(&self, job_id: OpportunityId) -> Vec<StatusUpdate> {
        self.records
            .lock()
            .updates
            .iter()
            .filter(|u| u.job_id == job_id)
            .cloned()
            .collect()
    }

    /// Most recent status recorded for a job.
    pub fn latest_status(&self, job_id: OpportunityId) -> Option<JobStatus> {
        self.records
            .lock()
            .updates
            .iter()
            .rev()
            .find(|u| u.job_id == job_id)
            .map(|u| u.status)
    }

    /// Confirmation details recorded for a job.
    pub fn confirmation(&self, job_id: OpportunityId) -> Option<ConfirmationDetails> {
        self.records.lock().confirmations.get(&job_id).cloned()
    }

    /// All history entries, oldest first.
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.records.lock().history.clone()
    }

    /// History entries for one job.
    pub fn history_for(&self, job_id: OpportunityId) -> Vec<HistoryEntry> {
        self.records
            .lock()
            .history
            .iter()
            .filter(|h| h.job_id == job_id)
            .cloned()
            .collect()
    }

    /// Block until at least `count` history entries exist or `timeout` passes.
    /// Returns whether the count was reached.
    pub fn wait_for_history(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut records = self.records.lock();
        while records.history.len() < count {
            if self.history_added.wait_until(&mut records, deadline).timed_out() {
                return records.history.len() >= count;
            }
        }
        true
    }
}

impl OutcomeRecorder for InMemoryRecorder {
    fn update_status(
        &self,
        job_id: OpportunityId,
        status: JobStatus,
        message: &str,
    ) -> Result<(), PipelineError> {
        self.records.lock().updates.push(StatusUpdate {
            job_id,
            status,
            message: message.to_owned(),
            recorded_at_ms: now_ms(),
        });
        Ok(())
    }

    fn set_confirmation_pending(
        &self,
        job_id: OpportunityId,
        details: &ConfirmationDetails,
    ) -> Result<(), PipelineError> {
        let mut records = self.records.lock();
        records.confirmations.insert(job_id, details.clone());
        records.updates.push(StatusUpdate {
            job_id,
            status: JobStatus::AwaitingConfirmation,
            message: format!("submitted, awaiting email confirmation from {}", details.domain),
            recorded_at_ms: details.submitted_at_ms,
        });
        Ok(())
    }

    fn add_history(
        &self,
        job_id: OpportunityId,
        tag: HistoryTag,
        owner_id: ProfileId,
    ) -> Result<(), PipelineError> {
        self.records.lock().history.push(HistoryEntry {
            job_id,
            tag,
            owner_id,
            recorded_at_ms: now_ms(),
        });
        self.history_added.notify_all();
        Ok(())
    }
}
