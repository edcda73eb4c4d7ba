//! Boundary to the persistence collaborator that owns participation records.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::job::{JobStatus, OpportunityId, ProfileId};
use crate::core::PipelineError;

/// Tag of a participation history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryTag {
    /// The form was submitted.
    Participated,
    /// The attempt failed.
    Failed,
}

impl HistoryTag {
    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Participated => "participated",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for HistoryTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the confirmation checker needs to find the email later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationDetails {
    /// Domain the confirmation email is expected from.
    pub domain: String,
    /// When the submission succeeded, ms since epoch.
    pub submitted_at_ms: u64,
}

/// Sink for job outcomes. The implementor is the system of record; the
/// pipeline discards each job once its terminal outcome is recorded.
///
/// Failures are logged by the worker and never stop the queue.
pub trait OutcomeRecorder: Send + Sync {
    /// Record a status change with a human-readable log line.
    fn update_status(
        &self,
        job_id: OpportunityId,
        status: JobStatus,
        message: &str,
    ) -> Result<(), PipelineError>;

    /// Record that `job_id` now awaits email confirmation. This also moves the
    /// stored status to `AwaitingConfirmation`; the worker does not send a
    /// separate `update_status` for it.
    fn set_confirmation_pending(
        &self,
        job_id: OpportunityId,
        details: &ConfirmationDetails,
    ) -> Result<(), PipelineError>;

    /// Append a history entry for the acting profile.
    fn add_history(
        &self,
        job_id: OpportunityId,
        tag: HistoryTag,
        owner_id: ProfileId,
    ) -> Result<(), PipelineError>;
}
