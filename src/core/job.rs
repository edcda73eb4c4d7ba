//! Participation job model and status machine.

use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::core::PipelineError;

/// Opportunity identifier.
pub type OpportunityId = u64;
/// Profile identifier.
pub type ProfileId = u64;

/// Job lifecycle: `Pending -> Processing -> {Succeeded | Failed | AwaitingConfirmation}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Queued, not yet picked up.
    Pending,
    /// Picked up by the worker.
    Processing,
    /// Submitted, no confirmation needed.
    Succeeded,
    /// Business failure or exhausted retries.
    Failed,
    /// Submitted; an email confirmation resolves it later.
    AwaitingConfirmation,
}

impl JobStatus {
    /// Whether the pipeline is done with a job in this status.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::AwaitingConfirmation)
    }

    /// Whether moving to `next` follows the state machine.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing)
                | (Self::Processing, Self::Processing)
                | (
                    Self::Processing,
                    Self::Succeeded | Self::Failed | Self::AwaitingConfirmation
                )
        )
    }

    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::AwaitingConfirmation => "awaiting_confirmation",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request-layer submission body. Converted into a validated [`ParticipationJob`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipationRequest {
    /// Opportunity to act on.
    pub id: OpportunityId,
    /// Form page.
    pub target_url: String,
    /// Values to submit.
    pub form_data: serde_json::Value,
    /// Whether the site confirms by email.
    #[serde(default)]
    pub requires_confirmation: bool,
    /// Acting profile.
    pub owner_id: ProfileId,
}

/// A validated unit of work for the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParticipationJob {
    id: OpportunityId,
    target_url: Url,
    form_data: serde_json::Value,
    requires_confirmation: bool,
    owner_id: ProfileId,
    status: JobStatus,
}

impl ParticipationJob {
    /// Build a pending job.
    ///
    /// # Errors
    ///
    /// `PipelineError::InvalidJob` if the URL is not absolute http(s) or the
    /// form data is not a JSON object.
    pub fn new(
        id: OpportunityId,
        target_url: &str,
        form_data: serde_json::Value,
        requires_confirmation: bool,
        owner_id: ProfileId,
    ) -> Result<Self, PipelineError> {
        let url = Url::parse(target_url.trim())
            .map_err(|e| PipelineError::InvalidJob(format!("target url `{target_url}`: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(PipelineError::InvalidJob(format!(
                "target url `{target_url}` must be an http(s) url with a host"
            )));
        }
        if !form_data.is_object() {
            return Err(PipelineError::InvalidJob("form data must be a JSON object".into()));
        }
        Ok(Self {
            id,
            target_url: url,
            form_data,
            requires_confirmation,
            owner_id,
            status: JobStatus::Pending,
        })
    }

    /// Opportunity identifier.
    #[must_use]
    pub const fn id(&self) -> OpportunityId {
        self.id
    }

    /// Form page.
    #[must_use]
    pub fn target_url(&self) -> &str {
        self.target_url.as_str()
    }

    /// Host of the form page, used to match the confirmation email.
    #[must_use]
    pub fn callback_domain(&self) -> String {
        let host = self.target_url.host_str().unwrap_or_default();
        match self.target_url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_owned(),
        }
    }

    /// Values to submit.
    #[must_use]
    pub const fn form_data(&self) -> &serde_json::Value {
        &self.form_data
    }

    /// Whether the site confirms by email.
    #[must_use]
    pub const fn requires_confirmation(&self) -> bool {
        self.requires_confirmation
    }

    /// Acting profile.
    #[must_use]
    pub const fn owner_id(&self) -> ProfileId {
        self.owner_id
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> JobStatus {
        self.status
    }

    /// Move to `next`, rejecting transitions outside the state machine.
    ///
    /// # Errors
    ///
    /// `PipelineError::Internal` for an illegal transition.
    pub fn transition(&mut self, next: JobStatus) -> Result<(), PipelineError> {
        if !self.status.can_transition_to(next) {
            return Err(PipelineError::Internal(format!(
                "job {}: illegal transition {} -> {next}",
                self.id, self.status
            )));
        }
        self.status = next;
        Ok(())
    }
}

impl TryFrom<ParticipationRequest> for ParticipationJob {
    type Error = PipelineError;

    fn try_from(req: ParticipationRequest) -> Result<Self, Self::Error> {
        Self::new(
            req.id,
            &req.target_url,
            req.form_data,
            req.requires_confirmation,
            req.owner_id,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rejects_invalid_fields_at_creation() {
        assert!(matches!(
            ParticipationJob::new(1, "not a url", json!({}), false, 1),
            Err(PipelineError::InvalidJob(_))
        ));
        assert!(matches!(
            ParticipationJob::new(1, "ftp://example.com/x", json!({}), false, 1),
            Err(PipelineError::InvalidJob(_))
        ));
        assert!(matches!(
            ParticipationJob::new(1, "https://example.com/x", json!([1, 2]), false, 1),
            Err(PipelineError::InvalidJob(_))
        ));
    }

    #[test]
    fn test_state_machine() {
        let mut job = ParticipationJob::new(7, "https://shop.example.com/win", json!({}), true, 3).unwrap();
        assert_eq!(job.status(), JobStatus::Pending);
        assert!(job.transition(JobStatus::Succeeded).is_err());
        job.transition(JobStatus::Processing).unwrap();
        job.transition(JobStatus::AwaitingConfirmation).unwrap();
        assert!(job.status().is_terminal());
        assert!(job.transition(JobStatus::Failed).is_err());
        assert_eq!(job.callback_domain(), "shop.example.com");
    }

    #[test]
    fn test_request_missing_field_fails_to_parse() {
        let parsed: Result<ParticipationRequest, _> =
            serde_json::from_str(r#"{"id": 1, "targetUrl": "https://a.example"}"#);
        assert!(parsed.is_err());

        let req: ParticipationRequest = serde_json::from_str(
            r#"{"id": 1, "targetUrl": "https://a.example/f", "formData": {"n": 1}, "ownerId": 2}"#,
        )
        .unwrap();
        let job = ParticipationJob::try_from(req).unwrap();
        assert!(!job.requires_confirmation());
        assert_eq!(job.owner_id(), 2);
    }
}
