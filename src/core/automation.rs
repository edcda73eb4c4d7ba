//! Boundary to the external form-filling automation service.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::AutomationError;

/// Effective configuration sent with one automation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomationCallConfig {
    /// Lower bound of the pacing delay, in seconds.
    pub delay_seconds_min: f64,
    /// Upper bound of the pacing delay, in seconds.
    pub delay_seconds_max: f64,
    /// Proxy chosen for this call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
    /// Free-form service options.
    #[serde(flatten)]
    pub options: serde_json::Map<String, serde_json::Value>,
}

/// Request body: `{ url, formData, config }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomationRequest {
    /// Page hosting the form.
    pub url: String,
    /// Values to fill in.
    pub form_data: serde_json::Value,
    /// Call configuration.
    pub config: AutomationCallConfig,
}

/// Response body: `{ success, message?, error? }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomationResponse {
    /// Whether the form was submitted.
    pub success: bool,
    /// Human-readable success detail.
    #[serde(default)]
    pub message: Option<String>,
    /// Business failure reason.
    #[serde(default)]
    pub error: Option<String>,
}

impl AutomationResponse {
    /// Successful response with a message.
    #[must_use]
    pub fn succeeded(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            error: None,
        }
    }

    /// Business failure with a reason.
    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: None,
            error: Some(error.into()),
        }
    }
}

/// Client for the automation service.
///
/// Implementations perform exactly one call; retries and the per-call
/// timeout are applied by the pipeline worker.
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use opportunity_guard::core::{AutomationClient, AutomationError, AutomationRequest, AutomationResponse};
///
/// struct AlwaysOk;
///
/// #[async_trait]
/// impl AutomationClient for AlwaysOk {
///     async fn fill_form(&self, _request: &AutomationRequest) -> Result<AutomationResponse, AutomationError> {
///         Ok(AutomationResponse::succeeded("done"))
///     }
/// }
/// ```
#[async_trait]
pub trait AutomationClient: Send + Sync + 'static {
    /// Submit the form described by `request`.
    async fn fill_form(&self, request: &AutomationRequest)
        -> Result<AutomationResponse, AutomationError>;
}
