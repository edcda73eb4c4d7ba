//! HTTP client for the form-filling automation service.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;
use url::Url;

use crate::config::PipelineConfig;
use crate::core::automation::{AutomationClient, AutomationRequest, AutomationResponse};
use crate::core::AutomationError;

/// `POST {base}/fill-form` JSON client.
#[derive(Debug, Clone)]
pub struct HttpAutomationClient {
    inner: reqwest::Client,
    endpoint: Url,
    timeout: Duration,
}

impl HttpAutomationClient {
    /// Build a client for `base_url` with a per-request `timeout`.
    ///
    /// # Errors
    ///
    /// `AutomationError::Transport` if the URL is not absolute or the client
    /// cannot be constructed.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, AutomationError> {
        let mut base = Url::parse(base_url)
            .map_err(|e| AutomationError::Transport(format!("automation url `{base_url}`: {e}")))?;
        // join() replaces the last segment unless the path ends with '/'
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let endpoint = base
            .join("fill-form")
            .map_err(|e| AutomationError::Transport(e.to_string()))?;
        // the per-job proxy travels in the request body; the service itself is reached directly
        let inner = reqwest::Client::builder()
            .timeout(timeout)
            .no_proxy()
            .build()
            .map_err(|e| AutomationError::Transport(e.to_string()))?;
        Ok(Self {
            inner,
            endpoint,
            timeout,
        })
    }

    /// Build a client from pipeline configuration.
    ///
    /// # Errors
    ///
    /// See [`HttpAutomationClient::new`].
    pub fn from_config(config: &PipelineConfig) -> Result<Self, AutomationError> {
        Self::new(
            &config.automation_url,
            Duration::from_secs(config.call_timeout_secs),
        )
    }

    /// Full URL requests are posted to.
    #[must_use]
    pub const fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn map_error(&self, e: &reqwest::Error) -> AutomationError {
        if e.is_timeout() {
            AutomationError::Timeout(self.timeout)
        } else if let Some(status) = e.status() {
            AutomationError::Status(status.as_u16())
        } else if e.is_decode() {
            AutomationError::Decode(e.to_string())
        } else {
            AutomationError::Transport(e.to_string())
        }
    }
}

#[async_trait]
impl AutomationClient for HttpAutomationClient {
    async fn fill_form(
        &self,
        request: &AutomationRequest,
    ) -> Result<AutomationResponse, AutomationError> {
        debug!(endpoint = %self.endpoint, target = %request.url, "posting form to automation service");
        let response = self
            .inner
            .post(self.endpoint.clone())
            .json(request)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| self.map_error(&e))?;
        response
            .json::<AutomationResponse>()
            .await
            .map_err(|e| self.map_error(&e))
    }
}
