//! Error types for pipeline, automation and persistence operations.

use std::time::Duration;

use thiserror::Error;

use crate::config::Category;

/// Errors produced when submitting to or running the participation pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Queue is at its configured depth.
    #[error("queue full: {0} jobs pending")]
    QueueFull(usize),
    /// Pipeline has been shut down.
    #[error("pipeline has been shut down")]
    Shutdown,
    /// Job failed validation at enqueue time.
    #[error("invalid job: {0}")]
    InvalidJob(String),
    /// Admission controller rejected the caller.
    #[error("rate limited: client `{client_id}` on `{category}`")]
    RateLimited {
        /// Rejected client.
        client_id: String,
        /// Category the client exceeded.
        category: Category,
    },
    /// Pipeline configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Persistence collaborator failure with context.
    #[error("backend error: {0}")]
    Backend(String),
    /// Internal failure (runtime construction, thread spawn).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Errors produced by an automation client call.
#[derive(Debug, Clone, Error)]
pub enum AutomationError {
    /// Connection or request failure.
    #[error("transport error: {0}")]
    Transport(String),
    /// Call exceeded its timeout.
    #[error("call timed out after {0:?}")]
    Timeout(Duration),
    /// Service answered with a non-success HTTP status.
    #[error("automation service returned status {0}")]
    Status(u16),
    /// Response body could not be decoded.
    #[error("malformed response: {0}")]
    Decode(String),
}

/// Errors reading or writing a cache snapshot. Logged, never surfaced to cache callers.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// Filesystem failure.
    #[error("snapshot io: {0}")]
    Io(#[from] std::io::Error),
    /// Encoding failure.
    #[error("snapshot encoding: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
