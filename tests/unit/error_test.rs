//! Tests for error types

use std::time::Duration;

use opportunity_guard::config::Category;
use opportunity_guard::core::{AutomationError, PipelineError};

#[test]
fn test_queue_full_error() {
    let err = PipelineError::QueueFull(1000);
    assert_eq!(format!("{err}"), "queue full: 1000 jobs pending");
}

#[test]
fn test_rate_limited_error() {
    let err = PipelineError::RateLimited {
        client_id: "10.0.0.1".into(),
        category: Category::Heavy,
    };
    assert_eq!(format!("{err}"), "rate limited: client `10.0.0.1` on `heavy`");
}

#[test]
fn test_backend_error() {
    let err = PipelineError::Backend("connection failed".to_string());
    assert_eq!(format!("{err}"), "backend error: connection failed");
}

#[test]
fn test_automation_errors() {
    assert_eq!(
        format!("{}", AutomationError::Timeout(Duration::from_secs(120))),
        "call timed out after 120s"
    );
    assert_eq!(
        format!("{}", AutomationError::Status(502)),
        "automation service returned status 502"
    );
    assert_eq!(
        format!("{}", AutomationError::Decode("missing field `success`".into())),
        "malformed response: missing field `success`"
    );
}
