//! Request-layer glue over the services.

pub mod api;

pub use api::{health, submit_participation, HealthReport, HealthStatus, SubmissionAck};
