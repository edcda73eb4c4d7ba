//! # Opportunity Guard
//!
//! Resource-protection and job-execution primitives for a service that
//! monitors external opportunities and acts on them:
//!
//! - **Cache store**: a bounded in-memory key/value cache with per-entry TTL,
//!   LRU eviction under entry-count and aggregate-size bounds, pattern
//!   invalidation and optional snapshot persistence; the service runs one
//!   instance per cache kind (api, analytics, user)
//! - **Admission controller**: a sliding-window rate limiter keyed by
//!   `(client, category)` that blocks an offender for twice the window
//! - **Participation pipeline**: a bounded FIFO queue drained by one dedicated
//!   worker thread that paces each job with a randomized delay, rotates
//!   proxies and calls the automation service under a retry policy
//!
//! Components are explicit instances shared by `Arc`; build them together with
//! [`builders::build_services`].
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use opportunity_guard::builders::build_http_services;
//! use opportunity_guard::config::AppConfig;
//! use opportunity_guard::infra::InMemoryRecorder;
//! use opportunity_guard::runtime::{health, submit_participation};
//!
//! let cfg = AppConfig::default().apply_env_overrides()?;
//! let services = build_http_services(&cfg, Arc::new(InMemoryRecorder::new()))?;
//!
//! let ack = submit_participation(&services.pipeline, &services.limiter, "client-1", request);
//! let report = health(&services.pipeline, &services.caches);
//!
//! services.shutdown();
//! ```

#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Cache store, admission control and the participation pipeline.
pub mod core;
/// Configuration models for the cache, admission controller and pipeline.
pub mod config;
/// Builders to construct services from configuration.
pub mod builders;
/// Infrastructure adapters: HTTP client, snapshot file, in-memory recorder.
pub mod infra;
/// Request-layer glue and health reporting.
pub mod runtime;
/// Shared utilities.
pub mod util;
