//! Builders to construct services from configuration.

pub mod services_builder;

pub use services_builder::{build_http_services, build_services, CacheSet, JsonCache, Services};
