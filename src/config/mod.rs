//! Configuration models for the cache, admission controller and pipeline.

pub mod settings;

pub use settings::{
    AdmissionConfig, AppConfig, CacheConfig, CacheKind, CachesConfig, Category, CategoryLimit,
    PacingConfig, PipelineConfig, ProxyConfig, RetryConfig, RotationMode,
};
