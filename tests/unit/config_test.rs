//! Tests for configuration validation

use std::path::PathBuf;

use opportunity_guard::config::{
    AdmissionConfig, AppConfig, CacheConfig, CacheKind, CachesConfig, Category, CategoryLimit,
    PipelineConfig, RotationMode,
};

#[test]
fn test_defaults_are_valid() {
    let cfg = AppConfig::default();
    assert!(cfg.validate().is_ok());
    assert_eq!(cfg.caches.api.max_entries, 500);
    assert_eq!(cfg.caches.api.memory_limit_bytes(), 50 * 1024 * 1024);
    assert_eq!(cfg.caches.analytics.default_ttl_secs, 1800);
    assert_eq!(cfg.caches.user.default_ttl_secs, 86_400);
    assert_eq!(cfg.admission.prune_interval_secs, 300);
    assert_eq!(cfg.pipeline.max_queue_depth, 1000);
    assert_eq!(cfg.pipeline.call_timeout_secs, 120);
    assert_eq!(cfg.pipeline.retry.max_attempts, 3);
}

#[test]
fn test_cache_config_invalid_bounds() {
    let zero_entries = CacheConfig {
        max_entries: 0,
        ..CacheConfig::default()
    };
    assert!(zero_entries.validate().is_err());

    let zero_memory = CacheConfig {
        max_memory_bytes: Some(0),
        ..CacheConfig::default()
    };
    assert!(zero_memory.validate().is_err());
}

#[test]
fn test_exact_memory_bound_overrides_megabytes() {
    let cfg = CacheConfig {
        max_memory_mb: 5,
        max_memory_bytes: Some(2048),
        ..CacheConfig::default()
    };
    assert_eq!(cfg.memory_limit_bytes(), 2048);
}

#[test]
fn test_admission_defaults_fill_missing_categories() {
    let mut cfg = AdmissionConfig::default();
    cfg.categories.insert(Category::Heavy, CategoryLimit::new(2, 30));
    let resolved = cfg.resolved();
    assert_eq!(resolved[&Category::Heavy], CategoryLimit::new(2, 30));
    assert_eq!(resolved[&Category::Api], CategoryLimit::new(100, 60));
    assert_eq!(resolved[&Category::Scraping], CategoryLimit::new(10, 60));
    assert_eq!(resolved[&Category::Auth], CategoryLimit::new(5, 300));
}

#[test]
fn test_admission_rejects_zero_limit() {
    let mut cfg = AdmissionConfig::default();
    cfg.categories.insert(Category::Auth, CategoryLimit::new(0, 60));
    assert!(cfg.validate().is_err());
}

#[test]
fn test_pipeline_config_invalid_values() {
    let mut pacing = PipelineConfig::default();
    pacing.pacing.delay_seconds_min = 31.0;
    assert!(pacing.validate().is_err());

    let mut retry = PipelineConfig::default();
    retry.retry.max_attempts = 0;
    assert!(retry.validate().is_err());

    let mut backoff = PipelineConfig::default();
    backoff.retry.initial_backoff_ms = 20_000;
    assert!(backoff.validate().is_err());

    let mut proxies = PipelineConfig::default();
    proxies.proxies.enabled = true;
    proxies.proxies.list = vec!["http://p0".into(), " ".into()];
    assert!(proxies.validate().is_err());
}

#[test]
fn test_app_config_from_json() {
    let json = r#"{
        "caches": {
            "api": { "max_entries": 50 },
            "user": { "snapshot_path": "/tmp/profiles.json" },
            "snapshot_dir": "/var/lib/guard"
        },
        "admission": { "categories": { "heavy": { "maxRequests": 3, "windowSeconds": 120 } } },
        "pipeline": {
            "max_queue_depth": 20,
            "proxies": { "enabled": true, "rotationMode": "sequential", "list": ["http://p0"] },
            "automation_options": { "headless": true }
        }
    }"#;

    let cfg = AppConfig::from_json_str(json).unwrap();
    assert_eq!(cfg.caches.api.max_entries, 50);
    // fields left out keep the kind's defaults
    assert_eq!(cfg.caches.api.default_ttl_secs, 300);
    assert_eq!(cfg.caches.api.cleanup_interval_secs, 300);
    assert_eq!(cfg.caches.analytics.max_entries, 100);
    assert_eq!(
        cfg.caches.resolved(CacheKind::Api).snapshot_path,
        Some(PathBuf::from("/var/lib/guard/api_cache.json"))
    );
    assert_eq!(
        cfg.caches.resolved(CacheKind::User).snapshot_path,
        Some(PathBuf::from("/tmp/profiles.json"))
    );
    assert_eq!(cfg.admission.resolved()[&Category::Heavy], CategoryLimit::new(3, 120));
    assert_eq!(cfg.pipeline.max_queue_depth, 20);
    assert_eq!(cfg.pipeline.proxies.rotation_mode, RotationMode::Sequential);
    assert_eq!(cfg.pipeline.automation_options["headless"], true);
}

#[test]
fn test_app_config_from_json_reports_section() {
    let err = AppConfig::from_json_str(r#"{ "pipeline": { "max_queue_depth": 0 } }"#).unwrap_err();
    assert!(err.starts_with("pipeline invalid"), "{err}");

    let err = AppConfig::from_json_str("{ not json").unwrap_err();
    assert!(err.starts_with("parse error"), "{err}");
}

#[test]
fn test_category_parse_is_lenient() {
    assert_eq!(Category::parse("HEAVY"), Category::Heavy);
    assert_eq!(Category::parse(" auth "), Category::Auth);
    assert_eq!(Category::parse("participation-burst"), Category::Api);
}

#[test]
fn test_cache_kind_parse_falls_back_to_api() {
    assert_eq!(CacheKind::parse("analytics"), CacheKind::Analytics);
    assert_eq!(CacheKind::parse(" USER "), CacheKind::User);
    assert_eq!(CacheKind::parse("sessions"), CacheKind::Api);
}

#[test]
fn test_caches_reject_shared_snapshot_file() {
    let mut caches = CachesConfig::default();
    caches.api.snapshot_path = Some(PathBuf::from("/tmp/cache.json"));
    caches.user.snapshot_path = Some(PathBuf::from("/tmp/cache.json"));
    let err = caches.validate().unwrap_err();
    assert!(err.contains("share snapshot file"), "{err}");

    let mut cfg = AppConfig::default();
    cfg.caches.get_mut(CacheKind::Analytics).max_entries = 0;
    let err = cfg.validate().unwrap_err();
    assert!(err.starts_with("cache invalid: `analytics`"), "{err}");
}

#[test]
fn test_admission_rejects_zero_prune_interval() {
    let cfg = AdmissionConfig {
        prune_interval_secs: 0,
        ..AdmissionConfig::default()
    };
    assert!(cfg.validate().is_err());
}
