//! End-to-end tests for the service builder and the request-layer API.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use opportunity_guard::builders::build_services;
use opportunity_guard::config::{AppConfig, CacheKind, Category, CategoryLimit};
use opportunity_guard::core::{
    AutomationClient, AutomationError, AutomationRequest, AutomationResponse, JobStatus,
    ParticipationRequest,
};
use opportunity_guard::infra::InMemoryRecorder;
use opportunity_guard::runtime::{health, submit_participation, HealthStatus};
use serde_json::json;

struct AlwaysOk;

#[async_trait]
impl AutomationClient for AlwaysOk {
    async fn fill_form(
        &self,
        _request: &AutomationRequest,
    ) -> Result<AutomationResponse, AutomationError> {
        Ok(AutomationResponse::succeeded("entered"))
    }
}

fn test_config() -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.pipeline.poll_interval_ms = 20;
    cfg.pipeline.pacing.delay_seconds_min = 0.0;
    cfg.pipeline.pacing.delay_seconds_max = 0.0;
    cfg.admission
        .categories
        .insert(Category::Heavy, CategoryLimit::new(2, 60));
    cfg
}

fn request(id: u64, target_url: &str) -> ParticipationRequest {
    serde_json::from_value(json!({
        "id": id,
        "targetUrl": target_url,
        "formData": {"name": "Sam"},
        "ownerId": 9,
    }))
    .unwrap()
}

#[test]
fn test_submit_participation_end_to_end() {
    let recorder = Arc::new(InMemoryRecorder::new());
    let services = build_services(&test_config(), Arc::new(AlwaysOk), recorder.clone()).unwrap();

    let ack = submit_participation(
        &services.pipeline,
        &services.limiter,
        "10.0.0.1",
        request(1, "https://contest.example.org/form"),
    );
    assert!(ack.accepted, "{}", ack.message);
    assert_eq!(ack.ticket.unwrap().job_id, 1);

    assert!(recorder.wait_for_history(1, Duration::from_secs(10)));
    assert_eq!(recorder.latest_status(1), Some(JobStatus::Succeeded));

    services.shutdown();
}

#[test]
fn test_submit_participation_rejections() {
    let recorder = Arc::new(InMemoryRecorder::new());
    let services = build_services(&test_config(), Arc::new(AlwaysOk), recorder).unwrap();

    let invalid = submit_participation(
        &services.pipeline,
        &services.limiter,
        "10.0.0.2",
        request(1, "not-a-url"),
    );
    assert!(!invalid.accepted);
    assert!(invalid.ticket.is_none());
    assert!(invalid.message.starts_with("invalid job"), "{}", invalid.message);

    for id in 2..4 {
        let ack = submit_participation(
            &services.pipeline,
            &services.limiter,
            "10.0.0.2",
            request(id, "https://a.example.com/x"),
        );
        assert!(ack.accepted, "{}", ack.message);
    }
    let limited = submit_participation(
        &services.pipeline,
        &services.limiter,
        "10.0.0.2",
        request(4, "https://a.example.com/x"),
    );
    assert!(!limited.accepted);
    assert!(limited.message.starts_with("rate limited"), "{}", limited.message);

    services.shutdown();
}

#[test]
fn test_health_reports_caches_and_stopped_pipeline() {
    let recorder = Arc::new(InMemoryRecorder::new());
    let services = build_services(&test_config(), Arc::new(AlwaysOk), recorder).unwrap();

    let api = services.cache(CacheKind::Api);
    api.set("deals:latest", json!([1, 2, 3]), None);
    assert!(api.get("deals:latest").is_some());

    let report = health(&services.pipeline, &services.caches);
    assert_eq!(report.status, HealthStatus::Healthy);
    assert_eq!(report.queue_capacity, 1000);
    assert_eq!(report.caches.len(), 3);
    assert_eq!(report.caches[&CacheKind::Api].size, 1);
    assert_eq!(report.caches[&CacheKind::Api].hits, 1);
    assert_eq!(report.caches[&CacheKind::User].size, 0);

    services.shutdown();
    assert_eq!(
        health(&services.pipeline, &services.caches).status,
        HealthStatus::Stopped
    );
}

#[test]
fn test_build_services_rejects_invalid_config() {
    let mut cfg = test_config();
    cfg.caches.api.max_entries = 0;
    let result = build_services(&cfg, Arc::new(AlwaysOk), Arc::new(InMemoryRecorder::new()));
    let err = result.err().unwrap();
    assert!(err.to_string().starts_with("config invalid: cache invalid"), "{err}");
}

#[test]
fn test_cache_kinds_are_independent() {
    let mut cfg = test_config();
    cfg.caches.analytics.max_entries = 2;
    let services = build_services(&cfg, Arc::new(AlwaysOk), Arc::new(InMemoryRecorder::new())).unwrap();

    let analytics = services.cache(CacheKind::Analytics);
    for i in 0..5 {
        analytics.set(format!("report:{i}"), json!(i), None);
        services.cache(CacheKind::Api).set(format!("report:{i}"), json!(i), None);
    }
    assert_eq!(analytics.len(), 2);
    assert_eq!(services.cache(CacheKind::Api).len(), 5);
    assert!(services.cache(CacheKind::User).is_empty());

    // unknown names resolve to the api cache
    assert!(Arc::ptr_eq(
        services.caches.by_name("sessions"),
        services.cache(CacheKind::Api)
    ));
    assert!(Arc::ptr_eq(services.caches.by_name("user"), services.cache(CacheKind::User)));
    services.shutdown();
}

#[test]
fn test_cache_snapshots_survive_rebuild_per_kind() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = test_config();
    cfg.caches.snapshot_dir = Some(dir.path().to_path_buf());

    let services = build_services(&cfg, Arc::new(AlwaysOk), Arc::new(InMemoryRecorder::new())).unwrap();
    services
        .cache(CacheKind::User)
        .set("profile:9", json!({"city": "Lyon"}), Some(Duration::from_secs(600)));
    services
        .cache(CacheKind::Analytics)
        .set("daily", json!({"entries": 12}), Some(Duration::from_secs(600)));
    services.shutdown();

    assert!(dir.path().join("user_cache.json").exists());
    assert!(dir.path().join("analytics_cache.json").exists());
    assert!(dir.path().join("api_cache.json").exists());

    let rebuilt = build_services(&cfg, Arc::new(AlwaysOk), Arc::new(InMemoryRecorder::new())).unwrap();
    assert_eq!(
        rebuilt.cache(CacheKind::User).get("profile:9"),
        Some(json!({"city": "Lyon"}))
    );
    assert_eq!(rebuilt.cache(CacheKind::Analytics).get("daily"), Some(json!({"entries": 12})));
    assert!(rebuilt.cache(CacheKind::Api).get("profile:9").is_none());
    rebuilt.shutdown();
}

#[test]
fn test_idle_admission_windows_are_pruned_in_background() {
    let mut cfg = test_config();
    cfg.admission.prune_interval_secs = 1;
    let services = build_services(&cfg, Arc::new(AlwaysOk), Arc::new(InMemoryRecorder::new())).unwrap();

    for i in 0..500 {
        // epoch-zero timestamps are long outside every window
        assert!(services
            .limiter
            .is_allowed_at(&format!("10.1.{}.{}", i / 256, i % 256), Category::Api, 0));
    }
    assert_eq!(services.limiter.tracked_windows(), 500);

    let deadline = Instant::now() + Duration::from_secs(10);
    while services.limiter.tracked_windows() > 0 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(50));
    }
    assert_eq!(services.limiter.tracked_windows(), 0);
    services.shutdown();
}
