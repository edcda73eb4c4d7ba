//! Tests for utility functions

use std::time::Duration;

use opportunity_guard::util::{duration_ms, init_tracing, now_ms};

#[test]
fn test_now_ms_is_epoch_millis() {
    let a = now_ms();
    std::thread::sleep(Duration::from_millis(5));
    let b = now_ms();
    assert!(b >= a);
    assert!(a > 1_600_000_000_000);
}

#[test]
fn test_duration_ms_saturates() {
    assert_eq!(duration_ms(Duration::from_millis(1500)), 1500);
    assert_eq!(duration_ms(Duration::MAX), u64::MAX);
}

#[test]
fn test_init_tracing_is_idempotent() {
    init_tracing();
    init_tracing();
}
