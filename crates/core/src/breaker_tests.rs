// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn t0() -> Instant {
    Instant::now()
}

#[test]
fn trips_after_three_failures_in_window() {
    let mut b = CircuitBreaker::new();
    let now = t0();
    b.on_failure(now);
    assert!(!b.is_tripped(now));
    b.on_failure(now + Duration::from_secs(1));
    assert!(!b.is_tripped(now + Duration::from_secs(1)));
    b.on_failure(now + Duration::from_secs(2));
    assert!(b.is_tripped(now + Duration::from_secs(2)));
}

#[test]
fn success_resets() {
    let mut b = CircuitBreaker::new();
    let now = t0();
    for i in 0..3 {
        b.on_failure(now + Duration::from_secs(i));
    }
    assert!(b.is_tripped(now + Duration::from_secs(3)));
    b.on_success();
    assert!(!b.is_tripped(now + Duration::from_secs(3)));
    assert_eq!(b.status(now).fail_count, 0);
}

#[test]
fn slow_failures_do_not_trip() {
    let mut b = CircuitBreaker::new();
    let now = t0();
    b.on_failure(now);
    b.on_failure(now + Duration::from_secs(61));
    b.on_failure(now + Duration::from_secs(122));
    // Each failure lands in a fresh window
    assert!(!b.is_tripped(now + Duration::from_secs(122)));
}

#[test]
fn tripped_breaker_heals_after_window_of_silence() {
    let mut b = CircuitBreaker::new();
    let now = t0();
    for i in 0..3 {
        b.on_failure(now + Duration::from_secs(i));
    }
    assert!(b.is_tripped(now + Duration::from_secs(10)));
    assert!(!b.is_tripped(now + Duration::from_secs(120)));
}

#[test]
fn status_reports_streak() {
    let mut b = CircuitBreaker::new();
    let now = t0();
    b.on_failure(now);
    b.on_failure(now + Duration::from_secs(5));
    let status = b.status(now + Duration::from_secs(10));
    assert!(!status.tripped);
    assert_eq!(status.fail_count, 2);
    assert_eq!(status.streak_age_ms, Some(10_000));
}
