// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::time::Duration;
use strategos_core::WorkerStatus;

#[tokio::test]
async fn completed_workers_are_swept_after_the_linger_window() {
    let h = harness();
    let id = h.spawn("IMPL: finished").await;
    h.engine.complete_worker(&id, false).await.unwrap();

    // Ten seconds later: still present
    h.clock.advance(Duration::from_secs(10));
    h.engine.cleanup_tick().await;
    assert!(h.engine.get_worker(&id).is_some());

    // Forty-five seconds after completion: swept
    h.clock.advance(Duration::from_secs(35));
    h.engine.cleanup_tick().await;
    assert!(h.engine.get_worker(&id).is_none());
}

#[tokio::test]
async fn protected_workers_survive_every_sweep() {
    let h = harness();
    let id = h.spawn("GENERAL: persistent").await;
    h.engine.complete_worker(&id, false).await.unwrap();

    h.clock.advance(Duration::from_secs(3600));
    h.engine.cleanup_tick().await;
    assert!(h.engine.get_worker(&id).is_some());
}

#[tokio::test]
async fn awaiting_review_rootless_times_out_at_fifteen_minutes() {
    let h = harness();
    let id = h.spawn("IMPL: wants review").await;
    h.engine.mark_awaiting_review(&id).unwrap();

    h.clock.advance(Duration::from_secs(14 * 60));
    h.engine.cleanup_tick().await;
    assert!(h.engine.get_worker(&id).is_some());

    h.clock.advance(Duration::from_secs(2 * 60));
    h.engine.cleanup_tick().await;
    assert!(h.engine.get_worker(&id).is_none());
}

#[tokio::test]
async fn awaiting_review_with_parent_gets_thirty_minutes() {
    let h = harness();
    let parent = h.spawn("CAPTAIN: reviews things").await;
    let id = h
        .spawn_with(
            "IMPL: wants review",
            SpawnOptions {
                parent_worker_id: Some(parent.to_string()),
                ..SpawnOptions::default()
            },
        )
        .await;
    h.engine.mark_awaiting_review(&id).unwrap();

    h.clock.advance(Duration::from_secs(20 * 60));
    h.engine.cleanup_tick().await;
    assert!(h.engine.get_worker(&id).is_some());

    h.clock.advance(Duration::from_secs(11 * 60));
    h.engine.cleanup_tick().await;
    assert!(h.engine.get_worker(&id).is_none());
}

#[tokio::test]
async fn awaiting_review_with_children_is_never_auto_dismissed() {
    let h = harness();
    let id = h.spawn("CAPTAIN: has offspring").await;
    let _child = h
        .spawn_with(
            "IMPL: child",
            SpawnOptions {
                parent_worker_id: Some(id.to_string()),
                ..SpawnOptions::default()
            },
        )
        .await;
    h.engine.mark_awaiting_review(&id).unwrap();

    h.clock.advance(Duration::from_secs(3600));
    h.engine.cleanup_tick().await;
    assert!(h.engine.get_worker(&id).is_some());
}

#[tokio::test]
async fn idle_running_worker_is_warned_once() {
    let h = harness();
    let id = h.spawn("IMPL: daydreaming").await;

    h.clock.advance(Duration::from_secs(31 * 60));
    h.engine.cleanup_tick().await;
    h.engine.cleanup_tick().await;

    let warnings = h
        .engine
        .get_activity_log(50)
        .into_iter()
        .filter(|e| e.kind == "idle_warning" && e.worker_id == id)
        .count();
    assert_eq!(warnings, 1);
    assert_eq!(
        h.engine.get_worker(&id).unwrap().status,
        WorkerStatus::Running
    );
}

#[tokio::test]
async fn stale_pending_workers_are_dropped() {
    let h = harness();
    let base = h.spawn("IMPL: base").await;
    let pending = h
        .spawn_with(
            "TEST: forever parked",
            SpawnOptions {
                depends_on: vec![base.to_string()],
                ..SpawnOptions::default()
            },
        )
        .await;

    h.clock.advance(Duration::from_secs(31 * 60));
    h.engine.cleanup_tick().await;
    assert!(h.engine.get_worker(&pending).is_none());
    // The base worker is untouched
    assert!(h.engine.get_worker(&base).is_some());
}

#[tokio::test]
async fn overlapping_ticks_are_skipped() {
    let h = harness();
    // Simulate a stuck previous pass
    h.engine
        .cleanup_running
        .store(true, std::sync::atomic::Ordering::SeqCst);

    let id = h.spawn("IMPL: finished").await;
    h.engine.complete_worker(&id, false).await.unwrap();
    h.clock.advance(Duration::from_secs(3600));
    h.engine.cleanup_tick().await;
    // Nothing happened: the guard blocked the pass
    assert!(h.engine.get_worker(&id).is_some());

    h.engine
        .cleanup_running
        .store(false, std::sync::atomic::Ordering::SeqCst);
    h.engine.cleanup_tick().await;
    assert!(h.engine.get_worker(&id).is_none());
}

#[tokio::test]
async fn cleanup_requests_a_snapshot() {
    let h = harness();
    h.engine.start();
    let _id = h.spawn("IMPL: snapshotted").await;
    h.engine.cleanup_tick().await;
    // The debounced save lands shortly after
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(h.dir.path().join(".strategos/workers.json").exists());
}
