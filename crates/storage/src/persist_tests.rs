// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::path::PathBuf;

fn sample_worker(id: &str) -> Worker {
    let mut w = Worker::new(
        WorkerId::new(id),
        "IMPL: demo".to_string(),
        PathBuf::from("/srv/projects/demo"),
        1_000,
    );
    w.ralph_token = Some("tok-123".to_string());
    w.capture_failures = 2;
    w.idle_ticks = 5;
    w
}

fn snapshot_of(ids: &[&str]) -> WorkerSnapshot {
    WorkerSnapshot {
        timestamp_ms: 999,
        workers: ids
            .iter()
            .map(|id| PersistedWorker::from_worker(&sample_worker(id)))
            .collect(),
    }
}

#[test]
fn save_writes_via_tmp_and_rename() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("workers.json");

    snapshot_of(&["w1", "w2"]).save(&path).unwrap();

    assert!(path.exists());
    assert!(!dir.path().join("workers.json.tmp").exists());

    let text = std::fs::read_to_string(&path).unwrap();
    let parsed: WorkerSnapshot = serde_json::from_str(&text).unwrap();
    assert_eq!(parsed.workers.len(), 2);
    assert_eq!(parsed.timestamp_ms, 999);
}

#[test]
fn save_creates_parent_directories() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("deep/nested/workers.json");
    snapshot_of(&["w1"]).save(&path).unwrap();
    assert!(path.exists());
}

#[test]
fn runtime_only_fields_never_reach_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("workers.json");
    snapshot_of(&["w1"]).save(&path).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(!text.contains("capture_failures"));
    assert!(!text.contains("idle_ticks"));
    assert!(!text.contains("last_accept_fingerprint"));
    // The token IS persisted (the snapshot stays local); the boundary
    // projection is the one that must not carry it.
    assert!(text.contains("tok-123"));
}

#[test]
fn round_trip_preserves_relations_and_flags() {
    let mut w = sample_worker("w1");
    w.depends_on = vec![WorkerId::new("w0")];
    w.child_worker_ids = vec![WorkerId::new("w2")];
    w.parent_worker_id = Some(WorkerId::new("w0"));
    w.bulldoze_mode = true;
    w.ralph_progress = 40;

    let record = PersistedWorker::from_worker(&w);
    let restored = record.into_worker(5_000);

    assert_eq!(restored.id, w.id);
    assert_eq!(restored.depends_on, w.depends_on);
    assert_eq!(restored.child_worker_ids, w.child_worker_ids);
    assert_eq!(restored.parent_worker_id, w.parent_worker_id);
    assert!(restored.bulldoze_mode);
    assert_eq!(restored.ralph_progress, 40);
    assert_eq!(restored.ralph_token, Some("tok-123".to_string()));
    // Runtime state starts fresh
    assert_eq!(restored.capture_failures, 0);
    assert_eq!(restored.idle_ticks, 0);
}

#[test]
fn into_worker_backfills_zero_timestamps() {
    let mut record = PersistedWorker::from_worker(&sample_worker("w1"));
    record.last_activity_ms = 0;
    record.last_output_ms = 0;
    let restored = record.into_worker(7_777);
    assert_eq!(restored.last_activity_ms, 7_777);
    assert_eq!(restored.last_output_ms, 7_777);
}

#[tokio::test]
async fn save_now_writes_immediately() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("workers.json");
    let saver = StateSaver::new(
        path.clone(),
        Arc::new(|| WorkerSnapshot {
            timestamp_ms: 1,
            workers: Vec::new(),
        }),
        Duration::from_secs(2),
    );

    saver.save_now().await.unwrap();
    assert!(path.exists());
}

#[tokio::test]
async fn debounce_coalesces_bursts() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("workers.json");
    let count = Arc::new(std::sync::atomic::AtomicU64::new(0));
    let count_in = Arc::clone(&count);

    let saver = StateSaver::new(
        path.clone(),
        Arc::new(move || {
            count_in.fetch_add(1, Ordering::SeqCst);
            WorkerSnapshot {
                timestamp_ms: 1,
                workers: Vec::new(),
            }
        }),
        Duration::from_millis(100),
    );
    let _task = saver.spawn();

    for _ in 0..10 {
        saver.request_save();
    }
    tokio::time::sleep(Duration::from_millis(500)).await;

    // A burst of requests produces a single snapshot
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn save_sync_is_best_effort() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("workers.json");
    let saver = StateSaver::new(
        path.clone(),
        Arc::new(|| WorkerSnapshot {
            timestamp_ms: 1,
            workers: Vec::new(),
        }),
        Duration::from_secs(2),
    );
    saver.save_sync();
    assert!(path.exists());
}
