// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn sample(worker_id: &str, reason: &str) -> Checkpoint {
    Checkpoint {
        worker_id: worker_id.to_string(),
        label: "IMPL: demo".to_string(),
        project: "demo".to_string(),
        reason: reason.to_string(),
        uptime_ms: 120_000,
        task: Some("build the codec".to_string()),
        last_output: vec!["line one".to_string()],
        health_at_death: WorkerHealth::Crashed,
        relations: CheckpointRelations::default(),
        created_at: Utc::now(),
    }
}

#[test]
fn write_and_load_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let store = CheckpointStore::new(dir.path().to_path_buf());

    store.write(&sample("w1", "crash")).unwrap();

    let loaded = store.load(&WorkerId::new("w1")).unwrap();
    assert_eq!(loaded.worker_id, "w1");
    assert_eq!(loaded.reason, "crash");
    assert_eq!(loaded.health_at_death, WorkerHealth::Crashed);
}

#[test]
fn load_missing_is_none() {
    let dir = tempfile::tempdir().unwrap();
    let store = CheckpointStore::new(dir.path().to_path_buf());
    assert!(store.load(&WorkerId::new("ghost")).is_none());
}

#[test]
fn write_leaves_no_tmp_files() {
    let dir = tempfile::tempdir().unwrap();
    let store = CheckpointStore::new(dir.path().to_path_buf());
    store.write(&sample("w1", "killed")).unwrap();

    let names: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["w1.json"]);
}

#[test]
fn retention_keeps_fifty_newest() {
    let dir = tempfile::tempdir().unwrap();
    let store = CheckpointStore::new(dir.path().to_path_buf());

    for i in 0..55 {
        store.write(&sample(&format!("w{i}"), "crash")).unwrap();
        // Distinct mtimes so the prune order is deterministic
        std::thread::sleep(std::time::Duration::from_millis(2));
    }

    let count = std::fs::read_dir(dir.path()).unwrap().count();
    assert_eq!(count, 50);
    // Oldest are gone, newest survive
    assert!(store.load(&WorkerId::new("w0")).is_none());
    assert!(store.load(&WorkerId::new("w54")).is_some());
}

#[test]
fn clean_output_strips_ansi_and_bounds_lines() {
    let mut raw = String::new();
    for i in 0..80 {
        raw.push_str(&format!("\u{1b}[32mline {i}\u{1b}[0m   \n"));
    }
    let cleaned = Checkpoint::clean_output(&raw);
    assert_eq!(cleaned.len(), 50);
    assert_eq!(cleaned[0], "line 30");
    assert_eq!(cleaned[49], "line 79");
    assert!(cleaned.iter().all(|l| !l.contains('\u{1b}')));
}

#[test]
fn list_orders_newest_first() {
    let dir = tempfile::tempdir().unwrap();
    let store = CheckpointStore::new(dir.path().to_path_buf());
    store.write(&sample("old", "crash")).unwrap();
    std::thread::sleep(std::time::Duration::from_millis(5));
    store.write(&sample("new", "crash")).unwrap();

    let listed = store.list();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].worker_id, "new");
    assert_eq!(listed[1].worker_id, "old");
}
