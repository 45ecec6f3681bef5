//! Snapshot atomicity and restart restoration end to end.

use crate::prelude::*;
use strategos_core::WorkerStatus;
use strategos_engine::{Engine, EngineConfig, EngineDeps, NoopHistory, SpawnOptions};

fn restarted(f: &Fixture) -> SpecEngine {
    Engine::new(
        EngineDeps {
            mux: f.mux.clone(),
            clock: f.clock.clone(),
            id_gen: strategos_core::SequentialIdGen::new("r"),
            history: Box::new(NoopHistory),
        },
        EngineConfig::new(f.dir.path().to_path_buf(), f.dir.path().join(".strategos")),
    )
}

#[tokio::test]
async fn snapshot_is_written_atomically() {
    let f = fixture();
    f.spawn_plain("IMPL: persisted").await;
    f.engine.crash_save();

    let path = f.dir.path().join(".strategos/workers.json");
    assert!(path.exists());
    assert!(!f.dir.path().join(".strategos/workers.json.tmp").exists());

    // The file on disk is a fully valid snapshot
    let text = std::fs::read_to_string(&path).unwrap();
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["workers"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn fleet_survives_a_restart() {
    let f = fixture();
    let a = f
        .spawn(
            "IMPL: survivor",
            SpawnOptions {
                task: Some("outlive the supervisor".to_string()),
                ralph_mode: true,
                ..SpawnOptions::default()
            },
        )
        .await;
    f.engine.crash_save();

    let engine2 = restarted(&f);
    let adopted = engine2.restore_worker_state().await.unwrap();
    assert_eq!(adopted, 1);

    let worker = engine2.get_worker(&a).unwrap();
    assert_eq!(worker.status, WorkerStatus::Running);
    assert_eq!(worker.task.as_deref(), Some("outlive the supervisor"));
    assert!(worker.ralph_mode);
}

#[tokio::test]
async fn dead_sessions_do_not_come_back_as_zombies() {
    let f = fixture();
    let a = f.spawn_plain("IMPL: gone").await;
    f.engine.crash_save();
    f.mux.set_dead(&a.session_name());

    let engine2 = restarted(&f);
    assert_eq!(engine2.restore_worker_state().await.unwrap(), 0);
    assert!(engine2.get_worker(&a).is_none());
}

#[tokio::test]
async fn hand_corrupted_snapshot_never_breaks_startup() {
    let f = fixture();
    std::fs::create_dir_all(f.dir.path().join(".strategos")).unwrap();
    std::fs::write(
        f.dir.path().join(".strategos/workers.json"),
        r#"{"timestamp_ms": 1, "workers": [{"id": "../../evil", "label": "x", "working_dir": "/p", "created_at_ms": 1}]}"#,
    )
    .unwrap();

    let engine2 = restarted(&f);
    // The invalid record is skipped, not adopted
    assert_eq!(engine2.restore_worker_state().await.unwrap(), 0);
}

#[tokio::test]
async fn checkpoints_are_retained_for_dead_workers() {
    let f = fixture();
    let a = f.spawn_plain("IMPL: mortal").await;
    f.clock.advance(std::time::Duration::from_secs(6));

    let session = a.session_name();
    f.mux.set_capture_fails(&session, true);
    for _ in 0..3 {
        f.engine.capture_tick().await;
    }

    let dir = f.dir.path().join(".strategos/checkpoints");
    let names: Vec<String> = std::fs::read_dir(&dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert!(names.contains(&format!("{a}.json")));

    let text = std::fs::read_to_string(dir.join(format!("{a}.json"))).unwrap();
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["worker_id"], a.as_str());
    assert!(value["reason"].as_str().unwrap().contains("capture"));
}
