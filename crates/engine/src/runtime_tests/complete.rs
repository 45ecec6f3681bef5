// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use strategos_core::{EmitAction, OnCompleteAction, WorkerStatus};

#[tokio::test]
async fn completion_is_idempotent() {
    let h = harness();
    let base = h.spawn("IMPL: base").await;
    let dependent = h
        .spawn_with(
            "TEST: waits",
            SpawnOptions {
                depends_on: vec![base.to_string()],
                ..SpawnOptions::default()
            },
        )
        .await;

    let first = h.engine.complete_worker(&base, false).await.unwrap();
    assert_eq!(first, vec![dependent]);

    let second = h.engine.complete_worker(&base, false).await.unwrap();
    assert!(second.is_empty(), "second completion triggers nothing");
}

#[tokio::test]
async fn completion_from_pending_is_rejected() {
    let h = harness();
    let base = h.spawn("IMPL: base").await;
    let pending = h
        .spawn_with(
            "TEST: parked",
            SpawnOptions {
                depends_on: vec![base.to_string()],
                ..SpawnOptions::default()
            },
        )
        .await;

    let err = h.engine.complete_worker(&pending, false).await.unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

#[tokio::test]
async fn diamond_dependency_starts_join_node_once() {
    let h = harness();
    let root = h.spawn("IMPL: root").await;
    let left = h
        .spawn_with(
            "IMPL: left",
            SpawnOptions {
                depends_on: vec![root.to_string()],
                ..SpawnOptions::default()
            },
        )
        .await;
    let right = h
        .spawn_with(
            "IMPL: right",
            SpawnOptions {
                depends_on: vec![root.to_string()],
                ..SpawnOptions::default()
            },
        )
        .await;
    let join = h
        .spawn_with(
            "TEST: join",
            SpawnOptions {
                depends_on: vec![left.to_string(), right.to_string()],
                ..SpawnOptions::default()
            },
        )
        .await;

    let started = h.engine.complete_worker(&root, false).await.unwrap();
    assert_eq!(started.len(), 2);

    let started = h.engine.complete_worker(&left, false).await.unwrap();
    assert!(started.is_empty(), "join waits for both branches");
    let started = h.engine.complete_worker(&right, false).await.unwrap();
    assert_eq!(started, vec![join.clone()]);
    assert_eq!(
        h.engine.get_worker(&join).unwrap().status,
        WorkerStatus::Running
    );
}

#[tokio::test]
async fn on_complete_emit_publishes_custom_event() {
    let h = harness();
    let id = h
        .spawn_with(
            "IMPL: announcer",
            SpawnOptions {
                on_complete: Some(OnCompleteAction::Emit(EmitAction {
                    event: "custom:milestone".to_string(),
                    payload: serde_json::json!({"phase": 1, "apiKey": "leaked?"}),
                })),
                ..SpawnOptions::default()
            },
        )
        .await;
    let mut rx = h.engine.subscribe();

    h.engine.complete_worker(&id, false).await.unwrap();

    let event = loop {
        let e = rx.recv().await.unwrap();
        if e.name == "custom:milestone" {
            break e;
        }
    };
    assert_eq!(event.payload["phase"], 1);
    // Sensitive keys are stripped at publication
    assert!(event.payload.get("apiKey").is_none());
}

#[tokio::test]
async fn on_complete_emit_with_bad_prefix_is_rejected() {
    let h = harness();
    let id = h
        .spawn_with(
            "IMPL: forger",
            SpawnOptions {
                on_complete: Some(OnCompleteAction::Emit(EmitAction {
                    event: "engine:shutdown".to_string(),
                    payload: serde_json::Value::Null,
                })),
                ..SpawnOptions::default()
            },
        )
        .await;
    let mut rx = h.engine.subscribe();

    h.engine.complete_worker(&id, false).await.unwrap();

    // The completion event arrives; the forged one never does
    loop {
        let e = rx.recv().await.unwrap();
        assert_ne!(e.name, "engine:shutdown");
        if e.name == "worker:completed" {
            break;
        }
    }
}

#[tokio::test]
async fn on_complete_spawn_creates_follow_up_worker() {
    let h = harness();
    let id = h
        .spawn_with(
            "IMPL: stage one",
            SpawnOptions {
                on_complete: Some(OnCompleteAction::Spawn(strategos_core::SpawnAction {
                    project_path: "demo".to_string(),
                    label: "TEST: stage two".to_string(),
                    task: Some("verify stage one".to_string()),
                    auto_accept: false,
                    ralph_mode: false,
                    bulldoze_mode: false,
                })),
                ..SpawnOptions::default()
            },
        )
        .await;

    h.engine.complete_worker(&id, false).await.unwrap();

    let follow_up = h
        .engine
        .get_workers()
        .into_iter()
        .find(|w| w.label == "TEST: stage two");
    assert!(follow_up.is_some());
}

#[tokio::test]
async fn on_complete_spawn_outside_root_is_refused() {
    let h = harness();
    let id = h
        .spawn_with(
            "IMPL: escape artist",
            SpawnOptions {
                on_complete: Some(OnCompleteAction::Spawn(strategos_core::SpawnAction {
                    project_path: "../outside".to_string(),
                    label: "IMPL: escaped".to_string(),
                    task: None,
                    auto_accept: false,
                    ralph_mode: false,
                    bulldoze_mode: false,
                })),
                ..SpawnOptions::default()
            },
        )
        .await;

    h.engine.complete_worker(&id, false).await.unwrap();
    assert!(h
        .engine
        .get_workers()
        .into_iter()
        .all(|w| w.label != "IMPL: escaped"));
}

#[tokio::test]
async fn auto_cleanup_kills_after_delay_but_not_before() {
    let h = harness();
    let id = h.spawn("IMPL: ephemeral").await;

    h.engine.complete_worker(&id, true).await.unwrap();
    // Immediately after completion the worker is still present
    assert_eq!(
        h.engine.get_worker(&id).unwrap().status,
        WorkerStatus::Completed
    );

    // After the (test-shortened) delay it is gone
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;
    assert!(h.engine.get_worker(&id).is_none());
}

#[tokio::test]
async fn auto_cleanup_of_completed_worker_spares_running_dependents() {
    let h = harness();
    let a = h.spawn("IMPL: base").await;
    let b = h
        .spawn_with(
            "TEST: dependent",
            SpawnOptions {
                depends_on: vec![a.to_string()],
                ..SpawnOptions::default()
            },
        )
        .await;

    // Completion starts b and schedules a's cleanup kill
    h.engine.complete_worker(&a, true).await.unwrap();
    assert_eq!(
        h.engine.get_worker(&b).unwrap().status,
        WorkerStatus::Running
    );

    // Wait out the (test-shortened) auto-cleanup: a is gone, b is untouched
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;
    assert!(h.engine.get_worker(&a).is_none());
    assert_eq!(
        h.engine.get_worker(&b).unwrap().status,
        WorkerStatus::Running,
        "cleanup of a completed prerequisite must not fail its dependents"
    );
}

#[tokio::test]
async fn completed_chain_survives_prerequisite_cleanup() {
    let h = harness();
    let a = h.spawn("IMPL: stage a").await;
    let b = h
        .spawn_with(
            "IMPL: stage b",
            SpawnOptions {
                depends_on: vec![a.to_string()],
                ..SpawnOptions::default()
            },
        )
        .await;
    let c = h
        .spawn_with(
            "TEST: stage c",
            SpawnOptions {
                depends_on: vec![b.to_string()],
                ..SpawnOptions::default()
            },
        )
        .await;

    h.engine.complete_worker(&a, true).await.unwrap();
    // a's auto-cleanup fires while c is still parked behind b
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;
    assert!(h.engine.get_worker(&a).is_none());
    assert_eq!(
        h.engine.get_worker(&c).unwrap().status,
        WorkerStatus::Pending,
        "a parked dependent must survive cleanup of its completed ancestor"
    );

    // The chain still progresses normally
    let started = h.engine.complete_worker(&b, false).await.unwrap();
    assert_eq!(started, vec![c.clone()]);
    assert_eq!(
        h.engine.get_worker(&c).unwrap().status,
        WorkerStatus::Running
    );
}

#[tokio::test]
async fn auto_cleanup_never_touches_protected_workers() {
    let h = harness();
    let id = h.spawn("GENERAL: finishes a task").await;
    h.engine.complete_worker(&id, true).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;
    assert!(h.engine.get_worker(&id).is_some());
}
