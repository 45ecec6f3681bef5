//! Dependency gating and workflow progression through the public facade.

use crate::prelude::*;
use strategos_core::WorkerStatus;
use strategos_engine::{SpawnOptions, SpawnRequest};

#[tokio::test]
async fn chain_of_three_executes_in_order() {
    let f = fixture();
    let a = f.spawn_plain("IMPL: stage a").await;
    let b = f.spawn_after("IMPL: stage b", &[&a]).await;
    let c = f.spawn_after("TEST: stage c", &[&b]).await;

    assert_eq!(f.engine.get_worker(&b).unwrap().status, WorkerStatus::Pending);
    assert_eq!(f.engine.get_worker(&c).unwrap().status, WorkerStatus::Pending);

    let started = f.engine.complete_worker(&a, false).await.unwrap();
    assert_eq!(started, vec![b.clone()]);
    assert_eq!(f.engine.get_worker(&b).unwrap().status, WorkerStatus::Running);
    assert_eq!(f.engine.get_worker(&c).unwrap().status, WorkerStatus::Pending);

    let started = f.engine.complete_worker(&b, false).await.unwrap();
    assert_eq!(started, vec![c.clone()]);
    assert_eq!(f.engine.get_worker(&c).unwrap().status, WorkerStatus::Running);
}

#[tokio::test]
async fn missing_prerequisite_is_treated_as_completed() {
    let f = fixture();
    let id = f
        .spawn(
            "IMPL: depends on the collected",
            SpawnOptions {
                depends_on: vec!["garbage-collected".to_string()],
                ..SpawnOptions::default()
            },
        )
        .await;
    assert_eq!(
        f.engine.get_worker(&id).unwrap().status,
        WorkerStatus::Running
    );
}

#[tokio::test]
async fn fan_out_starts_all_dependents_on_one_completion() {
    let f = fixture();
    let root = f.spawn_plain("IMPL: shared base").await;
    let mut dependents = Vec::new();
    for i in 0..4 {
        dependents.push(
            f.spawn_after(&format!("IMPL: branch {i}"), &[&root]).await,
        );
    }

    let started = f.engine.complete_worker(&root, false).await.unwrap();
    assert_eq!(started, dependents, "registration order preserved");
    for id in &dependents {
        assert_eq!(
            f.engine.get_worker(id).unwrap().status,
            WorkerStatus::Running
        );
    }
}

#[tokio::test]
async fn completion_triggers_exactly_once() {
    let f = fixture();
    let a = f.spawn_plain("IMPL: once").await;
    let b = f.spawn_after("TEST: after once", &[&a]).await;

    let first = f.engine.complete_worker(&a, false).await.unwrap();
    assert_eq!(first, vec![b]);
    let second = f.engine.complete_worker(&a, false).await.unwrap();
    assert!(second.is_empty());
}

#[tokio::test]
async fn duplicate_label_project_spawns_race_to_one_winner() {
    let f = fixture();
    let request = || SpawnRequest {
        project_path: "demo".to_string(),
        label: "IMPL: contested".to_string(),
        options: SpawnOptions::default(),
    };

    let (a, b) = tokio::join!(
        f.engine.spawn_worker(request()),
        f.engine.spawn_worker(request()),
    );
    let successes = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
    assert_eq!(successes, 1, "exactly one of two concurrent spawns wins");
}

#[tokio::test]
async fn dependencies_satisfied_event_fires_on_start() {
    let f = fixture();
    let a = f.spawn_plain("IMPL: base").await;
    let b = f.spawn_after("TEST: gated", &[&a]).await;

    let mut rx = f.engine.subscribe();
    f.engine.complete_worker(&a, false).await.unwrap();

    let mut saw_satisfied = false;
    let mut saw_triggered = false;
    for _ in 0..20 {
        let Ok(event) = rx.try_recv() else { break };
        if event.name == "worker:dependencies_satisfied" {
            assert_eq!(event.payload["worker_id"], b.as_str());
            saw_satisfied = true;
        }
        if event.name == "dependencies:triggered" {
            assert_eq!(event.payload["completed"], a.as_str());
            saw_triggered = true;
        }
    }
    assert!(saw_satisfied);
    assert!(saw_triggered);
}
