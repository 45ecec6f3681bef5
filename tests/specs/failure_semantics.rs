//! Failure cascade and circuit breaker behavior at the facade.

use crate::prelude::*;
use strategos_engine::{EngineError, KillOptions, SpawnOptions, SpawnRequest};

#[tokio::test]
async fn killing_a_prerequisite_fails_the_whole_chain() {
    let f = fixture();
    let a = f.spawn_plain("IMPL: base").await;
    let b = f.spawn_after("IMPL: middle", &[&a]).await;
    let c = f.spawn_after("TEST: top", &[&b]).await;

    f.engine
        .kill_worker(&a, KillOptions::auto("abandoned"))
        .await
        .unwrap();

    // The whole parked chain collapses
    assert!(f.engine.get_worker(&b).is_none());
    assert!(f.engine.get_worker(&c).is_none());
}

#[tokio::test]
async fn completed_workers_are_not_regressed_by_late_failure() {
    let f = fixture();
    let a = f.spawn_plain("IMPL: base").await;
    let b = f.spawn_after("IMPL: finished dependent", &[&a]).await;

    f.engine.complete_worker(&a, false).await.unwrap();
    f.engine.complete_worker(&b, false).await.unwrap();

    // Auto-cleanup racing the completion path must not flip b to failed
    f.engine
        .kill_worker(&a, KillOptions::auto("late cleanup"))
        .await
        .unwrap();
    assert_eq!(
        f.engine.get_worker(&b).unwrap().status,
        strategos_core::WorkerStatus::Completed
    );
}

#[tokio::test]
async fn breaker_opens_after_three_failures_and_heals_on_success() {
    let f = fixture();
    f.mux.fail_next_creates(3);
    for i in 0..3 {
        let result = f
            .engine
            .spawn_worker(SpawnRequest {
                project_path: "demo".to_string(),
                label: format!("IMPL: victim {i}"),
                options: SpawnOptions::default(),
            })
            .await;
        assert!(result.is_err());
    }
    assert!(f.engine.get_circuit_breaker_status().tripped);

    let err = f
        .engine
        .spawn_worker(SpawnRequest {
            project_path: "demo".to_string(),
            label: "IMPL: refused".to_string(),
            options: SpawnOptions::default(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::BreakerOpen));

    f.engine.reset_circuit_breaker();
    f.spawn_plain("IMPL: back in business").await;
    assert!(!f.engine.get_circuit_breaker_status().tripped);
}

#[tokio::test]
async fn error_messages_carry_no_absolute_paths() {
    let f = fixture();
    let err = f
        .engine
        .spawn_worker(SpawnRequest {
            project_path: "missing-project-dir".to_string(),
            label: "IMPL: x".to_string(),
            options: SpawnOptions::default(),
        })
        .await
        .unwrap_err();
    let message = err.user_message();
    assert!(!message.contains(f.dir.path().to_str().unwrap()));
}
