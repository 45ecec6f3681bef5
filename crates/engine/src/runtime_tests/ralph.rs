// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::runtime::ralph::RalphSignal;
use strategos_core::{RalphStatus, WorkerStatus};

async fn ralph_worker(h: &Harness) -> (strategos_core::WorkerId, String) {
    let id = h
        .spawn_with(
            "IMPL: signaller",
            SpawnOptions {
                ralph_mode: true,
                task: Some("do the thing".to_string()),
                ..SpawnOptions::default()
            },
        )
        .await;
    let token = h.engine.worker_clone(&id).unwrap().ralph_token.unwrap();
    (id, token)
}

fn signal(token: &str, status: RalphStatus) -> RalphSignal {
    RalphSignal {
        token: token.to_string(),
        status,
        progress: None,
        current_step: None,
        learnings: Vec::new(),
        outputs: None,
        artifacts: Vec::new(),
    }
}

#[tokio::test]
async fn in_progress_signal_updates_progress_fields() {
    let h = harness();
    let (id, token) = ralph_worker(&h).await;

    let mut s = signal(&token, RalphStatus::InProgress);
    s.progress = Some(40);
    s.current_step = Some("wiring the parser".to_string());
    s.learnings = vec!["fixtures are stale".to_string()];
    s.outputs = Some(serde_json::json!({"notes": "ok"}));

    let updated = h.engine.ralph_signal(&id, s).await.unwrap();
    assert_eq!(updated.ralph_status, RalphStatus::InProgress);
    assert_eq!(updated.ralph_progress, 40);
    assert_eq!(updated.ralph_current_step.as_deref(), Some("wiring the parser"));
    assert_eq!(updated.ralph_learnings, vec!["fixtures are stale"]);
    assert_eq!(updated.ralph_signal_count, 1);
}

#[tokio::test]
async fn wrong_token_is_rejected() {
    let h = harness();
    let (id, _token) = ralph_worker(&h).await;
    let err = h
        .engine
        .ralph_signal(&id, signal("forged-token", RalphStatus::InProgress))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
    assert_eq!(h.engine.get_worker(&id).unwrap().ralph_signal_count, 0);
}

#[tokio::test]
async fn signal_to_non_ralph_worker_is_rejected() {
    let h = harness();
    let id = h.spawn("IMPL: ordinary").await;
    let err = h
        .engine
        .ralph_signal(&id, signal("anything", RalphStatus::Done))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

#[tokio::test]
async fn done_signal_runs_the_full_done_path() {
    let h = harness();
    let (id, token) = ralph_worker(&h).await;
    let dependent = h
        .spawn_with(
            "TEST: after signaller",
            SpawnOptions {
                depends_on: vec![id.to_string()],
                ..SpawnOptions::default()
            },
        )
        .await;

    let updated = h
        .engine
        .ralph_signal(&id, signal(&token, RalphStatus::Done))
        .await
        .unwrap();
    assert_eq!(updated.status, WorkerStatus::Completed);
    assert_eq!(updated.ralph_progress, 100);

    // Dependents started through the same completion path
    assert_eq!(
        h.engine.get_worker(&dependent).unwrap().status,
        WorkerStatus::Running
    );
}

#[tokio::test]
async fn blocked_signal_notifies_parent() {
    let h = harness();
    let parent = h.spawn("CAPTAIN: supervisor").await;
    let id = h
        .spawn_with(
            "IMPL: stuck",
            SpawnOptions {
                ralph_mode: true,
                parent_worker_id: Some(parent.to_string()),
                ..SpawnOptions::default()
            },
        )
        .await;
    let token = h.engine.worker_clone(&id).unwrap().ralph_token.unwrap();

    h.engine
        .ralph_signal(&id, signal(&token, RalphStatus::Blocked))
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    let parent_session = h.session_of(&parent);
    let notified = h.mux.calls().into_iter().any(|c| {
        matches!(c, MuxCall::SendLiteral { name, text }
            if name == parent_session && text.contains("blocked"))
    });
    assert!(notified, "parent should hear about the blockage");
}

#[tokio::test]
async fn outputs_accept_object_and_string_shapes() {
    let h = harness();
    let (id, token) = ralph_worker(&h).await;

    let mut s = signal(&token, RalphStatus::InProgress);
    s.outputs = Some(serde_json::json!("plain text report"));
    h.engine.ralph_signal(&id, s).await.unwrap();
    assert!(h
        .engine
        .get_worker(&id)
        .unwrap()
        .ralph_outputs
        .unwrap()
        .is_string());

    let mut s = signal(&token, RalphStatus::InProgress);
    s.outputs = Some(serde_json::json!({"k": 1}));
    h.engine.ralph_signal(&id, s).await.unwrap();
    assert!(h
        .engine
        .get_worker(&id)
        .unwrap()
        .ralph_outputs
        .unwrap()
        .is_object());
}
