// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use strategos_core::{WorkerId, WorkerStatus};

#[tokio::test]
async fn kill_unknown_worker_is_idempotent() {
    let h = harness();
    let killed = h
        .engine
        .kill_worker(&WorkerId::new("ghost"), KillOptions::auto("test"))
        .await
        .unwrap();
    assert!(!killed);
}

#[tokio::test]
async fn kill_removes_worker_session_and_context() {
    let h = harness();
    let id = h.spawn("IMPL: doomed").await;
    let session = h.session_of(&id);

    let killed = h
        .engine
        .kill_worker(&id, KillOptions::auto("operator request"))
        .await
        .unwrap();
    assert!(killed);

    assert!(h.engine.get_worker(&id).is_none());
    assert!(!h.mux.session(&session).unwrap().alive);
    assert!(!h
        .dir
        .path()
        .join("demo/.claude/rules")
        .join(format!("strategos-worker-{id}.md"))
        .exists());

    // Kill again: idempotent
    let killed = h
        .engine
        .kill_worker(&id, KillOptions::auto("again"))
        .await
        .unwrap();
    assert!(!killed);
}

#[tokio::test]
async fn protected_worker_requires_force() {
    let h = harness();
    let id = h.spawn("GENERAL: untouchable").await;
    let mut rx = h.engine.subscribe();

    let err = h
        .engine
        .kill_worker(&id, KillOptions::auto("cleanup"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::KillBlocked(_)));
    let event = loop {
        let e = rx.recv().await.unwrap();
        if e.name == "worker:kill:blocked" {
            break e;
        }
    };
    assert_eq!(event.payload["worker_id"], id.as_str());
    assert!(h.engine.get_worker(&id).is_some());

    let killed = h
        .engine
        .kill_worker(&id, KillOptions::forced("operator override"))
        .await
        .unwrap();
    assert!(killed);
    assert!(h.engine.get_worker(&id).is_none());
}

#[tokio::test]
async fn worker_initiated_kill_requires_strict_ancestry() {
    let h = harness();
    let general = h.spawn("GENERAL: top").await;
    let captain = h
        .spawn_with(
            "CAPTAIN: middle",
            SpawnOptions {
                parent_worker_id: Some(general.to_string()),
                ..SpawnOptions::default()
            },
        )
        .await;
    let soldier = h
        .spawn_with(
            "IMPL: leaf",
            SpawnOptions {
                parent_worker_id: Some(captain.to_string()),
                ..SpawnOptions::default()
            },
        )
        .await;
    let bystander = h.spawn("IMPL: unrelated").await;

    // A sibling cannot kill
    let err = h
        .engine
        .kill_worker(
            &soldier,
            KillOptions {
                caller_worker_id: Some(bystander.clone()),
                reason: "rude".into(),
                force: false,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::KillBlocked(_)));

    // A child cannot kill its parent
    let err = h
        .engine
        .kill_worker(
            &captain,
            KillOptions {
                caller_worker_id: Some(soldier.clone()),
                reason: "mutiny".into(),
                force: false,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::KillBlocked(_)));

    // Self-kill is blocked
    let err = h
        .engine
        .kill_worker(
            &soldier,
            KillOptions {
                caller_worker_id: Some(soldier.clone()),
                reason: "despair".into(),
                force: false,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::KillBlocked(_)));

    // A grandparent may kill transitively
    let killed = h
        .engine
        .kill_worker(
            &soldier,
            KillOptions {
                caller_worker_id: Some(general.clone()),
                reason: "stand down".into(),
                force: false,
            },
        )
        .await
        .unwrap();
    assert!(killed);
}

#[tokio::test]
async fn kill_reparents_children_to_grandparent() {
    let h = harness();
    let general = h.spawn("GENERAL: top").await;
    let captain = h
        .spawn_with(
            "CAPTAIN: middle",
            SpawnOptions {
                parent_worker_id: Some(general.to_string()),
                ..SpawnOptions::default()
            },
        )
        .await;
    let soldier = h
        .spawn_with(
            "IMPL: leaf",
            SpawnOptions {
                parent_worker_id: Some(captain.to_string()),
                ..SpawnOptions::default()
            },
        )
        .await;

    h.engine
        .kill_worker(&captain, KillOptions::auto("restructure"))
        .await
        .unwrap();

    let soldier_worker = h.engine.get_worker(&soldier).unwrap();
    assert_eq!(soldier_worker.parent_worker_id, Some(general.clone()));

    let general_worker = h.engine.get_worker(&general).unwrap();
    assert!(general_worker.child_worker_ids.contains(&soldier));
    // The dead captain moved to history
    assert!(general_worker.child_worker_history.contains(&captain));
    assert!(!general_worker.child_worker_ids.contains(&captain));
}

#[tokio::test]
async fn teardown_cascades_failure_to_dependents() {
    let h = harness();
    let base = h.spawn("IMPL: foundation").await;
    let dependent = h
        .spawn_with(
            "TEST: built on top",
            SpawnOptions {
                depends_on: vec![base.to_string()],
                ..SpawnOptions::default()
            },
        )
        .await;
    assert_eq!(
        h.engine.get_worker(&dependent).unwrap().status,
        WorkerStatus::Pending
    );

    h.engine
        .kill_worker(&base, KillOptions::auto("abandoned"))
        .await
        .unwrap();

    // The parked dependent dies with its prerequisite
    assert!(h.engine.get_worker(&dependent).is_none());
}

#[tokio::test]
async fn kill_pending_worker_cancels_without_session() {
    let h = harness();
    let base = h.spawn("IMPL: foundation").await;
    let pending = h
        .spawn_with(
            "TEST: parked",
            SpawnOptions {
                depends_on: vec![base.to_string()],
                ..SpawnOptions::default()
            },
        )
        .await;

    let sessions_before = h
        .mux
        .count_calls(|c| matches!(c, MuxCall::KillSession { .. }));
    let killed = h
        .engine
        .kill_worker(&pending, KillOptions::auto("changed my mind"))
        .await
        .unwrap();
    assert!(killed);
    assert!(h.engine.get_worker(&pending).is_none());
    // No session ever existed, so none was killed
    assert_eq!(
        h.mux
            .count_calls(|c| matches!(c, MuxCall::KillSession { .. })),
        sessions_before
    );
}

#[tokio::test]
async fn dismiss_reports_uncommitted_work_best_effort() {
    let h = harness();
    let id = h.spawn("IMPL: dismissible").await;
    // demo is not a git repository: the git probe fails, dismissal proceeds
    let killed = h.engine.dismiss_worker(&id).await.unwrap();
    assert!(killed);
    assert!(h.engine.get_worker(&id).is_none());
}

#[tokio::test]
async fn bulldoze_state_file_is_cleared_on_teardown() {
    let h = harness();
    let id = h
        .spawn_with(
            "IMPL: bulldozer",
            SpawnOptions {
                bulldoze_mode: true,
                ..SpawnOptions::default()
            },
        )
        .await;
    let state_path = crate::bulldoze::BulldozeState::path_for(&h.dir.path().join("demo"), &id);
    crate::bulldoze::BulldozeState::default()
        .save(&state_path)
        .unwrap();

    h.engine
        .kill_worker(&id, KillOptions::auto("done"))
        .await
        .unwrap();
    assert!(!state_path.exists());
}
