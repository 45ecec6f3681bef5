// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use strategos_core::{WorkerId, WorkerStatus};

#[tokio::test]
async fn spawn_creates_session_and_context_file() {
    let h = harness();
    let id = h.spawn("IMPL: build the codec").await;

    assert_eq!(id, WorkerId::new("w1"));
    assert!(h.mux.session(&h.session_of(&id)).is_some());

    let worker = h.engine.get_worker(&id).unwrap();
    assert_eq!(worker.status, WorkerStatus::Running);
    assert_eq!(worker.project, "demo");

    let rules = h
        .dir
        .path()
        .join("demo/.claude/rules/strategos-worker-w1.md");
    assert!(rules.exists());
}

#[tokio::test]
async fn worker_created_event_is_normalized() {
    let h = harness();
    let mut rx = h.engine.subscribe();
    let _id = h
        .spawn_with(
            "IMPL: secret check",
            SpawnOptions {
                ralph_mode: true,
                ..SpawnOptions::default()
            },
        )
        .await;

    let event = loop {
        let e = rx.recv().await.unwrap();
        if e.name == "worker:created" {
            break e;
        }
    };
    let text = event.payload.to_string();
    assert!(!text.contains("ralph_token"));
    assert!(!text.contains(h.dir.path().to_str().unwrap()));
}

#[tokio::test]
async fn duplicate_spawn_is_rejected() {
    let h = harness();
    let _first = h.spawn("IMPL: foo").await;

    let err = h
        .engine
        .spawn_worker(SpawnRequest {
            project_path: "demo".to_string(),
            label: "IMPL: foo".to_string(),
            options: SpawnOptions::default(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::DuplicateWorker(_)));

    // Same label in a different project is fine
    h.engine
        .spawn_worker(SpawnRequest {
            project_path: "other".to_string(),
            label: "IMPL: foo".to_string(),
            options: SpawnOptions::default(),
        })
        .await
        .unwrap();

    // allow_duplicate overrides
    h.engine
        .spawn_worker(SpawnRequest {
            project_path: "demo".to_string(),
            label: "IMPL: foo".to_string(),
            options: SpawnOptions {
                allow_duplicate: true,
                ..SpawnOptions::default()
            },
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn capacity_limit_counts_live_and_pending() {
    let mut h = harness();
    // Rebuild with a tiny cap
    let mut config = EngineConfig::new(
        h.dir.path().to_path_buf(),
        h.dir.path().join(".strategos"),
    );
    config.max_workers = 2;
    config.initial_message_delay = std::time::Duration::from_millis(10);
    h.engine = Engine::new(
        EngineDeps {
            mux: h.mux.clone(),
            clock: h.clock.clone(),
            id_gen: strategos_core::SequentialIdGen::new("w"),
            history: Box::new(crate::history::NoopHistory),
        },
        config,
    );

    h.spawn("IMPL: one").await;
    h.spawn("IMPL: two").await;
    let err = h
        .engine
        .spawn_worker(SpawnRequest {
            project_path: "demo".to_string(),
            label: "IMPL: three".to_string(),
            options: SpawnOptions::default(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::CapacityExceeded(2)));
}

#[tokio::test]
async fn breaker_trips_after_three_create_failures() {
    let h = harness();
    h.mux.fail_next_creates(3);

    for i in 0..3 {
        let err = h
            .engine
            .spawn_worker(SpawnRequest {
                project_path: "demo".to_string(),
                label: format!("IMPL: attempt {i}"),
                options: SpawnOptions::default(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Mux(_)), "attempt {i}: {err}");
    }
    assert!(h.engine.get_circuit_breaker_status().tripped);

    // Tripped breaker fails fast without touching the multiplexer
    let creates_before = h
        .mux
        .count_calls(|c| matches!(c, MuxCall::NewSession { .. }));
    let err = h
        .engine
        .spawn_worker(SpawnRequest {
            project_path: "demo".to_string(),
            label: "IMPL: blocked".to_string(),
            options: SpawnOptions::default(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::BreakerOpen));
    assert_eq!(
        h.mux.count_calls(|c| matches!(c, MuxCall::NewSession { .. })),
        creates_before
    );

    // Manual reset re-opens the path and a success keeps it closed
    h.engine.reset_circuit_breaker();
    h.spawn("IMPL: recovered").await;
    assert!(!h.engine.get_circuit_breaker_status().tripped);
}

#[tokio::test]
async fn failed_spawn_unwinds_context_and_graph() {
    let h = harness();
    h.mux.fail_next_creates(1);
    let _ = h
        .engine
        .spawn_worker(SpawnRequest {
            project_path: "demo".to_string(),
            label: "IMPL: doomed".to_string(),
            options: SpawnOptions::default(),
        })
        .await
        .unwrap_err();

    // No worker, no context file, key free for a retry
    assert!(h.engine.get_workers().is_empty());
    let rules_dir = h.dir.path().join("demo/.claude/rules");
    let leftovers = std::fs::read_dir(&rules_dir)
        .map(|entries| entries.count())
        .unwrap_or(0);
    assert_eq!(leftovers, 0);
    h.spawn("IMPL: doomed").await;
}

#[yare::parameterized(
    traversal = { "../outside" },
    absolute  = { "/etc" },
)]
fn path_escape_is_rejected(path: &str) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let h = harness();
        let err = h
            .engine
            .spawn_worker(SpawnRequest {
                project_path: path.to_string(),
                label: "IMPL: escape".to_string(),
                options: SpawnOptions::default(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::PathOutsideRoot(_)), "{path}: {err}");
    });
}

#[tokio::test]
async fn missing_project_directory_is_validation_error() {
    let h = harness();
    let err = h
        .engine
        .spawn_worker(SpawnRequest {
            project_path: "never-created".to_string(),
            label: "IMPL: x".to_string(),
            options: SpawnOptions::default(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

#[tokio::test]
async fn dependency_gated_spawn_parks_pending_and_starts_on_completion() {
    let h = harness();
    let dep = h.spawn("IMPL: prerequisite").await;

    let gated = h
        .spawn_with(
            "TEST: gated",
            SpawnOptions {
                depends_on: vec![dep.to_string()],
                ..SpawnOptions::default()
            },
        )
        .await;

    // Parked: visible, pending, no session
    let worker = h.engine.get_worker(&gated).unwrap();
    assert_eq!(worker.status, WorkerStatus::Pending);
    assert!(h.mux.session(&h.session_of(&gated)).is_none());

    let started = h.engine.complete_worker(&dep, false).await.unwrap();
    assert_eq!(started, vec![gated.clone()]);

    let worker = h.engine.get_worker(&gated).unwrap();
    assert_eq!(worker.status, WorkerStatus::Running);
    assert!(h.mux.session(&h.session_of(&gated)).is_some());
}

#[tokio::test]
async fn unknown_dependency_spawns_immediately() {
    let h = harness();
    let id = h
        .spawn_with(
            "IMPL: orphan deps",
            SpawnOptions {
                depends_on: vec!["long-gone".to_string()],
                ..SpawnOptions::default()
            },
        )
        .await;
    assert_eq!(
        h.engine.get_worker(&id).unwrap().status,
        WorkerStatus::Running
    );
}

#[tokio::test]
async fn parent_child_links_are_deduplicated() {
    let h = harness();
    let parent = h.spawn("CAPTAIN: squad lead").await;

    let child_a = h
        .spawn_with(
            "IMPL: first",
            SpawnOptions {
                parent_worker_id: Some(parent.to_string()),
                ..SpawnOptions::default()
            },
        )
        .await;
    let child_b = h
        .spawn_with(
            "IMPL: second",
            SpawnOptions {
                parent_worker_id: Some(parent.to_string()),
                ..SpawnOptions::default()
            },
        )
        .await;

    let parent_worker = h.engine.get_worker(&parent).unwrap();
    assert_eq!(parent_worker.child_worker_ids, vec![child_a, child_b]);
    assert_eq!(parent_worker.delegation_metrics.spawns_issued, 2);
}

#[tokio::test]
async fn vanished_parent_is_cleared_with_warning() {
    let h = harness();
    let id = h
        .spawn_with(
            "IMPL: orphan",
            SpawnOptions {
                parent_worker_id: Some("no-such-parent".to_string()),
                ..SpawnOptions::default()
            },
        )
        .await;
    let worker = h.engine.get_worker(&id).unwrap();
    assert!(worker.parent_worker_id.is_none());
    assert!(worker.parent_label.is_none());
}

#[tokio::test]
async fn initial_task_message_is_delivered_after_delay() {
    let h = harness();
    let id = h
        .spawn_with(
            "IMPL: messaged",
            SpawnOptions {
                task: Some("wire the <parser> & engine".to_string()),
                ..SpawnOptions::default()
            },
        )
        .await;

    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    let session = h.session_of(&id);
    let sent = h.mux.calls().into_iter().find_map(|c| match c {
        MuxCall::SendLiteral { name, text } if name == session => Some(text),
        _ => None,
    });
    let sent = sent.expect("initial message should have been typed");
    assert!(sent.contains("<mission>"));
    // Task content is escaped
    assert!(sent.contains("&lt;parser&gt; &amp; engine"));
}

#[tokio::test]
async fn general_without_task_gets_awaiting_orders() {
    let h = harness();
    let id = h.spawn("GENERAL: overwatch").await;
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    let session = h.session_of(&id);
    let sent = h.mux.calls().into_iter().find_map(|c| match c {
        MuxCall::SendLiteral { name, text } if name == session => Some(text),
        _ => None,
    });
    assert!(sent.unwrap().contains("Awaiting orders"));
}

#[tokio::test]
async fn read_only_roles_spawn_with_restricted_tools() {
    let h = harness();
    let reviewer = h.spawn("REVIEW: audit the diff").await;
    let implementer = h.spawn("IMPL: write the diff").await;

    let review_cmd = h.mux.session(&h.session_of(&reviewer)).unwrap().cmd;
    assert!(review_cmd.contains("--disallowedTools"));
    let impl_cmd = h.mux.session(&h.session_of(&implementer)).unwrap().cmd;
    assert_eq!(impl_cmd, "claude");
}
