// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::history::NoopHistory;
use strategos_core::{SequentialIdGen, WorkerHealth, WorkerStatus};

/// Build a second engine over the same persistence directory and fake mux,
/// simulating a process restart.
fn reborn(h: &Harness) -> Arc<Engine<FakeMux, strategos_core::FakeClock, SequentialIdGen>> {
    let mut config = EngineConfig::new(
        h.dir.path().to_path_buf(),
        h.dir.path().join(".strategos"),
    );
    config.restore_reminder_delay = std::time::Duration::from_millis(20);
    Engine::new(
        EngineDeps {
            mux: h.mux.clone(),
            clock: h.clock.clone(),
            id_gen: SequentialIdGen::new("r"),
            history: Box::new(NoopHistory),
        },
        config,
    )
}

#[tokio::test]
async fn restore_adopts_workers_with_live_sessions() {
    let h = harness();
    let a = h.spawn("IMPL: survivor one").await;
    let b = h
        .spawn_with(
            "TEST: survivor two",
            SpawnOptions {
                depends_on: vec![a.to_string()],
                allow_duplicate: false,
                ..SpawnOptions::default()
            },
        )
        .await;
    // b is pending (no session); only a has a live session
    h.engine.saver.save_now().await.unwrap();

    let engine2 = reborn(&h);
    let adopted = engine2.restore_worker_state().await.unwrap();
    assert_eq!(adopted, 1);

    let worker = engine2.get_worker(&a).unwrap();
    assert_eq!(worker.status, WorkerStatus::Running);
    assert_eq!(worker.label, "IMPL: survivor one");
    // The pending record had no session and is not re-adopted
    assert!(engine2.get_worker(&b).is_none());
}

#[tokio::test]
async fn restore_without_snapshot_is_a_clean_start() {
    let h = harness();
    let engine2 = reborn(&h);
    assert_eq!(engine2.restore_worker_state().await.unwrap(), 0);
}

#[tokio::test]
async fn restore_drops_workers_whose_sessions_died() {
    let h = harness();
    let a = h.spawn("IMPL: lives").await;
    let b = h.spawn("IMPL: dies").await;
    h.engine.saver.save_now().await.unwrap();

    h.mux.set_dead(&h.session_of(&b));

    let engine2 = reborn(&h);
    let adopted = engine2.restore_worker_state().await.unwrap();
    assert_eq!(adopted, 1);
    assert!(engine2.get_worker(&a).is_some());
    assert!(engine2.get_worker(&b).is_none());
}

#[tokio::test]
async fn restore_kills_zombie_sessions() {
    let h = harness();
    let a = h.spawn("IMPL: zombie").await;
    h.engine.saver.save_now().await.unwrap();

    // Session exists but cannot be captured
    let session = h.session_of(&a);
    h.mux.set_capture_fails(&session, true);

    let engine2 = reborn(&h);
    let adopted = engine2.restore_worker_state().await.unwrap();
    assert_eq!(adopted, 0);
    // The zombie was put down
    assert!(h.mux.count_calls(|c| matches!(
        c,
        MuxCall::KillSession { name } if *name == session
    )) >= 1);
}

#[tokio::test]
async fn restore_marks_bare_shell_panes_crashed() {
    let h = harness();
    let a = h.spawn("IMPL: hollow").await;
    h.engine.saver.save_now().await.unwrap();

    h.mux.set_current_command(&h.session_of(&a), "bash");

    let engine2 = reborn(&h);
    engine2.restore_worker_state().await.unwrap();
    let worker = engine2.get_worker(&a).unwrap();
    assert_eq!(worker.health, WorkerHealth::Crashed);
    assert!(worker.crash_reason.is_some());
}

#[tokio::test]
async fn restore_skips_terminal_workers() {
    let h = harness();
    let a = h.spawn("IMPL: long done").await;
    h.engine.complete_worker(&a, false).await.unwrap();
    h.engine.saver.save_now().await.unwrap();

    let engine2 = reborn(&h);
    assert_eq!(engine2.restore_worker_state().await.unwrap(), 0);
}

#[tokio::test]
async fn restore_preserves_ralph_token_and_flags() {
    let h = harness();
    let a = h
        .spawn_with(
            "IMPL: tokened",
            SpawnOptions {
                ralph_mode: true,
                auto_accept: true,
                ..SpawnOptions::default()
            },
        )
        .await;
    let token_before = h
        .engine
        .worker_clone(&a)
        .unwrap()
        .ralph_token
        .expect("ralph worker gets a token");
    h.engine.saver.save_now().await.unwrap();

    let engine2 = reborn(&h);
    engine2.restore_worker_state().await.unwrap();
    let restored = engine2.worker_clone(&a).unwrap();
    assert_eq!(restored.ralph_token.as_deref(), Some(token_before.as_str()));
    assert!(restored.auto_accept);
    assert!(restored.ralph_mode);
}

#[tokio::test]
async fn restore_removes_orphaned_context_files() {
    let h = harness();
    let a = h.spawn("IMPL: survivor").await;
    h.engine.saver.save_now().await.unwrap();

    // Plant an orphan from a previous fleet
    let rules = h.dir.path().join("demo/.claude/rules");
    std::fs::write(rules.join("strategos-worker-deadbeef.md"), "stale").unwrap();
    let tmp = h.dir.path().join("demo/tmp");
    std::fs::create_dir_all(&tmp).unwrap();
    std::fs::write(tmp.join("bulldoze-state-deadbeef.md"), "stale").unwrap();

    let engine2 = reborn(&h);
    engine2.restore_worker_state().await.unwrap();

    assert!(!rules.join("strategos-worker-deadbeef.md").exists());
    assert!(!tmp.join("bulldoze-state-deadbeef.md").exists());
    assert!(rules
        .join(format!("strategos-worker-{a}.md"))
        .exists());
}

#[tokio::test]
async fn restore_resyncs_dependency_status() {
    let h = harness();
    let a = h.spawn("IMPL: base").await;
    let b = h
        .spawn_with(
            "IMPL: dependent live",
            SpawnOptions {
                depends_on: vec![a.to_string()],
                allow_duplicate: true,
                ..SpawnOptions::default()
            },
        )
        .await;
    // Start b by completing a, then both have sessions
    h.engine.complete_worker(&a, false).await.unwrap();
    assert!(h.mux.session(&h.session_of(&b)).is_some());
    h.engine.saver.save_now().await.unwrap();

    let engine2 = reborn(&h);
    // a is completed (terminal) so only b returns
    let adopted = engine2.restore_worker_state().await.unwrap();
    assert_eq!(adopted, 1);
    let node_status = {
        let graph = engine2.graph.lock();
        graph.node(b.as_str()).map(|n| n.status)
    };
    assert_eq!(node_status, Some(crate::graph::NodeStatus::Running));
}

#[tokio::test]
async fn corrupt_snapshot_logs_and_starts_clean() {
    let h = harness();
    std::fs::create_dir_all(h.dir.path().join(".strategos")).unwrap();
    std::fs::write(
        h.dir.path().join(".strategos/workers.json"),
        "{not json at all",
    )
    .unwrap();

    let engine2 = reborn(&h);
    assert_eq!(engine2.restore_worker_state().await.unwrap(), 0);
}
