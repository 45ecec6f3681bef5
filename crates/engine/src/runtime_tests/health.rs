// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::time::Duration;
use strategos_core::{RalphStatus, WorkerHealth, WorkerStatus};

#[tokio::test]
async fn crash_pattern_writes_checkpoint_and_respawns() {
    let h = harness();
    let id = h.spawn("IMPL: crashes").await;
    h.clock.advance(Duration::from_secs(6));
    let session = h.session_of(&id);
    let mut rx = h.engine.subscribe();

    h.mux
        .set_pane(&session, "FATAL ERROR: JavaScript heap out of memory");
    h.engine.capture_tick().await;
    h.engine.health_tick().await;

    let event = loop {
        let e = rx.recv().await.unwrap();
        if e.name == "worker:crashed" {
            break e;
        }
    };
    assert!(event.payload["reason"]
        .as_str()
        .unwrap()
        .to_lowercase()
        .contains("out of memory"));

    // Forensic checkpoint on disk
    let checkpoint_dir = h.dir.path().join(".strategos/checkpoints");
    let count = std::fs::read_dir(&checkpoint_dir).unwrap().count();
    assert!(count >= 1);

    // A replacement session exists
    let creates = h
        .mux
        .count_calls(|c| matches!(c, MuxCall::NewSession { .. }));
    assert_eq!(creates, 2);
    assert!(h.engine.get_worker(&id).is_none());
}

#[tokio::test]
async fn respawn_budget_is_two_within_cooldown() {
    let h = harness();
    let mut current = h.spawn("IMPL: serial crasher").await;
    h.clock.advance(Duration::from_secs(6));

    // First two deaths respawn
    for expected_creates in [2usize, 3] {
        let session = h.session_of(&current);
        h.mux.set_capture_fails(&session, true);
        for _ in 0..3 {
            h.engine.capture_tick().await;
        }
        assert_eq!(
            h.mux
                .count_calls(|c| matches!(c, MuxCall::NewSession { .. })),
            expected_creates
        );
        // Find the replacement worker
        current = h
            .engine
            .get_workers()
            .into_iter()
            .map(|w| w.id)
            .next()
            .unwrap();
        h.clock.advance(Duration::from_secs(6));
    }

    // Third death inside the window: no further respawn, marked error+dead
    let session = h.session_of(&current);
    h.mux.set_capture_fails(&session, true);
    for _ in 0..3 {
        h.engine.capture_tick().await;
    }
    assert_eq!(
        h.mux
            .count_calls(|c| matches!(c, MuxCall::NewSession { .. })),
        3,
        "no third respawn inside the cooldown"
    );
    let worker = h.engine.get_worker(&current).unwrap();
    assert_eq!(worker.status, WorkerStatus::Error);
    assert_eq!(worker.health, WorkerHealth::Dead);
}

#[tokio::test]
async fn mid_task_death_leaves_a_respawn_suggestion() {
    let h = harness();
    let id = h
        .spawn_with(
            "IMPL: signaller",
            SpawnOptions {
                task: Some("finish the migration".to_string()),
                ralph_mode: true,
                ..SpawnOptions::default()
            },
        )
        .await;
    h.clock.advance(Duration::from_secs(6));
    h.engine.with_worker_mut(&id, |w| {
        w.ralph_status = RalphStatus::InProgress;
        w.ralph_progress = 55;
        w.ralph_current_step = Some("migrating tables".to_string());
    });

    let session = h.session_of(&id);
    h.mux.set_capture_fails(&session, true);
    for _ in 0..3 {
        h.engine.capture_tick().await;
    }

    let suggestions = h.engine.get_respawn_suggestions();
    assert!(!suggestions.is_empty());
    let s = &suggestions[0];
    assert_eq!(s.worker_id, id);
    assert_eq!(s.task, "finish the migration");
    assert_eq!(s.ralph_progress, 55);
}

#[tokio::test]
async fn protected_worker_is_never_respawned() {
    let h = harness();
    let id = h.spawn("GENERAL: irreplaceable").await;
    h.clock.advance(Duration::from_secs(20));
    let session = h.session_of(&id);
    let mut rx = h.engine.subscribe();

    h.mux.set_dead(&session);
    h.engine.health_tick().await;

    let event = loop {
        let e = rx.recv().await.unwrap();
        if e.name == "worker:general:dead" {
            break e;
        }
    };
    assert_eq!(event.payload["worker_id"], id.as_str());

    // Still present, marked dead, no replacement session
    let worker = h.engine.get_worker(&id).unwrap();
    assert_eq!(worker.health, WorkerHealth::Dead);
    assert_eq!(
        h.mux
            .count_calls(|c| matches!(c, MuxCall::NewSession { .. })),
        1
    );
}

#[tokio::test]
async fn silent_worker_is_marked_stalled() {
    let h = harness();
    let id = h.spawn("IMPL: quiet").await;
    let mut rx = h.engine.subscribe();

    h.clock.advance(Duration::from_secs(11 * 60));
    h.engine.health_tick().await;

    assert_eq!(
        h.engine.get_worker(&id).unwrap().health,
        WorkerHealth::Stalled
    );
    let event = loop {
        let e = rx.recv().await.unwrap();
        if e.name == "worker:stalled" {
            break e;
        }
    };
    assert!(event.payload["idle_ms"].as_u64().unwrap() >= 10 * 60 * 1000);
}

#[tokio::test]
async fn fresh_output_recovers_a_stalled_worker() {
    let h = harness();
    let id = h.spawn("IMPL: naps").await;
    h.clock.advance(Duration::from_secs(11 * 60));
    h.engine.health_tick().await;
    assert_eq!(
        h.engine.get_worker(&id).unwrap().health,
        WorkerHealth::Stalled
    );

    h.mux.set_pane(&h.session_of(&id), "back to work");
    h.engine.capture_tick().await;
    assert_eq!(
        h.engine.get_worker(&id).unwrap().health,
        WorkerHealth::Healthy
    );
}

#[tokio::test]
async fn ralph_worker_at_ninety_percent_with_done_step_is_promoted() {
    let h = harness();
    let id = h
        .spawn_with(
            "IMPL: nearly there",
            SpawnOptions {
                ralph_mode: true,
                task: Some("ship it".to_string()),
                ..SpawnOptions::default()
            },
        )
        .await;

    h.engine.with_worker_mut(&id, |w| {
        w.ralph_status = RalphStatus::InProgress;
        w.ralph_progress = 95;
        w.ralph_current_step = Some("everything done, wrapping up".to_string());
    });
    // Briefly idle
    h.clock.advance(Duration::from_secs(20));
    h.engine.health_tick().await;

    let worker = h.engine.get_worker(&id).unwrap();
    assert_eq!(worker.status, WorkerStatus::Completed);
    assert_eq!(worker.ralph_status, RalphStatus::Done);
}

#[tokio::test]
async fn promotion_requires_completion_keyword() {
    let h = harness();
    let id = h
        .spawn_with(
            "IMPL: still going",
            SpawnOptions {
                ralph_mode: true,
                ..SpawnOptions::default()
            },
        )
        .await;
    h.engine.with_worker_mut(&id, |w| {
        w.ralph_status = RalphStatus::InProgress;
        w.ralph_progress = 95;
        w.ralph_current_step = Some("still migrating tables".to_string());
    });
    h.clock.advance(Duration::from_secs(20));
    h.engine.health_tick().await;
    assert_eq!(
        h.engine.get_worker(&id).unwrap().status,
        WorkerStatus::Running
    );
}
