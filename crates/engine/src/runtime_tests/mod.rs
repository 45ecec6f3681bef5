// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runtime test harness: a real engine over the fake multiplexer and clock.

mod cleanup;
mod complete;
mod health;
mod kill;
mod output;
mod queue;
mod ralph;
mod restore;
mod spawn;

use super::*;
use crate::history::NoopHistory;
use std::time::Duration;
use strategos_adapters::{FakeMux, MuxCall};
use strategos_core::{FakeClock, SequentialIdGen};

pub(crate) struct Harness {
    pub engine: Arc<Engine<FakeMux, FakeClock, SequentialIdGen>>,
    pub mux: FakeMux,
    pub clock: FakeClock,
    pub dir: tempfile::TempDir,
}

pub(crate) fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("demo")).unwrap();
    std::fs::create_dir_all(dir.path().join("other")).unwrap();

    let mut config = EngineConfig::new(dir.path().to_path_buf(), dir.path().join(".strategos"));
    config.initial_message_delay = Duration::from_millis(10);
    config.auto_cleanup_delay = Duration::from_millis(50);
    config.queue_send_spacing = Duration::from_millis(5);
    config.ralph_reminder_delay = Duration::from_millis(30);
    config.restore_reminder_delay = Duration::from_millis(20);
    config.save_debounce = Duration::from_millis(20);

    let mux = FakeMux::new();
    let clock = FakeClock::new();
    let engine = Engine::new(
        EngineDeps {
            mux: mux.clone(),
            clock: clock.clone(),
            id_gen: SequentialIdGen::new("w"),
            history: Box::new(NoopHistory),
        },
        config,
    );
    Harness {
        engine,
        mux,
        clock,
        dir,
    }
}

impl Harness {
    pub(crate) async fn spawn(&self, label: &str) -> strategos_core::WorkerId {
        self.spawn_with(label, SpawnOptions::default()).await
    }

    pub(crate) async fn spawn_with(
        &self,
        label: &str,
        options: SpawnOptions,
    ) -> strategos_core::WorkerId {
        let worker = self
            .engine
            .spawn_worker(SpawnRequest {
                project_path: "demo".to_string(),
                label: label.to_string(),
                options,
            })
            .await
            .unwrap();
        worker.id
    }

    pub(crate) fn session_of(&self, id: &strategos_core::WorkerId) -> String {
        id.session_name()
    }

    pub(crate) fn enter_count(&self, id: &strategos_core::WorkerId) -> usize {
        let session = self.session_of(id);
        self.mux.count_calls(|c| {
            matches!(c, MuxCall::SendKey { name, key } if *name == session && key == "Enter")
        })
    }
}

#[tokio::test]
async fn engine_construction_has_empty_state() {
    let h = harness();
    assert!(h.engine.get_workers().is_empty());
    assert!(h.engine.get_activity_log(10).is_empty());
    assert!(h.engine.get_respawn_suggestions().is_empty());
    assert!(!h.engine.get_circuit_breaker_status().tripped);
    let stats = h.engine.get_resource_stats();
    assert_eq!(stats.live_workers, 0);
    assert_eq!(stats.pending_workers, 0);
}

#[tokio::test]
async fn update_worker_settings_toggles_flags() {
    let h = harness();
    let id = h.spawn("IMPL: toggle me").await;

    let updated = h
        .engine
        .update_worker_settings(
            &id,
            WorkerSettings {
                auto_accept: Some(true),
                bulldoze_mode: Some(true),
                auto_continue: Some(true),
            },
        )
        .unwrap();
    assert!(updated.auto_accept);
    assert!(updated.bulldoze_mode);
    assert!(updated.auto_continue);

    let updated = h
        .engine
        .update_worker_settings(
            &id,
            WorkerSettings {
                bulldoze_mode: Some(false),
                ..WorkerSettings::default()
            },
        )
        .unwrap();
    assert!(!updated.bulldoze_mode);
    // The untouched flags survive
    assert!(updated.auto_accept);
}

#[tokio::test]
async fn update_worker_label_changes_role() {
    let h = harness();
    let id = h.spawn("IMPL: old role").await;
    let updated = h
        .engine
        .update_worker_label(&id, "REVIEW: new role".to_string())
        .await
        .unwrap();
    assert_eq!(updated.label, "REVIEW: new role");

    let rules = h
        .dir
        .path()
        .join("demo/.claude/rules")
        .join(format!("strategos-worker-{id}.md"));
    let content = std::fs::read_to_string(rules).unwrap();
    assert!(content.contains("Code reviewer"));
}

#[tokio::test]
async fn resize_rejects_unreasonable_sizes() {
    let h = harness();
    let id = h.spawn("IMPL: x").await;
    assert!(h.engine.resize_worker_terminal(&id, 0, 50).await.is_err());
    assert!(h.engine.resize_worker_terminal(&id, 5000, 50).await.is_err());
    h.engine.resize_worker_terminal(&id, 120, 40).await.unwrap();
    assert_eq!(
        h.mux.count_calls(|c| matches!(c, MuxCall::ResizeWindow { .. })),
        1
    );
}
