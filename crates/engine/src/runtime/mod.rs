// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Engine facade: the API boundary talks to this and nothing else.
//!
//! One `Engine` value owns every registry, the dependency graph, the three
//! periodic loops (capture, health, cleanup), and persistence. The facade is
//! split across focused impl files: spawn, complete, kill, queue, output,
//! bulldoze, health, cleanup, headless, restore.

mod bulldoze;
mod cleanup;
mod complete;
mod headless;
mod health;
mod kill;
mod output;
mod queue;
pub mod ralph;
mod restore;
mod spawn;

pub use headless::{BatchResult, HeadlessOptions};
pub use kill::KillOptions;
pub use ralph::RalphSignal;
pub use spawn::{SpawnOptions, SpawnRequest};

use crate::context::ContextWriter;
use crate::error::EngineError;
use crate::events::Broadcaster;
use crate::graph::DependencyGraph;
use crate::history::HistorySink;
use crate::state::{Registries, ResourceStats};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use strategos_adapters::{GitQuery, MuxAdapter, WebhookDispatcher};
use strategos_core::{
    ActivityEntry, BreakerStatus, Clock, EngineEvent, IdGen, NormalizedWorker, OutboundEvent,
    RespawnSuggestion, Worker, WorkerId,
};
use strategos_storage::{CheckpointStore, PersistedWorker, StateSaver, WorkerSnapshot};
use tokio::sync::broadcast;

/// Engine path and tuning configuration.
///
/// The intervals are configuration so tests can compress time; production
/// uses the defaults.
#[derive(Clone)]
pub struct EngineConfig {
    /// Boundary for every worker working directory (`THEA_ROOT`).
    pub project_root: PathBuf,
    /// Where `workers.json` and `checkpoints/` live.
    pub persistence_dir: PathBuf,
    /// Base URL quoted in generated context files.
    pub api_base: String,
    /// Default backend for new workers.
    pub backend: strategos_core::Backend,
    pub capture_interval: Duration,
    pub health_interval: Duration,
    pub cleanup_interval: Duration,
    pub save_debounce: Duration,
    pub initial_message_delay: Duration,
    pub ralph_reminder_delay: Duration,
    pub restore_reminder_delay: Duration,
    pub auto_cleanup_delay: Duration,
    pub queue_send_spacing: Duration,
    pub max_workers: usize,
}

impl EngineConfig {
    pub fn new(project_root: PathBuf, persistence_dir: PathBuf) -> Self {
        Self {
            project_root,
            persistence_dir,
            api_base: "http://localhost:4131".to_string(),
            backend: strategos_core::Backend::Claude,
            capture_interval: Duration::from_secs(5),
            health_interval: Duration::from_secs(10),
            cleanup_interval: Duration::from_secs(60),
            save_debounce: Duration::from_secs(2),
            initial_message_delay: Duration::from_secs(3),
            ralph_reminder_delay: Duration::from_secs(60),
            restore_reminder_delay: Duration::from_secs(30),
            auto_cleanup_delay: Duration::from_secs(30),
            queue_send_spacing: Duration::from_millis(200),
            max_workers: 100,
        }
    }

    /// Read `THEA_ROOT` as the project boundary; persistence lives under it.
    pub fn from_env() -> Result<Self, EngineError> {
        let root = std::env::var("THEA_ROOT")
            .map_err(|_| EngineError::Validation("THEA_ROOT is not set".to_string()))?;
        let root = PathBuf::from(root);
        if !root.is_dir() {
            return Err(EngineError::Validation(
                "THEA_ROOT does not point at a directory".to_string(),
            ));
        }
        let persistence = root.join(".strategos");
        Ok(Self::new(root, persistence))
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.persistence_dir.join("workers.json")
    }
}

/// Adapter dependencies injected into the engine.
pub struct EngineDeps<M, C, I> {
    pub mux: M,
    pub clock: C,
    pub id_gen: I,
    pub history: Box<dyn HistorySink>,
}

/// The worker orchestration engine.
pub struct Engine<M: MuxAdapter, C: Clock, I: IdGen> {
    pub(crate) mux: M,
    pub(crate) clock: C,
    pub(crate) id_gen: I,
    pub(crate) config: EngineConfig,
    pub(crate) registries: Arc<Mutex<Registries>>,
    pub(crate) graph: Mutex<DependencyGraph>,
    pub(crate) context: ContextWriter,
    pub(crate) broadcaster: Broadcaster,
    pub(crate) saver: StateSaver,
    pub(crate) checkpoints: CheckpointStore,
    pub(crate) git: GitQuery,
    pub(crate) webhooks: WebhookDispatcher,
    pub(crate) history: Box<dyn HistorySink>,
    pub(crate) cleanup_running: AtomicBool,
    /// Back-reference into our own Arc, for handing clones to spawned tasks.
    self_ref: std::sync::Weak<Self>,
}

impl<M: MuxAdapter, C: Clock, I: IdGen + 'static> Engine<M, C, I> {
    pub fn new(deps: EngineDeps<M, C, I>, config: EngineConfig) -> Arc<Self> {
        let registries = Arc::new(Mutex::new(Registries::new()));

        let provider: strategos_storage::SnapshotProvider = {
            let registries = Arc::clone(&registries);
            let clock = deps.clock.clone();
            Arc::new(move || {
                let reg = registries.lock();
                let mut workers: Vec<PersistedWorker> = reg
                    .workers
                    .values()
                    .map(PersistedWorker::from_worker)
                    .collect();
                workers.extend(
                    reg.pending
                        .values()
                        .map(|p| PersistedWorker::from_worker(&p.worker)),
                );
                WorkerSnapshot {
                    timestamp_ms: clock.epoch_ms(),
                    workers,
                }
            })
        };
        let saver = StateSaver::new(config.snapshot_path(), provider, config.save_debounce);
        let checkpoints = CheckpointStore::new(config.persistence_dir.join("checkpoints"));
        let context = ContextWriter::new(config.api_base.clone());

        Arc::new_cyclic(|self_ref| Self {
            mux: deps.mux,
            clock: deps.clock,
            id_gen: deps.id_gen,
            config,
            registries,
            graph: Mutex::new(DependencyGraph::new()),
            context,
            broadcaster: Broadcaster::default(),
            saver,
            checkpoints,
            git: GitQuery::new(),
            webhooks: WebhookDispatcher::new(),
            history: deps.history,
            cleanup_running: AtomicBool::new(false),
            self_ref: self_ref.clone(),
        })
    }

    /// A strong handle to this engine for spawned tasks. `None` only during
    /// teardown of the final Arc, when background work should stop anyway.
    pub(crate) fn handle(&self) -> Option<Arc<Self>> {
        self.self_ref.upgrade()
    }

    /// Spawn the periodic loops. Each timer runs exactly once regardless of
    /// fleet size; a slow tick skips rather than stacking.
    pub fn start(&self) {
        self.saver.spawn();

        // Each loop holds only a weak reference: dropping the last engine
        // handle ends the timers instead of leaking them.
        let weak = self.self_ref.clone();
        let period = self.config.capture_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                let Some(engine) = weak.upgrade() else { return };
                engine.capture_tick().await;
            }
        });

        let weak = self.self_ref.clone();
        let period = self.config.health_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                let Some(engine) = weak.upgrade() else { return };
                engine.health_tick().await;
            }
        });

        let weak = self.self_ref.clone();
        let period = self.config.cleanup_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                let Some(engine) = weak.upgrade() else { return };
                engine.cleanup_tick().await;
            }
        });
    }

    // --- accessors -------------------------------------------------------

    pub fn subscribe(&self) -> broadcast::Receiver<OutboundEvent> {
        self.broadcaster.subscribe()
    }

    pub(crate) fn now_ms(&self) -> u64 {
        self.clock.epoch_ms()
    }

    /// All workers (live and pending), normalized, oldest first.
    pub fn get_workers(&self) -> Vec<NormalizedWorker> {
        let reg = self.registries.lock();
        let mut all: Vec<NormalizedWorker> = reg
            .workers
            .values()
            .map(Worker::normalized)
            .chain(reg.pending.values().map(|p| p.worker.normalized()))
            .collect();
        all.sort_by_key(|w| (w.created_at_ms, w.id.clone()));
        all
    }

    pub fn get_worker(&self, id: &WorkerId) -> Option<NormalizedWorker> {
        let reg = self.registries.lock();
        reg.workers
            .get(id)
            .map(Worker::normalized)
            .or_else(|| reg.pending.get(id).map(|p| p.worker.normalized()))
    }

    pub fn get_activity_log(&self, limit: usize) -> Vec<ActivityEntry> {
        let reg = self.registries.lock();
        reg.activity.iter().rev().take(limit).cloned().collect()
    }

    pub fn get_respawn_suggestions(&self) -> Vec<RespawnSuggestion> {
        let reg = self.registries.lock();
        reg.respawn_suggestions.iter().cloned().collect()
    }

    pub fn get_resource_stats(&self) -> ResourceStats {
        let reg = self.registries.lock();
        reg.stats(self.clock.now())
    }

    pub fn get_circuit_breaker_status(&self) -> BreakerStatus {
        let reg = self.registries.lock();
        reg.breaker.status(self.clock.now())
    }

    pub fn reset_circuit_breaker(&self) {
        let mut reg = self.registries.lock();
        reg.breaker.reset();
    }

    /// Validate a declarative task list without mutating the graph.
    pub fn validate_task_graph(
        &self,
        tasks: &[crate::graph::TaskSpec],
    ) -> Result<(), crate::graph::GraphError> {
        DependencyGraph::validate_task_graph(tasks)
    }

    /// Declare (or extend) a workflow grouping before spawning its workers.
    pub fn declare_workflow(&self, id: &str, name: &str, tasks: Vec<String>) {
        let mut graph = self.graph.lock();
        graph.ensure_workflow(id, name, tasks);
    }

    // --- small facade operations ----------------------------------------

    /// Rename a worker. Role may change with the label, so the context file
    /// is rewritten.
    pub async fn update_worker_label(
        &self,
        id: &WorkerId,
        label: String,
    ) -> Result<NormalizedWorker, EngineError> {
        if label.trim().is_empty() {
            return Err(EngineError::Validation("label must not be empty".into()));
        }
        let worker = {
            let mut reg = self.registries.lock();
            let worker = reg
                .workers
                .get_mut(id)
                .ok_or_else(|| EngineError::WorkerNotFound(id.to_string()))?;
            worker.label = label;
            worker.clone()
        };
        if let Err(e) = self.context.write_for(&worker).await {
            tracing::warn!(worker_id = %id, error = %e, "context rewrite after relabel failed");
        }
        let normalized = worker.normalized();
        self.broadcaster.emit(EngineEvent::WorkerUpdated {
            worker: normalized.clone(),
        });
        self.saver.request_save();
        Ok(normalized)
    }

    /// Toggle per-worker control flags.
    pub fn update_worker_settings(
        &self,
        id: &WorkerId,
        settings: WorkerSettings,
    ) -> Result<NormalizedWorker, EngineError> {
        let now_ms = self.now_ms();
        let normalized = {
            let mut reg = self.registries.lock();
            let worker = reg
                .workers
                .get_mut(id)
                .ok_or_else(|| EngineError::WorkerNotFound(id.to_string()))?;
            if let Some(v) = settings.auto_accept {
                worker.auto_accept = v;
                if !v {
                    worker.auto_accept_paused = false;
                }
            }
            if let Some(v) = settings.bulldoze_mode {
                if v && !worker.bulldoze_mode {
                    worker.bulldoze_started_at_ms = Some(now_ms);
                    worker.bulldoze_send_errors = 0;
                    worker.bulldoze_stale_cycles = 0;
                }
                worker.bulldoze_mode = v;
                if !v {
                    worker.bulldoze_paused = false;
                    worker.bulldoze_pause_reason = None;
                }
            }
            if let Some(v) = settings.auto_continue {
                worker.auto_continue = v;
            }
            worker.normalized()
        };
        self.broadcaster.emit(EngineEvent::WorkerUpdated {
            worker: normalized.clone(),
        });
        self.saver.request_save();
        Ok(normalized)
    }

    pub async fn resize_worker_terminal(
        &self,
        id: &WorkerId,
        cols: u16,
        rows: u16,
    ) -> Result<(), EngineError> {
        if cols == 0 || rows == 0 || cols > 500 || rows > 300 {
            return Err(EngineError::Validation("unreasonable terminal size".into()));
        }
        let session = self.session_name_of(id)?;
        self.mux.resize_window(&session, cols, rows).await?;
        Ok(())
    }

    // --- shared internals ------------------------------------------------

    pub(crate) fn session_name_of(&self, id: &WorkerId) -> Result<String, EngineError> {
        let reg = self.registries.lock();
        reg.workers
            .get(id)
            .map(|w| w.session_name.clone())
            .ok_or_else(|| EngineError::WorkerNotFound(id.to_string()))
    }

    pub(crate) fn worker_clone(&self, id: &WorkerId) -> Option<Worker> {
        self.registries.lock().workers.get(id).cloned()
    }

    pub(crate) fn with_worker_mut<T>(
        &self,
        id: &WorkerId,
        f: impl FnOnce(&mut Worker) -> T,
    ) -> Option<T> {
        let mut reg = self.registries.lock();
        reg.workers.get_mut(id).map(f)
    }

    /// Record an activity entry and publish it.
    pub(crate) fn record_activity(&self, kind: &str, worker: &Worker, message: String) {
        let entry = ActivityEntry {
            at_ms: self.now_ms(),
            kind: kind.to_string(),
            worker_id: worker.id.clone(),
            label: worker.label.clone(),
            project: worker.project.clone(),
            message,
        };
        {
            let mut reg = self.registries.lock();
            reg.push_activity(entry.clone());
        }
        self.broadcaster.emit(EngineEvent::ActivityNew { entry });
    }

    /// Emit the periodic `worker:updated` for a worker if it still exists.
    pub(crate) fn emit_updated(&self, id: &WorkerId) {
        if let Some(worker) = self.worker_clone(id) {
            self.broadcaster.emit(EngineEvent::WorkerUpdated {
                worker: worker.normalized(),
            });
        }
    }

    /// Synchronous best-effort crash save, for installation in panic hooks.
    pub fn crash_save(&self) {
        self.saver.save_sync();
    }
}

/// Settings toggles accepted by `update_worker_settings`. `None` leaves the
/// flag untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkerSettings {
    pub auto_accept: Option<bool>,
    pub bulldoze_mode: Option<bool>,
    pub auto_continue: Option<bool>,
}

#[cfg(test)]
#[path = "../runtime_tests/mod.rs"]
mod tests;
