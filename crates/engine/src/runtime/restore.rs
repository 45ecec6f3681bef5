// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! State restoration after a restart.
//!
//! A restored snapshot is only a claim about the world; every record is
//! checked against the multiplexer before re-adoption. Sessions that are
//! gone drop their workers, zombie sessions (present but not capturable)
//! are treated as gone, and a bare shell in the pane means the backend died
//! underneath a live session.

use super::{Engine, EngineError};
use crate::events::log_lifecycle;
use std::path::PathBuf;
use strategos_adapters::{BackendCommand, MuxAdapter};
use strategos_core::{Clock, IdGen, Worker, WorkerHealth, WorkerId, WorkerStatus};
use strategos_storage::{load_snapshot_validated, PersistedWorker};

/// Shells that mean "the backend process exited" when seen as the pane's
/// current command.
const BARE_SHELLS: &[&str] = &["bash", "zsh", "sh", "fish", "dash"];

/// Delay before the post-restore crash re-check.
const POST_RESTORE_CHECK_DELAY: std::time::Duration = std::time::Duration::from_secs(5);

impl<M: MuxAdapter, C: Clock, I: IdGen + 'static> Engine<M, C, I> {
    /// Restore workers from the snapshot file. Returns how many were
    /// re-adopted. Persistence errors never propagate: a corrupt snapshot
    /// logs and yields a clean start.
    pub async fn restore_worker_state(&self) -> Result<usize, EngineError> {
        let path = self.config.snapshot_path();
        let records = match load_snapshot_validated(&path) {
            Ok(Some((_, records))) => records,
            Ok(None) => return Ok(0),
            Err(e) => {
                tracing::error!(error = %e, path = %path.display(), "snapshot restore refused, starting clean");
                return Ok(0);
            }
        };

        let now_ms = self.now_ms();
        let mut adopted: Vec<Worker> = Vec::new();

        for record in records {
            if let Some(worker) = self.validate_against_mux(record, now_ms).await {
                adopted.push(worker);
            }
        }

        // Two-phase graph re-registration: standalone nodes first so they
        // exist as targets, dependent nodes second.
        {
            let mut graph = self.graph.lock();
            for worker in adopted.iter().filter(|w| w.depends_on.is_empty()) {
                let _ = graph.register_worker(worker.id.as_str(), &[], None, None, None);
            }
            for worker in adopted.iter().filter(|w| !w.depends_on.is_empty()) {
                let deps: Vec<String> =
                    worker.depends_on.iter().map(|d| d.to_string()).collect();
                if let Err(e) =
                    graph.register_worker(worker.id.as_str(), &deps, None, None, None)
                {
                    tracing::warn!(worker_id = %worker.id, error = %e, "dependency re-registration failed");
                }
            }
            // Re-sync node status to worker status
            for worker in &adopted {
                match worker.status {
                    WorkerStatus::Completed => {
                        let _ = graph.mark_completed(worker.id.as_str(), now_ms);
                    }
                    WorkerStatus::Failed | WorkerStatus::Error => {
                        let _ = graph.mark_failed(worker.id.as_str(), now_ms);
                    }
                    WorkerStatus::Running | WorkerStatus::AwaitingReview => {
                        graph.mark_started(worker.id.as_str());
                    }
                    _ => {}
                }
            }
        }

        let count = adopted.len();
        let mut project_dirs: Vec<PathBuf> = Vec::new();
        let live_ids: Vec<WorkerId> = adopted.iter().map(|w| w.id.clone()).collect();

        for worker in adopted {
            if !project_dirs.contains(&worker.working_dir) {
                project_dirs.push(worker.working_dir.clone());
            }
            let ralph = worker.ralph_mode;
            let id = worker.id.clone();
            let normalized = worker.normalized();
            {
                let mut reg = self.registries.lock();
                reg.insert_worker(worker);
            }
            self.history.start_session(&normalized);
            if ralph {
                self.schedule_restore_reminder(&id);
            }
            log_lifecycle("restored", id.as_str(), "adopted from snapshot");
        }

        // Orphaned context and bulldoze state files from previous fleets
        for dir in &project_dirs {
            self.context.remove_orphans(dir, &live_ids);
            remove_orphan_bulldoze_state(dir, &live_ids);
        }

        if count > 0 {
            tracing::info!(count, "restored workers from snapshot");
            // Late crash re-check and auto-promotion once panes settle
            if let Some(engine) = self.handle() {
                tokio::spawn(async move {
                    tokio::time::sleep(POST_RESTORE_CHECK_DELAY).await;
                    engine.capture_tick().await;
                    engine.health_tick().await;
                });
            }
        }

        self.saver.request_save();
        Ok(count)
    }

    /// Check one persisted record against the live multiplexer.
    async fn validate_against_mux(
        &self,
        record: PersistedWorker,
        now_ms: u64,
    ) -> Option<Worker> {
        let mut worker = record.into_worker(now_ms);

        // Terminal workers are historical; do not re-adopt their sessions
        if worker.status.is_terminal() {
            tracing::debug!(worker_id = %worker.id, status = %worker.status, "skipping terminal worker");
            return None;
        }

        let session = worker.session_name.clone();
        let exists = self.mux.has_session(&session).await.unwrap_or(false);
        if !exists {
            tracing::info!(worker_id = %worker.id, "session gone, dropping worker");
            return None;
        }
        // A session that exists but cannot be captured is a zombie
        if self.mux.capture_pane(&session, 5).await.is_err() {
            tracing::warn!(worker_id = %worker.id, "zombie session (not capturable), dropping worker");
            let _ = self.mux.kill_session(&session).await;
            return None;
        }

        // A bare shell in the pane means the backend process died
        if let Ok(command) = self.mux.pane_current_command(&session).await {
            let process = BackendCommand::new(worker.backend).process_name();
            if BARE_SHELLS.contains(&command.as_str()) && command != process {
                tracing::warn!(worker_id = %worker.id, pane = %command, "backend died under session, marking crashed");
                worker.health = WorkerHealth::Crashed;
                worker.crashed_at_ms = Some(now_ms);
                worker.crash_reason = Some("backend process died across restart".to_string());
            }
        }

        Some(worker)
    }

    fn schedule_restore_reminder(&self, id: &WorkerId) {
        let Some(engine) = self.handle() else {
            return;
        };
        let id = id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(engine.config.restore_reminder_delay).await;
            let Some(worker) = engine.worker_clone(&id) else {
                return;
            };
            if worker.ralph_signal_count > 0 {
                return;
            }
            let message = format!(
                "The supervisor restarted. Resume progress signaling via POST \
                 {}/api/ralph/signal/by-worker/{}.",
                engine.config.api_base, id
            );
            if let Err(e) = engine.send_system_input(&id, message).await {
                tracing::debug!(worker_id = %id, error = %e, "restore reminder failed");
            }
        });
    }
}

/// Delete bulldoze state files in `<dir>/tmp` that belong to no live worker.
fn remove_orphan_bulldoze_state(dir: &std::path::Path, live_ids: &[WorkerId]) {
    let tmp = dir.join("tmp");
    let Ok(entries) = std::fs::read_dir(&tmp) else {
        return;
    };
    for entry in entries.filter_map(|e| e.ok()) {
        let name = entry.file_name().to_string_lossy().into_owned();
        let Some(id_part) = name
            .strip_prefix("bulldoze-state-")
            .and_then(|rest| rest.strip_suffix(".md"))
        else {
            continue;
        };
        if !live_ids.iter().any(|id| id.as_str() == id_part) {
            if let Err(e) = std::fs::remove_file(entry.path()) {
                tracing::warn!(path = %entry.path().display(), error = %e, "orphan bulldoze state removal failed");
            }
        }
    }
}
