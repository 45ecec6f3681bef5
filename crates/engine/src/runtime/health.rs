// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Health evaluation, crash detection, and bounded respawn.

use super::spawn::SpawnOptions;
use super::{Engine, EngineError};
use crate::events::log_lifecycle;
use crate::patterns;
use crate::state::Registries;
use strategos_adapters::MuxAdapter;
use strategos_core::{
    strip_ansi, Clock, EngineEvent, IdGen, RalphStatus, RespawnSuggestion, Worker, WorkerHealth,
    WorkerId, WorkerStatus,
};
use strategos_storage::{Checkpoint, CheckpointRelations};

/// No output for this long marks a worker stalled.
const STALL_AFTER_MS: u64 = 10 * 60 * 1000;
/// An in-progress Ralph worker silent for this long is also stalled.
const RALPH_STALL_AFTER_MS: u64 = 30 * 60 * 1000;
/// Ralph progress at or above this is promotion-eligible.
const PROMOTE_PROGRESS: u8 = 90;
/// The worker must have been briefly idle before promotion.
const PROMOTE_IDLE_MS: u64 = 15_000;
/// Respawn attempts allowed within the cooldown window.
const RESPAWN_MAX_ATTEMPTS: u32 = 2;
/// Respawn cooldown window.
const RESPAWN_COOLDOWN_MS: u64 = 60_000;
/// Respawn counters older than this are forgotten.
const RESPAWN_COUNTER_TTL_MS: u64 = 60 * 60 * 1000;

/// Step text that signals the task is essentially done.
const COMPLETION_KEYWORDS: &[&str] = &["done", "complete", "finished", "finalized", "wrapped up"];

impl<M: MuxAdapter, C: Clock, I: IdGen + 'static> Engine<M, C, I> {
    /// One health pass over every monitored worker.
    pub async fn health_tick(&self) {
        let ids: Vec<WorkerId> = {
            let reg = self.registries.lock();
            reg.monitored.iter().cloned().collect()
        };
        for id in ids {
            self.evaluate_worker(&id).await;
        }
    }

    async fn evaluate_worker(&self, id: &WorkerId) {
        let Some(worker) = self.worker_clone(id) else {
            return;
        };
        let now_ms = self.now_ms();

        // Protected workers: detect death, never recover automatically
        if worker.is_protected() {
            let capturable = self
                .mux
                .capture_pane(&worker.session_name, 5)
                .await
                .is_ok();
            if !capturable && now_ms.saturating_sub(worker.created_at_ms) > 10_000 {
                if worker.health != WorkerHealth::Dead {
                    self.with_worker_mut(id, |w| w.health = WorkerHealth::Dead);
                    log_lifecycle("general_dead", id.as_str(), "session not capturable");
                    self.broadcaster.emit(EngineEvent::WorkerGeneralDead {
                        worker_id: id.clone(),
                        label: worker.label.clone(),
                    });
                }
                return;
            }
        }

        let tail = {
            let reg = self.registries.lock();
            reg.output_buffer(id)
                .map(|buf| strip_ansi(buf))
                .map(|s| super::output::last_chars(&s, 2_000))
                .unwrap_or_default()
        };

        // Crash patterns take precedence over everything else
        if let Some(reason) = patterns::detect_crash(&tail) {
            if worker.health != WorkerHealth::Crashed {
                self.with_worker_mut(id, |w| {
                    w.health = WorkerHealth::Crashed;
                    w.crashed_at_ms = Some(now_ms);
                    w.crash_reason = Some(reason.clone());
                });
                tracing::error!(worker_id = %id, reason, "crash pattern detected");
                if let Some(updated) = self.worker_clone(id) {
                    self.broadcaster.emit(EngineEvent::WorkerCrashed {
                        worker: updated.normalized(),
                        reason: reason.clone(),
                    });
                }
                self.write_checkpoint(&worker, &reason);
                self.handle_worker_death(id, &reason).await;
            }
            return;
        }

        // Stall detection
        let idle_ms = now_ms.saturating_sub(worker.last_output_ms);
        let ralph_silent_ms = worker
            .last_ralph_signal_ms
            .map(|at| now_ms.saturating_sub(at))
            .unwrap_or(idle_ms);
        let stalled = idle_ms > STALL_AFTER_MS
            || (worker.ralph_status == RalphStatus::InProgress
                && ralph_silent_ms > RALPH_STALL_AFTER_MS);
        if stalled && worker.health == WorkerHealth::Healthy {
            self.with_worker_mut(id, |w| w.health = WorkerHealth::Stalled);
            self.broadcaster.emit(EngineEvent::WorkerStalled {
                worker_id: id.clone(),
                idle_ms,
            });
        }

        // Auto-promotion runs before any continuation logic ever sees the
        // worker again: completion short-circuits continuation.
        if self.promotion_eligible(&worker, now_ms) {
            tracing::info!(worker_id = %id, progress = worker.ralph_progress, "auto-promoting to done");
            self.with_worker_mut(id, |w| {
                w.ralph_status = RalphStatus::Done;
                w.rate_limited = false;
                w.rate_limit_reset_at_ms = None;
            });
            self.notify_parent_of(id, "completed its task").await;
            if let Err(e) = self.complete_worker(id, true).await {
                tracing::warn!(worker_id = %id, error = %e, "auto-promotion completion failed");
            }
            return;
        }

        self.emit_updated(id);
    }

    fn promotion_eligible(&self, worker: &Worker, now_ms: u64) -> bool {
        worker.ralph_mode
            && worker.status == WorkerStatus::Running
            && worker.ralph_progress >= PROMOTE_PROGRESS
            && worker
                .ralph_current_step
                .as_deref()
                .map(|step| {
                    let lower = step.to_lowercase();
                    COMPLETION_KEYWORDS.iter().any(|k| lower.contains(k))
                })
                .unwrap_or(false)
            && now_ms.saturating_sub(worker.last_output_ms) >= PROMOTE_IDLE_MS
    }

    /// Shared death path: forensics, suggestion, bounded respawn, cleanup.
    /// Used by the capture loop (3 failed captures) and crash detection.
    pub(crate) async fn handle_worker_death(&self, id: &WorkerId, reason: &str) {
        let Some(worker) = self.worker_clone(id) else {
            return;
        };
        let now_ms = self.now_ms();

        if worker.is_protected() {
            self.with_worker_mut(id, |w| w.health = WorkerHealth::Dead);
            self.broadcaster.emit(EngineEvent::WorkerGeneralDead {
                worker_id: id.clone(),
                label: worker.label.clone(),
            });
            return;
        }

        self.write_checkpoint(&worker, reason);

        // A mid-task death is worth suggesting a respawn for
        if worker.ralph_status == RalphStatus::InProgress {
            if let Some(task) = &worker.task {
                let mut reg = self.registries.lock();
                reg.push_suggestion(RespawnSuggestion {
                    worker_id: id.clone(),
                    label: worker.label.clone(),
                    project: worker.project.clone(),
                    task: task.clone(),
                    died_at_ms: now_ms,
                    ralph_progress: worker.ralph_progress,
                    ralph_current_step: worker.ralph_current_step.clone(),
                });
            }
        }

        match self.reserve_respawn_attempt(&worker, now_ms) {
            Some(attempt) => {
                self.teardown_worker(id, reason).await;
                match self.respawn_worker(&worker, attempt).await {
                    Ok(new_id) => {
                        self.broadcaster.emit(EngineEvent::WorkerRespawned {
                            old_worker_id: id.clone(),
                            new_worker_id: new_id,
                            attempt,
                        });
                    }
                    Err(e) => {
                        tracing::error!(worker_id = %id, error = %e, "respawn failed");
                    }
                }
            }
            None => {
                // Exhausted: keep the record visible, stop monitoring
                tracing::warn!(worker_id = %id, reason, "respawn budget exhausted");
                {
                    let mut reg = self.registries.lock();
                    reg.monitored.remove(id);
                    if let Some(w) = reg.workers.get_mut(id) {
                        w.status = WorkerStatus::Error;
                        w.health = WorkerHealth::Dead;
                    }
                }
                self.graph.lock().mark_failed(id.as_str(), now_ms);
                self.emit_updated(id);
            }
        }
    }

    /// Enforce the respawn bound: at most [`RESPAWN_MAX_ATTEMPTS`] within
    /// the cooldown window, counters reset when stale. Returns the attempt
    /// number when permitted.
    fn reserve_respawn_attempt(&self, worker: &Worker, now_ms: u64) -> Option<u32> {
        let key = Registries::spawn_key(&worker.label, &worker.project);
        let mut reg = self.registries.lock();
        let counter = reg.respawn_counters.entry(key).or_default();

        if counter.last_attempt_ms > 0
            && now_ms.saturating_sub(counter.last_attempt_ms) > RESPAWN_COUNTER_TTL_MS
        {
            counter.count = 0;
        }
        if counter.count >= RESPAWN_MAX_ATTEMPTS
            && now_ms.saturating_sub(counter.last_attempt_ms) < RESPAWN_COOLDOWN_MS
        {
            return None;
        }
        if counter.count >= RESPAWN_MAX_ATTEMPTS {
            // Outside the cooldown the streak starts over
            counter.count = 0;
        }
        counter.count += 1;
        counter.last_attempt_ms = now_ms;
        Some(counter.count)
    }

    /// Spawn a replacement with the same task and parent relation, told that
    /// it is resuming after a crash.
    async fn respawn_worker(
        &self,
        dead: &Worker,
        attempt: u32,
    ) -> Result<WorkerId, EngineError> {
        let checkpoint_hint = self
            .checkpoints
            .load(&dead.id)
            .map(|cp| cp.last_output.join("\n"))
            .unwrap_or_default();

        let mut resume_prompt = format!(
            "You are resuming a task after your predecessor crashed \
             (attempt {attempt}). Pick up where it left off."
        );
        if let Some(task) = &dead.task {
            resume_prompt.push_str(&format!("\n\nThe task:\n{task}"));
        }
        if !checkpoint_hint.is_empty() {
            resume_prompt.push_str(&format!(
                "\n\nLast output before the crash:\n{checkpoint_hint}"
            ));
        }

        let options = SpawnOptions {
            task: dead.task.clone(),
            parent_worker_id: dead.parent_worker_id.as_ref().map(|p| p.to_string()),
            auto_accept: dead.auto_accept,
            ralph_mode: dead.ralph_mode,
            bulldoze_mode: dead.bulldoze_mode,
            auto_continue: dead.auto_continue,
            allow_duplicate: true,
            backend: Some(dead.backend),
            initial_input: Some(resume_prompt),
            ..SpawnOptions::default()
        };

        let id = WorkerId::new(self.id_gen.next());
        let mut worker = Worker::new(
            id.clone(),
            dead.label.clone(),
            dead.working_dir.clone(),
            self.now_ms(),
        );
        worker.backend = dead.backend;
        worker.task = dead.task.clone();
        worker.parent_worker_id = dead.parent_worker_id.clone();
        worker.auto_accept = dead.auto_accept;
        worker.ralph_mode = dead.ralph_mode;
        worker.bulldoze_mode = dead.bulldoze_mode;
        worker.auto_continue = dead.auto_continue;

        {
            let mut graph = self.graph.lock();
            let _ = graph.register_worker(id.as_str(), &[], None, None, None);
        }
        let normalized = self.launch(worker, &options, true).await?;
        log_lifecycle("respawned", normalized.id.as_str(), &dead.label);

        if dead.parent_worker_id.is_some() {
            self.notify_parent_of(
                &normalized.id,
                &format!("crashed and was respawned as {}", normalized.id),
            )
            .await;
        }
        Ok(normalized.id)
    }

    /// Tell a worker's parent something about it, as direct pane input.
    pub(crate) async fn notify_parent_of(&self, id: &WorkerId, what: &str) {
        let parent = self
            .worker_clone(id)
            .and_then(|w| w.parent_worker_id.clone());
        let Some(parent_id) = parent else {
            return;
        };
        let message = format!("[strategos] subordinate {id} {what}.");
        if let Err(e) = self.send_system_input(&parent_id, message).await {
            tracing::debug!(parent = %parent_id, error = %e, "parent notification failed");
        }
    }

    pub(crate) fn write_checkpoint(&self, worker: &Worker, reason: &str) {
        let raw_output = {
            let reg = self.registries.lock();
            reg.output_buffer(&worker.id).unwrap_or("").to_string()
        };
        let checkpoint = Checkpoint {
            worker_id: worker.id.to_string(),
            label: worker.label.clone(),
            project: worker.project.clone(),
            reason: reason.to_string(),
            uptime_ms: self.now_ms().saturating_sub(worker.created_at_ms),
            task: worker.task.clone(),
            last_output: Checkpoint::clean_output(&raw_output),
            health_at_death: worker.health,
            relations: CheckpointRelations {
                parent_worker_id: worker.parent_worker_id.as_ref().map(|p| p.to_string()),
                child_worker_ids: worker
                    .child_worker_ids
                    .iter()
                    .map(|c| c.to_string())
                    .collect(),
                depends_on: worker.depends_on.iter().map(|d| d.to_string()).collect(),
            },
            created_at: chrono::Utc::now(),
        };
        if let Err(e) = self.checkpoints.write(&checkpoint) {
            tracing::warn!(worker_id = %worker.id, error = %e, "checkpoint write failed");
        }
    }
}
