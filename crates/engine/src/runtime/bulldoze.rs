// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bulldoze continuation driving: hard stops, child-gated pausing, cycle
//! prompts, and the no-new-commits stall detector.

use super::Engine;
use crate::bulldoze::{
    continuation_prompt, find_stop_marker, BulldozeState, StopReason, IDLE_TICKS_REQUIRED,
    MAX_COMPACTIONS, MAX_SEND_ERRORS, MAX_STALE_CYCLES, MAX_WALL_CLOCK,
};
use crate::patterns;
use chrono::TimeZone;
use strategos_adapters::MuxAdapter;
use strategos_core::{Clock, EngineEvent, IdGen, RalphStatus, Worker, WorkerId, WorkerStatus};

impl<M: MuxAdapter, C: Clock, I: IdGen + 'static> Engine<M, C, I> {
    /// Called from the idle path of the capture loop for bulldoze workers.
    pub(crate) async fn bulldoze_idle_tick(
        &self,
        worker: &Worker,
        tail: &str,
        idle_ticks: u32,
        now_ms: u64,
    ) {
        // Child-gated pause resumes itself once no child is mid-flight
        if worker.bulldoze_paused {
            if worker.bulldoze_pause_reason.as_deref() == Some("child_in_progress")
                && !self.any_child_in_progress(worker)
            {
                self.with_worker_mut(&worker.id, |w| {
                    w.bulldoze_paused = false;
                    w.bulldoze_pause_reason = None;
                });
                tracing::info!(worker_id = %worker.id, "bulldoze resumed, children settled");
            } else {
                return;
            }
        }

        if idle_ticks < IDLE_TICKS_REQUIRED || !patterns::detect_idle_prompt(tail) {
            return;
        }
        if patterns::has_active_indicator(tail) {
            return;
        }

        if let Some(reason) = self.bulldoze_hard_stop(worker, now_ms).await {
            self.stop_bulldoze(&worker.id, reason);
            return;
        }

        if self.any_child_in_progress(worker) {
            self.pause_bulldoze(&worker.id, StopReason::ChildInProgress);
            return;
        }

        self.run_bulldoze_cycle(&worker.id, now_ms).await;
    }

    /// Evaluate the hard-stop conditions in order.
    async fn bulldoze_hard_stop(&self, worker: &Worker, now_ms: u64) -> Option<StopReason> {
        if let Some(started) = worker.bulldoze_started_at_ms {
            if now_ms.saturating_sub(started) >= MAX_WALL_CLOCK.as_millis() as u64 {
                return Some(StopReason::WallClock);
            }
        }
        if worker.bulldoze_send_errors >= MAX_SEND_ERRORS {
            return Some(StopReason::SendErrors);
        }

        let state_path = BulldozeState::path_for(&worker.working_dir, &worker.id);
        let state_text = std::fs::read_to_string(&state_path).unwrap_or_default();
        if let Some(marker) = find_stop_marker(&state_text) {
            return Some(StopReason::Marker(marker));
        }
        if BulldozeState::parse(&state_text).compaction_count >= MAX_COMPACTIONS {
            return Some(StopReason::Compactions);
        }
        if worker.bulldoze_stale_cycles >= MAX_STALE_CYCLES {
            return Some(StopReason::NoNewCommits);
        }
        None
    }

    /// Run one continuation cycle: commit-staleness accounting, then the
    /// next-cycle or audit prompt.
    async fn run_bulldoze_cycle(&self, id: &WorkerId, now_ms: u64) {
        let Some(worker) = self.worker_clone(id) else {
            return;
        };

        // Wall-clock git history since the previous cycle decides staleness.
        // Shared working directories can misattribute commits; accepted.
        let cycle_window_ms = self.config.capture_interval.as_millis() as u64
            * u64::from(IDLE_TICKS_REQUIRED)
            + 60_000;
        let since = chrono::Utc
            .timestamp_millis_opt(now_ms.saturating_sub(cycle_window_ms) as i64)
            .single()
            .map(|t| t.to_rfc3339());
        if worker.bulldoze_cycles_completed > 0 {
            if let Some(since) = since {
                match self.git.commits_since(&worker.working_dir, &since).await {
                    Ok(commits) if commits.is_empty() => {
                        self.with_worker_mut(id, |w| {
                            w.bulldoze_stale_cycles = w.bulldoze_stale_cycles.saturating_add(1)
                        });
                    }
                    Ok(_) => {
                        self.with_worker_mut(id, |w| w.bulldoze_stale_cycles = 0);
                    }
                    Err(e) => {
                        tracing::debug!(worker_id = %id, error = %e, "bulldoze commit check failed");
                    }
                }
            }
        }

        let cycle = worker.bulldoze_cycles_completed + 1;
        let state_path = BulldozeState::path_for(&worker.working_dir, &worker.id);
        let audit = cycle % crate::bulldoze::AUDIT_EVERY == 0;
        let prompt = continuation_prompt(cycle, &state_path);

        match self.send_system_input(id, prompt).await {
            Ok(()) => {
                self.with_worker_mut(id, |w| {
                    w.bulldoze_cycles_completed = cycle;
                    w.bulldoze_send_errors = 0;
                    w.idle_ticks = 0;
                });
                self.broadcaster.emit(EngineEvent::WorkerBulldozeCycle {
                    worker_id: id.clone(),
                    cycle,
                    audit,
                });
                tracing::info!(worker_id = %id, cycle, audit, "bulldoze continuation sent");
            }
            Err(e) => {
                let errors = self
                    .with_worker_mut(id, |w| {
                        w.bulldoze_send_errors = w.bulldoze_send_errors.saturating_add(1);
                        w.bulldoze_send_errors
                    })
                    .unwrap_or(0);
                tracing::warn!(worker_id = %id, errors, error = %e, "bulldoze continuation send failed");
            }
        }
    }

    /// A live child that is running and mid-task pauses the parent's loop.
    fn any_child_in_progress(&self, worker: &Worker) -> bool {
        let reg = self.registries.lock();
        worker.child_worker_ids.iter().any(|child_id| {
            reg.workers.get(child_id).is_some_and(|child| {
                child.status == WorkerStatus::Running
                    && child.ralph_status == RalphStatus::InProgress
            })
        })
    }

    pub(crate) fn pause_bulldoze(&self, id: &WorkerId, reason: StopReason) {
        let reason_str = reason.as_str().to_string();
        self.with_worker_mut(id, |w| {
            w.bulldoze_paused = true;
            w.bulldoze_pause_reason = Some(reason_str.clone());
        });
        self.broadcaster.emit(EngineEvent::WorkerBulldozePaused {
            worker_id: id.clone(),
            reason: reason_str,
        });
    }

    /// Hard stops end the loop entirely.
    fn stop_bulldoze(&self, id: &WorkerId, reason: StopReason) {
        let reason_str = reason.as_str().to_string();
        tracing::warn!(worker_id = %id, reason = %reason_str, "bulldoze hard stop");
        self.with_worker_mut(id, |w| {
            w.bulldoze_mode = false;
            w.bulldoze_paused = false;
            w.bulldoze_pause_reason = None;
        });
        self.broadcaster.emit(EngineEvent::WorkerBulldozePaused {
            worker_id: id.clone(),
            reason: reason_str,
        });
        self.emit_updated(id);
    }

    /// A compaction observed on a bulldoze worker is counted in its state
    /// file, feeding the compaction hard stop.
    pub(crate) fn bump_bulldoze_compactions(&self, worker: &Worker) {
        let path = BulldozeState::path_for(&worker.working_dir, &worker.id);
        let mut state = BulldozeState::load(&path);
        state.compaction_count = state.compaction_count.saturating_add(1);
        if let Err(e) = state.save(&path) {
            tracing::warn!(worker_id = %worker.id, error = %e, "bulldoze compaction bump failed");
        }
    }
}
