// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The periodic cleanup sweep.

use super::kill::KillOptions;
use super::{Engine, EngineError};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use strategos_adapters::MuxAdapter;
use strategos_core::{Clock, IdGen, WorkerId, WorkerStatus};

/// Completed workers linger this long before the sweep kills them
/// (the scheduled auto-cleanup plus a margin for slow timers).
const COMPLETED_LINGER_MS: u64 = 30_000 + 10_000;
/// Awaiting-review timeout for workers without a parent.
const REVIEW_TIMEOUT_ROOTLESS_MS: u64 = 15 * 60 * 1000;
/// Awaiting-review timeout for workers with a parent.
const REVIEW_TIMEOUT_PARENTED_MS: u64 = 30 * 60 * 1000;
/// Running workers idle beyond this get a one-time warning.
const IDLE_WARNING_MS: u64 = 30 * 60 * 1000;
/// Pending workers parked beyond this are dropped.
const PENDING_TIMEOUT_MS: u64 = 30 * 60 * 1000;
/// Respawn counters older than this are trimmed.
const RESPAWN_COUNTER_TTL_MS: u64 = 60 * 60 * 1000;
/// Finished graph nodes and workflows older than this are collected.
const GRAPH_GC_AGE_MS: u64 = 60 * 60 * 1000;

impl<M: MuxAdapter, C: Clock, I: IdGen + 'static> Engine<M, C, I> {
    /// One cleanup pass. Guarded against overlapping ticks.
    pub async fn cleanup_tick(&self) {
        if self
            .cleanup_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("cleanup tick skipped, previous still running");
            return;
        }
        self.cleanup_pass().await;
        self.cleanup_running.store(false, Ordering::SeqCst);
    }

    async fn cleanup_pass(&self) {
        let now_ms = self.now_ms();

        // Snapshot what to act on under one lock, act outside it
        struct Sweep {
            kill_completed: Vec<WorkerId>,
            dismiss_reviewed: Vec<WorkerId>,
            warn_idle: Vec<WorkerId>,
            drop_pending: Vec<WorkerId>,
        }
        let sweep = {
            let reg = self.registries.lock();
            let mut sweep = Sweep {
                kill_completed: Vec::new(),
                dismiss_reviewed: Vec::new(),
                warn_idle: Vec::new(),
                drop_pending: Vec::new(),
            };

            for worker in reg.workers.values() {
                if worker.is_protected() {
                    continue;
                }
                match worker.status {
                    WorkerStatus::Completed => {
                        let done_for = worker
                            .completed_at_ms
                            .map(|at| now_ms.saturating_sub(at))
                            .unwrap_or(0);
                        if done_for > COMPLETED_LINGER_MS {
                            sweep.kill_completed.push(worker.id.clone());
                        }
                    }
                    WorkerStatus::AwaitingReview => {
                        let has_any_child = !worker.child_worker_ids.is_empty()
                            || !worker.child_worker_history.is_empty();
                        if has_any_child {
                            continue;
                        }
                        let timeout = if worker.parent_worker_id.is_some() {
                            REVIEW_TIMEOUT_PARENTED_MS
                        } else {
                            REVIEW_TIMEOUT_ROOTLESS_MS
                        };
                        let waiting = worker
                            .awaiting_review_since_ms
                            .map(|at| now_ms.saturating_sub(at))
                            .unwrap_or(0);
                        if waiting > timeout {
                            sweep.dismiss_reviewed.push(worker.id.clone());
                        }
                    }
                    WorkerStatus::Running => {
                        if !worker.idle_warned
                            && now_ms.saturating_sub(worker.last_output_ms) > IDLE_WARNING_MS
                        {
                            sweep.warn_idle.push(worker.id.clone());
                        }
                    }
                    _ => {}
                }
            }

            for (id, pending) in reg.pending.iter() {
                if now_ms.saturating_sub(pending.parked_at_ms) > PENDING_TIMEOUT_MS {
                    sweep.drop_pending.push(id.clone());
                }
            }
            sweep
        };

        // Drop failed pending workers too: their dependencies are gone
        let pending_ids: Vec<WorkerId> = {
            let reg = self.registries.lock();
            reg.pending.keys().cloned().collect()
        };
        let failed_pending: Vec<WorkerId> = {
            let graph = self.graph.lock();
            pending_ids
                .into_iter()
                .filter(|id| {
                    graph
                        .node(id.as_str())
                        .map(|n| n.status == crate::graph::NodeStatus::Failed)
                        .unwrap_or(true)
                })
                .collect()
        };

        for id in sweep.kill_completed {
            match self.kill_worker(&id, KillOptions::auto("completed_cleanup")).await {
                Ok(_) => {}
                Err(EngineError::KillBlocked(_)) => {}
                Err(e) => tracing::debug!(worker_id = %id, error = %e, "cleanup kill failed"),
            }
        }
        for id in sweep.dismiss_reviewed {
            if let Err(e) = self.dismiss_worker(&id).await {
                tracing::debug!(worker_id = %id, error = %e, "review auto-dismiss failed");
            }
        }
        for id in sweep.warn_idle {
            self.with_worker_mut(&id, |w| w.idle_warned = true);
            if let Some(worker) = self.worker_clone(&id) {
                tracing::warn!(worker_id = %id, label = %worker.label, "worker idle for over 30 minutes");
                self.record_activity("idle_warning", &worker, "idle for over 30 minutes".into());
            }
        }
        for id in sweep.drop_pending.into_iter().chain(failed_pending) {
            let removed = {
                let mut reg = self.registries.lock();
                reg.pending.remove(&id)
            };
            if let Some(pending) = removed {
                self.graph.lock().remove(id.as_str());
                self.broadcaster
                    .emit(strategos_core::EngineEvent::WorkerDeleted {
                        worker_id: id.clone(),
                        label: pending.worker.label.clone(),
                        project: pending.worker.project.clone(),
                        reason: "pending_expired".to_string(),
                    });
            }
        }

        // Bookkeeping: snapshot, counter trim, graph GC, lock pruning
        self.saver.request_save();
        {
            let mut reg = self.registries.lock();
            reg.respawn_counters.retain(|_, counter| {
                now_ms.saturating_sub(counter.last_attempt_ms) <= RESPAWN_COUNTER_TTL_MS
            });
        }
        {
            let mut graph = self.graph.lock();
            let removed = graph.cleanup_finished(GRAPH_GC_AGE_MS, now_ms);
            if removed > 0 {
                tracing::debug!(removed, "dependency graph collected finished nodes");
            }
        }
        let live_projects: Vec<PathBuf> = {
            let reg = self.registries.lock();
            let mut projects: Vec<PathBuf> =
                reg.workers.values().map(|w| w.working_dir.clone()).collect();
            projects.sort();
            projects.dedup();
            projects
        };
        self.context.prune_locks(&live_projects);
    }
}
