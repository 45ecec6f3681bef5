// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker completion: graph progression, on-complete actions, auto-cleanup.

use super::kill::KillOptions;
use super::spawn::{SpawnOptions, SpawnRequest};
use super::{Engine, EngineError};
use crate::events::log_lifecycle;
use strategos_adapters::MuxAdapter;
use strategos_core::{
    Clock, EngineEvent, IdGen, OnCompleteAction, WorkerId, WorkerStatus,
};

impl<M: MuxAdapter, C: Clock, I: IdGen + 'static> Engine<M, C, I> {
    /// Complete a worker: mark the graph, start newly-ready dependents,
    /// dispatch the on-complete action, and optionally schedule cleanup.
    ///
    /// Idempotent for already-completed workers (the second call triggers
    /// nothing). Only running, error, and awaiting-review workers may
    /// complete.
    pub async fn complete_worker(
        &self,
        id: &WorkerId,
        auto_cleanup: bool,
    ) -> Result<Vec<WorkerId>, EngineError> {
        let worker = self
            .worker_clone(id)
            .ok_or_else(|| EngineError::WorkerNotFound(id.to_string()))?;

        match worker.status {
            WorkerStatus::Completed => return Ok(Vec::new()),
            WorkerStatus::Running | WorkerStatus::Error | WorkerStatus::AwaitingReview => {}
            other => {
                return Err(EngineError::Validation(format!(
                    "cannot complete worker in status {other}"
                )));
            }
        }

        let now_ms = self.now_ms();
        let result = {
            let mut graph = self.graph.lock();
            graph.mark_completed(id.as_str(), now_ms)
        };

        self.with_worker_mut(id, |w| {
            w.status = WorkerStatus::Completed;
            w.completed_at_ms = Some(now_ms);
        });
        let Some(worker) = self.worker_clone(id) else {
            return Ok(Vec::new());
        };

        log_lifecycle("completed", id.as_str(), &worker.label);
        self.history.end_session(id, "completed");
        self.broadcaster.emit(EngineEvent::WorkerCompleted {
            worker: worker.normalized(),
        });
        self.record_activity("completed", &worker, "task completed".into());

        // Start dependents that just became ready, in registration order
        let mut started = Vec::new();
        for ready in &result.newly_ready {
            let ready_id = WorkerId::new(ready.clone());
            match self.start_pending_worker(&ready_id).await {
                Ok(_) => started.push(ready_id),
                Err(EngineError::WorkerNotFound(_)) => {
                    // Ready in the graph but never parked: nothing to start
                }
                Err(e) => {
                    tracing::warn!(worker_id = %ready_id, error = %e, "dependent start failed");
                }
            }
        }
        if !started.is_empty() {
            self.broadcaster.emit(EngineEvent::DependenciesTriggered {
                completed: id.clone(),
                started: started.clone(),
            });
        }

        if let Some(action) = result.on_complete {
            self.dispatch_on_complete(id, action).await;
        }

        if auto_cleanup && !worker.is_protected() {
            if let Some(engine) = self.handle() {
                let id = id.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(engine.config.auto_cleanup_delay).await;
                    match engine
                        .kill_worker(&id, KillOptions::auto("auto_cleanup"))
                        .await
                    {
                        Ok(_) => {}
                        Err(e) => {
                            tracing::debug!(worker_id = %id, error = %e, "auto-cleanup kill failed")
                        }
                    }
                });
            }
        }

        self.saver.request_save();
        Ok(started)
    }

    /// Dispatch a validated on-complete action. Failures are logged, never
    /// propagated: the completion itself already happened.
    async fn dispatch_on_complete(&self, id: &WorkerId, action: OnCompleteAction) {
        match action {
            OnCompleteAction::Spawn(spawn) => {
                let request = SpawnRequest {
                    project_path: spawn.project_path.clone(),
                    label: spawn.label.clone(),
                    options: SpawnOptions {
                        task: spawn.task.clone(),
                        auto_accept: spawn.auto_accept,
                        ralph_mode: spawn.ralph_mode,
                        bulldoze_mode: spawn.bulldoze_mode,
                        ..SpawnOptions::default()
                    },
                };
                match self.spawn_worker(request).await {
                    Ok(worker) => {
                        tracing::info!(trigger = %id, spawned = %worker.id, "on-complete spawn dispatched");
                    }
                    Err(e) => {
                        tracing::warn!(trigger = %id, error = %e, "on-complete spawn rejected");
                    }
                }
            }
            OnCompleteAction::Webhook(webhook) => {
                if let Err(e) = webhook.validate_static() {
                    tracing::warn!(trigger = %id, error = %e, "on-complete webhook rejected");
                    return;
                }
                match self.webhooks.dispatch(&webhook).await {
                    Ok(status) => {
                        tracing::info!(trigger = %id, status, "on-complete webhook delivered");
                    }
                    Err(e) => {
                        tracing::warn!(trigger = %id, error = %e, "on-complete webhook failed");
                    }
                }
            }
            OnCompleteAction::Emit(emit) => {
                if let Err(e) = emit.validate() {
                    tracing::warn!(trigger = %id, error = %e, "on-complete emit rejected");
                    return;
                }
                self.broadcaster.emit(EngineEvent::Custom {
                    name: emit.event,
                    payload: emit.payload,
                });
            }
        }
    }

    /// Flag a worker as awaiting human review.
    pub fn mark_awaiting_review(&self, id: &WorkerId) -> Result<(), EngineError> {
        let now_ms = self.now_ms();
        self.with_worker_mut(id, |w| {
            w.status = WorkerStatus::AwaitingReview;
            w.awaiting_review_since_ms = Some(now_ms);
        })
        .ok_or_else(|| EngineError::WorkerNotFound(id.to_string()))?;
        self.emit_updated(id);
        self.saver.request_save();
        Ok(())
    }
}
