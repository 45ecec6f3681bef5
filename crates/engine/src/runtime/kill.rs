// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Kill, teardown, and dismissal.

use super::{Engine, EngineError};
use crate::bulldoze::BulldozeState;
use crate::events::log_lifecycle;
use std::collections::HashSet;
use strategos_adapters::MuxAdapter;
use strategos_core::{Clock, EngineEvent, IdGen, WorkerId, WorkerStatus};

/// Options for `kill_worker`.
#[derive(Debug, Clone, Default)]
pub struct KillOptions {
    /// Required to kill a protected worker.
    pub force: bool,
    /// Set when another worker requested the kill; enforces the ancestry
    /// rule (only strict ancestors may kill).
    pub caller_worker_id: Option<WorkerId>,
    pub reason: String,
}

impl KillOptions {
    pub fn auto(reason: &str) -> Self {
        Self {
            force: false,
            caller_worker_id: None,
            reason: reason.to_string(),
        }
    }

    pub fn forced(reason: &str) -> Self {
        Self {
            force: true,
            caller_worker_id: None,
            reason: reason.to_string(),
        }
    }
}

impl<M: MuxAdapter, C: Clock, I: IdGen + 'static> Engine<M, C, I> {
    /// Kill a worker. Idempotent: an unknown id returns `Ok(false)`.
    pub async fn kill_worker(
        &self,
        id: &WorkerId,
        opts: KillOptions,
    ) -> Result<bool, EngineError> {
        // Pending workers are cancelled by un-parking them; no session exists
        {
            let mut reg = self.registries.lock();
            if let Some(pending) = reg.pending.remove(id) {
                drop(reg);
                self.graph.lock().remove(id.as_str());
                self.broadcaster.emit(EngineEvent::WorkerDeleted {
                    worker_id: id.clone(),
                    label: pending.worker.label.clone(),
                    project: pending.worker.project.clone(),
                    reason: opts.reason.clone(),
                });
                self.saver.request_save();
                return Ok(true);
            }
        }

        let Some(worker) = self.worker_clone(id) else {
            return Ok(false);
        };

        // Worker-initiated kills require strict ancestry; self-kills never
        if let Some(caller) = &opts.caller_worker_id {
            if caller == id || !self.is_strict_ancestor(caller, id) {
                let reason = if caller == id {
                    "self-kill blocked".to_string()
                } else {
                    format!("{caller} is not an ancestor of {id}")
                };
                self.broadcaster.emit(EngineEvent::WorkerKillBlocked {
                    worker_id: id.clone(),
                    caller: Some(caller.clone()),
                    reason: reason.clone(),
                });
                return Err(EngineError::KillBlocked(reason));
            }
        }

        if worker.is_protected() && !opts.force {
            let reason = format!("{} is protected; force required", worker.label);
            self.broadcaster.emit(EngineEvent::WorkerKillBlocked {
                worker_id: id.clone(),
                caller: opts.caller_worker_id.clone(),
                reason: reason.clone(),
            });
            return Err(EngineError::KillBlocked(reason));
        }

        log_lifecycle("kill", id.as_str(), &opts.reason);
        self.write_checkpoint(&worker, &opts.reason);

        // Graceful interrupt first, then the hard kill
        let _ = self.mux.send_key(&worker.session_name, "C-c").await;
        let _ = self.mux.kill_session(&worker.session_name).await;

        self.reparent_children_of(&worker.id);
        self.teardown_worker(id, &opts.reason).await;
        Ok(true)
    }

    /// Walk the live parent chain upward from `target`; true when `caller`
    /// appears strictly above it. Cycle-guarded.
    pub(crate) fn is_strict_ancestor(&self, caller: &WorkerId, target: &WorkerId) -> bool {
        let reg = self.registries.lock();
        let mut seen: HashSet<WorkerId> = HashSet::new();
        let mut current = reg
            .workers
            .get(target)
            .and_then(|w| w.parent_worker_id.clone());
        while let Some(parent) = current {
            if !seen.insert(parent.clone()) {
                return false;
            }
            if &parent == caller {
                return true;
            }
            current = reg
                .workers
                .get(&parent)
                .and_then(|w| w.parent_worker_id.clone());
        }
        false
    }

    /// Move a dying worker's live children up to their grandparent, or make
    /// them roots.
    fn reparent_children_of(&self, id: &WorkerId) {
        let mut reg = self.registries.lock();
        let Some(worker) = reg.workers.get(id) else {
            return;
        };
        let children = worker.child_worker_ids.clone();
        let grandparent = worker.parent_worker_id.clone();
        let grandparent_label = grandparent
            .as_ref()
            .and_then(|g| reg.workers.get(g))
            .map(|g| g.label.clone());

        for child_id in &children {
            if let Some(child) = reg.workers.get_mut(child_id) {
                child.parent_worker_id = grandparent.clone();
                child.parent_label = grandparent_label.clone();
            }
        }
        if let (Some(grandparent_id), false) = (&grandparent, children.is_empty()) {
            let grandparent_id = grandparent_id.clone();
            if let Some(gp) = reg.workers.get_mut(&grandparent_id) {
                for child_id in &children {
                    gp.add_child(child_id.clone());
                }
            }
        }
    }

    /// Shared teardown used by kill and cleanup paths: stop monitoring,
    /// remove artifacts, cascade failure, erase registries, snapshot.
    pub(crate) async fn teardown_worker(&self, id: &WorkerId, reason: &str) {
        let Some(worker) = self.worker_clone(id) else {
            return;
        };
        let now_ms = self.now_ms();

        {
            let mut reg = self.registries.lock();
            reg.monitored.remove(id);
        }
        self.history.end_session(id, reason);

        // Context file: shared files stay while others run in the project
        let remaining = {
            let reg = self.registries.lock();
            reg.workers
                .values()
                .filter(|w| w.id != *id && w.working_dir == worker.working_dir)
                .count()
        };
        if let Err(e) = self
            .context
            .remove_for(id, &worker.working_dir, worker.backend, remaining)
            .await
        {
            tracing::warn!(worker_id = %id, error = %e, "context removal failed");
        }

        // Failure cascade through the graph, then detach the node. A
        // completed worker cascades nothing; its dependents earned their
        // prerequisite.
        let failed = {
            let mut graph = self.graph.lock();
            let failed = graph.mark_failed(id.as_str(), now_ms);
            graph.remove(id.as_str());
            failed
        };
        for failed_id in failed.iter().filter(|f| f.as_str() != id.as_str()) {
            let failed_id = WorkerId::new(failed_id.clone());
            let existed = self
                .with_worker_mut(&failed_id, |w| w.status = WorkerStatus::Failed)
                .is_some();
            if existed {
                self.emit_updated(&failed_id);
            } else {
                // A parked dependent dies with its prerequisite
                let mut reg = self.registries.lock();
                if let Some(pending) = reg.pending.remove(&failed_id) {
                    drop(reg);
                    self.broadcaster.emit(EngineEvent::WorkerDeleted {
                        worker_id: failed_id.clone(),
                        label: pending.worker.label.clone(),
                        project: pending.worker.project.clone(),
                        reason: "dependency failed".to_string(),
                    });
                }
            }
        }

        // Parent bookkeeping
        if let Some(parent_id) = &worker.parent_worker_id {
            self.with_worker_mut(parent_id, |p| p.retire_child(id));
        }

        BulldozeState::clear(&BulldozeState::path_for(&worker.working_dir, id));

        {
            let mut reg = self.registries.lock();
            reg.remove_worker(id);
        }

        log_lifecycle("deleted", id.as_str(), reason);
        self.broadcaster.emit(EngineEvent::WorkerDeleted {
            worker_id: id.clone(),
            label: worker.label.clone(),
            project: worker.project.clone(),
            reason: reason.to_string(),
        });
        self.record_activity("deleted", &worker, format!("torn down ({reason})"));

        if let Err(e) = self.saver.save_now().await {
            tracing::warn!(error = %e, "post-teardown snapshot failed");
        }
    }

    /// Dismiss a worker: report uncommitted work best-effort, then kill.
    pub async fn dismiss_worker(&self, id: &WorkerId) -> Result<bool, EngineError> {
        if let Some(worker) = self.worker_clone(id) {
            match self.git.status_porcelain(&worker.working_dir).await {
                Ok(lines) if !lines.is_empty() => {
                    self.record_activity(
                        "dismissed",
                        &worker,
                        format!("dismissed with {} uncommitted change(s)", lines.len()),
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(worker_id = %id, error = %e, "dismissal git status failed");
                }
            }
        }
        self.kill_worker(id, KillOptions::auto("dismissed")).await
    }
}
