// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker spawning: validation, dependency gating, session creation.

use super::{Engine, EngineError};
use crate::events::log_lifecycle;
use crate::state::{PendingWorker, Registries};
use std::path::{Component, PathBuf};
use strategos_adapters::{BackendCommand, MuxAdapter};
use strategos_core::{
    escape_prompt_xml, Backend, Clock, EngineEvent, IdGen, NormalizedWorker, OnCompleteAction,
    Role, Worker, WorkerId,
};

/// Spawn-time options. Everything here is carried by pending workers so a
/// dependency-gated spawn starts later with identical behavior.
#[derive(Debug, Clone, Default)]
pub struct SpawnOptions {
    pub task: Option<String>,
    pub depends_on: Vec<String>,
    pub workflow_id: Option<String>,
    pub task_id: Option<String>,
    pub parent_worker_id: Option<String>,
    pub auto_accept: bool,
    pub ralph_mode: bool,
    pub bulldoze_mode: bool,
    pub auto_continue: bool,
    pub allow_duplicate: bool,
    pub backend: Option<Backend>,
    pub on_complete: Option<OnCompleteAction>,
    /// Verbatim first input, replacing the structured task message.
    pub initial_input: Option<String>,
}

/// A spawn request from the API boundary.
#[derive(Debug, Clone)]
pub struct SpawnRequest {
    /// Path relative to the project root (or absolute inside it).
    pub project_path: String,
    pub label: String,
    pub options: SpawnOptions,
}

impl<M: MuxAdapter, C: Clock, I: IdGen + 'static> Engine<M, C, I> {
    /// Spawn a worker, or park it pending if its dependencies are unmet.
    pub async fn spawn_worker(
        &self,
        req: SpawnRequest,
    ) -> Result<NormalizedWorker, EngineError> {
        let working_dir = self.resolve_working_dir(&req.project_path)?;
        if req.label.trim().is_empty() {
            return Err(EngineError::Validation("label must not be empty".into()));
        }

        let project = working_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let spawn_key = Registries::spawn_key(&req.label, &project);

        // Admission: capacity, duplicates, breaker: one lock, then reserve
        // the in-flight key so a concurrent duplicate loses immediately.
        {
            let mut reg = self.registries.lock();
            if reg.population() >= self.config.max_workers {
                return Err(EngineError::CapacityExceeded(self.config.max_workers));
            }
            if !req.options.allow_duplicate && reg.spawn_key_taken(&spawn_key) {
                return Err(EngineError::DuplicateWorker(spawn_key));
            }
            if reg.breaker.is_tripped(self.clock.now()) {
                return Err(EngineError::BreakerOpen);
            }
            reg.inflight_spawns.insert(spawn_key.clone());
        }

        let id = WorkerId::new(self.id_gen.next());

        // Dependency registration gates everything else
        let outcome = {
            let mut graph = self.graph.lock();
            graph.register_worker(
                id.as_str(),
                &req.options.depends_on,
                req.options.on_complete.clone(),
                req.options.workflow_id.as_deref(),
                req.options.task_id.as_deref(),
            )
        };
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(crate::graph::GraphError::Cycle { path }) => {
                self.registries.lock().inflight_spawns.remove(&spawn_key);
                return Err(EngineError::CycleDetected { path });
            }
            Err(e) => {
                self.registries.lock().inflight_spawns.remove(&spawn_key);
                return Err(EngineError::Validation(e.to_string()));
            }
        };

        let mut worker = self.build_worker(&id, &req, working_dir);

        if outcome.status == crate::graph::NodeStatus::Waiting {
            worker.status = strategos_core::WorkerStatus::Pending;
            let normalized = worker.normalized();
            {
                let mut reg = self.registries.lock();
                reg.pending.insert(
                    id.clone(),
                    PendingWorker {
                        worker: worker.clone(),
                        options: req.options.clone(),
                        parked_at_ms: self.now_ms(),
                    },
                );
                reg.inflight_spawns.remove(&spawn_key);
            }
            self.broadcaster.emit(EngineEvent::WorkerPending {
                worker_id: id.clone(),
                label: worker.label.clone(),
                depends_on: worker.depends_on.clone(),
            });
            self.record_activity("pending", &worker, "parked awaiting dependencies".into());
            self.saver.request_save();
            return Ok(normalized);
        }

        let result = self.launch(worker, &req.options, false).await;
        self.registries.lock().inflight_spawns.remove(&spawn_key);
        result
    }

    /// Start a previously parked worker whose dependencies are now met.
    pub async fn start_pending_worker(
        &self,
        id: &WorkerId,
    ) -> Result<NormalizedWorker, EngineError> {
        let pending = {
            let mut reg = self.registries.lock();
            reg.pending
                .remove(id)
                .ok_or_else(|| EngineError::WorkerNotFound(id.to_string()))?
        };
        let ready = {
            let graph = self.graph.lock();
            graph
                .node(id.as_str())
                .map(|n| n.status == crate::graph::NodeStatus::Ready)
                .unwrap_or(false)
        };
        if !ready {
            // Put it back; the dependency is not actually satisfied
            let mut reg = self.registries.lock();
            reg.pending.insert(id.clone(), pending);
            return Err(EngineError::Validation(format!(
                "worker {id} still has unmet dependencies"
            )));
        }

        {
            let mut reg = self.registries.lock();
            if reg.breaker.is_tripped(self.clock.now()) {
                reg.pending.insert(id.clone(), pending);
                return Err(EngineError::BreakerOpen);
            }
        }

        let key = Registries::spawn_key(&pending.worker.label, &pending.worker.project);
        self.registries.lock().inflight_spawns.insert(key.clone());
        let mut worker = pending.worker.clone();
        worker.status = strategos_core::WorkerStatus::Running;
        self.broadcaster.emit(EngineEvent::WorkerDependenciesSatisfied {
            worker_id: id.clone(),
        });
        let result = self.launch(worker, &pending.options, false).await;
        self.registries.lock().inflight_spawns.remove(&key);
        result
    }

    /// The shared launch path: context file, session, registration, delayed
    /// first message. Used by spawn, pending starts, respawn, and restore.
    pub(crate) async fn launch(
        &self,
        mut worker: Worker,
        options: &SpawnOptions,
        resuming: bool,
    ) -> Result<NormalizedWorker, EngineError> {
        let id = worker.id.clone();
        let role = worker.role();

        if worker.ralph_mode && worker.ralph_token.is_none() {
            worker.ralph_token = Some(strategos_core::id::generate_ralph_token());
        }

        if let Err(e) = self.context.write_for(&worker).await {
            self.graph.lock().remove(id.as_str());
            return Err(EngineError::Validation(format!(
                "context file write failed: {e}"
            )));
        }

        let backend = BackendCommand::new(worker.backend);
        let command = backend.interactive(role);
        let env = vec![("STRATEGOS_WORKER_ID".to_string(), id.to_string())];

        let created = self
            .mux
            .new_session(&worker.session_name, &worker.working_dir, &command, &env)
            .await;

        if let Err(e) = created {
            if e.counts_against_breaker() {
                let mut reg = self.registries.lock();
                reg.breaker.on_failure(self.clock.now());
            }
            // Unwind the partial spawn
            let _ = self
                .context
                .remove_for(&id, &worker.working_dir, worker.backend, 1)
                .await;
            self.graph.lock().remove(id.as_str());
            log_lifecycle("spawn_failed", id.as_str(), &e.to_string());
            return Err(EngineError::Mux(e));
        }
        {
            let mut reg = self.registries.lock();
            reg.breaker.on_success();
        }

        self.graph.lock().mark_started(id.as_str());
        worker.status = strategos_core::WorkerStatus::Running;
        if worker.bulldoze_mode && worker.bulldoze_started_at_ms.is_none() {
            worker.bulldoze_started_at_ms = Some(self.now_ms());
        }

        // Parent bookkeeping is idempotent; a vanished parent is cleared
        if let Some(parent_id) = worker.parent_worker_id.clone() {
            let mut reg = self.registries.lock();
            match reg.workers.get_mut(&parent_id) {
                Some(parent) => {
                    parent.add_child(id.clone());
                    parent.delegation_metrics.spawns_issued += 1;
                    worker.parent_label = Some(parent.label.clone());
                }
                None => {
                    tracing::warn!(worker_id = %id, parent = %parent_id, "parent no longer exists, clearing");
                    worker.parent_worker_id = None;
                    worker.parent_label = None;
                }
            }
        }

        let normalized = worker.normalized();
        {
            let mut reg = self.registries.lock();
            reg.insert_worker(worker.clone());
        }
        self.history.start_session(&normalized);

        self.schedule_initial_message(&id, options, role);
        if worker.ralph_mode {
            self.schedule_ralph_reminder(&id, resuming);
        }

        log_lifecycle("spawned", id.as_str(), &worker.label);
        self.broadcaster.emit(EngineEvent::WorkerCreated {
            worker: normalized.clone(),
        });
        self.record_activity("created", &worker, format!("spawned in {}", worker.project));
        self.saver.request_save();

        Ok(normalized)
    }

    fn build_worker(&self, id: &WorkerId, req: &SpawnRequest, working_dir: PathBuf) -> Worker {
        let mut worker = Worker::new(id.clone(), req.label.clone(), working_dir, self.now_ms());
        worker.backend = req.options.backend.unwrap_or(self.config.backend);
        worker.task = req.options.task.clone();
        worker.depends_on = req
            .options
            .depends_on
            .iter()
            .map(|d| WorkerId::new(d.clone()))
            .collect();
        worker.workflow_id = req.options.workflow_id.clone().map(Into::into);
        worker.task_id = req.options.task_id.clone().map(Into::into);
        worker.parent_worker_id = req.options.parent_worker_id.clone().map(WorkerId::new);
        worker.auto_accept = req.options.auto_accept;
        worker.ralph_mode = req.options.ralph_mode;
        worker.bulldoze_mode = req.options.bulldoze_mode;
        worker.auto_continue = req.options.auto_continue;
        worker
    }

    /// Deliver the first message after a short delay so the backend TUI has
    /// rendered before keystrokes arrive.
    fn schedule_initial_message(&self, id: &WorkerId, options: &SpawnOptions, role: Role) {
        let message = if let Some(input) = &options.initial_input {
            input.clone()
        } else if let Some(task) = &options.task {
            initial_task_message(task)
        } else if role == Role::General {
            "Awaiting orders. Survey the project, report readiness, and hold for tasking."
                .to_string()
        } else {
            return;
        };

        let Some(engine) = self.handle() else {
            return;
        };
        let id = id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(engine.config.initial_message_delay).await;
            if engine.worker_clone(&id).is_none() {
                return;
            }
            if let Err(e) = engine.send_system_input(&id, message).await {
                tracing::warn!(worker_id = %id, error = %e, "initial message delivery failed");
            }
        });
    }

    /// Remind a Ralph worker to adopt the signal protocol if it has not yet.
    fn schedule_ralph_reminder(&self, id: &WorkerId, resuming: bool) {
        let delay = if resuming {
            self.config.restore_reminder_delay
        } else {
            self.config.ralph_reminder_delay
        };
        let Some(engine) = self.handle() else {
            return;
        };
        let id = id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(worker) = engine.worker_clone(&id) else {
                return;
            };
            if worker.ralph_signal_count > 0 {
                return;
            }
            let message = format!(
                "Reminder: report progress via POST {}/api/ralph/signal/by-worker/{} \
                 (details in your rules file).",
                engine.config.api_base, id
            );
            if let Err(e) = engine.send_system_input(&id, message).await {
                tracing::debug!(worker_id = %id, error = %e, "ralph reminder delivery failed");
            }
        });
    }

    /// Resolve and contain a project path inside the configured root.
    pub(crate) fn resolve_working_dir(&self, project_path: &str) -> Result<PathBuf, EngineError> {
        let requested = PathBuf::from(project_path);
        let joined = if requested.is_absolute() {
            requested
        } else {
            self.config.project_root.join(requested)
        };

        // Lexically normalize, refusing traversal
        let mut normalized = PathBuf::new();
        for component in joined.components() {
            match component {
                Component::ParentDir => {
                    return Err(EngineError::PathOutsideRoot(project_path.to_string()));
                }
                Component::CurDir => {}
                other => normalized.push(other),
            }
        }

        if !normalized.starts_with(&self.config.project_root) {
            return Err(EngineError::PathOutsideRoot(project_path.to_string()));
        }
        if !normalized.is_dir() {
            return Err(EngineError::Validation(format!(
                "project directory does not exist: {project_path}"
            )));
        }
        Ok(normalized)
    }
}

/// Structured first message for a tasked worker.
pub(crate) fn initial_task_message(task: &str) -> String {
    let task = escape_prompt_xml(task);
    format!(
        "You have your orders.\n\n\
         <mission>\n\
           <purpose>{task}</purpose>\n\
           <success_criteria>The purpose above is achieved, verified by you, with work committed.</success_criteria>\n\
           <key_steps>Plan briefly. Execute. Verify with the project's own tooling. Report.</key_steps>\n\
           <constraints>Stay inside your project directory. Coordinate rather than duplicate.</constraints>\n\
         </mission>"
    )
}
