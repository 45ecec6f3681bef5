// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Debounced, crash-safe worker snapshots.
//!
//! All writes go to `workers.json.tmp` then rename, so a crash mid-write
//! leaves either the previous snapshot or a fully valid new one. A single
//! background task owns the write chain; the debounce coalesces bursts.

use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use strategos_core::{
    Backend, DelegationMetrics, RalphStatus, Worker, WorkerHealth, WorkerId, WorkerStatus,
};
use thiserror::Error;
use tokio::sync::Notify;

/// Errors from snapshot persistence
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Serializable worker record: the snapshot schema.
///
/// Unlike the boundary payload this keeps the absolute working directory and
/// the Ralph token; the snapshot never leaves the persistence directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedWorker {
    pub id: String,
    pub label: String,
    pub working_dir: PathBuf,
    #[serde(default)]
    pub backend: Backend,
    pub status: WorkerStatus,
    pub health: WorkerHealth,
    #[serde(default)]
    pub task: Option<String>,
    pub created_at_ms: u64,
    #[serde(default)]
    pub last_activity_ms: u64,
    #[serde(default)]
    pub last_output_ms: u64,
    #[serde(default)]
    pub completed_at_ms: Option<u64>,
    #[serde(default)]
    pub awaiting_review_since_ms: Option<u64>,
    #[serde(default)]
    pub crashed_at_ms: Option<u64>,
    #[serde(default)]
    pub crash_reason: Option<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub workflow_id: Option<String>,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub parent_worker_id: Option<String>,
    #[serde(default)]
    pub parent_label: Option<String>,
    #[serde(default)]
    pub child_worker_ids: Vec<String>,
    #[serde(default)]
    pub child_worker_history: Vec<String>,
    #[serde(default)]
    pub auto_accept: bool,
    #[serde(default)]
    pub ralph_mode: bool,
    #[serde(default)]
    pub ralph_token: Option<String>,
    #[serde(default)]
    pub bulldoze_mode: bool,
    #[serde(default)]
    pub auto_continue: bool,
    #[serde(default = "default_ralph_status")]
    pub ralph_status: RalphStatus,
    #[serde(default)]
    pub ralph_progress: u8,
    #[serde(default)]
    pub ralph_current_step: Option<String>,
    #[serde(default)]
    pub ralph_learnings: Vec<String>,
    #[serde(default)]
    pub ralph_outputs: Option<serde_json::Value>,
    #[serde(default)]
    pub ralph_artifacts: Vec<String>,
    #[serde(default)]
    pub ralph_signal_count: u32,
    #[serde(default)]
    pub delegation_metrics: DelegationMetrics,
    #[serde(default)]
    pub bulldoze_cycles_completed: u32,
    #[serde(default)]
    pub auto_continue_count: u32,
    #[serde(default)]
    pub rate_limited: bool,
    #[serde(default)]
    pub rate_limit_reset_at_ms: Option<u64>,
}

fn default_ralph_status() -> RalphStatus {
    RalphStatus::Pending
}

impl PersistedWorker {
    /// Project a live worker into the snapshot schema. Field-by-field on
    /// purpose: runtime-only control state never reaches disk.
    pub fn from_worker(w: &Worker) -> Self {
        Self {
            id: w.id.as_str().to_string(),
            label: w.label.clone(),
            working_dir: w.working_dir.clone(),
            backend: w.backend,
            status: w.status,
            health: w.health,
            task: w.task.clone(),
            created_at_ms: w.created_at_ms,
            last_activity_ms: w.last_activity_ms,
            last_output_ms: w.last_output_ms,
            completed_at_ms: w.completed_at_ms,
            awaiting_review_since_ms: w.awaiting_review_since_ms,
            crashed_at_ms: w.crashed_at_ms,
            crash_reason: w.crash_reason.clone(),
            depends_on: w.depends_on.iter().map(|d| d.as_str().to_string()).collect(),
            workflow_id: w.workflow_id.as_ref().map(|x| x.as_str().to_string()),
            task_id: w.task_id.as_ref().map(|x| x.as_str().to_string()),
            parent_worker_id: w.parent_worker_id.as_ref().map(|x| x.as_str().to_string()),
            parent_label: w.parent_label.clone(),
            child_worker_ids: w
                .child_worker_ids
                .iter()
                .map(|c| c.as_str().to_string())
                .collect(),
            child_worker_history: w
                .child_worker_history
                .iter()
                .map(|c| c.as_str().to_string())
                .collect(),
            auto_accept: w.auto_accept,
            ralph_mode: w.ralph_mode,
            ralph_token: w.ralph_token.clone(),
            bulldoze_mode: w.bulldoze_mode,
            auto_continue: w.auto_continue,
            ralph_status: w.ralph_status,
            ralph_progress: w.ralph_progress,
            ralph_current_step: w.ralph_current_step.clone(),
            ralph_learnings: w.ralph_learnings.clone(),
            ralph_outputs: w.ralph_outputs.clone(),
            ralph_artifacts: w.ralph_artifacts.clone(),
            ralph_signal_count: w.ralph_signal_count,
            delegation_metrics: w.delegation_metrics.clone(),
            bulldoze_cycles_completed: w.bulldoze_cycles_completed,
            auto_continue_count: w.auto_continue_count,
            rate_limited: w.rate_limited,
            rate_limit_reset_at_ms: w.rate_limit_reset_at_ms,
        }
    }

    /// Rehydrate a live worker from the snapshot record.
    pub fn into_worker(self, now_ms: u64) -> Worker {
        let mut w = Worker::new(
            WorkerId::new(self.id),
            self.label,
            self.working_dir,
            self.created_at_ms,
        );
        w.backend = self.backend;
        w.status = self.status;
        w.health = self.health;
        w.task = self.task;
        w.last_activity_ms = if self.last_activity_ms > 0 {
            self.last_activity_ms
        } else {
            now_ms
        };
        w.last_output_ms = if self.last_output_ms > 0 {
            self.last_output_ms
        } else {
            now_ms
        };
        w.completed_at_ms = self.completed_at_ms;
        w.awaiting_review_since_ms = self.awaiting_review_since_ms;
        w.crashed_at_ms = self.crashed_at_ms;
        w.crash_reason = self.crash_reason;
        w.depends_on = self.depends_on.into_iter().map(WorkerId::new).collect();
        w.workflow_id = self.workflow_id.map(Into::into);
        w.task_id = self.task_id.map(Into::into);
        w.parent_worker_id = self.parent_worker_id.map(WorkerId::new);
        w.parent_label = self.parent_label;
        w.child_worker_ids = self.child_worker_ids.into_iter().map(WorkerId::new).collect();
        w.child_worker_history = self
            .child_worker_history
            .into_iter()
            .map(WorkerId::new)
            .collect();
        w.auto_accept = self.auto_accept;
        w.ralph_mode = self.ralph_mode;
        w.ralph_token = self.ralph_token;
        w.bulldoze_mode = self.bulldoze_mode;
        w.auto_continue = self.auto_continue;
        w.ralph_status = self.ralph_status;
        w.ralph_progress = self.ralph_progress.min(100);
        w.ralph_current_step = self.ralph_current_step;
        w.ralph_learnings = self.ralph_learnings;
        w.ralph_outputs = self.ralph_outputs;
        w.ralph_artifacts = self.ralph_artifacts;
        w.ralph_signal_count = self.ralph_signal_count;
        w.delegation_metrics = self.delegation_metrics;
        w.bulldoze_cycles_completed = self.bulldoze_cycles_completed;
        w.auto_continue_count = self.auto_continue_count;
        w.rate_limited = self.rate_limited;
        w.rate_limit_reset_at_ms = self.rate_limit_reset_at_ms;
        w
    }
}

/// The on-disk snapshot: every worker that existed at serialization time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSnapshot {
    pub timestamp_ms: u64,
    pub workers: Vec<PersistedWorker>,
}

impl WorkerSnapshot {
    /// Save atomically (write to `.tmp`, fsync, then rename).
    pub fn save(&self, path: &Path) -> Result<(), PersistError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp_path = tmp_path_for(path);
        {
            let file = File::create(&tmp_path)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer(&mut writer, self)?;
            let file = writer.into_inner().map_err(|e| e.into_error())?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, path)?;
        Ok(())
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(".tmp");
    PathBuf::from(os)
}

/// Produces the current snapshot on demand (the engine closes over its
/// registries here).
pub type SnapshotProvider = Arc<dyn Fn() -> WorkerSnapshot + Send + Sync>;

/// Debounced snapshot writer.
///
/// `request_save` is cheap and callable from anywhere; the single background
/// task wakes, waits out the debounce window, and commits one write for any
/// burst of requests. `save_now` bypasses the debounce but still serializes
/// behind the same lock. `save_sync` is the crash-handler variant: blocking,
/// best-effort, no locks.
pub struct StateSaver {
    path: PathBuf,
    provider: SnapshotProvider,
    notify: Arc<Notify>,
    dirty: Arc<AtomicBool>,
    write_lock: Arc<tokio::sync::Mutex<()>>,
    debounce: Duration,
}

impl StateSaver {
    pub fn new(path: PathBuf, provider: SnapshotProvider, debounce: Duration) -> Self {
        Self {
            path,
            provider,
            notify: Arc::new(Notify::new()),
            dirty: Arc::new(AtomicBool::new(false)),
            write_lock: Arc::new(tokio::sync::Mutex::new(())),
            debounce,
        }
    }

    /// Spawn the background debounce task.
    pub fn spawn(&self) -> tokio::task::JoinHandle<()> {
        let path = self.path.clone();
        let provider = Arc::clone(&self.provider);
        let notify = Arc::clone(&self.notify);
        let dirty = Arc::clone(&self.dirty);
        let write_lock = Arc::clone(&self.write_lock);
        let debounce = self.debounce;

        tokio::spawn(async move {
            loop {
                notify.notified().await;
                tokio::time::sleep(debounce).await;
                if dirty.swap(false, Ordering::SeqCst) {
                    let snapshot = provider();
                    let _guard = write_lock.lock().await;
                    if let Err(e) = snapshot.save(&path) {
                        tracing::warn!(error = %e, path = %path.display(), "state snapshot failed");
                    }
                }
            }
        })
    }

    /// Mark state dirty; the background task commits after the debounce.
    pub fn request_save(&self) {
        self.dirty.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    /// Write immediately, bypassing the debounce.
    pub async fn save_now(&self) -> Result<(), PersistError> {
        self.dirty.store(false, Ordering::SeqCst);
        let snapshot = (self.provider)();
        let _guard = self.write_lock.lock().await;
        snapshot.save(&self.path)
    }

    /// Synchronous best-effort save for crash handlers. Errors are logged
    /// and swallowed; persistence must never take the process down.
    pub fn save_sync(&self) {
        let snapshot = (self.provider)();
        if let Err(e) = snapshot.save(&self.path) {
            tracing::error!(error = %e, "crash-path state snapshot failed");
        }
    }
}

#[cfg(test)]
#[path = "persist_tests.rs"]
mod tests;
