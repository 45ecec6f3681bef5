// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Worker domain model.
//!
//! `Worker` deliberately derives no serde traits: the only serializable
//! projections are [`NormalizedWorker`] (the allowlisted boundary payload)
//! and the storage crate's persisted record. Anything not explicitly copied
//! into one of those never leaves the process.

use crate::id::{TaskId, WorkerId, WorkflowId};
use crate::role::Role;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Lifecycle status of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Pending,
    Waiting,
    Ready,
    Running,
    AwaitingReview,
    Completed,
    Stopped,
    Error,
    Failed,
}

impl WorkerStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WorkerStatus::Completed | WorkerStatus::Stopped | WorkerStatus::Failed
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WorkerStatus::Pending => "pending",
            WorkerStatus::Waiting => "waiting",
            WorkerStatus::Ready => "ready",
            WorkerStatus::Running => "running",
            WorkerStatus::AwaitingReview => "awaiting_review",
            WorkerStatus::Completed => "completed",
            WorkerStatus::Stopped => "stopped",
            WorkerStatus::Error => "error",
            WorkerStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Health as judged by the monitoring sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerHealth {
    Healthy,
    Degraded,
    Stalled,
    Crashed,
    Dead,
}

impl WorkerHealth {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkerHealth::Healthy => "healthy",
            WorkerHealth::Degraded => "degraded",
            WorkerHealth::Stalled => "stalled",
            WorkerHealth::Crashed => "crashed",
            WorkerHealth::Dead => "dead",
        }
    }
}

impl std::fmt::Display for WorkerHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Progress protocol status reported by the worker itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RalphStatus {
    Pending,
    InProgress,
    Done,
    Blocked,
}

/// AI backend driving this worker's session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    #[default]
    Claude,
    Gemini,
}

impl Backend {
    pub fn as_str(self) -> &'static str {
        match self {
            Backend::Claude => "claude",
            Backend::Gemini => "gemini",
        }
    }
}

/// Counters on delegation behavior, mostly interesting for strategic tiers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegationMetrics {
    pub spawns_issued: u32,
    pub role_violations: u32,
    pub files_edited: u32,
    pub commands_run: u32,
}

/// A managed terminal session running an AI coding agent.
#[derive(Debug, Clone)]
pub struct Worker {
    // identity
    pub id: WorkerId,
    pub label: String,
    /// Basename of the working directory.
    pub project: String,
    pub working_dir: PathBuf,
    pub session_name: String,
    pub backend: Backend,

    // lifecycle
    pub status: WorkerStatus,
    pub health: WorkerHealth,
    pub task: Option<String>,
    pub created_at_ms: u64,
    pub last_activity_ms: u64,
    pub last_output_ms: u64,
    pub completed_at_ms: Option<u64>,
    pub awaiting_review_since_ms: Option<u64>,
    pub crashed_at_ms: Option<u64>,
    pub crash_reason: Option<String>,

    // relations
    pub depends_on: Vec<WorkerId>,
    pub workflow_id: Option<WorkflowId>,
    pub task_id: Option<TaskId>,
    pub parent_worker_id: Option<WorkerId>,
    pub parent_label: Option<String>,
    pub child_worker_ids: Vec<WorkerId>,
    pub child_worker_history: Vec<WorkerId>,

    // control flags
    pub auto_accept: bool,
    pub auto_accept_paused: bool,
    pub ralph_mode: bool,
    /// Opaque per-worker secret; never crosses the boundary.
    pub ralph_token: Option<String>,
    pub bulldoze_mode: bool,
    pub bulldoze_paused: bool,
    pub auto_continue: bool,

    // signaling
    pub ralph_status: RalphStatus,
    pub ralph_progress: u8,
    pub ralph_current_step: Option<String>,
    pub ralph_learnings: Vec<String>,
    /// Accepted as either an object or a plain string.
    pub ralph_outputs: Option<serde_json::Value>,
    pub ralph_artifacts: Vec<String>,
    pub ralph_signal_count: u32,
    pub last_ralph_signal_ms: Option<u64>,

    // metrics
    pub queued_commands: u32,
    pub delegation_metrics: DelegationMetrics,
    pub bulldoze_cycles_completed: u32,
    pub auto_continue_count: u32,
    pub rate_limited: bool,
    pub rate_limit_reset_at_ms: Option<u64>,
    pub compacting: bool,

    // runtime-only control state (never persisted, never normalized)
    pub capture_failures: u32,
    pub last_accept_fingerprint: Option<String>,
    pub last_accept_at_ms: Option<u64>,
    pub last_violation_hash: Option<u64>,
    pub idle_ticks: u32,
    pub idle_warned: bool,
    pub bulldoze_started_at_ms: Option<u64>,
    pub bulldoze_send_errors: u32,
    pub bulldoze_stale_cycles: u32,
    pub bulldoze_pause_reason: Option<String>,
    pub output_change_count: u64,
}

impl Worker {
    /// Create a fresh worker record at spawn time.
    pub fn new(id: WorkerId, label: String, working_dir: PathBuf, now_ms: u64) -> Self {
        let project = working_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let session_name = id.session_name();
        Self {
            id,
            label,
            project,
            working_dir,
            session_name,
            backend: Backend::default(),
            status: WorkerStatus::Running,
            health: WorkerHealth::Healthy,
            task: None,
            created_at_ms: now_ms,
            last_activity_ms: now_ms,
            last_output_ms: now_ms,
            completed_at_ms: None,
            awaiting_review_since_ms: None,
            crashed_at_ms: None,
            crash_reason: None,
            depends_on: Vec::new(),
            workflow_id: None,
            task_id: None,
            parent_worker_id: None,
            parent_label: None,
            child_worker_ids: Vec::new(),
            child_worker_history: Vec::new(),
            auto_accept: false,
            auto_accept_paused: false,
            ralph_mode: false,
            ralph_token: None,
            bulldoze_mode: false,
            bulldoze_paused: false,
            auto_continue: false,
            ralph_status: RalphStatus::Pending,
            ralph_progress: 0,
            ralph_current_step: None,
            ralph_learnings: Vec::new(),
            ralph_outputs: None,
            ralph_artifacts: Vec::new(),
            ralph_signal_count: 0,
            last_ralph_signal_ms: None,
            queued_commands: 0,
            delegation_metrics: DelegationMetrics::default(),
            bulldoze_cycles_completed: 0,
            auto_continue_count: 0,
            rate_limited: false,
            rate_limit_reset_at_ms: None,
            compacting: false,
            capture_failures: 0,
            last_accept_fingerprint: None,
            last_accept_at_ms: None,
            last_violation_hash: None,
            idle_ticks: 0,
            idle_warned: false,
            bulldoze_started_at_ms: None,
            bulldoze_send_errors: 0,
            bulldoze_stale_cycles: 0,
            bulldoze_pause_reason: None,
            output_change_count: 0,
        }
    }

    pub fn role(&self) -> Role {
        Role::detect(&self.label)
    }

    pub fn is_protected(&self) -> bool {
        self.role().is_protected()
    }

    /// Add a child id, keeping the list duplicate-free and self-free.
    pub fn add_child(&mut self, child: WorkerId) {
        if child == self.id || self.child_worker_ids.contains(&child) {
            return;
        }
        self.child_worker_ids.push(child);
    }

    /// Splice a child out of the live list and record it in history.
    pub fn retire_child(&mut self, child: &WorkerId) {
        self.child_worker_ids.retain(|c| c != child);
        if !self.child_worker_history.contains(child) {
            self.child_worker_history.push(child.clone());
        }
    }

    /// Build the allowlisted boundary projection.
    pub fn normalized(&self) -> NormalizedWorker {
        NormalizedWorker {
            id: self.id.clone(),
            label: self.label.clone(),
            project: self.project.clone(),
            session_name: self.session_name.clone(),
            backend: self.backend,
            status: self.status,
            health: self.health,
            task: self.task.clone(),
            created_at_ms: self.created_at_ms,
            last_activity_ms: self.last_activity_ms,
            last_output_ms: self.last_output_ms,
            completed_at_ms: self.completed_at_ms,
            awaiting_review_since_ms: self.awaiting_review_since_ms,
            crashed_at_ms: self.crashed_at_ms,
            crash_reason: self.crash_reason.clone(),
            depends_on: self.depends_on.clone(),
            workflow_id: self.workflow_id.clone(),
            task_id: self.task_id.clone(),
            parent_worker_id: self.parent_worker_id.clone(),
            parent_label: self.parent_label.clone(),
            child_worker_ids: self.child_worker_ids.clone(),
            child_worker_history: self.child_worker_history.clone(),
            auto_accept: self.auto_accept,
            auto_accept_paused: self.auto_accept_paused,
            ralph_mode: self.ralph_mode,
            bulldoze_mode: self.bulldoze_mode,
            bulldoze_paused: self.bulldoze_paused,
            auto_continue: self.auto_continue,
            ralph_status: self.ralph_status,
            ralph_progress: self.ralph_progress,
            ralph_current_step: self.ralph_current_step.clone(),
            ralph_learnings: self.ralph_learnings.clone(),
            ralph_outputs: self.ralph_outputs.clone(),
            ralph_artifacts: self.ralph_artifacts.clone(),
            ralph_signal_count: self.ralph_signal_count,
            queued_commands: self.queued_commands,
            delegation_metrics: self.delegation_metrics.clone(),
            bulldoze_cycles_completed: self.bulldoze_cycles_completed,
            auto_continue_count: self.auto_continue_count,
            rate_limited: self.rate_limited,
            rate_limit_reset_at_ms: self.rate_limit_reset_at_ms,
        }
    }
}

/// The outbound projection of a worker.
///
/// Every event payload and API response is built from this struct and nothing
/// else. It carries no token, no internal flags, and no absolute path; the
/// working directory appears only as its basename (`project`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedWorker {
    pub id: WorkerId,
    pub label: String,
    pub project: String,
    pub session_name: String,
    pub backend: Backend,
    pub status: WorkerStatus,
    pub health: WorkerHealth,
    pub task: Option<String>,
    pub created_at_ms: u64,
    pub last_activity_ms: u64,
    pub last_output_ms: u64,
    pub completed_at_ms: Option<u64>,
    pub awaiting_review_since_ms: Option<u64>,
    pub crashed_at_ms: Option<u64>,
    pub crash_reason: Option<String>,
    pub depends_on: Vec<WorkerId>,
    pub workflow_id: Option<WorkflowId>,
    pub task_id: Option<TaskId>,
    pub parent_worker_id: Option<WorkerId>,
    pub parent_label: Option<String>,
    pub child_worker_ids: Vec<WorkerId>,
    pub child_worker_history: Vec<WorkerId>,
    pub auto_accept: bool,
    pub auto_accept_paused: bool,
    pub ralph_mode: bool,
    pub bulldoze_mode: bool,
    pub bulldoze_paused: bool,
    pub auto_continue: bool,
    pub ralph_status: RalphStatus,
    pub ralph_progress: u8,
    pub ralph_current_step: Option<String>,
    pub ralph_learnings: Vec<String>,
    pub ralph_outputs: Option<serde_json::Value>,
    pub ralph_artifacts: Vec<String>,
    pub ralph_signal_count: u32,
    pub queued_commands: u32,
    pub delegation_metrics: DelegationMetrics,
    pub bulldoze_cycles_completed: u32,
    pub auto_continue_count: u32,
    pub rate_limited: bool,
    pub rate_limit_reset_at_ms: Option<u64>,
}

/// Compact hint surfaced when a worker dies mid-task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RespawnSuggestion {
    pub worker_id: WorkerId,
    pub label: String,
    pub project: String,
    pub task: String,
    pub died_at_ms: u64,
    pub ralph_progress: u8,
    pub ralph_current_step: Option<String>,
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
