// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine events published on the broadcaster.
//!
//! Every payload is built from [`NormalizedWorker`](crate::worker::NormalizedWorker)
//! or plain scalars, then passed through [`strip_sensitive_keys`] at
//! publication time. Sensitive-key stripping lives here, at the boundary,
//! not at every call site.

use crate::id::WorkerId;
use crate::worker::NormalizedWorker;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// One entry in the bounded activity ring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub at_ms: u64,
    /// Short machine-readable kind, e.g. "created", "completed", "killed".
    pub kind: String,
    pub worker_id: WorkerId,
    pub label: String,
    pub project: String,
    pub message: String,
}

/// Typed engine events; names are the wire-stable `worker:*` strings.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    WorkerCreated { worker: NormalizedWorker },
    WorkerPending { worker_id: WorkerId, label: String, depends_on: Vec<WorkerId> },
    WorkerUpdated { worker: NormalizedWorker },
    WorkerDeleted { worker_id: WorkerId, label: String, project: String, reason: String },
    WorkerOutput { worker_id: WorkerId, chunk: String },
    WorkerCompleted { worker: NormalizedWorker },
    WorkerCrashed { worker: NormalizedWorker, reason: String },
    WorkerStalled { worker_id: WorkerId, idle_ms: u64 },
    WorkerRespawned { old_worker_id: WorkerId, new_worker_id: WorkerId, attempt: u32 },
    WorkerRateLimited { worker_id: WorkerId, reset_at_ms: Option<u64> },
    WorkerAutoContinue { worker_id: WorkerId, attempt: u32 },
    WorkerAutoContinueExhausted { worker_id: WorkerId, attempts: u32 },
    WorkerRoleViolation { worker_id: WorkerId, label: String, detail: String },
    WorkerGeneralDead { worker_id: WorkerId, label: String },
    WorkerKillBlocked { worker_id: WorkerId, caller: Option<WorkerId>, reason: String },
    WorkerBulldozeCycle { worker_id: WorkerId, cycle: u32, audit: bool },
    WorkerBulldozePaused { worker_id: WorkerId, reason: String },
    WorkerDependenciesSatisfied { worker_id: WorkerId },
    DependenciesTriggered { completed: WorkerId, started: Vec<WorkerId> },
    ActivityNew { entry: ActivityEntry },
    /// Dispatched `emit` on-complete actions. The name has already passed the
    /// prefix allowlist in [`crate::action`].
    Custom { name: String, payload: Value },
}

impl EngineEvent {
    /// Wire-stable event name.
    pub fn name(&self) -> &str {
        match self {
            EngineEvent::WorkerCreated { .. } => "worker:created",
            EngineEvent::WorkerPending { .. } => "worker:pending",
            EngineEvent::WorkerUpdated { .. } => "worker:updated",
            EngineEvent::WorkerDeleted { .. } => "worker:deleted",
            EngineEvent::WorkerOutput { .. } => "worker:output",
            EngineEvent::WorkerCompleted { .. } => "worker:completed",
            EngineEvent::WorkerCrashed { .. } => "worker:crashed",
            EngineEvent::WorkerStalled { .. } => "worker:stalled",
            EngineEvent::WorkerRespawned { .. } => "worker:respawned",
            EngineEvent::WorkerRateLimited { .. } => "worker:rate_limited",
            EngineEvent::WorkerAutoContinue { .. } => "worker:autocontinue",
            EngineEvent::WorkerAutoContinueExhausted { .. } => "worker:autocontinue:exhausted",
            EngineEvent::WorkerRoleViolation { .. } => "worker:role:violation",
            EngineEvent::WorkerGeneralDead { .. } => "worker:general:dead",
            EngineEvent::WorkerKillBlocked { .. } => "worker:kill:blocked",
            EngineEvent::WorkerBulldozeCycle { .. } => "worker:bulldoze:cycle",
            EngineEvent::WorkerBulldozePaused { .. } => "worker:bulldoze:paused",
            EngineEvent::WorkerDependenciesSatisfied { .. } => "worker:dependencies_satisfied",
            EngineEvent::DependenciesTriggered { .. } => "dependencies:triggered",
            EngineEvent::ActivityNew { .. } => "activity:new",
            EngineEvent::Custom { name, .. } => name,
        }
    }

    /// Convert to the outbound wire form, applying sensitive-key stripping.
    pub fn into_outbound(self) -> OutboundEvent {
        let name = self.name().to_string();
        let payload = match self {
            EngineEvent::WorkerCreated { worker }
            | EngineEvent::WorkerUpdated { worker }
            | EngineEvent::WorkerCompleted { worker } => {
                json!({ "worker": worker })
            }
            EngineEvent::WorkerPending { worker_id, label, depends_on } => {
                json!({ "worker_id": worker_id, "label": label, "depends_on": depends_on })
            }
            EngineEvent::WorkerDeleted { worker_id, label, project, reason } => {
                json!({ "worker_id": worker_id, "label": label, "project": project, "reason": reason })
            }
            EngineEvent::WorkerOutput { worker_id, chunk } => {
                json!({ "worker_id": worker_id, "chunk": chunk })
            }
            EngineEvent::WorkerCrashed { worker, reason } => {
                json!({ "worker": worker, "reason": reason })
            }
            EngineEvent::WorkerStalled { worker_id, idle_ms } => {
                json!({ "worker_id": worker_id, "idle_ms": idle_ms })
            }
            EngineEvent::WorkerRespawned { old_worker_id, new_worker_id, attempt } => {
                json!({ "old_worker_id": old_worker_id, "new_worker_id": new_worker_id, "attempt": attempt })
            }
            EngineEvent::WorkerRateLimited { worker_id, reset_at_ms } => {
                json!({ "worker_id": worker_id, "reset_at_ms": reset_at_ms })
            }
            EngineEvent::WorkerAutoContinue { worker_id, attempt } => {
                json!({ "worker_id": worker_id, "attempt": attempt })
            }
            EngineEvent::WorkerAutoContinueExhausted { worker_id, attempts } => {
                json!({ "worker_id": worker_id, "attempts": attempts })
            }
            EngineEvent::WorkerRoleViolation { worker_id, label, detail } => {
                json!({ "worker_id": worker_id, "label": label, "detail": detail })
            }
            EngineEvent::WorkerGeneralDead { worker_id, label } => {
                json!({ "worker_id": worker_id, "label": label })
            }
            EngineEvent::WorkerKillBlocked { worker_id, caller, reason } => {
                json!({ "worker_id": worker_id, "caller": caller, "reason": reason })
            }
            EngineEvent::WorkerBulldozeCycle { worker_id, cycle, audit } => {
                json!({ "worker_id": worker_id, "cycle": cycle, "audit": audit })
            }
            EngineEvent::WorkerBulldozePaused { worker_id, reason } => {
                json!({ "worker_id": worker_id, "reason": reason })
            }
            EngineEvent::WorkerDependenciesSatisfied { worker_id } => {
                json!({ "worker_id": worker_id })
            }
            EngineEvent::DependenciesTriggered { completed, started } => {
                json!({ "completed": completed, "started": started })
            }
            EngineEvent::ActivityNew { entry } => json!({ "entry": entry }),
            EngineEvent::Custom { payload, .. } => payload,
        };
        OutboundEvent {
            name,
            payload: strip_sensitive_keys(payload),
        }
    }
}

/// The wire form delivered to subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundEvent {
    pub name: String,
    pub payload: Value,
}

const SENSITIVE_KEYS: &[&str] = &[
    "ralph_token",
    "ralphtoken",
    "api_key",
    "apikey",
    "password",
    "secret",
    "token",
    "credential",
];

/// Recursively remove keys that may carry secrets from a JSON value.
///
/// Matching is case-insensitive and underscore-insensitive so `ralphToken`,
/// `apiKey`, and `API_KEY` are all caught.
pub fn strip_sensitive_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(k, _)| !is_sensitive_key(k))
                .map(|(k, v)| (k, strip_sensitive_keys(v)))
                .collect(),
        ),
        Value::Array(items) => {
            Value::Array(items.into_iter().map(strip_sensitive_keys).collect())
        }
        other => other,
    }
}

fn is_sensitive_key(key: &str) -> bool {
    let folded: String = key
        .chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(|c| c.to_lowercase())
        .collect();
    SENSITIVE_KEYS
        .iter()
        .any(|s| folded == s.replace('_', ""))
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
