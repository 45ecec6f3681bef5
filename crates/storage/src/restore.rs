// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Snapshot re-admission.
//!
//! A snapshot is attacker-adjacent input: it survives crashes, partial
//! upgrades, and hand edits. Nothing is trusted: the file is size-capped,
//! the shape is checked, the worker list is capped, and every record is
//! rebuilt field-by-field from an explicit allowlist. String fields are
//! coerced, arrays are filtered by element type, and anything else is
//! dropped on the floor.

use crate::persist::PersistedWorker;
use serde_json::Value;
use std::path::Path;
use strategos_core::{DelegationMetrics, RalphStatus, WorkerHealth, WorkerId, WorkerStatus};
use thiserror::Error;

/// Snapshots larger than this are refused outright.
pub const MAX_SNAPSHOT_BYTES: u64 = 10 * 1024 * 1024;
/// Hard cap on restored workers.
pub const MAX_RESTORED_WORKERS: usize = 500;

/// Errors from snapshot restore
#[derive(Debug, Error)]
pub enum RestoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot too large: {0} bytes")]
    TooLarge(u64),
    #[error("snapshot malformed: {0}")]
    Malformed(String),
}

/// Load and validate a snapshot file.
///
/// Returns `Ok(None)` when the file does not exist. Individual invalid
/// records are skipped with a warning; only a structurally broken file is
/// an error.
pub fn load_snapshot_validated(
    path: &Path,
) -> Result<Option<(u64, Vec<PersistedWorker>)>, RestoreError> {
    if !path.exists() {
        return Ok(None);
    }

    let meta = std::fs::metadata(path)?;
    if meta.len() > MAX_SNAPSHOT_BYTES {
        return Err(RestoreError::TooLarge(meta.len()));
    }

    let text = std::fs::read_to_string(path)?;
    let value: Value = serde_json::from_str(&text)
        .map_err(|e| RestoreError::Malformed(e.to_string()))?;

    let obj = value
        .as_object()
        .ok_or_else(|| RestoreError::Malformed("top level is not an object".into()))?;
    let timestamp_ms = obj
        .get("timestamp_ms")
        .and_then(Value::as_u64)
        .unwrap_or(0);
    let raw_workers = obj
        .get("workers")
        .and_then(Value::as_array)
        .ok_or_else(|| RestoreError::Malformed("missing workers array".into()))?;

    if raw_workers.len() > MAX_RESTORED_WORKERS {
        tracing::warn!(
            count = raw_workers.len(),
            cap = MAX_RESTORED_WORKERS,
            "snapshot worker list exceeds cap, truncating"
        );
    }

    let mut workers = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for raw in raw_workers.iter().take(MAX_RESTORED_WORKERS) {
        match validate_record(raw) {
            Some(record) => {
                if seen.insert(record.id.clone()) {
                    workers.push(record);
                } else {
                    tracing::warn!(id = %record.id, "duplicate worker id in snapshot, skipping");
                }
            }
            None => {
                tracing::warn!("invalid worker record in snapshot, skipping");
            }
        }
    }

    Ok(Some((timestamp_ms, workers)))
}

/// Rebuild one record through the field allowlist, or reject it.
fn validate_record(raw: &Value) -> Option<PersistedWorker> {
    let obj = raw.as_object()?;

    let id = coerce_string(obj.get("id")?)?;
    if !WorkerId::is_valid_format(&id) {
        return None;
    }
    let label = coerce_string(obj.get("label")?)?;
    if label.is_empty() || label.len() > 500 {
        return None;
    }
    let working_dir = coerce_string(obj.get("working_dir")?)?;
    if !working_dir.starts_with('/') {
        return None;
    }

    Some(PersistedWorker {
        id,
        label,
        working_dir: working_dir.into(),
        backend: parse_enum(obj.get("backend")).unwrap_or_default(),
        status: parse_enum(obj.get("status")).unwrap_or(WorkerStatus::Stopped),
        health: parse_enum(obj.get("health")).unwrap_or(WorkerHealth::Degraded),
        task: opt_string(obj.get("task")),
        created_at_ms: u64_field(obj.get("created_at_ms")),
        last_activity_ms: u64_field(obj.get("last_activity_ms")),
        last_output_ms: u64_field(obj.get("last_output_ms")),
        completed_at_ms: opt_u64(obj.get("completed_at_ms")),
        awaiting_review_since_ms: opt_u64(obj.get("awaiting_review_since_ms")),
        crashed_at_ms: opt_u64(obj.get("crashed_at_ms")),
        crash_reason: opt_string(obj.get("crash_reason")),
        depends_on: id_array(obj.get("depends_on")),
        workflow_id: opt_string(obj.get("workflow_id")),
        task_id: opt_string(obj.get("task_id")),
        parent_worker_id: opt_string(obj.get("parent_worker_id"))
            .filter(|s| WorkerId::is_valid_format(s)),
        parent_label: opt_string(obj.get("parent_label")),
        child_worker_ids: id_array(obj.get("child_worker_ids")),
        child_worker_history: id_array(obj.get("child_worker_history")),
        auto_accept: bool_field(obj.get("auto_accept")),
        ralph_mode: bool_field(obj.get("ralph_mode")),
        ralph_token: opt_string(obj.get("ralph_token")),
        bulldoze_mode: bool_field(obj.get("bulldoze_mode")),
        auto_continue: bool_field(obj.get("auto_continue")),
        ralph_status: parse_enum(obj.get("ralph_status")).unwrap_or(RalphStatus::Pending),
        ralph_progress: u64_field(obj.get("ralph_progress")).min(100) as u8,
        ralph_current_step: opt_string(obj.get("ralph_current_step")),
        ralph_learnings: string_array(obj.get("ralph_learnings")),
        // Both the object and string shapes are legal here
        ralph_outputs: obj
            .get("ralph_outputs")
            .filter(|v| v.is_object() || v.is_string())
            .cloned(),
        ralph_artifacts: string_array(obj.get("ralph_artifacts")),
        ralph_signal_count: u64_field(obj.get("ralph_signal_count")) as u32,
        delegation_metrics: obj
            .get("delegation_metrics")
            .and_then(|v| serde_json::from_value::<DelegationMetrics>(v.clone()).ok())
            .unwrap_or_default(),
        bulldoze_cycles_completed: u64_field(obj.get("bulldoze_cycles_completed")) as u32,
        auto_continue_count: u64_field(obj.get("auto_continue_count")) as u32,
        rate_limited: bool_field(obj.get("rate_limited")),
        rate_limit_reset_at_ms: opt_u64(obj.get("rate_limit_reset_at_ms")),
    })
}

/// Strings pass through; numbers and bools are coerced; everything else is
/// rejected.
fn coerce_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn opt_string(v: Option<&Value>) -> Option<String> {
    v.and_then(coerce_string).filter(|s| !s.is_empty())
}

fn u64_field(v: Option<&Value>) -> u64 {
    v.and_then(Value::as_u64).unwrap_or(0)
}

fn opt_u64(v: Option<&Value>) -> Option<u64> {
    v.and_then(Value::as_u64)
}

fn bool_field(v: Option<&Value>) -> bool {
    v.and_then(Value::as_bool).unwrap_or(false)
}

/// Keep only string elements; a snapshot with junk in an array loses the
/// junk, not the worker.
fn string_array(v: Option<&Value>) -> Vec<String> {
    v.and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|i| i.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// String elements that also look like worker ids.
fn id_array(v: Option<&Value>) -> Vec<String> {
    string_array(v)
        .into_iter()
        .filter(|s| WorkerId::is_valid_format(s))
        .collect()
}

fn parse_enum<T: serde::de::DeserializeOwned>(v: Option<&Value>) -> Option<T> {
    v.and_then(|v| serde_json::from_value(v.clone()).ok())
}

#[cfg(test)]
#[path = "restore_tests.rs"]
mod tests;
