// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::collections::BTreeSet;

fn sample_worker() -> Worker {
    let mut w = Worker::new(
        WorkerId::new("abc12345"),
        "IMPL: build the codec".to_string(),
        PathBuf::from("/srv/projects/demo"),
        1_000,
    );
    w.ralph_token = Some("super-secret-token".to_string());
    w.task = Some("build the codec".to_string());
    w
}

#[test]
fn new_worker_derives_project_and_session_name() {
    let w = sample_worker();
    assert_eq!(w.project, "demo");
    assert_eq!(w.session_name, "strategos-abc12345");
    assert_eq!(w.status, WorkerStatus::Running);
    assert_eq!(w.health, WorkerHealth::Healthy);
}

#[test]
fn add_child_rejects_duplicates_and_self() {
    let mut w = sample_worker();
    let child = WorkerId::new("child001");
    w.add_child(child.clone());
    w.add_child(child.clone());
    w.add_child(w.id.clone());
    assert_eq!(w.child_worker_ids, vec![child]);
}

#[test]
fn retire_child_moves_to_history_once() {
    let mut w = sample_worker();
    let child = WorkerId::new("child001");
    w.add_child(child.clone());
    w.retire_child(&child);
    w.retire_child(&child);
    assert!(w.child_worker_ids.is_empty());
    assert_eq!(w.child_worker_history, vec![child]);
}

#[test]
fn normalized_payload_has_no_token_and_no_absolute_path() {
    let w = sample_worker();
    let value = serde_json::to_value(w.normalized()).unwrap();
    let text = value.to_string();
    assert!(!text.contains("super-secret-token"));
    assert!(!text.contains("/srv/projects"));
    assert!(text.contains("\"project\":\"demo\""));
}

#[test]
fn normalized_payload_keys_are_a_fixed_allowlist() {
    let w = sample_worker();
    let value = serde_json::to_value(w.normalized()).unwrap();
    let keys: BTreeSet<String> = value
        .as_object()
        .unwrap()
        .keys()
        .cloned()
        .collect();

    for forbidden in [
        "ralph_token",
        "working_dir",
        "capture_failures",
        "last_accept_fingerprint",
        "last_violation_hash",
        "idle_ticks",
        "bulldoze_send_errors",
    ] {
        assert!(!keys.contains(forbidden), "leaked key: {forbidden}");
    }
    for required in ["id", "label", "project", "status", "health", "depends_on"] {
        assert!(keys.contains(required), "missing key: {required}");
    }
}

#[test]
fn ralph_outputs_accepts_object_and_string() {
    let mut w = sample_worker();
    w.ralph_outputs = Some(serde_json::json!({"report": "done"}));
    assert!(w.normalized().ralph_outputs.unwrap().is_object());
    w.ralph_outputs = Some(serde_json::json!("plain text"));
    assert!(w.normalized().ralph_outputs.unwrap().is_string());
}

#[yare::parameterized(
    completed = { WorkerStatus::Completed, true },
    stopped   = { WorkerStatus::Stopped, true },
    failed    = { WorkerStatus::Failed, true },
    running   = { WorkerStatus::Running, false },
    error     = { WorkerStatus::Error, false },
    pending   = { WorkerStatus::Pending, false },
)]
fn terminal_statuses(status: WorkerStatus, terminal: bool) {
    assert_eq!(status.is_terminal(), terminal);
}

#[test]
fn status_serializes_snake_case() {
    assert_eq!(
        serde_json::to_string(&WorkerStatus::AwaitingReview).unwrap(),
        "\"awaiting_review\""
    );
    assert_eq!(
        serde_json::to_string(&RalphStatus::InProgress).unwrap(),
        "\"in_progress\""
    );
}
