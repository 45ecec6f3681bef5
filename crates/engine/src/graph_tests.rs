// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn register(graph: &mut DependencyGraph, id: &str, deps: &[&str]) -> Result<RegisterOutcome, GraphError> {
    let deps: Vec<String> = deps.iter().map(|s| s.to_string()).collect();
    graph.register_worker(id, &deps, None, None, None)
}

#[test]
fn no_deps_is_ready() {
    let mut graph = DependencyGraph::new();
    let outcome = register(&mut graph, "a", &[]).unwrap();
    assert_eq!(outcome.status, NodeStatus::Ready);
}

#[test]
fn unmet_deps_is_waiting() {
    let mut graph = DependencyGraph::new();
    register(&mut graph, "a", &[]).unwrap();
    let outcome = register(&mut graph, "b", &["a"]).unwrap();
    assert_eq!(outcome.status, NodeStatus::Waiting);
}

#[test]
fn missing_prerequisite_counts_as_completed() {
    let mut graph = DependencyGraph::new();
    let outcome = register(&mut graph, "x", &["nonexistent"]).unwrap();
    assert_eq!(outcome.status, NodeStatus::Ready);
}

#[test]
fn self_dependency_is_filtered() {
    let mut graph = DependencyGraph::new();
    let outcome = register(&mut graph, "a", &["a"]).unwrap();
    assert_eq!(outcome.status, NodeStatus::Ready);
    assert!(graph.node("a").unwrap().depends_on.is_empty());
}

#[test]
fn duplicate_deps_are_filtered() {
    let mut graph = DependencyGraph::new();
    register(&mut graph, "a", &[]).unwrap();
    register(&mut graph, "b", &["a", "a", "a"]).unwrap();
    assert_eq!(graph.node("b").unwrap().depends_on, vec!["a"]);
}

#[test]
fn two_node_cycle_is_rejected_with_path() {
    let mut graph = DependencyGraph::new();
    register(&mut graph, "b", &[]).unwrap();
    register(&mut graph, "a", &["b"]).unwrap();

    // Re-registering b depending on a would close the loop
    let err = register(&mut graph, "b", &["a"]).unwrap_err();
    match err {
        GraphError::Cycle { path } => assert_eq!(path, vec!["b", "a", "b"]),
        other => panic!("expected cycle, got {other:?}"),
    }

    // Graph unchanged: b still has no deps and is ready
    let b = graph.node("b").unwrap();
    assert!(b.depends_on.is_empty());
    assert_eq!(b.status, NodeStatus::Ready);
}

#[test]
fn three_node_cycle_is_rejected() {
    let mut graph = DependencyGraph::new();
    register(&mut graph, "a", &[]).unwrap();
    register(&mut graph, "b", &["a"]).unwrap();
    register(&mut graph, "c", &["b"]).unwrap();
    let err = register(&mut graph, "a", &["c"]).unwrap_err();
    assert!(matches!(err, GraphError::Cycle { .. }));
}

#[test]
fn completion_readies_dependents_in_registration_order() {
    let mut graph = DependencyGraph::new();
    register(&mut graph, "root", &[]).unwrap();
    register(&mut graph, "late", &["root"]).unwrap();
    register(&mut graph, "early", &["root"]).unwrap();

    // Both wait on root; re-register order was late, early
    let result = graph.mark_completed("root", 1_000);
    assert_eq!(result.newly_ready, vec!["late", "early"]);
}

#[test]
fn completion_is_idempotent() {
    let mut graph = DependencyGraph::new();
    register(&mut graph, "a", &[]).unwrap();
    register(&mut graph, "b", &["a"]).unwrap();

    let first = graph.mark_completed("a", 1_000);
    assert_eq!(first.newly_ready, vec!["b"]);
    let second = graph.mark_completed("a", 2_000);
    assert!(second.newly_ready.is_empty());
}

#[test]
fn partial_deps_do_not_ready() {
    let mut graph = DependencyGraph::new();
    register(&mut graph, "a", &[]).unwrap();
    register(&mut graph, "b", &[]).unwrap();
    register(&mut graph, "c", &["a", "b"]).unwrap();

    let result = graph.mark_completed("a", 1_000);
    assert!(result.newly_ready.is_empty());
    let result = graph.mark_completed("b", 2_000);
    assert_eq!(result.newly_ready, vec!["c"]);
}

#[test]
fn failure_cascades_bfs_to_all_reachable() {
    let mut graph = DependencyGraph::new();
    register(&mut graph, "a", &[]).unwrap();
    register(&mut graph, "b", &["a"]).unwrap();
    register(&mut graph, "c", &["b"]).unwrap();
    register(&mut graph, "d", &["c"]).unwrap();
    register(&mut graph, "unrelated", &[]).unwrap();

    let failed = graph.mark_failed("a", 1_000);
    assert_eq!(failed, vec!["a", "b", "c", "d"]);
    assert_eq!(graph.node("unrelated").unwrap().status, NodeStatus::Ready);
}

#[test]
fn failing_a_completed_root_cascades_nothing() {
    let mut graph = DependencyGraph::new();
    register(&mut graph, "a", &[]).unwrap();
    register(&mut graph, "b", &["a"]).unwrap();
    register(&mut graph, "c", &["b"]).unwrap();

    graph.mark_completed("a", 1_000);
    graph.mark_started("b");
    graph.mark_completed("b", 2_000);

    // Teardown of a successfully-completed worker is not a failure: the
    // healthy tail of the chain must not be touched
    let failed = graph.mark_failed("a", 3_000);
    assert!(failed.is_empty());
    assert_eq!(graph.node("b").unwrap().status, NodeStatus::Completed);
    assert_eq!(graph.node("c").unwrap().status, NodeStatus::Ready);
}

#[test]
fn completed_root_teardown_leaves_running_dependent_alone() {
    let mut graph = DependencyGraph::new();
    register(&mut graph, "a", &[]).unwrap();
    register(&mut graph, "b", &["a"]).unwrap();

    graph.mark_completed("a", 1_000);
    graph.mark_started("b");

    let failed = graph.mark_failed("a", 2_000);
    assert!(failed.is_empty());
    assert_eq!(graph.node("b").unwrap().status, NodeStatus::Running);
}

#[test]
fn real_failure_cascades_through_completed_intermediates() {
    let mut graph = DependencyGraph::new();
    register(&mut graph, "a", &[]).unwrap();
    register(&mut graph, "b", &["a"]).unwrap();
    register(&mut graph, "c", &["b"]).unwrap();

    graph.mark_started("a");
    graph.mark_started("b");
    graph.mark_completed("b", 1_000);

    // a was still running when it failed; the cascade reaches c through the
    // completed b without regressing b itself
    let failed = graph.mark_failed("a", 2_000);
    assert_eq!(failed, vec!["a", "c"]);
    assert_eq!(graph.node("b").unwrap().status, NodeStatus::Completed);
}

#[test]
fn on_complete_action_is_returned_once() {
    let mut graph = DependencyGraph::new();
    let action = OnCompleteAction::Emit(strategos_core::EmitAction {
        event: "custom:done".to_string(),
        payload: serde_json::Value::Null,
    });
    graph
        .register_worker("a", &[], Some(action.clone()), None, None)
        .unwrap();

    let result = graph.mark_completed("a", 1_000);
    assert_eq!(result.on_complete, Some(action));
    let again = graph.mark_completed("a", 2_000);
    assert!(again.on_complete.is_none());
}

#[test]
fn remove_detaches_from_dependents() {
    let mut graph = DependencyGraph::new();
    register(&mut graph, "a", &[]).unwrap();
    register(&mut graph, "b", &["a"]).unwrap();
    graph.remove("b");

    // Completing a no longer triggers b
    let result = graph.mark_completed("a", 1_000);
    assert!(result.newly_ready.is_empty());
    assert!(graph.node("b").is_none());
}

#[test]
fn workflow_completes_when_all_workers_complete() {
    let mut graph = DependencyGraph::new();
    graph.ensure_workflow("wf1", "release", vec!["t1".into(), "t2".into()]);
    graph
        .register_worker("a", &[], None, Some("wf1"), Some("t1"))
        .unwrap();
    graph
        .register_worker("b", &[], None, Some("wf1"), Some("t2"))
        .unwrap();

    graph.mark_completed("a", 1_000);
    assert_eq!(graph.workflow("wf1").unwrap().status, WorkflowStatus::Active);
    graph.mark_completed("b", 2_000);
    let wf = graph.workflow("wf1").unwrap();
    assert_eq!(wf.status, WorkflowStatus::Completed);
    assert_eq!(wf.task_to_worker["t1"], "a");
}

#[test]
fn workflow_with_fewer_workers_than_tasks_stays_active() {
    let mut graph = DependencyGraph::new();
    graph.ensure_workflow("wf1", "release", vec!["t1".into(), "t2".into(), "t3".into()]);
    graph
        .register_worker("a", &[], None, Some("wf1"), Some("t1"))
        .unwrap();
    graph.mark_completed("a", 1_000);
    assert_eq!(graph.workflow("wf1").unwrap().status, WorkflowStatus::Active);
}

#[test]
fn workflow_fails_when_a_worker_fails() {
    let mut graph = DependencyGraph::new();
    graph
        .register_worker("a", &[], None, Some("wf1"), None)
        .unwrap();
    graph.mark_failed("a", 1_000);
    assert_eq!(graph.workflow("wf1").unwrap().status, WorkflowStatus::Failed);
}

#[test]
fn cleanup_removes_old_finished_nodes() {
    let mut graph = DependencyGraph::new();
    register(&mut graph, "old", &[]).unwrap();
    register(&mut graph, "fresh", &[]).unwrap();
    graph.mark_completed("old", 1_000);
    graph.mark_completed("fresh", 90_000);

    let removed = graph.cleanup_finished(60_000, 100_000);
    assert_eq!(removed, 1);
    assert!(graph.node("old").is_none());
    assert!(graph.node("fresh").is_some());
}

#[test]
fn cleanup_preserves_nodes_with_active_dependents() {
    let mut graph = DependencyGraph::new();
    register(&mut graph, "done", &[]).unwrap();
    register(&mut graph, "mid", &["done"]).unwrap();
    register(&mut graph, "waiting", &["mid"]).unwrap();
    graph.mark_completed("done", 0);
    // mid is ready (active), so done must survive even though it is old
    let removed = graph.cleanup_finished(60_000, 100_000);
    assert_eq!(removed, 0);
    assert!(graph.node("done").is_some());
}

#[test]
fn cleanup_removes_finished_workflows() {
    let mut graph = DependencyGraph::new();
    graph
        .register_worker("a", &[], None, Some("wf1"), None)
        .unwrap();
    graph.mark_completed("a", 1_000);
    assert!(graph.workflow("wf1").is_some());
    graph.cleanup_finished(60_000, 100_000);
    assert!(graph.workflow("wf1").is_none());
}

#[test]
fn validate_task_graph_accepts_dag() {
    let tasks = vec![
        TaskSpec { id: "a".into(), depends_on: vec![] },
        TaskSpec { id: "b".into(), depends_on: vec!["a".into()] },
        TaskSpec { id: "c".into(), depends_on: vec!["a".into(), "b".into()] },
    ];
    assert!(DependencyGraph::validate_task_graph(&tasks).is_ok());
}

#[test]
fn validate_task_graph_rejects_unknown_reference() {
    let tasks = vec![TaskSpec { id: "a".into(), depends_on: vec!["ghost".into()] }];
    let err = DependencyGraph::validate_task_graph(&tasks).unwrap_err();
    assert!(matches!(err, GraphError::UnknownReference { .. }));
}

#[test]
fn validate_task_graph_rejects_cycle_with_path() {
    let tasks = vec![
        TaskSpec { id: "a".into(), depends_on: vec!["b".into()] },
        TaskSpec { id: "b".into(), depends_on: vec!["c".into()] },
        TaskSpec { id: "c".into(), depends_on: vec!["a".into()] },
    ];
    let err = DependencyGraph::validate_task_graph(&tasks).unwrap_err();
    match err {
        GraphError::Cycle { path } => {
            assert_eq!(path.len(), 4);
            assert_eq!(path.first(), path.last());
        }
        other => panic!("expected cycle, got {other:?}"),
    }
}
