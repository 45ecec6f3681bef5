// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dependency graph gating worker execution.
//!
//! Edges express "A waits for B to complete". Cycle detection runs before
//! any edge is inserted, so the graph is a DAG at every observable moment.
//! Failure cascades breadth-first through dependents; completed nodes are
//! never regressed (auto-cleanup kills racing the completion path must not
//! flip a finished worker to failed).

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use strategos_core::OnCompleteAction;
use thiserror::Error;

/// Errors from graph mutation and validation
#[derive(Debug, Error, PartialEq)]
pub enum GraphError {
    #[error("dependency cycle: {}", path.join(" -> "))]
    Cycle { path: Vec<String> },
    #[error("task {task} references unknown dependency: {reference}")]
    UnknownReference { task: String, reference: String },
}

/// Node status inside the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Waiting,
    Ready,
    Running,
    Completed,
    Failed,
}

/// One dependency node.
#[derive(Debug, Clone)]
pub struct DepNode {
    pub worker_id: String,
    /// Effective prerequisites: known ids, deduplicated, self-refs dropped.
    pub depends_on: Vec<String>,
    pub on_complete: Option<OnCompleteAction>,
    pub status: NodeStatus,
    pub completed_at_ms: Option<u64>,
    pub workflow_id: Option<String>,
    seq: u64,
}

/// Workflow status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Active,
    Completed,
    Failed,
}

/// A workflow groups related workers under one id.
#[derive(Debug, Clone)]
pub struct Workflow {
    pub id: String,
    pub name: String,
    pub tasks: Vec<String>,
    pub status: WorkflowStatus,
    pub worker_ids: Vec<String>,
    pub task_to_worker: HashMap<String, String>,
    pub finished_at_ms: Option<u64>,
}

/// Result of registering a worker.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisterOutcome {
    pub status: NodeStatus,
}

/// Result of marking a worker completed.
#[derive(Debug, Clone, Default)]
pub struct CompletionResult {
    /// Dependents that became ready, in registration order.
    pub newly_ready: Vec<String>,
    pub on_complete: Option<OnCompleteAction>,
}

/// Declarative task for `validate_task_graph`.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskSpec {
    pub id: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

/// The graph itself.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    nodes: HashMap<String, DepNode>,
    /// Reverse edges: prerequisite id → ids waiting on it.
    dependents: HashMap<String, Vec<String>>,
    workflows: HashMap<String, Workflow>,
    seq: u64,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self, id: &str) -> Option<&DepNode> {
        self.nodes.get(id)
    }

    pub fn workflow(&self, id: &str) -> Option<&Workflow> {
        self.workflows.get(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Create or update a workflow's declarative task list.
    pub fn ensure_workflow(&mut self, id: &str, name: &str, tasks: Vec<String>) {
        self.workflows
            .entry(id.to_string())
            .and_modify(|wf| {
                if !tasks.is_empty() {
                    wf.tasks = tasks.clone();
                }
            })
            .or_insert_with(|| Workflow {
                id: id.to_string(),
                name: name.to_string(),
                tasks,
                status: WorkflowStatus::Active,
                worker_ids: Vec::new(),
                task_to_worker: HashMap::new(),
                finished_at_ms: None,
            });
    }

    /// Register a worker node.
    ///
    /// Self-dependencies and duplicates are filtered; unknown prerequisites
    /// are treated as already completed (they were garbage-collected). The
    /// cycle check runs against the candidate edge set and a rejection
    /// leaves the graph unchanged.
    pub fn register_worker(
        &mut self,
        id: &str,
        depends_on: &[String],
        on_complete: Option<OnCompleteAction>,
        workflow_id: Option<&str>,
        task_id: Option<&str>,
    ) -> Result<RegisterOutcome, GraphError> {
        let mut effective: Vec<String> = Vec::new();
        for dep in depends_on {
            if dep == id || effective.contains(dep) {
                continue;
            }
            // Unknown prerequisites count as completed and add no edge
            if self.nodes.contains_key(dep) {
                effective.push(dep.clone());
            }
        }

        if let Some(path) = self.find_cycle_with_candidate(id, &effective) {
            return Err(GraphError::Cycle { path });
        }

        // Re-registration (restore path) replaces the node's edges
        if self.nodes.contains_key(id) {
            self.detach_dependents_of(id);
        }

        let status = if effective
            .iter()
            .all(|dep| self.node_completed(dep))
        {
            NodeStatus::Ready
        } else {
            NodeStatus::Waiting
        };

        for dep in &effective {
            self.dependents
                .entry(dep.clone())
                .or_default()
                .push(id.to_string());
        }

        self.seq += 1;
        self.nodes.insert(
            id.to_string(),
            DepNode {
                worker_id: id.to_string(),
                depends_on: effective,
                on_complete,
                status,
                completed_at_ms: None,
                workflow_id: workflow_id.map(str::to_string),
                seq: self.seq,
            },
        );

        if let Some(wf_id) = workflow_id {
            self.ensure_workflow(wf_id, wf_id, Vec::new());
            if let Some(wf) = self.workflows.get_mut(wf_id) {
                if !wf.worker_ids.iter().any(|w| w == id) {
                    wf.worker_ids.push(id.to_string());
                }
                if let Some(task) = task_id {
                    wf.task_to_worker
                        .insert(task.to_string(), id.to_string());
                }
            }
        }

        Ok(RegisterOutcome { status })
    }

    fn node_completed(&self, id: &str) -> bool {
        self.nodes
            .get(id)
            .map(|n| n.status == NodeStatus::Completed)
            // GC'd prerequisites are treated as done
            .unwrap_or(true)
    }

    /// DFS with a recursion stack over the graph plus the candidate node.
    /// Returns the offending path when a cycle would be created.
    fn find_cycle_with_candidate(
        &self,
        candidate: &str,
        candidate_deps: &[String],
    ) -> Option<Vec<String>> {
        let deps_of = |id: &str| -> Vec<String> {
            if id == candidate {
                candidate_deps.to_vec()
            } else {
                self.nodes
                    .get(id)
                    .map(|n| n.depends_on.clone())
                    .unwrap_or_default()
            }
        };

        let mut visited: HashSet<String> = HashSet::new();
        let mut stack: Vec<String> = Vec::new();
        let mut on_stack: HashSet<String> = HashSet::new();

        fn dfs(
            id: &str,
            deps_of: &dyn Fn(&str) -> Vec<String>,
            visited: &mut HashSet<String>,
            stack: &mut Vec<String>,
            on_stack: &mut HashSet<String>,
        ) -> Option<Vec<String>> {
            if on_stack.contains(id) {
                // Emit the cycle portion of the stack, closed with the repeat
                let start = stack.iter().position(|s| s == id).unwrap_or(0);
                let mut path: Vec<String> = stack[start..].to_vec();
                path.push(id.to_string());
                return Some(path);
            }
            if visited.contains(id) {
                return None;
            }
            visited.insert(id.to_string());
            stack.push(id.to_string());
            on_stack.insert(id.to_string());
            for dep in deps_of(id) {
                if let Some(path) = dfs(&dep, deps_of, visited, stack, on_stack) {
                    return Some(path);
                }
            }
            stack.pop();
            on_stack.remove(id);
            None
        }

        dfs(candidate, &deps_of, &mut visited, &mut stack, &mut on_stack)
    }

    pub fn mark_started(&mut self, id: &str) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.status = NodeStatus::Running;
        }
    }

    /// Mark a worker completed. Idempotent: the second call returns an empty
    /// result. Newly-ready dependents come back in registration order.
    pub fn mark_completed(&mut self, id: &str, now_ms: u64) -> CompletionResult {
        let Some(node) = self.nodes.get_mut(id) else {
            return CompletionResult::default();
        };
        if node.status == NodeStatus::Completed {
            return CompletionResult::default();
        }
        node.status = NodeStatus::Completed;
        node.completed_at_ms = Some(now_ms);
        let on_complete = node.on_complete.clone();
        let workflow_id = node.workflow_id.clone();

        let mut newly_ready: Vec<(u64, String)> = Vec::new();
        let dependent_ids = self.dependents.get(id).cloned().unwrap_or_default();
        for dep_id in dependent_ids {
            let Some(dep) = self.nodes.get(&dep_id) else {
                continue;
            };
            if dep.status != NodeStatus::Waiting {
                continue;
            }
            let all_done = dep
                .depends_on
                .iter()
                .all(|d| self.node_completed(d));
            if all_done {
                let seq = dep.seq;
                if let Some(dep) = self.nodes.get_mut(&dep_id) {
                    dep.status = NodeStatus::Ready;
                }
                newly_ready.push((seq, dep_id));
            }
        }
        newly_ready.sort_by_key(|(seq, _)| *seq);

        if let Some(wf_id) = workflow_id {
            self.refresh_workflow_status(&wf_id, now_ms);
        }

        CompletionResult {
            newly_ready: newly_ready.into_iter().map(|(_, id)| id).collect(),
            on_complete,
        }
    }

    /// Mark a worker failed and cascade breadth-first to every reachable
    /// dependent that is still waiting or running. Completed nodes are
    /// untouched. Returns every node transitioned to failed.
    ///
    /// A Completed root cascades nothing: tearing down a worker that
    /// finished successfully (auto-cleanup, late kill) is not a failure its
    /// dependents should inherit.
    pub fn mark_failed(&mut self, id: &str, now_ms: u64) -> Vec<String> {
        let mut transitioned = Vec::new();
        let Some(node) = self.nodes.get_mut(id) else {
            return transitioned;
        };
        if node.status == NodeStatus::Completed {
            return transitioned;
        }
        if node.status != NodeStatus::Failed {
            node.status = NodeStatus::Failed;
            transitioned.push(id.to_string());
        }

        let mut queue: VecDeque<String> = VecDeque::from([id.to_string()]);
        let mut seen: HashSet<String> = HashSet::from([id.to_string()]);
        while let Some(current) = queue.pop_front() {
            for dep_id in self.dependents.get(&current).cloned().unwrap_or_default() {
                if !seen.insert(dep_id.clone()) {
                    continue;
                }
                if let Some(dep) = self.nodes.get_mut(&dep_id) {
                    if matches!(
                        dep.status,
                        NodeStatus::Waiting | NodeStatus::Running | NodeStatus::Ready
                    ) {
                        dep.status = NodeStatus::Failed;
                        transitioned.push(dep_id.clone());
                    }
                }
                queue.push_back(dep_id);
            }
        }

        let workflow_ids: HashSet<String> = transitioned
            .iter()
            .filter_map(|t| self.nodes.get(t).and_then(|n| n.workflow_id.clone()))
            .collect();
        for wf_id in workflow_ids {
            self.refresh_workflow_status(&wf_id, now_ms);
        }

        transitioned
    }

    /// Remove a node, detaching it from all dependent lists.
    pub fn remove(&mut self, id: &str) {
        self.nodes.remove(id);
        self.dependents.remove(id);
        for list in self.dependents.values_mut() {
            list.retain(|d| d != id);
        }
        self.dependents.retain(|_, list| !list.is_empty());
    }

    fn detach_dependents_of(&mut self, id: &str) {
        for list in self.dependents.values_mut() {
            list.retain(|d| d != id);
        }
        self.dependents.retain(|_, list| !list.is_empty());
    }

    /// Garbage-collect finished workflows and stale standalone nodes.
    ///
    /// A workflow goes when it finished ≥ `max_age_ms` ago. A node goes when
    /// it is completed/failed, older than `max_age_ms`, and no *active*
    /// dependent still references it.
    pub fn cleanup_finished(&mut self, max_age_ms: u64, now_ms: u64) -> usize {
        let mut removed = 0;

        let workflow_keys: Vec<String> = self.workflows.keys().cloned().collect();
        for wf_id in workflow_keys {
            let expired = self.workflows.get(&wf_id).is_some_and(|wf| {
                matches!(wf.status, WorkflowStatus::Completed | WorkflowStatus::Failed)
                    && wf
                        .finished_at_ms
                        .is_some_and(|t| now_ms.saturating_sub(t) >= max_age_ms)
            });
            if expired {
                self.workflows.remove(&wf_id);
            }
        }

        let node_keys: Vec<String> = self.nodes.keys().cloned().collect();
        for id in node_keys {
            let Some(node) = self.nodes.get(&id) else {
                continue;
            };
            if !matches!(node.status, NodeStatus::Completed | NodeStatus::Failed) {
                continue;
            }
            let age_ok = node
                .completed_at_ms
                .map(|t| now_ms.saturating_sub(t) >= max_age_ms)
                // Failed nodes carry no completion time; GC them by default
                .unwrap_or(node.status == NodeStatus::Failed);
            if !age_ok {
                continue;
            }
            let has_active_dependent = self
                .dependents
                .get(&id)
                .map(|deps| {
                    deps.iter().any(|d| {
                        self.nodes.get(d).is_some_and(|n| {
                            !matches!(n.status, NodeStatus::Completed | NodeStatus::Failed)
                        })
                    })
                })
                .unwrap_or(false);
            if has_active_dependent {
                continue;
            }
            self.remove(&id);
            removed += 1;
        }

        removed
    }

    fn refresh_workflow_status(&mut self, wf_id: &str, now_ms: u64) {
        let Some(wf) = self.workflows.get(wf_id) else {
            return;
        };
        if wf.status != WorkflowStatus::Active {
            return;
        }
        let statuses: Vec<NodeStatus> = wf
            .worker_ids
            .iter()
            .filter_map(|w| self.nodes.get(w).map(|n| n.status))
            .collect();

        let any_failed = statuses.iter().any(|s| *s == NodeStatus::Failed);
        let all_completed = !statuses.is_empty()
            && statuses.iter().all(|s| *s == NodeStatus::Completed)
            && wf.worker_ids.len() >= wf.tasks.len();

        if let Some(wf) = self.workflows.get_mut(wf_id) {
            if any_failed {
                wf.status = WorkflowStatus::Failed;
                wf.finished_at_ms = Some(now_ms);
            } else if all_completed {
                wf.status = WorkflowStatus::Completed;
                wf.finished_at_ms = Some(now_ms);
            }
        }
    }

    /// Validate a declarative task list: every reference must exist within
    /// the list and the induced graph must be acyclic.
    pub fn validate_task_graph(tasks: &[TaskSpec]) -> Result<(), GraphError> {
        let ids: HashSet<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
        for task in tasks {
            for dep in &task.depends_on {
                if !ids.contains(dep.as_str()) {
                    return Err(GraphError::UnknownReference {
                        task: task.id.clone(),
                        reference: dep.clone(),
                    });
                }
            }
        }

        let deps_by_id: HashMap<&str, &Vec<String>> =
            tasks.iter().map(|t| (t.id.as_str(), &t.depends_on)).collect();
        for task in tasks {
            let mut stack = Vec::new();
            let mut on_stack = HashSet::new();
            let mut visited = HashSet::new();
            if let Some(path) = declarative_dfs(
                &task.id,
                &deps_by_id,
                &mut visited,
                &mut stack,
                &mut on_stack,
            ) {
                return Err(GraphError::Cycle { path });
            }
        }
        Ok(())
    }
}

fn declarative_dfs(
    id: &str,
    deps_by_id: &HashMap<&str, &Vec<String>>,
    visited: &mut HashSet<String>,
    stack: &mut Vec<String>,
    on_stack: &mut HashSet<String>,
) -> Option<Vec<String>> {
    if on_stack.contains(id) {
        let start = stack.iter().position(|s| s == id).unwrap_or(0);
        let mut path: Vec<String> = stack[start..].to_vec();
        path.push(id.to_string());
        return Some(path);
    }
    if visited.contains(id) {
        return None;
    }
    visited.insert(id.to_string());
    stack.push(id.to_string());
    on_stack.insert(id.to_string());
    if let Some(deps) = deps_by_id.get(id) {
        for dep in deps.iter() {
            if let Some(path) = declarative_dfs(dep, deps_by_id, visited, stack, on_stack) {
                return Some(path);
            }
        }
    }
    stack.pop();
    on_stack.remove(id);
    None
}

#[cfg(test)]
#[path = "graph_tests.rs"]
mod tests;
