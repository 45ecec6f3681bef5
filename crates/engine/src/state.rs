// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-wide registries.
//!
//! One `Registries` value, guarded by a single mutex on the engine, holds
//! every mutable map the components share. The per-worker send/drain flags
//! live inside it so the guards and the data they protect can never be
//! locked separately.

use crate::runtime::SpawnOptions;
use std::collections::{HashMap, HashSet, VecDeque};
use strategos_core::{
    ActivityEntry, BreakerStatus, CircuitBreaker, RespawnSuggestion, Worker, WorkerId,
};

/// Rolling output buffer cap: 2 MiB.
pub const OUTPUT_BUFFER_CAP: usize = 2 * 1024 * 1024;
/// Command queue bound; overflow fails the enqueue.
pub const COMMAND_QUEUE_CAP: usize = 1000;
/// Activity ring bound.
pub const ACTIVITY_CAP: usize = 100;
/// Respawn suggestion ring bound.
pub const SUGGESTION_CAP: usize = 20;

/// A worker whose dependencies are not yet satisfied, parked with all of its
/// spawn-time options.
#[derive(Debug, Clone)]
pub struct PendingWorker {
    pub worker: Worker,
    pub options: SpawnOptions,
    pub parked_at_ms: u64,
}

/// Per-(label, project) respawn bookkeeping.
#[derive(Debug, Clone, Copy, Default)]
pub struct RespawnCounter {
    pub count: u32,
    pub last_attempt_ms: u64,
}

/// Aggregate facts for `get_resource_stats`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ResourceStats {
    pub live_workers: usize,
    pub pending_workers: usize,
    pub inflight_spawns: usize,
    pub workers_by_status: HashMap<String, usize>,
    pub output_buffer_bytes: usize,
    pub queued_commands: usize,
    pub breaker: BreakerStatus,
}

/// Every process-wide mutable registry, in one place.
pub struct Registries {
    pub workers: HashMap<WorkerId, Worker>,
    pub output_buffers: HashMap<WorkerId, String>,
    pub command_queues: HashMap<WorkerId, VecDeque<String>>,
    pub pending: HashMap<WorkerId, PendingWorker>,
    /// Keys `"label::project"` with a spawn currently in flight.
    pub inflight_spawns: HashSet<String>,
    /// Workers under output capture and health monitoring.
    pub monitored: HashSet<WorkerId>,
    /// Re-entrancy guard: a pane input send is outstanding.
    pub sending_input: HashSet<WorkerId>,
    /// Re-entrancy guard: a queue drainer is active.
    pub draining: HashSet<WorkerId>,
    pub activity: VecDeque<ActivityEntry>,
    pub respawn_suggestions: VecDeque<RespawnSuggestion>,
    pub respawn_counters: HashMap<String, RespawnCounter>,
    pub breaker: CircuitBreaker,
}

impl Default for Registries {
    fn default() -> Self {
        Self::new()
    }
}

impl Registries {
    pub fn new() -> Self {
        Self {
            workers: HashMap::new(),
            output_buffers: HashMap::new(),
            command_queues: HashMap::new(),
            pending: HashMap::new(),
            inflight_spawns: HashSet::new(),
            monitored: HashSet::new(),
            sending_input: HashSet::new(),
            draining: HashSet::new(),
            activity: VecDeque::new(),
            respawn_suggestions: VecDeque::new(),
            respawn_counters: HashMap::new(),
            breaker: CircuitBreaker::new(),
        }
    }

    /// The duplicate-spawn key.
    pub fn spawn_key(label: &str, project: &str) -> String {
        format!("{}::{}", label, project)
    }

    /// Whether a (label, project) pair is already live, pending, or in flight.
    pub fn spawn_key_taken(&self, key: &str) -> bool {
        if self.inflight_spawns.contains(key) {
            return true;
        }
        let matches_key = |w: &Worker| {
            Self::spawn_key(&w.label, &w.project) == key && !w.status.is_terminal()
        };
        self.workers.values().any(matches_key)
            || self.pending.values().any(|p| matches_key(&p.worker))
    }

    /// Register a worker with its buffer and queue. The three maps are
    /// created and destroyed together.
    pub fn insert_worker(&mut self, worker: Worker) {
        let id = worker.id.clone();
        self.output_buffers.insert(id.clone(), String::new());
        self.command_queues.insert(id.clone(), VecDeque::new());
        self.monitored.insert(id.clone());
        self.workers.insert(id, worker);
    }

    /// Erase a worker and everything keyed by its id.
    pub fn remove_worker(&mut self, id: &WorkerId) -> Option<Worker> {
        self.output_buffers.remove(id);
        self.command_queues.remove(id);
        self.monitored.remove(id);
        self.sending_input.remove(id);
        self.draining.remove(id);
        self.workers.remove(id)
    }

    /// Replace the rolling buffer, keeping the newest bytes under the cap.
    pub fn set_output_buffer(&mut self, id: &WorkerId, mut content: String) {
        if content.len() > OUTPUT_BUFFER_CAP {
            let cut = content.len() - OUTPUT_BUFFER_CAP;
            // Stay on a char boundary
            let cut = (cut..content.len())
                .find(|i| content.is_char_boundary(*i))
                .unwrap_or(content.len());
            content = content.split_off(cut);
        }
        if let Some(buf) = self.output_buffers.get_mut(id) {
            *buf = content;
        }
    }

    pub fn output_buffer(&self, id: &WorkerId) -> Option<&str> {
        self.output_buffers.get(id).map(String::as_str)
    }

    /// Enqueue a command, failing when the queue is at capacity.
    pub fn enqueue_command(&mut self, id: &WorkerId, command: String) -> Result<usize, ()> {
        let queue = self.command_queues.get_mut(id).ok_or(())?;
        if queue.len() >= COMMAND_QUEUE_CAP {
            return Err(());
        }
        queue.push_back(command);
        let len = queue.len();
        if let Some(w) = self.workers.get_mut(id) {
            w.queued_commands = len as u32;
        }
        Ok(len)
    }

    /// Push a command back to the head (failed send, worker still alive).
    pub fn requeue_command_front(&mut self, id: &WorkerId, command: String) {
        if let Some(queue) = self.command_queues.get_mut(id) {
            queue.push_front(command);
        }
    }

    pub fn dequeue_command(&mut self, id: &WorkerId) -> Option<String> {
        let queue = self.command_queues.get_mut(id)?;
        let cmd = queue.pop_front();
        let len = queue.len();
        if let Some(w) = self.workers.get_mut(id) {
            w.queued_commands = len as u32;
        }
        cmd
    }

    pub fn queue_len(&self, id: &WorkerId) -> usize {
        self.command_queues.get(id).map(VecDeque::len).unwrap_or(0)
    }

    /// Record an activity entry, bounded.
    pub fn push_activity(&mut self, entry: ActivityEntry) {
        self.activity.push_back(entry);
        while self.activity.len() > ACTIVITY_CAP {
            self.activity.pop_front();
        }
    }

    /// Prepend a respawn suggestion, bounded.
    pub fn push_suggestion(&mut self, suggestion: RespawnSuggestion) {
        self.respawn_suggestions.push_front(suggestion);
        while self.respawn_suggestions.len() > SUGGESTION_CAP {
            self.respawn_suggestions.pop_back();
        }
    }

    /// Try to take the per-worker send guard.
    pub fn try_begin_send(&mut self, id: &WorkerId) -> bool {
        self.sending_input.insert(id.clone())
    }

    pub fn end_send(&mut self, id: &WorkerId) {
        self.sending_input.remove(id);
    }

    /// Try to take the per-worker drain guard.
    pub fn try_begin_drain(&mut self, id: &WorkerId) -> bool {
        self.draining.insert(id.clone())
    }

    pub fn end_drain(&mut self, id: &WorkerId) {
        self.draining.remove(id);
    }

    /// Total managed population for the capacity check: live + pending +
    /// in-flight.
    pub fn population(&self) -> usize {
        self.workers.len() + self.pending.len() + self.inflight_spawns.len()
    }

    pub fn stats(&self, now: std::time::Instant) -> ResourceStats {
        let mut by_status: HashMap<String, usize> = HashMap::new();
        for w in self.workers.values() {
            *by_status.entry(w.status.as_str().to_string()).or_default() += 1;
        }
        ResourceStats {
            live_workers: self.workers.len(),
            pending_workers: self.pending.len(),
            inflight_spawns: self.inflight_spawns.len(),
            workers_by_status: by_status,
            output_buffer_bytes: self.output_buffers.values().map(String::len).sum(),
            queued_commands: self.command_queues.values().map(VecDeque::len).sum(),
            breaker: self.breaker.status(now),
        }
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
