// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::path::PathBuf;

fn worker(id: &str, label: &str) -> Worker {
    Worker::new(
        WorkerId::new(id),
        label.to_string(),
        PathBuf::from("/srv/projects/demo"),
        1_000,
    )
}

#[test]
fn insert_and_remove_keep_maps_in_lockstep() {
    let mut reg = Registries::new();
    let id = WorkerId::new("w1");
    reg.insert_worker(worker("w1", "IMPL: x"));

    assert!(reg.workers.contains_key(&id));
    assert!(reg.output_buffers.contains_key(&id));
    assert!(reg.command_queues.contains_key(&id));
    assert!(reg.monitored.contains(&id));

    reg.remove_worker(&id);
    assert!(!reg.workers.contains_key(&id));
    assert!(!reg.output_buffers.contains_key(&id));
    assert!(!reg.command_queues.contains_key(&id));
    assert!(!reg.monitored.contains(&id));
}

#[test]
fn output_buffer_keeps_newest_two_mib() {
    let mut reg = Registries::new();
    let id = WorkerId::new("w1");
    reg.insert_worker(worker("w1", "IMPL: x"));

    let big = "a".repeat(OUTPUT_BUFFER_CAP + 1000);
    reg.set_output_buffer(&id, big);
    let buf = reg.output_buffer(&id).unwrap();
    assert_eq!(buf.len(), OUTPUT_BUFFER_CAP);

    // Newest bytes survive: write a marker at the end
    let marked = format!("{}THE-END", "b".repeat(OUTPUT_BUFFER_CAP));
    reg.set_output_buffer(&id, marked);
    assert!(reg.output_buffer(&id).unwrap().ends_with("THE-END"));
}

#[test]
fn output_buffer_trim_respects_char_boundaries() {
    let mut reg = Registries::new();
    let id = WorkerId::new("w1");
    reg.insert_worker(worker("w1", "IMPL: x"));

    // Multibyte chars across the cut point must not split
    let content = "é".repeat(OUTPUT_BUFFER_CAP / 2 + 100);
    reg.set_output_buffer(&id, content);
    let buf = reg.output_buffer(&id).unwrap();
    assert!(buf.len() <= OUTPUT_BUFFER_CAP);
    assert!(buf.chars().all(|c| c == 'é'));
}

#[test]
fn command_queue_bounds_at_capacity() {
    let mut reg = Registries::new();
    let id = WorkerId::new("w1");
    reg.insert_worker(worker("w1", "IMPL: x"));

    for i in 0..COMMAND_QUEUE_CAP {
        assert!(reg.enqueue_command(&id, format!("cmd {i}")).is_ok());
    }
    assert!(reg.enqueue_command(&id, "one too many".to_string()).is_err());
    assert_eq!(reg.queue_len(&id), COMMAND_QUEUE_CAP);
    assert_eq!(
        reg.workers[&id].queued_commands as usize,
        COMMAND_QUEUE_CAP
    );
}

#[test]
fn queue_is_fifo_with_head_requeue() {
    let mut reg = Registries::new();
    let id = WorkerId::new("w1");
    reg.insert_worker(worker("w1", "IMPL: x"));

    reg.enqueue_command(&id, "first".to_string()).unwrap();
    reg.enqueue_command(&id, "second".to_string()).unwrap();

    let cmd = reg.dequeue_command(&id).unwrap();
    assert_eq!(cmd, "first");
    reg.requeue_command_front(&id, cmd);
    assert_eq!(reg.dequeue_command(&id).unwrap(), "first");
    assert_eq!(reg.dequeue_command(&id).unwrap(), "second");
    assert!(reg.dequeue_command(&id).is_none());
}

#[test]
fn enqueue_to_unknown_worker_fails() {
    let mut reg = Registries::new();
    assert!(reg
        .enqueue_command(&WorkerId::new("ghost"), "x".to_string())
        .is_err());
}

#[test]
fn activity_ring_is_bounded_at_100() {
    let mut reg = Registries::new();
    for i in 0..150 {
        reg.push_activity(ActivityEntry {
            at_ms: i,
            kind: "test".to_string(),
            worker_id: WorkerId::new("w1"),
            label: String::new(),
            project: String::new(),
            message: format!("entry {i}"),
        });
    }
    assert_eq!(reg.activity.len(), ACTIVITY_CAP);
    assert_eq!(reg.activity.front().unwrap().at_ms, 50);
    assert_eq!(reg.activity.back().unwrap().at_ms, 149);
}

#[test]
fn suggestion_ring_prepends_and_bounds_at_20() {
    let mut reg = Registries::new();
    for i in 0..25 {
        reg.push_suggestion(RespawnSuggestion {
            worker_id: WorkerId::new(format!("w{i}")),
            label: String::new(),
            project: String::new(),
            task: String::new(),
            died_at_ms: i,
            ralph_progress: 0,
            ralph_current_step: None,
        });
    }
    assert_eq!(reg.respawn_suggestions.len(), SUGGESTION_CAP);
    // Newest first
    assert_eq!(reg.respawn_suggestions.front().unwrap().died_at_ms, 24);
}

#[test]
fn send_and_drain_guards_are_exclusive() {
    let mut reg = Registries::new();
    let id = WorkerId::new("w1");
    assert!(reg.try_begin_send(&id));
    assert!(!reg.try_begin_send(&id));
    reg.end_send(&id);
    assert!(reg.try_begin_send(&id));

    assert!(reg.try_begin_drain(&id));
    assert!(!reg.try_begin_drain(&id));
    reg.end_drain(&id);
    assert!(reg.try_begin_drain(&id));
}

#[test]
fn spawn_key_taken_checks_live_pending_and_inflight() {
    let mut reg = Registries::new();
    let key = Registries::spawn_key("IMPL: x", "demo");
    assert!(!reg.spawn_key_taken(&key));

    reg.inflight_spawns.insert(key.clone());
    assert!(reg.spawn_key_taken(&key));
    reg.inflight_spawns.remove(&key);

    reg.insert_worker(worker("w1", "IMPL: x"));
    assert!(reg.spawn_key_taken(&key));

    // Terminal workers free the key
    reg.workers.get_mut(&WorkerId::new("w1")).unwrap().status =
        strategos_core::WorkerStatus::Completed;
    assert!(!reg.spawn_key_taken(&key));
}

#[test]
fn population_counts_all_three_sets() {
    let mut reg = Registries::new();
    reg.insert_worker(worker("w1", "IMPL: a"));
    reg.inflight_spawns.insert("k".to_string());
    assert_eq!(reg.population(), 2);
}

#[test]
fn stats_aggregate_status_and_bytes() {
    let mut reg = Registries::new();
    reg.insert_worker(worker("w1", "IMPL: a"));
    reg.insert_worker(worker("w2", "IMPL: b"));
    reg.set_output_buffer(&WorkerId::new("w1"), "12345".to_string());

    let stats = reg.stats(std::time::Instant::now());
    assert_eq!(stats.live_workers, 2);
    assert_eq!(stats.workers_by_status["running"], 2);
    assert_eq!(stats.output_buffer_bytes, 5);
    assert!(!stats.breaker.tripped);
}
