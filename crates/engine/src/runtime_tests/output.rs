// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::time::Duration;

async fn accepting_worker(h: &Harness) -> strategos_core::WorkerId {
    let id = h
        .spawn_with(
            "IMPL: auto-accepting",
            SpawnOptions {
                auto_accept: true,
                ..SpawnOptions::default()
            },
        )
        .await;
    // Past the initial-check grace
    h.clock.advance(Duration::from_secs(6));
    id
}

#[tokio::test]
async fn auto_accept_presses_enter_once_per_prompt() {
    let h = harness();
    let id = accepting_worker(&h).await;
    let session = h.session_of(&id);

    h.mux.set_pane(&session, "Do you want to proceed?\n❯ 1. Yes\n  2. No");
    h.engine.capture_tick().await;
    assert_eq!(h.enter_count(&id), 1);

    // Same prompt re-rendered within the cool-off: no further send
    h.engine.capture_tick().await;
    h.engine.capture_tick().await;
    assert_eq!(h.enter_count(&id), 1);

    // A distinct prompt fires again
    h.mux
        .set_pane(&session, "Allow this command?\n❯ 1. Yes\n  2. No");
    h.engine.capture_tick().await;
    assert_eq!(h.enter_count(&id), 2);
}

#[tokio::test]
async fn auto_accept_rearms_after_cooloff() {
    let h = harness();
    let id = accepting_worker(&h).await;
    let session = h.session_of(&id);

    h.mux.set_pane(&session, "Do you want to proceed? (y/n)");
    h.engine.capture_tick().await;
    assert_eq!(h.enter_count(&id), 1);

    // Same prompt still on screen after the cool-off: re-arm and send again
    h.clock.advance(Duration::from_secs(7));
    h.engine.capture_tick().await;
    assert_eq!(h.enter_count(&id), 2);
}

#[tokio::test]
async fn pause_keyword_suspends_and_resumes_auto_accept() {
    let h = harness();
    let id = accepting_worker(&h).await;
    let session = h.session_of(&id);

    h.mux.set_pane(
        &session,
        "⏸ plan mode on\nDo you want to proceed?\n❯ 1. Yes",
    );
    h.engine.capture_tick().await;
    assert_eq!(h.enter_count(&id), 0, "must not accept in plan mode");
    assert!(h.engine.get_worker(&id).unwrap().auto_accept_paused);

    // Keyword disappears: auto-resume, and the prompt is accepted
    h.mux.set_pane(&session, "Do you want to proceed?\n❯ 1. Yes");
    h.engine.capture_tick().await;
    assert!(!h.engine.get_worker(&id).unwrap().auto_accept_paused);
    assert_eq!(h.enter_count(&id), 1);
}

#[tokio::test]
async fn disabled_auto_accept_never_sends() {
    let h = harness();
    let id = h.spawn("IMPL: manual").await;
    h.clock.advance(Duration::from_secs(6));
    let session = h.session_of(&id);

    h.mux.set_pane(&session, "Do you want to proceed? [y/N]");
    h.engine.capture_tick().await;
    assert_eq!(h.enter_count(&id), 0);
}

#[tokio::test]
async fn role_violation_fires_once_per_distinct_tail() {
    let h = harness();
    let id = h.spawn("GENERAL: hands off").await;
    h.clock.advance(Duration::from_secs(6));
    let session = h.session_of(&id);
    let mut rx = h.engine.subscribe();

    h.mux.set_pane(&session, "● Edit(foo.js)");
    h.engine.capture_tick().await;

    let worker = h.engine.get_worker(&id).unwrap();
    assert_eq!(worker.delegation_metrics.role_violations, 1);

    let event = loop {
        let e = rx.recv().await.unwrap();
        if e.name == "worker:role:violation" {
            break e;
        }
    };
    assert!(event.payload["detail"]
        .as_str()
        .unwrap()
        .contains("Edit(foo.js)"));

    // One correction interrupt
    assert_eq!(
        h.mux.count_calls(|c| matches!(
            c,
            MuxCall::SendKey { name, key } if *name == session && key == "C-c"
        )),
        1
    );

    // Identical tail does not re-fire
    h.engine.capture_tick().await;
    h.engine.capture_tick().await;
    assert_eq!(
        h.engine
            .get_worker(&id)
            .unwrap()
            .delegation_metrics
            .role_violations,
        1
    );
}

#[tokio::test]
async fn violations_do_not_apply_to_implementers() {
    let h = harness();
    let id = h.spawn("IMPL: allowed to edit").await;
    h.clock.advance(Duration::from_secs(6));
    h.mux.set_pane(&h.session_of(&id), "● Edit(foo.js)");
    h.engine.capture_tick().await;
    assert_eq!(
        h.engine
            .get_worker(&id)
            .unwrap()
            .delegation_metrics
            .role_violations,
        0
    );
}

#[tokio::test]
async fn rate_limit_sets_flag_and_reset_time() {
    let h = harness();
    // Pin the clock: 2026-01-15 12:00 UTC
    h.clock.set_epoch_ms(1_768_478_400_000);
    let id = h.spawn("IMPL: limited").await;
    h.clock.advance(Duration::from_secs(6));
    let session = h.session_of(&id);
    let mut rx = h.engine.subscribe();

    h.mux.set_pane(
        &session,
        "Claude usage limit reached. Your limit resets at 9am (America/New_York).",
    );
    h.engine.capture_tick().await;

    let worker = h.engine.get_worker(&id).unwrap();
    assert!(worker.rate_limited);
    let reset = worker.rate_limit_reset_at_ms.unwrap();
    assert!(reset > h.clock.epoch_ms());

    let event = loop {
        let e = rx.recv().await.unwrap();
        if e.name == "worker:rate_limited" {
            break e;
        }
    };
    assert!(event.payload["reset_at_ms"].is_u64());
}

#[tokio::test]
async fn one_capture_failure_does_not_remove_a_worker() {
    let h = harness();
    let id = h.spawn("IMPL: flaky pane").await;
    h.clock.advance(Duration::from_secs(6));
    let session = h.session_of(&id);

    h.mux.set_capture_fails(&session, true);
    h.engine.capture_tick().await;
    assert!(h.engine.get_worker(&id).is_some());

    // Recovery resets the failure counter
    h.mux.set_capture_fails(&session, false);
    h.engine.capture_tick().await;
    h.mux.set_capture_fails(&session, true);
    h.engine.capture_tick().await;
    h.engine.capture_tick().await;
    assert!(
        h.engine.get_worker(&id).is_some(),
        "two consecutive failures must not kill"
    );
}

#[tokio::test]
async fn three_consecutive_capture_failures_declare_death() {
    let h = harness();
    let id = h.spawn("IMPL: dying pane").await;
    h.clock.advance(Duration::from_secs(6));
    let session = h.session_of(&id);

    h.mux.set_capture_fails(&session, true);
    for _ in 0..3 {
        h.engine.capture_tick().await;
    }
    // The original worker is gone (respawned under a fresh id)
    assert!(h.engine.get_worker(&id).is_none());
    let creates = h
        .mux
        .count_calls(|c| matches!(c, MuxCall::NewSession { .. }));
    assert_eq!(creates, 2, "a replacement session should have been spawned");
}

#[tokio::test]
async fn capture_failures_in_initial_grace_are_ignored() {
    let h = harness();
    let id = h.spawn("IMPL: slow start").await;
    let session = h.session_of(&id);
    // No clock advance: still inside the grace window
    h.mux.set_capture_fails(&session, true);
    for _ in 0..5 {
        h.engine.capture_tick().await;
    }
    assert!(h.engine.get_worker(&id).is_some());
    assert_eq!(h.engine.get_worker(&id).unwrap().status, strategos_core::WorkerStatus::Running);
}

#[tokio::test]
async fn output_change_emits_event_and_updates_timestamps() {
    let h = harness();
    let id = h.spawn("IMPL: chatty").await;
    h.clock.advance(Duration::from_secs(6));
    let session = h.session_of(&id);
    let mut rx = h.engine.subscribe();

    h.mux.set_pane(&session, "compiling stage one");
    h.engine.capture_tick().await;

    let event = loop {
        let e = rx.recv().await.unwrap();
        if e.name == "worker:output" {
            break e;
        }
    };
    assert!(event.payload["chunk"]
        .as_str()
        .unwrap()
        .contains("compiling stage one"));

    let worker = h.engine.get_worker(&id).unwrap();
    assert_eq!(worker.last_output_ms, h.clock.epoch_ms());
}

#[tokio::test]
async fn auto_continue_after_rate_limit_reset() {
    let h = harness();
    h.clock.set_epoch_ms(1_768_478_400_000);
    let id = h
        .spawn_with(
            "IMPL: resilient",
            SpawnOptions {
                auto_continue: true,
                ..SpawnOptions::default()
            },
        )
        .await;
    h.clock.advance(Duration::from_secs(6));
    let session = h.session_of(&id);

    h.mux.set_pane(
        &session,
        "usage limit reached. resets at 9am (America/New_York)",
    );
    h.engine.capture_tick().await;
    assert!(h.engine.get_worker(&id).unwrap().rate_limited);

    // Idle ticks accumulate but the reset time has not passed
    for _ in 0..6 {
        h.engine.capture_tick().await;
    }
    let literals_before = h.mux.count_calls(|c| {
        matches!(c, MuxCall::SendLiteral { name, text } if *name == session && text.contains("Continue"))
    });
    assert_eq!(literals_before, 0);

    // Jump past the reset and idle long enough
    h.clock.advance(Duration::from_secs(12 * 3600));
    for _ in 0..6 {
        h.engine.capture_tick().await;
    }
    // Exactly one continuation: the banner re-renders, but the newly parsed
    // reset time is in the future again
    let worker = h.engine.get_worker(&id).unwrap();
    assert_eq!(worker.auto_continue_count, 1);
    let continues = h.mux.count_calls(|c| {
        matches!(c, MuxCall::SendLiteral { name, text } if *name == session && text.contains("Continue"))
    });
    assert_eq!(continues, 1);
}
