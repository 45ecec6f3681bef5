// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

/// Literal sends recorded for a session, in order.
fn literals_for(h: &Harness, session: &str) -> Vec<String> {
    h.mux
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            MuxCall::SendLiteral { name, text } if name == session => Some(text),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn send_input_to_unknown_worker_fails() {
    let h = harness();
    let err = h
        .engine
        .send_input(&strategos_core::WorkerId::new("ghost"), "hello")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::WorkerNotFound(_)));
}

#[tokio::test]
async fn direct_send_types_text_then_enter() {
    let h = harness();
    let id = h.spawn("IMPL: recipient").await;
    let session = h.session_of(&id);

    h.engine.send_input(&id, "run the tests").await.unwrap();

    let literals = literals_for(&h, &session);
    assert!(literals.iter().any(|t| t == "run the tests"));
    assert!(h.enter_count(&id) >= 1);
}

#[tokio::test]
async fn pane_input_is_sanitized() {
    let h = harness();
    let id = h.spawn("IMPL: recipient").await;
    let session = h.session_of(&id);

    h.engine
        .send_input(&id, "safe\u{00}\u{01}\u{1b}text")
        .await
        .unwrap();

    let literals = literals_for(&h, &session);
    assert!(literals.iter().any(|t| t == "safetext"));
}

#[tokio::test]
async fn burst_of_sends_is_delivered_fifo() {
    let h = harness();
    let id = h.spawn("IMPL: recipient").await;
    let session = h.session_of(&id);

    for i in 0..5 {
        h.engine
            .send_input(&id, format!("command {i}"))
            .await
            .unwrap();
    }
    // Let the drainer catch up
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;

    let literals: Vec<String> = literals_for(&h, &session)
        .into_iter()
        .filter(|t| t.starts_with("command "))
        .collect();
    assert_eq!(literals.len(), 5);
    let mut sorted = literals.clone();
    sorted.sort();
    assert_eq!(literals, sorted, "FIFO order violated: {literals:?}");
}

#[tokio::test]
async fn failed_send_requeues_at_head_and_recovers() {
    let h = harness();
    let id = h.spawn("IMPL: flaky").await;
    let session = h.session_of(&id);

    h.mux.set_fail_sends(true);
    let result = h.engine.send_input(&id, "important command").await;
    assert!(result.is_err());

    // The command survived at the head of the queue
    {
        let reg = h.engine.registries.lock();
        assert_eq!(reg.queue_len(&id), 1);
    }

    h.mux.set_fail_sends(false);
    // Any subsequent send triggers a drain; the queued command goes first
    h.engine.send_input(&id, "later command").await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    let literals: Vec<String> = literals_for(&h, &session)
        .into_iter()
        .filter(|t| t.ends_with("command"))
        .collect();
    let important = literals.iter().position(|t| t == "important command");
    let later = literals.iter().position(|t| t == "later command");
    assert!(important.is_some(), "queued command was lost: {literals:?}");
    assert!(important < later, "head re-queue order violated: {literals:?}");
}

#[tokio::test]
async fn raw_input_skips_the_newline() {
    let h = harness();
    let id = h.spawn("IMPL: raw").await;

    let enters_before = h.enter_count(&id);
    h.engine.send_raw_input(&id, "partial").await.unwrap();
    assert_eq!(h.enter_count(&id), enters_before);
}

#[tokio::test]
async fn interrupt_sends_sigint_then_followup() {
    let h = harness();
    let id = h.spawn("GENERAL: to interrupt").await;
    let session = h.session_of(&id);

    h.engine
        .interrupt_worker(&id, Some("stand down".to_string()))
        .await
        .unwrap();

    assert_eq!(
        h.mux.count_calls(|c| matches!(
            c,
            MuxCall::SendKey { name, key } if *name == session && key == "C-c"
        )),
        1
    );

    tokio::time::sleep(std::time::Duration::from_millis(700)).await;
    let literals = literals_for(&h, &session);
    assert!(literals.iter().any(|t| t == "stand down"));
}

#[tokio::test]
async fn human_input_pauses_bulldoze() {
    let h = harness();
    let id = h
        .spawn_with(
            "IMPL: autonomous",
            SpawnOptions {
                bulldoze_mode: true,
                ..SpawnOptions::default()
            },
        )
        .await;

    let mut rx = h.engine.subscribe();
    h.engine.send_input(&id, "actually, do this").await.unwrap();

    let worker = h.engine.get_worker(&id).unwrap();
    assert!(worker.bulldoze_paused);

    let event = loop {
        let e = rx.recv().await.unwrap();
        if e.name == "worker:bulldoze:paused" {
            break e;
        }
    };
    assert_eq!(event.payload["reason"], "human_input");
}

#[tokio::test]
async fn system_input_does_not_pause_bulldoze() {
    let h = harness();
    let id = h
        .spawn_with(
            "IMPL: autonomous",
            SpawnOptions {
                bulldoze_mode: true,
                ..SpawnOptions::default()
            },
        )
        .await;

    h.engine
        .send_system_input(&id, "continue cycle")
        .await
        .unwrap();
    assert!(!h.engine.get_worker(&id).unwrap().bulldoze_paused);
}
