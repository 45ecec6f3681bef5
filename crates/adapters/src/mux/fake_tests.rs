// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[tokio::test]
async fn new_session_then_capture_round_trip() {
    let mux = FakeMux::new();
    mux.new_session("strategos-w1", Path::new("/tmp"), "claude", &[])
        .await
        .unwrap();
    mux.set_pane("strategos-w1", "hello from pane");

    assert!(mux.has_session("strategos-w1").await.unwrap());
    assert_eq!(
        mux.capture_pane("strategos-w1", 500).await.unwrap(),
        "hello from pane"
    );
}

#[tokio::test]
async fn injected_create_failures_are_consumed() {
    let mux = FakeMux::new();
    mux.fail_next_creates(1);
    assert!(mux
        .new_session("strategos-w1", Path::new("/tmp"), "claude", &[])
        .await
        .is_err());
    assert!(mux
        .new_session("strategos-w1", Path::new("/tmp"), "claude", &[])
        .await
        .is_ok());
}

#[tokio::test]
async fn capture_fails_flag_simulates_transient_race() {
    let mux = FakeMux::new();
    mux.new_session("strategos-w1", Path::new("/tmp"), "claude", &[])
        .await
        .unwrap();
    mux.set_capture_fails("strategos-w1", true);
    assert!(mux.capture_pane("strategos-w1", 500).await.is_err());
    // Session is still alive
    assert!(mux.has_session("strategos-w1").await.unwrap());
    mux.set_capture_fails("strategos-w1", false);
    assert!(mux.capture_pane("strategos-w1", 500).await.is_ok());
}

#[tokio::test]
async fn kill_marks_dead_and_sends_fail() {
    let mux = FakeMux::new();
    mux.new_session("strategos-w1", Path::new("/tmp"), "claude", &[])
        .await
        .unwrap();
    mux.kill_session("strategos-w1").await.unwrap();
    assert!(!mux.has_session("strategos-w1").await.unwrap());
    assert!(mux.send_key("strategos-w1", "Enter").await.is_err());
}

#[tokio::test]
async fn calls_are_recorded_in_order() {
    let mux = FakeMux::new();
    mux.new_session("strategos-w1", Path::new("/tmp"), "claude", &[])
        .await
        .unwrap();
    mux.send_key("strategos-w1", "Enter").await.unwrap();
    let calls = mux.calls();
    assert!(matches!(calls[0], MuxCall::NewSession { .. }));
    assert_eq!(
        calls[1],
        MuxCall::SendKey {
            name: "strategos-w1".to_string(),
            key: "Enter".to_string()
        }
    );
}

#[tokio::test]
async fn list_sessions_returns_live_only() {
    let mux = FakeMux::new();
    mux.add_session("strategos-a", true);
    mux.add_session("strategos-b", false);
    assert_eq!(mux.list_sessions().await.unwrap(), vec!["strategos-a"]);
}
