// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

// These tests avoid requiring a running tmux server: they only exercise the
// paths that fail before any subprocess is spawned.

#[tokio::test]
async fn invalid_session_name_is_rejected_before_spawning() {
    let mux = TmuxMux::default();
    let err = mux.send_key("bad name", "Enter").await.unwrap_err();
    assert!(matches!(err, MuxError::InvalidName(_)));
}

#[tokio::test]
async fn new_session_requires_existing_cwd() {
    let mux = TmuxMux::default();
    let err = mux
        .new_session(
            "strategos-test",
            Path::new("/nonexistent/strategos/cwd"),
            "true",
            &[],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, MuxError::CreateFailed(_)));
}

#[test]
fn default_socket_is_namespaced() {
    let mux = TmuxMux::default();
    assert_eq!(mux.socket, "strategos");
}
