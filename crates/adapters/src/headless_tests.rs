// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn request(program: &str, args: &[&str]) -> HeadlessRequest {
    HeadlessRequest {
        program: program.to_string(),
        args: args.iter().map(|s| s.to_string()).collect(),
        cwd: std::env::temp_dir(),
        env: Vec::new(),
        timeout: None,
        parse_json: false,
    }
}

#[tokio::test]
async fn captures_stdout_and_exit_code() {
    let out = request("sh", &["-c", "echo hello"]).run().await.unwrap();
    assert_eq!(out.exit_code, Some(0));
    assert_eq!(out.stdout.trim(), "hello");
    assert!(!out.stdout_truncated);
}

#[tokio::test]
async fn captures_stderr_separately() {
    let out = request("sh", &["-c", "echo oops >&2; exit 3"])
        .run()
        .await
        .unwrap();
    assert_eq!(out.exit_code, Some(3));
    assert_eq!(out.stderr.trim(), "oops");
}

#[tokio::test]
async fn parses_json_when_requested() {
    let mut req = request("sh", &["-c", r#"echo '{"ok": true}'"#]);
    req.parse_json = true;
    let out = req.run().await.unwrap();
    assert_eq!(out.parsed.unwrap()["ok"], true);
}

#[tokio::test]
async fn invalid_json_yields_none_not_error() {
    let mut req = request("sh", &["-c", "echo not-json"]);
    req.parse_json = true;
    let out = req.run().await.unwrap();
    assert!(out.parsed.is_none());
}

#[tokio::test]
async fn timeout_kills_the_child() {
    let mut req = request("sh", &["-c", "sleep 60"]);
    req.timeout = Some(Duration::from_millis(200));
    let start = std::time::Instant::now();
    let err = req.run().await.unwrap_err();
    assert!(matches!(err, HeadlessError::Timeout(_)));
    // SIGTERM grace must not stretch a cooperative child to the full minute
    assert!(start.elapsed() < Duration::from_secs(30));
}

#[tokio::test]
async fn timeout_clamps_to_ten_minutes() {
    let mut req = request("true", &[]);
    req.timeout = Some(Duration::from_secs(3600));
    assert_eq!(req.effective_timeout(), Duration::from_secs(600));
}

#[tokio::test]
async fn stdout_is_truncated_not_failed() {
    // ~6 MiB of zeros exceeds the 5 MiB cap
    let out = request("sh", &["-c", "head -c 6291456 /dev/zero"])
        .run()
        .await
        .unwrap();
    assert!(out.stdout_truncated);
    assert_eq!(out.exit_code, Some(0));
    assert!(out.stdout.len() <= 5 * 1024 * 1024);
}

#[tokio::test]
async fn missing_program_is_spawn_failure() {
    let err = request("strategos-no-such-binary", &[]).run().await.unwrap_err();
    assert!(matches!(err, HeadlessError::SpawnFailed(_)));
}
