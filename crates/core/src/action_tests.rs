// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

#[yare::parameterized(
    worker = { "worker:done", true },
    custom = { "custom:deploy", true },
    app    = { "app:refresh", true },
    bare_prefix = { "custom:", false },
    internal    = { "engine:shutdown", false },
    empty       = { "", false },
)]
fn emit_event_name_allowlist(name: &str, ok: bool) {
    let action = EmitAction {
        event: name.to_string(),
        payload: json!({}),
    };
    assert_eq!(action.validate().is_ok(), ok, "event: {name}");
}

#[yare::parameterized(
    https_post = { "https://hooks.example.com/x", "POST", true },
    http_put   = { "http://hooks.example.com/x", "PUT", true },
    get        = { "https://hooks.example.com/x", "GET", false },
    delete     = { "https://hooks.example.com/x", "DELETE", false },
    ftp        = { "ftp://hooks.example.com/x", "POST", false },
    file       = { "file:///etc/passwd", "POST", false },
)]
fn webhook_static_validation(url: &str, method: &str, ok: bool) {
    let action = WebhookAction {
        url: url.to_string(),
        method: method.to_string(),
        body: None,
    };
    assert_eq!(action.validate_static().is_ok(), ok, "{method} {url}");
}

#[test]
fn on_complete_serde_round_trip() {
    let action = OnCompleteAction::Spawn(SpawnAction {
        project_path: "demo".to_string(),
        label: "TEST: follow up".to_string(),
        task: Some("verify output".to_string()),
        auto_accept: true,
        ralph_mode: false,
        bulldoze_mode: false,
    });
    let text = serde_json::to_string(&action).unwrap();
    assert!(text.contains("\"kind\":\"spawn\""));
    let back: OnCompleteAction = serde_json::from_str(&text).unwrap();
    assert_eq!(back, action);
}

#[test]
fn webhook_defaults_to_post() {
    let action: WebhookAction =
        serde_json::from_str(r#"{"url": "https://x.example/hook"}"#).unwrap();
    assert_eq!(action.method, "POST");
}
