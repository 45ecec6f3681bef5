// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

#[test]
fn event_names_are_wire_stable() {
    let e = EngineEvent::WorkerDependenciesSatisfied {
        worker_id: WorkerId::new("w1"),
    };
    assert_eq!(e.name(), "worker:dependencies_satisfied");

    let e = EngineEvent::WorkerAutoContinueExhausted {
        worker_id: WorkerId::new("w1"),
        attempts: 10,
    };
    assert_eq!(e.name(), "worker:autocontinue:exhausted");
}

#[test]
fn custom_event_keeps_its_name() {
    let e = EngineEvent::Custom {
        name: "custom:deploy".to_string(),
        payload: json!({"ok": true}),
    };
    assert_eq!(e.name(), "custom:deploy");
}

#[yare::parameterized(
    snake      = { "ralph_token" },
    camel      = { "ralphToken" },
    api_key    = { "apiKey" },
    upper      = { "API_KEY" },
    password   = { "password" },
    secret     = { "secret" },
    token      = { "token" },
    credential = { "credential" },
)]
fn sensitive_keys_are_stripped(key: &str) {
    let value = json!({ key: "leak", "safe": 1 });
    let out = strip_sensitive_keys(value);
    let obj = out.as_object().unwrap();
    assert!(!obj.contains_key(key));
    assert_eq!(obj["safe"], 1);
}

#[test]
fn stripping_recurses_into_nested_structures() {
    let value = json!({
        "outer": {
            "token": "leak",
            "list": [ {"password": "leak", "keep": "yes"} ]
        }
    });
    let out = strip_sensitive_keys(value);
    let text = out.to_string();
    assert!(!text.contains("leak"));
    assert!(text.contains("yes"));
}

#[test]
fn non_sensitive_lookalikes_survive() {
    let value = json!({ "token_count": 3, "secretary": "kept" });
    let out = strip_sensitive_keys(value);
    let obj = out.as_object().unwrap();
    assert!(obj.contains_key("token_count"));
    assert!(obj.contains_key("secretary"));
}

#[test]
fn outbound_payload_is_stripped_at_publication() {
    let e = EngineEvent::Custom {
        name: "custom:x".to_string(),
        payload: json!({"data": {"apiKey": "leak", "n": 1}}),
    };
    let out = e.into_outbound();
    assert_eq!(out.name, "custom:x");
    assert!(!out.payload.to_string().contains("leak"));
}
