// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! On-complete actions: a closed sum type dispatched when a worker completes.
//!
//! Validation is split by concern: event-name allowlisting lives here,
//! webhook host vetting lives in the adapters crate (it needs DNS), and
//! spawn-path containment is checked by the engine against the project root.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Errors from on-complete action validation
#[derive(Debug, Error, PartialEq)]
pub enum ActionError {
    #[error("event name not allowed: {0}")]
    EventNameNotAllowed(String),
    #[error("webhook method not allowed: {0}")]
    MethodNotAllowed(String),
    #[error("webhook url scheme not allowed: {0}")]
    SchemeNotAllowed(String),
}

/// Action executed when the owning worker completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OnCompleteAction {
    Spawn(SpawnAction),
    Webhook(WebhookAction),
    Emit(EmitAction),
}

/// Spawn a follow-up worker. The engine validates that `project_path`
/// stays inside the configured project root before dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnAction {
    pub project_path: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    #[serde(default)]
    pub auto_accept: bool,
    #[serde(default)]
    pub ralph_mode: bool,
    #[serde(default)]
    pub bulldoze_mode: bool,
}

/// Call a webhook. Scheme/method checks are cheap and happen here; host
/// resolution against the internal-address blocklist happens at dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookAction {
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

fn default_method() -> String {
    "POST".to_string()
}

impl WebhookAction {
    /// Static validation: http(s) only, POST/PUT only.
    pub fn validate_static(&self) -> Result<(), ActionError> {
        let scheme = self.url.split("://").next().unwrap_or_default();
        if !matches!(scheme, "http" | "https") {
            return Err(ActionError::SchemeNotAllowed(scheme.to_string()));
        }
        let method = self.method.to_uppercase();
        if !matches!(method.as_str(), "POST" | "PUT") {
            return Err(ActionError::MethodNotAllowed(self.method.clone()));
        }
        Ok(())
    }
}

/// Emit a custom event on the broadcaster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmitAction {
    pub event: String,
    #[serde(default)]
    pub payload: Value,
}

const EVENT_PREFIX_ALLOWLIST: &[&str] = &["worker:", "custom:", "app:"];

impl EmitAction {
    /// Emitted event names must carry one of the allowlisted prefixes so a
    /// completing worker cannot forge internal control events.
    pub fn validate(&self) -> Result<(), ActionError> {
        if EVENT_PREFIX_ALLOWLIST
            .iter()
            .any(|p| self.event.starts_with(p) && self.event.len() > p.len())
        {
            Ok(())
        } else {
            Err(ActionError::EventNameNotAllowed(self.event.clone()))
        }
    }
}

#[cfg(test)]
#[path = "action_tests.rs"]
mod tests;
