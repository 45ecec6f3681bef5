// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the orchestration engine

use strategos_adapters::{GitError, HeadlessError, MuxError, WebhookError};
use strategos_core::{sanitize_error_message, ActionError};
use thiserror::Error;

/// Errors surfaced by the engine facade.
///
/// Validation errors carry stable messages and are never retried; transient
/// multiplexer errors are retried by the capture loop before anything is
/// declared dead; persistence errors are logged and swallowed before they
/// reach this type.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{0}")]
    Validation(String),
    #[error("worker not found: {0}")]
    WorkerNotFound(String),
    #[error("duplicate worker: {0} already live or pending")]
    DuplicateWorker(String),
    #[error("worker limit reached ({0})")]
    CapacityExceeded(usize),
    #[error("multiplexer circuit breaker is open")]
    BreakerOpen,
    #[error("dependency cycle: {}", path.join(" -> "))]
    CycleDetected { path: Vec<String> },
    #[error("path escapes project root: {0}")]
    PathOutsideRoot(String),
    #[error("kill blocked: {0}")]
    KillBlocked(String),
    #[error("command queue full for worker {0}")]
    QueueFull(String),
    #[error("multiplexer error: {0}")]
    Mux(#[from] MuxError),
    #[error("git error: {0}")]
    Git(#[from] GitError),
    #[error("headless error: {0}")]
    Headless(#[from] HeadlessError),
    #[error("webhook error: {0}")]
    Webhook(#[from] WebhookError),
    #[error("action error: {0}")]
    Action(#[from] ActionError),
}

impl EngineError {
    /// Boundary-safe rendering: absolute paths and stack text are stripped
    /// before a message reaches an API client.
    pub fn user_message(&self) -> String {
        sanitize_error_message(&self.to_string())
    }

    /// Validation-class errors are the caller's fault and are never retried.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            EngineError::Validation(_)
                | EngineError::WorkerNotFound(_)
                | EngineError::DuplicateWorker(_)
                | EngineError::CapacityExceeded(_)
                | EngineError::CycleDetected { .. }
                | EngineError::PathOutsideRoot(_)
                | EngineError::KillBlocked(_)
                | EngineError::Action(_)
        )
    }
}
