// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Terminal multiplexer adapters

mod tmux;

pub use tmux::TmuxMux;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeMux, FakeSession, MuxCall};

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

/// Errors from multiplexer operations
#[derive(Debug, Error)]
pub enum MuxError {
    #[error("session not found: {0}")]
    NotFound(String),
    #[error("invalid session name: {0}")]
    InvalidName(String),
    #[error("session creation failed: {0}")]
    CreateFailed(String),
    #[error("command failed: {0}")]
    CommandFailed(String),
    #[error("command timed out after {0} seconds")]
    Timeout(u64),
}

impl MuxError {
    /// Only session *creation* failures feed the circuit breaker.
    pub fn counts_against_breaker(&self) -> bool {
        matches!(self, MuxError::CreateFailed(_) | MuxError::Timeout(_))
    }
}

/// Session names must be safe to pass to the multiplexer CLI unquoted.
pub fn validate_session_name(name: &str) -> Result<(), MuxError> {
    if !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        Ok(())
    } else {
        Err(MuxError::InvalidName(name.to_string()))
    }
}

/// Adapter over a terminal multiplexer holding one pane per worker.
///
/// All commands are bounded (30 s in the tmux implementation); a command
/// that outlives its bound kills the child and reports [`MuxError::Timeout`].
#[async_trait]
pub trait MuxAdapter: Clone + Send + Sync + 'static {
    /// Create a detached session running `cmd` in `cwd`.
    async fn new_session(
        &self,
        name: &str,
        cwd: &Path,
        cmd: &str,
        env: &[(String, String)],
    ) -> Result<(), MuxError>;

    /// Kill a session. Killing a dead session is not an error.
    async fn kill_session(&self, name: &str) -> Result<(), MuxError>;

    /// Check whether a session exists.
    async fn has_session(&self, name: &str) -> Result<bool, MuxError>;

    /// Send a named key (Enter, Escape, C-c) to a session.
    async fn send_key(&self, name: &str, key: &str) -> Result<(), MuxError>;

    /// Send literal text with no key-name interpretation.
    async fn send_literal(&self, name: &str, text: &str) -> Result<(), MuxError>;

    /// Capture the last `lines` lines of the pane, escapes included.
    async fn capture_pane(&self, name: &str, lines: u32) -> Result<String, MuxError>;

    /// Resize the session's window.
    async fn resize_window(&self, name: &str, cols: u16, rows: u16) -> Result<(), MuxError>;

    /// The command currently running in the pane (e.g. "claude" or a bare
    /// shell when the agent process has exited).
    async fn pane_current_command(&self, name: &str) -> Result<String, MuxError>;

    /// Names of all live sessions on the socket.
    async fn list_sessions(&self) -> Result<Vec<String>, MuxError>;
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
