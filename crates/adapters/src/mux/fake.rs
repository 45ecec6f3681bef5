// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake multiplexer adapter for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{validate_session_name, MuxAdapter, MuxError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Recorded multiplexer call
#[derive(Debug, Clone, PartialEq)]
pub enum MuxCall {
    NewSession { name: String, cwd: PathBuf, cmd: String },
    KillSession { name: String },
    HasSession { name: String },
    SendKey { name: String, key: String },
    SendLiteral { name: String, text: String },
    CapturePane { name: String, lines: u32 },
    ResizeWindow { name: String, cols: u16, rows: u16 },
    PaneCurrentCommand { name: String },
    ListSessions,
}

/// Fake session state
#[derive(Debug, Clone)]
pub struct FakeSession {
    pub cwd: PathBuf,
    pub cmd: String,
    pub env: Vec<(String, String)>,
    /// Scripted pane content returned by `capture_pane`.
    pub pane: String,
    pub alive: bool,
    /// Scripted `pane_current_command` answer.
    pub current_command: String,
    /// When true, the next capture fails even though the session is alive.
    pub capture_fails: bool,
}

struct FakeMuxState {
    sessions: HashMap<String, FakeSession>,
    calls: Vec<MuxCall>,
    fail_next_creates: u32,
    fail_sends: bool,
}

/// Fake multiplexer adapter for testing
#[derive(Clone)]
pub struct FakeMux {
    inner: Arc<Mutex<FakeMuxState>>,
}

impl Default for FakeMux {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(FakeMuxState {
                sessions: HashMap::new(),
                calls: Vec::new(),
                fail_next_creates: 0,
                fail_sends: false,
            })),
        }
    }
}

impl FakeMux {
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded calls, in order.
    pub fn calls(&self) -> Vec<MuxCall> {
        self.inner.lock().calls.clone()
    }

    /// Count of recorded calls matching a predicate.
    pub fn count_calls(&self, f: impl Fn(&MuxCall) -> bool) -> usize {
        self.inner.lock().calls.iter().filter(|c| f(c)).count()
    }

    pub fn session(&self, name: &str) -> Option<FakeSession> {
        self.inner.lock().sessions.get(name).cloned()
    }

    /// Script the pane content for a session.
    pub fn set_pane(&self, name: &str, content: &str) {
        if let Some(s) = self.inner.lock().sessions.get_mut(name) {
            s.pane = content.to_string();
        }
    }

    /// Kill a session out from under the engine.
    pub fn set_dead(&self, name: &str) {
        if let Some(s) = self.inner.lock().sessions.get_mut(name) {
            s.alive = false;
        }
    }

    /// Make captures fail without killing the session (transient race).
    pub fn set_capture_fails(&self, name: &str, fails: bool) {
        if let Some(s) = self.inner.lock().sessions.get_mut(name) {
            s.capture_fails = fails;
        }
    }

    pub fn set_current_command(&self, name: &str, cmd: &str) {
        if let Some(s) = self.inner.lock().sessions.get_mut(name) {
            s.current_command = cmd.to_string();
        }
    }

    /// Make the next `n` session creations fail (circuit breaker tests).
    pub fn fail_next_creates(&self, n: u32) {
        self.inner.lock().fail_next_creates = n;
    }

    /// Make every send fail until cleared (queue re-queue tests).
    pub fn set_fail_sends(&self, fail: bool) {
        self.inner.lock().fail_sends = fail;
    }

    /// Add a pre-existing session (for restore tests).
    pub fn add_session(&self, name: &str, alive: bool) {
        self.inner.lock().sessions.insert(
            name.to_string(),
            FakeSession {
                cwd: PathBuf::new(),
                cmd: String::new(),
                env: Vec::new(),
                pane: String::new(),
                alive,
                current_command: "claude".to_string(),
                capture_fails: false,
            },
        );
    }
}

#[async_trait]
impl MuxAdapter for FakeMux {
    async fn new_session(
        &self,
        name: &str,
        cwd: &Path,
        cmd: &str,
        env: &[(String, String)],
    ) -> Result<(), MuxError> {
        validate_session_name(name)?;
        let mut inner = self.inner.lock();
        inner.calls.push(MuxCall::NewSession {
            name: name.to_string(),
            cwd: cwd.to_path_buf(),
            cmd: cmd.to_string(),
        });

        if inner.fail_next_creates > 0 {
            inner.fail_next_creates -= 1;
            return Err(MuxError::CreateFailed("injected failure".to_string()));
        }

        inner.sessions.insert(
            name.to_string(),
            FakeSession {
                cwd: cwd.to_path_buf(),
                cmd: cmd.to_string(),
                env: env.to_vec(),
                pane: String::new(),
                alive: true,
                current_command: "claude".to_string(),
                capture_fails: false,
            },
        );
        Ok(())
    }

    async fn kill_session(&self, name: &str) -> Result<(), MuxError> {
        let mut inner = self.inner.lock();
        inner.calls.push(MuxCall::KillSession {
            name: name.to_string(),
        });
        if let Some(s) = inner.sessions.get_mut(name) {
            s.alive = false;
        }
        Ok(())
    }

    async fn has_session(&self, name: &str) -> Result<bool, MuxError> {
        let mut inner = self.inner.lock();
        inner.calls.push(MuxCall::HasSession {
            name: name.to_string(),
        });
        Ok(inner.sessions.get(name).map(|s| s.alive).unwrap_or(false))
    }

    async fn send_key(&self, name: &str, key: &str) -> Result<(), MuxError> {
        let mut inner = self.inner.lock();
        inner.calls.push(MuxCall::SendKey {
            name: name.to_string(),
            key: key.to_string(),
        });
        if inner.fail_sends {
            return Err(MuxError::CommandFailed("injected send failure".into()));
        }
        match inner.sessions.get(name) {
            Some(s) if s.alive => Ok(()),
            _ => Err(MuxError::NotFound(name.to_string())),
        }
    }

    async fn send_literal(&self, name: &str, text: &str) -> Result<(), MuxError> {
        let mut inner = self.inner.lock();
        inner.calls.push(MuxCall::SendLiteral {
            name: name.to_string(),
            text: text.to_string(),
        });
        if inner.fail_sends {
            return Err(MuxError::CommandFailed("injected send failure".into()));
        }
        match inner.sessions.get(name) {
            Some(s) if s.alive => Ok(()),
            _ => Err(MuxError::NotFound(name.to_string())),
        }
    }

    async fn capture_pane(&self, name: &str, lines: u32) -> Result<String, MuxError> {
        let mut inner = self.inner.lock();
        inner.calls.push(MuxCall::CapturePane {
            name: name.to_string(),
            lines,
        });
        match inner.sessions.get(name) {
            Some(s) if s.alive && !s.capture_fails => Ok(s.pane.clone()),
            _ => Err(MuxError::NotFound(name.to_string())),
        }
    }

    async fn resize_window(&self, name: &str, cols: u16, rows: u16) -> Result<(), MuxError> {
        let mut inner = self.inner.lock();
        inner.calls.push(MuxCall::ResizeWindow {
            name: name.to_string(),
            cols,
            rows,
        });
        match inner.sessions.get(name) {
            Some(s) if s.alive => Ok(()),
            _ => Err(MuxError::NotFound(name.to_string())),
        }
    }

    async fn pane_current_command(&self, name: &str) -> Result<String, MuxError> {
        let mut inner = self.inner.lock();
        inner.calls.push(MuxCall::PaneCurrentCommand {
            name: name.to_string(),
        });
        match inner.sessions.get(name) {
            Some(s) if s.alive => Ok(s.current_command.clone()),
            _ => Err(MuxError::NotFound(name.to_string())),
        }
    }

    async fn list_sessions(&self) -> Result<Vec<String>, MuxError> {
        let mut inner = self.inner.lock();
        inner.calls.push(MuxCall::ListSessions);
        let mut names: Vec<String> = inner
            .sessions
            .iter()
            .filter(|(_, s)| s.alive)
            .map(|(n, _)| n.clone())
            .collect();
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
