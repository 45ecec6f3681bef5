// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tmux multiplexer adapter.
//!
//! All workers share one tmux server on a named socket so a stray user tmux
//! session can never collide with managed ones.

use super::{validate_session_name, MuxAdapter, MuxError};
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;

/// Upper bound on any single tmux invocation.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Tmux-based multiplexer adapter on a named socket.
#[derive(Clone)]
pub struct TmuxMux {
    socket: String,
}

impl TmuxMux {
    pub fn new(socket: impl Into<String>) -> Self {
        Self {
            socket: socket.into(),
        }
    }

    async fn run(&self, args: &[&str]) -> Result<std::process::Output, MuxError> {
        let mut cmd = Command::new("tmux");
        cmd.arg("-L").arg(&self.socket).args(args);
        // Dropping the future on timeout must reap the child
        cmd.kill_on_drop(true);

        match tokio::time::timeout(COMMAND_TIMEOUT, cmd.output()).await {
            Ok(result) => result.map_err(|e| MuxError::CommandFailed(e.to_string())),
            Err(_) => Err(MuxError::Timeout(COMMAND_TIMEOUT.as_secs())),
        }
    }
}

impl Default for TmuxMux {
    fn default() -> Self {
        Self::new("strategos")
    }
}

#[async_trait]
impl MuxAdapter for TmuxMux {
    async fn new_session(
        &self,
        name: &str,
        cwd: &Path,
        cmd: &str,
        env: &[(String, String)],
    ) -> Result<(), MuxError> {
        validate_session_name(name)?;

        // Precondition: cwd must exist
        if !cwd.exists() {
            return Err(MuxError::CreateFailed(format!(
                "working directory does not exist: {}",
                cwd.display()
            )));
        }

        let cwd_str = cwd.display().to_string();
        let mut args: Vec<String> = vec![
            "new-session".into(),
            "-d".into(),
            "-s".into(),
            name.into(),
            "-c".into(),
            cwd_str,
        ];
        for (key, value) in env {
            args.push("-e".into());
            args.push(format!("{}={}", key, value));
        }
        args.push(cmd.to_string());

        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = self.run(&arg_refs).await.map_err(|e| match e {
            MuxError::CommandFailed(msg) => MuxError::CreateFailed(msg),
            other => other,
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::error!(session = name, stderr = %stderr, "tmux new-session failed");
            return Err(MuxError::CreateFailed(stderr.trim().to_string()));
        }

        // Stderr may carry useful warnings even on success
        if !output.stderr.is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::warn!(session = name, stderr = %stderr, "tmux new-session stderr (non-fatal)");
        }

        Ok(())
    }

    async fn kill_session(&self, name: &str) -> Result<(), MuxError> {
        validate_session_name(name)?;
        // Failure means the session is already gone, which is the goal
        let _ = self.run(&["kill-session", "-t", name]).await?;
        Ok(())
    }

    async fn has_session(&self, name: &str) -> Result<bool, MuxError> {
        validate_session_name(name)?;
        let output = self.run(&["has-session", "-t", name]).await?;
        Ok(output.status.success())
    }

    async fn send_key(&self, name: &str, key: &str) -> Result<(), MuxError> {
        validate_session_name(name)?;
        let output = self.run(&["send-keys", "-t", name, key]).await?;
        if !output.status.success() {
            return Err(MuxError::NotFound(name.to_string()));
        }
        Ok(())
    }

    async fn send_literal(&self, name: &str, text: &str) -> Result<(), MuxError> {
        validate_session_name(name)?;
        // -l = literal mode, -- = end of options (handles text starting with -)
        let output = self
            .run(&["send-keys", "-t", name, "-l", "--", text])
            .await?;
        if !output.status.success() {
            return Err(MuxError::NotFound(name.to_string()));
        }
        Ok(())
    }

    async fn capture_pane(&self, name: &str, lines: u32) -> Result<String, MuxError> {
        validate_session_name(name)?;
        let start = format!("-{}", lines);
        let output = self
            .run(&["capture-pane", "-t", name, "-p", "-e", "-S", &start])
            .await?;
        if !output.status.success() {
            return Err(MuxError::NotFound(name.to_string()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    async fn resize_window(&self, name: &str, cols: u16, rows: u16) -> Result<(), MuxError> {
        validate_session_name(name)?;
        let cols = cols.to_string();
        let rows = rows.to_string();
        let output = self
            .run(&["resize-window", "-t", name, "-x", &cols, "-y", &rows])
            .await?;
        if !output.status.success() {
            return Err(MuxError::NotFound(name.to_string()));
        }
        Ok(())
    }

    async fn pane_current_command(&self, name: &str) -> Result<String, MuxError> {
        validate_session_name(name)?;
        let output = self
            .run(&[
                "display-message",
                "-t",
                name,
                "-p",
                "#{pane_current_command}",
            ])
            .await?;
        if !output.status.success() {
            return Err(MuxError::NotFound(name.to_string()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn list_sessions(&self) -> Result<Vec<String>, MuxError> {
        let output = self
            .run(&["list-sessions", "-F", "#{session_name}"])
            .await?;
        if !output.status.success() {
            // No server running means no sessions
            return Ok(Vec::new());
        }
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect())
    }
}

#[cfg(test)]
#[path = "tmux_tests.rs"]
mod tests;
