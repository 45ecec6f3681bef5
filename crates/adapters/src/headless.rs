// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One-shot headless backend invocations.
//!
//! Output is capped rather than failed (a chatty agent should truncate, not
//! error), and timeouts escalate SIGTERM → SIGKILL so a wedged CLI cannot
//! outlive its request.

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::Command;

/// Stdout cap: 5 MiB.
const STDOUT_CAP: usize = 5 * 1024 * 1024;
/// Stderr cap: 1 MiB.
const STDERR_CAP: usize = 1024 * 1024;
/// Default hard timeout when the caller specifies none.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5 * 60);
/// Upper clamp on any caller-requested timeout.
const MAX_TIMEOUT: Duration = Duration::from_secs(10 * 60);
/// Grace between SIGTERM and SIGKILL.
const KILL_GRACE: Duration = Duration::from_secs(5);

/// Errors from headless runs
#[derive(Debug, Error)]
pub enum HeadlessError {
    #[error("spawn failed: {0}")]
    SpawnFailed(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A single headless invocation request.
#[derive(Debug, Clone)]
pub struct HeadlessRequest {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: Vec<(String, String)>,
    /// Clamped to 10 minutes; defaults to 5.
    pub timeout: Option<Duration>,
    /// When true, stdout is parsed as JSON on success.
    pub parse_json: bool,
}

/// Result of a completed headless invocation.
#[derive(Debug)]
pub struct HeadlessOutcome {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub stdout_truncated: bool,
    pub stderr_truncated: bool,
    /// Present when `parse_json` was requested and stdout parsed cleanly.
    pub parsed: Option<serde_json::Value>,
}

impl HeadlessRequest {
    pub fn effective_timeout(&self) -> Duration {
        self.timeout.unwrap_or(DEFAULT_TIMEOUT).min(MAX_TIMEOUT)
    }

    /// Run to completion, enforcing caps and the timeout.
    pub async fn run(self) -> Result<HeadlessOutcome, HeadlessError> {
        let timeout = self.effective_timeout();

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .current_dir(&self.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (k, v) in &self.env {
            cmd.env(k, v);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| HeadlessError::SpawnFailed(e.to_string()))?;

        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();

        let stdout_task =
            tokio::spawn(async move { read_capped(stdout_pipe, STDOUT_CAP).await });
        let stderr_task =
            tokio::spawn(async move { read_capped(stderr_pipe, STDERR_CAP).await });

        let status = match tokio::time::timeout(timeout, child.wait()).await {
            Ok(result) => result?,
            Err(_) => {
                terminate_gracefully(&mut child).await;
                return Err(HeadlessError::Timeout(timeout));
            }
        };

        let (stdout, stdout_truncated) = stdout_task.await.unwrap_or_default();
        let (stderr, stderr_truncated) = stderr_task.await.unwrap_or_default();

        let parsed = if self.parse_json && status.success() {
            serde_json::from_str(&stdout).ok()
        } else {
            None
        };

        Ok(HeadlessOutcome {
            exit_code: status.code(),
            stdout,
            stderr,
            stdout_truncated,
            stderr_truncated,
            parsed,
        })
    }
}

/// Read a pipe to EOF, keeping at most `cap` bytes.
async fn read_capped<R>(pipe: Option<R>, cap: usize) -> (String, bool)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let Some(mut pipe) = pipe else {
        return (String::new(), false);
    };
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];
    let mut truncated = false;
    loop {
        match pipe.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                if buf.len() < cap {
                    let take = n.min(cap - buf.len());
                    buf.extend_from_slice(&chunk[..take]);
                    if take < n {
                        truncated = true;
                    }
                } else {
                    // Keep draining so the child never blocks on a full pipe
                    truncated = true;
                }
            }
        }
    }
    (String::from_utf8_lossy(&buf).into_owned(), truncated)
}

/// SIGTERM, wait up to the grace period, then SIGKILL.
async fn terminate_gracefully(child: &mut tokio::process::Child) {
    if let Some(pid) = child.id() {
        let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
        if tokio::time::timeout(KILL_GRACE, child.wait()).await.is_ok() {
            return;
        }
    }
    let _ = child.kill().await;
}

#[cfg(test)]
#[path = "headless_tests.rs"]
mod tests;
