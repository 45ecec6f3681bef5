// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Read-only git queries.
//!
//! Used for the dismissal uncommitted-work report and the bulldoze
//! no-new-commits stall detector. Never mutates a repository.

use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

const GIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors from git queries
#[derive(Debug, Error)]
pub enum GitError {
    #[error("git failed: {0}")]
    Failed(String),
    #[error("git timed out after {0} seconds")]
    Timeout(u64),
    #[error("not a git repository: {0}")]
    NotARepo(String),
}

/// Read-only git query runner bound to 5 seconds per command.
#[derive(Clone, Default)]
pub struct GitQuery;

impl GitQuery {
    pub fn new() -> Self {
        Self
    }

    async fn run(&self, cwd: &Path, args: &[&str]) -> Result<String, GitError> {
        let mut cmd = Command::new("git");
        cmd.args(args).current_dir(cwd).kill_on_drop(true);

        let output = match tokio::time::timeout(GIT_TIMEOUT, cmd.output()).await {
            Ok(result) => result.map_err(|e| GitError::Failed(e.to_string()))?,
            Err(_) => return Err(GitError::Timeout(GIT_TIMEOUT.as_secs())),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("not a git repository") {
                return Err(GitError::NotARepo(cwd.display().to_string()));
            }
            return Err(GitError::Failed(stderr.trim().to_string()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Lines of `git status --porcelain`; empty means a clean tree.
    pub async fn status_porcelain(&self, cwd: &Path) -> Result<Vec<String>, GitError> {
        let out = self.run(cwd, &["status", "--porcelain"]).await?;
        Ok(out
            .lines()
            .map(|l| l.to_string())
            .filter(|l| !l.is_empty())
            .collect())
    }

    /// Subject lines of commits since the given ISO-8601 timestamp.
    pub async fn commits_since(&self, cwd: &Path, since_iso: &str) -> Result<Vec<String>, GitError> {
        let since = format!("--since={}", since_iso);
        let out = self
            .run(cwd, &["log", &since, "--format=%s"])
            .await?;
        Ok(out
            .lines()
            .map(|l| l.to_string())
            .filter(|l| !l.is_empty())
            .collect())
    }
}

#[cfg(test)]
#[path = "git_tests.rs"]
mod tests;
