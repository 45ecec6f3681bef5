// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Crash-forensics checkpoints.
//!
//! A checkpoint is written on every abnormal termination: enough context to
//! seed a respawn and to answer "what was it doing when it died". Append-only
//! artifacts, retained bounded (50 newest by mtime).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use strategos_core::{strip_ansi, WorkerHealth, WorkerId};
use thiserror::Error;

/// How many checkpoint files are retained.
const RETAIN_COUNT: usize = 50;
/// How many trailing output lines are kept per checkpoint.
const OUTPUT_LINES: usize = 50;

/// Errors from checkpoint operations
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Relations at the moment of death.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckpointRelations {
    pub parent_worker_id: Option<String>,
    pub child_worker_ids: Vec<String>,
    pub depends_on: Vec<String>,
}

/// The forensic document itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub worker_id: String,
    pub label: String,
    pub project: String,
    pub reason: String,
    pub uptime_ms: u64,
    pub task: Option<String>,
    /// Last lines of pane output, ANSI-stripped.
    pub last_output: Vec<String>,
    pub health_at_death: WorkerHealth,
    pub relations: CheckpointRelations,
    pub created_at: DateTime<Utc>,
}

impl Checkpoint {
    /// Clean and bound the captured output tail.
    pub fn clean_output(raw: &str) -> Vec<String> {
        let stripped = strip_ansi(raw);
        let lines: Vec<&str> = stripped.lines().collect();
        let start = lines.len().saturating_sub(OUTPUT_LINES);
        lines[start..]
            .iter()
            .map(|l| l.trim_end().to_string())
            .collect()
    }
}

/// Directory-backed checkpoint store.
#[derive(Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn path_for(&self, worker_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", worker_id))
    }

    /// Write a checkpoint atomically, then prune to the retention bound.
    pub fn write(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(&checkpoint.worker_id);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(checkpoint)?)?;
        fs::rename(&tmp, &path)?;
        self.prune()?;
        Ok(())
    }

    /// Load a checkpoint for a worker if one exists.
    pub fn load(&self, worker_id: &WorkerId) -> Option<Checkpoint> {
        let text = fs::read_to_string(self.path_for(worker_id.as_str())).ok()?;
        serde_json::from_str(&text).ok()
    }

    /// List checkpoints, newest first by mtime.
    pub fn list(&self) -> Vec<Checkpoint> {
        let mut entries = self.entries_by_mtime();
        entries.reverse();
        entries
            .into_iter()
            .filter_map(|(path, _)| {
                let text = fs::read_to_string(path).ok()?;
                serde_json::from_str(&text).ok()
            })
            .collect()
    }

    /// Remove the oldest checkpoints beyond the retention bound.
    fn prune(&self) -> Result<(), CheckpointError> {
        let entries = self.entries_by_mtime();
        if entries.len() <= RETAIN_COUNT {
            return Ok(());
        }
        let excess = entries.len() - RETAIN_COUNT;
        for (path, _) in entries.into_iter().take(excess) {
            if let Err(e) = fs::remove_file(&path) {
                tracing::warn!(path = %path.display(), error = %e, "checkpoint prune failed");
            }
        }
        Ok(())
    }

    /// Checkpoint files sorted oldest-first by mtime.
    fn entries_by_mtime(&self) -> Vec<(PathBuf, std::time::SystemTime)> {
        let Ok(read) = fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        let mut entries: Vec<(PathBuf, std::time::SystemTime)> = read
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path().extension().is_some_and(|x| x == "json")
                    && !path_is_tmp(&e.path())
            })
            .filter_map(|e| {
                let mtime = e.metadata().ok()?.modified().ok()?;
                Some((e.path(), mtime))
            })
            .collect();
        entries.sort_by_key(|(_, mtime)| *mtime);
        entries
    }
}

fn path_is_tmp(path: &Path) -> bool {
    path.to_string_lossy().ends_with(".tmp")
}

#[cfg(test)]
#[path = "checkpoint_tests.rs"]
mod tests;
