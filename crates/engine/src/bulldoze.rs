// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bulldoze mode: autonomous continuation state.
//!
//! The persistent markdown state file is the agent's working memory across
//! continuation cycles. The engine only ever parses and appends; the agent
//! owns the content. Hard stops keep an unattended loop from running away.

use std::path::{Path, PathBuf};
use std::time::Duration;
use strategos_core::WorkerId;

/// Every Nth cycle is an audit prompt instead of a plain continuation.
pub const AUDIT_EVERY: u32 = 5;
/// Wall-clock bound on one bulldoze run.
pub const MAX_WALL_CLOCK: Duration = Duration::from_secs(8 * 60 * 60);
/// Consecutive send failures before stopping.
pub const MAX_SEND_ERRORS: u32 = 3;
/// Context compactions before stopping.
pub const MAX_COMPACTIONS: u32 = 3;
/// Consecutive cycles without a new git commit before stopping.
pub const MAX_STALE_CYCLES: u32 = 5;
/// Idle ticks before a continuation fires.
pub const IDLE_TICKS_REQUIRED: u32 = 3;

/// Markers the agent writes into its state file to end the loop.
pub const STOP_MARKERS: &[&str] = &["EXHAUSTED", "BLOCKED", "NEEDS_HUMAN"];

/// Why a bulldoze run stopped or paused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    WallClock,
    SendErrors,
    Compactions,
    Marker(String),
    NoNewCommits,
    HumanInput,
    ChildInProgress,
}

impl StopReason {
    pub fn as_str(&self) -> &str {
        match self {
            StopReason::WallClock => "wall_clock",
            StopReason::SendErrors => "send_errors",
            StopReason::Compactions => "compactions",
            StopReason::Marker(m) => m,
            StopReason::NoNewCommits => "no_new_commits",
            StopReason::HumanInput => "human_input",
            StopReason::ChildInProgress => "child_in_progress",
        }
    }
}

/// Parsed bulldoze state file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulldozeState {
    pub current: Vec<String>,
    pub backlog: Vec<String>,
    pub completed: Vec<String>,
    pub learnings: Vec<String>,
    pub compaction_count: u32,
}

impl BulldozeState {
    /// Path of a worker's state file: `<working_dir>/tmp/bulldoze-state-<id>.md`.
    pub fn path_for(working_dir: &Path, id: &WorkerId) -> PathBuf {
        working_dir
            .join("tmp")
            .join(format!("bulldoze-state-{}.md", id))
    }

    /// Load from disk; a missing or unparseable file is a fresh state.
    pub fn load(path: &Path) -> Self {
        std::fs::read_to_string(path)
            .map(|text| Self::parse(&text))
            .unwrap_or_default()
    }

    /// Parse the markdown section format.
    pub fn parse(text: &str) -> Self {
        let mut state = Self::default();
        let mut section: Option<&str> = None;
        for line in text.lines() {
            let trimmed = line.trim();
            if let Some(rest) = trimmed.strip_prefix("## ") {
                section = match rest.trim() {
                    "Current" => Some("current"),
                    "Backlog" => Some("backlog"),
                    "Completed" => Some("completed"),
                    "Learnings" => Some("learnings"),
                    _ => None,
                };
                continue;
            }
            if let Some(rest) = trimmed.strip_prefix("Compaction Count:") {
                state.compaction_count = rest.trim().parse().unwrap_or(0);
                continue;
            }
            let Some(item) = trimmed.strip_prefix("- ") else {
                continue;
            };
            let item = item.to_string();
            match section {
                Some("current") => state.current.push(item),
                Some("backlog") => state.backlog.push(item),
                Some("completed") => state.completed.push(item),
                Some("learnings") => state.learnings.push(item),
                _ => {}
            }
        }
        state
    }

    /// Render back to the markdown format.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str("# Bulldoze state\n\n");
        out.push_str(&format!("Compaction Count: {}\n\n", self.compaction_count));
        for (title, items) in [
            ("Current", &self.current),
            ("Backlog", &self.backlog),
            ("Completed", &self.completed),
            ("Learnings", &self.learnings),
        ] {
            out.push_str(&format!("## {}\n\n", title));
            for item in items.iter() {
                out.push_str(&format!("- {}\n", item));
            }
            out.push('\n');
        }
        out
    }

    /// Save atomically.
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        std::fs::write(&tmp, self.render())?;
        std::fs::rename(&tmp, path)
    }

    /// Delete the state file; missing is fine.
    pub fn clear(path: &Path) {
        match std::fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "bulldoze state removal failed");
            }
        }
    }
}

/// Scan a state file's text for an explicit stop marker on its own line.
pub fn find_stop_marker(text: &str) -> Option<String> {
    for line in text.lines() {
        let trimmed = line.trim().trim_start_matches("- ");
        if STOP_MARKERS.contains(&trimmed) {
            return Some(trimmed.to_string());
        }
    }
    None
}

/// Build the continuation message for a cycle. Every [`AUDIT_EVERY`]th cycle
/// is an audit asking the agent to reconcile its state file with reality.
pub fn continuation_prompt(cycle: u32, state_file: &Path) -> String {
    let state_rel = state_file.display();
    if cycle % AUDIT_EVERY == 0 {
        format!(
            "AUDIT cycle {cycle}: stop and reconcile {state_rel} with reality. \
             Verify each Completed item actually works (run its tests), move \
             anything broken back to Current, prune stale Backlog entries, and \
             update Learnings. If there is genuinely nothing left, write \
             EXHAUSTED on its own line in the state file. Then continue with \
             the top Current item."
        )
    } else {
        format!(
            "Continue working. Read {state_rel}, pick up the top Current item \
             (or promote the next Backlog item), complete it, commit, and \
             update the state file. If you are blocked write BLOCKED on its \
             own line in the state file and explain why."
        )
    }
}

#[cfg(test)]
#[path = "bulldoze_tests.rs"]
mod tests;
