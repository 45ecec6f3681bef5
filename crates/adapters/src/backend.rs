// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Backend AI CLI command construction.
//!
//! The engine never assembles argv strings itself; everything the backend
//! binaries are invoked with is built here so tool restrictions cannot drift
//! between the interactive and headless paths.

use strategos_core::{Backend, Role, WorkerId};
use std::path::{Path, PathBuf};

/// Tools granted to read-only tiers (commanders, reviewers, researchers).
const READ_ONLY_TOOLS: &str = "Read,Grep,Glob,Task,WebFetch,Bash";

/// Shell patterns denied to read-only tiers.
const READ_ONLY_DISALLOWED: &str =
    "Edit,Write,NotebookEdit,Bash(rm *),Bash(mv *),Bash(cp *),Bash(git push*),Bash(npm publish*),Bash(> *)";

/// Output formats accepted for headless runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    StreamJson,
}

impl OutputFormat {
    pub fn as_flag(self) -> &'static str {
        match self {
            OutputFormat::Text => "text",
            OutputFormat::Json => "json",
            OutputFormat::StreamJson => "stream-json",
        }
    }

    /// Parse a caller-supplied format string; unknown values are rejected
    /// rather than passed through to the CLI.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(OutputFormat::Text),
            "json" => Some(OutputFormat::Json),
            "stream-json" => Some(OutputFormat::StreamJson),
            _ => None,
        }
    }
}

/// Builder for backend CLI invocations.
#[derive(Debug, Clone)]
pub struct BackendCommand {
    backend: Backend,
}

impl BackendCommand {
    pub fn new(backend: Backend) -> Self {
        Self { backend }
    }

    /// The interactive command run inside a worker's pane.
    ///
    /// Read-only tiers get the restricted tool list and the destructive-shell
    /// disallow list; execution tiers run unrestricted.
    pub fn interactive(&self, role: Role) -> String {
        match self.backend {
            Backend::Claude => {
                if role.is_read_only() {
                    format!(
                        "claude --tools \"{}\" --disallowedTools \"{}\"",
                        READ_ONLY_TOOLS, READ_ONLY_DISALLOWED
                    )
                } else {
                    "claude".to_string()
                }
            }
            Backend::Gemini => "gemini --yolo".to_string(),
        }
    }

    /// One-shot headless invocation as (program, args).
    pub fn headless(
        &self,
        prompt: &str,
        format: OutputFormat,
        system_prompt: Option<&str>,
    ) -> (String, Vec<String>) {
        match self.backend {
            Backend::Claude => {
                let mut args = vec![
                    "--print".to_string(),
                    "--output-format".to_string(),
                    format.as_flag().to_string(),
                ];
                if let Some(sp) = system_prompt {
                    args.push("--append-system-prompt".to_string());
                    args.push(sp.to_string());
                }
                args.push(prompt.to_string());
                ("claude".to_string(), args)
            }
            Backend::Gemini => {
                let args = vec!["--yolo".to_string(), "-p".to_string(), prompt.to_string()];
                ("gemini".to_string(), args)
            }
        }
    }

    /// Window of stripped pane text inspected by the auto-accept heuristics.
    /// Gemini renders much larger TUI frames, so it needs a wider window.
    pub fn auto_accept_window(&self) -> usize {
        match self.backend {
            Backend::Claude => 500,
            Backend::Gemini => 5000,
        }
    }

    /// Per-worker rules file location inside the project working directory.
    pub fn context_file(&self, working_dir: &Path, id: &WorkerId) -> PathBuf {
        match self.backend {
            Backend::Claude => working_dir
                .join(".claude")
                .join("rules")
                .join(format!("strategos-worker-{}.md", id)),
            Backend::Gemini => working_dir.join(format!("GEMINI-strategos-worker-{}.md", id)),
        }
    }

    /// Shared context file imported by every per-worker file, if the backend
    /// uses one.
    pub fn shared_context_file(&self, working_dir: &Path) -> Option<PathBuf> {
        match self.backend {
            Backend::Claude => None,
            Backend::Gemini => Some(working_dir.join("GEMINI.md")),
        }
    }

    /// The process name expected in the pane while the agent is alive. A
    /// bare shell here means the backend exited.
    pub fn process_name(&self) -> &'static str {
        match self.backend {
            Backend::Claude => "claude",
            Backend::Gemini => "gemini",
        }
    }
}

#[cfg(test)]
#[path = "backend_tests.rs"]
mod tests;
