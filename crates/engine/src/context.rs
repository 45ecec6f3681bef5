// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-worker rules file generation.
//!
//! Every worker gets a rules file in its project working directory telling
//! the agent who it is, what it may do, and how to report back. Writes are
//! serialized per project path (two workers spawning into the same project
//! must not interleave) and land via temp-file + rename so the agent process
//! can never observe a half-written file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use strategos_adapters::BackendCommand;
use strategos_core::{escape_json_value, escape_prompt_xml, Backend, Role, Worker, WorkerId};
use tokio::sync::Mutex as AsyncMutex;

/// Marker identifying Strategos-owned content in shared files.
const SHARED_MARKER: &str = "<!-- strategos:managed -->";

/// Serializes context writes per project path and renders the templates.
pub struct ContextWriter {
    locks: parking_lot::Mutex<HashMap<PathBuf, Arc<AsyncMutex<()>>>>,
    /// Base URL of the coordination API quoted in generated files.
    api_base: String,
}

impl ContextWriter {
    pub fn new(api_base: impl Into<String>) -> Self {
        Self {
            locks: parking_lot::Mutex::new(HashMap::new()),
            api_base: api_base.into(),
        }
    }

    fn lock_for(&self, project: &Path) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock();
        Arc::clone(
            locks
                .entry(project.to_path_buf())
                .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
        )
    }

    /// Drop per-project locks whose project has no live worker left.
    pub fn prune_locks(&self, live_projects: &[PathBuf]) {
        let mut locks = self.locks.lock();
        locks.retain(|path, _| live_projects.iter().any(|p| p == path));
    }

    /// Write the context file for a worker. Serialized per project path;
    /// subsequent writers wait for the previous write to settle either way.
    pub async fn write_for(&self, worker: &Worker) -> std::io::Result<PathBuf> {
        let lock = self.lock_for(&worker.working_dir);
        let _guard = lock.lock().await;

        let backend = BackendCommand::new(worker.backend);
        let path = backend.context_file(&worker.working_dir, &worker.id);
        let content = self.render(worker);
        atomic_write(&path, &content)?;

        if worker.backend == Backend::Gemini {
            self.rewrite_shared_imports(&worker.working_dir, None)?;
        }

        tracing::debug!(worker_id = %worker.id, path = %path.display(), "context file written");
        Ok(path)
    }

    /// Remove a worker's context file. Shared files are only removed when no
    /// other worker remains in the project (`remaining_in_project`).
    pub async fn remove_for(
        &self,
        worker_id: &WorkerId,
        working_dir: &Path,
        backend: Backend,
        remaining_in_project: usize,
    ) -> std::io::Result<()> {
        let lock = self.lock_for(working_dir);
        let _guard = lock.lock().await;

        let cmd = BackendCommand::new(backend);
        let path = cmd.context_file(working_dir, worker_id);
        match std::fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }

        if backend == Backend::Gemini {
            if remaining_in_project == 0 {
                if let Some(shared) = cmd.shared_context_file(working_dir) {
                    remove_if_strategos_owned(&shared)?;
                }
            } else {
                self.rewrite_shared_imports(working_dir, Some(worker_id))?;
            }
        }
        Ok(())
    }

    /// Remove context files in a directory that belong to no live worker
    /// (restore-time orphan sweep).
    pub fn remove_orphans(&self, working_dir: &Path, live_ids: &[WorkerId]) {
        let is_live = |name: &str| {
            live_ids
                .iter()
                .any(|id| name.contains(&format!("strategos-worker-{}", id)))
        };

        for dir in [
            working_dir.join(".claude").join("rules"),
            working_dir.to_path_buf(),
        ] {
            let Ok(entries) = std::fs::read_dir(&dir) else {
                continue;
            };
            for entry in entries.filter_map(|e| e.ok()) {
                let name = entry.file_name().to_string_lossy().into_owned();
                if name.contains("strategos-worker-") && !is_live(&name) {
                    if let Err(e) = std::fs::remove_file(entry.path()) {
                        tracing::warn!(path = %entry.path().display(), error = %e, "orphan context removal failed");
                    }
                }
            }
        }
    }

    /// Rebuild the shared GEMINI.md import list from the per-worker files
    /// present on disk, optionally excluding one being removed.
    fn rewrite_shared_imports(
        &self,
        working_dir: &Path,
        excluding: Option<&WorkerId>,
    ) -> std::io::Result<()> {
        let mut imports: Vec<String> = Vec::new();
        if let Ok(entries) = std::fs::read_dir(working_dir) {
            for entry in entries.filter_map(|e| e.ok()) {
                let name = entry.file_name().to_string_lossy().into_owned();
                if !name.starts_with("GEMINI-strategos-worker-") {
                    continue;
                }
                if let Some(id) = excluding {
                    if name.contains(&format!("strategos-worker-{}.md", id)) {
                        continue;
                    }
                }
                imports.push(format!("@./{}", name));
            }
        }
        imports.sort();

        let shared = working_dir.join("GEMINI.md");
        let mut content = String::new();
        content.push_str(SHARED_MARKER);
        content.push('\n');
        content.push_str("# Strategos worker rules\n\n");
        for import in &imports {
            content.push_str(import);
            content.push('\n');
        }
        atomic_write(&shared, &content)
    }

    /// Render the full rules file for a worker.
    fn render(&self, worker: &Worker) -> String {
        let role = worker.role();
        let label = escape_prompt_xml(&worker.label);
        let mut out = String::with_capacity(4096);

        out.push_str(&format!(
            "# Strategos worker rules\n\n\
             You are worker `{id}` in the Strategos fleet.\n\n\
             - Label: {label}\n\
             - Role: {title}\n\
             - Project: {project}\n\n",
            id = worker.id,
            label = label,
            title = role.title(),
            project = escape_prompt_xml(&worker.project),
        ));

        out.push_str("## Operational authority\n\n");
        out.push_str(authority_paragraph(role));
        out.push_str("\n\n");

        out.push_str("## Mission\n\n");
        out.push_str(&mission_text(role));
        if let Some(task) = &worker.task {
            out.push_str(&format!("\n\nAssigned task:\n\n{}\n", escape_prompt_xml(task)));
        }
        out.push('\n');

        if let (Some(parent_id), Some(parent_label)) =
            (&worker.parent_worker_id, &worker.parent_label)
        {
            out.push_str(&format!(
                "## Reachback\n\n\
                 Your commanding worker is `{}` ({}). Report blockers and\n\
                 completed objectives to it rather than going silent.\n\n",
                parent_id,
                escape_prompt_xml(parent_label),
            ));
        }

        if worker.ralph_mode {
            let token = worker.ralph_token.as_deref().unwrap_or_default();
            out.push_str(&format!(
                "## Progress signaling\n\n\
                 Report progress with the signal endpoint. Example:\n\n\
                 ```\n\
                 curl -s -X POST {base}/api/ralph/signal/by-worker/{id} \\\n\
                   -H \"Content-Type: application/json\" \\\n\
                   -d \"{{\\\"token\\\": \\\"{token}\\\", \\\"status\\\": \\\"in_progress\\\", \\\"progress\\\": 25, \\\"currentStep\\\": \\\"describe what you are doing\\\"}}\"\n\
                 ```\n\n\
                 Send `status: done` with `progress: 100` when your task is\n\
                 complete, or `status: blocked` with an explanation.\n\n",
                base = self.api_base,
                id = worker.id,
                token = escape_json_value(token),
            ));
        }

        if worker.bulldoze_mode {
            out.push_str(
                "## Autonomous continuation\n\n\
                 This session runs in bulldoze mode: when you go idle you will\n\
                 be re-prompted to continue from your state file. Keep\n\
                 `tmp/bulldoze-state-*.md` current: move finished items to\n\
                 Completed, keep Current honest, and record Learnings. Write\n\
                 EXHAUSTED, BLOCKED, or NEEDS_HUMAN on its own line when\n\
                 continuing is pointless.\n\n",
            );
        }

        out.push_str(&format!(
            "## Coordination endpoints\n\n\
             - `GET {base}/api/workers`: fleet state\n\
             - `POST {base}/api/workers`: request a subordinate\n\
             - `POST {base}/api/workers/<id>/input`: send input to a worker\n\
             - `POST {base}/api/workers/<id>/dismiss`: dismiss a finished worker\n",
            base = self.api_base,
        ));

        out
    }
}

fn authority_paragraph(role: Role) -> &'static str {
    if role.is_strategic() {
        "You command other workers. Delegate implementation through the\n\
         coordination endpoints; do not edit files or run build commands\n\
         yourself. Reading, searching, and read-only git are fine."
    } else if role.is_read_only() {
        "You operate read-only. Inspect, analyze, and report; leave edits\n\
         to implementation workers."
    } else {
        "You have full authority inside this project directory. Stay inside\n\
         it and keep your work committed."
    }
}

fn mission_text(role: Role) -> String {
    match role {
        Role::General => {
            "Hold the theater. Break the objective into missions, raise\n\
             colonels and captains for each, track their progress, and keep\n\
             the operator informed. You never implement."
        }
        Role::Colonel => {
            "Run the operation you were given. Decompose it, spawn captains\n\
             or specialists for the pieces, and integrate their results."
        }
        Role::Captain => {
            "Lead your squad on the assigned objective. Spawn specialists\n\
             when the work parallelizes, otherwise direct and review."
        }
        Role::Research => {
            "Investigate and report. Produce findings with references; make\n\
             no changes."
        }
        Role::Impl => {
            "Implement the assigned change end to end: code, tests passing,\n\
             committed."
        }
        Role::Test => {
            "Build the test coverage described in your task. Verify the\n\
             suite runs clean before reporting done."
        }
        Role::Review => {
            "Review the named change set. Report defects with file and line\n\
             references; do not fix them yourself."
        }
        Role::Fix => {
            "Reproduce the defect, fix it, prove the fix with a test, and\n\
             commit."
        }
        Role::Specialist => {
            "Complete the assigned task inside this project. Ask your parent\n\
             worker when the objective is unclear."
        }
    }
    .to_string()
}

/// Write via temp file + rename in the same directory.
fn atomic_write(path: &Path, content: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    std::fs::write(&tmp, content)?;
    std::fs::rename(&tmp, path)
}

/// Remove a shared file only when we own it (marker present).
fn remove_if_strategos_owned(path: &Path) -> std::io::Result<()> {
    match std::fs::read_to_string(path) {
        Ok(content) if content.starts_with(SHARED_MARKER) => std::fs::remove_file(path),
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
