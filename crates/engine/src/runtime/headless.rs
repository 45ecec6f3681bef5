// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One-shot headless invocations and batch fan-out.

use super::{Engine, EngineError};
use std::sync::Arc;
use std::time::Duration;
use strategos_adapters::{BackendCommand, HeadlessOutcome, HeadlessRequest, MuxAdapter, OutputFormat};
use strategos_core::{Clock, IdGen};

/// Fan-out bound for batch operations.
const BATCH_MAX: usize = 50;

/// Options for a headless run.
#[derive(Debug, Clone, Default)]
pub struct HeadlessOptions {
    /// "text", "json", or "stream-json"; invalid values are rejected.
    pub output_format: Option<String>,
    pub timeout: Option<Duration>,
    pub system_prompt: Option<String>,
}

/// Per-project outcome of a batch run.
#[derive(Debug)]
pub struct BatchResult {
    pub project: String,
    pub result: Result<HeadlessOutcome, EngineError>,
}

impl<M: MuxAdapter, C: Clock, I: IdGen + 'static> Engine<M, C, I> {
    /// Run the backend CLI once, non-interactively, in a project directory.
    pub async fn run_headless(
        &self,
        project_path: &str,
        prompt: &str,
        opts: &HeadlessOptions,
    ) -> Result<HeadlessOutcome, EngineError> {
        let cwd = self.resolve_working_dir(project_path)?;
        let format = match opts.output_format.as_deref() {
            None => OutputFormat::default(),
            Some(raw) => OutputFormat::parse(raw).ok_or_else(|| {
                EngineError::Validation(format!("invalid output format: {raw}"))
            })?,
        };

        let backend = BackendCommand::new(self.config.backend);
        let (program, args) = backend.headless(prompt, format, opts.system_prompt.as_deref());

        let request = HeadlessRequest {
            program,
            args,
            cwd,
            env: Vec::new(),
            timeout: opts.timeout,
            parse_json: format == OutputFormat::Json,
        };
        Ok(request.run().await?)
    }

    /// Fan a prompt out over many projects, joined-all semantics: each
    /// project reports success or error independently.
    pub async fn run_batch_operation(
        &self,
        projects: Vec<String>,
        prompt: &str,
        opts: &HeadlessOptions,
    ) -> Result<Vec<BatchResult>, EngineError> {
        if projects.is_empty() {
            return Err(EngineError::Validation("no projects given".into()));
        }
        if projects.len() > BATCH_MAX {
            return Err(EngineError::Validation(format!(
                "batch limited to {BATCH_MAX} projects, got {}",
                projects.len()
            )));
        }

        let engine = self
            .handle()
            .ok_or_else(|| EngineError::Validation("engine shutting down".into()))?;
        let mut joinset = tokio::task::JoinSet::new();
        for project in projects {
            let engine = Arc::clone(&engine);
            let prompt = prompt.to_string();
            let opts = opts.clone();
            joinset.spawn(async move {
                let result = engine.run_headless(&project, &prompt, &opts).await;
                BatchResult { project, result }
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = joinset.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => {
                    tracing::error!(error = %e, "batch task panicked");
                }
            }
        }
        results.sort_by(|a, b| a.project.cmp(&b.project));
        Ok(results)
    }
}
