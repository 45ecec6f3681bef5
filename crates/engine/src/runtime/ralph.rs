// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Inbound Ralph progress signals.
//!
//! Workers report through the API boundary with their opaque per-worker
//! token; the boundary forwards the parsed signal here. A wrong token is a
//! plain validation error; the caller learns nothing about whether the
//! worker exists in Ralph mode.

use super::{Engine, EngineError};
use strategos_adapters::MuxAdapter;
use strategos_core::{Clock, IdGen, NormalizedWorker, RalphStatus, WorkerId};

/// One parsed progress report.
#[derive(Debug, Clone)]
pub struct RalphSignal {
    pub token: String,
    pub status: RalphStatus,
    pub progress: Option<u8>,
    pub current_step: Option<String>,
    pub learnings: Vec<String>,
    /// Accepted as either an object or a plain string.
    pub outputs: Option<serde_json::Value>,
    pub artifacts: Vec<String>,
}

impl<M: MuxAdapter, C: Clock, I: IdGen + 'static> Engine<M, C, I> {
    /// Apply a progress signal from a worker.
    ///
    /// `done` runs the full done-path: status change, parent delivery, and
    /// completion with auto-cleanup. `blocked` notifies the parent.
    pub async fn ralph_signal(
        &self,
        id: &WorkerId,
        signal: RalphSignal,
    ) -> Result<NormalizedWorker, EngineError> {
        let now_ms = self.now_ms();
        let accepted = self
            .with_worker_mut(id, |w| {
                if !w.ralph_mode || w.ralph_token.as_deref() != Some(signal.token.as_str()) {
                    return false;
                }
                w.ralph_status = signal.status;
                if let Some(progress) = signal.progress {
                    w.ralph_progress = progress.min(100);
                }
                if signal.current_step.is_some() {
                    w.ralph_current_step = signal.current_step.clone();
                }
                w.ralph_learnings.extend(signal.learnings.clone());
                if let Some(outputs) = &signal.outputs {
                    if outputs.is_object() || outputs.is_string() {
                        w.ralph_outputs = Some(outputs.clone());
                    }
                }
                w.ralph_artifacts.extend(signal.artifacts.clone());
                w.ralph_signal_count += 1;
                w.last_ralph_signal_ms = Some(now_ms);
                w.last_activity_ms = now_ms;
                if w.health == strategos_core::WorkerHealth::Stalled {
                    w.health = strategos_core::WorkerHealth::Healthy;
                }
                true
            })
            .unwrap_or(false);

        if !accepted {
            return Err(EngineError::Validation("signal rejected".to_string()));
        }

        match signal.status {
            RalphStatus::Done => {
                self.with_worker_mut(id, |w| w.ralph_progress = 100);
                self.notify_parent_of(id, "signaled done").await;
                if let Err(e) = self.complete_worker(id, true).await {
                    tracing::warn!(worker_id = %id, error = %e, "done-signal completion failed");
                }
            }
            RalphStatus::Blocked => {
                self.notify_parent_of(id, "signaled blocked and needs direction")
                    .await;
                self.emit_updated(id);
            }
            _ => {
                self.emit_updated(id);
            }
        }

        self.saver.request_save();
        self.worker_clone(id)
            .map(|w| w.normalized())
            .ok_or_else(|| EngineError::WorkerNotFound(id.to_string()))
    }
}
