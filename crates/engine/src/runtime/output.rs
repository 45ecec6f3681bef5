// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The output and control plane: one capture tick over every monitored
//! worker, with change detection, auto-accept, the role-violation sentinel,
//! and rate-limit / compaction tracking.

use super::{Engine, EngineError};
use crate::patterns;
use strategos_adapters::{BackendCommand, MuxAdapter};
use strategos_core::{strip_ansi, Clock, EngineEvent, IdGen, Role, WorkerId};

/// Pane lines requested per capture.
const CAPTURE_LINES: u32 = 500;
/// Consecutive capture failures before a session is declared dead.
const CAPTURE_FAILURE_LIMIT: u32 = 3;
/// Grace period after spawn during which capture failures are ignored.
const INITIAL_GRACE_MS: u64 = 5_000;
/// Auto-accept cool-off between identical prompts.
const ACCEPT_COOLOFF_MS: u64 = 6_000;
/// History store sampling: every Nth change is persisted.
const HISTORY_SAMPLE_EVERY: u64 = 10;
/// Excerpt size carried on `worker:output` events.
const OUTPUT_EVENT_EXCERPT: usize = 4_096;
/// Idle ticks before an auto-continue fires after a rate limit.
const RATE_LIMIT_IDLE_TICKS: u32 = 4;
/// Idle ticks before an auto-continue fires after a compaction.
const COMPACTION_IDLE_TICKS: u32 = 2;
/// Lifetime cap on auto-continue attempts per worker.
const AUTO_CONTINUE_MAX: u32 = 10;

impl<M: MuxAdapter, C: Clock, I: IdGen + 'static> Engine<M, C, I> {
    /// One capture pass over every monitored worker.
    pub async fn capture_tick(&self) {
        let ids: Vec<WorkerId> = {
            let reg = self.registries.lock();
            reg.monitored.iter().cloned().collect()
        };
        for id in ids {
            self.capture_worker(&id).await;
        }
    }

    async fn capture_worker(&self, id: &WorkerId) {
        let Some(worker) = self.worker_clone(id) else {
            return;
        };
        let now_ms = self.now_ms();

        match self.mux.capture_pane(&worker.session_name, CAPTURE_LINES).await {
            Err(e) => {
                // A very young session may not be capturable yet
                if now_ms.saturating_sub(worker.created_at_ms) < INITIAL_GRACE_MS {
                    return;
                }
                let failures = self
                    .with_worker_mut(id, |w| {
                        w.capture_failures += 1;
                        w.capture_failures
                    })
                    .unwrap_or(0);
                tracing::debug!(worker_id = %id, failures, error = %e, "pane capture failed");
                if failures >= CAPTURE_FAILURE_LIMIT {
                    self.handle_worker_death(id, "session capture failed repeatedly")
                        .await;
                }
            }
            Ok(raw) => {
                self.with_worker_mut(id, |w| w.capture_failures = 0);
                self.process_capture(id, raw).await;
            }
        }
    }

    async fn process_capture(&self, id: &WorkerId, raw: String) {
        let now_ms = self.now_ms();

        // Change detection against the previous buffer, then replace it
        let changed = {
            let mut reg = self.registries.lock();
            let old_fp = reg
                .output_buffer(id)
                .map(patterns::capture_fingerprint)
                .unwrap_or_default();
            let new_fp = patterns::capture_fingerprint(&raw);
            reg.set_output_buffer(id, raw.clone());
            old_fp != new_fp
        };

        let Some(worker) = self.worker_clone(id) else {
            return;
        };
        let window = BackendCommand::new(worker.backend).auto_accept_window();
        let stripped = strip_ansi(&raw);
        let tail = last_chars(&stripped, window);

        // These checks run every tick regardless of change
        self.check_auto_accept(id, &tail, now_ms).await;
        self.check_role_violation(id, &tail).await;
        self.check_limits(id, &tail, now_ms);

        if changed {
            let change_count = self
                .with_worker_mut(id, |w| {
                    w.last_output_ms = now_ms;
                    w.last_activity_ms = now_ms;
                    w.idle_ticks = 0;
                    if w.health == strategos_core::WorkerHealth::Stalled {
                        w.health = strategos_core::WorkerHealth::Healthy;
                    }
                    w.output_change_count += 1;
                    w.output_change_count
                })
                .unwrap_or(0);

            self.broadcaster.emit(EngineEvent::WorkerOutput {
                worker_id: id.clone(),
                chunk: last_chars(&stripped, OUTPUT_EVENT_EXCERPT),
            });
            if change_count % HISTORY_SAMPLE_EVERY == 0 {
                self.history.store_output(id, &stripped);
            }
        } else {
            self.handle_idle_tick(id, &tail, now_ms).await;
        }
    }

    /// Auto-accept: press Enter on safe confirmation prompts, pausing while
    /// plan-mode or question-tool indicators are on screen.
    async fn check_auto_accept(&self, id: &WorkerId, tail: &str, now_ms: u64) {
        let Some(worker) = self.worker_clone(id) else {
            return;
        };

        let pause = patterns::find_pause_keyword(tail);
        if let Some(keyword) = pause {
            if !worker.auto_accept_paused {
                self.with_worker_mut(id, |w| w.auto_accept_paused = true);
                tracing::debug!(worker_id = %id, keyword, "auto-accept paused");
                self.emit_updated(id);
            }
            return;
        }
        if worker.auto_accept_paused {
            self.with_worker_mut(id, |w| w.auto_accept_paused = false);
            tracing::debug!(worker_id = %id, "auto-accept resumed");
            self.emit_updated(id);
        }

        if !worker.auto_accept || !patterns::detect_confirmation_prompt(tail) {
            return;
        }

        let fingerprint = format!("{:x}", patterns::tail_hash(tail));
        let same_prompt = worker.last_accept_fingerprint.as_deref() == Some(&fingerprint);
        let in_cooloff = worker
            .last_accept_at_ms
            .is_some_and(|at| now_ms.saturating_sub(at) < ACCEPT_COOLOFF_MS);
        if same_prompt && in_cooloff {
            return;
        }

        if let Err(e) = self.accept_prompt(id).await {
            tracing::debug!(worker_id = %id, error = %e, "auto-accept send failed");
            return;
        }
        self.with_worker_mut(id, |w| {
            w.last_accept_fingerprint = Some(fingerprint);
            w.last_accept_at_ms = Some(now_ms);
        });
        tracing::debug!(worker_id = %id, "auto-accepted confirmation prompt");
    }

    async fn accept_prompt(&self, id: &WorkerId) -> Result<(), EngineError> {
        let session = self.session_name_of(id)?;
        self.mux.send_key(&session, "Enter").await?;
        Ok(())
    }

    /// The sentinel: a GENERAL caught implementing gets interrupted and
    /// corrected, once per distinct pane tail.
    async fn check_role_violation(&self, id: &WorkerId, tail: &str) {
        let Some(worker) = self.worker_clone(id) else {
            return;
        };
        if worker.role() != Role::General {
            return;
        }
        let Some(violation) = patterns::detect_role_violation(tail) else {
            return;
        };
        let hash = patterns::tail_hash(tail);
        if worker.last_violation_hash == Some(hash) {
            return;
        }

        let detail = match &violation {
            patterns::Violation::EditTool(tool) => format!("edit tool: {tool}"),
            patterns::Violation::ShellCommand(cmd) => format!("implementation command: {cmd}"),
        };
        self.with_worker_mut(id, |w| {
            w.last_violation_hash = Some(hash);
            w.delegation_metrics.role_violations += 1;
        });
        tracing::warn!(worker_id = %id, detail, "role violation by commander");
        self.broadcaster.emit(EngineEvent::WorkerRoleViolation {
            worker_id: id.clone(),
            label: worker.label.clone(),
            detail,
        });

        let correction = "STAND DOWN: you are a commander, not an implementer. \
                          Revert any direct edits and delegate this work to a \
                          subordinate worker via the coordination endpoints."
            .to_string();
        if let Err(e) = self.interrupt_worker(id, Some(correction)).await {
            tracing::debug!(worker_id = %id, error = %e, "violation correction failed");
        }
    }

    /// Rate-limit and compaction detection.
    fn check_limits(&self, id: &WorkerId, tail: &str, now_ms: u64) {
        let Some(worker) = self.worker_clone(id) else {
            return;
        };

        if patterns::detect_rate_limit(tail) {
            if !worker.rate_limited {
                let reset_at = patterns::parse_reset_hint(tail)
                    .map(|hint| patterns::compute_reset_at_ms(now_ms, &hint));
                self.with_worker_mut(id, |w| {
                    w.rate_limited = true;
                    w.rate_limit_reset_at_ms = reset_at;
                });
                tracing::info!(worker_id = %id, ?reset_at, "rate limit detected");
                self.broadcaster.emit(EngineEvent::WorkerRateLimited {
                    worker_id: id.clone(),
                    reset_at_ms: reset_at,
                });
            }
        }

        if patterns::detect_compaction(tail) {
            if !worker.compacting {
                self.with_worker_mut(id, |w| w.compacting = true);
                if worker.bulldoze_mode {
                    self.bump_bulldoze_compactions(&worker);
                }
            }
        } else if worker.compacting {
            self.with_worker_mut(id, |w| w.compacting = false);
        }
    }

    /// No change this tick: idle accounting, bulldoze continuation, and
    /// rate-limit recovery.
    async fn handle_idle_tick(&self, id: &WorkerId, tail: &str, now_ms: u64) {
        let idle_ticks = self
            .with_worker_mut(id, |w| {
                w.idle_ticks = w.idle_ticks.saturating_add(1);
                w.idle_ticks
            })
            .unwrap_or(0);

        let Some(worker) = self.worker_clone(id) else {
            return;
        };

        // Bulldoze continuation (resume check included)
        if worker.bulldoze_mode {
            self.bulldoze_idle_tick(&worker, tail, idle_ticks, now_ms).await;
        }

        // Auto-continue after a session limit
        if worker.auto_continue && (worker.rate_limited || worker.compacting) {
            let threshold = if worker.rate_limited {
                RATE_LIMIT_IDLE_TICKS
            } else {
                COMPACTION_IDLE_TICKS
            };
            if idle_ticks < threshold {
                return;
            }
            if worker.rate_limited {
                if let Some(reset) = worker.rate_limit_reset_at_ms {
                    if now_ms < reset {
                        return;
                    }
                }
            }
            if worker.auto_continue_count >= AUTO_CONTINUE_MAX {
                if worker.auto_continue {
                    self.with_worker_mut(id, |w| w.auto_continue = false);
                    self.broadcaster
                        .emit(EngineEvent::WorkerAutoContinueExhausted {
                            worker_id: id.clone(),
                            attempts: worker.auto_continue_count,
                        });
                    tracing::warn!(worker_id = %id, "auto-continue exhausted");
                }
                return;
            }

            let attempt = worker.auto_continue_count + 1;
            let message = "Continue where you left off.".to_string();
            match self.send_system_input(id, message).await {
                Ok(()) => {
                    self.with_worker_mut(id, |w| {
                        w.auto_continue_count = attempt;
                        w.rate_limited = false;
                        w.rate_limit_reset_at_ms = None;
                        w.compacting = false;
                        w.idle_ticks = 0;
                    });
                    self.broadcaster.emit(EngineEvent::WorkerAutoContinue {
                        worker_id: id.clone(),
                        attempt,
                    });
                }
                Err(e) => {
                    tracing::debug!(worker_id = %id, error = %e, "auto-continue send failed");
                }
            }
        }
    }
}

/// Last `n` chars of a string, on char boundaries.
pub(crate) fn last_chars(s: &str, n: usize) -> String {
    let count = s.chars().count();
    s.chars().skip(count.saturating_sub(n)).collect()
}
