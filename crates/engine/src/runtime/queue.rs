// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command queue and pane input delivery.
//!
//! At most one outstanding pane send per worker, one drainer per worker, and
//! FIFO order with fixed spacing. A failed send re-queues at the head when
//! the worker still exists; otherwise the command is discarded with it.

use super::{Engine, EngineError};
use std::time::Duration;
use strategos_adapters::MuxAdapter;
use strategos_core::{sanitize_pane_input, Clock, IdGen, WorkerId};

/// Upper bound on commands delivered by one drainer pass.
const DRAIN_BATCH_MAX: usize = 20;
/// Delay between SIGINT and a follow-up message.
const INTERRUPT_FOLLOWUP_DELAY: Duration = Duration::from_millis(500);

impl<M: MuxAdapter, C: Clock, I: IdGen + 'static> Engine<M, C, I> {
    /// Send input to a worker on behalf of a human operator.
    ///
    /// Human input auto-pauses bulldoze; everything else behaves like
    /// [`send_system_input`](Self::send_system_input).
    pub async fn send_input(
        &self,
        id: &WorkerId,
        text: impl Into<String>,
    ) -> Result<(), EngineError> {
        self.pause_bulldoze_for_human(id);
        self.send_internal(id, text.into(), true).await
    }

    /// Send input originating from the engine itself (continuations,
    /// reminders, corrections). Does not pause bulldoze.
    pub(crate) async fn send_system_input(
        &self,
        id: &WorkerId,
        text: impl Into<String>,
    ) -> Result<(), EngineError> {
        self.send_internal(id, text.into(), true).await
    }

    /// Send raw text without the trailing Enter.
    pub async fn send_raw_input(
        &self,
        id: &WorkerId,
        text: impl Into<String>,
    ) -> Result<(), EngineError> {
        self.pause_bulldoze_for_human(id);
        self.send_internal(id, text.into(), false).await
    }

    async fn send_internal(
        &self,
        id: &WorkerId,
        text: String,
        newline: bool,
    ) -> Result<(), EngineError> {
        // Enqueue-or-direct decision under one lock
        let direct = {
            let mut reg = self.registries.lock();
            if !reg.workers.contains_key(id) {
                return Err(EngineError::WorkerNotFound(id.to_string()));
            }
            if reg.sending_input.contains(id) || reg.queue_len(id) > 0 {
                reg.enqueue_command(id, text.clone())
                    .map_err(|_| EngineError::QueueFull(id.to_string()))?;
                false
            } else {
                reg.try_begin_send(id);
                true
            }
        };

        if !direct {
            self.spawn_drainer(id);
            return Ok(());
        }

        let result = self.deliver_to_pane(id, &text, newline).await;
        self.registries.lock().end_send(id);

        if let Err(e) = result {
            // Re-queue at head if the worker survived the failure
            let mut reg = self.registries.lock();
            if reg.workers.contains_key(id) {
                reg.requeue_command_front(id, text);
                drop(reg);
                self.spawn_drainer(id);
            }
            return Err(e);
        }

        self.spawn_drainer(id);
        Ok(())
    }

    /// One cooperative drainer per worker: delivers up to a batch of queued
    /// commands with fixed spacing, guarded by the per-worker drain flag.
    pub(crate) fn spawn_drainer(&self, id: &WorkerId) {
        {
            let mut reg = self.registries.lock();
            if reg.queue_len(id) == 0 || !reg.try_begin_drain(id) {
                return;
            }
        }

        let Some(engine) = self.handle() else {
            self.registries.lock().end_drain(id);
            return;
        };
        let id = id.clone();
        tokio::spawn(async move {
            for _ in 0..DRAIN_BATCH_MAX {
                let command = {
                    let mut reg = engine.registries.lock();
                    if reg.sending_input.contains(&id) {
                        break;
                    }
                    match reg.dequeue_command(&id) {
                        Some(cmd) => {
                            reg.try_begin_send(&id);
                            cmd
                        }
                        None => break,
                    }
                };

                let result = engine.deliver_to_pane(&id, &command, true).await;
                engine.registries.lock().end_send(&id);

                if let Err(e) = result {
                    let mut reg = engine.registries.lock();
                    if reg.workers.contains_key(&id) {
                        tracing::warn!(worker_id = %id, error = %e, "queued send failed, re-queueing at head");
                        reg.requeue_command_front(&id, command);
                    }
                    break;
                }

                tokio::time::sleep(engine.config.queue_send_spacing).await;
            }
            engine.registries.lock().end_drain(&id);
        });
    }

    /// Actually type into the pane: sanitized literal text, then Enter.
    pub(crate) async fn deliver_to_pane(
        &self,
        id: &WorkerId,
        text: &str,
        newline: bool,
    ) -> Result<(), EngineError> {
        let session = self.session_name_of(id)?;
        let clean = sanitize_pane_input(text);
        self.mux.send_literal(&session, &clean).await?;
        if newline {
            // Give the TUI a beat to take the keystrokes before submitting
            tokio::time::sleep(Duration::from_millis(100)).await;
            self.mux.send_key(&session, "Enter").await?;
        }
        Ok(())
    }

    /// Send SIGINT to the worker's pane, optionally following with a queued
    /// message once the agent has settled.
    pub async fn interrupt_worker(
        &self,
        id: &WorkerId,
        message: Option<String>,
    ) -> Result<(), EngineError> {
        let session = self.session_name_of(id)?;
        self.mux.send_key(&session, "C-c").await?;

        if let Some(message) = message {
            if let Some(engine) = self.handle() {
                let id = id.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(INTERRUPT_FOLLOWUP_DELAY).await;
                    if let Err(e) = engine.send_system_input(&id, message).await {
                        tracing::debug!(worker_id = %id, error = %e, "interrupt follow-up failed");
                    }
                });
            }
        }
        Ok(())
    }

    /// Any human input pauses an active bulldoze loop.
    fn pause_bulldoze_for_human(&self, id: &WorkerId) {
        let paused = self
            .with_worker_mut(id, |w| {
                if w.bulldoze_mode && !w.bulldoze_paused {
                    w.bulldoze_paused = true;
                    w.bulldoze_pause_reason = Some("human_input".to_string());
                    true
                } else {
                    false
                }
            })
            .unwrap_or(false);
        if paused {
            self.broadcaster
                .emit(strategos_core::EngineEvent::WorkerBulldozePaused {
                    worker_id: id.clone(),
                    reason: "human_input".to_string(),
                });
        }
    }
}
