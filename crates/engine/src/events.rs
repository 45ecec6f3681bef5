// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event broadcasting.
//!
//! A thin wrapper over a `tokio::sync::broadcast` channel. Conversion to the
//! outbound wire form (and with it the sensitive-key stripping) happens here,
//! once, at publication, so subscribers only ever see the stripped payloads.

use strategos_core::{EngineEvent, OutboundEvent};
use tokio::sync::broadcast;

/// Publish/subscribe bus for engine events.
#[derive(Clone)]
pub struct Broadcaster {
    tx: broadcast::Sender<OutboundEvent>,
}

impl Broadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all events from this point on.
    pub fn subscribe(&self) -> broadcast::Receiver<OutboundEvent> {
        self.tx.subscribe()
    }

    /// Publish an event. Lagging or absent subscribers never block the
    /// engine.
    pub fn emit(&self, event: EngineEvent) {
        let outbound = event.into_outbound();
        tracing::debug!(event = %outbound.name, "emit");
        let _ = self.tx.send(outbound);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Structured lifecycle log record, the engine's equivalent of a flight
/// recorder line.
pub fn log_lifecycle(event: &str, worker_id: &str, reason: &str) {
    tracing::info!(
        target: "strategos::lifecycle",
        event,
        worker_id,
        reason,
        "lifecycle"
    );
}
