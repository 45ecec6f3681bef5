// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Output-history sink interface.
//!
//! The SQLite history store lives outside the engine; this is the contract
//! it implements. Output writes are sampled by the capture loop (every 10th
//! change) so a chatty pane cannot saturate the store.

use strategos_core::{NormalizedWorker, WorkerId};

/// Sink for worker session history.
pub trait HistorySink: Send + Sync + 'static {
    /// A worker session began (spawn or restore).
    fn start_session(&self, worker: &NormalizedWorker);

    /// A sampled output chunk.
    fn store_output(&self, worker_id: &WorkerId, chunk: &str);

    /// The session ended with a final status string.
    fn end_session(&self, worker_id: &WorkerId, status: &str);
}

/// Default sink that drops everything.
#[derive(Clone, Default)]
pub struct NoopHistory;

impl HistorySink for NoopHistory {
    fn start_session(&self, _worker: &NormalizedWorker) {}
    fn store_output(&self, _worker_id: &WorkerId, _chunk: &str) {}
    fn end_session(&self, _worker_id: &WorkerId, _status: &str) {}
}
