// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! strategos-core: domain types for the Strategos worker orchestration engine

pub mod action;
pub mod breaker;
pub mod clock;
pub mod event;
pub mod id;
pub mod role;
pub mod text;
pub mod worker;

pub use action::{ActionError, EmitAction, OnCompleteAction, SpawnAction, WebhookAction};
pub use breaker::{BreakerStatus, CircuitBreaker};
pub use clock::{Clock, SystemClock};
pub use event::{strip_sensitive_keys, ActivityEntry, EngineEvent, OutboundEvent};
pub use id::{IdGen, ShortHexIdGen, ShortId, TaskId, WorkerId, WorkflowId};
pub use role::Role;
pub use text::{
    escape_json_value, escape_prompt_xml, sanitize_error_message, sanitize_pane_input, strip_ansi,
};
pub use worker::{
    Backend, DelegationMetrics, NormalizedWorker, RalphStatus, RespawnSuggestion, Worker,
    WorkerHealth, WorkerStatus,
};

#[cfg(any(test, feature = "test-support"))]
pub use clock::FakeClock;
#[cfg(any(test, feature = "test-support"))]
pub use id::SequentialIdGen;
