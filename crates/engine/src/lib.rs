// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! strategos-engine: the worker orchestration engine.
//!
//! Owns the worker lifecycle (spawn → run → complete / fail / dismiss /
//! cleanup), the dependency graph that gates execution, the output and
//! control plane over captured pane text, health monitoring with bounded
//! respawn, and atomic state persistence. Transport-agnostic by design: the
//! API boundary talks to [`runtime::Engine`] and subscribes to the
//! [`events::Broadcaster`].

pub mod bulldoze;
pub mod context;
pub mod error;
pub mod events;
pub mod graph;
pub mod history;
pub mod patterns;
pub mod runtime;
pub mod state;

pub use bulldoze::BulldozeState;
pub use context::ContextWriter;
pub use error::EngineError;
pub use events::Broadcaster;
pub use graph::{DependencyGraph, GraphError, RegisterOutcome, TaskSpec};
pub use history::{HistorySink, NoopHistory};
pub use runtime::{
    BatchResult, Engine, EngineConfig, EngineDeps, HeadlessOptions, KillOptions, RalphSignal,
    SpawnOptions, SpawnRequest, WorkerSettings,
};
pub use state::{Registries, ResourceStats};
