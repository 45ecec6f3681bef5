//! Behavioral specifications for the Strategos orchestration engine.
//!
//! These tests are black-box at the crate boundary: they drive the engine
//! facade over the fake multiplexer and fake clock exactly the way the API
//! surface would, and observe only public behavior (returned payloads,
//! broadcast events, and the filesystem artifacts the engine owns).

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

#[path = "specs/prelude.rs"]
mod prelude;

#[path = "specs/dependency_flow.rs"]
mod dependency_flow;
#[path = "specs/failure_semantics.rs"]
mod failure_semantics;
#[path = "specs/persistence.rs"]
mod persistence;
#[path = "specs/protection.rs"]
mod protection;
