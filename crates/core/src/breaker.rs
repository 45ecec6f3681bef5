// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Circuit breaker over multiplexer session creation.
//!
//! Only session *creation* failures count; transient capture failures are
//! handled by the per-worker retry counter instead.

use serde::Serialize;
use std::time::{Duration, Instant};

const TRIP_THRESHOLD: u32 = 3;
const FAIL_WINDOW: Duration = Duration::from_secs(60);

/// Counts consecutive multiplexer command failures and refuses spawns while
/// tripped. Resets on any success.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    fail_count: u32,
    first_fail_at: Option<Instant>,
    last_fail_at: Option<Instant>,
    threshold: u32,
    window: Duration,
}

/// Snapshot of the breaker for `getCircuitBreakerStatus`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BreakerStatus {
    pub tripped: bool,
    pub fail_count: u32,
    /// Milliseconds since the first failure of the current streak.
    pub streak_age_ms: Option<u64>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self {
            fail_count: 0,
            first_fail_at: None,
            last_fail_at: None,
            threshold: TRIP_THRESHOLD,
            window: FAIL_WINDOW,
        }
    }
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a session-creation failure.
    pub fn on_failure(&mut self, now: Instant) {
        // A streak older than the window starts over
        if let Some(first) = self.first_fail_at {
            if now.duration_since(first) > self.window {
                self.fail_count = 0;
                self.first_fail_at = None;
            }
        }
        if self.first_fail_at.is_none() {
            self.first_fail_at = Some(now);
        }
        self.fail_count += 1;
        self.last_fail_at = Some(now);
    }

    /// Record a successful session creation, closing the breaker.
    pub fn on_success(&mut self) {
        self.reset();
    }

    /// Manual reset (exposed through the facade).
    pub fn reset(&mut self) {
        self.fail_count = 0;
        self.first_fail_at = None;
        self.last_fail_at = None;
    }

    /// Whether spawns should be refused right now.
    ///
    /// Tripped when the threshold was reached within the window. A tripped
    /// breaker with no activity heals once the window has elapsed.
    pub fn is_tripped(&self, now: Instant) -> bool {
        if self.fail_count < self.threshold {
            return false;
        }
        match self.last_fail_at {
            Some(last) => now.duration_since(last) <= self.window,
            None => false,
        }
    }

    pub fn status(&self, now: Instant) -> BreakerStatus {
        BreakerStatus {
            tripped: self.is_tripped(now),
            fail_count: self.fail_count,
            streak_age_ms: self
                .first_fail_at
                .map(|f| now.duration_since(f).as_millis() as u64),
        }
    }
}

#[cfg(test)]
#[path = "breaker_tests.rs"]
mod tests;
