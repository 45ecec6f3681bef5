// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker roles derived from label prefixes.
//!
//! A label like `IMPL: wire up the parser` carries its role in the prefix.
//! The role decides mission text, tool restrictions at spawn, and whether the
//! worker is protected from automatic kill/respawn/cleanup.

use serde::{Deserialize, Serialize};

/// The military-style tier of a worker, detected from its label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    General,
    Colonel,
    Captain,
    Research,
    Impl,
    Test,
    Review,
    Fix,
    Specialist,
}

impl Role {
    /// Detect the role from a worker label.
    ///
    /// Matches a fixed uppercase prefix followed by `:` or a space. `COL` and
    /// `CAPT` are accepted abbreviations. Anything else is a Specialist.
    pub fn detect(label: &str) -> Role {
        let upper = label.trim_start().to_uppercase();
        let has_prefix = |p: &str| {
            upper.starts_with(p)
                && matches!(upper.as_bytes().get(p.len()), Some(b':') | Some(b' '))
        };

        if has_prefix("GENERAL") {
            Role::General
        } else if has_prefix("COLONEL") || has_prefix("COL") {
            Role::Colonel
        } else if has_prefix("CAPTAIN") || has_prefix("CAPT") {
            Role::Captain
        } else if has_prefix("RESEARCH") {
            Role::Research
        } else if has_prefix("IMPL") {
            Role::Impl
        } else if has_prefix("TEST") {
            Role::Test
        } else if has_prefix("REVIEW") {
            Role::Review
        } else if has_prefix("FIX") {
            Role::Fix
        } else {
            Role::Specialist
        }
    }

    /// Protected workers are never auto-killed, auto-respawned, or
    /// auto-cleaned. Only the GENERAL tier is protected.
    pub fn is_protected(self) -> bool {
        matches!(self, Role::General)
    }

    /// Read-only tiers get a restricted tool list at spawn and a disallow
    /// list for destructive shell patterns.
    pub fn is_read_only(self) -> bool {
        matches!(
            self,
            Role::General | Role::Colonel | Role::Review | Role::Research
        )
    }

    /// Strategic tiers get the broader operational-authority paragraph in
    /// their context file.
    pub fn is_strategic(self) -> bool {
        matches!(self, Role::General | Role::Colonel | Role::Captain)
    }

    /// Human-readable role title used in context files.
    pub fn title(self) -> &'static str {
        match self {
            Role::General => "General (theater commander)",
            Role::Colonel => "Colonel (operations lead)",
            Role::Captain => "Captain (squad lead)",
            Role::Research => "Research analyst",
            Role::Impl => "Implementation engineer",
            Role::Test => "Test engineer",
            Role::Review => "Code reviewer",
            Role::Fix => "Bug-fix engineer",
            Role::Specialist => "Specialist",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::General => write!(f, "general"),
            Role::Colonel => write!(f, "colonel"),
            Role::Captain => write!(f, "captain"),
            Role::Research => write!(f, "research"),
            Role::Impl => write!(f, "impl"),
            Role::Test => write!(f, "test"),
            Role::Review => write!(f, "review"),
            Role::Fix => write!(f, "fix"),
            Role::Specialist => write!(f, "specialist"),
        }
    }
}

/// Whether a label denotes a protected worker.
pub fn is_protected_label(label: &str) -> bool {
    Role::detect(label).is_protected()
}

#[cfg(test)]
#[path = "role_tests.rs"]
mod tests;
