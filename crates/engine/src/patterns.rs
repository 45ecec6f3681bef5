// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Heuristic detection over captured pane text.
//!
//! The terminal UI is an opaque collaborator; everything in this module is
//! pattern matching against rendered frames, tuned to fail closed (no match
//! → no action). Matching always runs on ANSI-stripped text.

use chrono::{Datelike, TimeZone, Utc, Weekday};
use regex::Regex;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::OnceLock;

fn regexes(cell: &'static OnceLock<Vec<Regex>>, patterns: &[&str]) -> &'static [Regex] {
    cell.get_or_init(|| {
        patterns
            .iter()
            .filter_map(|p| Regex::new(p).ok())
            .collect()
    })
}

/// Cheap change fingerprint over a capture: length, the last 200 chars, and
/// 50 chars from the middle. Catches both appends and in-place redraws
/// without hashing megabytes every tick.
pub fn capture_fingerprint(buf: &str) -> String {
    let chars: Vec<char> = buf.chars().collect();
    let tail: String = chars[chars.len().saturating_sub(200)..].iter().collect();
    let mid_start = chars.len() / 2;
    let middle: String = chars.iter().skip(mid_start).take(50).collect();
    format!("{}:{}:{}", chars.len(), tail, middle)
}

/// Stable hash of a pane tail, for deduplicating sentinel firings.
pub fn tail_hash(tail: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    tail.hash(&mut hasher);
    hasher.finish()
}

// ---------------------------------------------------------------------------
// Auto-accept
// ---------------------------------------------------------------------------

static CONFIRM_RES: OnceLock<Vec<Regex>> = OnceLock::new();

/// Does the tail show a confirmation prompt safe to accept with Enter?
pub fn detect_confirmation_prompt(tail: &str) -> bool {
    let res = regexes(
        &CONFIRM_RES,
        &[
            r"(?i)\[y/n\]",
            r"(?i)\(y/n\)",
            r"(?i)\byes/no\b",
            r"(?i)do you want to",
            r"(?i)would you like to",
            r"(?i)allow this( command)?\??",
            r"(?i)allow (once|always)",
            r"❯\s*1?\.?\s*yes",
            r"(?i)press enter to (continue|confirm)",
            r"(?i)proceed\?",
            r"(?m)^\s*❯\s+\d+\.",
        ],
    );
    res.iter().any(|re| re.is_match(tail))
}

/// Keywords whose presence pauses auto-accept: the agent is in a mode where
/// pressing Enter would answer a real question.
pub const PAUSE_KEYWORDS: &[&str] = &[
    "plan mode",
    "ExitPlanMode",
    "AskUserQuestion",
    "EnterPlanMode",
];

pub fn find_pause_keyword(tail: &str) -> Option<&'static str> {
    PAUSE_KEYWORDS.iter().copied().find(|k| tail.contains(*k))
}

// ---------------------------------------------------------------------------
// Role-violation sentinel (GENERAL tier only)
// ---------------------------------------------------------------------------

/// Commands a commander may legitimately run.
const COMMANDER_SAFE: &[&str] = &[
    "git", "curl", "ls", "cat", "jq", "grep", "rg", "find", "head", "tail", "wc", "echo", "pwd",
];

static EDIT_TOOL_RES: OnceLock<Vec<Regex>> = OnceLock::new();
static SHELL_TOOL_RE: OnceLock<Vec<Regex>> = OnceLock::new();

/// What kind of role violation the tail shows, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// Editor / writer / notebook tool invocation.
    EditTool(String),
    /// Implementation shell command outside the commander allowlist.
    ShellCommand(String),
}

pub fn detect_role_violation(tail: &str) -> Option<Violation> {
    let edit_res = regexes(
        &EDIT_TOOL_RES,
        &[
            r"[●⏺]\s*(Edit|Write|MultiEdit|NotebookEdit|Update|Create)\(([^)]*)\)",
        ],
    );
    for re in edit_res {
        if let Some(caps) = re.captures(tail) {
            let tool = caps.get(1).map(|m| m.as_str()).unwrap_or("Edit");
            let arg = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            return Some(Violation::EditTool(format!("{}({})", tool, arg)));
        }
    }

    let shell_res = regexes(&SHELL_TOOL_RE, &[r"[●⏺]\s*Bash\(([^)]*)\)"]);
    for re in shell_res {
        if let Some(caps) = re.captures(tail) {
            let command = caps.get(1).map(|m| m.as_str()).unwrap_or("").trim();
            let first_word = command.split_whitespace().next().unwrap_or("");
            if !COMMANDER_SAFE.contains(&first_word) {
                return Some(Violation::ShellCommand(command.to_string()));
            }
        }
    }

    None
}

// ---------------------------------------------------------------------------
// Rate limit and compaction
// ---------------------------------------------------------------------------

static RATE_LIMIT_RES: OnceLock<Vec<Regex>> = OnceLock::new();
static COMPACTION_RES: OnceLock<Vec<Regex>> = OnceLock::new();
static RESET_TIME_RE: OnceLock<Vec<Regex>> = OnceLock::new();

pub fn detect_rate_limit(tail: &str) -> bool {
    let res = regexes(
        &RATE_LIMIT_RES,
        &[
            r"(?i)usage limit reached",
            r"(?i)you've reached your usage limit",
            r"(?i)rate limit(ed)? .*try again",
        ],
    );
    res.iter().any(|re| re.is_match(tail))
}

pub fn detect_compaction(tail: &str) -> bool {
    let res = regexes(
        &COMPACTION_RES,
        &[
            r"(?i)compacting (context|conversation)",
            r"(?i)context left until auto-compact: *\d+%",
        ],
    );
    res.iter().any(|re| re.is_match(tail))
}

/// A parsed reset time hint from a rate-limit banner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetHint {
    pub hour: u32,
    pub minute: u32,
    pub tz: Option<String>,
}

/// Pull the reset time out of text like
/// `Your usage limit will reset at 9am (America/New_York)`.
pub fn parse_reset_hint(tail: &str) -> Option<ResetHint> {
    let res = regexes(
        &RESET_TIME_RE,
        &[r"(?i)reset[s]?\s+at\s+(\d{1,2})(?::(\d{2}))?\s*(am|pm)?\s*(?:\(([A-Za-z_]+/[A-Za-z_]+|UTC)\))?"],
    );
    let caps = res.first()?.captures(tail)?;
    let mut hour: u32 = caps.get(1)?.as_str().parse().ok()?;
    let minute: u32 = caps
        .get(2)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0);
    match caps.get(3).map(|m| m.as_str().to_lowercase()) {
        Some(ref m) if m == "pm" && hour < 12 => hour += 12,
        Some(ref m) if m == "am" && hour == 12 => hour = 0,
        _ => {}
    }
    if hour > 23 || minute > 59 {
        return None;
    }
    Some(ResetHint {
        hour,
        minute,
        tz: caps.get(4).map(|m| m.as_str().to_string()),
    })
}

/// Buffer added past the announced reset so we never fire a minute early.
const RESET_BUFFER_MS: u64 = 2 * 60 * 1000;

/// Compute the next occurrence of the hinted wall-clock time in its zone,
/// plus a two-minute buffer, as epoch milliseconds.
///
/// Timezones are mapped through a fixed offset table covering the zones the
/// backends actually print. The whole rate-limit path is heuristic; an
/// unknown zone falls back to UTC.
pub fn compute_reset_at_ms(now_ms: u64, hint: &ResetHint) -> u64 {
    let now = Utc
        .timestamp_millis_opt(now_ms as i64)
        .single()
        .unwrap_or_else(Utc::now);

    let offset_minutes = hint
        .tz
        .as_deref()
        .map(|tz| zone_offset_minutes(tz, now.date_naive()))
        .unwrap_or(0);

    let local_now = now + chrono::Duration::minutes(offset_minutes);
    let mut local_reset = local_now
        .date_naive()
        .and_hms_opt(hint.hour, hint.minute, 0)
        .unwrap_or_else(|| local_now.naive_utc());
    if local_reset <= local_now.naive_utc() {
        local_reset += chrono::Duration::days(1);
    }
    let reset_utc = local_reset - chrono::Duration::minutes(offset_minutes);
    let reset_ms = Utc.from_utc_datetime(&reset_utc).timestamp_millis().max(0) as u64;
    reset_ms + RESET_BUFFER_MS
}

/// Offset from UTC in minutes for the zones the backends print, DST-aware
/// for the US and UK rules.
fn zone_offset_minutes(tz: &str, date: chrono::NaiveDate) -> i64 {
    let us = us_dst(date);
    let eu = eu_dst(date);
    match tz {
        "UTC" => 0,
        "America/New_York" => {
            if us {
                -240
            } else {
                -300
            }
        }
        "America/Chicago" => {
            if us {
                -300
            } else {
                -360
            }
        }
        "America/Denver" => {
            if us {
                -360
            } else {
                -420
            }
        }
        "America/Los_Angeles" => {
            if us {
                -420
            } else {
                -480
            }
        }
        "Europe/London" => {
            if eu {
                60
            } else {
                0
            }
        }
        _ => 0,
    }
}

/// US DST: second Sunday of March through first Sunday of November.
fn us_dst(date: chrono::NaiveDate) -> bool {
    let year = date.year();
    let second_sunday_march = nth_weekday(year, 3, Weekday::Sun, 2);
    let first_sunday_november = nth_weekday(year, 11, Weekday::Sun, 1);
    date >= second_sunday_march && date < first_sunday_november
}

/// EU/UK DST: last Sunday of March through last Sunday of October.
fn eu_dst(date: chrono::NaiveDate) -> bool {
    let year = date.year();
    let last_sunday_march = last_weekday(year, 3, Weekday::Sun);
    let last_sunday_october = last_weekday(year, 10, Weekday::Sun);
    date >= last_sunday_march && date < last_sunday_october
}

fn nth_weekday(year: i32, month: u32, weekday: Weekday, n: u32) -> chrono::NaiveDate {
    let mut count = 0;
    for day in 1..=31 {
        if let Some(date) = chrono::NaiveDate::from_ymd_opt(year, month, day) {
            if date.weekday() == weekday {
                count += 1;
                if count == n {
                    return date;
                }
            }
        }
    }
    chrono::NaiveDate::from_ymd_opt(year, month, 1).unwrap_or_default()
}

fn last_weekday(year: i32, month: u32, weekday: Weekday) -> chrono::NaiveDate {
    let mut last = None;
    for day in 1..=31 {
        if let Some(date) = chrono::NaiveDate::from_ymd_opt(year, month, day) {
            if date.weekday() == weekday {
                last = Some(date);
            }
        }
    }
    last.unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Idle / active indicators
// ---------------------------------------------------------------------------

static IDLE_RES: OnceLock<Vec<Regex>> = OnceLock::new();

/// Words whose presence means the agent is mid-work and must not be nudged.
const ACTIVE_INDICATORS: &[&str] = &[
    "Thinking",
    "Building",
    "Compiling",
    "Running",
    "Searching",
    "Writing",
    "esc to interrupt",
];

/// Whether the tail shows an empty input prompt with nothing in flight.
pub fn detect_idle_prompt(tail: &str) -> bool {
    if ACTIVE_INDICATORS.iter().any(|w| tail.contains(w)) {
        return false;
    }
    let res = regexes(
        &IDLE_RES,
        &[r"(?m)^\s*>\s*$", r"(?m)│\s*>\s{2,}│", r"(?m)^\s*❯\s*$"],
    );
    res.iter().any(|re| re.is_match(tail))
}

pub fn has_active_indicator(tail: &str) -> bool {
    ACTIVE_INDICATORS.iter().any(|w| tail.contains(w))
}

// ---------------------------------------------------------------------------
// Crash patterns
// ---------------------------------------------------------------------------

static CRASH_RES: OnceLock<Vec<Regex>> = OnceLock::new();

/// Match crash signatures in the pane tail; returns a short reason.
pub fn detect_crash(tail: &str) -> Option<String> {
    let res = regexes(
        &CRASH_RES,
        &[
            r"(?i)out of memory",
            r"(?i)javascript heap out of memory",
            r"(?i)stack overflow",
            r"(?i)maximum call stack size exceeded",
            r"(?i)context window exceeded",
            r"(?i)prompt is too long",
            r"(?i)disconnected from (the )?server",
            r"(?i)connection (lost|refused|reset)",
            r"ECONNREFUSED|ECONNRESET|ETIMEDOUT",
            r"(?i)fatal error",
            r"(?i)segmentation fault",
            r"panicked at",
        ],
    );
    for re in res {
        if let Some(m) = re.find(tail) {
            return Some(m.as_str().to_string());
        }
    }
    None
}

#[cfg(test)]
#[path = "patterns_tests.rs"]
mod tests;
