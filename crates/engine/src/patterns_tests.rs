// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn fingerprint_changes_with_content() {
    let a = capture_fingerprint("some output line");
    let b = capture_fingerprint("some output line plus more");
    assert_ne!(a, b);
    assert_eq!(a, capture_fingerprint("some output line"));
}

#[test]
fn fingerprint_catches_in_place_redraw() {
    // Same length, different middle
    let a = capture_fingerprint(&format!("{}{}", "x".repeat(500), "y".repeat(500)));
    let b = capture_fingerprint(&format!("{}{}", "x".repeat(400), "z".repeat(600)));
    assert_ne!(a, b);
}

#[yare::parameterized(
    y_n            = { "Continue? [y/N]" },
    paren_y_n      = { "overwrite file (y/n)?" },
    do_you_want    = { "Do you want to proceed?" },
    would_you_like = { "Would you like to run the tests?" },
    allow_this     = { "Allow this command?" },
    allow_always   = { "1. Allow always" },
    highlighted    = { "❯ 1. Yes, run it\n  2. No" },
    numeric_menu   = { "  ❯ 2. Yes, and don't ask again" },
    press_enter    = { "Press Enter to continue" },
)]
fn confirmation_prompts_match(tail: &str) {
    assert!(detect_confirmation_prompt(tail), "should match: {tail:?}");
}

#[yare::parameterized(
    plain_output = { "compiled 23 files in 1.2s" },
    question     = { "What should the variable be called?" },
    yes_in_prose = { "yes, that worked fine" },
)]
fn ordinary_output_does_not_match(tail: &str) {
    assert!(!detect_confirmation_prompt(tail), "should not match: {tail:?}");
}

#[yare::parameterized(
    plan_mode  = { "⏸ plan mode on (shift+tab to cycle)", "plan mode" },
    exit_plan  = { "● ExitPlanMode(...)", "ExitPlanMode" },
    ask_user   = { "● AskUserQuestion(...)", "AskUserQuestion" },
    enter_plan = { "● EnterPlanMode", "EnterPlanMode" },
)]
fn pause_keywords_detected(tail: &str, expected: &str) {
    assert_eq!(find_pause_keyword(tail), Some(expected));
}

#[test]
fn no_pause_keyword_in_plain_output() {
    assert_eq!(find_pause_keyword("running tests..."), None);
}

#[test]
fn edit_tool_is_a_violation() {
    let v = detect_role_violation("● Edit(foo.js)").unwrap();
    assert_eq!(v, Violation::EditTool("Edit(foo.js)".to_string()));
}

#[test]
fn write_and_notebook_tools_are_violations() {
    assert!(matches!(
        detect_role_violation("⏺ Write(src/main.rs)"),
        Some(Violation::EditTool(_))
    ));
    assert!(matches!(
        detect_role_violation("● NotebookEdit(nb.ipynb)"),
        Some(Violation::EditTool(_))
    ));
}

#[yare::parameterized(
    npm_install = { "● Bash(npm install leftpad)" },
    make        = { "● Bash(make -j8)" },
    cargo_build = { "⏺ Bash(cargo build --release)" },
)]
fn implementation_shell_commands_are_violations(tail: &str) {
    assert!(matches!(
        detect_role_violation(tail),
        Some(Violation::ShellCommand(_))
    ));
}

#[yare::parameterized(
    git_log  = { "● Bash(git log --oneline)" },
    curl     = { "● Bash(curl -s localhost:4131/api/workers)" },
    ls       = { "● Bash(ls -la)" },
    cat      = { "● Bash(cat README.md)" },
    jq       = { "● Bash(jq .status report.json)" },
    plain    = { "some regular output" },
)]
fn commander_safe_commands_are_not_violations(tail: &str) {
    assert_eq!(detect_role_violation(tail), None, "tail: {tail:?}");
}

#[test]
fn tail_hash_is_stable_and_distinguishes() {
    assert_eq!(tail_hash("abc"), tail_hash("abc"));
    assert_ne!(tail_hash("abc"), tail_hash("abd"));
}

#[test]
fn rate_limit_detection() {
    assert!(detect_rate_limit("Claude usage limit reached."));
    assert!(detect_rate_limit("You've reached your usage limit"));
    assert!(!detect_rate_limit("all good"));
}

#[test]
fn compaction_detection() {
    assert!(detect_compaction("Compacting context..."));
    assert!(detect_compaction("Context left until auto-compact: 4%"));
    assert!(!detect_compaction("compact code is nice"));
}

#[yare::parameterized(
    bare_am      = { "usage limit reached. resets at 9am (America/New_York)", 9, 0, Some("America/New_York") },
    with_minutes = { "limit resets at 10:30pm (America/Los_Angeles)", 22, 30, Some("America/Los_Angeles") },
    no_tz        = { "resets at 6pm", 18, 0, None },
    midnight     = { "resets at 12am (UTC)", 0, 0, Some("UTC") },
    noon         = { "resets at 12pm (UTC)", 12, 0, Some("UTC") },
)]
fn reset_hint_parsing(tail: &str, hour: u32, minute: u32, tz: Option<&str>) {
    let hint = parse_reset_hint(tail).unwrap();
    assert_eq!(hint.hour, hour);
    assert_eq!(hint.minute, minute);
    assert_eq!(hint.tz.as_deref(), tz);
}

#[test]
fn reset_hint_absent_when_unparseable() {
    assert!(parse_reset_hint("usage limit reached, try later").is_none());
}

#[test]
fn compute_reset_is_next_occurrence_plus_buffer() {
    // 2026-01-15 12:00:00 UTC == 07:00 America/New_York (EST, no DST)
    let now_ms = Utc
        .with_ymd_and_hms(2026, 1, 15, 12, 0, 0)
        .single()
        .unwrap()
        .timestamp_millis() as u64;
    let hint = ResetHint {
        hour: 9,
        minute: 0,
        tz: Some("America/New_York".to_string()),
    };
    let reset = compute_reset_at_ms(now_ms, &hint);
    // 9am EST = 14:00 UTC, plus the 2-minute buffer → 14:02 UTC
    let expected = Utc
        .with_ymd_and_hms(2026, 1, 15, 14, 2, 0)
        .single()
        .unwrap()
        .timestamp_millis() as u64;
    assert_eq!(reset, expected);
}

#[test]
fn compute_reset_rolls_to_tomorrow_when_past() {
    // 20:00 UTC is already past 9am New York (14:00 UTC)
    let now_ms = Utc
        .with_ymd_and_hms(2026, 1, 15, 20, 0, 0)
        .single()
        .unwrap()
        .timestamp_millis() as u64;
    let hint = ResetHint {
        hour: 9,
        minute: 0,
        tz: Some("America/New_York".to_string()),
    };
    let reset = compute_reset_at_ms(now_ms, &hint);
    let expected = Utc
        .with_ymd_and_hms(2026, 1, 16, 14, 2, 0)
        .single()
        .unwrap()
        .timestamp_millis() as u64;
    assert_eq!(reset, expected);
}

#[test]
fn new_york_uses_dst_offset_in_summer() {
    // 2026-07-15: EDT, 9am local = 13:00 UTC
    let now_ms = Utc
        .with_ymd_and_hms(2026, 7, 15, 8, 0, 0)
        .single()
        .unwrap()
        .timestamp_millis() as u64;
    let hint = ResetHint {
        hour: 9,
        minute: 0,
        tz: Some("America/New_York".to_string()),
    };
    let reset = compute_reset_at_ms(now_ms, &hint);
    let expected = Utc
        .with_ymd_and_hms(2026, 7, 15, 13, 2, 0)
        .single()
        .unwrap()
        .timestamp_millis() as u64;
    assert_eq!(reset, expected);
}

#[test]
fn idle_prompt_detection() {
    assert!(detect_idle_prompt("│ >                     │"));
    assert!(detect_idle_prompt("some output\n> \n"));
    assert!(!detect_idle_prompt("✶ Thinking…\n> "));
    assert!(!detect_idle_prompt("Compiling strategos v0.1.0\n> "));
    assert!(!detect_idle_prompt("(esc to interrupt)\n> "));
    assert!(!detect_idle_prompt("plain output, no prompt"));
}

#[yare::parameterized(
    oom          = { "FATAL ERROR: JavaScript heap out of memory", "heap out of memory" },
    stack        = { "RangeError: Maximum call stack size exceeded", "call stack size" },
    context      = { "Error: context window exceeded", "context window" },
    disconnect   = { "Disconnected from server, retrying", "isconnected" },
    econn        = { "connect ECONNREFUSED 127.0.0.1:443", "ECONNREFUSED" },
    segfault     = { "Segmentation fault (core dumped)", "egmentation" },
    rust_panic   = { "thread 'main' panicked at src/main.rs:10", "panicked at" },
)]
fn crash_patterns_match(tail: &str, substr: &str) {
    let reason = detect_crash(tail).unwrap();
    assert!(
        reason.to_lowercase().contains(&substr.to_lowercase())
            || reason.contains(substr),
        "reason {reason:?} should mention {substr:?}"
    );
}

#[test]
fn healthy_output_has_no_crash() {
    assert!(detect_crash("tests passed, 42 ok").is_none());
}
