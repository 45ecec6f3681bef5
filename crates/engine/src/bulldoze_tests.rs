// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

const SAMPLE: &str = "\
# Bulldoze state

Compaction Count: 2

## Current

- wire the parser to the engine

## Backlog

- add benchmarks
- document the API

## Completed

- scaffold the crate

## Learnings

- the fixture files are stale
";

#[test]
fn parse_reads_all_sections() {
    let state = BulldozeState::parse(SAMPLE);
    assert_eq!(state.current, vec!["wire the parser to the engine"]);
    assert_eq!(state.backlog, vec!["add benchmarks", "document the API"]);
    assert_eq!(state.completed, vec!["scaffold the crate"]);
    assert_eq!(state.learnings, vec!["the fixture files are stale"]);
    assert_eq!(state.compaction_count, 2);
}

#[test]
fn render_parse_round_trip() {
    let state = BulldozeState::parse(SAMPLE);
    let rendered = state.render();
    assert_eq!(BulldozeState::parse(&rendered), state);
}

#[test]
fn load_missing_file_is_default() {
    let state = BulldozeState::load(Path::new("/nonexistent/state.md"));
    assert_eq!(state, BulldozeState::default());
}

#[test]
fn save_and_load_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = BulldozeState::path_for(dir.path(), &WorkerId::new("w1"));
    assert!(path.ends_with("tmp/bulldoze-state-w1.md"));

    let mut state = BulldozeState::default();
    state.current.push("item one".to_string());
    state.compaction_count = 1;
    state.save(&path).unwrap();

    let loaded = BulldozeState::load(&path);
    assert_eq!(loaded, state);
}

#[test]
fn clear_removes_and_tolerates_missing() {
    let dir = tempfile::tempdir().unwrap();
    let path = BulldozeState::path_for(dir.path(), &WorkerId::new("w1"));
    BulldozeState::default().save(&path).unwrap();
    BulldozeState::clear(&path);
    assert!(!path.exists());
    BulldozeState::clear(&path);
}

#[yare::parameterized(
    exhausted   = { "## Current\n\nEXHAUSTED\n", Some("EXHAUSTED") },
    blocked     = { "- BLOCKED\n", Some("BLOCKED") },
    needs_human = { "stuff\nNEEDS_HUMAN\nmore", Some("NEEDS_HUMAN") },
    embedded    = { "- the api is BLOCKED upstream\n", None },
    clean       = { SAMPLE, None },
)]
fn stop_marker_scan(text: &str, expected: Option<&str>) {
    assert_eq!(find_stop_marker(text).as_deref(), expected);
}

#[test]
fn every_fifth_cycle_is_an_audit() {
    let path = Path::new("/w/tmp/bulldoze-state-w1.md");
    assert!(continuation_prompt(5, path).starts_with("AUDIT"));
    assert!(continuation_prompt(10, path).starts_with("AUDIT"));
    assert!(!continuation_prompt(1, path).starts_with("AUDIT"));
    assert!(!continuation_prompt(4, path).starts_with("AUDIT"));
    assert!(!continuation_prompt(6, path).starts_with("AUDIT"));
}

#[test]
fn prompts_reference_the_state_file() {
    let path = Path::new("/w/tmp/bulldoze-state-w1.md");
    assert!(continuation_prompt(1, path).contains("bulldoze-state-w1.md"));
    assert!(continuation_prompt(5, path).contains("bulldoze-state-w1.md"));
}

#[test]
fn stop_reason_strings_are_stable() {
    assert_eq!(StopReason::HumanInput.as_str(), "human_input");
    assert_eq!(StopReason::WallClock.as_str(), "wall_clock");
    assert_eq!(StopReason::Marker("EXHAUSTED".to_string()).as_str(), "EXHAUSTED");
}
