// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    plain      = { "strategos-abc123", true },
    underscore = { "a_b", true },
    empty      = { "", false },
    space      = { "a b", false },
    colon      = { "a:b", false },
    dot        = { "a.b", false },
    semicolon  = { "a;b", false },
)]
fn session_name_validation(name: &str, ok: bool) {
    assert_eq!(validate_session_name(name).is_ok(), ok, "name: {name:?}");
}

#[test]
fn only_creation_failures_count_against_breaker() {
    assert!(MuxError::CreateFailed("x".into()).counts_against_breaker());
    assert!(MuxError::Timeout(30).counts_against_breaker());
    assert!(!MuxError::NotFound("x".into()).counts_against_breaker());
    assert!(!MuxError::CommandFailed("x".into()).counts_against_breaker());
    assert!(!MuxError::InvalidName("x".into()).counts_against_breaker());
}
