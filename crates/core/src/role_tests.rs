// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    general          = { "GENERAL: hold the line", Role::General },
    general_space    = { "GENERAL overwatch", Role::General },
    colonel          = { "COLONEL: plan the assault", Role::Colonel },
    colonel_abbrev   = { "COL: plan", Role::Colonel },
    captain          = { "CAPTAIN: squad 3", Role::Captain },
    captain_abbrev   = { "CAPT: squad 3", Role::Captain },
    research         = { "RESEARCH: find prior art", Role::Research },
    impl_            = { "IMPL: build the codec", Role::Impl },
    test             = { "TEST: cover the parser", Role::Test },
    review           = { "REVIEW: audit pr 42", Role::Review },
    fix              = { "FIX: crash on empty input", Role::Fix },
    lowercase        = { "impl: build the codec", Role::Impl },
    no_prefix        = { "just do the thing", Role::Specialist },
    prefix_no_sep    = { "IMPLEMENTATION work", Role::Specialist },
    embedded         = { "do GENERAL things", Role::Specialist },
)]
fn detect_role(label: &str, expected: Role) {
    assert_eq!(Role::detect(label), expected);
}

#[test]
fn only_general_is_protected() {
    assert!(Role::General.is_protected());
    for role in [
        Role::Colonel,
        Role::Captain,
        Role::Research,
        Role::Impl,
        Role::Test,
        Role::Review,
        Role::Fix,
        Role::Specialist,
    ] {
        assert!(!role.is_protected(), "{role} must not be protected");
    }
}

#[test]
fn read_only_tiers() {
    for role in [Role::General, Role::Colonel, Role::Review, Role::Research] {
        assert!(role.is_read_only(), "{role} should be read-only");
    }
    for role in [Role::Captain, Role::Impl, Role::Test, Role::Fix, Role::Specialist] {
        assert!(!role.is_read_only(), "{role} should not be read-only");
    }
}

#[test]
fn protected_label_helper() {
    assert!(is_protected_label("GENERAL: command"));
    assert!(!is_protected_label("IMPL: code"));
}
