// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn short_hex_ids_are_eight_lowercase_hex_chars() {
    let gen = ShortHexIdGen;
    for _ in 0..20 {
        let id = gen.next();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(WorkerId::is_valid_format(&id));
    }
}

#[test]
fn session_name_is_prefixed_and_mux_safe() {
    let id = WorkerId::new("a1b2c3d4");
    assert_eq!(id.session_name(), "strategos-a1b2c3d4");
    assert!(id
        .session_name()
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-'));
}

#[yare::parameterized(
    empty        = { "", false },
    plain        = { "a1b2c3d4", true },
    with_dash    = { "w-12", true },
    too_long     = { "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", false },
    shell_meta   = { "a;rm -rf", false },
    dot          = { "a.b", false },
)]
fn id_format_validation(input: &str, ok: bool) {
    assert_eq!(WorkerId::is_valid_format(input), ok);
}

#[test]
fn sequential_gen_counts_up() {
    let gen = SequentialIdGen::new("w");
    assert_eq!(gen.next(), "w1");
    assert_eq!(gen.next(), "w2");
}

#[test]
fn ralph_tokens_are_opaque_and_unique() {
    let a = generate_ralph_token();
    let b = generate_ralph_token();
    assert_eq!(a.len(), 32);
    assert_ne!(a, b);
}

#[test]
fn short_truncates() {
    assert_eq!("abcdef".short(4), "abcd");
    assert_eq!("ab".short(4), "ab");
    let id = WorkerId::new("abcdef12");
    assert_eq!(id.short(4), "abcd");
}
