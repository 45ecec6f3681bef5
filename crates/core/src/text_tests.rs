// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    csi_color       = { "\u{1b}[31mred\u{1b}[0m", "red" },
    csi_cursor      = { "a\u{1b}[2Jb", "ab" },
    osc_bel         = { "\u{1b}]0;title\u{07}body", "body" },
    osc_st          = { "\u{1b}]0;title\u{1b}\\body", "body" },
    charset         = { "\u{1b}(Bhello", "hello" },
    bare_escape     = { "\u{1b}Mtext", "text" },
    plain           = { "no escapes here", "no escapes here" },
)]
fn strip_ansi_removes_sequences(input: &str, expected: &str) {
    assert_eq!(strip_ansi(input), expected);
}

#[test]
fn strip_ansi_keeps_newline_tab_return_drops_other_controls() {
    let input = "a\nb\tc\rd\u{07}e\u{00}f";
    assert_eq!(strip_ansi(input), "a\nb\tc\rdef");
}

#[test]
fn escape_prompt_xml_covers_amp_lt_gt() {
    assert_eq!(
        escape_prompt_xml("a < b && c > d"),
        "a &lt; b &amp;&amp; c &gt; d"
    );
}

#[test]
fn escape_json_value_covers_quotes_and_newlines() {
    assert_eq!(
        escape_json_value("say \"hi\"\nback\\slash"),
        "say \\\"hi\\\"\\nback\\\\slash"
    );
}

#[test]
fn sanitize_pane_input_strips_null_and_low_controls() {
    assert_eq!(
        sanitize_pane_input("ok\u{00}\u{01}\u{1b}text\nnext\tcol\r"),
        "oktext\nnext\tcol\r"
    );
}

#[test]
fn sanitize_error_message_redacts_absolute_paths() {
    let msg = "failed to open /home/user/project/secret.txt for worker";
    let out = sanitize_error_message(msg);
    assert!(!out.contains("/home/user"), "got: {out}");
    assert!(out.contains("secret.txt"));
}

#[test]
fn sanitize_error_message_drops_stack_lines() {
    let msg = "boom\n    at Object.fn (/srv/app/x.js:1:2)\nstack backtrace:\ncontext";
    let out = sanitize_error_message(msg);
    assert_eq!(out, "boom\ncontext");
}

#[test]
fn sanitize_error_message_leaves_urls() {
    let msg = "GET https://example.com/a/b failed";
    assert_eq!(sanitize_error_message(msg), msg);
}
