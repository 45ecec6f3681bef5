// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Text utilities shared by context generation and the control plane.
//!
//! Pane captures arrive full of terminal escape sequences; everything that
//! matches against captured text or embeds user text into generated files
//! goes through these helpers first.

/// Strip terminal escape sequences and control characters from captured text.
///
/// Removes CSI (`ESC [ ... final`), OSC (`ESC ] ... BEL|ST`), character-set
/// selection (`ESC ( x` / `ESC ) x`), string terminators, and bare
/// two-character escapes. All remaining control characters are dropped except
/// newline, tab, and carriage return.
pub fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\u{1b}' {
            if !c.is_control() || c == '\n' || c == '\t' || c == '\r' {
                out.push(c);
            }
            continue;
        }

        match chars.peek() {
            // CSI: parameters and intermediates, then a final byte in @..=~
            Some('[') => {
                chars.next();
                for c in chars.by_ref() {
                    if ('\u{40}'..='\u{7e}').contains(&c) {
                        break;
                    }
                }
            }
            // OSC: terminated by BEL or ESC \
            Some(']') => {
                chars.next();
                let mut prev_esc = false;
                for c in chars.by_ref() {
                    if c == '\u{07}' || (prev_esc && c == '\\') {
                        break;
                    }
                    prev_esc = c == '\u{1b}';
                }
            }
            // Character set selection consumes one designator
            Some('(') | Some(')') => {
                chars.next();
                chars.next();
            }
            // Any other two-character escape
            Some(_) => {
                chars.next();
            }
            None => {}
        }
    }

    out
}

/// Escape text for embedding inside XML-ish prompt sections.
pub fn escape_prompt_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

/// Escape text for embedding inside a double-quoted JSON string value,
/// e.g. the curl examples written into context files.
pub fn escape_json_value(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out
}

/// Sanitize text before it is typed into a pane.
///
/// Null bytes and low control characters would be interpreted by the terminal;
/// only CR, LF, and tab survive.
pub fn sanitize_pane_input(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\r' | '\t'))
        .collect()
}

/// Sanitize an error message before it crosses the API boundary.
///
/// Absolute filesystem paths are reduced to their final component and
/// stack-trace lines are dropped entirely.
pub fn sanitize_error_message(s: &str) -> String {
    let mut out_lines = Vec::new();
    for line in s.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("at ") || trimmed.starts_with("stack backtrace") {
            continue;
        }
        out_lines.push(redact_paths(line));
    }
    out_lines.join("\n")
}

fn redact_paths(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut rest = line;
    while let Some(start) = rest.find('/') {
        // Only treat as a path when it begins a token (start of line or after
        // whitespace/quote/punct), so URLs like http://x are left alone.
        let before = &rest[..start];
        let boundary = before
            .chars()
            .next_back()
            .map(|c| c.is_whitespace() || matches!(c, '"' | '\'' | '(' | '=' | ':' | ','))
            .unwrap_or(true);
        let is_url = before.ends_with(':') && before.len() >= 2 && {
            let scheme_end = before.len() - 1;
            before[..scheme_end].ends_with("http") || before[..scheme_end].ends_with("https")
        };
        out.push_str(before);
        rest = &rest[start..];

        let end = rest
            .find(|c: char| c.is_whitespace() || matches!(c, '"' | '\'' | ')' | ',' | ';'))
            .unwrap_or(rest.len());
        let token = &rest[..end];
        if boundary && !is_url && token.len() > 1 && token.matches('/').count() >= 2 {
            let basename = token.rsplit('/').next().unwrap_or_default();
            out.push_str(basename);
        } else {
            out.push_str(token);
        }
        rest = &rest[end..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
#[path = "text_tests.rs"]
mod tests;
