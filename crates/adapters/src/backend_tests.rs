// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    general  = { Role::General },
    colonel  = { Role::Colonel },
    review   = { Role::Review },
    research = { Role::Research },
)]
fn read_only_roles_get_restricted_claude_tools(role: Role) {
    let cmd = BackendCommand::new(Backend::Claude).interactive(role);
    assert!(cmd.contains("--tools"));
    assert!(cmd.contains("--disallowedTools"));
    assert!(!cmd.contains("Edit,Write") || cmd.contains("--disallowedTools"));
}

#[yare::parameterized(
    impl_      = { Role::Impl },
    test       = { Role::Test },
    fix        = { Role::Fix },
    captain    = { Role::Captain },
    specialist = { Role::Specialist },
)]
fn execution_roles_run_unrestricted_claude(role: Role) {
    let cmd = BackendCommand::new(Backend::Claude).interactive(role);
    assert_eq!(cmd, "claude");
}

#[test]
fn gemini_always_runs_yolo() {
    let cmd = BackendCommand::new(Backend::Gemini).interactive(Role::Impl);
    assert_eq!(cmd, "gemini --yolo");
}

#[test]
fn headless_claude_uses_print_and_format() {
    let (program, args) =
        BackendCommand::new(Backend::Claude).headless("do it", OutputFormat::Json, Some("sys"));
    assert_eq!(program, "claude");
    assert_eq!(
        args,
        vec![
            "--print",
            "--output-format",
            "json",
            "--append-system-prompt",
            "sys",
            "do it"
        ]
    );
}

#[yare::parameterized(
    text        = { "text", true },
    json        = { "json", true },
    stream_json = { "stream-json", true },
    unknown     = { "yaml", false },
    empty       = { "", false },
    injection   = { "json; rm -rf /", false },
)]
fn output_format_parse_rejects_unknown(input: &str, ok: bool) {
    assert_eq!(OutputFormat::parse(input).is_some(), ok);
}

#[test]
fn context_file_paths_per_backend() {
    let id = WorkerId::new("abc123");
    let dir = Path::new("/work/demo");

    let claude = BackendCommand::new(Backend::Claude).context_file(dir, &id);
    assert_eq!(
        claude,
        Path::new("/work/demo/.claude/rules/strategos-worker-abc123.md")
    );
    assert!(BackendCommand::new(Backend::Claude)
        .shared_context_file(dir)
        .is_none());

    let gemini = BackendCommand::new(Backend::Gemini).context_file(dir, &id);
    assert_eq!(gemini, Path::new("/work/demo/GEMINI-strategos-worker-abc123.md"));
    assert_eq!(
        BackendCommand::new(Backend::Gemini).shared_context_file(dir),
        Some(PathBuf::from("/work/demo/GEMINI.md"))
    );
}

#[test]
fn auto_accept_window_is_wider_for_gemini() {
    assert_eq!(BackendCommand::new(Backend::Claude).auto_accept_window(), 500);
    assert_eq!(BackendCommand::new(Backend::Gemini).auto_accept_window(), 5000);
}
