//! Tests for add and run subcommands.

use super::{parse, parse_err};
use crate::cli::{CliCommand, ConflictArg, ModeArg, PriorityArg};

#[test]
fn cli_parse_add() {
    match parse(&["fetchq", "add", "https://example.com/file.iso"]) {
        CliCommand::Add {
            url,
            output,
            dir,
            priority,
            group,
            unmetered,
            paused,
            headers,
            tag,
            on_conflict,
            retries,
        } => {
            assert_eq!(url, "https://example.com/file.iso");
            assert!(output.is_none());
            assert!(dir.is_none());
            assert_eq!(priority, PriorityArg::Normal);
            assert_eq!(group, 0);
            assert!(!unmetered);
            assert!(!paused);
            assert!(headers.is_empty());
            assert!(tag.is_none());
            assert_eq!(on_conflict, ConflictArg::Update);
            assert!(retries.is_none());
        }
        _ => panic!("expected Add"),
    }
}

#[test]
fn cli_parse_add_with_options() {
    match parse(&[
        "fetchq",
        "add",
        "fetchlocal://10.0.0.2/movie.mkv",
        "-o",
        "/tmp/movie.mkv",
        "--priority",
        "high",
        "--group",
        "3",
        "--unmetered",
        "--paused",
        "-H",
        "Authorization: Bearer t",
        "--header",
        "X-Trace: 1",
        "--on-conflict",
        "rename",
        "--retries",
        "2",
    ]) {
        CliCommand::Add {
            output,
            priority,
            group,
            unmetered,
            paused,
            headers,
            on_conflict,
            retries,
            ..
        } => {
            assert_eq!(output.as_deref(), Some(std::path::Path::new("/tmp/movie.mkv")));
            assert_eq!(priority, PriorityArg::High);
            assert_eq!(group, 3);
            assert!(unmetered);
            assert!(paused);
            assert_eq!(headers, vec!["Authorization: Bearer t", "X-Trace: 1"]);
            assert_eq!(on_conflict, ConflictArg::Rename);
            assert_eq!(retries, Some(2));
        }
        _ => panic!("expected Add with options"),
    }
}

#[test]
fn cli_parse_add_output_conflicts_with_dir() {
    assert!(parse_err(&[
        "fetchq", "add", "https://e/x", "-o", "/tmp/x", "--dir", "/tmp"
    ]));
}

#[test]
fn cli_parse_run() {
    match parse(&["fetchq", "run"]) {
        CliCommand::Run { jobs, mode } => {
            assert!(jobs.is_none());
            assert!(mode.is_none());
        }
        _ => panic!("expected Run"),
    }
}

#[test]
fn cli_parse_run_jobs_and_mode() {
    match parse(&["fetchq", "run", "--jobs", "4", "--mode", "in-place"]) {
        CliCommand::Run { jobs, mode } => {
            assert_eq!(jobs, Some(4));
            assert_eq!(mode, Some(ModeArg::InPlace));
        }
        _ => panic!("expected Run with --jobs 4"),
    }
}
