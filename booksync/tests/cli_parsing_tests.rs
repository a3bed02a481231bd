//! CLI argument parsing tests for booksync
//!
//! These verify that flags, aliases and value formats are accepted by the parser. `--help` stops
//! the run before any directory is validated.

use assert_cmd::Command;

fn parses(args: &[&str]) {
    Command::cargo_bin("booksync")
        .unwrap()
        .args(args)
        .arg("--help")
        .assert()
        .success();
}

#[test]
fn test_help_runs() {
    parses(&[]);
}

#[test]
fn test_version_runs() {
    Command::cargo_bin("booksync")
        .unwrap()
        .arg("--version")
        .assert()
        .success();
}

#[test]
fn test_repeated_sources_and_extensions() {
    parses(&[
        "--source",
        "/a",
        "--source",
        "/b",
        "--extension",
        "epub",
        "--extension",
        ".pdf",
    ]);
}

#[test]
fn test_boolean_flags() {
    parses(&["--dry-run", "--progress", "--summary", "-q"]);
}

#[test]
fn test_verbose_count() {
    parses(&["-vvv"]);
}

#[test]
fn test_numeric_options() {
    parses(&[
        "--max-open-files",
        "64",
        "--ops-throttle",
        "100",
        "--max-copy-tasks",
        "8",
        "--max-workers",
        "2",
        "--max-blocking-threads",
        "16",
    ]);
}

#[test]
fn test_non_numeric_value_rejected() {
    Command::cargo_bin("booksync")
        .unwrap()
        .args(["--max-copy-tasks", "many"])
        .assert()
        .failure();
}

#[test]
fn test_unknown_flag_rejected() {
    Command::cargo_bin("booksync")
        .unwrap()
        .arg("--overwrite")
        .assert()
        .failure();
}
