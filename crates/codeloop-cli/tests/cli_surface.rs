//! CLI surface tests: usage, help, stdin task, credential errors.

use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

fn temp_home() -> TempDir {
    TempDir::new().expect("create temp codeloop home")
}

/// Missing TASK argument prints usage and exits non-zero.
#[test]
fn test_missing_task_prints_usage() {
    cargo_bin_cmd!("codeloop")
        .env("CODELOOP_HOME", temp_home().path())
        .assert()
        .failure()
        .stderr(predicates::str::contains("Usage"));
}

#[test]
fn test_help_shows_about() {
    cargo_bin_cmd!("codeloop")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicates::str::contains("Autonomous coding loop"));
}

/// `-` reads the task from stdin; an empty stdin is an error.
#[test]
fn test_empty_stdin_task_fails() {
    cargo_bin_cmd!("codeloop")
        .env("CODELOOP_HOME", temp_home().path())
        .env("OPENROUTER_API_KEY", "test-api-key")
        .arg("-")
        .write_stdin("")
        .assert()
        .failure()
        .stderr(predicates::str::contains("empty"));
}

/// Without any API key the run fails before contacting a backend.
#[test]
fn test_missing_api_key_is_fatal() {
    cargo_bin_cmd!("codeloop")
        .env("CODELOOP_HOME", temp_home().path())
        .env_remove("OPENROUTER_API_KEY")
        .arg("Do something")
        .assert()
        .failure()
        .stderr(predicates::str::contains("No API key available"));
}

/// A blank (whitespace-only) task argument is rejected.
#[test]
fn test_blank_task_argument_fails() {
    cargo_bin_cmd!("codeloop")
        .env("CODELOOP_HOME", temp_home().path())
        .env("OPENROUTER_API_KEY", "test-api-key")
        .arg("   ")
        .assert()
        .failure()
        .stderr(predicates::str::contains("Task description is empty"));
}
