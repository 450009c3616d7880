//! End-to-end CLI tests for the sitecrawler binary.

use std::io::Write;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::NamedTempFile;

/// Test that the binary exits cleanly when there is nothing to crawl.
#[test]
fn test_binary_without_seeds_returns_zero() {
    let mut cmd = Command::cargo_bin("sitecrawler").unwrap();
    cmd.write_stdin("").assert().success().stdout(predicate::str::is_empty());
}

/// Test that --help displays usage information and exits with code 0.
#[test]
fn test_binary_help_displays_usage() {
    let mut cmd = Command::cargo_bin("sitecrawler").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("same-site"))
        .stdout(predicate::str::contains("--parallel"));
}

/// Test that --version displays version and exits with code 0.
#[test]
fn test_binary_version_displays_version() {
    let mut cmd = Command::cargo_bin("sitecrawler").unwrap();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("sitecrawler"));
}

/// Test that invalid flags cause non-zero exit.
#[test]
fn test_binary_invalid_flag_returns_error() {
    let mut cmd = Command::cargo_bin("sitecrawler").unwrap();
    cmd.arg("--invalid-flag")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_binary_rejects_zero_parallelism() {
    let mut cmd = Command::cargo_bin("sitecrawler").unwrap();
    cmd.args(["-p", "0", "https://example.com/"])
        .assert()
        .failure();
}

#[test]
fn test_binary_rejects_malformed_rate() {
    let mut cmd = Command::cargo_bin("sitecrawler").unwrap();
    cmd.args(["--rate", "example.com=fast", "https://example.com/"])
        .assert()
        .failure();
}

/// Test that -q flag works (quiet mode).
#[test]
fn test_binary_quiet_flag_accepted() {
    let mut cmd = Command::cargo_bin("sitecrawler").unwrap();
    cmd.arg("-q").write_stdin("").assert().success();
}

/// Test that a run whose seeds are all rejected fails with a clear message.
#[test]
fn test_binary_unsupported_seed_fails() {
    let mut cmd = Command::cargo_bin("sitecrawler").unwrap();
    cmd.arg("ftp://example.com/file")
        .assert()
        .failure()
        .stderr(predicate::str::contains("no seed could be admitted"));
}

/// Test that comment and blank lines on stdin are not treated as seeds.
#[test]
fn test_binary_ignores_comment_lines_on_stdin() {
    let mut cmd = Command::cargo_bin("sitecrawler").unwrap();
    cmd.write_stdin("# seeds\n\n   \n")
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[test]
fn test_binary_missing_config_file_fails() {
    let mut cmd = Command::cargo_bin("sitecrawler").unwrap();
    cmd.args(["--config", "/nonexistent/sitecrawler.json", "https://example.com/"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("sitecrawler.json"));
}

#[test]
fn test_binary_rejects_unknown_config_keys() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, r#"{{"paralel": 4}}"#).unwrap();

    let mut cmd = Command::cargo_bin("sitecrawler").unwrap();
    cmd.arg("--config")
        .arg(file.path())
        .arg("https://example.com/")
        .assert()
        .failure();
}
