//! End-to-end tests for the `check` command.

mod common;
use common::prelude::*;

#[test]
fn test_check_reports_every_missing_parameter() {
    let fixture = TestFixture::new();

    fixture
        .command()
        .arg("check")
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "Missing required parameters: repoName, repoUser, repoPassword",
        ));
}

#[test]
fn test_check_missing_secret_only() {
    let fixture = TestFixture::new();

    fixture
        .command()
        .args(["check", "--repo", "https://git.example.com/org/repo.git", "--user", "bot"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Missing required parameters: repoPassword"))
        .stderr(predicate::str::contains("repoName").not());
}

#[test]
fn test_check_correlation_id_in_error() {
    let fixture = TestFixture::new();

    fixture
        .command()
        .args(["check", "--correlation-id", "req-42"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("[req-42]"));
}

#[test]
fn test_check_reachable_local_remote() {
    if !git_available() {
        eprintln!("git not available, skipping");
        return;
    }
    let fixture = TestFixture::new();
    let remote = BareRemote::create(&fixture.path().join("remote"), &[("README.md", "hi\n")]);

    fixture
        .command()
        .args(["check", "--repo", &remote.url(), "--user", "bot", "--secret", "token"])
        .assert()
        .success()
        .stdout(predicate::str::contains("is reachable"))
        .stdout(predicate::str::contains("Branches: main"));
}

#[test]
fn test_check_unreachable_remote_fails() {
    if !git_available() {
        eprintln!("git not available, skipping");
        return;
    }
    let fixture = TestFixture::new();
    let missing = format!("file://{}", fixture.path().join("nowhere.git").display());

    fixture
        .command()
        .args(["check", "--repo", &missing, "--user", "bot", "--secret", "token"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("reach remote failed"));
}

#[test]
fn test_check_invalid_config_is_fatal() {
    let fixture = TestFixture::new().with_config("source: [not, a, map]\n");

    fixture
        .command()
        .args(["check", "--repo", "x", "--user", "u", "--secret", "s"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration error"));
}
