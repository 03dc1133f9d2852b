//! Thin wrappers around the system `git` binary.
//!
//! Every function here spawns one `git` process. Authentication is injected
//! per invocation through the environment (an `http.extraHeader` passed as
//! `GIT_CONFIG_*` variables for token credentials, or `GIT_SSH_COMMAND` for
//! key credentials), so secrets never appear in the process arguments,
//! remote URLs or `.git/config`. Interactive prompts are disabled, and any
//! call can be bounded by a deadline after which the process is killed.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::auth::AuthCredential;
use crate::error::{Error, Result};
use crate::path::redact_url;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Maximum number of paths passed to a single `git add`.
const STAGE_BATCH: usize = 200;

/// Identity used for commits created by the publish pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GitAuthor {
    #[serde(default, alias = "author_name")]
    pub author_name: String,
    #[serde(default, alias = "author_email")]
    pub author_email: String,
}

impl GitAuthor {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            author_name: name.into(),
            author_email: email.into(),
        }
    }
}

struct GitOutput {
    stdout: String,
    stderr: String,
    success: bool,
    code: Option<i32>,
}

impl GitOutput {
    /// Stderr, or stdout when git reported the failure there.
    fn failure_message(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim().to_string()
        } else {
            stderr.to_string()
        }
    }
}

fn base_command(cwd: Option<&Path>, auth: Option<&AuthCredential>) -> Command {
    let mut cmd = Command::new("git");
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    cmd.env("GIT_TERMINAL_PROMPT", "0");
    if let Some(auth) = auth {
        if let Some(header) = auth.basic_auth_header() {
            cmd.env("GIT_CONFIG_COUNT", "1")
                .env("GIT_CONFIG_KEY_0", "http.extraHeader")
                .env("GIT_CONFIG_VALUE_0", header);
        }
        if let Some(ssh) = auth.ssh_command() {
            cmd.env("GIT_SSH_COMMAND", ssh);
        }
    }
    cmd
}

fn spawn_reader<R: Read + Send + 'static>(mut reader: R) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = reader.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn join_reader(handle: Option<JoinHandle<String>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}

/// Run a prepared git command, enforcing the optional deadline.
///
/// `command` and `url` only label errors; the full argument list is never
/// echoed.
fn run(mut cmd: Command, timeout: Option<Duration>, command: &str, url: &str) -> Result<GitOutput> {
    let url = redact_url(url);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = cmd.spawn().map_err(|e| Error::GitCommand {
        command: command.to_string(),
        url: url.clone(),
        stderr: format!("failed to run git: {}", e),
    })?;

    let stdout = child.stdout.take().map(spawn_reader);
    let stderr = child.stderr.take().map(spawn_reader);
    let started = Instant::now();

    let status = match timeout {
        None => child.wait()?,
        Some(limit) => loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if started.elapsed() >= limit {
                let _ = child.kill();
                let _ = child.wait();
                // Reader threads are left detached: helper processes spawned
                // by git may still hold the pipes open.
                return Err(Error::Timeout {
                    command: command.to_string(),
                    url: url.clone(),
                    elapsed: started.elapsed(),
                });
            }
            thread::sleep(POLL_INTERVAL);
        },
    };

    Ok(GitOutput {
        stdout: join_reader(stdout),
        stderr: join_reader(stderr),
        success: status.success(),
        code: status.code(),
    })
}

fn run_checked(
    cmd: Command,
    timeout: Option<Duration>,
    command: &str,
    url: &str,
) -> Result<GitOutput> {
    let output = run(cmd, timeout, command, url)?;
    if !output.success {
        return Err(Error::GitCommand {
            command: command.to_string(),
            url: redact_url(url),
            stderr: output.failure_message(),
        });
    }
    Ok(output)
}

fn is_auth_failure(stderr: &str) -> bool {
    stderr.contains("Authentication failed")
        || stderr.contains("Permission denied")
        || stderr.contains("Could not read from remote repository")
        || stderr.contains("could not read Username")
}

/// Shallow, single-branch clone of `branch` into `target_dir`.
///
/// An existing `target_dir` is removed first, because git refuses to clone
/// into a non-empty directory.
pub fn clone_shallow(
    url: &str,
    branch: &str,
    target_dir: &Path,
    auth: Option<&AuthCredential>,
    timeout: Option<Duration>,
) -> Result<()> {
    if target_dir.exists() {
        fs::remove_dir_all(target_dir)?;
    }
    if let Some(parent) = target_dir.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut cmd = base_command(None, auth);
    cmd.args(["clone", "--depth=1", "--single-branch", "--branch", branch, "--", url])
        .arg(target_dir);

    let output = run(cmd, timeout, "clone", url)?;
    if !output.success {
        let stderr = output.failure_message();
        let hint = if is_auth_failure(&stderr) {
            Some(
                "Check the username/token or SSH key configured for this repository".to_string(),
            )
        } else if stderr.contains("not found in upstream") {
            Some(format!("Branch '{}' does not exist on the remote", branch))
        } else {
            None
        };
        return Err(Error::GitClone {
            url: redact_url(url),
            branch: branch.to_string(),
            message: stderr,
            hint,
        });
    }

    Ok(())
}

/// Open an existing working copy in place, without network access.
pub fn open(path: &Path) -> Result<()> {
    let location = path.display().to_string();
    if !path.join(".git").exists() {
        return Err(Error::GitCommand {
            command: "open".to_string(),
            url: location,
            stderr: "not a git working copy (no .git directory)".to_string(),
        });
    }
    let mut cmd = base_command(Some(path), None);
    cmd.args(["rev-parse", "--is-inside-work-tree"]);
    run_checked(cmd, None, "rev-parse --is-inside-work-tree", &location)?;
    Ok(())
}

/// The commit id currently checked out in `path`.
pub fn head_commit(path: &Path) -> Result<String> {
    let location = path.display().to_string();
    let mut cmd = base_command(Some(path), None);
    cmd.args(["rev-parse", "HEAD"]);
    let output = run_checked(cmd, None, "rev-parse HEAD", &location)?;

    let sha = output.stdout.trim().to_string();
    if sha.is_empty() {
        return Err(Error::GitCommand {
            command: "rev-parse HEAD".to_string(),
            url: location,
            stderr: "git rev-parse HEAD returned empty output".to_string(),
        });
    }
    Ok(sha)
}

/// Whether the working tree and index have no changes.
pub fn is_clean(path: &Path) -> Result<bool> {
    let location = path.display().to_string();
    let mut cmd = base_command(Some(path), None);
    cmd.args(["status", "--porcelain"]);
    let output = run_checked(cmd, None, "status", &location)?;
    Ok(output.stdout.trim().is_empty())
}

/// Whether the index differs from `HEAD`.
pub fn has_staged_changes(path: &Path) -> Result<bool> {
    let location = path.display().to_string();
    let mut cmd = base_command(Some(path), None);
    cmd.args(["diff", "--cached", "--quiet"]);
    let output = run(cmd, None, "diff --cached", &location)?;
    match output.code {
        Some(0) => Ok(false),
        Some(1) => Ok(true),
        _ => Err(Error::GitCommand {
            command: "diff --cached".to_string(),
            url: location,
            stderr: output.failure_message(),
        }),
    }
}

/// Fast-forward the working copy from `origin`.
///
/// "Already up to date" is a successful pull.
pub fn pull(
    path: &Path,
    url: &str,
    branch: &str,
    auth: Option<&AuthCredential>,
    timeout: Option<Duration>,
) -> Result<()> {
    let mut cmd = base_command(Some(path), auth);
    cmd.args(["pull", "--ff-only", "origin", branch]);
    run_checked(cmd, timeout, "pull", url)?;
    Ok(())
}

/// Add the given paths (relative to `path`) to the index.
///
/// Paths are taken literally and added even when a `.gitignore` in the
/// working copy matches them; the caller decides what gets staged.
pub fn stage(path: &Path, files: &[PathBuf]) -> Result<()> {
    let location = path.display().to_string();
    for batch in files.chunks(STAGE_BATCH) {
        let mut cmd = base_command(Some(path), None);
        cmd.env("GIT_LITERAL_PATHSPECS", "1")
            .args(["add", "--force", "--"])
            .args(batch);
        run_checked(cmd, None, "add", &location)?;
    }
    Ok(())
}

/// Commit the index with a fixed author identity; returns the new commit id.
pub fn commit(path: &Path, message: &str, author: &GitAuthor) -> Result<String> {
    let location = path.display().to_string();
    let mut cmd = base_command(Some(path), None);
    cmd.arg("-c")
        .arg(format!("user.name={}", author.author_name))
        .arg("-c")
        .arg(format!("user.email={}", author.author_email))
        .args(["commit", "--no-verify", "-m", message]);
    run_checked(cmd, None, "commit", &location)?;
    head_commit(path)
}

/// Force-push `refs/heads/<branch>` to `origin`.
pub fn push_force(
    path: &Path,
    url: &str,
    branch: &str,
    auth: Option<&AuthCredential>,
    timeout: Option<Duration>,
) -> Result<()> {
    let refspec = format!("refs/heads/{0}:refs/heads/{0}", branch);
    let mut cmd = base_command(Some(path), auth);
    cmd.args(["push", "--force", "origin", &refspec]);
    run_checked(cmd, timeout, "push", url)?;
    Ok(())
}

/// List the branch names advertised by a remote.
pub fn ls_remote_heads(
    url: &str,
    auth: Option<&AuthCredential>,
    timeout: Option<Duration>,
) -> Result<Vec<String>> {
    let mut cmd = base_command(None, auth);
    cmd.args(["ls-remote", "--heads", "--", url]);
    let output = run_checked(cmd, timeout, "ls-remote --heads", url)?;

    // Git ls-remote output format: <hash>\t<ref>
    let heads = output
        .stdout
        .lines()
        .filter_map(|line| line.split('\t').nth(1))
        .filter_map(|r| r.strip_prefix("refs/heads/"))
        .map(str::to_string)
        .collect();
    Ok(heads)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::Path;
    use std::process::Command;

    pub fn run_git(dir: &Path, args: &[&str]) -> String {
        let output = Command::new("git")
            .args(["-c", "user.name=test-user", "-c", "user.email=test@example.com"])
            .args(args)
            .current_dir(dir)
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).into_owned()
    }

    /// Create a bare remote with one commit on `main` holding `files`.
    ///
    /// Returns the `file://` URL of the remote.
    pub fn make_remote(root: &Path, files: &[(&str, &str)]) -> String {
        let remote = root.join("remote.git");
        let seed = root.join("seed");
        std::fs::create_dir_all(&remote).unwrap();
        std::fs::create_dir_all(&seed).unwrap();
        run_git(&remote, &["init", "--bare", "--initial-branch=main"]);
        run_git(&seed, &["init"]);
        run_git(&seed, &["checkout", "-b", "main"]);
        for (name, content) in files {
            let path = seed.join(name);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(path, content).unwrap();
        }
        run_git(&seed, &["add", "-A"]);
        run_git(&seed, &["commit", "--allow-empty", "-m", "initial"]);
        run_git(&seed, &["remote", "add", "origin", remote.to_str().unwrap()]);
        run_git(&seed, &["push", "origin", "main"]);
        format!("file://{}", remote.display())
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{make_remote, run_git};
    use super::*;
    use std::ffi::OsStr;
    use tempfile::TempDir;

    #[test]
    fn test_clone_shallow_and_head_commit() {
        let temp_dir = TempDir::new().unwrap();
        let url = make_remote(temp_dir.path(), &[("meta.yaml", "chart: {}\n")]);
        let target = temp_dir.path().join("work");

        clone_shallow(&url, "main", &target, None, Some(Duration::from_secs(60))).unwrap();

        assert!(target.join("meta.yaml").exists());
        let sha = head_commit(&target).unwrap();
        assert_eq!(sha.len(), 40, "SHA should be 40 hex chars, got: {sha}");
        assert!(sha.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(is_clean(&target).unwrap());
    }

    #[test]
    fn test_clone_replaces_existing_directory() {
        let temp_dir = TempDir::new().unwrap();
        let url = make_remote(temp_dir.path(), &[("a.txt", "a")]);
        let target = temp_dir.path().join("work");
        fs::create_dir_all(&target).unwrap();
        fs::write(target.join("stale.txt"), "stale").unwrap();

        clone_shallow(&url, "main", &target, None, None).unwrap();

        assert!(!target.join("stale.txt").exists());
        assert!(target.join("a.txt").exists());
    }

    #[test]
    fn test_clone_missing_branch_fails_with_hint() {
        let temp_dir = TempDir::new().unwrap();
        let url = make_remote(temp_dir.path(), &[("a.txt", "a")]);
        let target = temp_dir.path().join("work");

        let err = clone_shallow(&url, "does-not-exist", &target, None, None).unwrap_err();
        match err {
            Error::GitClone { branch, .. } => assert_eq!(branch, "does-not-exist"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_open_rejects_plain_directory() {
        let temp_dir = TempDir::new().unwrap();
        assert!(open(temp_dir.path()).is_err());
    }

    #[test]
    fn test_stage_commit_and_push() {
        let temp_dir = TempDir::new().unwrap();
        let url = make_remote(temp_dir.path(), &[("a.txt", "a")]);
        let work = temp_dir.path().join("work");
        clone_shallow(&url, "main", &work, None, None).unwrap();
        let before = head_commit(&work).unwrap();

        fs::create_dir_all(work.join("project")).unwrap();
        fs::write(work.join("project/meta.yaml"), "chart: {}\n").unwrap();
        assert!(!is_clean(&work).unwrap());

        stage(&work, &[PathBuf::from("project/meta.yaml")]).unwrap();
        let author = GitAuthor::new("Sync Bot", "bot@example.com");
        let after = commit(&work, "publish meta.yaml", &author).unwrap();
        assert_ne!(before, after);
        assert!(is_clean(&work).unwrap());

        push_force(&work, &url, "main", None, None).unwrap();

        let log = run_git(&work, &["log", "-1", "--format=%an <%ae> %s"]);
        assert_eq!(log.trim(), "Sync Bot <bot@example.com> publish meta.yaml");

        let heads = ls_remote_heads(&url, None, None).unwrap();
        assert_eq!(heads, vec!["main".to_string()]);
    }

    #[test]
    fn test_token_is_passed_through_environment_only() {
        let auth = AuthCredential::Token {
            username: "bot".to_string(),
            secret: "s3cret".to_string(),
        };
        let encoded = "Ym90OnMzY3JldA==";
        let cmd = base_command(None, Some(&auth));

        assert!(cmd
            .get_args()
            .all(|arg| !arg.to_string_lossy().contains(encoded)));
        let value = cmd
            .get_envs()
            .find(|(key, _)| *key == OsStr::new("GIT_CONFIG_VALUE_0"))
            .and_then(|(_, value)| value)
            .map(|value| value.to_string_lossy().into_owned());
        assert_eq!(value.as_deref(), Some("Authorization: Basic Ym90OnMzY3JldA=="));
    }

    #[test]
    fn test_has_staged_changes_reads_the_index() {
        let temp_dir = TempDir::new().unwrap();
        let url = make_remote(temp_dir.path(), &[("a.txt", "a")]);
        let work = temp_dir.path().join("work");
        clone_shallow(&url, "main", &work, None, None).unwrap();

        fs::write(work.join("untracked.txt"), "x").unwrap();
        assert!(!is_clean(&work).unwrap());
        assert!(!has_staged_changes(&work).unwrap());

        stage(&work, &[PathBuf::from("untracked.txt")]).unwrap();
        assert!(has_staged_changes(&work).unwrap());
    }

    #[test]
    fn test_stage_takes_paths_literally_and_ignores_gitignore() {
        let temp_dir = TempDir::new().unwrap();
        let url = make_remote(temp_dir.path(), &[("deploy/.gitignore", "*.tmp\n")]);
        let work = temp_dir.path().join("work");
        clone_shallow(&url, "main", &work, None, None).unwrap();
        fs::write(work.join("deploy/meta.tmp"), "x").unwrap();
        fs::write(work.join("a[1].yaml"), "x").unwrap();
        fs::write(work.join("a1.yaml"), "x").unwrap();

        stage(
            &work,
            &[PathBuf::from("deploy/meta.tmp"), PathBuf::from("a[1].yaml")],
        )
        .unwrap();

        let staged = run_git(&work, &["diff", "--cached", "--name-only"]);
        let staged: Vec<&str> = staged.lines().collect();
        assert_eq!(staged, vec!["a[1].yaml", "deploy/meta.tmp"]);
    }

    #[test]
    fn test_commit_with_nothing_staged_reports_git_output() {
        let temp_dir = TempDir::new().unwrap();
        let url = make_remote(temp_dir.path(), &[("a.txt", "a")]);
        let work = temp_dir.path().join("work");
        clone_shallow(&url, "main", &work, None, None).unwrap();

        let author = GitAuthor::new("Sync Bot", "bot@example.com");
        match commit(&work, "empty", &author).unwrap_err() {
            Error::GitCommand { command, stderr, .. } => {
                assert_eq!(command, "commit");
                assert!(stderr.contains("nothing to commit"), "got: {stderr}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_pull_already_up_to_date_succeeds() {
        let temp_dir = TempDir::new().unwrap();
        let url = make_remote(temp_dir.path(), &[("a.txt", "a")]);
        let work = temp_dir.path().join("work");
        clone_shallow(&url, "main", &work, None, None).unwrap();

        pull(&work, &url, "main", None, None).unwrap();
    }

    #[test]
    fn test_ls_remote_unknown_repository_fails() {
        let temp_dir = TempDir::new().unwrap();
        let url = format!("file://{}", temp_dir.path().join("missing.git").display());
        assert!(ls_remote_heads(&url, None, None).is_err());
    }
}
