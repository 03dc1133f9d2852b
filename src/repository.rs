//! # Version-Control Seam
//!
//! This module defines `GitOperations`, the trait through which the
//! repository cache and the publish pipeline talk to version control. It is
//! the only boundary between `chart-sync` and git, which keeps the rest of
//! the crate testable without network access or a `git` binary.
//!
//! ## Design
//!
//! - **`GitOperations`**: clone, open, status, pull, stage, commit, push and
//!   remote probing, each a single blocking call.
//!
//! - **`DefaultGitOperations`**: the production implementation, delegating to
//!   the system `git` command in [`crate::git`] and applying one deadline to
//!   every network-bound call.
//!
//! In tests, mock implementations count calls, inject failures and simulate
//! slow clones to exercise single-flight initialization and locking.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::auth::AuthCredential;
use crate::error::Result;
use crate::git::GitAuthor;

/// Trait for git operations - allows mocking in tests
pub trait GitOperations: Send + Sync {
    /// Shallow (depth 1), single-branch clone of `branch` into `target_dir`.
    ///
    /// Any existing `target_dir` is replaced.
    fn clone_shallow(
        &self,
        url: &str,
        branch: &str,
        target_dir: &Path,
        auth: Option<&AuthCredential>,
    ) -> Result<()>;

    /// Open an existing working copy without touching the network.
    fn open(&self, path: &Path) -> Result<()>;

    /// Commit id of the checked-out HEAD.
    fn head_commit(&self, path: &Path) -> Result<String>;

    /// Whether the working tree has no pending changes.
    fn is_clean(&self, path: &Path) -> Result<bool>;

    /// Whether the index holds changes not yet committed.
    fn has_staged_changes(&self, path: &Path) -> Result<bool>;

    /// Pull `branch` from `origin`; "already up to date" is success.
    fn pull(
        &self,
        path: &Path,
        url: &str,
        branch: &str,
        auth: Option<&AuthCredential>,
    ) -> Result<()>;

    /// Add paths (relative to the working copy root) to the index.
    fn stage(&self, path: &Path, files: &[PathBuf]) -> Result<()>;

    /// Commit the index and return the new commit id.
    fn commit(&self, path: &Path, message: &str, author: &GitAuthor) -> Result<String>;

    /// Force-push `refs/heads/<branch>` to `origin`.
    fn push_force(
        &self,
        path: &Path,
        url: &str,
        branch: &str,
        auth: Option<&AuthCredential>,
    ) -> Result<()>;

    /// Branch names advertised by a remote; has no local side effects.
    fn list_branches(&self, url: &str, auth: Option<&AuthCredential>) -> Result<Vec<String>>;
}

/// The default implementation of `GitOperations`, which uses the system's
/// `git` command to perform real Git operations.
#[derive(Debug, Clone, Default)]
pub struct DefaultGitOperations {
    timeout: Option<Duration>,
}

impl DefaultGitOperations {
    /// Bound every network call (clone, pull, push, ls-remote) by `timeout`.
    pub fn with_timeout(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

impl GitOperations for DefaultGitOperations {
    fn clone_shallow(
        &self,
        url: &str,
        branch: &str,
        target_dir: &Path,
        auth: Option<&AuthCredential>,
    ) -> Result<()> {
        crate::git::clone_shallow(url, branch, target_dir, auth, self.timeout)
    }

    fn open(&self, path: &Path) -> Result<()> {
        crate::git::open(path)
    }

    fn head_commit(&self, path: &Path) -> Result<String> {
        crate::git::head_commit(path)
    }

    fn is_clean(&self, path: &Path) -> Result<bool> {
        crate::git::is_clean(path)
    }

    fn has_staged_changes(&self, path: &Path) -> Result<bool> {
        crate::git::has_staged_changes(path)
    }

    fn pull(
        &self,
        path: &Path,
        url: &str,
        branch: &str,
        auth: Option<&AuthCredential>,
    ) -> Result<()> {
        crate::git::pull(path, url, branch, auth, self.timeout)
    }

    fn stage(&self, path: &Path, files: &[PathBuf]) -> Result<()> {
        crate::git::stage(path, files)
    }

    fn commit(&self, path: &Path, message: &str, author: &GitAuthor) -> Result<String> {
        crate::git::commit(path, message, author)
    }

    fn push_force(
        &self,
        path: &Path,
        url: &str,
        branch: &str,
        auth: Option<&AuthCredential>,
    ) -> Result<()> {
        crate::git::push_force(path, url, branch, auth, self.timeout)
    }

    fn list_branches(&self, url: &str, auth: Option<&AuthCredential>) -> Result<Vec<String>> {
        crate::git::ls_remote_heads(url, auth, self.timeout)
    }
}
