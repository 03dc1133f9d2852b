//! Local working-copy cache of a source repository
//!
//! A [`RepositoryCache`] binds one remote URL and branch to one local
//! directory. It is initialised at most once (clone when the directory is
//! missing, open in place otherwise), refreshed before each read, and serves
//! concurrent readers through a read/write lock.
//!
//! Handles are shared through a [`RepositoryRegistry`] keyed by
//! `(url, local_path, branch)`. The registry is owned by the caller; there is
//! no process-global state.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, RwLock};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::auth::AuthCredential;
use crate::error::{Error, Result};
use crate::path::checked_relative_path;
use crate::repository::GitOperations;
use crate::retry::RetryPolicy;

/// When `refresh` pulls from the remote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RefreshPolicy {
    /// Pull only when the working tree has local changes; a clean tree is
    /// left as is.
    #[default]
    PullWhenDirty,
    /// Pull on every refresh.
    Always,
    /// Never pull; the first clone is served for the life of the handle.
    Never,
}

impl RefreshPolicy {
    fn should_pull(self, clean: bool) -> bool {
        match self {
            RefreshPolicy::PullWhenDirty => !clean,
            RefreshPolicy::Always => true,
            RefreshPolicy::Never => false,
        }
    }
}

/// Lifecycle of a cache handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitState {
    Uninitialized,
    Initializing,
    Ready,
    Failed(String),
}

/// Cache key combining URL, local directory and branch
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub url: String,
    pub local_path: PathBuf,
    pub branch: String,
}

impl CacheKey {
    pub fn new(url: &str, local_path: &Path, branch: &str) -> Self {
        Self {
            url: url.to_string(),
            local_path: local_path.to_path_buf(),
            branch: branch.to_string(),
        }
    }
}

/// One remote repository + branch, presented as a local file source.
pub struct RepositoryCache {
    url: String,
    branch: String,
    local_path: PathBuf,
    git: Arc<dyn GitOperations>,
    refresh_policy: RefreshPolicy,
    retry: RetryPolicy,
    state: Mutex<InitState>,
    state_changed: Condvar,
    // Held exclusively by refresh, shared by reads.
    last_known_commit: RwLock<Option<String>>,
}

impl RepositoryCache {
    pub fn new(
        url: &str,
        branch: &str,
        local_path: &Path,
        git: Arc<dyn GitOperations>,
        refresh_policy: RefreshPolicy,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            url: url.to_string(),
            branch: branch.to_string(),
            local_path: local_path.to_path_buf(),
            git,
            refresh_policy,
            retry,
            state: Mutex::new(InitState::Uninitialized),
            state_changed: Condvar::new(),
            last_known_commit: RwLock::new(None),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    pub fn state(&self) -> Result<InitState> {
        Ok(self.lock_state()?.clone())
    }

    pub fn last_known_commit(&self) -> Result<Option<String>> {
        let commit = self
            .last_known_commit
            .read()
            .map_err(|_| poisoned("repository content lock"))?;
        Ok(commit.clone())
    }

    /// Clone or open the working copy, exactly once per handle.
    ///
    /// Concurrent callers block until the single initializer finishes and all
    /// observe its outcome. A failure is sticky: later calls replay it
    /// without touching the network.
    pub fn initialize(&self, auth: Option<&AuthCredential>, correlation_id: &str) -> Result<()> {
        {
            let mut state = self.lock_state()?;
            loop {
                match &*state {
                    InitState::Ready => return Ok(()),
                    InitState::Failed(message) => return Err(self.init_error(message)),
                    InitState::Initializing => {
                        debug!(
                            "[{}] Waiting for {}@{} to finish initializing",
                            correlation_id, self.url, self.branch
                        );
                        state = self
                            .state_changed
                            .wait(state)
                            .map_err(|_| poisoned("repository init state"))?;
                    }
                    InitState::Uninitialized => {
                        *state = InitState::Initializing;
                        break;
                    }
                }
            }
        }

        let outcome = self.clone_or_open(auth, correlation_id);

        let mut state = self.lock_state()?;
        let result = match outcome {
            Ok(()) => {
                *state = InitState::Ready;
                Ok(())
            }
            Err(err) => {
                let message = err.to_string();
                warn!(
                    "[{}] Initialization of {}@{} failed: {}",
                    correlation_id, self.url, self.branch, message
                );
                *state = InitState::Failed(message);
                Err(err)
            }
        };
        self.state_changed.notify_all();
        result
    }

    fn clone_or_open(&self, auth: Option<&AuthCredential>, correlation_id: &str) -> Result<()> {
        if self.local_path.exists() {
            info!(
                "[{}] Opening existing working copy {}",
                correlation_id,
                self.local_path.display()
            );
            self.git.open(&self.local_path)?;
        } else {
            info!(
                "[{}] Cloning {}@{} into {}",
                correlation_id,
                self.url,
                self.branch,
                self.local_path.display()
            );
            self.retry.run("clone", correlation_id, || {
                self.git
                    .clone_shallow(&self.url, &self.branch, &self.local_path, auth)
            })?;
        }

        let head = self.git.head_commit(&self.local_path)?;
        debug!("[{}] {}@{} at {}", correlation_id, self.url, self.branch, head);
        let mut commit = self
            .last_known_commit
            .write()
            .map_err(|_| poisoned("repository content lock"))?;
        *commit = Some(head);
        Ok(())
    }

    /// Bring the working copy up to date according to the refresh policy.
    pub fn refresh(&self, auth: Option<&AuthCredential>, correlation_id: &str) -> Result<()> {
        let mut commit = self
            .last_known_commit
            .write()
            .map_err(|_| poisoned("repository content lock"))?;

        let clean = self.git.is_clean(&self.local_path)?;
        if !self.refresh_policy.should_pull(clean) {
            debug!(
                "[{}] Skipping pull of {}@{} (clean: {}, policy: {:?})",
                correlation_id, self.url, self.branch, clean, self.refresh_policy
            );
            return Ok(());
        }

        info!("[{}] Pulling {}@{}", correlation_id, self.url, self.branch);
        self.retry.run("pull", correlation_id, || {
            self.git
                .pull(&self.local_path, &self.url, &self.branch, auth)
        })?;
        *commit = Some(self.git.head_commit(&self.local_path)?);
        Ok(())
    }

    /// Initialize, refresh, then read `relative_path` from the working copy.
    pub fn read_file(
        &self,
        relative_path: &str,
        auth: Option<&AuthCredential>,
        correlation_id: &str,
    ) -> Result<Vec<u8>> {
        let relative = checked_relative_path(relative_path)?;

        self.initialize(auth, correlation_id)?;
        self.refresh(auth, correlation_id)?;

        let _guard = self
            .last_known_commit
            .read()
            .map_err(|_| poisoned("repository content lock"))?;
        let full_path = self.local_path.join(relative);
        if !full_path.is_file() {
            return Err(Error::FileNotFound {
                path: relative_path.to_string(),
            });
        }
        debug!("[{}] Reading {}", correlation_id, full_path.display());
        Ok(fs::read(&full_path)?)
    }

    fn lock_state(&self) -> Result<std::sync::MutexGuard<'_, InitState>> {
        self.state
            .lock()
            .map_err(|_| poisoned("repository init state"))
    }

    fn init_error(&self, message: &str) -> Error {
        Error::RepositoryInit {
            url: self.url.clone(),
            branch: self.branch.clone(),
            message: message.to_string(),
        }
    }
}

impl std::fmt::Debug for RepositoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositoryCache")
            .field("url", &self.url)
            .field("branch", &self.branch)
            .field("local_path", &self.local_path)
            .field("refresh_policy", &self.refresh_policy)
            .finish_non_exhaustive()
    }
}

fn poisoned(context: &str) -> Error {
    Error::LockPoisoned {
        context: context.to_string(),
    }
}

/// Shared cache handles, one per repository identity.
pub struct RepositoryRegistry {
    git: Arc<dyn GitOperations>,
    refresh_policy: RefreshPolicy,
    retry: RetryPolicy,
    entries: Mutex<HashMap<CacheKey, Arc<RepositoryCache>>>,
}

impl RepositoryRegistry {
    pub fn new(
        git: Arc<dyn GitOperations>,
        refresh_policy: RefreshPolicy,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            git,
            refresh_policy,
            retry,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Return the handle for this identity, creating it on first use.
    pub fn get_or_create(
        &self,
        url: &str,
        branch: &str,
        local_path: &Path,
    ) -> Result<Arc<RepositoryCache>> {
        let key = CacheKey::new(url, local_path, branch);
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| poisoned("repository registry"))?;
        let entry = entries.entry(key).or_insert_with(|| {
            Arc::new(RepositoryCache::new(
                url,
                branch,
                local_path,
                Arc::clone(&self.git),
                self.refresh_policy,
                self.retry.clone(),
            ))
        });
        Ok(Arc::clone(entry))
    }

    pub fn len(&self) -> Result<usize> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| poisoned("repository registry"))?;
        Ok(entries.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}
