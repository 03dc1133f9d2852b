//! # Publish Pipeline
//!
//! [`Synchronizer::copy`] moves one metafile from a source repository into
//! a destination repository and publishes it as a new commit. The stages
//! run in a fixed order:
//!
//! ```text
//! Start -> AuthBuilt -> SourceFileFetched -> Validated
//!       -> DestinationWipedAndCloned -> SubfolderPrepared -> FilesWritten
//!       -> Staged -> Committed -> Pushed -> Cleaned
//! ```
//!
//! Any stage may fail; the error is returned as [`Error::Operation`] with
//! the correlation id and the failing stage. Everything from the clone
//! onwards runs under the publish lock and inside a disposable working copy
//! that is removed whatever the outcome. A working copy with nothing to
//! commit after staging ends the operation successfully without a commit.
//!
//! [`Synchronizer::check`] validates repository parameters and contacts the
//! remote without touching the local filesystem.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{build_credential, AuthCredential, CredentialDescriptor};
use crate::cache::RepositoryRegistry;
use crate::error::{Error, Result};
use crate::generator::{GenerationContext, Generator};
use crate::git::GitAuthor;
use crate::metafile::MetaDocument;
use crate::path::{cache_dir_name, checked_relative_path, working_copy_dir_name};
use crate::repository::GitOperations;
use crate::retry::RetryPolicy;
use crate::staging::{collect_stageable, GitIgnore, IgnorePredicate};
use crate::validation::{validate_metafile, validate_values_against_json_schema};
use crate::values::Values;

/// Stages of a copy operation, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Start,
    AuthBuilt,
    SourceFileFetched,
    Validated,
    DestinationWipedAndCloned,
    SubfolderPrepared,
    FilesWritten,
    Staged,
    Committed,
    Pushed,
    Cleaned,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PipelineStage::Start => "check request",
            PipelineStage::AuthBuilt => "build credentials",
            PipelineStage::SourceFileFetched => "fetch source file",
            PipelineStage::Validated => "validate metafile",
            PipelineStage::DestinationWipedAndCloned => "clone destination",
            PipelineStage::SubfolderPrepared => "prepare subfolder",
            PipelineStage::FilesWritten => "write files",
            PipelineStage::Staged => "stage changes",
            PipelineStage::Committed => "commit",
            PipelineStage::Pushed => "push",
            PipelineStage::Cleaned => "clean up",
        };
        f.write_str(label)
    }
}

/// Which copy operations exclude each other.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PublishLockScope {
    /// One publish at a time across every destination.
    #[default]
    Global,
    /// One publish at a time per destination URL and branch.
    PerDestination,
}

/// One side of a copy.
#[derive(Debug, Clone, Default)]
pub struct RepoLocation {
    pub url: String,
    pub branch: String,
    /// Source: the cached working copy. Destination: the directory under
    /// which disposable working copies are created.
    pub local_path: PathBuf,
    pub credential: CredentialDescriptor,
}

/// Rendering inputs for the files a metafile declares.
#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    pub values: Values,
    pub environment: Option<String>,
    /// Optional JSON Schema the values must satisfy before rendering.
    pub values_schema: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default)]
pub struct CopyRequest {
    pub source: RepoLocation,
    pub destination: RepoLocation,
    /// Path of the metafile in the source repository; also its name under
    /// `sub_folder` in the destination.
    pub file_name: String,
    pub sub_folder: String,
    pub correlation_id: Option<String>,
    /// When set, the declared chart files are generated next to the metafile.
    pub render: Option<RenderOptions>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyOutcome {
    pub correlation_id: String,
    /// `false` when there was nothing to commit.
    pub published: bool,
    pub commit: Option<String>,
    /// Files written into the destination, relative to its root.
    pub written: Vec<PathBuf>,
    pub stages: Vec<PipelineStage>,
}

#[derive(Debug, Clone, Default)]
pub struct CheckRequest {
    pub repo_name: String,
    pub user: String,
    pub credential: String,
    pub correlation_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    pub correlation_id: String,
    pub branches: Vec<String>,
}

/// Settings shared by every operation of a [`Synchronizer`].
#[derive(Debug, Clone, Default)]
pub struct SyncSettings {
    pub author: GitAuthor,
    pub lock_scope: PublishLockScope,
    pub retry: RetryPolicy,
}

type IgnoreFactory = dyn Fn(&Path) -> Result<Box<dyn IgnorePredicate>> + Send + Sync;

/// Mutual exclusion for the destination side of copy operations.
pub struct PublishLocks {
    scope: PublishLockScope,
    global: Arc<Mutex<()>>,
    per_destination: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl PublishLocks {
    pub fn new(scope: PublishLockScope) -> Self {
        Self {
            scope,
            global: Arc::new(Mutex::new(())),
            per_destination: Mutex::new(HashMap::new()),
        }
    }

    /// The lock guarding `destination` under the configured scope.
    pub fn lock_for(&self, destination: &str) -> Result<Arc<Mutex<()>>> {
        match self.scope {
            PublishLockScope::Global => Ok(Arc::clone(&self.global)),
            PublishLockScope::PerDestination => {
                let mut locks = self
                    .per_destination
                    .lock()
                    .map_err(|_| poisoned("publish lock table"))?;
                Ok(Arc::clone(locks.entry(destination.to_string()).or_default()))
            }
        }
    }

    /// Run `f` while holding the lock for `destination`.
    pub fn with_lock<T>(&self, destination: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let lock = self.lock_for(destination)?;
        let _guard = lock.lock().map_err(|_| poisoned("publish lock"))?;
        f()
    }
}

fn poisoned(context: &str) -> Error {
    Error::LockPoisoned {
        context: context.to_string(),
    }
}

/// A destination working copy, removed on drop.
struct WorkingCopy {
    path: PathBuf,
    correlation_id: String,
}

impl Drop for WorkingCopy {
    fn drop(&mut self) {
        if !self.path.exists() {
            return;
        }
        match fs::remove_dir_all(&self.path) {
            Ok(()) => debug!(
                "[{}] Removed working copy {}",
                self.correlation_id,
                self.path.display()
            ),
            Err(e) => error!(
                "[{}] Unable to delete working copy {}: {}",
                self.correlation_id,
                self.path.display(),
                e
            ),
        }
    }
}

struct Published {
    commit: Option<String>,
    written: Vec<PathBuf>,
}

/// Runs copy and check operations.
pub struct Synchronizer {
    git: Arc<dyn GitOperations>,
    registry: Arc<RepositoryRegistry>,
    settings: SyncSettings,
    locks: PublishLocks,
    generator: Generator,
    ignore: Box<IgnoreFactory>,
}

impl Synchronizer {
    pub fn new(
        git: Arc<dyn GitOperations>,
        registry: Arc<RepositoryRegistry>,
        settings: SyncSettings,
    ) -> Self {
        let locks = PublishLocks::new(settings.lock_scope);
        Self {
            git,
            registry,
            settings,
            locks,
            generator: Generator::new(),
            ignore: Box::new(|root: &Path| -> Result<Box<dyn IgnorePredicate>> {
                Ok(Box::new(GitIgnore::load(root)?))
            }),
        }
    }

    /// Replace the default `.gitignore` predicate used when staging.
    pub fn with_ignore<F>(mut self, factory: F) -> Self
    where
        F: Fn(&Path) -> Result<Box<dyn IgnorePredicate>> + Send + Sync + 'static,
    {
        self.ignore = Box::new(factory);
        self
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Copy `request.file_name` from the source into the destination and
    /// publish it.
    pub fn copy(&self, request: &CopyRequest) -> Result<CopyOutcome> {
        let cid = correlation_id_or_new(request.correlation_id.as_deref());
        info!(
            "[{}] Copy of '{}' from {}@{} to {}@{} started",
            cid,
            request.file_name,
            request.source.url,
            request.source.branch,
            request.destination.url,
            request.destination.branch
        );

        let mut stages = vec![PipelineStage::Start];
        let result = self.run_copy(request, &cid, &mut stages);
        match result {
            Ok(published) => {
                stages.push(PipelineStage::Cleaned);
                let outcome = CopyOutcome {
                    correlation_id: cid.clone(),
                    published: published.commit.is_some(),
                    commit: published.commit,
                    written: published.written,
                    stages,
                };
                info!(
                    "[{}] Copy process completed successfully (published: {})",
                    cid, outcome.published
                );
                Ok(outcome)
            }
            Err(err) => {
                error!("[{}] Copy process failed: {}", cid, err);
                Err(err)
            }
        }
    }

    fn run_copy(
        &self,
        request: &CopyRequest,
        cid: &str,
        stages: &mut Vec<PipelineStage>,
    ) -> Result<Published> {
        check_copy_parameters(request).map_err(|e| e.in_operation(cid, PipelineStage::Start))?;

        let (source_auth, destination_auth) = build_both(request)
            .map_err(|e| e.in_operation(cid, PipelineStage::AuthBuilt))?;
        stages.push(PipelineStage::AuthBuilt);

        let bytes = self
            .fetch_source(request, &source_auth, cid)
            .map_err(|e| e.in_operation(cid, PipelineStage::SourceFileFetched))?;
        stages.push(PipelineStage::SourceFileFetched);

        let meta = parse_and_validate(&bytes, request.render.as_ref())
            .map_err(|e| e.in_operation(cid, PipelineStage::Validated))?;
        stages.push(PipelineStage::Validated);

        let destination = &request.destination;
        let lock_key = format!("{}#{}", destination.url, destination.branch);
        self.locks.with_lock(&lock_key, || {
            self.publish(request, &bytes, &meta, &destination_auth, cid, stages)
        })
    }

    fn fetch_source(
        &self,
        request: &CopyRequest,
        auth: &AuthCredential,
        cid: &str,
    ) -> Result<Vec<u8>> {
        let source = &request.source;
        let local_path = source_cache_path(source);
        let cache = self
            .registry
            .get_or_create(&source.url, &source.branch, &local_path)?;
        cache.read_file(&request.file_name, Some(auth), cid)
    }

    fn publish(
        &self,
        request: &CopyRequest,
        metafile: &[u8],
        meta: &MetaDocument,
        auth: &AuthCredential,
        cid: &str,
        stages: &mut Vec<PipelineStage>,
    ) -> Result<Published> {
        let destination = &request.destination;
        let work_dir = destination
            .local_path
            .join(working_copy_dir_name(&destination.url, &destination.branch, cid));
        let _working_copy = WorkingCopy {
            path: work_dir.clone(),
            correlation_id: cid.to_string(),
        };

        let at = |stage: PipelineStage| move |e: Error| e.in_operation(cid, stage);

        // Stage: wipe and clone
        if work_dir.exists() {
            fs::remove_dir_all(&work_dir)
                .map_err(|e| at(PipelineStage::DestinationWipedAndCloned)(e.into()))?;
        }
        self.settings
            .retry
            .run("clone", cid, || {
                self.git
                    .clone_shallow(&destination.url, &destination.branch, &work_dir, Some(auth))
            })
            .map_err(at(PipelineStage::DestinationWipedAndCloned))?;
        stages.push(PipelineStage::DestinationWipedAndCloned);

        // Stage: subfolder
        let (subfolder, target) =
            prepare_target(&work_dir, &request.sub_folder, &request.file_name)
                .map_err(at(PipelineStage::SubfolderPrepared))?;
        stages.push(PipelineStage::SubfolderPrepared);

        // Stage: write
        let written = self
            .write_files(
                &work_dir,
                &subfolder,
                &target,
                metafile,
                meta,
                request.render.as_ref(),
                cid,
            )
            .map_err(at(PipelineStage::FilesWritten))?;
        stages.push(PipelineStage::FilesWritten);

        // Stage: stage
        let changed = self
            .stage_all(&work_dir)
            .map_err(at(PipelineStage::Staged))?;
        stages.push(PipelineStage::Staged);
        if !changed {
            info!("[{}] Nothing to commit; destination is already up to date", cid);
            return Ok(Published {
                commit: None,
                written,
            });
        }

        // Stage: commit
        let message = format!("chart-sync: publish {} [{}]", request.file_name, cid);
        let commit = self
            .git
            .commit(&work_dir, &message, &self.settings.author)
            .map_err(at(PipelineStage::Committed))?;
        stages.push(PipelineStage::Committed);

        // Stage: push
        self.settings
            .retry
            .run("push", cid, || {
                self.git
                    .push_force(&work_dir, &destination.url, &destination.branch, Some(auth))
            })
            .map_err(at(PipelineStage::Pushed))?;
        stages.push(PipelineStage::Pushed);
        info!(
            "[{}] Pushed {} to {}@{}",
            cid, commit, destination.url, destination.branch
        );

        Ok(Published {
            commit: Some(commit),
            written,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn write_files(
        &self,
        work_dir: &Path,
        subfolder: &Path,
        target: &Path,
        metafile: &[u8],
        meta: &MetaDocument,
        render: Option<&RenderOptions>,
        cid: &str,
    ) -> Result<Vec<PathBuf>> {
        info!("[{}] Saving file to {}", cid, target.display());
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(target, metafile)?;

        let mut written = vec![relative_to(work_dir, target)];
        if let Some(options) = render {
            let ctx = GenerationContext::new(subfolder, cid)
                .with_environment(options.environment.clone());
            let generated = self.generator.generate(meta, &options.values, &ctx)?;
            written.extend(
                generated
                    .iter()
                    .map(|file| relative_to(work_dir, &file.absolute_path(subfolder))),
            );
        }
        Ok(written)
    }

    /// Stage every file the ignore predicate accepts; returns whether the
    /// index holds anything to commit.
    fn stage_all(&self, work_dir: &Path) -> Result<bool> {
        let predicate = (self.ignore)(work_dir)?;
        let files = collect_stageable(work_dir, predicate.as_ref())?;
        self.git.stage(work_dir, &files)?;
        self.git.has_staged_changes(work_dir)
    }

    /// Validate repository parameters and contact the remote.
    pub fn check(&self, request: &CheckRequest) -> Result<CheckOutcome> {
        let cid = correlation_id_or_new(request.correlation_id.as_deref());
        info!("[{}] Check of {} started", cid, request.repo_name);

        let missing: Vec<String> = [
            ("repoName", &request.repo_name),
            ("repoUser", &request.user),
            ("repoPassword", &request.credential),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name.to_string())
        .collect();
        if !missing.is_empty() {
            return Err(Error::MissingParameters { params: missing }
                .in_operation(&cid, "check parameters"));
        }

        let auth = AuthCredential::Token {
            username: request.user.clone(),
            secret: request.credential.clone(),
        };
        let branches = self
            .settings
            .retry
            .run("ls-remote", &cid, || {
                self.git.list_branches(&request.repo_name, Some(&auth))
            })
            .map_err(|e| e.in_operation(&cid, "reach remote"))?;

        info!(
            "[{}] Check process completed successfully ({} branch(es))",
            cid,
            branches.len()
        );
        Ok(CheckOutcome {
            correlation_id: cid,
            branches,
        })
    }
}

fn correlation_id_or_new(explicit: Option<&str>) -> String {
    match explicit.map(str::trim).filter(|id| !id.is_empty()) {
        Some(id) => id.to_string(),
        None => Uuid::new_v4().to_string(),
    }
}

fn check_copy_parameters(request: &CopyRequest) -> Result<()> {
    let mut missing = Vec::new();
    if request.file_name.trim().is_empty() {
        missing.push("fileName".to_string());
    }
    for (name, location) in [
        ("repository1", &request.source),
        ("repository2", &request.destination),
    ] {
        if location.url.trim().is_empty() {
            missing.push(format!("{}.path", name));
        }
        if location.branch.trim().is_empty() {
            missing.push(format!("{}.branch", name));
        }
        if !location.credential.use_ssh && location.credential.secret.is_empty() {
            missing.push(format!("{}.password", name));
        }
    }
    if missing.is_empty() {
        Ok(())
    } else {
        Err(Error::MissingParameters { params: missing })
    }
}

fn build_both(request: &CopyRequest) -> Result<(AuthCredential, AuthCredential)> {
    let build = |location: &RepoLocation| {
        build_credential(&location.credential).ok_or_else(|| Error::Auth {
            url: location.url.clone(),
            message: "credential could not be built".to_string(),
        })
    };
    Ok((build(&request.source)?, build(&request.destination)?))
}

fn parse_and_validate(bytes: &[u8], render: Option<&RenderOptions>) -> Result<MetaDocument> {
    let meta = MetaDocument::from_yaml(bytes)?;
    validate_metafile(&meta)?;
    if let Some(options) = render {
        if let Some(schema) = &options.values_schema {
            validate_values_against_json_schema(&options.values, schema)?;
        }
    }
    Ok(meta)
}

/// Default location of the source cache when none is configured.
fn source_cache_path(source: &RepoLocation) -> PathBuf {
    if source.local_path.as_os_str().is_empty() {
        crate::defaults::default_cache_root().join(cache_dir_name(&source.url, &source.branch))
    } else {
        source.local_path.clone()
    }
}

/// Create the subfolder and clear any stale copy of the target file.
fn prepare_target(
    work_dir: &Path,
    sub_folder: &str,
    file_name: &str,
) -> Result<(PathBuf, PathBuf)> {
    let subfolder = if sub_folder.trim().is_empty() {
        work_dir.to_path_buf()
    } else {
        work_dir.join(checked_relative_path(sub_folder)?)
    };
    fs::create_dir_all(&subfolder)?;

    let target = subfolder.join(checked_relative_path(file_name)?);
    if target.exists() {
        fs::remove_file(&target)?;
    }
    Ok((subfolder, target))
}

fn relative_to(root: &Path, path: &Path) -> PathBuf {
    path.strip_prefix(root).unwrap_or(path).to_path_buf()
}
