//! # Process Configuration
//!
//! `chart-sync` reads one YAML file at startup (by default
//! `config/application.yaml`):
//!
//! ```yaml
//! source:                      # alias: repository1
//!   url: https://git.example.com/org/charts.git   # alias: path
//!   branch: main
//!   username: reader
//!   localPath: /var/cache/chart-sync/charts
//! destination:                 # alias: repository2
//!   url: https://git.example.com/org/project.git
//!   branch: main
//!   username: writer
//!   localPath: /var/tmp/chart-sync
//!   useSsh: false
//!   sshKeyPath: ~/.ssh/id_ed25519
//! git:
//!   authorName: Chart Sync
//!   authorEmail: chart-sync@example.com
//! sync:
//!   refreshPolicy: pullWhenDirty   # always | never
//!   publishLock: global            # perDestination
//!   timeout: 2m
//!   retry:
//!     maxAttempts: 3
//!     initialBackoff: 250ms
//!     maxBackoff: 2s
//! ```
//!
//! Secrets are never read from this file. A missing required key is a fatal
//! startup error that lists every missing key at once.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::auth::CredentialDescriptor;
use crate::cache::{RefreshPolicy, RepositoryRegistry};
use crate::defaults::default_work_root;
use crate::error::{Error, Result};
use crate::git::GitAuthor;
use crate::repository::{DefaultGitOperations, GitOperations};
use crate::retry::RetryPolicy;
use crate::sync::{PublishLockScope, RepoLocation, SyncSettings, Synchronizer};

/// Settings for one repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositorySettings {
    #[serde(default, alias = "path")]
    pub url: String,
    #[serde(default)]
    pub branch: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub local_path: Option<PathBuf>,
    #[serde(default)]
    pub use_ssh: bool,
    #[serde(default)]
    pub ssh_key_path: Option<PathBuf>,
}

impl RepositorySettings {
    /// Credential material for this repository with the given secret.
    pub fn credential(&self, secret: Option<&str>) -> CredentialDescriptor {
        CredentialDescriptor {
            use_ssh: self.use_ssh,
            username: self.username.clone(),
            secret: secret.unwrap_or_default().to_string(),
            ssh_key_path: self.ssh_key_path.clone(),
        }
    }

    fn missing_keys(&self, section: &str) -> Vec<String> {
        let mut missing = Vec::new();
        if self.url.trim().is_empty() {
            missing.push(format!("{}.url", section));
        }
        if self.branch.trim().is_empty() {
            missing.push(format!("{}.branch", section));
        }
        if self.use_ssh {
            if self.ssh_key_path.is_none() {
                missing.push(format!("{}.sshKeyPath", section));
            }
        } else if self.username.trim().is_empty() {
            missing.push(format!("{}.username", section));
        }
        missing
    }
}

/// Pipeline behaviour.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConfig {
    #[serde(default)]
    pub refresh_policy: RefreshPolicy,
    #[serde(default)]
    pub publish_lock: PublishLockScope,
    /// Deadline for each network-bound git command.
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
    #[serde(default)]
    pub retry: RetryPolicy,
}

/// The whole configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    #[serde(default, alias = "repository1")]
    pub source: RepositorySettings,
    #[serde(default, alias = "repository2")]
    pub destination: RepositorySettings,
    #[serde(default)]
    pub git: GitAuthor,
    #[serde(default)]
    pub sync: SyncConfig,
}

impl AppConfig {
    /// Parse and check a configuration document.
    pub fn parse(yaml: &str) -> Result<Self> {
        let config: AppConfig = serde_yaml::from_str(yaml).map_err(|e| Error::Config {
            message: format!("invalid configuration: {}", e),
            hint: Some("Check the YAML syntax and key names (camelCase)".to_string()),
        })?;
        config.check_required()?;
        Ok(config)
    }

    /// Load and check the configuration file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::Config {
                message: format!("configuration file not found: {}", path.display()),
                hint: Some("Use --config or CHART_SYNC_CONFIG to point at the file".to_string()),
            });
        }
        let text = fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Every required key that is missing or empty.
    pub fn missing_keys(&self) -> Vec<String> {
        let mut missing = self.source.missing_keys("source");
        missing.extend(self.destination.missing_keys("destination"));
        if self.git.author_name.trim().is_empty() {
            missing.push("git.authorName".to_string());
        }
        if self.git.author_email.trim().is_empty() {
            missing.push("git.authorEmail".to_string());
        }
        missing
    }

    fn check_required(&self) -> Result<()> {
        let missing = self.missing_keys();
        if missing.is_empty() {
            return Ok(());
        }
        let hint = missing
            .iter()
            .find(|key| key.starts_with("git."))
            .map(|_| "Commits need an author: set git.authorName and git.authorEmail".to_string());
        Err(Error::Config {
            message: format!("missing required keys: {}", missing.join(", ")),
            hint,
        })
    }

    /// Source side of a copy. Without `localPath` the pipeline picks a
    /// directory under the user cache.
    pub fn source_location(&self, secret: Option<&str>) -> RepoLocation {
        RepoLocation {
            url: self.source.url.clone(),
            branch: self.source.branch.clone(),
            local_path: self.source.local_path.clone().unwrap_or_default(),
            credential: self.source.credential(secret),
        }
    }

    /// Destination side of a copy, with the working-copy root resolved.
    pub fn destination_location(&self, secret: Option<&str>) -> RepoLocation {
        RepoLocation {
            url: self.destination.url.clone(),
            branch: self.destination.branch.clone(),
            local_path: self
                .destination
                .local_path
                .clone()
                .unwrap_or_else(default_work_root),
            credential: self.destination.credential(secret),
        }
    }

    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            author: self.git.clone(),
            lock_scope: self.sync.publish_lock,
            retry: self.sync.retry.clone(),
        }
    }

    /// Wire a [`Synchronizer`] backed by the system `git` binary.
    pub fn synchronizer(&self) -> Synchronizer {
        let git: Arc<dyn GitOperations> =
            Arc::new(DefaultGitOperations::with_timeout(self.sync.timeout));
        let registry = Arc::new(RepositoryRegistry::new(
            Arc::clone(&git),
            self.sync.refresh_policy,
            self.sync.retry.clone(),
        ));
        Synchronizer::new(git, registry, self.sync_settings())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const FULL: &str = r#"
source:
  url: https://git.example.com/org/charts.git
  branch: main
  username: reader
  localPath: /tmp/charts-cache
destination:
  url: https://git.example.com/org/project.git
  branch: release
  username: writer
git:
  authorName: Chart Sync
  authorEmail: chart-sync@example.com
sync:
  refreshPolicy: always
  publishLock: perDestination
  timeout: 90s
  retry:
    maxAttempts: 5
"#;

    #[test]
    fn test_parse_full_config() {
        let config = AppConfig::parse(FULL).unwrap();

        assert_eq!(config.source.url, "https://git.example.com/org/charts.git");
        assert_eq!(config.destination.branch, "release");
        assert_eq!(config.git.author_name, "Chart Sync");
        assert_eq!(config.sync.refresh_policy, RefreshPolicy::Always);
        assert_eq!(config.sync.publish_lock, PublishLockScope::PerDestination);
        assert_eq!(config.sync.timeout, Some(Duration::from_secs(90)));
        assert_eq!(config.sync.retry.max_attempts, 5);
        assert_eq!(config.sync.retry.initial_backoff, Duration::from_millis(250));
    }

    #[test]
    fn test_legacy_key_names() {
        let config = AppConfig::parse(
            r#"
repository1:
  path: https://git.example.com/org/charts.git
  branch: main
  username: reader
repository2:
  path: https://git.example.com/org/project.git
  branch: main
  username: writer
git:
  authorName: Bot
  authorEmail: bot@example.com
"#,
        )
        .unwrap();

        assert_eq!(config.source.url, "https://git.example.com/org/charts.git");
        assert_eq!(config.destination.url, "https://git.example.com/org/project.git");
        assert_eq!(config.sync.refresh_policy, RefreshPolicy::PullWhenDirty);
        assert_eq!(config.sync.publish_lock, PublishLockScope::Global);
        assert_eq!(config.sync.timeout, None);
    }

    #[test]
    fn test_missing_keys_are_all_reported() {
        let err = AppConfig::parse("source:\n  url: https://x/a.git\n").unwrap_err();
        let message = err.to_string();

        for key in [
            "source.branch",
            "source.username",
            "destination.url",
            "destination.branch",
            "destination.username",
            "git.authorName",
            "git.authorEmail",
        ] {
            assert!(message.contains(key), "{} missing from: {}", key, message);
        }
        assert!(!message.contains("source.url"));
        assert!(message.contains("hint:"));
    }

    #[test]
    fn test_ssh_repositories_need_a_key_path_not_a_username() {
        let config = AppConfig {
            destination: RepositorySettings {
                url: "git@git.example.com:org/project.git".to_string(),
                branch: "main".to_string(),
                use_ssh: true,
                ..Default::default()
            },
            ..Default::default()
        };
        let missing = config.missing_keys();
        assert!(missing.contains(&"destination.sshKeyPath".to_string()));
        assert!(!missing.contains(&"destination.username".to_string()));
    }

    #[test]
    fn test_load_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let err = AppConfig::load(&temp_dir.path().join("application.yaml")).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_load_from_file_and_build_locations() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("application.yaml");
        fs::write(&path, FULL).unwrap();

        let config = AppConfig::load(&path).unwrap();
        let source = config.source_location(Some("s1"));
        assert_eq!(source.local_path, PathBuf::from("/tmp/charts-cache"));
        assert_eq!(source.credential.secret, "s1");
        assert_eq!(source.credential.username, "reader");

        let destination = config.destination_location(None);
        assert_eq!(destination.local_path, default_work_root());
        assert!(destination.credential.secret.is_empty());

        let settings = config.sync_settings();
        assert_eq!(settings.author.author_email, "chart-sync@example.com");
        assert_eq!(settings.lock_scope, PublishLockScope::PerDestination);
    }

    #[test]
    fn test_source_cache_path_left_to_pipeline() {
        let mut config = AppConfig::parse(FULL).unwrap();
        config.source.local_path = None;
        let source = config.source_location(None);
        assert!(source.local_path.as_os_str().is_empty());
    }
}
