//! Selection of working-copy files to stage
//!
//! Staging walks the whole working copy (skipping `.git`) and keeps every
//! file the [`IgnorePredicate`] does not reject. The default predicate reads
//! the `.gitignore` at the working-copy root; [`NoIgnore`] stages everything.

use std::path::{Path, PathBuf};

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use log::{debug, warn};
use walkdir::WalkDir;

use crate::error::{Error, Result};

/// Decides whether a working-copy path must stay out of the index.
pub trait IgnorePredicate: Send + Sync {
    /// `relative_path` is relative to the working-copy root.
    fn is_ignored(&self, relative_path: &Path, is_dir: bool) -> bool;
}

/// Stage everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoIgnore;

impl IgnorePredicate for NoIgnore {
    fn is_ignored(&self, _relative_path: &Path, _is_dir: bool) -> bool {
        false
    }
}

/// Patterns from the `.gitignore` at a working-copy root.
#[derive(Debug)]
pub struct GitIgnore {
    matcher: Gitignore,
}

impl GitIgnore {
    /// Load `<root>/.gitignore`; a missing file yields an empty matcher.
    pub fn load(root: &Path) -> Result<Self> {
        let mut builder = GitignoreBuilder::new(root);
        let file = root.join(".gitignore");
        if file.is_file() {
            if let Some(err) = builder.add(&file) {
                warn!("Some .gitignore patterns in {} were skipped: {}", file.display(), err);
            }
        }
        let matcher = builder.build().map_err(|e| Error::Filesystem {
            message: format!("failed to read {}: {}", file.display(), e),
        })?;
        Ok(Self { matcher })
    }

    /// Build a matcher from pattern lines, as if they were a root `.gitignore`.
    pub fn from_patterns(root: &Path, patterns: &[&str]) -> Result<Self> {
        let mut builder = GitignoreBuilder::new(root);
        for pattern in patterns {
            builder
                .add_line(None, pattern)
                .map_err(|e| Error::Filesystem {
                    message: format!("invalid ignore pattern '{}': {}", pattern, e),
                })?;
        }
        let matcher = builder.build().map_err(|e| Error::Filesystem {
            message: format!("invalid ignore patterns: {}", e),
        })?;
        Ok(Self { matcher })
    }
}

impl IgnorePredicate for GitIgnore {
    fn is_ignored(&self, relative_path: &Path, is_dir: bool) -> bool {
        self.matcher
            .matched_path_or_any_parents(relative_path, is_dir)
            .is_ignore()
    }
}

/// Every file under `root` not rejected by `predicate`, relative to `root`
/// and sorted.
pub fn collect_stageable(root: &Path, predicate: &dyn IgnorePredicate) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            let Ok(relative) = entry.path().strip_prefix(root) else {
                return false;
            };
            if relative == Path::new(".git") {
                return false;
            }
            !predicate.is_ignored(relative, entry.file_type().is_dir())
        });

    for entry in walker {
        let entry = entry.map_err(|e| Error::Filesystem {
            message: format!("failed to walk {}: {}", root.display(), e),
        })?;
        if entry.file_type().is_dir() {
            continue;
        }
        if let Ok(relative) = entry.path().strip_prefix(root) {
            files.push(relative.to_path_buf());
        }
    }
    debug!("{} stageable file(s) under {}", files.len(), root.display());
    Ok(files)
}
