//! Path utilities for working copies and generated files

use std::path::{Component, Path};
use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::error::{Error, Result};

static SCHEME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^https?://").unwrap_or_else(|e| panic!("invalid scheme regex: {}", e))
});

/// Make a repository URL usable as a directory name.
///
/// A leading `http://` or `https://` (any case) is stripped. The host keeps
/// its dots; `:` in the host and `/`, `.`, `:` in the rest of the URL
/// become `_`.
pub fn sanitize_url(url: &str) -> String {
    let stripped = SCHEME.replace(url, "");
    let (host, rest) = match stripped.find('/') {
        Some(index) => stripped.split_at(index),
        None => (&stripped[..], ""),
    };
    format!("{}{}", host.replace(':', "_"), sanitize_segment(rest))
}

fn sanitize_segment(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '/' | '.' | ':' => '_',
            c => c,
        })
        .collect()
}

/// Directory name of a source cache: `sanitize(url)-branch`.
pub fn cache_dir_name(url: &str, branch: &str) -> String {
    format!("{}-{}", sanitize_url(url), sanitize_segment(branch))
}

/// Directory name of a destination working copy:
/// `sanitize(url)-branch_correlationId`.
pub fn working_copy_dir_name(url: &str, branch: &str, correlation_id: &str) -> String {
    format!("{}_{}", cache_dir_name(url, branch), correlation_id)
}

/// Strip a user name or password embedded in a remote URL before it is
/// logged or reported. Anything that does not parse as a URL is returned
/// unchanged.
pub fn redact_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut parsed) if !parsed.username().is_empty() || parsed.password().is_some() => {
            let _ = parsed.set_password(None);
            let _ = parsed.set_username("");
            parsed.to_string()
        }
        _ => raw.to_string(),
    }
}

/// Reject empty paths, absolute paths and `..` components.
pub fn checked_relative_path(path: &str) -> Result<&Path> {
    let invalid = |message: &str| Error::InvalidPath {
        path: path.to_string(),
        message: message.to_string(),
    };

    if path.trim().is_empty() {
        return Err(invalid("path is empty"));
    }
    let candidate = Path::new(path);
    for component in candidate.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            Component::ParentDir => return Err(invalid("path must not contain '..'")),
            Component::RootDir | Component::Prefix(_) => {
                return Err(invalid("path must be relative"))
            }
        }
    }
    Ok(candidate)
}
