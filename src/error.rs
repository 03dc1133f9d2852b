//! # Error Handling
//!
//! This module defines the centralized error type for `chart-sync`. It uses
//! the `thiserror` library to create a single `Error` enum that covers every
//! anticipated failure mode of the repository cache, the metafile validator,
//! the generator and the publish pipeline.
//!
//! ## Key Components
//!
//! - **`Error`**: The main enum. Each variant carries enough context (URL,
//!   branch, path, command, stderr) to diagnose a failure from the logs alone.
//!
//! - **`ValidationError`**: The structured result of metafile validation.
//!   Every variant lists *all* offending items, not just the first.
//!
//! - **`Result<T>`**: A type alias for `std::result::Result<T, Error>`.
//!
//! Errors raised inside a copy operation are wrapped in
//! [`Error::Operation`], which attaches the correlation id and the pipeline
//! stage that failed, so a caller-side log line can always be matched to
//! the server-side logs.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Main error type for chart-sync operations
#[derive(Error, Debug)]
pub enum Error {
    /// The process configuration is missing or malformed.
    ///
    /// Raised at startup; the process must not start serving.
    #[error("Configuration error: {message}{}", hint.as_ref().map(|h| format!("\n  hint: {}", h)).unwrap_or_default())]
    Config {
        message: String,
        /// Optional hint for how to fix the configuration issue
        hint: Option<String>,
    },

    /// Authentication material could not be built for a repository.
    #[error("Authentication unavailable for {url}: {message}")]
    Auth { url: String, message: String },

    /// Required request parameters are missing.
    #[error("Missing required parameters: {}", params.join(", "))]
    MissingParameters { params: Vec<String> },

    /// An error occurred while cloning a Git repository.
    #[error("Git clone error for {url}@{branch}: {message}{}", hint.as_ref().map(|h| format!("\n  hint: {}", h)).unwrap_or_default())]
    GitClone {
        url: String,
        branch: String,
        message: String,
        /// Optional hint for how to resolve the clone issue
        hint: Option<String>,
    },

    /// An error occurred while executing a Git command.
    #[error("Git command failed for {url}: {command} - {stderr}")]
    GitCommand {
        command: String,
        url: String,
        stderr: String,
    },

    /// A Git command exceeded its deadline and was killed.
    #[error("Git command timed out for {url}: {command} after {}s", elapsed.as_secs())]
    Timeout {
        command: String,
        url: String,
        elapsed: Duration,
    },

    /// A repository cache failed to initialize.
    ///
    /// The failure is recorded once and replayed to every caller of the same
    /// handle; a fresh handle is needed to try again.
    #[error("Repository {url}@{branch} failed to initialize: {message}")]
    RepositoryInit {
        url: String,
        branch: String,
        message: String,
    },

    /// A requested file does not exist in a repository working copy.
    #[error("File not found: {path}")]
    FileNotFound { path: String },

    /// A path would escape the directory it is supposed to live in.
    #[error("Invalid path '{path}': {message}")]
    InvalidPath { path: String, message: String },

    /// The metafile is not valid YAML or does not match the metafile shape.
    #[error("Metafile parsing error: {message}")]
    MetafileParse { message: String },

    /// The metafile failed static validation.
    #[error("Metafile validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The values document failed JSON-Schema pre-validation.
    #[error("Values schema validation failed: {}", errors.join("; "))]
    ValuesSchema { errors: Vec<String> },

    /// A values document or `--set` override could not be interpreted.
    #[error("Invalid values: {message}")]
    Values { message: String },

    /// An error occurred during template processing.
    ///
    /// Includes the name of the template (file path or output filename).
    #[error("Template processing error: {message}{}", template.as_ref().map(|t| format!(" (template: {})", t)).unwrap_or_default())]
    Template {
        message: String,
        template: Option<String>,
    },

    /// An error occurred with a filesystem operation.
    #[error("Filesystem operation error: {message}")]
    Filesystem { message: String },

    /// An error indicating that a mutex or other lock has been poisoned.
    #[error("Lock poisoned: {context}")]
    LockPoisoned { context: String },

    /// A copy operation failed at a given pipeline stage.
    #[error("[{correlation_id}] {stage} failed: {source}")]
    Operation {
        correlation_id: String,
        stage: String,
        #[source]
        source: Box<Error>,
    },

    /// An I/O error, wrapped from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A YAML parsing error, wrapped from `serde_yaml::Error`.
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A JSON parsing error, wrapped from `serde_json::Error`.
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether the failure is a transport hiccup worth retrying.
    ///
    /// Only deadline expiries and network-level git failures qualify.
    /// Authentication problems, validation errors and local I/O never do.
    pub fn is_transient(&self) -> bool {
        const TRANSIENT_MARKERS: &[&str] = &[
            "could not resolve host",
            "connection timed out",
            "connection reset",
            "connection refused",
            "early eof",
            "the remote end hung up",
            "rpc failed",
            "operation timed out",
            "temporary failure",
            "502",
            "503",
            "504",
        ];

        let text = match self {
            Error::Timeout { .. } => return true,
            Error::GitClone { message, .. } => message,
            Error::GitCommand { stderr, .. } => stderr,
            Error::Operation { source, .. } => return source.is_transient(),
            _ => return false,
        };
        let text = text.to_lowercase();
        if text.contains("authentication failed") || text.contains("permission denied") {
            return false;
        }
        TRANSIENT_MARKERS.iter().any(|marker| text.contains(marker))
    }

    /// The correlation id attached to this error, if any.
    pub fn correlation_id(&self) -> Option<&str> {
        match self {
            Error::Operation { correlation_id, .. } => Some(correlation_id),
            _ => None,
        }
    }

    /// Attach a correlation id and the failing pipeline stage.
    ///
    /// Errors that already carry a correlation id are returned unchanged.
    pub fn in_operation(self, correlation_id: &str, stage: impl fmt::Display) -> Self {
        match self {
            Error::Operation { .. } => self,
            other => Error::Operation {
                correlation_id: correlation_id.to_string(),
                stage: stage.to_string(),
                source: Box::new(other),
            },
        }
    }
}

/// Result of a failed metafile validation check.
///
/// The checks run in a fixed order and the first failing check is reported;
/// each variant lists every offending item found by that check.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Required `chart.*` fields are empty or missing.
    #[error("the fields are missing: {}", fields.join(", "))]
    MissingChartFields { fields: Vec<String> },

    /// Template placeholders reference keys absent from `valuesSchema`.
    #[error("found values that aren't described in valuesSchema section: {}{}", keys.join(", "), format_suggestions(suggestions))]
    UndeclaredKeys {
        keys: Vec<String>,
        /// `(undeclared key, closest declared key)` pairs
        suggestions: Vec<(String, String)>,
    },

    /// `valuesSchema` entries declare a type outside the fixed enumeration.
    #[error("data types errors: {}", invalid.iter().map(|(k, t)| format!("{} (unknown data type: {})", k, t)).collect::<Vec<_>>().join(", "))]
    InvalidTypes { invalid: Vec<(String, String)> },

    /// Templates that do not parse, as `(file path, parser message)` pairs.
    #[error("template errors: {}", errors.iter().map(|(path, message)| format!("{}: {}", path, message)).collect::<Vec<_>>().join(", "))]
    TemplateSyntax { errors: Vec<(String, String)> },
}

fn format_suggestions(suggestions: &[(String, String)]) -> String {
    if suggestions.is_empty() {
        return String::new();
    }
    let hints: Vec<String> = suggestions
        .iter()
        .map(|(key, similar)| {
            format!(
                "\n  hint: '{}' is not declared, did you mean '{}'?",
                key, similar
            )
        })
        .collect();
    hints.concat()
}

/// A convenient type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
