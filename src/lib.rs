//! # Chart Sync Library
//!
//! Core of the `chart-sync` tool, which promotes chart metafiles from a
//! source-of-truth git repository into project repositories. A metafile
//! describes a chart, the files generated from it and the values those
//! files may reference.
//!
//! ## Quick Example
//!
//! ```
//! use chart_sync::metafile::MetaDocument;
//! use chart_sync::validation::validate_metafile;
//!
//! let meta = MetaDocument::from_yaml(br#"
//! chart: { name: app, version: 1.0.0, description: demo }
//! files:
//!   - path: values.yaml
//!     template: true
//!     content: "replicas: {{ .Values.replicas }}"
//! valuesSchema:
//!   replicas: { type: integer, default: 1 }
//! "#).unwrap();
//!
//! assert!(validate_metafile(&meta).is_ok());
//! ```
//!
//! ## Modules
//!
//! - **Credentials (`auth`)**: turns per-repository settings into a token
//!   or SSH key handle passed to every git invocation.
//! - **Repository cache (`cache`)**: one shared working copy per source
//!   repository, initialised once, refreshed on demand, read under a lock.
//! - **Metafile validation (`metafile`, `validation`)**: parsing and the
//!   static checks run before anything is published.
//! - **Generation (`values`, `template`, `generator`)**: values merging,
//!   default injection and template rendering.
//! - **Publishing (`sync`, `staging`)**: the copy pipeline that clones the
//!   destination, writes the files, commits and force-pushes.
//! - **Git plumbing (`git`, `repository`, `retry`)**: the system `git`
//!   binary behind a mockable trait, with deadlines and retries.

pub mod auth;
pub mod cache;
pub mod config;
pub mod defaults;
pub mod error;
pub mod generator;
pub mod git;
pub mod metafile;
pub mod output;
pub mod path;
pub mod repository;
pub mod retry;
pub mod staging;
pub mod suggestions;
pub mod sync;
pub mod template;
pub mod validation;
pub mod values;

#[cfg(test)]
mod path_proptest;
