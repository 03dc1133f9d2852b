//! # CLI Command Implementations
//!
//! One module per `chart-sync` subcommand. Each defines an `Args` struct
//! derived with `clap` and an `execute` function that calls into the
//! `chart_sync` library. Helpers shared by several commands live here.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};

use chart_sync::config::AppConfig;
use chart_sync::output::OutputConfig;
use chart_sync::suggestions;
use chart_sync::values::Values;

pub mod check;
pub mod copy;
pub mod generate;
pub mod validate;

/// Global options resolved once for every command.
#[derive(Debug)]
pub struct Context {
    pub config_path: PathBuf,
    pub out: OutputConfig,
}

impl Context {
    /// Load the process configuration, failing with hints when it is absent.
    pub fn load_config(&self) -> Result<AppConfig> {
        if !self.config_path.is_file() {
            return Err(suggestions::config_not_found(&self.config_path));
        }
        Ok(AppConfig::load(&self.config_path)?)
    }
}

/// Merge `--values` files in order, then apply `--set` overrides.
pub fn load_values(files: &[PathBuf], sets: &[String]) -> Result<Values> {
    for file in files {
        if !file.is_file() {
            anyhow::bail!("Values file not found: {}", file.display());
        }
    }
    let mut values = Values::merge_files(files)?;
    for expression in sets {
        if Values::parse_set(expression).is_err() {
            return Err(suggestions::invalid_set(expression));
        }
    }
    values.apply_sets(sets)?;
    Ok(values)
}

/// Read a JSON Schema document for values pre-validation.
pub fn load_json_schema(path: &Path) -> Result<serde_json::Value> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read values schema {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("Values schema {} is not valid JSON", path.display()))
}
