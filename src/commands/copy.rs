//! # Copy Command Implementation
//!
//! Runs the publish pipeline once: fetch `--file` from the configured
//! source repository, validate it, and publish it (plus the rendered chart
//! files with `--render`) to the configured destination as a new commit.
//!
//! Secrets come from `--source-secret` / `--destination-secret` or the
//! `CHART_SYNC_SOURCE_SECRET` / `CHART_SYNC_DESTINATION_SECRET` variables;
//! they are never read from the configuration file.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use chart_sync::config::RepositorySettings;
use chart_sync::output::Mark;
use chart_sync::suggestions;
use chart_sync::sync::{CopyRequest, RenderOptions};

use super::{load_json_schema, load_values, Context};

/// Copy a metafile between repositories and publish it
#[derive(Args, Debug)]
pub struct CopyArgs {
    /// Path of the metafile in the source repository
    #[arg(short, long, value_name = "NAME")]
    pub file: String,

    /// Directory in the destination repository that receives the file
    #[arg(long, value_name = "DIR", default_value = "")]
    pub subfolder: String,

    /// Also render the chart files declared by the metafile
    #[arg(long)]
    pub render: bool,

    /// Values files merged in order (later files win); implies --render
    #[arg(long = "values", value_name = "FILE")]
    pub values: Vec<PathBuf>,

    /// Override a value with a dot-separated key (e.g. image.tag=1.2.0)
    #[arg(long = "set", value_name = "KEY=VALUE")]
    pub set: Vec<String>,

    /// Environment exposed to templates as `environment`
    #[arg(long = "env", value_name = "ENV")]
    pub environment: Option<String>,

    /// JSON Schema the values must satisfy before anything is published
    #[arg(long, value_name = "FILE")]
    pub values_schema: Option<PathBuf>,

    /// Correlation id for log lines; generated when omitted
    #[arg(long, value_name = "ID")]
    pub correlation_id: Option<String>,

    /// Secret for the source repository
    #[arg(long, value_name = "TOKEN", env = "CHART_SYNC_SOURCE_SECRET", hide_env_values = true)]
    pub source_secret: Option<String>,

    /// Secret for the destination repository
    #[arg(
        long,
        value_name = "TOKEN",
        env = "CHART_SYNC_DESTINATION_SECRET",
        hide_env_values = true
    )]
    pub destination_secret: Option<String>,
}

impl CopyArgs {
    fn wants_render(&self) -> bool {
        self.render
            || !self.values.is_empty()
            || !self.set.is_empty()
            || self.values_schema.is_some()
    }

    fn render_options(&self) -> Result<Option<RenderOptions>> {
        if !self.wants_render() {
            return Ok(None);
        }
        let values_schema = match &self.values_schema {
            Some(path) => Some(load_json_schema(path)?),
            None => None,
        };
        Ok(Some(RenderOptions {
            values: load_values(&self.values, &self.set)?,
            environment: self.environment.clone(),
            values_schema,
        }))
    }
}

fn require_secret<'a>(
    settings: &RepositorySettings,
    secret: Option<&'a str>,
    side: &str,
    env_var: &str,
) -> Result<Option<&'a str>> {
    let secret = secret.filter(|s| !s.is_empty());
    if secret.is_none() && !settings.use_ssh {
        return Err(suggestions::missing_secret(side, env_var));
    }
    Ok(secret)
}

/// Execute the `copy` command.
pub fn execute(args: CopyArgs, ctx: &Context) -> Result<()> {
    let config = ctx.load_config()?;
    let source_secret = require_secret(
        &config.source,
        args.source_secret.as_deref(),
        "source",
        "CHART_SYNC_SOURCE_SECRET",
    )?;
    let destination_secret = require_secret(
        &config.destination,
        args.destination_secret.as_deref(),
        "destination",
        "CHART_SYNC_DESTINATION_SECRET",
    )?;

    let request = CopyRequest {
        source: config.source_location(source_secret),
        destination: config.destination_location(destination_secret),
        file_name: args.file.clone(),
        sub_folder: args.subfolder.clone(),
        correlation_id: args.correlation_id.clone(),
        render: args.render_options()?,
    };

    let outcome = config.synchronizer().copy(&request)?;

    let out = &ctx.out;
    for path in &outcome.written {
        println!("{}", out.line(Mark::Info, &format!("wrote {}", path.display())));
    }
    match &outcome.commit {
        Some(commit) => println!(
            "{}",
            out.line(
                Mark::Push,
                &format!(
                    "published {} to {}@{} as {} [{}]",
                    args.file,
                    config.destination.url,
                    config.destination.branch,
                    commit,
                    outcome.correlation_id
                )
            )
        ),
        None => println!(
            "{}",
            out.line(
                Mark::Ok,
                &format!(
                    "destination already up to date, nothing to publish [{}]",
                    outcome.correlation_id
                )
            )
        ),
    }
    Ok(())
}
