//! # Check Command Implementation
//!
//! Validates repository parameters and contacts the remote with
//! `git ls-remote`, without touching the local filesystem. Missing
//! parameters are all reported together. The configuration file is
//! optional here; when present, its timeout and retry settings apply.

use anyhow::Result;
use clap::Args;
use log::debug;

use chart_sync::config::AppConfig;
use chart_sync::output::Mark;
use chart_sync::sync::CheckRequest;

use super::Context;

/// Check that a repository is reachable with the given credentials
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Repository URL
    #[arg(long = "repo", value_name = "URL", default_value = "")]
    pub repo_name: String,

    /// User name for the repository
    #[arg(long, value_name = "NAME", default_value = "")]
    pub user: String,

    /// Password or token for the repository
    #[arg(
        long,
        value_name = "TOKEN",
        env = "CHART_SYNC_CHECK_SECRET",
        hide_env_values = true,
        default_value = ""
    )]
    pub secret: String,

    /// Correlation id for log lines; generated when omitted
    #[arg(long, value_name = "ID")]
    pub correlation_id: Option<String>,
}

/// Execute the `check` command.
pub fn execute(args: CheckArgs, ctx: &Context) -> Result<()> {
    let config = if ctx.config_path.is_file() {
        ctx.load_config()?
    } else {
        debug!(
            "No configuration at {}; checking with default settings",
            ctx.config_path.display()
        );
        AppConfig::default()
    };

    let request = CheckRequest {
        repo_name: args.repo_name,
        user: args.user,
        credential: args.secret,
        correlation_id: args.correlation_id,
    };
    let outcome = config.synchronizer().check(&request)?;

    let out = &ctx.out;
    println!(
        "{}",
        out.line(
            Mark::Ok,
            &format!("{} is reachable [{}]", request.repo_name, outcome.correlation_id)
        )
    );
    if !outcome.branches.is_empty() {
        println!("   Branches: {}", outcome.branches.join(", "));
    }
    Ok(())
}
