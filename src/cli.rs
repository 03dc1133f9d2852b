//! CLI argument parsing and command dispatch

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use chart_sync::defaults::{CONFIG_ENV, DEFAULT_CONFIG_PATH};
use chart_sync::output::{ColorChoice, OutputConfig};

use crate::commands::{self, Context};

/// Chart Sync - Promote chart metafiles between git repositories
#[derive(Parser, Debug)]
#[command(name = "chart-sync")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Path to the process configuration file
    #[arg(
        short,
        long,
        global = true,
        value_name = "FILE",
        env = CONFIG_ENV,
        default_value = DEFAULT_CONFIG_PATH
    )]
    config: PathBuf,

    /// Colorize output
    #[arg(
        long,
        global = true,
        value_name = "WHEN",
        value_enum,
        default_value_t = ColorChoice::Auto
    )]
    color: ColorChoice,

    /// Set log level (error, warn, info, debug, trace); RUST_LOG takes precedence
    #[arg(long, global = true, value_name = "LEVEL", default_value = "info")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Copy a metafile from the source repository and publish it to the destination
    Copy(commands::copy::CopyArgs),

    /// Check that a repository is reachable with the given credentials
    Check(commands::check::CheckArgs),

    /// Validate a local metafile and optional values
    Validate(commands::validate::ValidateArgs),

    /// Render the files declared by a local metafile
    Generate(commands::generate::GenerateArgs),
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> Result<()> {
        init_logging(&self.log_level);
        let ctx = Context {
            config_path: self.config,
            out: OutputConfig::from_choice(self.color),
        };

        match self.command {
            Commands::Copy(args) => commands::copy::execute(args, &ctx),
            Commands::Check(args) => commands::check::execute(args, &ctx),
            Commands::Validate(args) => commands::validate::execute(args, &ctx),
            Commands::Generate(args) => commands::generate::execute(args, &ctx),
        }
    }
}

fn init_logging(level: &str) {
    let env = env_logger::Env::default().default_filter_or(level);
    // A second init (tests driving the CLI in-process) is harmless.
    let _ = env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .try_init();
}
