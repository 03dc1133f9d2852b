//! # Chart Sync CLI
//!
//! Binary entry point for the `chart-sync` command-line tool. It parses the
//! arguments with `clap` and dispatches to one of the commands in
//! [`commands`]; everything else lives in the `chart_sync` library.

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    cli.execute()
}
