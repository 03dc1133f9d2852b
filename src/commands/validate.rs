//! # Validate Command Implementation
//!
//! Runs the metafile validator on a local file, the same checks the publish
//! pipeline runs before anything is cloned. With `--values`, the values are
//! also checked against `valuesSchema` (required keys, types, options) and,
//! with `--values-schema`, against a JSON Schema document.
//!
//! This command is read-only and needs no configuration file.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use chart_sync::generator::apply_defaults;
use chart_sync::metafile::MetaDocument;
use chart_sync::output::Mark;
use chart_sync::suggestions;
use chart_sync::validation::{
    check_values, check_values_consistency, validate_metafile, validate_values_against_json_schema,
};

use super::{load_json_schema, load_values, Context};

/// Validate a local metafile
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Metafile to validate
    #[arg(value_name = "METAFILE")]
    pub metafile: PathBuf,

    /// Values files to check against valuesSchema (later files win)
    #[arg(long = "values", value_name = "FILE")]
    pub values: Vec<PathBuf>,

    /// Override a value with a dot-separated key (e.g. image.tag=1.2.0)
    #[arg(long = "set", value_name = "KEY=VALUE")]
    pub set: Vec<String>,

    /// JSON Schema document the values must satisfy
    #[arg(long, value_name = "FILE")]
    pub values_schema: Option<PathBuf>,

    /// Fail on warnings (values missing for declared keys)
    #[arg(long)]
    pub strict: bool,
}

/// Execute the `validate` command.
pub fn execute(args: ValidateArgs, ctx: &Context) -> Result<()> {
    let out = &ctx.out;
    if !args.metafile.is_file() {
        return Err(suggestions::metafile_not_found(&args.metafile));
    }

    let meta = MetaDocument::from_file(&args.metafile)?;
    if let Err(e) = validate_metafile(&meta) {
        println!("{}", out.line(Mark::Err, &e.to_string()));
        anyhow::bail!("Metafile {} is invalid", args.metafile.display());
    }
    println!(
        "{}",
        out.line(
            Mark::Ok,
            &format!(
                "{} is valid (chart {} {}, {} file(s), {} declared value(s))",
                args.metafile.display(),
                meta.chart.name,
                meta.chart.version,
                meta.files.len(),
                meta.values_schema.len()
            )
        )
    );

    let checks_values =
        !args.values.is_empty() || !args.set.is_empty() || args.values_schema.is_some();
    if !checks_values {
        return Ok(());
    }

    let provided = load_values(&args.values, &args.set)?;
    let mut has_errors = false;

    if let Some(path) = &args.values_schema {
        let schema = load_json_schema(path)?;
        match validate_values_against_json_schema(&provided, &schema) {
            Ok(()) => println!("{}", out.line(Mark::Ok, "values satisfy the JSON Schema")),
            Err(e) => {
                println!("{}", out.line(Mark::Err, &e.to_string()));
                has_errors = true;
            }
        }
    }

    let declared = meta.declared_keys();
    let missing = check_values_consistency(&provided, &declared);
    for key in &missing {
        println!(
            "{}",
            out.line(Mark::Warn, &format!("{} is declared but has no value", key))
        );
    }

    let mut resolved = provided.clone();
    apply_defaults(&meta, &mut resolved, "validate");
    let issues = check_values(&meta, &resolved);
    for issue in &issues {
        println!("{}", out.line(Mark::Err, &issue.to_string()));
    }
    has_errors |= !issues.is_empty();

    if has_errors {
        anyhow::bail!("Values do not match the metafile");
    }
    if args.strict && !missing.is_empty() {
        anyhow::bail!("{} declared value(s) missing (--strict)", missing.len());
    }
    println!("{}", out.line(Mark::Ok, "values match valuesSchema"));
    Ok(())
}
