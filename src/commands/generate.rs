//! # Generate Command Implementation
//!
//! Renders the files declared by a local metafile into `--output`, using the
//! same generator as `copy --render`. Values are merged from `--values`
//! files and `--set` overrides; `--only` limits generation to one declared
//! file.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use chart_sync::generator::{GenerationContext, Generator};
use chart_sync::metafile::MetaDocument;
use chart_sync::output::Mark;
use chart_sync::suggestions;
use chart_sync::validation::validate_metafile;

use super::{load_values, Context};

/// Render the files declared by a local metafile
#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Metafile to render
    #[arg(value_name = "METAFILE")]
    pub metafile: PathBuf,

    /// Directory that receives the generated files
    #[arg(short, long, value_name = "DIR")]
    pub output: PathBuf,

    /// Values files merged in order (later files win)
    #[arg(long = "values", value_name = "FILE")]
    pub values: Vec<PathBuf>,

    /// Override a value with a dot-separated key (e.g. image.tag=1.2.0)
    #[arg(long = "set", value_name = "KEY=VALUE")]
    pub set: Vec<String>,

    /// Environment exposed to templates as `environment`
    #[arg(long = "env", value_name = "ENV")]
    pub environment: Option<String>,

    /// Generate only the file declared with this path
    #[arg(long, value_name = "PATH")]
    pub only: Option<String>,
}

/// Execute the `generate` command.
pub fn execute(args: GenerateArgs, ctx: &Context) -> Result<()> {
    if !args.metafile.is_file() {
        return Err(suggestions::metafile_not_found(&args.metafile));
    }
    let meta = MetaDocument::from_file(&args.metafile)?;
    validate_metafile(&meta)?;

    let values = load_values(&args.values, &args.set)?;
    let gen_ctx = GenerationContext::new(&args.output, "generate")
        .with_environment(args.environment.clone());
    let generator = Generator::new();

    let files = match &args.only {
        Some(path) => {
            if meta.file(path).is_none() {
                let declared: Vec<&str> = meta.files.iter().map(|f| f.path.as_str()).collect();
                return Err(suggestions::unknown_file(path, &declared));
            }
            vec![generator.generate_only(&meta, &values, &gen_ctx, path)?]
        }
        None => generator.generate(&meta, &values, &gen_ctx)?,
    };

    let out = &ctx.out;
    for file in &files {
        println!(
            "{}",
            out.line(
                Mark::Ok,
                &format!("generated {}", file.absolute_path(&args.output).display())
            )
        );
    }
    Ok(())
}
