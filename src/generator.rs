//! Chart file generation
//!
//! The generator turns a [`MetaDocument`] plus caller values into output
//! files. Values are prepared once per run:
//!
//! 1. schema defaults are injected for every declared key the values lack;
//! 2. `environment` is resolved (explicit argument, then the existing
//!    `environment` value, then empty) and written back.
//!
//! Then each declared file is processed in document order: its output path
//! is the rendered `outputFilename` or the verbatim `path`, its content is
//! rendered when `template` is set, and the result is written under the
//! output directory. The same inputs always produce the same bytes.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::error::{Error, Result};
use crate::metafile::{FileSpec, MetaDocument};
use crate::path::checked_relative_path;
use crate::template;
use crate::values::{Value, Values};

/// Key under which the resolved environment is exposed to templates.
pub const ENVIRONMENT_KEY: &str = "environment";

/// Per-run generation settings
#[derive(Debug, Clone)]
pub struct GenerationContext {
    /// Explicit environment; overrides any `environment` in the values.
    pub environment: Option<String>,
    pub correlation_id: String,
    pub output_dir: PathBuf,
}

impl GenerationContext {
    pub fn new(output_dir: impl Into<PathBuf>, correlation_id: impl Into<String>) -> Self {
        Self {
            environment: None,
            correlation_id: correlation_id.into(),
            output_dir: output_dir.into(),
        }
    }

    pub fn with_environment(mut self, environment: Option<String>) -> Self {
        self.environment = environment.filter(|env| !env.is_empty());
        self
    }
}

/// A file written by the generator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFile {
    /// Path relative to the output directory
    pub relative_path: PathBuf,
    pub content: String,
}

impl GeneratedFile {
    pub fn absolute_path(&self, output_dir: &Path) -> PathBuf {
        output_dir.join(&self.relative_path)
    }
}

/// Inject schema defaults for declared keys missing from `values`.
///
/// Returns the keys that are missing and have no default. Applying the
/// defaults twice yields the same values as applying them once.
pub fn apply_defaults(
    meta: &MetaDocument,
    values: &mut Values,
    correlation_id: &str,
) -> Vec<String> {
    let mut without_default = Vec::new();
    for (key, entry) in &meta.values_schema {
        if values.contains(key) {
            continue;
        }
        match &entry.default {
            Some(default) => {
                debug!("[{}] Using default for '{}'", correlation_id, key);
                values.set(key, default.clone());
            }
            None => {
                warn!(
                    "[{}] No value and no default for '{}'; it will render empty",
                    correlation_id, key
                );
                without_default.push(key.clone());
            }
        }
    }
    without_default
}

/// Decide the environment and store it under `environment`.
pub fn resolve_environment(
    values: &mut Values,
    explicit: Option<&str>,
    correlation_id: &str,
) -> String {
    let resolved = match explicit.filter(|env| !env.is_empty()) {
        Some(env) => env.to_string(),
        None => match values.get(ENVIRONMENT_KEY) {
            Some(Value::Null) | None => String::new(),
            Some(existing) => existing.to_string(),
        },
    };
    if resolved.is_empty() {
        warn!("[{}] No environment set; rendering with an empty environment", correlation_id);
    }
    values.set(ENVIRONMENT_KEY, Value::String(resolved.clone()));
    resolved
}

/// Renders and writes the files declared by a metafile.
#[derive(Debug, Clone, Default)]
pub struct Generator;

impl Generator {
    pub fn new() -> Self {
        Self
    }

    /// Merge defaults and the environment into a copy of `values`.
    pub fn prepare_values(
        &self,
        meta: &MetaDocument,
        values: &Values,
        ctx: &GenerationContext,
    ) -> Values {
        let mut merged = values.clone();
        apply_defaults(meta, &mut merged, &ctx.correlation_id);
        resolve_environment(&mut merged, ctx.environment.as_deref(), &ctx.correlation_id);
        merged
    }

    /// Generate every declared file into `ctx.output_dir`.
    pub fn generate(
        &self,
        meta: &MetaDocument,
        values: &Values,
        ctx: &GenerationContext,
    ) -> Result<Vec<GeneratedFile>> {
        let merged = self.prepare_values(meta, values, ctx);
        let mut generated = Vec::with_capacity(meta.files.len());
        for spec in &meta.files {
            generated.push(self.write_file(spec, &merged, ctx)?);
        }
        info!(
            "[{}] Generated {} file(s) for chart '{}' into {}",
            ctx.correlation_id,
            generated.len(),
            meta.chart.name,
            ctx.output_dir.display()
        );
        Ok(generated)
    }

    /// Generate only the file declared with `path`.
    pub fn generate_only(
        &self,
        meta: &MetaDocument,
        values: &Values,
        ctx: &GenerationContext,
        path: &str,
    ) -> Result<GeneratedFile> {
        let spec = meta.file(path).ok_or_else(|| Error::FileNotFound {
            path: path.to_string(),
        })?;
        let merged = self.prepare_values(meta, values, ctx);
        self.write_file(spec, &merged, ctx)
    }

    /// Resolve the output path and content of one file without writing it.
    pub fn render_file(&self, spec: &FileSpec, values: &Values) -> Result<GeneratedFile> {
        let output_path = match spec.output_template() {
            Some(name_template) => template::render(&spec.path, name_template, values)?,
            None => spec.path.clone(),
        };
        let relative_path = checked_relative_path(output_path.trim())?.to_path_buf();

        let content = if spec.template {
            template::render(&spec.path, &spec.content, values)?
        } else {
            spec.content.clone()
        };

        Ok(GeneratedFile {
            relative_path,
            content,
        })
    }

    fn write_file(
        &self,
        spec: &FileSpec,
        values: &Values,
        ctx: &GenerationContext,
    ) -> Result<GeneratedFile> {
        let file = self.render_file(spec, values)?;
        let target = file.absolute_path(&ctx.output_dir);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::Filesystem {
                message: format!("failed to create {}: {}", parent.display(), e),
            })?;
        }
        fs::write(&target, file.content.as_bytes()).map_err(|e| Error::Filesystem {
            message: format!("failed to write {}: {}", target.display(), e),
        })?;
        debug!("[{}] Wrote {}", ctx.correlation_id, target.display());
        Ok(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const METAFILE: &str = r#"
chart:
  name: app
  version: 1.0.0
  description: demo
files:
  - path: values.yaml
    template: true
    outputFilename: "values-{{.Values.environment}}.yaml"
    content: |
      image: {{ .Values.image.repository }}:{{ .Values.image.tag }}
      replicas: {{ .Values.replicas }}
      env: {{ .Values.environment }}
  - path: templates/NOTES.txt
    content: "Raw {{ .Values.not_rendered }}\n"
valuesSchema:
  environment: { type: string }
  image.repository: { type: string, default: nginx }
  image.tag: { type: string }
  replicas: { type: integer, default: 2 }
"#;

    fn meta() -> MetaDocument {
        MetaDocument::from_yaml(METAFILE.as_bytes()).unwrap()
    }

    #[test]
    fn test_output_filename_uses_environment() {
        let temp_dir = TempDir::new().unwrap();
        let ctx =
            GenerationContext::new(temp_dir.path(), "cid").with_environment(Some("prod".into()));
        let values = Values::from_yaml_str("image:\n  tag: '1.25'\n").unwrap();

        let files = Generator::new().generate(&meta(), &values, &ctx).unwrap();

        assert_eq!(files[0].relative_path, PathBuf::from("values-prod.yaml"));
        let written = fs::read_to_string(temp_dir.path().join("values-prod.yaml")).unwrap();
        assert_eq!(written, "image: nginx:1.25\nreplicas: 2\nenv: prod\n");
    }

    #[test]
    fn test_non_template_content_is_copied_verbatim() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = GenerationContext::new(temp_dir.path(), "cid");

        Generator::new().generate(&meta(), &Values::new(), &ctx).unwrap();

        let notes = fs::read_to_string(temp_dir.path().join("templates/NOTES.txt")).unwrap();
        assert_eq!(notes, "Raw {{ .Values.not_rendered }}\n");
    }

    #[test]
    fn test_generation_is_deterministic() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        let values = Values::from_yaml_str("environment: qa\nimage:\n  tag: x\n").unwrap();

        let a = Generator::new()
            .generate(&meta(), &values, &GenerationContext::new(first.path(), "one"))
            .unwrap();
        let b = Generator::new()
            .generate(&meta(), &values, &GenerationContext::new(second.path(), "two"))
            .unwrap();

        assert_eq!(a, b);
        for file in &a {
            assert_eq!(
                fs::read(file.absolute_path(first.path())).unwrap(),
                fs::read(file.absolute_path(second.path())).unwrap()
            );
        }
    }

    #[test]
    fn test_apply_defaults_is_idempotent() {
        let meta = meta();
        let mut once = Values::new();
        let missing = apply_defaults(&meta, &mut once, "cid");
        let mut twice = once.clone();
        apply_defaults(&meta, &mut twice, "cid");

        assert_eq!(once, twice);
        assert_eq!(missing, vec!["environment", "image.tag"]);
        assert_eq!(once.get("image.repository"), Some(&Value::from("nginx")));
    }

    #[test]
    fn test_defaults_do_not_override_values() {
        let mut values = Values::from_yaml_str("replicas: 5\n").unwrap();
        apply_defaults(&meta(), &mut values, "cid");
        assert_eq!(values.get("replicas"), Some(&Value::Integer(5)));
    }

    #[test]
    fn test_environment_precedence() {
        let mut values = Values::from_yaml_str("environment: staging\n").unwrap();
        assert_eq!(resolve_environment(&mut values, Some("prod"), "cid"), "prod");
        assert_eq!(values.get("environment"), Some(&Value::from("prod")));

        let mut values = Values::from_yaml_str("environment: staging\n").unwrap();
        assert_eq!(resolve_environment(&mut values, None, "cid"), "staging");

        let mut values = Values::new();
        assert_eq!(resolve_environment(&mut values, Some(""), "cid"), "");
        assert_eq!(values.get("environment"), Some(&Value::from("")));
    }

    #[test]
    fn test_missing_environment_renders_empty_path_segment() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = GenerationContext::new(temp_dir.path(), "cid");

        let files = Generator::new().generate(&meta(), &Values::new(), &ctx).unwrap();
        assert_eq!(files[0].relative_path, PathBuf::from("values-.yaml"));
    }

    #[test]
    fn test_output_path_cannot_escape() {
        let temp_dir = TempDir::new().unwrap();
        let meta = MetaDocument::from_yaml(
            b"chart: {name: a, version: '1', description: d}\nfiles:\n  - path: x\n    outputFilename: '../{{ .Values.name }}'\nvaluesSchema:\n  name: {type: string}\n",
        )
        .unwrap();
        let values = Values::from_yaml_str("name: evil\n").unwrap();

        let err = Generator::new()
            .generate(&meta, &values, &GenerationContext::new(temp_dir.path(), "cid"))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidPath { .. }));
    }

    #[test]
    fn test_generate_only() {
        let temp_dir = TempDir::new().unwrap();
        let ctx =
            GenerationContext::new(temp_dir.path(), "cid").with_environment(Some("dev".into()));

        let file = Generator::new()
            .generate_only(&meta(), &Values::new(), &ctx, "values.yaml")
            .unwrap();

        assert_eq!(file.relative_path, PathBuf::from("values-dev.yaml"));
        assert!(!temp_dir.path().join("templates").exists());

        let err = Generator::new()
            .generate_only(&meta(), &Values::new(), &ctx, "missing.yaml")
            .unwrap_err();
        assert!(matches!(err, Error::FileNotFound { .. }));
    }
}
