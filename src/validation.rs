//! Metafile validation
//!
//! [`validate_metafile`] is the gate run before any rendering or destination
//! work. Its checks run in order and the first one that fails is reported
//! with every offending item:
//!
//! 1. `chart.name`, `chart.version` and `chart.description` are non-empty.
//! 2. Every `Values.<key>` referenced by a file's content or output filename
//!    is declared in `valuesSchema` (exact dot-path match).
//! 3. Every `valuesSchema` type is one of [`VALID_TYPES`].
//! 4. Every output filename, and the content of every templated file,
//!    parses as a template.
//!
//! The remaining functions check a values document against the metafile.
//! They are advisory and separately invocable.

use std::collections::BTreeSet;

use log::warn;

use crate::error::{Error, Result, ValidationError};
use crate::metafile::{MetaDocument, VALID_TYPES};
use crate::suggestions::find_similar;
use crate::template::{self, extract_value_keys};
use crate::values::{Value, Values};

/// Run the static metafile checks.
pub fn validate_metafile(meta: &MetaDocument) -> std::result::Result<(), ValidationError> {
    check_chart_fields(meta)?;
    check_declared_keys(meta)?;
    check_types(meta)?;
    check_templates(meta)?;
    Ok(())
}

fn check_chart_fields(meta: &MetaDocument) -> std::result::Result<(), ValidationError> {
    let chart = &meta.chart;
    let fields: Vec<String> = [
        ("chart.name", &chart.name),
        ("chart.version", &chart.version),
        ("chart.description", &chart.description),
    ]
    .into_iter()
    .filter(|(_, value)| value.trim().is_empty())
    .map(|(field, _)| field.to_string())
    .collect();

    if fields.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::MissingChartFields { fields })
    }
}

/// Undeclared keys referenced by the metafile's files, in order of first use.
pub fn undeclared_keys(meta: &MetaDocument) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut undeclared = Vec::new();
    for file in &meta.files {
        let sources = std::iter::once(file.content.as_str()).chain(file.output_template());
        for source in sources {
            for key in extract_value_keys(source) {
                if !meta.values_schema.contains_key(&key) && seen.insert(key.clone()) {
                    undeclared.push(key);
                }
            }
        }
    }
    undeclared
}

fn check_declared_keys(meta: &MetaDocument) -> std::result::Result<(), ValidationError> {
    let keys = undeclared_keys(meta);
    if keys.is_empty() {
        return Ok(());
    }

    let declared = meta.declared_keys();
    let suggestions = keys
        .iter()
        .filter_map(|key| find_similar(key, &declared).map(|s| (key.clone(), s.to_string())))
        .collect();
    Err(ValidationError::UndeclaredKeys { keys, suggestions })
}

fn check_types(meta: &MetaDocument) -> std::result::Result<(), ValidationError> {
    let invalid: Vec<(String, String)> = meta
        .values_schema
        .iter()
        .filter(|(_, entry)| !entry.has_valid_type())
        .map(|(key, entry)| (key.clone(), entry.value_type.clone()))
        .collect();

    if invalid.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::InvalidTypes { invalid })
    }
}

fn check_templates(meta: &MetaDocument) -> std::result::Result<(), ValidationError> {
    let mut errors = Vec::new();
    for file in &meta.files {
        let content = file.template.then_some(file.content.as_str());
        for source in file.output_template().into_iter().chain(content) {
            if let Err(Error::Template { message, .. }) = template::check(&file.path, source) {
                errors.push((file.path.clone(), message));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::TemplateSyntax { errors })
    }
}

/// Schema keys absent from `values`. Each one is logged as a warning.
pub fn check_values_consistency(values: &Values, schema_keys: &[&str]) -> Vec<String> {
    let missing: Vec<String> = schema_keys
        .iter()
        .filter(|key| !values.contains(key))
        .map(|key| key.to_string())
        .collect();
    for key in &missing {
        warn!("Key '{}' is declared in valuesSchema but missing from values", key);
    }
    missing
}

/// A problem found when checking values against `valuesSchema`.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueIssue {
    /// A required key has neither a value nor a default.
    MissingRequired { key: String },
    /// The value's type does not match the declared type.
    TypeMismatch {
        key: String,
        expected: String,
        found: String,
    },
    /// The value is not one of the declared `options`.
    NotAnOption {
        key: String,
        value: Value,
        options: Vec<Value>,
    },
}

impl std::fmt::Display for ValueIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueIssue::MissingRequired { key } => {
                write!(f, "{}: required value is missing and has no default", key)
            }
            ValueIssue::TypeMismatch {
                key,
                expected,
                found,
            } => write!(f, "{}: expected {}, found {}", key, expected, found),
            ValueIssue::NotAnOption {
                key,
                value,
                options,
            } => {
                let allowed: Vec<String> = options.iter().map(ToString::to_string).collect();
                write!(
                    f,
                    "{}: '{}' is not one of [{}]",
                    key,
                    value,
                    allowed.join(", ")
                )
            }
        }
    }
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match (expected, value) {
        (_, Value::Null) => true,
        ("float", Value::Integer(_)) => true,
        (expected, value) => expected == value.type_name(),
    }
}

/// Check required keys, declared types and allowed options.
pub fn check_values(meta: &MetaDocument, values: &Values) -> Vec<ValueIssue> {
    let mut issues = Vec::new();
    for (key, entry) in &meta.values_schema {
        let Some(value) = values.get(key) else {
            if entry.required && entry.default.is_none() {
                issues.push(ValueIssue::MissingRequired { key: key.clone() });
            }
            continue;
        };

        if entry.has_valid_type() && !type_matches(&entry.value_type, value) {
            issues.push(ValueIssue::TypeMismatch {
                key: key.clone(),
                expected: entry.value_type.clone(),
                found: value.type_name().to_string(),
            });
            continue;
        }

        if !entry.options.is_empty() && !entry.options.contains(value) {
            issues.push(ValueIssue::NotAnOption {
                key: key.clone(),
                value: value.clone(),
                options: entry.options.clone(),
            });
        }
    }
    issues
}

/// Validate `values` against a JSON Schema document.
pub fn validate_values_against_json_schema(
    values: &Values,
    schema: &serde_json::Value,
) -> Result<()> {
    let validator = jsonschema::validator_for(schema).map_err(|e| Error::ValuesSchema {
        errors: vec![format!("invalid schema: {}", e)],
    })?;
    let instance = values.to_json()?;
    let errors: Vec<String> = validator
        .iter_errors(&instance)
        .map(|e| {
            let path = e.instance_path.to_string();
            let path = if path.is_empty() { "(root)".to_string() } else { path };
            format!("{}: {}", path, e)
        })
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(Error::ValuesSchema { errors })
    }
}
