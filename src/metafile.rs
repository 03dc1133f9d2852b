//! Metafile document model
//!
//! A metafile describes a chart (`chart`), the files to generate from it
//! (`files`) and the values those files may reference (`valuesSchema`):
//!
//! ```yaml
//! chart:
//!   name: app
//!   version: 1.2.0
//!   description: Example application
//! files:
//!   - path: values.yaml
//!     template: true
//!     outputFilename: "values-{{ .Values.environment }}.yaml"
//!     content: |
//!       replicas: {{ .Values.replicas }}
//! valuesSchema:
//!   environment: { type: string }
//!   replicas: { type: integer, default: 1 }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Error, Result};
use crate::values::Value;

/// Types a `valuesSchema` entry may declare.
pub const VALID_TYPES: &[&str] = &["string", "integer", "boolean", "float", "list", "map"];

/// Parsed metafile
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaDocument {
    #[serde(default)]
    pub chart: ChartInfo,
    #[serde(default)]
    pub files: Vec<FileSpec>,
    #[serde(default)]
    pub values_schema: BTreeMap<String, ValueSchemaEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartInfo {
    #[serde(default, deserialize_with = "scalar_string")]
    pub name: String,
    #[serde(default, deserialize_with = "scalar_string")]
    pub version: String,
    #[serde(default, deserialize_with = "scalar_string")]
    pub description: String,
}

/// One file declared by the metafile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSpec {
    pub path: String,
    /// Render `content` as a template instead of copying it verbatim.
    #[serde(default)]
    pub template: bool,
    #[serde(default)]
    pub content: String,
    /// Template for the output path; `path` is used verbatim when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_filename: Option<String>,
}

impl FileSpec {
    /// The output path template, ignoring blank values.
    pub fn output_template(&self) -> Option<&str> {
        self.output_filename
            .as_deref()
            .filter(|name| !name.trim().is_empty())
    }
}

/// Declaration of one dot-path key in `valuesSchema`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValueSchemaEntry {
    #[serde(rename = "type", default)]
    pub value_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<Value>,
}

impl ValueSchemaEntry {
    pub fn has_valid_type(&self) -> bool {
        VALID_TYPES.contains(&self.value_type.as_str())
    }
}

impl MetaDocument {
    /// Parse metafile bytes.
    pub fn from_yaml(bytes: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(bytes).map_err(|e| Error::MetafileParse {
            message: format!("metafile is not valid UTF-8: {}", e),
        })?;
        if text.trim().is_empty() {
            return Err(Error::MetafileParse {
                message: "metafile is empty".to_string(),
            });
        }
        serde_yaml::from_str(text).map_err(|e| Error::MetafileParse {
            message: e.to_string(),
        })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::FileNotFound {
                path: path.display().to_string(),
            });
        }
        Self::from_yaml(&fs::read(path)?)
    }

    /// Declared `valuesSchema` keys in sorted order.
    pub fn declared_keys(&self) -> Vec<&str> {
        self.values_schema.keys().map(String::as_str).collect()
    }

    /// Look up a declared file by its `path`.
    pub fn file(&self, path: &str) -> Option<&FileSpec> {
        self.files.iter().find(|file| file.path == path)
    }
}

// `version: 1.0` is a float to YAML; keep it as written.
fn scalar_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error as _;

    match serde_yaml::Value::deserialize(deserializer)? {
        serde_yaml::Value::Null => Ok(String::new()),
        serde_yaml::Value::String(s) => Ok(s),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        serde_yaml::Value::Bool(b) => Ok(b.to_string()),
        other => Err(D::Error::custom(format!(
            "expected a scalar, found {:?}",
            other
        ))),
    }
}
