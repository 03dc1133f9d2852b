//! Values tree addressed by dot-paths
//!
//! [`Value`] is the explicit variant used for everything a values document
//! can hold. [`Values`] is the top-level mapping, with `get`/`set` by
//! dot-path (`image.tag`) and a deep merge used to layer documents: schema
//! defaults, then value files in order, then caller overrides.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A dynamically typed value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Name of the `valuesSchema` type this value satisfies.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Value::Null => true,
            Value::String(s) => s.is_empty(),
            Value::List(items) => items.is_empty(),
            Value::Map(map) => map.is_empty(),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::String(s) => f.write_str(s),
            Value::List(_) | Value::Map(_) => {
                let text = serde_json::to_string(self).map_err(|_| fmt::Error)?;
                f.write_str(&text)
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// Merged values handed to templates
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Values(BTreeMap<String, Value>);

impl Values {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_map(&self) -> &BTreeMap<String, Value> {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Value at a dot-path, if every segment resolves.
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut current = self.0.get(segments.next()?)?;
        for segment in segments {
            match current {
                Value::Map(map) => current = map.get(segment)?,
                _ => return None,
            }
        }
        Some(current)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// Set the value at a dot-path, creating intermediate maps.
    ///
    /// Intermediate segments holding a non-map value are replaced by a map.
    /// Empty segments are ignored; an all-empty path is a no-op.
    pub fn set(&mut self, path: &str, value: Value) {
        let segments: Vec<&str> = path.split('.').filter(|s| !s.is_empty()).collect();
        let Some((last, parents)) = segments.split_last() else {
            return;
        };

        let mut current = &mut self.0;
        for segment in parents {
            let slot = current
                .entry(segment.to_string())
                .or_insert_with(|| Value::Map(BTreeMap::new()));
            if !matches!(slot, Value::Map(_)) {
                *slot = Value::Map(BTreeMap::new());
            }
            let Value::Map(map) = slot else {
                return;
            };
            current = map;
        }
        current.insert(last.to_string(), value);
    }

    /// Deep-merge `other` on top of `self`; `other` wins on conflicts.
    pub fn merge(&mut self, other: Values) {
        merge_maps(&mut self.0, other.0);
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let raw: serde_yaml::Value = serde_yaml::from_str(text)?;
        match raw {
            serde_yaml::Value::Null => Ok(Self::new()),
            serde_yaml::Value::Mapping(_) => Ok(serde_yaml::from_value(raw)?),
            other => Err(Error::Values {
                message: format!("values document must be a mapping, found {:?}", other),
            }),
        }
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let raw: serde_json::Value = serde_json::from_str(text)?;
        match raw {
            serde_json::Value::Null => Ok(Self::new()),
            serde_json::Value::Object(_) => Ok(serde_json::from_value(raw)?),
            other => Err(Error::Values {
                message: format!("values document must be an object, found {}", other),
            }),
        }
    }

    /// Load a values document; `.json` files are JSON, anything else YAML.
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::FileNotFound {
                path: path.display().to_string(),
            });
        }
        let text = fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json_str(&text)
        } else {
            Self::from_yaml_str(&text)
        }
    }

    /// Load and merge several documents; later files win.
    pub fn merge_files<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        let mut merged = Self::new();
        for path in paths {
            merged.merge(Self::from_file(path.as_ref())?);
        }
        Ok(merged)
    }

    /// Parse a `key.path=value` override. The value is read as a YAML scalar,
    /// so `replicas=3` yields an integer and `name=web` a string.
    pub fn parse_set(expression: &str) -> Result<(String, Value)> {
        let Some((key, raw)) = expression.split_once('=') else {
            return Err(Error::Values {
                message: format!("expected key=value, got '{}'", expression),
            });
        };
        let key = key.trim();
        if key.is_empty() || key.split('.').any(str::is_empty) {
            return Err(Error::Values {
                message: format!("invalid key in '{}'", expression),
            });
        }
        let value = if raw.is_empty() {
            Value::String(String::new())
        } else {
            serde_yaml::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
        };
        Ok((key.to_string(), value))
    }

    /// Apply `key.path=value` overrides in order.
    pub fn apply_sets<S: AsRef<str>>(&mut self, expressions: &[S]) -> Result<()> {
        for expression in expressions {
            let (key, value) = Self::parse_set(expression.as_ref())?;
            self.set(&key, value);
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

fn merge_maps(base: &mut BTreeMap<String, Value>, overlay: BTreeMap<String, Value>) {
    for (key, value) in overlay {
        if let Value::Map(incoming) = value {
            if let Some(Value::Map(existing)) = base.get_mut(&key) {
                merge_maps(existing, incoming);
                continue;
            }
            base.insert(key, Value::Map(incoming));
        } else {
            base.insert(key, value);
        }
    }
}
