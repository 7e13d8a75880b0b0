//! Partition key paths, extraction and validation.
//!
//! A partition key is one or more `/`-delimited field paths. The extracted
//! value is always a sequence with one element per path, so single-path and
//! composite (hierarchical) keys share one code path.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::document::{describe_value, Document};
use crate::error::{MigrateError, Result};

/// Ordered list of partition key paths, e.g. `["/tenantId", "/address/zip"]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionKeySpec {
    pub paths: Vec<String>,
}

impl PartitionKeySpec {
    /// Build and validate a spec.
    pub fn new<I, S>(paths: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let spec = Self {
            paths: paths.into_iter().map(Into::into).collect(),
        };
        spec.validate()?;
        Ok(spec)
    }

    /// Single-path spec.
    pub fn single(path: impl Into<String>) -> Result<Self> {
        Self::new([path.into()])
    }

    /// Check path syntax.
    pub fn validate(&self) -> Result<()> {
        if self.paths.is_empty() {
            return Err(MigrateError::Config(
                "partition key must have at least one path".into(),
            ));
        }
        for path in &self.paths {
            let Some(rest) = path.strip_prefix('/') else {
                return Err(MigrateError::Config(format!(
                    "partition key path '{}' must start with '/'",
                    path
                )));
            };
            if rest.is_empty() || rest.split('/').any(str::is_empty) {
                return Err(MigrateError::Config(format!(
                    "partition key path '{}' has an empty segment",
                    path
                )));
            }
        }
        Ok(())
    }

    /// Number of key paths.
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Whether no key paths are defined.
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Whether `path` (in `/a/b` form) is one of the key paths.
    pub fn contains_path(&self, path: &str) -> bool {
        self.paths.iter().any(|p| p == path)
    }

    /// Top-level field names that carry the key in the stored body.
    pub fn backfill_fields(&self) -> impl Iterator<Item = &str> {
        self.paths.iter().map(|p| backfill_field(p))
    }

    /// Extract the key value for a document without modifying it.
    pub fn extract(&self, doc: &Document) -> PartitionKeyValue {
        PartitionKeyValue(
            self.paths
                .iter()
                .map(|path| lookup_path(doc, path).cloned().unwrap_or(Value::Null))
                .collect(),
        )
    }

    /// Extract and validate the key, then backfill missing key fields.
    ///
    /// On success the document is guaranteed to carry, for every path, a
    /// top-level field named after the path (leading `/` stripped) holding
    /// the resolved value.
    pub fn resolve(&self, doc: &mut Document) -> Result<PartitionKeyValue> {
        let value = self.extract(doc);

        if let Some(idx) = value.first_invalid() {
            return Err(MigrateError::InvalidPartitionKey {
                id: doc.id().unwrap_or("<no id>").to_string(),
                path: self.paths[idx].clone(),
                value: describe_value(value.0.get(idx)),
                document: doc.to_json_string(),
            });
        }

        for (path, element) in self.paths.iter().zip(&value.0) {
            let field = backfill_field(path);
            if !doc.contains_field(field) {
                doc.insert(field, element.clone());
            }
        }

        Ok(value)
    }
}

impl fmt::Display for PartitionKeySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.paths.join(", "))
    }
}

/// The field name used to backfill a path: the path without its leading `/`.
fn backfill_field(path: &str) -> &str {
    path.trim_start_matches('/')
}

/// Walk a `/a/b/c` path through nested mappings.
fn lookup_path<'d>(doc: &'d Document, path: &str) -> Option<&'d Value> {
    let mut segments = path.trim_start_matches('/').split('/');
    let first = segments.next()?;
    let mut current = doc.get(first)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Extracted partition key, one element per key path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionKeyValue(pub Vec<Value>);

impl PartitionKeyValue {
    /// Whether every element is a non-empty scalar.
    pub fn is_valid(&self) -> bool {
        self.first_invalid().is_none()
    }

    fn first_invalid(&self) -> Option<usize> {
        self.0.iter().position(|v| !is_valid_element(v))
    }

    /// Elements in path order.
    pub fn values(&self) -> &[Value] {
        &self.0
    }

    /// Stable string form, used by stores as part of the document key.
    pub fn to_key_string(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_default()
    }
}

impl fmt::Display for PartitionKeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_key_string())
    }
}

fn is_valid_element(value: &Value) -> bool {
    match value {
        Value::Null | Value::Array(_) | Value::Object(_) => false,
        Value::String(s) => !s.is_empty(),
        Value::Bool(_) | Value::Number(_) => true,
    }
}
