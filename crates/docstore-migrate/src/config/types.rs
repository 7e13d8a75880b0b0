//! Configuration type definitions.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;
use crate::sanitize::{DocumentSanitizer, SanitizationRules, SyntheticKind};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Account documents are read from.
    pub source: StoreConfig,

    /// Account documents are written to.
    pub target: StoreConfig,

    /// Migration behavior configuration.
    #[serde(default)]
    pub migration: MigrationConfig,
}

/// Backend of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    /// In-process account, empty at startup.
    Memory,
    /// Account persisted as a JSON snapshot file.
    JsonFile,
}

/// One document account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Store backend (default: json_file).
    #[serde(default = "default_store_kind")]
    pub r#type: StoreKind,

    /// Display name for logs and reports.
    #[serde(default)]
    pub name: Option<String>,

    /// Snapshot file for `json_file` stores.
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Upper bound on documents returned per page, regardless of the
    /// requested batch size. Only honored by `memory` stores.
    #[serde(default)]
    pub max_page_size: Option<usize>,
}

impl StoreConfig {
    /// JSON file store at `path`.
    pub fn json_file(path: impl Into<PathBuf>) -> Self {
        Self {
            r#type: StoreKind::JsonFile,
            name: None,
            path: Some(path.into()),
            max_page_size: None,
        }
    }

    /// In-memory store named `name`.
    pub fn memory(name: impl Into<String>) -> Self {
        Self {
            r#type: StoreKind::Memory,
            name: Some(name.into()),
            path: None,
            max_page_size: None,
        }
    }

    /// Name used in logs: the configured name, else the file path.
    pub fn display_name(&self) -> String {
        match (&self.name, &self.path) {
            (Some(name), _) => name.clone(),
            (None, Some(path)) => path.display().to_string(),
            (None, None) => "memory".to_string(),
        }
    }
}

/// Migration behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Page size hint for source scans (default: 100).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Attempts per document and per scan page (default: 3).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Linear backoff unit in milliseconds (default: 500).
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Replace sensitive fields with synthetic values (default: false).
    #[serde(default)]
    pub sanitize: bool,

    /// Extra or overriding sanitization rules: field name -> generator kind.
    #[serde(default)]
    pub sanitize_fields: BTreeMap<String, SyntheticKind>,

    /// Restrict the run to one database.
    #[serde(default)]
    pub database: Option<String>,

    /// Restrict the run to one collection (requires `database`).
    #[serde(default)]
    pub container: Option<String>,

    /// Collections migrated concurrently (default: 1).
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Count documents on both sides after each collection (default: true).
    #[serde(default = "default_true")]
    pub verify: bool,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            sanitize: false,
            sanitize_fields: BTreeMap::new(),
            database: None,
            container: None,
            workers: default_workers(),
            verify: true,
        }
    }
}

impl MigrationConfig {
    /// Retry policy for document writes and page fetches.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, Duration::from_millis(self.retry_backoff_ms))
    }

    /// Sanitizer built from the default rules plus `sanitize_fields`, or
    /// `None` when sanitization is off.
    pub fn sanitizer(&self) -> Option<DocumentSanitizer> {
        self.sanitize.then(|| {
            DocumentSanitizer::new(SanitizationRules::default().extend(&self.sanitize_fields))
        })
    }
}

fn default_store_kind() -> StoreKind {
    StoreKind::JsonFile
}

fn default_batch_size() -> usize {
    100
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_workers() -> usize {
    1
}

fn default_true() -> bool {
    true
}
