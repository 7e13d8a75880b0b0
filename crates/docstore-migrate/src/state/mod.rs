//! File-based state management for resume capability.

use crate::core::ScanCursor;
use crate::error::{MigrateError, Result};
use crate::transfer::MigrationResult;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::BTreeMap;
use std::path::Path;

type HmacSha256 = Hmac<Sha256>;

/// Migration state for resume capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationState {
    /// Unique run identifier.
    pub run_id: String,

    /// SHA256 hash of the configuration.
    pub config_hash: String,

    /// When the migration started.
    pub started_at: DateTime<Utc>,

    /// Current run status.
    pub status: RunStatus,

    /// Per-collection state, keyed by `database/collection`.
    pub collections: BTreeMap<String, CollectionState>,

    /// When the migration completed (if finished).
    pub completed_at: Option<DateTime<Utc>>,

    /// HMAC-SHA256 signature over the rest of the state, keyed by the
    /// config hash.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hmac: Option<String>,
}

/// Overall run status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }
}

/// Per-collection state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionState {
    /// Task status.
    pub status: TaskStatus,

    #[serde(default)]
    pub inserted: u64,
    #[serde(default)]
    pub updated: u64,
    #[serde(default)]
    pub skipped: u64,
    #[serde(default)]
    pub errors: u64,

    /// Scan cursor to continue from (set when the run was cancelled).
    #[serde(default)]
    pub cursor: Option<ScanCursor>,

    /// When the collection finished.
    pub completed_at: Option<DateTime<Utc>>,

    /// Error message if failed.
    pub error: Option<String>,
}

/// Task status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl MigrationState {
    /// Create a new migration state.
    pub fn new(run_id: String, config_hash: String) -> Self {
        Self {
            run_id,
            config_hash,
            started_at: Utc::now(),
            status: RunStatus::Running,
            collections: BTreeMap::new(),
            completed_at: None,
            hmac: None,
        }
    }

    fn compute_hmac(&self) -> Result<String> {
        let mut state_for_signing = self.clone();
        state_for_signing.hmac = None;

        let content = serde_json::to_string(&state_for_signing)
            .map_err(|e| MigrateError::State(format!("Failed to serialize state for HMAC: {}", e)))?;

        let mut mac = HmacSha256::new_from_slice(self.config_hash.as_bytes())
            .map_err(|e| MigrateError::State(format!("Failed to create HMAC: {}", e)))?;
        mac.update(content.as_bytes());
        let result = mac.finalize();
        Ok(hex::encode(result.into_bytes()))
    }

    /// Load state from a file, rejecting files whose signature is missing or
    /// does not match their content.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let state: Self = serde_json::from_str(&content)
            .map_err(|e| MigrateError::State(format!("Invalid state file: {}", e)))?;

        let expected = state.compute_hmac()?;
        match state.hmac {
            Some(ref stored) if stored == &expected => Ok(state),
            Some(_) => Err(MigrateError::State(
                "State file integrity check failed: HMAC mismatch (possible tampering)".to_string(),
            )),
            None => Err(MigrateError::State(
                "State file has no HMAC signature".to_string(),
            )),
        }
    }

    /// Save state to a file (atomic write with HMAC).
    pub fn save<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();

        self.hmac = Some(self.compute_hmac()?);

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| MigrateError::State(format!("Failed to serialize state: {}", e)))?;

        // Atomic write: write to temp file, then rename
        let temp_path = path.with_extension("tmp");
        std::fs::write(&temp_path, &content)?;
        std::fs::rename(&temp_path, path)?;

        Ok(())
    }

    /// Validate that the config hash matches for resume.
    pub fn validate_config(&self, config_hash: &str) -> Result<()> {
        if self.config_hash != config_hash {
            return Err(MigrateError::ConfigChanged);
        }
        Ok(())
    }

    /// Get or create collection state.
    pub fn get_or_create_collection(&mut self, name: &str) -> &mut CollectionState {
        self.collections
            .entry(name.to_string())
            .or_insert_with(CollectionState::new)
    }

    /// Check if a collection is completed.
    pub fn is_collection_completed(&self, name: &str) -> bool {
        self.collections
            .get(name)
            .map(|c| c.status == TaskStatus::Completed)
            .unwrap_or(false)
    }

    /// Saved cursor to continue a collection from.
    pub fn resume_cursor(&self, name: &str) -> Option<ScanCursor> {
        self.collections.get(name).and_then(|c| c.cursor.clone())
    }

    /// Record the final status of the run.
    pub fn finish(&mut self, status: RunStatus) {
        self.status = status;
        self.completed_at = Some(Utc::now());
    }
}

impl Default for CollectionState {
    fn default() -> Self {
        Self::new()
    }
}

impl CollectionState {
    /// Create a new collection state.
    pub fn new() -> Self {
        Self {
            status: TaskStatus::Pending,
            inserted: 0,
            updated: 0,
            skipped: 0,
            errors: 0,
            cursor: None,
            completed_at: None,
            error: None,
        }
    }

    /// Mark the collection as in progress.
    ///
    /// A collection left in progress by a cancelled run keeps its counters
    /// and cursor so the next run continues them. Any other status starts
    /// over from zero.
    pub fn mark_in_progress(&mut self) {
        if self.status != TaskStatus::InProgress {
            self.inserted = 0;
            self.updated = 0;
            self.skipped = 0;
            self.errors = 0;
            self.cursor = None;
            self.completed_at = None;
        }
        self.status = TaskStatus::InProgress;
        self.error = None;
    }

    /// Add an engine result to the counters. Cancelled runs stay in progress
    /// and keep their cursor; finished runs are completed.
    pub fn record(&mut self, result: &MigrationResult) {
        self.inserted += result.inserted;
        self.updated += result.updated;
        self.skipped += result.skipped;
        self.errors += result.errors;
        if result.cancelled {
            self.status = TaskStatus::InProgress;
            self.cursor = result.resume_cursor.clone();
        } else {
            self.status = TaskStatus::Completed;
            self.cursor = None;
            self.completed_at = Some(Utc::now());
        }
    }

    /// Mark the collection as failed.
    pub fn mark_failed(&mut self, error: &str) {
        self.status = TaskStatus::Failed;
        self.error = Some(error.to_string());
    }
}
