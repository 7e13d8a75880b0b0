//! Error types for the migration library.

use thiserror::Error;

/// Process exit code for configuration errors.
pub const EXIT_CONFIG_ERROR: u8 = 1;
/// Process exit code when a store cannot be reached.
pub const EXIT_CONNECTIVITY_ERROR: u8 = 2;
/// Process exit code when one or more collections failed.
pub const EXIT_TRANSFER_ERROR: u8 = 3;
/// Process exit code for resume state problems.
pub const EXIT_STATE_ERROR: u8 = 4;
/// Process exit code when the run was cancelled.
pub const EXIT_CANCELLED: u8 = 5;
/// Process exit code for file I/O errors.
pub const EXIT_IO_ERROR: u8 = 7;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Source and target partition keys differ; nothing was written.
    #[error(
        "Partition key mismatch for collection {collection}: source {source_paths}, target {target_paths}"
    )]
    PartitionKeyMismatch {
        collection: String,
        source_paths: String,
        target_paths: String,
    },

    /// Store unreachable or rejected credentials
    #[error("Cannot connect to {store}: {message}")]
    Connectivity { store: String, message: String },

    /// Document has no usable `id`
    #[error("Document has no valid 'id' field: {document}")]
    MissingId { document: String },

    /// Partition key value is null, empty or composite
    #[error("Document {id}: invalid partition key at '{path}' (value: {value})")]
    InvalidPartitionKey {
        id: String,
        path: String,
        value: String,
        document: String,
    },

    /// Throttling, timeouts, 5xx and similar recoverable store failures
    #[error("Transient store error: {0}")]
    Transient(String),

    /// Any other error reported by a store
    #[error("Store error: {0}")]
    Store(String),

    /// Migration failed for a specific collection
    #[error("Transfer failed for collection {collection}: {message}")]
    Transfer { collection: String, message: String },

    /// State file error
    #[error("State file error: {0}")]
    State(String),

    /// Config hash mismatch on resume
    #[error("Config has changed since last run - cannot resume. Delete the state file to start fresh.")]
    ConfigChanged,

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Migration was cancelled (SIGINT, etc.)
    #[error("Migration cancelled")]
    Cancelled,
}

impl MigrateError {
    /// Create a Transfer error
    pub fn transfer(collection: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Transfer {
            collection: collection.into(),
            message: message.into(),
        }
    }

    /// Create a Connectivity error
    pub fn connectivity(store: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Connectivity {
            store: store.into(),
            message: message.into(),
        }
    }

    /// Whether a per-document operation failing with this error may be retried.
    ///
    /// Validation and configuration problems are permanent; everything a
    /// store reports is assumed to be worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MigrateError::Transient(_)
                | MigrateError::Store(_)
                | MigrateError::Connectivity { .. }
                | MigrateError::Io(_)
        )
    }

    /// Whether this error is a per-document validation failure.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            MigrateError::MissingId { .. } | MigrateError::InvalidPartitionKey { .. }
        )
    }

    /// Map the error to a process exit code.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_)
            | MigrateError::PartitionKeyMismatch { .. }
            | MigrateError::Yaml(_)
            | MigrateError::Json(_)
            | MigrateError::MissingId { .. }
            | MigrateError::InvalidPartitionKey { .. } => EXIT_CONFIG_ERROR,
            MigrateError::Connectivity { .. } => EXIT_CONNECTIVITY_ERROR,
            MigrateError::Transient(_) | MigrateError::Store(_) | MigrateError::Transfer { .. } => {
                EXIT_TRANSFER_ERROR
            }
            MigrateError::State(_) | MigrateError::ConfigChanged => EXIT_STATE_ERROR,
            MigrateError::Cancelled => EXIT_CANCELLED,
            MigrateError::Io(_) => EXIT_IO_ERROR,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(MigrateError::Transient("429 too many requests".into()).is_retryable());
        assert!(MigrateError::Store("503".into()).is_retryable());
        assert!(MigrateError::connectivity("target", "reset").is_retryable());
        assert!(!MigrateError::Config("bad".into()).is_retryable());
        assert!(!MigrateError::MissingId {
            document: "{}".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(MigrateError::Config("x".into()).exit_code(), EXIT_CONFIG_ERROR);
        assert_eq!(
            MigrateError::connectivity("source", "down").exit_code(),
            EXIT_CONNECTIVITY_ERROR
        );
        assert_eq!(MigrateError::Cancelled.exit_code(), EXIT_CANCELLED);
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        assert_eq!(MigrateError::from(io).exit_code(), EXIT_IO_ERROR);
    }

    #[test]
    fn test_format_detailed_includes_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = MigrateError::from(io);
        let text = err.format_detailed();
        assert!(text.starts_with("Error: IO error: no such file"));
    }
}
