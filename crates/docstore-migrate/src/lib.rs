//! # docstore-migrate
//!
//! Migration of partitioned, schema-less document collections between
//! document stores.
//!
//! This library copies every document of a collection from a source store to
//! a target store with support for:
//!
//! - **Idempotent reconciliation**: insert, update or skip per document
//! - **Partition key alignment**: mismatched collections are refused, and
//!   nested key paths are backfilled onto the document
//! - **De-identification** of sensitive fields with synthetic values
//! - **Bounded retries** with linear backoff per document and per page
//! - **Parallel collections** with a configurable worker count
//! - **Resume capability** via signed JSON state files
//!
//! ## Example
//!
//! ```rust,no_run
//! use docstore_migrate::{Config, MigrateError, Orchestrator};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), MigrateError> {
//!     let config = Config::load("config.yaml")?;
//!     let orchestrator = Orchestrator::new(config)?;
//!     let report = orchestrator.run(CancellationToken::new()).await?;
//!     println!("Inserted {} documents", report.inserted);
//!     Ok(())
//! }
//! ```

pub mod collection;
pub mod config;
pub mod core;
pub mod error;
pub mod orchestrator;
pub mod reconcile;
pub mod retry;
pub mod sanitize;
pub mod scan;
pub mod state;
pub mod store;
pub mod transfer;
pub mod verify;

// Re-exports for convenient access
pub use crate::core::{
    CollectionProperties, CollectionRef, Document, DocumentStore, InsertOutcome,
    PartitionKeySpec, PartitionKeyValue, ScanCursor, ScanPage,
};
pub use collection::CollectionManager;
pub use config::{Config, MigrationConfig, StoreConfig, StoreKind};
pub use error::{MigrateError, Result};
pub use orchestrator::{
    CollectionReport, CollectionStatus, HealthCheckResult, MigrationReport, Orchestrator,
};
pub use reconcile::{Decision, ReconciliationOutcome, ReconciliationPolicy};
pub use retry::RetryPolicy;
pub use sanitize::{DocumentSanitizer, SanitizationRules, SyntheticKind};
pub use scan::PagedScanner;
pub use state::{MigrationState, RunStatus};
pub use store::{JsonFileStore, MemoryStore};
pub use transfer::{EngineConfig, MigrationEngine, MigrationResult, ProgressStage, ProgressUpdate};
pub use verify::{VerificationCounter, VerificationResult};
