//! Core abstractions for document migration.
//!
//! - [`document`]: schema-less document and deep content comparison
//! - [`partition`]: partition key paths, extraction, validation and backfill
//! - [`traits`]: the [`DocumentStore`] collaborator and its data types
//!
//! Everything above this module (scanner, reconciliation, engine) is written
//! against these types only, so new stores can be added without touching the
//! engine.

pub mod document;
pub mod partition;
pub mod traits;

pub use document::{values_equal, Document, ID_FIELD, SYSTEM_FIELDS};
pub use partition::{PartitionKeySpec, PartitionKeyValue};
pub use traits::{
    CollectionProperties, CollectionRef, DocumentStore, InsertOutcome, ScanCursor, ScanPage,
};
