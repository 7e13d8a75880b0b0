//! The document store collaborator.
//!
//! - [`DocumentStore`]: account-level operations the engine needs from a store
//! - [`CollectionRef`]: database + collection address
//! - [`CollectionProperties`]: partition key and indexing configuration
//! - [`ScanPage`] / [`ScanCursor`]: one page of a continuation-token scan
//!
//! Timeouts and connection management belong to the implementation; the
//! engine treats every error it gets back as potentially transient.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

use super::document::Document;
use super::partition::{PartitionKeySpec, PartitionKeyValue};

/// Address of a collection inside an account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CollectionRef {
    pub database: String,
    pub collection: String,
}

impl CollectionRef {
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            collection: collection.into(),
        }
    }

    /// `database/collection`, used as report and state key.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.database, self.collection)
    }
}

impl fmt::Display for CollectionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.database, self.collection)
    }
}

/// Collection configuration that has to match between source and target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionProperties {
    /// Collection id (name).
    pub id: String,
    /// Partition key paths.
    pub partition_key: PartitionKeySpec,
    /// Store-specific indexing policy, copied verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indexing_policy: Option<Value>,
}

/// Opaque continuation token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScanCursor(pub String);

impl ScanCursor {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScanCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One page of a scan.
#[derive(Debug, Clone, Default)]
pub struct ScanPage {
    /// Documents in store scan order. May be shorter than the requested size.
    pub documents: Vec<Document>,
    /// Cursor for the next page; `None` means the scan is complete.
    pub next_cursor: Option<ScanCursor>,
}

/// Result of an insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The document was created.
    Created,
    /// A document with the same id and partition key already exists.
    Conflict,
}

/// Access to one document database account.
///
/// Implementations must be `Send + Sync` so they can be shared across
/// collection migrations running on separate tasks.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Human-readable store name for logs (account name, file path...).
    fn name(&self) -> &str;

    /// Cheap round-trip used to test connectivity at startup.
    async fn health_check(&self) -> Result<()>;

    /// List database ids.
    async fn list_databases(&self) -> Result<Vec<String>>;

    /// Create a database unless it already exists.
    async fn create_database_if_not_exists(&self, database: &str) -> Result<()>;

    /// List collection ids in a database.
    async fn list_collections(&self, database: &str) -> Result<Vec<String>>;

    /// Create a collection unless it exists. Returns the properties of the
    /// collection as it exists after the call, which for a pre-existing
    /// collection may differ from `props`.
    async fn get_or_create_collection(
        &self,
        database: &str,
        props: &CollectionProperties,
        throughput: Option<u32>,
    ) -> Result<CollectionProperties>;

    /// Read partition key and indexing configuration.
    async fn read_collection_metadata(&self, collection: &CollectionRef)
        -> Result<CollectionProperties>;

    /// Dedicated provisioned throughput, or `None` when the collection uses
    /// shared throughput.
    async fn read_throughput(&self, collection: &CollectionRef) -> Result<Option<u32>>;

    /// Total number of documents.
    async fn count_documents(&self, collection: &CollectionRef) -> Result<u64>;

    /// Fetch one page, starting after `cursor` (or at the beginning).
    async fn scan_page(
        &self,
        collection: &CollectionRef,
        cursor: Option<&ScanCursor>,
        page_size: usize,
    ) -> Result<ScanPage>;

    /// Point read by id and partition key. `Ok(None)` when not found.
    async fn read_document(
        &self,
        collection: &CollectionRef,
        id: &str,
        partition_key: &PartitionKeyValue,
    ) -> Result<Option<Document>>;

    /// Create a document.
    async fn insert_document(
        &self,
        collection: &CollectionRef,
        doc: &Document,
    ) -> Result<InsertOutcome>;

    /// Fully replace an existing document.
    async fn replace_document(
        &self,
        collection: &CollectionRef,
        id: &str,
        doc: &Document,
    ) -> Result<()>;

    /// Flush and release resources.
    async fn close(&self) -> Result<()>;
}
