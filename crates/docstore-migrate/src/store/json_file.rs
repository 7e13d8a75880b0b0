//! Account persisted as a JSON snapshot file.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::core::{
    CollectionProperties, CollectionRef, Document, DocumentStore, InsertOutcome,
    PartitionKeyValue, ScanCursor, ScanPage,
};
use crate::error::Result;

use super::memory::{AccountSnapshot, MemoryStore};

/// A [`MemoryStore`] loaded from, and flushed back to, a JSON file.
///
/// A missing file is an empty account. The file is rewritten on
/// [`DocumentStore::close`] only if something was written.
pub struct JsonFileStore {
    path: PathBuf,
    inner: MemoryStore,
}

impl JsonFileStore {
    pub fn open(name: impl Into<String>, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let snapshot = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let snapshot: AccountSnapshot = serde_json::from_str(&content)?;
            debug!(
                "Loaded {} database(s) from {}",
                snapshot.databases.len(),
                path.display()
            );
            snapshot
        } else {
            debug!("{} does not exist, starting with an empty account", path.display());
            AccountSnapshot::default()
        };

        Ok(Self {
            inner: MemoryStore::from_snapshot(name, snapshot)?,
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the snapshot to disk (temp file, then rename).
    pub async fn flush(&self) -> Result<()> {
        let snapshot = self.inner.snapshot().await;
        let content = serde_json::to_string_pretty(&snapshot)?;

        let temp_path = self.path.with_extension("tmp");
        std::fs::write(&temp_path, &content)?;
        std::fs::rename(&temp_path, &self.path)?;

        self.inner.mark_clean();
        info!("{}: wrote snapshot to {}", self.inner.name(), self.path.display());
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for JsonFileStore {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn health_check(&self) -> Result<()> {
        self.inner.health_check().await
    }

    async fn list_databases(&self) -> Result<Vec<String>> {
        self.inner.list_databases().await
    }

    async fn create_database_if_not_exists(&self, database: &str) -> Result<()> {
        self.inner.create_database_if_not_exists(database).await
    }

    async fn list_collections(&self, database: &str) -> Result<Vec<String>> {
        self.inner.list_collections(database).await
    }

    async fn get_or_create_collection(
        &self,
        database: &str,
        props: &CollectionProperties,
        throughput: Option<u32>,
    ) -> Result<CollectionProperties> {
        self.inner
            .get_or_create_collection(database, props, throughput)
            .await
    }

    async fn read_collection_metadata(
        &self,
        collection: &CollectionRef,
    ) -> Result<CollectionProperties> {
        self.inner.read_collection_metadata(collection).await
    }

    async fn read_throughput(&self, collection: &CollectionRef) -> Result<Option<u32>> {
        self.inner.read_throughput(collection).await
    }

    async fn count_documents(&self, collection: &CollectionRef) -> Result<u64> {
        self.inner.count_documents(collection).await
    }

    async fn scan_page(
        &self,
        collection: &CollectionRef,
        cursor: Option<&ScanCursor>,
        page_size: usize,
    ) -> Result<ScanPage> {
        self.inner.scan_page(collection, cursor, page_size).await
    }

    async fn read_document(
        &self,
        collection: &CollectionRef,
        id: &str,
        partition_key: &PartitionKeyValue,
    ) -> Result<Option<Document>> {
        self.inner.read_document(collection, id, partition_key).await
    }

    async fn insert_document(
        &self,
        collection: &CollectionRef,
        doc: &Document,
    ) -> Result<InsertOutcome> {
        self.inner.insert_document(collection, doc).await
    }

    async fn replace_document(
        &self,
        collection: &CollectionRef,
        id: &str,
        doc: &Document,
    ) -> Result<()> {
        self.inner.replace_document(collection, id, doc).await
    }

    async fn close(&self) -> Result<()> {
        if self.inner.is_dirty() {
            self.flush().await?;
        }
        Ok(())
    }
}
