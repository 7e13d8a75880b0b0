//! Target preparation: databases and collections.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::core::{CollectionProperties, CollectionRef, DocumentStore};
use crate::error::Result;

/// Creates target databases and collections mirroring the source.
pub struct CollectionManager {
    source: Arc<dyn DocumentStore>,
    target: Arc<dyn DocumentStore>,
}

impl CollectionManager {
    pub fn new(source: Arc<dyn DocumentStore>, target: Arc<dyn DocumentStore>) -> Self {
        Self { source, target }
    }

    /// Collections of a source database.
    pub async fn list_collections(&self, database: &str) -> Result<Vec<String>> {
        self.source.list_collections(database).await
    }

    /// Databases of the source account.
    pub async fn list_databases(&self) -> Result<Vec<String>> {
        self.source.list_databases().await
    }

    /// Create the target database unless it exists.
    pub async fn ensure_database(&self, database: &str) -> Result<()> {
        self.target.create_database_if_not_exists(database).await
    }

    /// Create the target collection with the source's partition key and
    /// indexing policy if it does not exist yet.
    ///
    /// Throughput is copied only when the source collection has its own
    /// provisioned throughput; a failure to read it counts as shared. A
    /// failure to read the source metadata is returned.
    ///
    /// Returns the target collection's properties, which for a pre-existing
    /// collection may differ from the source.
    pub async fn prepare(
        &self,
        source_ref: &CollectionRef,
        target_ref: &CollectionRef,
    ) -> Result<CollectionProperties> {
        let source_props = self.source.read_collection_metadata(source_ref).await?;

        let throughput = match self.source.read_throughput(source_ref).await {
            Ok(throughput) => throughput,
            Err(e) => {
                warn!(
                    "{}: could not read throughput, treating as shared: {}",
                    source_ref, e
                );
                None
            }
        };

        self.ensure_database(&target_ref.database).await?;

        let wanted = CollectionProperties {
            id: target_ref.collection.clone(),
            ..source_props
        };
        let target_props = self
            .target
            .get_or_create_collection(&target_ref.database, &wanted, throughput)
            .await?;

        match throughput {
            Some(ru) => info!(
                "{}: target ready (partition key {}, throughput {})",
                target_ref, target_props.partition_key, ru
            ),
            None => info!(
                "{}: target ready (partition key {}, shared throughput)",
                target_ref, target_props.partition_key
            ),
        }
        if target_props.partition_key != wanted.partition_key {
            debug!(
                "{}: existing target partition key {} differs from source {}",
                target_ref, target_props.partition_key, wanted.partition_key
            );
        }

        Ok(target_props)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::PartitionKeySpec;
    use crate::store::MemoryStore;
    use serde_json::json;

    async fn source_with_collection(throughput: Option<u32>) -> Arc<dyn DocumentStore> {
        let store = MemoryStore::new("src");
        store.create_database_if_not_exists("db").await.unwrap();
        store
            .get_or_create_collection(
                "db",
                &CollectionProperties {
                    id: "c".into(),
                    partition_key: PartitionKeySpec::new(["/tenant", "/region"]).unwrap(),
                    indexing_policy: Some(json!({"indexingMode": "consistent"})),
                },
                throughput,
            )
            .await
            .unwrap();
        Arc::new(store)
    }

    #[tokio::test]
    async fn test_prepare_mirrors_source_collection() {
        let source = source_with_collection(Some(1000)).await;
        let target: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new("tgt"));
        let manager = CollectionManager::new(source, target.clone());
        let coll = CollectionRef::new("db", "c");

        let props = manager.prepare(&coll, &coll).await.unwrap();
        assert_eq!(props.partition_key.paths, vec!["/tenant", "/region"]);
        assert_eq!(props.indexing_policy, Some(json!({"indexingMode": "consistent"})));
        assert_eq!(target.read_throughput(&coll).await.unwrap(), Some(1000));
    }

    #[tokio::test]
    async fn test_shared_throughput_is_not_propagated() {
        let source = source_with_collection(None).await;
        let target: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new("tgt"));
        let manager = CollectionManager::new(source, target.clone());
        let coll = CollectionRef::new("db", "c");

        manager.prepare(&coll, &coll).await.unwrap();
        assert_eq!(target.read_throughput(&coll).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_missing_source_collection_fails() {
        let source: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new("src"));
        let target: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new("tgt"));
        let manager = CollectionManager::new(source, target.clone());
        let coll = CollectionRef::new("db", "c");

        assert!(manager.prepare(&coll, &coll).await.is_err());
        assert!(target.list_databases().await.unwrap().is_empty());
    }
}
