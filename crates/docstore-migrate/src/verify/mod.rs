//! Count-based verification of a migrated collection.
//!
//! Compares the total number of documents on both sides. A count failure on
//! either side is logged and reported as a non-matching result; verification
//! never fails the run.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::core::{CollectionRef, DocumentStore};

/// Outcome of a count comparison.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub matched: bool,
    pub source_count: u64,
    pub target_count: u64,
    /// Count failure, if any. Counts are zero when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Compares document counts of a source and target collection.
#[derive(Debug, Clone, Copy, Default)]
pub struct VerificationCounter;

impl VerificationCounter {
    pub fn new() -> Self {
        Self
    }

    pub async fn verify(
        &self,
        source: &dyn DocumentStore,
        target: &dyn DocumentStore,
        source_ref: &CollectionRef,
        target_ref: &CollectionRef,
    ) -> VerificationResult {
        let counts = async {
            let source_count = source.count_documents(source_ref).await?;
            let target_count = target.count_documents(target_ref).await?;
            Ok::<_, crate::error::MigrateError>((source_count, target_count))
        }
        .await;

        match counts {
            Ok((source_count, target_count)) => {
                let matched = source_count == target_count;
                if matched {
                    info!("{}: {} documents (match)", source_ref, source_count);
                } else {
                    warn!(
                        "{}: source={} target={} (MISMATCH)",
                        source_ref, source_count, target_count
                    );
                }
                VerificationResult {
                    matched,
                    source_count,
                    target_count,
                    error: None,
                }
            }
            Err(e) => {
                warn!("{}: verification failed: {}", source_ref, e);
                VerificationResult {
                    matched: false,
                    source_count: 0,
                    target_count: 0,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{CollectionProperties, Document, PartitionKeySpec};
    use crate::store::MemoryStore;
    use serde_json::json;

    async fn store(docs: usize) -> MemoryStore {
        let store = MemoryStore::new("mem");
        store.create_database_if_not_exists("db").await.unwrap();
        store
            .get_or_create_collection(
                "db",
                &CollectionProperties {
                    id: "c".into(),
                    partition_key: PartitionKeySpec::single("/pk").unwrap(),
                    indexing_policy: None,
                },
                None,
            )
            .await
            .unwrap();
        let coll = CollectionRef::new("db", "c");
        for i in 0..docs {
            let doc = Document::from_value(json!({"id": i.to_string(), "pk": "p"})).unwrap();
            store.insert_document(&coll, &doc).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_equal_counts_match() {
        let (source, target) = (store(3).await, store(3).await);
        let coll = CollectionRef::new("db", "c");
        let result = VerificationCounter::new()
            .verify(&source, &target, &coll, &coll)
            .await;
        assert_eq!(
            result,
            VerificationResult {
                matched: true,
                source_count: 3,
                target_count: 3,
                error: None
            }
        );
    }

    #[tokio::test]
    async fn test_different_counts_do_not_match() {
        let (source, target) = (store(3).await, store(2).await);
        let coll = CollectionRef::new("db", "c");
        let result = VerificationCounter::new()
            .verify(&source, &target, &coll, &coll)
            .await;
        assert!(!result.matched);
        assert_eq!((result.source_count, result.target_count), (3, 2));
    }

    #[tokio::test]
    async fn test_count_failure_yields_zero_counts() {
        let source = store(3).await;
        let target = MemoryStore::new("empty");
        let coll = CollectionRef::new("db", "c");
        let result = VerificationCounter::new()
            .verify(&source, &target, &coll, &coll)
            .await;
        assert!(!result.matched);
        assert_eq!((result.source_count, result.target_count), (0, 0));
        assert!(result.error.is_some());
    }
}
