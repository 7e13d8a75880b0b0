//! Per-document insert/update/skip decisions.
//!
//! The policy reads the target copy of a document by id + partition key and
//! compares content with system fields excluded:
//!
//! | target state            | decision |
//! |-------------------------|----------|
//! | not found               | Insert   |
//! | found, same content     | Skip     |
//! | found, different content| Update   |
//!
//! Running a migration twice therefore produces only skips on the second run.

use serde::{Deserialize, Serialize};

use crate::core::{CollectionRef, Document, DocumentStore, PartitionKeyValue};
use crate::error::Result;

/// What to do with one document.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Target has no copy; create it.
    Insert(Document),
    /// Target copy differs; replace it.
    Update(Document),
    /// Target copy already matches.
    Skip,
}

impl Decision {
    pub fn label(&self) -> &'static str {
        match self {
            Decision::Insert(_) => "insert",
            Decision::Update(_) => "update",
            Decision::Skip => "skip",
        }
    }
}

/// Final classification of a document after the write (or non-write).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationOutcome {
    Inserted,
    Updated,
    Skipped,
    Error,
}

/// Read-compare policy against a target collection.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReconciliationPolicy;

impl ReconciliationPolicy {
    pub fn new() -> Self {
        Self
    }

    /// Decide from an already-fetched target copy.
    pub fn decide_with(&self, doc: Document, existing: Option<&Document>) -> Decision {
        match existing {
            None => Decision::Insert(doc),
            Some(target) if doc.content_eq(target) => Decision::Skip,
            Some(_) => Decision::Update(doc),
        }
    }

    /// Look the document up in `target` and decide.
    pub async fn decide(
        &self,
        doc: Document,
        id: &str,
        partition_key: &PartitionKeyValue,
        target: &dyn DocumentStore,
        collection: &CollectionRef,
    ) -> Result<Decision> {
        let existing = target.read_document(collection, id, partition_key).await?;
        Ok(self.decide_with(doc, existing.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn doc(value: Value) -> Document {
        Document::from_value(value).unwrap()
    }

    #[test]
    fn test_missing_target_inserts() {
        let policy = ReconciliationPolicy::new();
        let d = doc(json!({"id": "a", "pk": "x"}));
        assert_eq!(policy.decide_with(d.clone(), None), Decision::Insert(d));
    }

    #[test]
    fn test_identical_content_skips() {
        let policy = ReconciliationPolicy::new();
        let source = doc(json!({"id": "a", "pk": "x", "v": [1, 2]}));
        let target = doc(json!({"v": [1, 2], "pk": "x", "id": "a", "_ts": 1, "_etag": "e"}));
        assert_eq!(policy.decide_with(source, Some(&target)), Decision::Skip);
    }

    #[test]
    fn test_content_drift_updates() {
        let policy = ReconciliationPolicy::new();
        let source = doc(json!({"id": "a", "pk": "x", "v": 2}));
        let target = doc(json!({"id": "a", "pk": "x", "v": 1}));
        let decision = policy.decide_with(source.clone(), Some(&target));
        assert_eq!(decision, Decision::Update(source));
        assert_eq!(decision.label(), "update");
    }
}
