//! In-process document account.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::core::{
    CollectionProperties, CollectionRef, Document, DocumentStore, InsertOutcome,
    PartitionKeySpec, PartitionKeyValue, ScanCursor, ScanPage,
};
use crate::error::{MigrateError, Result};

const CURSOR_PREFIX: &str = "offset:";

/// Serializable image of a whole account.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    #[serde(default)]
    pub databases: BTreeMap<String, DatabaseSnapshot>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSnapshot {
    #[serde(default)]
    pub collections: BTreeMap<String, CollectionSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionSnapshot {
    pub partition_key: PartitionKeySpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indexing_policy: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub throughput: Option<u32>,
    #[serde(default)]
    pub documents: Vec<Document>,
}

type DocKey = (String, String);

struct CollectionData {
    props: CollectionProperties,
    throughput: Option<u32>,
    documents: BTreeMap<DocKey, Document>,
    /// Snapshot documents without a usable `(partition key, id)` key: no id,
    /// or a key already taken. They are scanned and counted after the keyed
    /// documents but cannot be read or replaced.
    unkeyed: Vec<Document>,
}

impl CollectionData {
    fn new(props: CollectionProperties, throughput: Option<u32>) -> Self {
        Self {
            props,
            throughput,
            documents: BTreeMap::new(),
            unkeyed: Vec::new(),
        }
    }

    fn len(&self) -> usize {
        self.documents.len() + self.unkeyed.len()
    }

    /// Scan order: keyed documents, then unkeyed ones in load order.
    fn iter(&self) -> impl Iterator<Item = &Document> {
        self.documents.values().chain(self.unkeyed.iter())
    }

    fn key_for(&self, doc: &Document) -> Result<DocKey> {
        let id = doc.id().ok_or_else(|| MigrateError::MissingId {
            document: doc.to_json_string(),
        })?;
        let pk = self.props.partition_key.extract(doc);
        Ok((pk.to_key_string(), id.to_string()))
    }
}

#[derive(Default)]
struct Account {
    databases: BTreeMap<String, BTreeMap<String, CollectionData>>,
}

impl Account {
    fn collection(&self, coll: &CollectionRef) -> Result<&CollectionData> {
        self.databases
            .get(&coll.database)
            .and_then(|db| db.get(&coll.collection))
            .ok_or_else(|| MigrateError::Store(format!("collection {} not found", coll)))
    }

    fn collection_mut(&mut self, coll: &CollectionRef) -> Result<&mut CollectionData> {
        self.databases
            .get_mut(&coll.database)
            .and_then(|db| db.get_mut(&coll.collection))
            .ok_or_else(|| MigrateError::Store(format!("collection {} not found", coll)))
    }
}

/// Thread-safe in-memory [`DocumentStore`].
///
/// Documents are kept in `(partition key, id)` order, which is also the scan
/// order. Scan cursors are offsets into that order. Writes stamp the usual
/// system fields (`_rid`, `_self`, `_etag`, `_ts`).
pub struct MemoryStore {
    name: String,
    max_page_size: Option<usize>,
    account: RwLock<Account>,
    write_seq: AtomicU64,
    dirty: AtomicBool,
}

impl MemoryStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_page_size: None,
            account: RwLock::new(Account::default()),
            write_seq: AtomicU64::new(0),
            dirty: AtomicBool::new(false),
        }
    }

    /// Cap every page at `max` documents regardless of the requested size.
    pub fn with_max_page_size(mut self, max: usize) -> Self {
        self.max_page_size = Some(max.max(1));
        self
    }

    /// Build a store from a snapshot. Stored documents keep their system fields.
    pub fn from_snapshot(name: impl Into<String>, snapshot: AccountSnapshot) -> Result<Self> {
        let mut account = Account::default();

        for (db_name, db) in snapshot.databases {
            let collections = account.databases.entry(db_name.clone()).or_default();
            for (coll_name, coll) in db.collections {
                coll.partition_key.validate()?;
                let mut data = CollectionData::new(
                    CollectionProperties {
                        id: coll_name.clone(),
                        partition_key: coll.partition_key,
                        indexing_policy: coll.indexing_policy,
                    },
                    coll.throughput,
                );
                for doc in coll.documents {
                    match data.key_for(&doc) {
                        Ok(key) if !data.documents.contains_key(&key) => {
                            data.documents.insert(key, doc);
                        }
                        Ok((pk, id)) => {
                            warn!(
                                "{}/{}: duplicate document id {} with partition key {}, kept unindexed",
                                db_name, coll_name, id, pk
                            );
                            data.unkeyed.push(doc);
                        }
                        Err(e) => {
                            warn!("{}/{}: {}, kept unindexed", db_name, coll_name, e);
                            data.unkeyed.push(doc);
                        }
                    }
                }
                collections.insert(coll_name, data);
            }
        }

        Ok(Self {
            account: RwLock::new(account),
            ..Self::new(name)
        })
    }

    /// Export the whole account.
    pub async fn snapshot(&self) -> AccountSnapshot {
        let account = self.account.read().await;
        AccountSnapshot {
            databases: account
                .databases
                .iter()
                .map(|(db_name, collections)| {
                    let db = DatabaseSnapshot {
                        collections: collections
                            .iter()
                            .map(|(coll_name, data)| {
                                let snap = CollectionSnapshot {
                                    partition_key: data.props.partition_key.clone(),
                                    indexing_policy: data.props.indexing_policy.clone(),
                                    throughput: data.throughput,
                                    documents: data.iter().cloned().collect(),
                                };
                                (coll_name.clone(), snap)
                            })
                            .collect(),
                    };
                    (db_name.clone(), db)
                })
                .collect(),
        }
    }

    /// Whether anything was written since construction or the last
    /// [`MemoryStore::mark_clean`].
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    pub fn mark_clean(&self) {
        self.dirty.store(false, Ordering::SeqCst);
    }

    fn stamp(&self, coll: &CollectionRef, doc: &Document) -> Document {
        let seq = self.write_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let mut stored = doc.without_system_fields();
        let id = stored.id().unwrap_or_default().to_string();
        stored.insert("_rid", Value::String(format!("{:016x}", seq)));
        stored.insert(
            "_self",
            Value::String(format!(
                "dbs/{}/colls/{}/docs/{}",
                coll.database, coll.collection, id
            )),
        );
        stored.insert(
            "_etag",
            Value::String(format!("\"{}\"", uuid::Uuid::new_v4())),
        );
        stored.insert("_ts", Value::from(Utc::now().timestamp()));
        self.dirty.store(true, Ordering::SeqCst);
        stored
    }
}

fn encode_cursor(offset: usize) -> ScanCursor {
    ScanCursor::new(format!("{}{}", CURSOR_PREFIX, offset))
}

fn decode_cursor(cursor: &ScanCursor) -> Result<usize> {
    cursor
        .as_str()
        .strip_prefix(CURSOR_PREFIX)
        .and_then(|raw| raw.parse().ok())
        .ok_or_else(|| MigrateError::Store(format!("invalid scan cursor '{}'", cursor)))
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn health_check(&self) -> Result<()> {
        let _ = self.account.read().await;
        Ok(())
    }

    async fn list_databases(&self) -> Result<Vec<String>> {
        Ok(self.account.read().await.databases.keys().cloned().collect())
    }

    async fn create_database_if_not_exists(&self, database: &str) -> Result<()> {
        let mut account = self.account.write().await;
        if !account.databases.contains_key(database) {
            debug!("{}: creating database {}", self.name, database);
            account.databases.insert(database.to_string(), BTreeMap::new());
            self.dirty.store(true, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn list_collections(&self, database: &str) -> Result<Vec<String>> {
        let account = self.account.read().await;
        account
            .databases
            .get(database)
            .map(|db| db.keys().cloned().collect())
            .ok_or_else(|| MigrateError::Store(format!("database {} not found", database)))
    }

    async fn get_or_create_collection(
        &self,
        database: &str,
        props: &CollectionProperties,
        throughput: Option<u32>,
    ) -> Result<CollectionProperties> {
        let mut account = self.account.write().await;
        let db = account
            .databases
            .get_mut(database)
            .ok_or_else(|| MigrateError::Store(format!("database {} not found", database)))?;

        if let Some(existing) = db.get(&props.id) {
            return Ok(existing.props.clone());
        }

        debug!(
            "{}: creating collection {}/{} with partition key {}",
            self.name, database, props.id, props.partition_key
        );
        db.insert(props.id.clone(), CollectionData::new(props.clone(), throughput));
        self.dirty.store(true, Ordering::SeqCst);
        Ok(props.clone())
    }

    async fn read_collection_metadata(
        &self,
        collection: &CollectionRef,
    ) -> Result<CollectionProperties> {
        let account = self.account.read().await;
        Ok(account.collection(collection)?.props.clone())
    }

    async fn read_throughput(&self, collection: &CollectionRef) -> Result<Option<u32>> {
        let account = self.account.read().await;
        Ok(account.collection(collection)?.throughput)
    }

    async fn count_documents(&self, collection: &CollectionRef) -> Result<u64> {
        let account = self.account.read().await;
        Ok(account.collection(collection)?.len() as u64)
    }

    async fn scan_page(
        &self,
        collection: &CollectionRef,
        cursor: Option<&ScanCursor>,
        page_size: usize,
    ) -> Result<ScanPage> {
        let offset = cursor.map(decode_cursor).transpose()?.unwrap_or(0);
        let limit = match self.max_page_size {
            Some(max) => page_size.min(max),
            None => page_size,
        }
        .max(1);

        let account = self.account.read().await;
        let data = account.collection(collection)?;
        let documents: Vec<Document> = data
            .iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();

        let end = offset + documents.len();
        let next_cursor = (end < data.len()).then(|| encode_cursor(end));
        Ok(ScanPage {
            documents,
            next_cursor,
        })
    }

    async fn read_document(
        &self,
        collection: &CollectionRef,
        id: &str,
        partition_key: &PartitionKeyValue,
    ) -> Result<Option<Document>> {
        let account = self.account.read().await;
        let data = account.collection(collection)?;
        Ok(data
            .documents
            .get(&(partition_key.to_key_string(), id.to_string()))
            .cloned())
    }

    async fn insert_document(
        &self,
        collection: &CollectionRef,
        doc: &Document,
    ) -> Result<InsertOutcome> {
        let mut account = self.account.write().await;
        let data = account.collection_mut(collection)?;
        let key = data.key_for(doc)?;
        if data.documents.contains_key(&key) {
            return Ok(InsertOutcome::Conflict);
        }
        let stored = self.stamp(collection, doc);
        data.documents.insert(key, stored);
        Ok(InsertOutcome::Created)
    }

    async fn replace_document(
        &self,
        collection: &CollectionRef,
        id: &str,
        doc: &Document,
    ) -> Result<()> {
        let mut account = self.account.write().await;
        let data = account.collection_mut(collection)?;
        let key = data.key_for(doc)?;
        if key.1 != id {
            return Err(MigrateError::Store(format!(
                "replace of {} with a body carrying id {}",
                id, key.1
            )));
        }
        if !data.documents.contains_key(&key) {
            return Err(MigrateError::Store(format!(
                "document {} not found in {}",
                id, collection
            )));
        }
        let stored = self.stamp(collection, doc);
        data.documents.insert(key, stored);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props(id: &str, path: &str) -> CollectionProperties {
        CollectionProperties {
            id: id.into(),
            partition_key: PartitionKeySpec::single(path).unwrap(),
            indexing_policy: None,
        }
    }

    async fn store_with_collection() -> (MemoryStore, CollectionRef) {
        let store = MemoryStore::new("mem");
        store.create_database_if_not_exists("db").await.unwrap();
        store
            .get_or_create_collection("db", &props("c", "/pk"), Some(400))
            .await
            .unwrap();
        (store, CollectionRef::new("db", "c"))
    }

    #[tokio::test]
    async fn test_insert_stamps_system_fields_and_detects_conflict() {
        let (store, coll) = store_with_collection().await;
        let doc = Document::from_value(json!({"id": "1", "pk": "a", "v": 1})).unwrap();

        assert_eq!(store.insert_document(&coll, &doc).await.unwrap(), InsertOutcome::Created);
        assert_eq!(store.insert_document(&coll, &doc).await.unwrap(), InsertOutcome::Conflict);

        let pk = PartitionKeyValue(vec![json!("a")]);
        let stored = store.read_document(&coll, "1", &pk).await.unwrap().unwrap();
        for field in ["_rid", "_self", "_etag", "_ts"] {
            assert!(stored.contains_field(field), "missing {field}");
        }
        assert!(stored.content_eq(&doc));
        assert!(store.is_dirty());
    }

    #[tokio::test]
    async fn test_same_id_in_different_partitions_is_distinct() {
        let (store, coll) = store_with_collection().await;
        for pk in ["a", "b"] {
            let doc = Document::from_value(json!({"id": "1", "pk": pk})).unwrap();
            assert_eq!(store.insert_document(&coll, &doc).await.unwrap(), InsertOutcome::Created);
        }
        assert_eq!(store.count_documents(&coll).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_replace_requires_existing_document() {
        let (store, coll) = store_with_collection().await;
        let doc = Document::from_value(json!({"id": "1", "pk": "a"})).unwrap();
        assert!(store.replace_document(&coll, "1", &doc).await.is_err());
        store.insert_document(&coll, &doc).await.unwrap();
        let changed = Document::from_value(json!({"id": "1", "pk": "a", "v": 2})).unwrap();
        store.replace_document(&coll, "1", &changed).await.unwrap();
        let pk = PartitionKeyValue(vec![json!("a")]);
        let stored = store.read_document(&coll, "1", &pk).await.unwrap().unwrap();
        assert_eq!(stored.get("v"), Some(&json!(2)));
    }

    #[tokio::test]
    async fn test_existing_collection_keeps_its_properties() {
        let (store, _) = store_with_collection().await;
        let existing = store
            .get_or_create_collection("db", &props("c", "/other"), None)
            .await
            .unwrap();
        assert_eq!(existing.partition_key.paths, vec!["/pk".to_string()]);
    }

    #[tokio::test]
    async fn test_snapshot_round_trip_preserves_documents() {
        let (store, coll) = store_with_collection().await;
        let doc = Document::from_value(json!({"id": "1", "pk": "a"})).unwrap();
        store.insert_document(&coll, &doc).await.unwrap();

        let snapshot = store.snapshot().await;
        let restored = MemoryStore::from_snapshot("copy", snapshot.clone()).unwrap();
        assert_eq!(restored.snapshot().await, snapshot);
        assert_eq!(restored.read_throughput(&coll).await.unwrap(), Some(400));
        assert!(!restored.is_dirty());
    }

    fn snapshot_of(documents: serde_json::Value) -> AccountSnapshot {
        serde_json::from_value(json!({
            "databases": {"db": {"collections": {"c": {
                "partition_key": {"paths": ["/pk"]},
                "documents": documents
            }}}}
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_snapshot_keeps_documents_without_id() {
        let store = MemoryStore::from_snapshot(
            "mem",
            snapshot_of(json!([{"id": "a", "pk": "x"}, {"pk": "y"}])),
        )
        .unwrap();
        let coll = CollectionRef::new("db", "c");

        assert_eq!(store.count_documents(&coll).await.unwrap(), 2);
        let page = store.scan_page(&coll, None, 10).await.unwrap();
        assert_eq!(page.documents.len(), 2);
        assert_eq!(page.documents[0].id(), Some("a"));
        assert_eq!(page.documents[1].id(), None);
        assert!(page.next_cursor.is_none());
    }

    #[tokio::test]
    async fn test_snapshot_keeps_duplicate_keys() {
        let store = MemoryStore::from_snapshot(
            "mem",
            snapshot_of(json!([{"id": "a", "v": 1}, {"id": "a", "v": 2}])),
        )
        .unwrap();
        let coll = CollectionRef::new("db", "c");

        assert_eq!(store.count_documents(&coll).await.unwrap(), 2);
        let first = store.scan_page(&coll, None, 1).await.unwrap();
        assert_eq!(first.documents[0].get("v"), Some(&json!(1)));
        let second = store
            .scan_page(&coll, first.next_cursor.as_ref(), 1)
            .await
            .unwrap();
        assert_eq!(second.documents[0].get("v"), Some(&json!(2)));
        assert!(second.next_cursor.is_none());

        let exported = store.snapshot().await;
        assert_eq!(exported.databases["db"].collections["c"].documents.len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_cursor_is_rejected() {
        let (store, coll) = store_with_collection().await;
        let result = store
            .scan_page(&coll, Some(&ScanCursor::new("garbage")), 10)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_missing_collection_errors() {
        let store = MemoryStore::new("mem");
        let coll = CollectionRef::new("nope", "nope");
        assert!(store.read_collection_metadata(&coll).await.is_err());
    }
}
