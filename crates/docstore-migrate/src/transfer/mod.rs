//! Per-collection migration engine.
//!
//! For every source document the engine:
//! 1. checks the `id`
//! 2. resolves and backfills the partition key
//! 3. prepares the outgoing copy (system fields stripped, sanitized if enabled)
//! 4. decides insert/update/skip against the target and writes, retrying the
//!    whole read-compare-write step with linear backoff
//!
//! Document failures are counted and logged; they never abort the collection.
//! Only a partition key mismatch, a metadata read failure, or a scan page that
//! keeps failing ends the collection early.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::MigrationConfig;
use crate::core::{
    CollectionRef, Document, DocumentStore, InsertOutcome, PartitionKeySpec, PartitionKeyValue,
    ScanCursor,
};
use crate::error::{MigrateError, Result};
use crate::reconcile::{Decision, ReconciliationOutcome, ReconciliationPolicy};
use crate::retry::RetryPolicy;
use crate::sanitize::DocumentSanitizer;
use crate::scan::PagedScanner;

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Page size hint for the source scan.
    pub batch_size: usize,
    /// Retry policy for document writes and page fetches.
    pub retry: RetryPolicy,
    /// Applied to every outgoing document when set.
    pub sanitizer: Option<DocumentSanitizer>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            retry: RetryPolicy::default(),
            sanitizer: None,
        }
    }
}

impl From<&MigrationConfig> for EngineConfig {
    fn from(config: &MigrationConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            retry: config.retry_policy(),
            sanitizer: config.sanitizer(),
        }
    }
}

/// Phase reported in a [`ProgressUpdate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStage {
    Preparing,
    Transferring,
    Verifying,
    Completed,
    Failed,
}

/// Progress notification, sent without blocking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub collection: String,
    pub stage: ProgressStage,
    pub processed: u64,
    /// Source document count, 0 when unknown.
    pub total: u64,
}

/// Outcome of migrating one collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationResult {
    /// Source collection, `database/collection`.
    pub collection: String,
    pub inserted: u64,
    pub updated: u64,
    pub skipped: u64,
    pub errors: u64,
    /// Documents handed to the engine by the scan.
    pub processed: u64,
    /// Source count taken before scanning, 0 when unknown.
    pub total: u64,
    pub duration_seconds: f64,
    /// Successful writes (inserts + updates) per second.
    pub docs_per_second: f64,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    /// The run stopped early because of cancellation.
    pub cancelled: bool,
    /// Cursor to continue from after a cancelled run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_cursor: Option<ScanCursor>,
}

impl MigrationResult {
    /// Inserts plus updates.
    pub fn written(&self) -> u64 {
        self.inserted + self.updated
    }

    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Migrates one collection from a source store to a target store.
pub struct MigrationEngine {
    config: EngineConfig,
    policy: ReconciliationPolicy,
    inserted: AtomicU64,
    updated: AtomicU64,
    skipped: AtomicU64,
    errors: AtomicU64,
    processed: AtomicU64,
    progress: Option<mpsc::Sender<ProgressUpdate>>,
    cancel: CancellationToken,
    resume_cursor: Option<ScanCursor>,
}

impl MigrationEngine {
    /// Create a new migration engine.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            policy: ReconciliationPolicy::new(),
            inserted: AtomicU64::new(0),
            updated: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            processed: AtomicU64::new(0),
            progress: None,
            cancel: CancellationToken::new(),
            resume_cursor: None,
        }
    }

    /// Send progress updates to `tx`. Full channels drop updates.
    pub fn with_progress(mut self, tx: mpsc::Sender<ProgressUpdate>) -> Self {
        self.progress = Some(tx);
        self
    }

    /// Stop starting new documents once `token` is cancelled.
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Start the scan at a cursor saved by a previous, cancelled run.
    pub fn with_resume_cursor(mut self, cursor: Option<ScanCursor>) -> Self {
        self.resume_cursor = cursor;
        self
    }

    /// Documents processed so far.
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Migrate all documents of `source_ref` into `target_ref`.
    ///
    /// The target collection must already exist (see
    /// [`crate::collection::CollectionManager::prepare`]).
    pub async fn migrate(
        &self,
        source: &Arc<dyn DocumentStore>,
        target: &Arc<dyn DocumentStore>,
        source_ref: &CollectionRef,
        target_ref: &CollectionRef,
    ) -> Result<MigrationResult> {
        let name = source_ref.full_name();
        let started_at = Utc::now();
        let start = Instant::now();
        self.reset();

        info!(
            "{}: starting migration to {} (batch size: {}, sanitize: {})",
            name,
            target_ref,
            self.config.batch_size,
            self.config.sanitizer.is_some()
        );

        let spec = self
            .check_partition_keys(source, target, source_ref, target_ref)
            .await?;

        let total = match source.count_documents(source_ref).await {
            Ok(n) => n,
            Err(e) => {
                warn!("{}: could not count source documents, total unknown: {}", name, e);
                0
            }
        };
        self.report(&name, ProgressStage::Transferring, total);

        if let Some(ref cursor) = self.resume_cursor {
            info!("{}: resuming scan from cursor {}", name, cursor);
        }
        let mut scanner = PagedScanner::new(source.clone(), source_ref.clone(), self.config.batch_size)
            .resume_from(self.resume_cursor.clone());

        let mut cancelled = false;
        let mut resume_cursor = None;

        'pages: while !scanner.is_finished() {
            if self.cancel.is_cancelled() {
                cancelled = true;
                resume_cursor = scanner.cursor().cloned();
                break;
            }

            let page_cursor = scanner.cursor().cloned();
            let Some(batch) = self.next_page(&mut scanner, &name).await? else {
                break;
            };

            for doc in batch {
                if self.cancel.is_cancelled() {
                    cancelled = true;
                    resume_cursor = page_cursor;
                    break 'pages;
                }
                self.process_document(target.as_ref(), target_ref, &spec, doc, &name)
                    .await;
                self.processed.fetch_add(1, Ordering::Relaxed);
                self.report(&name, ProgressStage::Transferring, total);
            }
        }

        let completed_at = Utc::now();
        let duration_seconds = start.elapsed().as_secs_f64();
        let inserted = self.inserted.load(Ordering::Relaxed);
        let updated = self.updated.load(Ordering::Relaxed);
        let docs_per_second = if duration_seconds > 0.0 {
            (inserted + updated) as f64 / duration_seconds
        } else {
            0.0
        };

        let result = MigrationResult {
            collection: name.clone(),
            inserted,
            updated,
            skipped: self.skipped.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            processed: self.processed(),
            total,
            duration_seconds,
            docs_per_second,
            started_at,
            completed_at,
            cancelled,
            resume_cursor,
        };

        if cancelled {
            warn!(
                "{}: cancelled after {} document(s), resume cursor: {}",
                name,
                result.processed,
                result
                    .resume_cursor
                    .as_ref()
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "<start>".into())
            );
        }
        info!(
            "{}: {} inserted, {} updated, {} skipped, {} errors in {:.1}s ({:.0} docs/s)",
            name,
            result.inserted,
            result.updated,
            result.skipped,
            result.errors,
            result.duration_seconds,
            result.docs_per_second
        );

        Ok(result)
    }

    fn reset(&self) {
        for counter in [
            &self.inserted,
            &self.updated,
            &self.skipped,
            &self.errors,
            &self.processed,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    async fn check_partition_keys(
        &self,
        source: &Arc<dyn DocumentStore>,
        target: &Arc<dyn DocumentStore>,
        source_ref: &CollectionRef,
        target_ref: &CollectionRef,
    ) -> Result<PartitionKeySpec> {
        let source_props = source.read_collection_metadata(source_ref).await?;
        let target_props = target.read_collection_metadata(target_ref).await?;

        if source_props.partition_key != target_props.partition_key {
            let err = MigrateError::PartitionKeyMismatch {
                collection: source_ref.full_name(),
                source_paths: source_props.partition_key.to_string(),
                target_paths: target_props.partition_key.to_string(),
            };
            error!("{}", err);
            return Err(err);
        }

        debug!(
            "{}: partition key {} matches target",
            source_ref, source_props.partition_key
        );
        Ok(source_props.partition_key)
    }

    /// Fetch the next page, retrying from the same cursor.
    async fn next_page(
        &self,
        scanner: &mut PagedScanner,
        name: &str,
    ) -> Result<Option<Vec<Document>>> {
        let operation = format!("{}: page fetch", name);
        let mut attempt = 1;

        loop {
            match scanner.next_batch().await {
                Ok(batch) => return Ok(batch),
                Err(e) => {
                    if self
                        .config
                        .retry
                        .pause_before_retry(&operation, attempt, &e)
                        .await
                    {
                        attempt += 1;
                        continue;
                    }
                    error!(
                        "{}: page fetch failed after {} attempt(s): {}",
                        name, attempt, e
                    );
                    return Err(MigrateError::transfer(
                        name,
                        format!("scan failed after {} attempt(s): {}", attempt, e),
                    ));
                }
            }
        }
    }

    async fn process_document(
        &self,
        target: &dyn DocumentStore,
        target_ref: &CollectionRef,
        spec: &PartitionKeySpec,
        mut doc: Document,
        name: &str,
    ) -> ReconciliationOutcome {
        let Some(id) = doc.id().map(str::to_string) else {
            let err = MigrateError::MissingId {
                document: doc.to_json_string(),
            };
            error!("{}: {}", name, err);
            self.errors.fetch_add(1, Ordering::Relaxed);
            return ReconciliationOutcome::Error;
        };

        let pk = match spec.resolve(&mut doc) {
            Ok(pk) => pk,
            Err(e) => {
                if let MigrateError::InvalidPartitionKey { ref document, .. } = e {
                    error!("{}: {}; document excluded: {}", name, e, document);
                } else {
                    error!("{}: document {} excluded: {}", name, id, e);
                }
                self.errors.fetch_add(1, Ordering::Relaxed);
                return ReconciliationOutcome::Error;
            }
        };

        let outgoing = self.prepare(&doc, spec);
        let operation = format!("{}: document {}", name, id);
        let result = self
            .config
            .retry
            .run(&operation, |_| {
                self.write_once(target, target_ref, outgoing.clone(), &id, &pk)
            })
            .await;

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(
                    "{}: document {} (partition key {}) failed after retries: {}",
                    name, id, pk, e
                );
                ReconciliationOutcome::Error
            }
        };

        let counter = match outcome {
            ReconciliationOutcome::Inserted => &self.inserted,
            ReconciliationOutcome::Updated => &self.updated,
            ReconciliationOutcome::Skipped => &self.skipped,
            ReconciliationOutcome::Error => &self.errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        outcome
    }

    /// Outgoing copy: system fields removed, sanitized when enabled.
    fn prepare(&self, doc: &Document, spec: &PartitionKeySpec) -> Document {
        let stripped = doc.without_system_fields();
        match self.config.sanitizer {
            Some(ref sanitizer) => sanitizer.sanitize(&stripped, spec),
            None => stripped,
        }
    }

    /// One full read-compare-write attempt.
    async fn write_once(
        &self,
        target: &dyn DocumentStore,
        target_ref: &CollectionRef,
        doc: Document,
        id: &str,
        pk: &PartitionKeyValue,
    ) -> Result<ReconciliationOutcome> {
        let decision = self.policy.decide(doc, id, pk, target, target_ref).await?;
        debug!("{}: document {} -> {}", target_ref, id, decision.label());

        match decision {
            Decision::Insert(doc) => match target.insert_document(target_ref, &doc).await? {
                InsertOutcome::Created => Ok(ReconciliationOutcome::Inserted),
                InsertOutcome::Conflict => {
                    debug!(
                        "{}: document {} already exists, counting as skipped",
                        target_ref, id
                    );
                    Ok(ReconciliationOutcome::Skipped)
                }
            },
            Decision::Update(doc) => {
                target.replace_document(target_ref, id, &doc).await?;
                Ok(ReconciliationOutcome::Updated)
            }
            Decision::Skip => Ok(ReconciliationOutcome::Skipped),
        }
    }

    fn report(&self, collection: &str, stage: ProgressStage, total: u64) {
        if let Some(ref tx) = self.progress {
            let _ = tx.try_send(ProgressUpdate {
                collection: collection.to_string(),
                stage,
                processed: self.processed(),
                total,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CollectionProperties;
    use crate::store::MemoryStore;
    use serde_json::{json, Value};

    async fn store_with(docs: &[Value], pk: &str) -> Arc<dyn DocumentStore> {
        let store = MemoryStore::new("mem");
        store.create_database_if_not_exists("db").await.unwrap();
        store
            .get_or_create_collection(
                "db",
                &CollectionProperties {
                    id: "c".into(),
                    partition_key: PartitionKeySpec::single(pk).unwrap(),
                    indexing_policy: None,
                },
                None,
            )
            .await
            .unwrap();
        let coll = CollectionRef::new("db", "c");
        for doc in docs {
            store
                .insert_document(&coll, &Document::from_value(doc.clone()).unwrap())
                .await
                .unwrap();
        }
        Arc::new(store)
    }

    fn coll() -> CollectionRef {
        CollectionRef::new("db", "c")
    }

    #[tokio::test]
    async fn test_progress_updates_are_sent() {
        let source = store_with(&[json!({"id": "1", "pk": "a"}), json!({"id": "2", "pk": "b"})], "/pk").await;
        let target = store_with(&[], "/pk").await;
        let (tx, mut rx) = mpsc::channel(64);

        let engine = MigrationEngine::new(EngineConfig::default()).with_progress(tx);
        let result = engine.migrate(&source, &target, &coll(), &coll()).await.unwrap();
        assert_eq!(result.inserted, 2);
        assert_eq!(result.total, 2);

        let mut last = None;
        while let Ok(update) = rx.try_recv() {
            last = Some(update);
        }
        let last = last.unwrap();
        assert_eq!(last.processed, 2);
        assert_eq!(last.total, 2);
        assert_eq!(last.stage, ProgressStage::Transferring);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_writes_nothing() {
        let source = store_with(&[json!({"id": "1", "pk": "a"})], "/pk").await;
        let target = store_with(&[], "/pk").await;
        let token = CancellationToken::new();
        token.cancel();

        let engine = MigrationEngine::new(EngineConfig::default()).with_cancel(token);
        let result = engine.migrate(&source, &target, &coll(), &coll()).await.unwrap();
        assert!(result.cancelled);
        assert_eq!(result.processed, 0);
        assert!(result.resume_cursor.is_none());
        assert_eq!(target.count_documents(&coll()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_system_fields_are_not_copied_from_source() {
        let source = store_with(&[json!({"id": "1", "pk": "a"})], "/pk").await;
        let target = store_with(&[], "/pk").await;

        let engine = MigrationEngine::new(EngineConfig::default());
        engine.migrate(&source, &target, &coll(), &coll()).await.unwrap();

        let src = source
            .read_document(&coll(), "1", &PartitionKeyValue(vec![json!("a")]))
            .await
            .unwrap()
            .unwrap();
        let tgt = target
            .read_document(&coll(), "1", &PartitionKeyValue(vec![json!("a")]))
            .await
            .unwrap()
            .unwrap();
        assert!(tgt.get("_etag").is_some());
        assert_ne!(src.get("_etag"), tgt.get("_etag"));
        assert!(src.content_eq(&tgt));
    }

    #[test]
    fn test_throughput_is_zero_safe() {
        let result = MigrationResult {
            collection: "db/c".into(),
            inserted: 0,
            updated: 0,
            skipped: 0,
            errors: 0,
            processed: 0,
            total: 0,
            duration_seconds: 0.0,
            docs_per_second: 0.0,
            started_at: Utc::now(),
            completed_at: Utc::now(),
            cancelled: false,
            resume_cursor: None,
        };
        let json = result.to_json().unwrap();
        assert!(json.contains("\"docs_per_second\": 0.0"));
        assert!(!json.contains("resume_cursor"));
    }
}
