//! Migration orchestrator - main workflow coordinator.

use crate::collection::CollectionManager;
use crate::config::Config;
use crate::core::{CollectionRef, DocumentStore};
use crate::error::{MigrateError, Result};
use crate::state::{MigrationState, RunStatus};
use crate::store;
use crate::transfer::{EngineConfig, MigrationEngine, MigrationResult, ProgressStage, ProgressUpdate};
use crate::verify::{VerificationCounter, VerificationResult};
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// A spawned collection migration once joined: slot index, name, outcome.
type JoinedTask = (usize, String, std::result::Result<CollectionReport, JoinError>);

/// Migration orchestrator.
pub struct Orchestrator {
    config: Config,
    state_file: Option<PathBuf>,
    state: Option<MigrationState>,
    source: Arc<dyn DocumentStore>,
    target: Arc<dyn DocumentStore>,
    progress: Option<mpsc::Sender<ProgressUpdate>>,
}

/// Final state of one collection in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionStatus {
    Completed,
    Failed,
    Cancelled,
    /// Completed by an earlier run (resume).
    Skipped,
}

/// Per-collection section of a [`MigrationReport`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionReport {
    pub collection: String,
    pub status: CollectionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<MigrationResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification: Option<VerificationResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of a migration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationReport {
    /// Unique run identifier.
    pub run_id: String,

    /// Source store name.
    pub source: String,

    /// Target store name.
    pub target: String,

    /// Final status.
    pub status: RunStatus,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// When the migration started.
    pub started_at: DateTime<Utc>,

    /// When the migration completed.
    pub completed_at: DateTime<Utc>,

    pub collections_total: usize,
    pub collections_failed: usize,
    pub inserted: u64,
    pub updated: u64,
    pub skipped: u64,
    pub errors: u64,

    /// Per database, the collections processed in this run.
    pub databases: BTreeMap<String, Vec<CollectionReport>>,
}

/// Connectivity of both stores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub source_connected: bool,
    pub source_latency_ms: u64,
    pub source_error: Option<String>,
    pub target_connected: bool,
    pub target_latency_ms: u64,
    pub target_error: Option<String>,
    pub healthy: bool,
}

impl Orchestrator {
    /// Create a new orchestrator, opening the configured stores.
    pub fn new(config: Config) -> Result<Self> {
        let source = store::open(&config.source)?;
        let target = store::open(&config.target)?;
        Ok(Self::with_stores(config, source, target))
    }

    /// Create an orchestrator over already-opened stores.
    pub fn with_stores(
        config: Config,
        source: Arc<dyn DocumentStore>,
        target: Arc<dyn DocumentStore>,
    ) -> Self {
        Self {
            config,
            state_file: None,
            state: None,
            source,
            target,
            progress: None,
        }
    }

    /// Set the state file path for resume capability.
    pub fn with_state_file(mut self, path: PathBuf) -> Self {
        self.state_file = Some(path);
        self
    }

    /// Send per-document progress updates to `tx`.
    pub fn with_progress(mut self, tx: mpsc::Sender<ProgressUpdate>) -> Self {
        self.progress = Some(tx);
        self
    }

    /// Load existing state for resume.
    pub fn resume(mut self) -> Result<Self> {
        if let Some(ref path) = self.state_file {
            if path.exists() {
                let state = MigrationState::load(path)?;
                state.validate_config(&self.config.hash())?;
                info!("Resuming run {} from state file: {:?}", state.run_id, path);
                self.state = Some(state);
            }
        }
        Ok(self)
    }

    pub fn source(&self) -> &Arc<dyn DocumentStore> {
        &self.source
    }

    pub fn target(&self) -> &Arc<dyn DocumentStore> {
        &self.target
    }

    /// Test both store connections.
    pub async fn health_check(&self) -> HealthCheckResult {
        let (source_connected, source_latency_ms, source_error) =
            check_store(self.source.as_ref()).await;
        let (target_connected, target_latency_ms, target_error) =
            check_store(self.target.as_ref()).await;
        HealthCheckResult {
            source_connected,
            source_latency_ms,
            source_error,
            target_connected,
            target_latency_ms,
            target_error,
            healthy: source_connected && target_connected,
        }
    }

    /// Run the migration.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<MigrationReport> {
        let started_at = Utc::now();
        let run_id = self
            .state
            .as_ref()
            .map(|s| s.run_id.clone())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        info!(
            "Starting migration run {}: {} -> {}",
            run_id,
            self.source.name(),
            self.target.name()
        );

        // Phase 1: Connectivity
        let health = self.health_check().await;
        if !health.healthy {
            let (store, message) = if let Some(e) = health.source_error {
                (self.source.name().to_string(), e)
            } else {
                (
                    self.target.name().to_string(),
                    health.target_error.unwrap_or_default(),
                )
            };
            error!("Connectivity check failed for {}: {}", store, message);
            return Err(MigrateError::connectivity(store, message));
        }

        // Phase 2: Scope
        let collections = self.collections_in_scope().await?;
        info!("Found {} collection(s) to migrate", collections.len());

        let mut state = self
            .state
            .take()
            .unwrap_or_else(|| MigrationState::new(run_id.clone(), self.config.hash()));
        state.status = RunStatus::Running;
        for coll in &collections {
            state.get_or_create_collection(&coll.full_name());
        }
        self.save_state(&mut state)?;

        // Phase 3: Transfer
        let reports = match self.transfer_collections(&collections, &mut state, &cancel).await {
            Ok(reports) => reports,
            Err(e) => {
                error!("Migration aborted: {}", e);
                if let Err(close_err) = self.close_stores().await {
                    warn!("Failed to close stores after abort: {}", close_err);
                }
                return Err(e);
            }
        };

        // Phase 4: Summarize
        let completed_at = Utc::now();
        let duration_seconds = (completed_at - started_at).num_milliseconds() as f64 / 1000.0;

        let collections_failed = reports
            .iter()
            .filter(|(_, r)| r.status == CollectionStatus::Failed)
            .count();
        let status = if collections_failed > 0 {
            RunStatus::Failed
        } else if cancel.is_cancelled() {
            RunStatus::Cancelled
        } else {
            RunStatus::Completed
        };
        state.finish(status);
        let saved = self.save_state(&mut state);

        let mut report = MigrationReport {
            run_id,
            source: self.source.name().to_string(),
            target: self.target.name().to_string(),
            status,
            duration_seconds,
            started_at,
            completed_at,
            collections_total: reports.len(),
            collections_failed,
            inserted: 0,
            updated: 0,
            skipped: 0,
            errors: 0,
            databases: BTreeMap::new(),
        };
        for (coll, collection_report) in reports {
            if let Some(ref result) = collection_report.result {
                report.inserted += result.inserted;
                report.updated += result.updated;
                report.skipped += result.skipped;
                report.errors += result.errors;
            }
            report
                .databases
                .entry(coll.database.clone())
                .or_default()
                .push(collection_report);
        }

        self.close_stores().await?;
        saved?;

        info!(
            "Migration {}: {} collection(s), {} inserted, {} updated, {} skipped, {} errors in {:.1}s",
            report.status.as_str(),
            report.collections_total,
            report.inserted,
            report.updated,
            report.skipped,
            report.errors,
            report.duration_seconds
        );

        Ok(report)
    }

    /// Collections selected by `migration.database` / `migration.container`.
    async fn collections_in_scope(&self) -> Result<Vec<CollectionRef>> {
        let migration = &self.config.migration;
        let manager = CollectionManager::new(self.source.clone(), self.target.clone());

        let databases = match migration.database {
            Some(ref db) => vec![db.clone()],
            None => manager.list_databases().await?,
        };

        let mut collections = Vec::new();
        for database in databases {
            match migration.container {
                Some(ref container) => collections.push(CollectionRef::new(&database, container)),
                None => {
                    for collection in manager.list_collections(&database).await? {
                        collections.push(CollectionRef::new(&database, collection));
                    }
                }
            }
        }
        Ok(collections)
    }

    /// Migrate every collection, up to `workers` at a time. Returns a report
    /// for every collection that was started or skipped, in input order.
    ///
    /// State is saved as each collection starts and finishes. On error no new
    /// collection starts, and the ones already running are joined first.
    async fn transfer_collections(
        &self,
        collections: &[CollectionRef],
        state: &mut MigrationState,
        cancel: &CancellationToken,
    ) -> Result<Vec<(CollectionRef, CollectionReport)>> {
        let workers = self.config.migration.workers.max(1);
        let semaphore = Arc::new(Semaphore::new(workers));
        let engine_config = EngineConfig::from(&self.config.migration);
        let verify = self.config.migration.verify;

        info!("Transferring with {} worker(s)", workers);

        let mut slots: Vec<Option<CollectionReport>> = vec![None; collections.len()];
        let mut running: FuturesUnordered<BoxFuture<'static, JoinedTask>> = FuturesUnordered::new();
        let mut failure: Option<MigrateError> = None;

        for (idx, coll) in collections.iter().enumerate() {
            let name = coll.full_name();

            if state.is_collection_completed(&name) {
                info!("{}: already completed, skipping", name);
                slots[idx] = Some(CollectionReport {
                    collection: name,
                    status: CollectionStatus::Skipped,
                    result: None,
                    verification: None,
                    error: None,
                });
                continue;
            }

            if cancel.is_cancelled() {
                info!("Cancellation requested, stopping new transfers");
                break;
            }

            // Record collections that finish while waiting for a worker.
            let acquired = loop {
                tokio::select! {
                    acquired = semaphore.clone().acquire_owned() => break acquired,
                    Some(joined) = running.next(), if !running.is_empty() => {
                        if let Err(e) = self.finish_collection(state, &mut slots, joined) {
                            failure.get_or_insert(e);
                        }
                    }
                }
            };
            if failure.is_some() {
                break;
            }
            let permit = match acquired {
                Ok(permit) => permit,
                Err(e) => {
                    failure = Some(MigrateError::transfer(
                        &name,
                        format!("worker pool closed: {}", e),
                    ));
                    break;
                }
            };

            let coll_state = state.get_or_create_collection(&name);
            coll_state.mark_in_progress();
            let resume_cursor = coll_state.cursor.clone();
            if let Err(e) = self.save_state(state) {
                failure = Some(e);
                break;
            }

            let task = CollectionTask {
                source: self.source.clone(),
                target: self.target.clone(),
                collection: coll.clone(),
                engine_config: engine_config.clone(),
                verify,
                cancel: cancel.clone(),
                progress: self.progress.clone(),
                resume_cursor,
            };

            let handle = tokio::spawn(async move {
                let report = task.run().await;
                drop(permit);
                report
            });
            running.push(async move { (idx, name, handle.await) }.boxed());
        }

        while let Some(joined) = running.next().await {
            if let Err(e) = self.finish_collection(state, &mut slots, joined) {
                failure.get_or_insert(e);
            }
        }

        if let Some(e) = failure {
            return Err(e);
        }
        Ok(collections
            .iter()
            .cloned()
            .zip(slots)
            .filter_map(|(coll, slot)| slot.map(|report| (coll, report)))
            .collect())
    }

    /// Fold a finished collection into the state and save it.
    fn finish_collection(
        &self,
        state: &mut MigrationState,
        slots: &mut [Option<CollectionReport>],
        (idx, name, joined): JoinedTask,
    ) -> Result<()> {
        let report = match joined {
            Ok(report) => report,
            Err(e) => {
                error!("{}: task panicked - {}", name, e);
                CollectionReport {
                    collection: name.clone(),
                    status: CollectionStatus::Failed,
                    result: None,
                    verification: None,
                    error: Some(format!("Task panicked: {}", e)),
                }
            }
        };

        let coll_state = state.get_or_create_collection(&name);
        match (report.status, report.result.as_ref()) {
            (CollectionStatus::Failed, _) => {
                coll_state.mark_failed(report.error.as_deref().unwrap_or("unknown error"))
            }
            (_, Some(result)) => coll_state.record(result),
            (_, None) => {}
        }
        slots[idx] = Some(report);
        self.save_state(state)
    }

    /// Close both stores, returning the first error.
    async fn close_stores(&self) -> Result<()> {
        let source = self.source.close().await;
        let target = self.target.close().await;
        source.and(target)
    }

    /// Save state to file.
    fn save_state(&self, state: &mut MigrationState) -> Result<()> {
        if let Some(ref path) = self.state_file {
            state.save(path)?;
        }
        Ok(())
    }

    /// Compare document counts of every collection in scope.
    pub async fn validate(&self) -> Result<BTreeMap<String, VerificationResult>> {
        let counter = VerificationCounter::new();
        let mut results = BTreeMap::new();

        for coll in self.collections_in_scope().await? {
            let result = counter
                .verify(self.source.as_ref(), self.target.as_ref(), &coll, &coll)
                .await;
            results.insert(coll.full_name(), result);
        }

        Ok(results)
    }
}

async fn check_store(store: &dyn DocumentStore) -> (bool, u64, Option<String>) {
    let start = Instant::now();
    let result = store.health_check().await;
    let latency = start.elapsed().as_millis() as u64;
    match result {
        Ok(()) => (true, latency, None),
        Err(e) => {
            warn!("{}: health check failed: {}", store.name(), e);
            (false, latency, Some(e.to_string()))
        }
    }
}

/// Everything one spawned collection migration needs.
struct CollectionTask {
    source: Arc<dyn DocumentStore>,
    target: Arc<dyn DocumentStore>,
    collection: CollectionRef,
    engine_config: EngineConfig,
    verify: bool,
    cancel: CancellationToken,
    progress: Option<mpsc::Sender<ProgressUpdate>>,
    resume_cursor: Option<crate::core::ScanCursor>,
}

impl CollectionTask {
    async fn run(self) -> CollectionReport {
        let name = self.collection.full_name();
        self.report_stage(ProgressStage::Preparing, 0, 0);

        let manager = CollectionManager::new(self.source.clone(), self.target.clone());
        if let Err(e) = manager.prepare(&self.collection, &self.collection).await {
            return self.failed(e);
        }

        let mut engine = MigrationEngine::new(self.engine_config.clone())
            .with_cancel(self.cancel.clone())
            .with_resume_cursor(self.resume_cursor.clone());
        if let Some(ref tx) = self.progress {
            engine = engine.with_progress(tx.clone());
        }

        let result = match engine
            .migrate(&self.source, &self.target, &self.collection, &self.collection)
            .await
        {
            Ok(result) => result,
            Err(e) => return self.failed(e),
        };

        if result.cancelled {
            return CollectionReport {
                collection: name,
                status: CollectionStatus::Cancelled,
                result: Some(result),
                verification: None,
                error: None,
            };
        }

        let verification = if self.verify {
            self.report_stage(ProgressStage::Verifying, result.processed, result.total);
            Some(
                VerificationCounter::new()
                    .verify(
                        self.source.as_ref(),
                        self.target.as_ref(),
                        &self.collection,
                        &self.collection,
                    )
                    .await,
            )
        } else {
            None
        };

        self.report_stage(ProgressStage::Completed, result.processed, result.total);
        CollectionReport {
            collection: name,
            status: CollectionStatus::Completed,
            result: Some(result),
            verification,
            error: None,
        }
    }

    fn failed(&self, e: MigrateError) -> CollectionReport {
        error!("{}: failed - {}", self.collection, e);
        self.report_stage(ProgressStage::Failed, 0, 0);
        CollectionReport {
            collection: self.collection.full_name(),
            status: CollectionStatus::Failed,
            result: None,
            verification: None,
            error: Some(e.to_string()),
        }
    }

    fn report_stage(&self, stage: ProgressStage, processed: u64, total: u64) {
        if let Some(ref tx) = self.progress {
            let _ = tx.try_send(ProgressUpdate {
                collection: self.collection.full_name(),
                stage,
                processed,
                total,
            });
        }
    }
}

impl MigrationReport {
    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the report as pretty JSON.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// All collection reports, across databases.
    pub fn collections(&self) -> impl Iterator<Item = &CollectionReport> {
        self.databases.values().flatten()
    }

    /// Report for `database/collection`.
    pub fn collection(&self, full_name: &str) -> Option<&CollectionReport> {
        self.collections().find(|r| r.collection == full_name)
    }
}
