//! Sequencing of the catalog, price and inventory stages.
//!
//! The catalog stage chooses a full or incremental traversal from the
//! persisted checkpoint and saves the next offset after every batch, so an
//! interrupted run resumes where it stopped. On completion the checkpoint
//! is reset to offset zero and stamped with the run's start time.
//!
//! Stages are independent: a failed stage is recorded in the report and the
//! next stage still runs. No transaction spans a run, so dropping a run
//! future (shutdown, abort) keeps every upsert and checkpoint committed so
//! far.

use std::fmt;

use chrono::{DateTime, Utc};
use covasync_core::{AppConfig, InventoryRecord, SyncCheckpoint};
use covasync_db::{EventLevel, RunCounts};
use covasync_upstream::{availability_inventory, NormalizeContext, Resource, UpstreamClient};
use serde::Serialize;
use serde_json::json;

use crate::error::{StoreError, SyncError};
use crate::reconcile::{CatalogStats, ProductReconciled, ReconcileStats, Reconciler};
use crate::store::{record_event_best_effort, CatalogStore, CheckpointStore, RunLog};

/// Checkpoint name of the catalog traversal.
pub const CATALOG_JOB: &str = "catalog";
/// Checkpoint name of the batch image job.
pub const IMAGES_JOB: &str = "images";
/// Checkpoint name holding the last publish time.
pub const PUBLISH_JOB: &str = "publish";

/// Page size used when walking stored products.
const STORED_PAGE_SIZE: i64 = 500;
/// Product IDs listed in a data-quality event before truncating.
const EVENT_ID_SAMPLE: usize = 20;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    #[default]
    Cli,
    Scheduler,
    Api,
}

impl TriggerSource {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cli => "cli",
            Self::Scheduler => "scheduler",
            Self::Api => "api",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Catalog,
    Prices,
    Inventory,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Catalog => write!(f, "catalog"),
            Self::Prices => write!(f, "prices"),
            Self::Inventory => write!(f, "inventory"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    Full,
    Incremental,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// Ignore the last-sync timestamp and traverse the whole catalog from
    /// offset zero.
    pub force_full: bool,
    pub trigger: TriggerSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorSettings {
    pub catalog_page_size: u32,
    pub price_page_size: u32,
    /// In-flight upserts per batch.
    pub concurrency: usize,
}

impl OrchestratorSettings {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            catalog_page_size: config.upstream.catalog_page_size,
            price_page_size: config.upstream.price_page_size,
            concurrency: config.sync_concurrency,
        }
    }
}

/// Outcome of one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageReport {
    pub stage: Stage,
    pub stats: ReconcileStats,
    /// Price rows taken from catalog `Pricing` entries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedded_prices: Option<ReconcileStats>,
    /// Inventory rows taken from catalog `Availability` entries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub availability: Option<ReconcileStats>,
    /// Where the stage's records came from, when there is a choice.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Stage-level failure. Record-level failures only appear in `stats`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StageReport {
    fn new(stage: Stage) -> Self {
        Self {
            stage,
            stats: ReconcileStats::default(),
            embedded_prices: None,
            availability: None,
            source: None,
            error: None,
        }
    }

    fn with_catalog_stats(mut self, stats: CatalogStats) -> Self {
        self.stats = stats.products;
        self.embedded_prices = Some(stats.embedded_prices);
        self.availability = Some(stats.availability);
        self
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    fn all_stats(&self) -> impl Iterator<Item = &ReconcileStats> {
        std::iter::once(&self.stats)
            .chain(self.embedded_prices.as_ref())
            .chain(self.availability.as_ref())
    }

    #[must_use]
    pub fn counts(&self) -> RunCounts {
        RunCounts {
            processed: self.all_stats().map(ReconcileStats::processed).sum(),
            failed: self.all_stats().map(|s| s.failed).sum(),
        }
    }
}

/// Outcome of an orchestrated run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub run_id: i64,
    /// `None` for runs without a catalog stage, or when the checkpoint could
    /// not be read.
    pub mode: Option<SyncMode>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub stages: Vec<StageReport>,
}

impl SyncReport {
    /// `true` when no stage failed. Skipped records do not count as failure.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.stages.iter().all(StageReport::is_success)
    }

    #[must_use]
    pub fn stage(&self, stage: Stage) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.stage == stage)
    }

    #[must_use]
    pub fn counts(&self) -> RunCounts {
        self.stages
            .iter()
            .map(StageReport::counts)
            .fold(RunCounts::default(), |acc, c| RunCounts {
                processed: acc.processed + c.processed,
                failed: acc.failed + c.failed,
            })
    }

    fn failure_message(&self) -> Option<String> {
        let failures: Vec<String> = self
            .stages
            .iter()
            .filter_map(|s| s.error.as_ref().map(|e| format!("{}: {e}", s.stage)))
            .collect();
        (!failures.is_empty()).then(|| failures.join("; "))
    }
}

/// Runs sync stages against one upstream client and one store.
pub struct SyncOrchestrator<'a, S> {
    client: &'a UpstreamClient,
    store: &'a S,
    settings: OrchestratorSettings,
}

impl<'a, S> SyncOrchestrator<'a, S>
where
    S: CatalogStore + CheckpointStore + RunLog,
{
    #[must_use]
    pub fn new(client: &'a UpstreamClient, store: &'a S, settings: OrchestratorSettings) -> Self {
        Self {
            client,
            store,
            settings,
        }
    }

    /// Runs catalog, price and inventory stages in order and records the run.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Store`] only when the run record cannot be
    /// created. Stage failures are reported in the returned [`SyncReport`].
    pub async fn run(&self, options: SyncOptions) -> Result<SyncReport, SyncError> {
        let started_at = Utc::now();
        let run_id = self.store.start_run("sync", options.trigger.as_str()).await?;
        tracing::info!(run_id, trigger = options.trigger.as_str(), "sync run started");

        let reconciler = self.reconciler(started_at);
        let (mode, catalog) = self
            .catalog_stage(&reconciler, options.force_full, started_at)
            .await;
        let prices = self.price_stage(&reconciler).await;
        let inventory = self.inventory_stage(&reconciler).await;

        let report = SyncReport {
            run_id,
            mode,
            started_at,
            finished_at: Utc::now(),
            stages: vec![catalog, prices, inventory],
        };
        self.finish_run(&report).await;
        Ok(report)
    }

    /// Runs only the price stage as its own recorded run.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Store`] when the run record cannot be created.
    pub async fn run_prices(&self, trigger: TriggerSource) -> Result<SyncReport, SyncError> {
        self.run_single("prices", trigger, |reconciler| async move {
            self.price_stage(&reconciler).await
        })
        .await
    }

    /// Runs only the inventory stage as its own recorded run.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Store`] when the run record cannot be created.
    pub async fn run_inventory(&self, trigger: TriggerSource) -> Result<SyncReport, SyncError> {
        self.run_single("inventory", trigger, |reconciler| async move {
            self.inventory_stage(&reconciler).await
        })
        .await
    }

    /// Fetches one product by upstream ID and reconciles it.
    ///
    /// Returns `Ok(None)` when the upstream does not know the product.
    ///
    /// # Errors
    ///
    /// - [`SyncError::Upstream`] when the fetch fails.
    /// - [`SyncError::Reconcile`] when the payload cannot be stored.
    pub async fn sync_product(
        &self,
        product_id: &str,
    ) -> Result<Option<ProductReconciled>, SyncError> {
        let Some(raw) = self.client.fetch_product(product_id).await? else {
            tracing::info!(product_id, "upstream has no such product");
            return Ok(None);
        };
        let reconciled = self.reconciler(Utc::now()).upsert_product(&raw).await?;
        tracing::info!(
            product_id,
            outcome = ?reconciled.outcome,
            "reconciled single product"
        );
        Ok(Some(reconciled))
    }

    fn reconciler(&self, synced_at: DateTime<Utc>) -> Reconciler<'a, S> {
        let ctx = NormalizeContext {
            synced_at,
            default_location: self.client.location_id().map(str::to_owned),
        };
        Reconciler::new(self.store, ctx, self.settings.concurrency)
    }

    async fn run_single<F, Fut>(
        &self,
        run_type: &'static str,
        trigger: TriggerSource,
        stage: F,
    ) -> Result<SyncReport, SyncError>
    where
        F: FnOnce(Reconciler<'a, S>) -> Fut,
        Fut: std::future::Future<Output = StageReport>,
    {
        let started_at = Utc::now();
        let run_id = self.store.start_run(run_type, trigger.as_str()).await?;
        tracing::info!(run_id, run_type, trigger = trigger.as_str(), "sync run started");

        let stage_report = stage(self.reconciler(started_at)).await;
        let report = SyncReport {
            run_id,
            mode: None,
            started_at,
            finished_at: Utc::now(),
            stages: vec![stage_report],
        };
        self.finish_run(&report).await;
        Ok(report)
    }

    // -----------------------------------------------------------------------
    // Stages
    // -----------------------------------------------------------------------

    async fn catalog_stage(
        &self,
        reconciler: &Reconciler<'a, S>,
        force_full: bool,
        started_at: DateTime<Utc>,
    ) -> (Option<SyncMode>, StageReport) {
        let mut report = StageReport::new(Stage::Catalog);

        let checkpoint = match self.store.load_checkpoint(CATALOG_JOB).await {
            Ok(checkpoint) => checkpoint,
            Err(e) => {
                tracing::error!(error = %e, "failed to load catalog checkpoint");
                report.error = Some(format!("failed to load checkpoint: {e}"));
                return (None, report);
            }
        };

        let (mode, resource) = match checkpoint.last_sync_at {
            Some(since) if !force_full => (SyncMode::Incremental, Resource::CatalogUpdatedSince(since)),
            _ => (SyncMode::Full, Resource::Catalog),
        };
        // Offsets saved during a full walk clear the timestamp so an
        // interrupted full walk resumes as a full walk.
        let since = match mode {
            SyncMode::Incremental => checkpoint.last_sync_at,
            SyncMode::Full => None,
        };
        let resume_from = if force_full {
            0
        } else {
            u64::try_from(checkpoint.batch_offset).unwrap_or(0)
        };

        tracing::info!(
            mode = ?mode,
            resource = %resource,
            resume_from,
            "catalog stage started"
        );

        let mut stats = CatalogStats::default();
        let mut pager = self
            .client
            .fetch_all(resource, self.settings.catalog_page_size)
            .starting_at(resume_from);

        loop {
            let batch = match pager.next_batch().await {
                Ok(Some(batch)) => batch,
                Ok(None) => break,
                Err(e) => {
                    tracing::error!(error = %e, offset = pager.offset(), "catalog stage aborted");
                    report.error = Some(e.to_string());
                    return (Some(mode), report.with_catalog_stats(stats));
                }
            };

            stats.merge(reconciler.reconcile_products(&batch.records).await);

            let progress = SyncCheckpoint {
                last_sync_at: since,
                batch_offset: i64::try_from(batch.next_offset).unwrap_or(i64::MAX),
            };
            if let Err(e) = self.store.save_checkpoint(CATALOG_JOB, &progress).await {
                tracing::error!(error = %e, "failed to persist catalog offset");
                report.error = Some(format!("failed to save checkpoint: {e}"));
                return (Some(mode), report.with_catalog_stats(stats));
            }
        }

        let completed = SyncCheckpoint {
            last_sync_at: Some(started_at),
            batch_offset: 0,
        };
        if let Err(e) = self.store.save_checkpoint(CATALOG_JOB, &completed).await {
            tracing::error!(error = %e, "failed to stamp completed catalog sync");
            report.error = Some(format!("failed to save checkpoint: {e}"));
        }

        let report = report.with_catalog_stats(stats);
        log_stage(&report);
        (Some(mode), report)
    }

    async fn price_stage(&self, reconciler: &Reconciler<'a, S>) -> StageReport {
        let mut report = StageReport::new(Stage::Prices);
        let mut pager = self
            .client
            .fetch_all(Resource::Prices, self.settings.price_page_size);

        loop {
            match pager.next_batch().await {
                Ok(Some(batch)) => report
                    .stats
                    .merge(reconciler.reconcile_prices(&batch.records).await),
                Ok(None) => break,
                Err(e) => {
                    tracing::error!(error = %e, offset = pager.offset(), "price stage aborted");
                    report.error = Some(e.to_string());
                    break;
                }
            }
        }

        log_stage(&report);
        report
    }

    /// Re-derives stock from stored availability entries, falling back to
    /// the inventory endpoints when no stored product carries any.
    async fn inventory_stage(&self, reconciler: &Reconciler<'a, S>) -> StageReport {
        let mut report = StageReport::new(Stage::Inventory);

        match self.stored_availability(reconciler.context()).await {
            Ok(rows) if !rows.is_empty() => {
                report.source = Some("availability".to_owned());
                report.stats = reconciler.store_inventory(rows).await;
                log_stage(&report);
                return report;
            }
            Ok(_) => tracing::debug!("no stored availability; querying inventory endpoints"),
            Err(e) => tracing::warn!(
                error = %e,
                "could not read stored products; querying inventory endpoints"
            ),
        }

        match self.client.fetch_inventory().await {
            Ok(fetch) => {
                report.source = fetch.endpoint.clone();
                report.stats = reconciler.reconcile_inventory(&fetch.records).await;
            }
            Err(e) => {
                tracing::error!(error = %e, "inventory stage aborted");
                report.error = Some(e.to_string());
            }
        }

        log_stage(&report);
        report
    }

    async fn stored_availability(
        &self,
        ctx: &NormalizeContext,
    ) -> Result<Vec<InventoryRecord>, StoreError> {
        let mut rows = Vec::new();
        let mut offset = 0_i64;
        loop {
            let page = self.store.list_products(offset, STORED_PAGE_SIZE).await?;
            let fetched = i64::try_from(page.len()).unwrap_or(i64::MAX);
            rows.extend(
                page.iter()
                    .filter(|p| !p.is_archived)
                    .flat_map(|p| availability_inventory(&p.product_id, &p.raw, ctx)),
            );
            if fetched < STORED_PAGE_SIZE {
                return Ok(rows);
            }
            offset += fetched;
        }
    }

    // -----------------------------------------------------------------------
    // Run bookkeeping
    // -----------------------------------------------------------------------

    async fn finish_run(&self, report: &SyncReport) {
        let summary = match serde_json::to_value(report) {
            Ok(summary) => summary,
            Err(e) => {
                tracing::warn!(error = %e, "could not serialize sync report");
                serde_json::Value::Null
            }
        };
        let counts = report.counts();

        let recorded = match report.failure_message() {
            None => {
                self.store
                    .complete_run(report.run_id, counts, &summary)
                    .await
            }
            Some(message) => {
                self.store
                    .fail_run(report.run_id, &message, Some(&summary))
                    .await
            }
        };
        if let Err(e) = recorded {
            tracing::error!(run_id = report.run_id, error = %e, "failed to record sync run outcome");
        }

        self.record_events(report, counts).await;

        tracing::info!(
            run_id = report.run_id,
            success = report.is_success(),
            processed = counts.processed,
            failed = counts.failed,
            "sync run finished"
        );
    }

    async fn record_events(&self, report: &SyncReport, counts: RunCounts) {
        for stage in report.stages.iter().filter(|s| !s.is_success()) {
            record_event_best_effort(
                self.store,
                EventLevel::Error,
                &format!("{} stage failed", stage.stage),
                json!({"run_id": report.run_id, "error": stage.error}),
            )
            .await;
        }

        let fallbacks: Vec<&String> = report
            .stages
            .iter()
            .flat_map(|s| &s.stats.sku_fallbacks)
            .collect();
        if !fallbacks.is_empty() {
            record_event_best_effort(
                self.store,
                EventLevel::Warn,
                &format!("{} products have no merchant SKU", fallbacks.len()),
                json!({
                    "run_id": report.run_id,
                    "product_ids": fallbacks.iter().take(EVENT_ID_SAMPLE).collect::<Vec<_>>(),
                }),
            )
            .await;
        }

        if counts.failed > 0 {
            record_event_best_effort(
                self.store,
                EventLevel::Warn,
                &format!("{} records skipped", counts.failed),
                json!({"run_id": report.run_id}),
            )
            .await;
        }

        let level = if report.is_success() {
            EventLevel::Info
        } else {
            EventLevel::Error
        };
        record_event_best_effort(
            self.store,
            level,
            if report.is_success() {
                "sync completed"
            } else {
                "sync finished with errors"
            },
            json!({
                "run_id": report.run_id,
                "mode": report.mode,
                "processed": counts.processed,
                "failed": counts.failed,
            }),
        )
        .await;
    }
}

fn log_stage(report: &StageReport) {
    tracing::info!(
        stage = %report.stage,
        inserted = report.stats.inserted,
        updated = report.stats.updated,
        unchanged = report.stats.unchanged,
        failed = report.stats.failed,
        source = report.source.as_deref().unwrap_or("upstream"),
        "stage finished"
    );
}
