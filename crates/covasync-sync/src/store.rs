//! Storage seams for the sync engine.
//!
//! The orchestrator, batch job and publisher only see these traits. Writes
//! are key-scoped upserts, so concurrent stages never lock whole tables.
//! [`PgStore`] backs them with `covasync-db`.

use std::future::Future;

use covasync_core::{
    CatalogProduct, InventoryRecord, LinkedDownstreamRecord, PriceRecord, SyncCheckpoint,
};
use covasync_db::{EventLevel, RunCounts, UpsertOutcome};
use sqlx::PgPool;

use crate::error::StoreError;

/// Canonical product, price and inventory records.
pub trait CatalogStore: Send + Sync {
    fn upsert_product(
        &self,
        product: &CatalogProduct,
    ) -> impl Future<Output = Result<UpsertOutcome, StoreError>> + Send;

    fn upsert_price(
        &self,
        price: &PriceRecord,
    ) -> impl Future<Output = Result<UpsertOutcome, StoreError>> + Send;

    fn upsert_inventory(
        &self,
        record: &InventoryRecord,
    ) -> impl Future<Output = Result<UpsertOutcome, StoreError>> + Send;

    fn get_product(
        &self,
        product_id: &str,
    ) -> impl Future<Output = Result<Option<CatalogProduct>, StoreError>> + Send;

    /// Products ordered by ID.
    fn list_products(
        &self,
        offset: i64,
        limit: i64,
    ) -> impl Future<Output = Result<Vec<CatalogProduct>, StoreError>> + Send;

    fn count_products(&self) -> impl Future<Output = Result<i64, StoreError>> + Send;

    /// Most recently synced price row, ranking rows at `entity_id` first.
    fn latest_price(
        &self,
        product_id: &str,
        entity_id: Option<&str>,
    ) -> impl Future<Output = Result<Option<PriceRecord>, StoreError>> + Send;

    fn inventory_for_product(
        &self,
        product_id: &str,
        location_id: Option<&str>,
    ) -> impl Future<Output = Result<Vec<InventoryRecord>, StoreError>> + Send;
}

/// Per-job checkpoints plus the processed-key set of resumable jobs.
pub trait CheckpointStore: Send + Sync {
    fn load_checkpoint(
        &self,
        job: &str,
    ) -> impl Future<Output = Result<SyncCheckpoint, StoreError>> + Send;

    fn save_checkpoint(
        &self,
        job: &str,
        checkpoint: &SyncCheckpoint,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Clears the checkpoint and every processed key for `job`.
    fn reset_checkpoint(&self, job: &str) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn is_processed(
        &self,
        job: &str,
        key: &str,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    fn mark_processed(
        &self,
        job: &str,
        key: &str,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn count_processed(&self, job: &str) -> impl Future<Output = Result<i64, StoreError>> + Send;
}

/// Upstream product to downstream record links.
pub trait LinkStore: Send + Sync {
    fn get_link(
        &self,
        product_id: &str,
    ) -> impl Future<Output = Result<Option<LinkedDownstreamRecord>, StoreError>> + Send;

    fn save_link(
        &self,
        link: &LinkedDownstreamRecord,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn delete_link(&self, product_id: &str)
        -> impl Future<Output = Result<bool, StoreError>> + Send;

    fn list_links(
        &self,
    ) -> impl Future<Output = Result<Vec<LinkedDownstreamRecord>, StoreError>> + Send;
}

/// Run history and the operator-facing event log.
pub trait RunLog: Send + Sync {
    /// Records a new run and moves it to `running`. Returns its ID.
    fn start_run(
        &self,
        run_type: &str,
        trigger: &str,
    ) -> impl Future<Output = Result<i64, StoreError>> + Send;

    fn complete_run(
        &self,
        id: i64,
        counts: RunCounts,
        summary: &serde_json::Value,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn fail_run(
        &self,
        id: i64,
        message: &str,
        summary: Option<&serde_json::Value>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn record_event(
        &self,
        level: EventLevel,
        message: &str,
        context: &serde_json::Value,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Everything the engine needs from one backend.
pub trait SyncStore: CatalogStore + CheckpointStore + LinkStore + RunLog {}

impl<T> SyncStore for T where T: CatalogStore + CheckpointStore + LinkStore + RunLog {}

/// Appends an event, logging instead of failing when the log is unavailable.
pub(crate) async fn record_event_best_effort<S: RunLog>(
    store: &S,
    level: EventLevel,
    message: &str,
    context: serde_json::Value,
) {
    if let Err(e) = store.record_event(level, message, &context).await {
        tracing::warn!(error = %e, message, "failed to append sync event");
    }
}

// ---------------------------------------------------------------------------
// Postgres
// ---------------------------------------------------------------------------

/// [`SyncStore`] over a Postgres pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
    event_retention: i64,
}

impl PgStore {
    /// `event_retention` bounds the persisted event log to the newest N rows.
    #[must_use]
    pub fn new(pool: PgPool, event_retention: i64) -> Self {
        Self {
            pool,
            event_retention,
        }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl CatalogStore for PgStore {
    async fn upsert_product(&self, product: &CatalogProduct) -> Result<UpsertOutcome, StoreError> {
        Ok(covasync_db::upsert_product(&self.pool, product).await?)
    }

    async fn upsert_price(&self, price: &PriceRecord) -> Result<UpsertOutcome, StoreError> {
        Ok(covasync_db::upsert_price(&self.pool, price).await?)
    }

    async fn upsert_inventory(&self, record: &InventoryRecord) -> Result<UpsertOutcome, StoreError> {
        Ok(covasync_db::upsert_inventory(&self.pool, record).await?)
    }

    async fn get_product(&self, product_id: &str) -> Result<Option<CatalogProduct>, StoreError> {
        Ok(covasync_db::get_product(&self.pool, product_id).await?)
    }

    async fn list_products(
        &self,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<CatalogProduct>, StoreError> {
        Ok(covasync_db::list_products(&self.pool, offset, limit).await?)
    }

    async fn count_products(&self) -> Result<i64, StoreError> {
        Ok(covasync_db::count_products(&self.pool).await?)
    }

    async fn latest_price(
        &self,
        product_id: &str,
        entity_id: Option<&str>,
    ) -> Result<Option<PriceRecord>, StoreError> {
        Ok(covasync_db::latest_price(&self.pool, product_id, entity_id).await?)
    }

    async fn inventory_for_product(
        &self,
        product_id: &str,
        location_id: Option<&str>,
    ) -> Result<Vec<InventoryRecord>, StoreError> {
        Ok(covasync_db::inventory_for_product(&self.pool, product_id, location_id).await?)
    }
}

impl CheckpointStore for PgStore {
    async fn load_checkpoint(&self, job: &str) -> Result<SyncCheckpoint, StoreError> {
        Ok(covasync_db::load_checkpoint(&self.pool, job).await?)
    }

    async fn save_checkpoint(&self, job: &str, checkpoint: &SyncCheckpoint) -> Result<(), StoreError> {
        Ok(covasync_db::save_checkpoint(&self.pool, job, checkpoint).await?)
    }

    async fn reset_checkpoint(&self, job: &str) -> Result<(), StoreError> {
        Ok(covasync_db::reset_checkpoint(&self.pool, job).await?)
    }

    async fn is_processed(&self, job: &str, key: &str) -> Result<bool, StoreError> {
        Ok(covasync_db::is_key_processed(&self.pool, job, key).await?)
    }

    async fn mark_processed(&self, job: &str, key: &str) -> Result<(), StoreError> {
        Ok(covasync_db::mark_key_processed(&self.pool, job, key).await?)
    }

    async fn count_processed(&self, job: &str) -> Result<i64, StoreError> {
        Ok(covasync_db::count_processed_keys(&self.pool, job).await?)
    }
}

impl LinkStore for PgStore {
    async fn get_link(&self, product_id: &str) -> Result<Option<LinkedDownstreamRecord>, StoreError> {
        Ok(covasync_db::get_downstream_link(&self.pool, product_id).await?)
    }

    async fn save_link(&self, link: &LinkedDownstreamRecord) -> Result<(), StoreError> {
        Ok(covasync_db::upsert_downstream_link(&self.pool, link).await?)
    }

    async fn delete_link(&self, product_id: &str) -> Result<bool, StoreError> {
        Ok(covasync_db::delete_downstream_link(&self.pool, product_id).await?)
    }

    async fn list_links(&self) -> Result<Vec<LinkedDownstreamRecord>, StoreError> {
        Ok(covasync_db::list_downstream_links(&self.pool).await?)
    }
}

impl RunLog for PgStore {
    async fn start_run(&self, run_type: &str, trigger: &str) -> Result<i64, StoreError> {
        let run = covasync_db::create_sync_run(&self.pool, run_type, trigger).await?;
        covasync_db::start_sync_run(&self.pool, run.id).await?;
        Ok(run.id)
    }

    async fn complete_run(
        &self,
        id: i64,
        counts: RunCounts,
        summary: &serde_json::Value,
    ) -> Result<(), StoreError> {
        Ok(covasync_db::complete_sync_run(&self.pool, id, counts, summary).await?)
    }

    async fn fail_run(
        &self,
        id: i64,
        message: &str,
        summary: Option<&serde_json::Value>,
    ) -> Result<(), StoreError> {
        Ok(covasync_db::fail_sync_run(&self.pool, id, message, summary).await?)
    }

    async fn record_event(
        &self,
        level: EventLevel,
        message: &str,
        context: &serde_json::Value,
    ) -> Result<(), StoreError> {
        Ok(
            covasync_db::record_sync_event(&self.pool, level, message, context, self.event_retention)
                .await?,
        )
    }
}
