//! Propagation of canonical records to the downstream commerce catalog.
//!
//! A product is linked to exactly one downstream record through the link
//! store. The first publish creates the record and the link; later
//! publishes update the linked record in place. After every write the SKU
//! the downstream actually kept is compared with the one sent and
//! re-applied once on mismatch.

mod catalog;
mod sku_repair;
mod woocommerce;

use chrono::{DateTime, Utc};
use covasync_core::{
    fallback_sku, AppConfig, CatalogProduct, CategoryAssignment, CategoryMap, InventoryRecord,
    LinkedDownstreamRecord, PriceRecord, SyncCheckpoint,
};
use covasync_db::{EventLevel, RunCounts};
use covasync_upstream::asset_urls;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;

pub use catalog::{
    DownstreamCatalog, DownstreamProduct, DownstreamRecord, PublishStatus, StockStatus,
};
pub use sku_repair::SkuRepairStats;
pub use woocommerce::{WooCommerceClient, UPSTREAM_ID_META_KEY};

use crate::error::PublishError;
use crate::image_job::{AssetRequest, AssetSink};
use crate::orchestrator::{TriggerSource, PUBLISH_JOB};
use crate::store::{record_event_best_effort, CatalogStore, CheckpointStore, LinkStore, RunLog};

const PRODUCT_PAGE_SIZE: i64 = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublisherSettings {
    /// Master switch; every operation returns [`PublishError::Disabled`]
    /// when off.
    pub enabled: bool,
    /// Create new records as published instead of draft.
    pub auto_publish: bool,
    /// Hand asset URLs to the image collaborator for new records.
    pub import_images: bool,
    /// Location whose prices and stock are published.
    pub location_id: Option<String>,
}

impl PublisherSettings {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            enabled: config.publish.enabled,
            auto_publish: config.publish.auto_publish,
            import_images: config.publish.import_images,
            location_id: config.upstream.location_id.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishAction {
    Created,
    Updated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOutcome {
    pub downstream_id: i64,
    pub action: PublishAction,
    pub sku: String,
    /// The downstream dropped or altered the SKU and it was written again.
    pub sku_reapplied: bool,
    /// No mapping matched the product's category.
    pub category_fallback: bool,
}

/// Result of a bulk or selected publish.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PublishSummary {
    pub created: usize,
    pub updated: usize,
    /// Archived or unknown products.
    pub skipped: usize,
    pub errors: usize,
    pub total: usize,
    pub unmapped_categories: usize,
    pub published_at: Option<DateTime<Utc>>,
}

impl PublishSummary {
    fn record(&mut self, outcome: &PublishOutcome) {
        match outcome.action {
            PublishAction::Created => self.created += 1,
            PublishAction::Updated => self.updated += 1,
        }
        if outcome.category_fallback {
            self.unmapped_categories += 1;
        }
    }

    #[must_use]
    pub fn synced(&self) -> usize {
        self.created + self.updated
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClearSummary {
    pub deleted: usize,
    /// Links whose downstream record no longer existed.
    pub already_missing: usize,
    pub errors: usize,
}

pub struct DownstreamPublisher<'a, S, D, A> {
    store: &'a S,
    downstream: &'a D,
    assets: &'a A,
    categories: &'a CategoryMap,
    settings: PublisherSettings,
}

impl<'a, S, D, A> DownstreamPublisher<'a, S, D, A>
where
    S: CatalogStore + CheckpointStore + LinkStore + RunLog,
    D: DownstreamCatalog,
    A: AssetSink,
{
    #[must_use]
    pub fn new(
        store: &'a S,
        downstream: &'a D,
        assets: &'a A,
        categories: &'a CategoryMap,
        settings: PublisherSettings,
    ) -> Self {
        Self {
            store,
            downstream,
            assets,
            categories,
            settings,
        }
    }

    fn ensure_enabled(&self) -> Result<(), PublishError> {
        if self.settings.enabled {
            Ok(())
        } else {
            Err(PublishError::Disabled)
        }
    }

    /// Creates or updates the downstream record linked to `product`.
    ///
    /// `inventory` holds the stored rows for the product. With a configured
    /// location the newest row sets stock; without one on-hand is summed
    /// across all rows. No rows falls back to the product's own stock.
    /// `category_override` replaces the mapped category when given.
    ///
    /// # Errors
    ///
    /// - [`PublishError::Disabled`] when publishing is switched off.
    /// - [`PublishError::Store`] when the link cannot be read or saved.
    /// - Any downstream error from the create, update or SKU re-apply.
    pub async fn publish_product(
        &self,
        product: &CatalogProduct,
        price: Option<&PriceRecord>,
        inventory: &[InventoryRecord],
        category_override: Option<i64>,
    ) -> Result<PublishOutcome, PublishError> {
        self.ensure_enabled()?;

        let (category_id, category_fallback) = match category_override {
            Some(id) => (Some(id), false),
            None => self.resolve_category(product),
        };
        let payload = self.build_payload(product, price, inventory, category_id);

        let existing = self.store.get_link(&product.product_id).await?;
        let (record, action) = match &existing {
            Some(link) => {
                match self
                    .downstream
                    .update_product(link.downstream_id, &payload)
                    .await
                {
                    Ok(record) => (record, PublishAction::Updated),
                    Err(e) if e.is_not_found() => {
                        tracing::warn!(
                            product_id = %product.product_id,
                            downstream_id = link.downstream_id,
                            "linked downstream record is gone; creating a new one"
                        );
                        (
                            self.downstream.create_product(&payload).await?,
                            PublishAction::Created,
                        )
                    }
                    Err(e) => return Err(e),
                }
            }
            None => (
                self.downstream.create_product(&payload).await?,
                PublishAction::Created,
            ),
        };

        let (record, sku_reapplied) = self.verify_sku(record, &payload.sku).await?;

        let link = LinkedDownstreamRecord {
            product_id: product.product_id.clone(),
            downstream_id: record.id,
            sku: record.sku.clone(),
            stock_quantity: Some(payload.stock_quantity),
            in_stock: payload.stock_status == StockStatus::InStock,
            published_at: existing.map_or_else(Utc::now, |l| l.published_at),
        };
        self.store.save_link(&link).await?;

        if action == PublishAction::Created && self.settings.import_images {
            self.submit_images(product, record.id).await;
        }

        tracing::info!(
            product_id = %product.product_id,
            downstream_id = record.id,
            action = ?action,
            "published product"
        );

        Ok(PublishOutcome {
            downstream_id: record.id,
            action,
            sku: payload.sku,
            sku_reapplied,
            category_fallback,
        })
    }

    /// Publishes every non-archived stored product and records the run.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::Disabled`] when switched off, or
    /// [`PublishError::Store`] when products cannot be listed or the run
    /// cannot be created. Per-product failures are counted in the summary.
    pub async fn publish_all(&self, trigger: TriggerSource) -> Result<PublishSummary, PublishError> {
        self.ensure_enabled()?;
        let run_id = self.store.start_run("publish", trigger.as_str()).await?;

        let mut summary = PublishSummary::default();
        let mut offset = 0_i64;
        loop {
            let page = match self.store.list_products(offset, PRODUCT_PAGE_SIZE).await {
                Ok(page) => page,
                Err(e) => {
                    self.fail_run_best_effort(run_id, &e.to_string(), &summary).await;
                    return Err(e.into());
                }
            };
            let fetched = i64::try_from(page.len()).unwrap_or(i64::MAX);

            for product in &page {
                summary.total += 1;
                if product.is_archived {
                    summary.skipped += 1;
                    continue;
                }
                self.publish_stored(product, None, &mut summary).await;
            }

            if fetched < PRODUCT_PAGE_SIZE {
                break;
            }
            offset += fetched;
        }

        self.finish_run(run_id, summary).await
    }

    /// Publishes the given products, optionally forcing one category.
    ///
    /// Unknown and archived products are skipped.
    ///
    /// # Errors
    ///
    /// Same as [`DownstreamPublisher::publish_all`].
    pub async fn publish_selected(
        &self,
        product_ids: &[String],
        category_override: Option<i64>,
        trigger: TriggerSource,
    ) -> Result<PublishSummary, PublishError> {
        self.ensure_enabled()?;
        let run_id = self.store.start_run("publish", trigger.as_str()).await?;

        let mut summary = PublishSummary::default();
        for product_id in product_ids {
            summary.total += 1;
            let product = match self.store.get_product(product_id).await {
                Ok(Some(product)) if !product.is_archived => product,
                Ok(Some(_)) => {
                    tracing::info!(product_id, "skipping archived product");
                    summary.skipped += 1;
                    continue;
                }
                Ok(None) => {
                    tracing::warn!(product_id, "product not in local catalog; skipping");
                    summary.skipped += 1;
                    continue;
                }
                Err(e) => {
                    tracing::error!(product_id, error = %e, "failed to load product");
                    summary.errors += 1;
                    continue;
                }
            };
            self.publish_stored(&product, category_override, &mut summary)
                .await;
        }

        self.finish_run(run_id, summary).await
    }

    /// Deletes every linked downstream record and its link.
    ///
    /// A link is kept when its downstream delete fails, so the clear can be
    /// retried.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::Disabled`] when switched off, or
    /// [`PublishError::Store`] when the links cannot be listed.
    pub async fn clear_linked(&self) -> Result<ClearSummary, PublishError> {
        self.ensure_enabled()?;
        let links = self.store.list_links().await?;
        let mut summary = ClearSummary::default();

        for link in &links {
            match self.downstream.delete_product(link.downstream_id).await {
                Ok(existed) => {
                    if existed {
                        summary.deleted += 1;
                    } else {
                        summary.already_missing += 1;
                    }
                    if let Err(e) = self.store.delete_link(&link.product_id).await {
                        tracing::error!(product_id = %link.product_id, error = %e, "failed to drop link");
                        summary.errors += 1;
                    }
                }
                Err(e) => {
                    tracing::error!(
                        product_id = %link.product_id,
                        downstream_id = link.downstream_id,
                        error = %e,
                        "failed to delete downstream record"
                    );
                    summary.errors += 1;
                }
            }
        }

        tracing::info!(
            deleted = summary.deleted,
            already_missing = summary.already_missing,
            errors = summary.errors,
            "cleared downstream records"
        );
        record_event_best_effort(
            self.store,
            if summary.errors == 0 {
                EventLevel::Info
            } else {
                EventLevel::Warn
            },
            "cleared downstream records",
            json!(summary),
        )
        .await;
        Ok(summary)
    }

    /// When the last bulk or selected publish finished.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::Store`] if the checkpoint cannot be read.
    pub async fn last_published_at(&self) -> Result<Option<DateTime<Utc>>, PublishError> {
        Ok(self.store.load_checkpoint(PUBLISH_JOB).await?.last_sync_at)
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// Publishes a stored product with its latest price and stock, counting
    /// the result into `summary`.
    async fn publish_stored(
        &self,
        product: &CatalogProduct,
        category_override: Option<i64>,
        summary: &mut PublishSummary,
    ) {
        let result = self.load_and_publish(product, category_override).await;

        match result {
            Ok(outcome) => summary.record(&outcome),
            Err(e) => {
                tracing::error!(product_id = %product.product_id, error = %e, "failed to publish product");
                summary.errors += 1;
            }
        }
    }

    async fn load_and_publish(
        &self,
        product: &CatalogProduct,
        category_override: Option<i64>,
    ) -> Result<PublishOutcome, PublishError> {
        let location = self.settings.location_id.as_deref();
        let price = self
            .store
            .latest_price(&product.product_id, location)
            .await?;
        let inventory = self
            .store
            .inventory_for_product(&product.product_id, location)
            .await?;
        self.publish_product(product, price.as_ref(), &inventory, category_override)
            .await
    }

    fn resolve_category(&self, product: &CatalogProduct) -> (Option<i64>, bool) {
        match self.categories.resolve(product.category.as_deref()) {
            CategoryAssignment::Mapped(id) => (Some(id), false),
            assignment => {
                tracing::warn!(
                    product_id = %product.product_id,
                    category = product.category.as_deref().unwrap_or_default(),
                    "category not mapped; using default"
                );
                (assignment.id(), true)
            }
        }
    }

    fn stock_level(&self, product: &CatalogProduct, rows: &[InventoryRecord]) -> (i64, bool) {
        if self.settings.location_id.is_some() {
            return rows
                .iter()
                .max_by_key(|row| row.last_sync)
                .map_or((product.stock_quantity, product.is_in_stock), |row| {
                    (row.quantity, row.in_stock())
                });
        }
        if rows.is_empty() {
            return (product.stock_quantity, product.is_in_stock);
        }
        let on_hand: i64 = rows.iter().map(|row| row.quantity).sum();
        (on_hand, on_hand > 0)
    }

    fn build_payload(
        &self,
        product: &CatalogProduct,
        price: Option<&PriceRecord>,
        inventory: &[InventoryRecord],
        category_id: Option<i64>,
    ) -> DownstreamProduct {
        let sku = product.catalog_sku.clone().unwrap_or_else(|| {
            tracing::warn!(
                product_id = %product.product_id,
                "publishing with synthesized SKU"
            );
            fallback_sku(&product.product_id)
        });

        let (regular_price, sale_price) = price.map_or((None, None), prices_for);
        let (stock_quantity, in_stock) = self.stock_level(product, inventory);

        DownstreamProduct {
            upstream_id: product.product_id.clone(),
            name: product.name.clone(),
            description: product.description.clone(),
            sku,
            regular_price,
            sale_price,
            stock_quantity,
            stock_status: StockStatus::from_in_stock(in_stock),
            category_id,
            status: if self.settings.auto_publish {
                PublishStatus::Publish
            } else {
                PublishStatus::Draft
            },
        }
    }

    /// Re-applies `expected` once when the downstream did not keep it.
    async fn verify_sku(
        &self,
        record: DownstreamRecord,
        expected: &str,
    ) -> Result<(DownstreamRecord, bool), PublishError> {
        if record.sku.as_deref() == Some(expected) {
            return Ok((record, false));
        }

        tracing::warn!(
            downstream_id = record.id,
            expected,
            actual = record.sku.as_deref().unwrap_or_default(),
            "downstream did not keep SKU; re-applying"
        );
        let retried = self.downstream.set_sku(record.id, expected).await?;
        if retried.sku.as_deref() != Some(expected) {
            tracing::warn!(
                downstream_id = retried.id,
                expected,
                "downstream still rejects SKU"
            );
            record_event_best_effort(
                self.store,
                EventLevel::Warn,
                "downstream rejected SKU",
                json!({"downstream_id": retried.id, "expected": expected, "actual": retried.sku}),
            )
            .await;
        }
        Ok((retried, true))
    }

    async fn submit_images(&self, product: &CatalogProduct, downstream_id: i64) {
        let urls = asset_urls(&product.raw);
        if urls.is_empty() {
            return;
        }
        let request = AssetRequest {
            product_id: &product.product_id,
            downstream_id: Some(downstream_id),
            urls: &urls,
        };
        if let Err(e) = self.assets.submit(&request).await {
            tracing::warn!(
                product_id = %product.product_id,
                error = %e,
                "image hand-off failed; product published without images"
            );
        }
    }

    async fn finish_run(
        &self,
        run_id: i64,
        mut summary: PublishSummary,
    ) -> Result<PublishSummary, PublishError> {
        let now = Utc::now();
        summary.published_at = Some(now);

        let checkpoint = SyncCheckpoint {
            last_sync_at: Some(now),
            batch_offset: 0,
        };
        if let Err(e) = self.store.save_checkpoint(PUBLISH_JOB, &checkpoint).await {
            tracing::warn!(error = %e, "failed to record last publish time");
        }

        let attempted = summary.synced() + summary.errors;
        if attempted > 0 && summary.synced() == 0 {
            let message = format!("all {attempted} products failed to publish");
            self.fail_run_best_effort(run_id, &message, &summary).await;
            record_event_best_effort(self.store, EventLevel::Error, &message, json!(summary)).await;
            return Ok(summary);
        }

        let counts = RunCounts {
            processed: summary.synced(),
            failed: summary.errors,
        };
        if let Err(e) = self
            .store
            .complete_run(run_id, counts, &json!(summary))
            .await
        {
            tracing::error!(run_id, error = %e, "failed to record publish run");
        }

        if summary.unmapped_categories > 0 {
            record_event_best_effort(
                self.store,
                EventLevel::Warn,
                &format!(
                    "{} products published without a mapped category",
                    summary.unmapped_categories
                ),
                json!({"run_id": run_id}),
            )
            .await;
        }
        record_event_best_effort(
            self.store,
            if summary.errors == 0 {
                EventLevel::Info
            } else {
                EventLevel::Warn
            },
            "publish completed",
            json!(summary),
        )
        .await;

        tracing::info!(
            created = summary.created,
            updated = summary.updated,
            skipped = summary.skipped,
            errors = summary.errors,
            "publish finished"
        );
        Ok(summary)
    }

    async fn fail_run_best_effort(&self, run_id: i64, message: &str, summary: &PublishSummary) {
        if let Err(e) = self
            .store
            .fail_run(run_id, message, Some(&json!(summary)))
            .await
        {
            tracing::error!(run_id, error = %e, "failed to mark publish run as failed");
        }
    }
}

/// Regular price and, when cheaper, the tier price as sale price.
fn prices_for(price: &PriceRecord) -> (Option<Decimal>, Option<Decimal>) {
    let regular = price
        .regular_price
        .filter(|p| *p > Decimal::ZERO)
        .or_else(|| price.effective_price());
    let sale = price
        .at_tier_price
        .filter(|tier| *tier > Decimal::ZERO)
        .filter(|tier| regular.is_some_and(|r| tier < &r));
    (regular, sale)
}
