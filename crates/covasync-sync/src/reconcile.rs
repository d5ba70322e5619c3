//! Normalize-then-upsert for raw upstream records.
//!
//! Each record is keyed by its stable upstream identity and written with a
//! native upsert, so replaying a batch is harmless. A bad record is logged
//! with its key, counted, and skipped; it never stops the batch.

use covasync_core::{CatalogProduct, InventoryRecord, PriceRecord};
use covasync_db::UpsertOutcome;
use covasync_upstream::{normalize_inventory, normalize_price, normalize_product, NormalizeContext};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use serde_json::Value;

use crate::error::ReconcileError;
use crate::store::CatalogStore;

/// Per-stage upsert tallies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileStats {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub failed: usize,
    /// Products stored without a merchant SKU.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sku_fallbacks: Vec<String>,
}

impl ReconcileStats {
    pub fn record(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Inserted => self.inserted += 1,
            UpsertOutcome::Updated => self.updated += 1,
            UpsertOutcome::Unchanged => self.unchanged += 1,
        }
    }

    pub fn merge(&mut self, other: ReconcileStats) {
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.unchanged += other.unchanged;
        self.failed += other.failed;
        self.sku_fallbacks.extend(other.sku_fallbacks);
    }

    /// Records written or confirmed unchanged.
    #[must_use]
    pub fn processed(&self) -> usize {
        self.inserted + self.updated + self.unchanged
    }

    #[must_use]
    pub fn changed(&self) -> usize {
        self.inserted + self.updated
    }
}

/// Tallies for a batch of product payloads and the rows fanned out from them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CatalogStats {
    pub products: ReconcileStats,
    pub embedded_prices: ReconcileStats,
    pub availability: ReconcileStats,
}

impl CatalogStats {
    pub fn merge(&mut self, other: CatalogStats) {
        self.products.merge(other.products);
        self.embedded_prices.merge(other.embedded_prices);
        self.availability.merge(other.availability);
    }
}

/// A stored record and what the upsert did to it.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled<T> {
    pub record: T,
    pub outcome: UpsertOutcome,
}

/// A stored product plus the price and inventory rows fanned out from it.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductReconciled {
    pub product: CatalogProduct,
    pub outcome: UpsertOutcome,
    pub prices: ReconcileStats,
    pub inventory: ReconcileStats,
}

/// Upserts raw upstream records into a [`CatalogStore`].
pub struct Reconciler<'a, S> {
    store: &'a S,
    ctx: NormalizeContext,
    concurrency: usize,
}

impl<'a, S: CatalogStore> Reconciler<'a, S> {
    /// `concurrency` bounds in-flight upserts within one batch.
    #[must_use]
    pub fn new(store: &'a S, ctx: NormalizeContext, concurrency: usize) -> Self {
        Self {
            store,
            ctx,
            concurrency: concurrency.max(1),
        }
    }

    #[must_use]
    pub fn context(&self) -> &NormalizeContext {
        &self.ctx
    }

    /// Upserts one product and the embedded price and availability rows.
    ///
    /// Failures on the embedded rows are logged and counted in the returned
    /// sub-stats; the product itself still counts as stored.
    ///
    /// # Errors
    ///
    /// - [`ReconcileError::MissingKey`] when the payload has no product ID.
    /// - [`ReconcileError::Store`] when the product row cannot be written.
    pub async fn upsert_product(&self, raw: &Value) -> Result<ProductReconciled, ReconcileError> {
        let normalized = normalize_product(raw, &self.ctx).map_err(|source| {
            ReconcileError::MissingKey {
                kind: "product",
                source,
            }
        })?;
        let product = normalized.product;

        let outcome = self
            .store
            .upsert_product(&product)
            .await
            .map_err(|source| ReconcileError::Store {
                kind: "product",
                key: product.product_id.clone(),
                source,
            })?;

        let mut prices = ReconcileStats::default();
        if let Some(price) = normalized.embedded_price {
            match self.store.upsert_price(&price).await {
                Ok(outcome) => prices.record(outcome),
                Err(e) => {
                    tracing::warn!(
                        product_id = %product.product_id,
                        price_id = %price.price_id,
                        error = %e,
                        "failed to store embedded price"
                    );
                    prices.failed += 1;
                }
            }
        }

        let inventory = self.store_inventory(normalized.availability).await;

        Ok(ProductReconciled {
            product,
            outcome,
            prices,
            inventory,
        })
    }

    /// # Errors
    ///
    /// - [`ReconcileError::MissingKey`] when the row has no `Id` or catalog item.
    /// - [`ReconcileError::Store`] when the row cannot be written.
    pub async fn upsert_price(
        &self,
        raw: &Value,
    ) -> Result<Reconciled<PriceRecord>, ReconcileError> {
        let record = normalize_price(raw, &self.ctx)
            .map_err(|source| ReconcileError::MissingKey { kind: "price", source })?;
        let outcome =
            self.store
                .upsert_price(&record)
                .await
                .map_err(|source| ReconcileError::Store {
                    kind: "price",
                    key: record.price_id.clone(),
                    source,
                })?;
        Ok(Reconciled { record, outcome })
    }

    /// # Errors
    ///
    /// - [`ReconcileError::MissingKey`] when the row names no product.
    /// - [`ReconcileError::Store`] when the row cannot be written.
    pub async fn upsert_inventory(
        &self,
        raw: &Value,
    ) -> Result<Reconciled<InventoryRecord>, ReconcileError> {
        let record = normalize_inventory(raw, &self.ctx).map_err(|source| {
            ReconcileError::MissingKey {
                kind: "inventory",
                source,
            }
        })?;
        let outcome = self
            .store
            .upsert_inventory(&record)
            .await
            .map_err(|source| ReconcileError::Store {
                kind: "inventory",
                key: record.inventory_id.clone(),
                source,
            })?;
        Ok(Reconciled { record, outcome })
    }

    /// Reconciles a batch of product payloads.
    pub async fn reconcile_products(&self, records: &[Value]) -> CatalogStats {
        let pending: Vec<_> = records.iter().map(|raw| self.upsert_product(raw)).collect();
        let results: Vec<Result<ProductReconciled, ReconcileError>> = stream::iter(pending)
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut stats = CatalogStats::default();
        for result in results {
            match result {
                Ok(done) => {
                    stats.products.record(done.outcome);
                    if done.product.catalog_sku.is_none() {
                        stats.products.sku_fallbacks.push(done.product.product_id);
                    }
                    stats.embedded_prices.merge(done.prices);
                    stats.availability.merge(done.inventory);
                }
                Err(e) => {
                    log_failure(&e);
                    stats.products.failed += 1;
                }
            }
        }
        stats.products.sku_fallbacks.sort();
        stats
    }

    pub async fn reconcile_prices(&self, records: &[Value]) -> ReconcileStats {
        let pending: Vec<_> = records.iter().map(|raw| self.upsert_price(raw)).collect();
        let results: Vec<_> = stream::iter(pending)
            .buffer_unordered(self.concurrency)
            .collect()
            .await;
        tally(results)
    }

    pub async fn reconcile_inventory(&self, records: &[Value]) -> ReconcileStats {
        let pending: Vec<_> = records.iter().map(|raw| self.upsert_inventory(raw)).collect();
        let results: Vec<_> = stream::iter(pending)
            .buffer_unordered(self.concurrency)
            .collect()
            .await;
        tally(results)
    }

    /// Upserts already-normalized inventory rows.
    pub async fn store_inventory(&self, rows: Vec<InventoryRecord>) -> ReconcileStats {
        let results: Vec<Result<UpsertOutcome, ReconcileError>> = stream::iter(rows)
            .map(|row| async move {
                self.store
                    .upsert_inventory(&row)
                    .await
                    .map_err(|source| ReconcileError::Store {
                        kind: "inventory",
                        key: row.inventory_id.clone(),
                        source,
                    })
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut stats = ReconcileStats::default();
        for result in results {
            match result {
                Ok(outcome) => stats.record(outcome),
                Err(e) => {
                    log_failure(&e);
                    stats.failed += 1;
                }
            }
        }
        stats
    }
}

fn tally<T>(results: Vec<Result<Reconciled<T>, ReconcileError>>) -> ReconcileStats {
    let mut stats = ReconcileStats::default();
    for result in results {
        match result {
            Ok(done) => stats.record(done.outcome),
            Err(e) => {
                log_failure(&e);
                stats.failed += 1;
            }
        }
    }
    stats
}

fn log_failure(error: &ReconcileError) {
    match error {
        ReconcileError::MissingKey { kind, source } => {
            tracing::warn!(kind, error = %source, "skipping upstream record without a key");
        }
        ReconcileError::Store { kind, key, source } => {
            tracing::error!(kind, key = %key, error = %source, "failed to store record; skipping");
        }
    }
}
