//! In-memory stand-ins for the store, the downstream catalog and the asset
//! collaborator, shared by the integration tests in this directory.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Mutex;

use chrono::Utc;
use covasync_core::{
    CatalogProduct, InventoryRecord, LinkedDownstreamRecord, PriceRecord, SyncCheckpoint,
};
use covasync_db::{EventLevel, RunCounts, UpsertOutcome};
use covasync_sync::{
    AssetError, AssetRequest, AssetSink, CatalogStore, CheckpointStore, DownstreamCatalog,
    DownstreamProduct, DownstreamRecord, LinkStore, PublishError, RunLog, StoreError,
};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct RunEntry {
    pub id: i64,
    pub run_type: String,
    pub trigger: String,
    pub status: &'static str,
    pub counts: Option<RunCounts>,
    pub error: Option<String>,
    pub summary: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventEntry {
    pub level: EventLevel,
    pub message: String,
    pub context: Value,
}

#[derive(Default)]
struct State {
    products: BTreeMap<String, CatalogProduct>,
    prices: BTreeMap<String, PriceRecord>,
    inventory: BTreeMap<String, InventoryRecord>,
    checkpoints: BTreeMap<String, SyncCheckpoint>,
    processed: BTreeMap<String, BTreeSet<String>>,
    links: BTreeMap<String, LinkedDownstreamRecord>,
    runs: Vec<RunEntry>,
    events: Vec<EventEntry>,
}

/// Store with the same upsert semantics as the Postgres backend: a row that
/// differs only in its sync timestamp is reported unchanged.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

fn upsert<T: Clone + PartialEq>(
    map: &mut BTreeMap<String, T>,
    key: &str,
    record: &T,
    same: impl Fn(&T, &T) -> bool,
) -> UpsertOutcome {
    match map.get(key) {
        None => {
            map.insert(key.to_owned(), record.clone());
            UpsertOutcome::Inserted
        }
        Some(existing) if same(existing, record) => UpsertOutcome::Unchanged,
        Some(_) => {
            map.insert(key.to_owned(), record.clone());
            UpsertOutcome::Updated
        }
    }
}

impl MemoryStore {
    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("store lock poisoned")
    }

    pub fn insert_product(&self, product: CatalogProduct) {
        self.state()
            .products
            .insert(product.product_id.clone(), product);
    }

    pub fn product(&self, id: &str) -> Option<CatalogProduct> {
        self.state().products.get(id).cloned()
    }

    pub fn product_count(&self) -> usize {
        self.state().products.len()
    }

    pub fn prices(&self) -> Vec<PriceRecord> {
        self.state().prices.values().cloned().collect()
    }

    pub fn inventory(&self) -> Vec<InventoryRecord> {
        self.state().inventory.values().cloned().collect()
    }

    pub fn checkpoint(&self, job: &str) -> SyncCheckpoint {
        self.state()
            .checkpoints
            .get(job)
            .cloned()
            .unwrap_or_default()
    }

    pub fn set_checkpoint(&self, job: &str, checkpoint: SyncCheckpoint) {
        self.state().checkpoints.insert(job.to_owned(), checkpoint);
    }

    pub fn processed(&self, job: &str) -> BTreeSet<String> {
        self.state().processed.get(job).cloned().unwrap_or_default()
    }

    pub fn link(&self, product_id: &str) -> Option<LinkedDownstreamRecord> {
        self.state().links.get(product_id).cloned()
    }

    pub fn insert_link(&self, link: LinkedDownstreamRecord) {
        self.state().links.insert(link.product_id.clone(), link);
    }

    pub fn runs(&self) -> Vec<RunEntry> {
        self.state().runs.clone()
    }

    pub fn events(&self) -> Vec<EventEntry> {
        self.state().events.clone()
    }
}

impl CatalogStore for MemoryStore {
    async fn upsert_product(&self, product: &CatalogProduct) -> Result<UpsertOutcome, StoreError> {
        Ok(upsert(
            &mut self.state().products,
            &product.product_id,
            product,
            |a, b| CatalogProduct { last_sync: b.last_sync, ..a.clone() } == *b,
        ))
    }

    async fn upsert_price(&self, price: &PriceRecord) -> Result<UpsertOutcome, StoreError> {
        Ok(upsert(
            &mut self.state().prices,
            &price.price_id,
            price,
            |a, b| PriceRecord { last_sync: b.last_sync, ..a.clone() } == *b,
        ))
    }

    async fn upsert_inventory(&self, record: &InventoryRecord) -> Result<UpsertOutcome, StoreError> {
        Ok(upsert(
            &mut self.state().inventory,
            &record.inventory_id,
            record,
            |a, b| InventoryRecord { last_sync: b.last_sync, ..a.clone() } == *b,
        ))
    }

    async fn get_product(&self, product_id: &str) -> Result<Option<CatalogProduct>, StoreError> {
        Ok(self.product(product_id))
    }

    async fn list_products(
        &self,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<CatalogProduct>, StoreError> {
        let skip = usize::try_from(offset).unwrap_or(0);
        let take = usize::try_from(limit).unwrap_or(0);
        Ok(self
            .state()
            .products
            .values()
            .skip(skip)
            .take(take)
            .cloned()
            .collect())
    }

    async fn count_products(&self) -> Result<i64, StoreError> {
        Ok(i64::try_from(self.product_count()).unwrap_or(i64::MAX))
    }

    async fn latest_price(
        &self,
        product_id: &str,
        entity_id: Option<&str>,
    ) -> Result<Option<PriceRecord>, StoreError> {
        let state = self.state();
        let mut rows: Vec<&PriceRecord> = state
            .prices
            .values()
            .filter(|p| p.catalog_item_id == product_id)
            .collect();
        rows.sort_by_key(|p| {
            (
                entity_id.is_some() && p.entity_id.as_deref() == entity_id,
                p.last_sync,
                std::cmp::Reverse(p.price_id.clone()),
            )
        });
        Ok(rows.last().map(|p| (*p).clone()))
    }

    async fn inventory_for_product(
        &self,
        product_id: &str,
        location_id: Option<&str>,
    ) -> Result<Vec<InventoryRecord>, StoreError> {
        Ok(self
            .state()
            .inventory
            .values()
            .filter(|row| row.product_id == product_id)
            .filter(|row| location_id.is_none() || row.location_id.as_deref() == location_id)
            .cloned()
            .collect())
    }
}

impl CheckpointStore for MemoryStore {
    async fn load_checkpoint(&self, job: &str) -> Result<SyncCheckpoint, StoreError> {
        Ok(self.checkpoint(job))
    }

    async fn save_checkpoint(&self, job: &str, checkpoint: &SyncCheckpoint) -> Result<(), StoreError> {
        self.set_checkpoint(job, checkpoint.clone());
        Ok(())
    }

    async fn reset_checkpoint(&self, job: &str) -> Result<(), StoreError> {
        let mut state = self.state();
        state.checkpoints.remove(job);
        state.processed.remove(job);
        Ok(())
    }

    async fn is_processed(&self, job: &str, key: &str) -> Result<bool, StoreError> {
        Ok(self
            .state()
            .processed
            .get(job)
            .is_some_and(|keys| keys.contains(key)))
    }

    async fn mark_processed(&self, job: &str, key: &str) -> Result<(), StoreError> {
        self.state()
            .processed
            .entry(job.to_owned())
            .or_default()
            .insert(key.to_owned());
        Ok(())
    }

    async fn count_processed(&self, job: &str) -> Result<i64, StoreError> {
        Ok(i64::try_from(self.processed(job).len()).unwrap_or(i64::MAX))
    }
}

impl LinkStore for MemoryStore {
    async fn get_link(&self, product_id: &str) -> Result<Option<LinkedDownstreamRecord>, StoreError> {
        Ok(self.link(product_id))
    }

    async fn save_link(&self, link: &LinkedDownstreamRecord) -> Result<(), StoreError> {
        self.insert_link(link.clone());
        Ok(())
    }

    async fn delete_link(&self, product_id: &str) -> Result<bool, StoreError> {
        Ok(self.state().links.remove(product_id).is_some())
    }

    async fn list_links(&self) -> Result<Vec<LinkedDownstreamRecord>, StoreError> {
        Ok(self.state().links.values().cloned().collect())
    }
}

impl RunLog for MemoryStore {
    async fn start_run(&self, run_type: &str, trigger: &str) -> Result<i64, StoreError> {
        let mut state = self.state();
        let id = i64::try_from(state.runs.len()).unwrap_or(i64::MAX) + 1;
        state.runs.push(RunEntry {
            id,
            run_type: run_type.to_owned(),
            trigger: trigger.to_owned(),
            status: "running",
            counts: None,
            error: None,
            summary: None,
        });
        Ok(id)
    }

    async fn complete_run(&self, id: i64, counts: RunCounts, summary: &Value) -> Result<(), StoreError> {
        let mut state = self.state();
        let run = state
            .runs
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| StoreError::Other(format!("no run {id}")))?;
        run.status = "succeeded";
        run.counts = Some(counts);
        run.summary = Some(summary.clone());
        Ok(())
    }

    async fn fail_run(&self, id: i64, message: &str, summary: Option<&Value>) -> Result<(), StoreError> {
        let mut state = self.state();
        let run = state
            .runs
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| StoreError::Other(format!("no run {id}")))?;
        run.status = "failed";
        run.error = Some(message.to_owned());
        run.summary = summary.cloned();
        Ok(())
    }

    async fn record_event(&self, level: EventLevel, message: &str, context: &Value) -> Result<(), StoreError> {
        self.state().events.push(EventEntry {
            level,
            message: message.to_owned(),
            context: context.clone(),
        });
        Ok(())
    }
}

pub fn product(id: &str, sku: Option<&str>) -> CatalogProduct {
    CatalogProduct {
        product_id: id.to_owned(),
        name: format!("Product {id}"),
        master_product_id: None,
        category: Some("Flower".to_owned()),
        catalog_sku: sku.map(str::to_owned),
        description: None,
        is_archived: false,
        is_in_stock: true,
        stock_quantity: 3,
        upstream_created_at: None,
        upstream_updated_at: None,
        raw: serde_json::json!({"ProductId": id}),
        last_sync: Utc::now(),
    }
}

// ---------------------------------------------------------------------------
// Downstream
// ---------------------------------------------------------------------------

/// Downstream catalog that can be told to drop SKUs or forget records.
#[derive(Default)]
pub struct FakeDownstream {
    pub records: Mutex<BTreeMap<i64, (DownstreamProduct, Option<String>)>>,
    pub next_id: AtomicI64,
    /// Create and update keep no SKU, as when the downstream rejects a
    /// duplicate.
    pub drop_sku_on_write: bool,
    /// `set_sku` also fails to keep the SKU.
    pub reject_sku: bool,
    pub fail_creates: bool,
    pub creates: AtomicUsize,
    pub updates: AtomicUsize,
    pub sku_writes: AtomicUsize,
    pub deletes: AtomicUsize,
}

impl FakeDownstream {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(100),
            ..Self::default()
        }
    }

    /// Removes a record as if it was deleted out of band.
    pub fn forget(&self, id: i64) {
        self.records.lock().expect("lock").remove(&id);
    }

    pub fn product(&self, id: i64) -> Option<DownstreamProduct> {
        self.records.lock().expect("lock").get(&id).map(|(p, _)| p.clone())
    }

    pub fn sku(&self, id: i64) -> Option<String> {
        self.records
            .lock()
            .expect("lock")
            .get(&id)
            .and_then(|(_, sku)| sku.clone())
    }

    pub fn len(&self) -> usize {
        self.records.lock().expect("lock").len()
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    fn kept_sku(&self, sku: &str) -> Option<String> {
        (!self.drop_sku_on_write).then(|| sku.to_owned())
    }
}

fn not_found(id: i64) -> PublishError {
    PublishError::Downstream {
        endpoint: format!("wp-json/wc/v3/products/{id}"),
        method: "PUT".to_owned(),
        status: 404,
        message: "Invalid ID.".to_owned(),
    }
}

impl DownstreamCatalog for FakeDownstream {
    async fn create_product(&self, product: &DownstreamProduct) -> Result<DownstreamRecord, PublishError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        if self.fail_creates {
            return Err(PublishError::Downstream {
                endpoint: "wp-json/wc/v3/products".to_owned(),
                method: "POST".to_owned(),
                status: 500,
                message: "Internal Server Error".to_owned(),
            });
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let sku = self.kept_sku(&product.sku);
        self.records
            .lock()
            .expect("lock")
            .insert(id, (product.clone(), sku.clone()));
        Ok(DownstreamRecord { id, sku })
    }

    async fn update_product(
        &self,
        id: i64,
        product: &DownstreamProduct,
    ) -> Result<DownstreamRecord, PublishError> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        let mut records = self.records.lock().expect("lock");
        if !records.contains_key(&id) {
            return Err(not_found(id));
        }
        let sku = self.kept_sku(&product.sku);
        records.insert(id, (product.clone(), sku.clone()));
        Ok(DownstreamRecord { id, sku })
    }

    async fn set_sku(&self, id: i64, sku: &str) -> Result<DownstreamRecord, PublishError> {
        self.sku_writes.fetch_add(1, Ordering::SeqCst);
        let mut records = self.records.lock().expect("lock");
        let Some(entry) = records.get_mut(&id) else {
            return Err(not_found(id));
        };
        if !self.reject_sku {
            entry.1 = Some(sku.to_owned());
        }
        Ok(DownstreamRecord {
            id,
            sku: entry.1.clone(),
        })
    }

    async fn delete_product(&self, id: i64) -> Result<bool, PublishError> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        Ok(self.records.lock().expect("lock").remove(&id).is_some())
    }
}

// ---------------------------------------------------------------------------
// Assets
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedAssets {
    pub product_id: String,
    pub downstream_id: Option<i64>,
    pub urls: Vec<String>,
}

#[derive(Default)]
pub struct RecordingSink {
    pub submitted: Mutex<Vec<SubmittedAssets>>,
    /// Product IDs whose submission is rejected.
    pub reject: HashSet<String>,
}

impl RecordingSink {
    pub fn submitted(&self) -> Vec<SubmittedAssets> {
        self.submitted.lock().expect("lock").clone()
    }
}

impl AssetSink for RecordingSink {
    async fn submit(&self, request: &AssetRequest<'_>) -> Result<(), AssetError> {
        if self.reject.contains(request.product_id) {
            return Err(AssetError::Rejected { status: 503 });
        }
        self.submitted.lock().expect("lock").push(SubmittedAssets {
            product_id: request.product_id.to_owned(),
            downstream_id: request.downstream_id,
            urls: request.urls.to_vec(),
        });
        Ok(())
    }
}
