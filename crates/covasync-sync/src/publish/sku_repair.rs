//! One-off pass that rewrites bad SKUs on already-linked downstream records.

use covasync_core::{is_internal_id, needs_sku_repair, LinkedDownstreamRecord};
use covasync_db::EventLevel;
use serde::Serialize;
use serde_json::json;

use super::{DownstreamCatalog, DownstreamPublisher};
use crate::error::PublishError;
use crate::image_job::AssetSink;
use crate::store::{record_event_best_effort, CatalogStore, CheckpointStore, LinkStore, RunLog};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SkuRepairStats {
    pub total: usize,
    pub updated: usize,
    pub already_ok: usize,
    /// The stored product has no merchant SKU to repair with.
    pub missing_upstream_data: usize,
    pub errors: usize,
    /// Repaired records whose old SKU was an internal numeric ID.
    pub numeric_skus_fixed: usize,
}

enum Repair {
    AlreadyOk,
    MissingUpstreamData,
    Updated { numeric: bool },
}

impl SkuRepairStats {
    fn record(&mut self, repair: &Repair) {
        match repair {
            Repair::AlreadyOk => self.already_ok += 1,
            Repair::MissingUpstreamData => self.missing_upstream_data += 1,
            Repair::Updated { numeric } => {
                self.updated += 1;
                if *numeric {
                    self.numeric_skus_fixed += 1;
                }
            }
        }
    }
}

impl<S, D, A> DownstreamPublisher<'_, S, D, A>
where
    S: CatalogStore + CheckpointStore + LinkStore + RunLog,
    D: DownstreamCatalog,
    A: AssetSink,
{
    /// Walks every link and replaces missing, synthesized or internal-ID
    /// SKUs with the stored merchant SKU.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::Disabled`] when switched off, or
    /// [`PublishError::Store`] when the links cannot be listed. Per-record
    /// failures are counted in the stats.
    pub async fn repair_skus(&self) -> Result<SkuRepairStats, PublishError> {
        self.ensure_enabled()?;
        let links = self.store.list_links().await?;
        let mut stats = SkuRepairStats::default();

        for link in &links {
            stats.total += 1;
            match self.repair_link(link).await {
                Ok(repair) => stats.record(&repair),
                Err(e) => {
                    tracing::error!(
                        product_id = %link.product_id,
                        downstream_id = link.downstream_id,
                        error = %e,
                        "SKU repair failed"
                    );
                    stats.errors += 1;
                }
            }
        }

        tracing::info!(
            total = stats.total,
            updated = stats.updated,
            already_ok = stats.already_ok,
            missing = stats.missing_upstream_data,
            errors = stats.errors,
            "SKU repair finished"
        );
        record_event_best_effort(
            self.store,
            if stats.errors == 0 {
                EventLevel::Info
            } else {
                EventLevel::Warn
            },
            "SKU repair finished",
            json!(stats),
        )
        .await;
        Ok(stats)
    }

    async fn repair_link(&self, link: &LinkedDownstreamRecord) -> Result<Repair, PublishError> {
        let current = link.sku.as_deref();
        if !needs_sku_repair(current) {
            return Ok(Repair::AlreadyOk);
        }

        let Some(sku) = self
            .store
            .get_product(&link.product_id)
            .await?
            .and_then(|product| product.catalog_sku)
        else {
            return Ok(Repair::MissingUpstreamData);
        };

        let record = self.downstream.set_sku(link.downstream_id, &sku).await?;
        if record.sku.as_deref() != Some(sku.as_str()) {
            tracing::warn!(
                downstream_id = record.id,
                expected = %sku,
                "downstream did not keep repaired SKU"
            );
        }

        self.store
            .save_link(&LinkedDownstreamRecord {
                sku: record.sku,
                ..link.clone()
            })
            .await?;

        let numeric = current.is_some_and(|old| {
            !old.is_empty() && old.bytes().all(|b| b.is_ascii_digit()) && is_internal_id(old)
        });
        Ok(Repair::Updated { numeric })
    }
}
