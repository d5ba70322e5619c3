//! The downstream commerce catalog as seen by the publisher.

use std::future::Future;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::PublishError;

/// Visibility of a newly created downstream product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PublishStatus {
    Draft,
    Publish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StockStatus {
    #[serde(rename = "instock")]
    InStock,
    #[serde(rename = "outofstock")]
    OutOfStock,
}

impl StockStatus {
    #[must_use]
    pub fn from_in_stock(in_stock: bool) -> Self {
        if in_stock {
            Self::InStock
        } else {
            Self::OutOfStock
        }
    }
}

/// Fields written to a downstream product on create or update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownstreamProduct {
    /// Upstream product ID, stored as metadata on the downstream record.
    pub upstream_id: String,
    pub name: String,
    pub description: Option<String>,
    pub sku: String,
    pub regular_price: Option<Decimal>,
    /// Only set when below the regular price.
    pub sale_price: Option<Decimal>,
    pub stock_quantity: i64,
    pub stock_status: StockStatus,
    pub category_id: Option<i64>,
    /// Applied on create only; updates never change visibility.
    pub status: PublishStatus,
}

/// The downstream record as persisted after a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownstreamRecord {
    pub id: i64,
    /// SKU as the downstream stored it, which may differ from what was sent.
    pub sku: Option<String>,
}

pub trait DownstreamCatalog: Send + Sync {
    fn create_product(
        &self,
        product: &DownstreamProduct,
    ) -> impl Future<Output = Result<DownstreamRecord, PublishError>> + Send;

    fn update_product(
        &self,
        id: i64,
        product: &DownstreamProduct,
    ) -> impl Future<Output = Result<DownstreamRecord, PublishError>> + Send;

    fn set_sku(
        &self,
        id: i64,
        sku: &str,
    ) -> impl Future<Output = Result<DownstreamRecord, PublishError>> + Send;

    /// Permanently deletes a record. `Ok(false)` when it was already gone.
    fn delete_product(&self, id: i64) -> impl Future<Output = Result<bool, PublishError>> + Send;
}
