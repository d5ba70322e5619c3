use axum::{
    extract::{Query, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use covasync_core::CatalogProduct;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::middleware::RequestId;

use super::{map_db_error, normalize_limit, ApiError, ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Serialize)]
pub(super) struct ProductItem {
    product_id: String,
    name: String,
    category: Option<String>,
    sku: Option<String>,
    is_archived: bool,
    is_in_stock: bool,
    stock_quantity: i64,
    regular_price: Option<Decimal>,
    /// Tier price when one applies, otherwise the regular price.
    price: Option<Decimal>,
    upstream_updated_at: Option<DateTime<Utc>>,
    last_sync: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub(super) struct ProductPage {
    total: i64,
    offset: i64,
    items: Vec<ProductItem>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ProductQuery {
    pub offset: Option<i64>,
    pub limit: Option<i64>,
}

/// Stored catalog in upstream ID order with the latest price per product.
pub(super) async fn list_products(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<ProductQuery>,
) -> Result<Json<ApiResponse<ProductPage>>, ApiError> {
    let offset = query.offset.unwrap_or(0).max(0);
    let total = covasync_db::count_products(&state.pool)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    let products = covasync_db::list_products(&state.pool, offset, normalize_limit(query.limit))
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let location = state.config.upstream.location_id.as_deref();
    let mut items = Vec::with_capacity(products.len());
    for product in products {
        let price = covasync_db::latest_price(&state.pool, &product.product_id, location)
            .await
            .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
        items.push(product_item(
            product,
            price.as_ref().and_then(|p| p.regular_price),
            price.as_ref().and_then(covasync_core::PriceRecord::effective_price),
        ));
    }

    Ok(Json(ApiResponse {
        data: ProductPage {
            total,
            offset,
            items,
        },
        meta: ResponseMeta::new(req_id.0),
    }))
}

fn product_item(
    product: CatalogProduct,
    regular_price: Option<Decimal>,
    price: Option<Decimal>,
) -> ProductItem {
    ProductItem {
        product_id: product.product_id,
        name: product.name,
        category: product.category,
        sku: product.catalog_sku,
        is_archived: product.is_archived,
        is_in_stock: product.is_in_stock,
        stock_quantity: product.stock_quantity,
        regular_price,
        price,
        upstream_updated_at: product.upstream_updated_at,
        last_sync: product.last_sync,
    }
}
