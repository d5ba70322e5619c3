pub mod assets;
pub mod client;
pub mod error;
pub mod extract;
pub mod normalize;
pub mod pagination;
pub mod token;
pub mod types;

pub use assets::asset_urls;
pub use client::{format_updated_since, UpstreamClient, INVENTORY_ENDPOINTS};
pub use error::{NormalizeError, UpstreamError};
pub use normalize::{
    availability_inventory, normalize_inventory, normalize_price, normalize_product, stable_key,
    stock_summary, NormalizeContext, NormalizedProduct, StockSummary,
};
pub use pagination::{Batch, Paginator, Resource, MAX_PAGES};
pub use token::{Credentials, TokenCache};
pub use types::{CatalogQuery, InventoryFetch};
