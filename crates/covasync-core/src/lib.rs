pub mod app_config;
pub mod category;
pub mod config;
pub mod records;
pub mod sku;

pub use app_config::{AppConfig, Environment, PublishSettings, UpstreamSettings};
pub use category::{load_category_map, CategoryAssignment, CategoryMap};
pub use config::{load_app_config, load_app_config_from_env};
pub use records::{
    CatalogProduct, InventoryRecord, LinkedDownstreamRecord, PriceRecord, SyncCheckpoint,
};
pub use sku::{
    extract_sku, fallback_sku, is_internal_id, needs_sku_repair, SkuChoice, SkuSource,
    FALLBACK_SKU_PREFIX,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required env var: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for env var {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read category map {path}: {source}")]
    CategoryFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse category map: {0}")]
    CategoryFileParse(#[from] serde_yaml::Error),

    #[error("category map validation failed: {0}")]
    Validation(String),
}
