//! Offline unit tests for covasync-db pool configuration and row types.
//! These tests do not require a live database connection.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use chrono::Utc;
use covasync_core::{
    AppConfig, CatalogProduct, Environment, LinkedDownstreamRecord, PublishSettings,
    UpstreamSettings,
};
use covasync_db::{DownstreamLinkRow, EventLevel, PoolConfig, ProductRow, SyncRunRow};
use uuid::Uuid;

fn app_config() -> AppConfig {
    AppConfig {
        database_url: "postgres://example".to_string(),
        env: Environment::Test,
        bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 3000),
        log_level: "info".to_string(),
        db_max_connections: 42,
        db_min_connections: 7,
        db_acquire_timeout_secs: 9,
        upstream: UpstreamSettings {
            auth_url: "https://auth.example.test/token".to_string(),
            api_base_url: "https://api.example.test".to_string(),
            client_id: "cid".to_string(),
            client_secret: "secret".to_string(),
            username: "user".to_string(),
            password: "pass".to_string(),
            company_id: "1".to_string(),
            location_id: None,
            token_ttl_secs: 3600,
            request_timeout_secs: 30,
            catalog_page_size: 500,
            price_page_size: 1000,
            user_agent: "ua".to_string(),
        },
        publish: PublishSettings {
            enabled: false,
            auto_publish: false,
            import_images: false,
            category_map_path: PathBuf::from("./config/categories.yaml"),
            woo_base_url: None,
            woo_consumer_key: None,
            woo_consumer_secret: None,
        },
        sync_concurrency: 4,
        sync_cron: "0 0 * * * *".to_string(),
        event_log_retention: 200,
        image_batch_size: 3,
        asset_webhook_url: None,
    }
}

#[test]
fn pool_config_from_app_config_uses_core_values() {
    let pool_config = PoolConfig::from_app_config(&app_config());
    assert_eq!(pool_config.max_connections, 42);
    assert_eq!(pool_config.min_connections, 7);
    assert_eq!(pool_config.acquire_timeout_secs, 9);
}

/// Compile-time smoke test: confirm that [`SyncRunRow`] has all expected
/// fields with the correct types. No database required.
#[test]
fn sync_run_row_has_expected_fields() {
    let row = SyncRunRow {
        id: 1_i64,
        public_id: Uuid::new_v4(),
        run_type: "sync".to_string(),
        trigger_source: "cli".to_string(),
        status: "queued".to_string(),
        started_at: None,
        completed_at: None,
        records_processed: 0_i32,
        records_failed: 0_i32,
        summary: None,
        error_message: None,
        created_at: Utc::now(),
    };

    assert_eq!(row.run_type, "sync");
    assert_eq!(row.status, "queued");
    assert!(row.summary.is_none());
}

#[test]
fn product_row_converts_to_catalog_product() {
    let now = Utc::now();
    let row = ProductRow {
        product_id: "p-1".to_string(),
        name: "Blue Dream".to_string(),
        master_product_id: None,
        category: Some("Flower".to_string()),
        catalog_sku: Some("BD35".to_string()),
        description: None,
        is_archived: false,
        is_in_stock: true,
        stock_quantity: 8,
        upstream_created_at: None,
        upstream_updated_at: Some(now),
        raw: serde_json::json!({"ProductId": "p-1"}),
        last_sync: now,
        created_at: now,
        updated_at: now,
    };

    let product = CatalogProduct::from(row);
    assert_eq!(product.product_id, "p-1");
    assert_eq!(product.catalog_sku.as_deref(), Some("BD35"));
    assert_eq!(product.stock_quantity, 8);
    assert_eq!(product.last_sync, now);
}

#[test]
fn link_row_converts_to_record() {
    let now = Utc::now();
    let record = LinkedDownstreamRecord::from(DownstreamLinkRow {
        product_id: "p-1".to_string(),
        downstream_id: 77,
        sku: Some("BD35".to_string()),
        stock_quantity: Some(3),
        in_stock: true,
        published_at: now,
        updated_at: now,
    });
    assert_eq!(record.downstream_id, 77);
    assert!(record.in_stock);
}

#[test]
fn event_levels_match_schema_values() {
    assert_eq!(EventLevel::Info.as_str(), "info");
    assert_eq!(EventLevel::Warn.to_string(), "warn");
    assert_eq!(EventLevel::Error.as_str(), "error");
}
