use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use covasync_core::{AppConfig, Environment, PublishSettings, UpstreamSettings};

/// Configuration pointing every outbound call at an unroutable port.
pub(crate) fn test_config() -> AppConfig {
    AppConfig {
        database_url: "postgres://unused".to_string(),
        env: Environment::Test,
        bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 3000),
        log_level: "info".to_string(),
        db_max_connections: 5,
        db_min_connections: 1,
        db_acquire_timeout_secs: 5,
        upstream: UpstreamSettings {
            auth_url: "http://127.0.0.1:9/token".to_string(),
            api_base_url: "http://127.0.0.1:9".to_string(),
            client_id: "cid".to_string(),
            client_secret: "secret".to_string(),
            username: "user".to_string(),
            password: "pass".to_string(),
            company_id: "123".to_string(),
            location_id: Some("42".to_string()),
            token_ttl_secs: 3600,
            request_timeout_secs: 5,
            catalog_page_size: 100,
            price_page_size: 100,
            user_agent: "covasync-test".to_string(),
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
        sync_concurrency: 2,
        sync_cron: "0 0 * * * *".to_string(),
        event_log_retention: 200,
        image_batch_size: 3,
        asset_webhook_url: None,
    }
}
