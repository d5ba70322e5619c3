use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// Connection and paging settings for the upstream retail API.
#[derive(Clone)]
pub struct UpstreamSettings {
    pub auth_url: String,
    pub api_base_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub username: String,
    pub password: String,
    pub company_id: String,
    /// Location scope for catalog, price and inventory calls. Catalog sync
    /// works without it; the price and inventory API stages do not.
    pub location_id: Option<String>,
    pub token_ttl_secs: u64,
    pub request_timeout_secs: u64,
    pub catalog_page_size: u32,
    pub price_page_size: u32,
    pub user_agent: String,
}

impl std::fmt::Debug for UpstreamSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamSettings")
            .field("auth_url", &self.auth_url)
            .field("api_base_url", &self.api_base_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[redacted]")
            .field("username", &self.username)
            .field("password", &"[redacted]")
            .field("company_id", &self.company_id)
            .field("location_id", &self.location_id)
            .field("token_ttl_secs", &self.token_ttl_secs)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("catalog_page_size", &self.catalog_page_size)
            .field("price_page_size", &self.price_page_size)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

/// Downstream commerce settings. The REST credentials are optional so the
/// sync engine can run without a downstream configured.
#[derive(Clone)]
pub struct PublishSettings {
    pub enabled: bool,
    /// New downstream records start as `publish` instead of `draft`.
    pub auto_publish: bool,
    pub import_images: bool,
    pub category_map_path: PathBuf,
    pub woo_base_url: Option<String>,
    pub woo_consumer_key: Option<String>,
    pub woo_consumer_secret: Option<String>,
}

impl std::fmt::Debug for PublishSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublishSettings")
            .field("enabled", &self.enabled)
            .field("auto_publish", &self.auto_publish)
            .field("import_images", &self.import_images)
            .field("category_map_path", &self.category_map_path)
            .field("woo_base_url", &self.woo_base_url)
            .field("woo_consumer_key", &self.woo_consumer_key)
            .field(
                "woo_consumer_secret",
                &self.woo_consumer_secret.as_ref().map(|_| "[redacted]"),
            )
            .finish()
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub upstream: UpstreamSettings,
    pub publish: PublishSettings,
    pub sync_concurrency: usize,
    pub sync_cron: String,
    pub event_log_retention: i64,
    pub image_batch_size: i64,
    pub asset_webhook_url: Option<String>,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("upstream", &self.upstream)
            .field("publish", &self.publish)
            .field("sync_concurrency", &self.sync_concurrency)
            .field("sync_cron", &self.sync_cron)
            .field("event_log_retention", &self.event_log_retention)
            .field("image_batch_size", &self.image_batch_size)
            .field("asset_webhook_url", &self.asset_webhook_url)
            .finish()
    }
}
