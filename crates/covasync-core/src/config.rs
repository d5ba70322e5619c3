use crate::app_config::{AppConfig, Environment, PublishSettings, UpstreamSettings};
use crate::ConfigError;

const DEFAULT_AUTH_URL: &str = "https://accounts.iqmetrix.net/v1/oauth2/token";
const DEFAULT_API_BASE_URL: &str = "https://api.covasoft.net";

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the real environment so it can be tested with a plain
/// `HashMap` lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;
    use std::path::PathBuf;

    let require = |var: &str| -> Result<String, ConfigError> {
        match lookup(var) {
            Ok(value) if !value.trim().is_empty() => Ok(value),
            _ => Err(ConfigError::MissingEnvVar(var.to_string())),
        }
    };

    let optional = |var: &str| -> Option<String> {
        lookup(var)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let parse = |var: &str, default: &str| -> Result<SocketAddr, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: e.to_string(),
            })
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<u32>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<u64>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let parse_i64 = |var: &str, default: &str| -> Result<i64, ConfigError> {
        let raw = or_default(var, default);
        match raw.parse::<i64>() {
            Ok(v) if v > 0 => Ok(v),
            Ok(v) => Err(ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: format!("must be positive, got {v}"),
            }),
            Err(e) => Err(ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: e.to_string(),
            }),
        }
    };

    let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<usize>()
            .map_err(|e| ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: e.to_string(),
            })
    };

    let parse_bool = |var: &str, default: bool| -> Result<bool, ConfigError> {
        match lookup(var) {
            Err(_) => Ok(default),
            Ok(raw) => parse_flag(&raw).ok_or_else(|| ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: format!("expected a boolean, got '{raw}'"),
            }),
        }
    };

    let database_url = require("DATABASE_URL")?;

    let env = parse_environment(&or_default("COVASYNC_ENV", "development"))?;
    let bind_addr = parse("COVASYNC_BIND_ADDR", "0.0.0.0:3000")?;
    let log_level = or_default("COVASYNC_LOG_LEVEL", "info");

    let db_max_connections = parse_u32("COVASYNC_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("COVASYNC_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("COVASYNC_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let upstream = UpstreamSettings {
        auth_url: or_default("COVA_AUTH_URL", DEFAULT_AUTH_URL),
        api_base_url: or_default("COVA_API_BASE_URL", DEFAULT_API_BASE_URL),
        client_id: require("COVA_CLIENT_ID")?,
        client_secret: require("COVA_CLIENT_SECRET")?,
        username: require("COVA_USERNAME")?,
        password: require("COVA_PASSWORD")?,
        company_id: require("COVA_COMPANY_ID")?,
        location_id: optional("COVA_LOCATION_ID"),
        token_ttl_secs: parse_u64("COVA_TOKEN_TTL_SECS", "43200")?,
        request_timeout_secs: parse_u64("COVA_REQUEST_TIMEOUT_SECS", "30")?,
        catalog_page_size: parse_u32("COVA_CATALOG_PAGE_SIZE", "500")?,
        price_page_size: parse_u32("COVA_PRICE_PAGE_SIZE", "1000")?,
        user_agent: or_default("COVASYNC_USER_AGENT", "covasync/0.1 (catalog-sync)"),
    };

    for (var, size) in [
        ("COVA_CATALOG_PAGE_SIZE", upstream.catalog_page_size),
        ("COVA_PRICE_PAGE_SIZE", upstream.price_page_size),
    ] {
        if size == 0 {
            return Err(ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: "page size must be at least 1".to_string(),
            });
        }
    }

    let publish = PublishSettings {
        enabled: parse_bool("COVASYNC_PUBLISH_ENABLED", true)?,
        auto_publish: parse_bool("COVASYNC_AUTO_PUBLISH", false)?,
        import_images: parse_bool("COVASYNC_IMPORT_IMAGES", true)?,
        category_map_path: PathBuf::from(or_default(
            "COVASYNC_CATEGORY_MAP_PATH",
            "./config/categories.yaml",
        )),
        woo_base_url: optional("WOO_BASE_URL"),
        woo_consumer_key: optional("WOO_CONSUMER_KEY"),
        woo_consumer_secret: optional("WOO_CONSUMER_SECRET"),
    };

    let sync_concurrency = parse_usize("COVASYNC_SYNC_CONCURRENCY", "4")?;
    let sync_cron = or_default("COVASYNC_SYNC_CRON", "0 0 * * * *");
    let event_log_retention = parse_i64("COVASYNC_EVENT_LOG_RETENTION", "200")?;
    let image_batch_size = parse_i64("COVASYNC_IMAGE_BATCH_SIZE", "3")?;
    let asset_webhook_url = optional("COVASYNC_ASSET_WEBHOOK_URL");

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        upstream,
        publish,
        sync_concurrency,
        sync_cron,
        event_log_retention,
        image_batch_size,
        asset_webhook_url,
    })
}

/// Parse a string into an `Environment` variant.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidEnvVar`] for unrecognized values.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "COVASYNC_ENV".to_string(),
            reason: format!("unknown environment '{other}'"),
        }),
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
