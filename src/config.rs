use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub sources: SourcesConfig,
    pub feeds: FeedConfig,
    pub cache: CacheConfig,
    pub proxy: ProxyConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Where the room registry and the settings sheet are published.
///
/// Both URLs are optional at startup; a sync refuses to run until both are set.
#[derive(Debug, Clone, Deserialize)]
pub struct SourcesConfig {
    /// Published CSV of the room list. Read from `GOOGLE_SHEET_CSV_URL`.
    pub rooms_csv_url: Option<String>,
    /// Published CSV of region/province rows. Read from `SETTINGS_SHEET_CSV_URL`.
    pub settings_csv_url: Option<String>,
    pub room_name_column: String,
    pub room_link_column: String,
    pub region_column: String,
    pub province_column: String,
    /// Attempts for registry/settings fetches (429, 5xx and network errors are retried).
    pub max_attempts: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    /// Maximum number of calendar feeds fetched at the same time.
    pub concurrency: usize,
    /// Upper bound for a single feed fetch, body included.
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub namespace: String,
    pub ttl_seconds: u64,
    /// Redis-over-REST endpoint (Vercel KV / Upstash). In-memory store when unset.
    pub kv_rest_url: Option<String>,
    pub kv_rest_token: Option<String>,
    /// Period of the background refresh worker; 0 disables it.
    pub warm_interval_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
    pub webhook_url: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Config {
            server: ServerConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: parse_var("PORT", 8080)?,
            },
            sources: SourcesConfig {
                rooms_csv_url: optional_url("GOOGLE_SHEET_CSV_URL")?,
                settings_csv_url: optional_url("SETTINGS_SHEET_CSV_URL")?,
                room_name_column: env::var("ROOM_NAME_COLUMN")
                    .unwrap_or_else(|_| "Ten_Phong".to_string()),
                room_link_column: env::var("ROOM_LINK_COLUMN")
                    .unwrap_or_else(|_| "Link_iCal".to_string()),
                region_column: env::var("SETTINGS_REGION_COLUMN")
                    .unwrap_or_else(|_| "Region".to_string()),
                province_column: env::var("SETTINGS_PROVINCE_COLUMN")
                    .unwrap_or_else(|_| "Province".to_string()),
                max_attempts: parse_var("SOURCE_MAX_ATTEMPTS", 3)?,
            },
            feeds: FeedConfig {
                concurrency: parse_var("FEED_CONCURRENCY", 16)?,
                timeout_seconds: parse_var("FEED_TIMEOUT_SECONDS", 15)?,
            },
            cache: CacheConfig {
                namespace: env::var("CACHE_NAMESPACE")
                    .unwrap_or_else(|_| "booking_data".to_string()),
                ttl_seconds: parse_var("CACHE_TTL_SECONDS", 3600)?,
                kv_rest_url: optional_url("KV_REST_API_URL")?,
                kv_rest_token: non_empty_var("KV_REST_API_TOKEN"),
                warm_interval_seconds: parse_var("CACHE_WARM_INTERVAL_SECONDS", 0)?,
            },
            proxy: ProxyConfig {
                webhook_url: optional_url("PROXY_WEBHOOK_URL")?,
            },
        })
    }
}

impl FeedConfig {
    /// Never below one second; a zero timeout would fail every feed.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds.max(1))
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Read a numeric variable, falling back to `default` when unset. A present
/// but unparsable value is a startup error.
fn parse_var<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match non_empty_var(key) {
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        None => Ok(default),
    }
}

/// Read an optional URL variable; a present but unparsable value is a startup error.
fn optional_url(key: &str) -> Result<Option<String>, ConfigError> {
    match non_empty_var(key) {
        Some(value) => {
            url::Url::parse(&value).map_err(|_| ConfigError::InvalidValue(key.to_string()))?;
            Ok(Some(value))
        }
        None => Ok(None),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            sources: SourcesConfig {
                rooms_csv_url: None,
                settings_csv_url: None,
                room_name_column: "Ten_Phong".to_string(),
                room_link_column: "Link_iCal".to_string(),
                region_column: "Region".to_string(),
                province_column: "Province".to_string(),
                max_attempts: 3,
            },
            feeds: FeedConfig {
                concurrency: 16,
                timeout_seconds: 15,
            },
            cache: CacheConfig {
                namespace: "booking_data".to_string(),
                ttl_seconds: 3600,
                kv_rest_url: None,
                kv_rest_token: None,
                warm_interval_seconds: 0,
            },
            proxy: ProxyConfig { webhook_url: None },
        }
    }
}
