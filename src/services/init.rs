//! Initialization helpers for the application:
//! - shared HTTP client and cache store selection
//! - wiring of the sync pipeline into `AppState`
//! - background worker spawn helpers

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use crate::cache::{CacheKey, CacheStore, MemoryCacheStore, RestKvStore};
use crate::config::Config;
use crate::services::feeds::FeedAggregator;
use crate::services::http::{build_client, redact_url};
use crate::services::proxy::WebhookProxy;
use crate::services::registry::RegistryLoader;
use crate::services::sync::SyncService;
use crate::AppState;

/// Ceiling for any single outbound request; feeds have their own tighter bound.
const CLIENT_TIMEOUT: Duration = Duration::from_secs(30);

/// Pick the cache backend: the REST KV store when both URL and token are set,
/// otherwise a process-local map.
pub fn build_cache_store(config: &Config, client: &reqwest::Client) -> Arc<dyn CacheStore> {
    match (&config.cache.kv_rest_url, &config.cache.kv_rest_token) {
        (Some(url), Some(token)) => {
            tracing::info!("Using REST KV cache at {}", redact_url(url));
            Arc::new(RestKvStore::new(client.clone(), url, token))
        }
        (Some(_), None) => {
            tracing::warn!("KV_REST_API_URL is set without KV_REST_API_TOKEN; falling back to in-memory cache");
            Arc::new(MemoryCacheStore::new())
        }
        _ => {
            tracing::info!("Using in-memory cache");
            Arc::new(MemoryCacheStore::new())
        }
    }
}

/// Build the shared application state from configuration.
pub fn build_state(config: Config) -> Result<Arc<AppState>> {
    let client = build_client(CLIENT_TIMEOUT)?;
    let cache = build_cache_store(&config, &client);

    if config.sources.rooms_csv_url.is_none() || config.sources.settings_csv_url.is_none() {
        tracing::warn!(
            "Room registry or settings URL is not configured; /api/data will answer with an error until both are set"
        );
    }

    let sync = SyncService::new(
        config.sources.clone(),
        cache,
        CacheKey::payload(&config.cache.namespace),
        config.cache.ttl(),
        RegistryLoader::new(client.clone(), &config.sources),
        FeedAggregator::new(client.clone(), &config.feeds),
    );
    let proxy = WebhookProxy::new(client, config.proxy.webhook_url.clone());

    Ok(Arc::new(AppState {
        config,
        sync,
        proxy,
    }))
}

/// Spawn background workers:
/// - periodic cache warm-up (forced refresh), when `CACHE_WARM_INTERVAL_SECONDS` > 0
///
/// Returns the `JoinHandle`s so callers can await shutdown. Each worker
/// listens for a shutdown notification on the broadcast channel.
pub fn spawn_background_workers(
    state: Arc<AppState>,
    shutdown: tokio::sync::broadcast::Sender<()>,
) -> Vec<tokio::task::JoinHandle<()>> {
    let mut handles = Vec::new();

    let interval_secs = state.config.cache.warm_interval_seconds;
    if interval_secs == 0 {
        tracing::debug!("Cache warm-up worker disabled");
        return handles;
    }

    let mut shutdown_rx = shutdown.subscribe();
    handles.push(tokio::spawn(async move {
        loop {
            tracing::info!("Starting periodic cache warm-up");

            match state.sync.get_or_sync(true).await {
                Ok(_) => tracing::info!("Cache warm-up finished"),
                Err(e) => tracing::warn!("Cache warm-up failed: {}", e),
            }

            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("Cache warm-up worker shutting down");
                    break;
                }
                _ = tokio::time::sleep(Duration::from_secs(interval_secs)) => {}
            }
        }
    }));

    handles
}
