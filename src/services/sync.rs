use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::Mutex;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

use crate::cache::{CacheKey, CacheStore};
use crate::config::SourcesConfig;
use crate::error::SyncError;
use crate::models::{SettingsIndex, SyncPayload};
use crate::services::feeds::FeedAggregator;
use crate::services::registry::RegistryLoader;

pub const NO_ROOMS_MESSAGE: &str = "No rooms found to sync.";

/// Whether a payload came from the cache or from a sync run for this request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
        }
    }
}

#[derive(Debug, Clone)]
pub enum SyncOutcome {
    /// A payload plus the exact JSON stored in the cache for it.
    Payload {
        payload: Arc<SyncPayload>,
        body: Arc<str>,
        cache: CacheStatus,
    },
    /// The registry had no rows; nothing was aggregated or cached.
    NoRooms,
}

type InFlightSync = Shared<BoxFuture<'static, Result<SyncOutcome, SyncError>>>;

/// Cache coordinator: serves the cached payload and re-syncs on a miss.
///
/// Concurrent misses for the same key share one in-flight sync.
#[derive(Clone)]
pub struct SyncService {
    inner: Arc<Inner>,
}

struct Inner {
    sources: SourcesConfig,
    cache: Arc<dyn CacheStore>,
    key: CacheKey,
    ttl: Duration,
    registry: RegistryLoader,
    aggregator: FeedAggregator,
    in_flight: Mutex<HashMap<String, InFlightSync>>,
}

impl SyncService {
    pub fn new(
        sources: SourcesConfig,
        cache: Arc<dyn CacheStore>,
        key: CacheKey,
        ttl: Duration,
        registry: RegistryLoader,
        aggregator: FeedAggregator,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                sources,
                cache,
                key,
                ttl,
                registry,
                aggregator,
                in_flight: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Return the cached payload, or sync and cache a fresh one.
    ///
    /// `force_refresh` drops the current entry first and always syncs.
    pub async fn get_or_sync(&self, force_refresh: bool) -> Result<SyncOutcome, SyncError> {
        let key = self.inner.key.as_str();

        if force_refresh {
            match self.inner.cache.delete(key).await {
                Ok(existed) => info!("Forced refresh: cache entry {} dropped (existed: {})", key, existed),
                Err(e) => warn!("Forced refresh: failed to delete cache entry {}: {}", key, e),
            }
        } else if let Some(outcome) = self.read_cached().await {
            return Ok(outcome);
        }

        self.join_or_start_sync().await
    }

    async fn read_cached(&self) -> Option<SyncOutcome> {
        let key = self.inner.key.as_str();
        let body = match self.inner.cache.get(key).await {
            Ok(Some(body)) => body,
            Ok(None) => {
                info!("Cache miss for {}", key);
                return None;
            }
            Err(e) => {
                warn!("Cache read failed for {}, treating as miss: {}", key, e);
                return None;
            }
        };

        match serde_json::from_str::<SyncPayload>(&body) {
            Ok(payload) => {
                debug!("Serving {} from cache", key);
                Some(SyncOutcome::Payload {
                    payload: Arc::new(payload),
                    body: body.into(),
                    cache: CacheStatus::Hit,
                })
            }
            Err(e) => {
                warn!("Cached entry {} is not a valid payload, re-syncing: {}", key, e);
                None
            }
        }
    }

    async fn join_or_start_sync(&self) -> Result<SyncOutcome, SyncError> {
        let key = self.inner.key.as_str().to_string();

        let sync = {
            let mut in_flight = self.inner.in_flight.lock().await;
            match in_flight.get(&key).cloned() {
                Some(existing) => {
                    debug!("Joining in-flight sync for {}", key);
                    existing
                }
                None => {
                    let this = self.clone();
                    let owned_key = key.clone();
                    let fut: BoxFuture<'static, _> = async move {
                        let result = this.run_sync().await;
                        this.inner.in_flight.lock().await.remove(&owned_key);
                        result
                    }
                    .boxed();
                    let shared = fut.shared();
                    in_flight.insert(key, shared.clone());
                    shared
                }
            }
        };

        sync.await
    }

    async fn run_sync(&self) -> Result<SyncOutcome, SyncError> {
        let sync_id = Uuid::new_v4();
        let span = tracing::info_span!("sync", %sync_id);
        self.sync_and_store().instrument(span).await
    }

    async fn sync_and_store(&self) -> Result<SyncOutcome, SyncError> {
        let inner = &self.inner;
        let rooms_url = required_url(&inner.sources.rooms_csv_url, "GOOGLE_SHEET_CSV_URL")?;
        let settings_url =
            required_url(&inner.sources.settings_csv_url, "SETTINGS_SHEET_CSV_URL")?;

        let (rooms, settings_rows) = tokio::try_join!(
            inner.registry.load_rooms(rooms_url),
            inner.registry.load_settings(settings_url),
        )?;

        if rooms.is_empty() {
            info!("Registry has no rooms; skipping aggregation");
            return Ok(SyncOutcome::NoRooms);
        }

        let settings = SettingsIndex::from_rows(&settings_rows);
        let report = inner.aggregator.collect(&rooms).await;
        let failed_feeds = report.failures.len();

        let payload = SyncPayload::assemble(rooms, report.bookings, settings, Utc::now());
        let body: Arc<str> = serde_json::to_string(&payload)
            .map_err(|e| SyncError::Encode(e.to_string()))?
            .into();

        if let Err(e) = inner.cache.set(inner.key.as_str(), &body, inner.ttl).await {
            warn!("Failed to store payload in cache {}: {}", inner.key, e);
        }

        info!(
            rooms = payload.rooms.len(),
            bookings = payload.bookings.len(),
            failed_feeds,
            "Sync completed"
        );

        Ok(SyncOutcome::Payload {
            payload: Arc::new(payload),
            body,
            cache: CacheStatus::Miss,
        })
    }
}

fn required_url<'a>(value: &'a Option<String>, env_name: &str) -> Result<&'a str, SyncError> {
    value
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| {
            SyncError::Configuration(format!(
                "{} is not defined in environment variables.",
                env_name
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCacheStore;
    use crate::config::{Config, FeedConfig};
    use crate::services::http::RetryPolicy;
    use reqwest::Client;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ROOM_ICS: &str = "BEGIN:VCALENDAR\r\n\
VERSION:2.0\r\n\
BEGIN:VEVENT\r\n\
UID:evt-1\r\n\
DTSTART;VALUE=DATE:20250601\r\n\
DTEND;VALUE=DATE:20250602\r\n\
SUMMARY:Guest\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";

    const SETTINGS_CSV: &str = "Region,Province\nNorth,Ha Noi\nSouth,Can Tho\nNorth,Hai Phong\n";

    fn service_for(server: &MockServer, cache: Arc<dyn CacheStore>) -> SyncService {
        let mut sources = Config::default().sources;
        sources.rooms_csv_url = Some(format!("{}/rooms.csv", server.uri()));
        sources.settings_csv_url = Some(format!("{}/settings.csv", server.uri()));

        let client = Client::new();
        SyncService::new(
            sources.clone(),
            cache,
            CacheKey::payload("booking_data"),
            Duration::from_secs(3600),
            RegistryLoader::new(client.clone(), &sources).with_retry(RetryPolicy::once()),
            FeedAggregator::new(
                client,
                &FeedConfig {
                    concurrency: 4,
                    timeout_seconds: 5,
                },
            ),
        )
    }

    async fn mount_body(server: &MockServer, route: &str, body: &str, expected_calls: u64) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    fn rooms_csv(server: &MockServer) -> String {
        format!(
            "Ten_Phong,Link_iCal,Region\nRoom 1,{uri}/room1.ics,North\nRoom 2,{uri}/room2.ics,South\n",
            uri = server.uri()
        )
    }

    fn expect_payload(outcome: SyncOutcome) -> (Arc<SyncPayload>, Arc<str>, CacheStatus) {
        match outcome {
            SyncOutcome::Payload {
                payload,
                body,
                cache,
            } => (payload, body, cache),
            SyncOutcome::NoRooms => panic!("expected a payload, got NoRooms"),
        }
    }

    #[tokio::test]
    async fn empty_registry_reports_no_rooms_without_caching() {
        let server = MockServer::start().await;
        mount_body(&server, "/rooms.csv", "Ten_Phong,Link_iCal\n", 1).await;
        mount_body(&server, "/settings.csv", SETTINGS_CSV, 1).await;

        let cache = Arc::new(MemoryCacheStore::new());
        let service = service_for(&server, cache.clone());

        let outcome = service.get_or_sync(false).await.unwrap();
        assert!(matches!(outcome, SyncOutcome::NoRooms));
        assert!(cache.get("booking_data:v2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn mixed_feeds_keep_all_rooms_and_successful_bookings() {
        let server = MockServer::start().await;
        mount_body(&server, "/rooms.csv", &rooms_csv(&server), 1).await;
        mount_body(&server, "/settings.csv", SETTINGS_CSV, 1).await;
        mount_body(&server, "/room1.ics", ROOM_ICS, 1).await;
        Mock::given(method("GET"))
            .and(path("/room2.ics"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let service = service_for(&server, Arc::new(MemoryCacheStore::new()));
        let (payload, _, cache) = expect_payload(service.get_or_sync(false).await.unwrap());

        assert_eq!(cache, CacheStatus::Miss);
        assert_eq!(payload.rooms.len(), 2);
        assert_eq!(payload.bookings.len(), 1);
        assert_eq!(payload.bookings[0].room_name, "Room 1");
        assert_eq!(payload.settings.regions, vec!["North", "South"]);
        assert_eq!(
            payload.settings.provinces_by_region["North"],
            vec!["Ha Noi", "Hai Phong"]
        );
    }

    #[tokio::test]
    async fn all_feeds_failing_still_returns_rooms() {
        let server = MockServer::start().await;
        mount_body(&server, "/rooms.csv", &rooms_csv(&server), 1).await;
        mount_body(&server, "/settings.csv", SETTINGS_CSV, 1).await;
        Mock::given(method("GET"))
            .and(path("/room1.ics"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/room2.ics"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let service = service_for(&server, Arc::new(MemoryCacheStore::new()));
        let (payload, _, _) = expect_payload(service.get_or_sync(false).await.unwrap());

        assert_eq!(payload.rooms.len(), 2);
        assert!(payload.bookings.is_empty());
    }

    #[tokio::test]
    async fn second_call_is_served_from_cache_byte_for_byte() {
        let server = MockServer::start().await;
        mount_body(&server, "/rooms.csv", &rooms_csv(&server), 1).await;
        mount_body(&server, "/settings.csv", SETTINGS_CSV, 1).await;
        mount_body(&server, "/room1.ics", ROOM_ICS, 1).await;
        mount_body(&server, "/room2.ics", ROOM_ICS, 1).await;

        let service = service_for(&server, Arc::new(MemoryCacheStore::new()));
        let (_, first_body, first_status) =
            expect_payload(service.get_or_sync(false).await.unwrap());
        let (_, second_body, second_status) =
            expect_payload(service.get_or_sync(false).await.unwrap());

        assert_eq!(first_status, CacheStatus::Miss);
        assert_eq!(second_status, CacheStatus::Hit);
        assert_eq!(first_body, second_body);
        // Each upstream mock expects exactly one call; verified when `server` drops.
    }

    #[tokio::test]
    async fn registry_column_named_like_a_room_field_still_caches() {
        let server = MockServer::start().await;
        let rooms = format!(
            "Ten_Phong,Link_iCal,name\nRoom 1,{}/room1.ics,Alias\n",
            server.uri()
        );
        mount_body(&server, "/rooms.csv", &rooms, 1).await;
        mount_body(&server, "/settings.csv", SETTINGS_CSV, 1).await;
        mount_body(&server, "/room1.ics", ROOM_ICS, 1).await;

        let service = service_for(&server, Arc::new(MemoryCacheStore::new()));
        service.get_or_sync(false).await.unwrap();
        let (payload, _, status) = expect_payload(service.get_or_sync(false).await.unwrap());

        assert_eq!(status, CacheStatus::Hit);
        assert_eq!(payload.rooms[0].name, "Room 1");
    }

    #[tokio::test]
    async fn force_refresh_syncs_again_after_a_hit() {
        let server = MockServer::start().await;
        mount_body(&server, "/rooms.csv", &rooms_csv(&server), 2).await;
        mount_body(&server, "/settings.csv", SETTINGS_CSV, 2).await;
        mount_body(&server, "/room1.ics", ROOM_ICS, 2).await;
        mount_body(&server, "/room2.ics", ROOM_ICS, 2).await;

        let service = service_for(&server, Arc::new(MemoryCacheStore::new()));
        service.get_or_sync(false).await.unwrap();
        let (_, _, hit) = expect_payload(service.get_or_sync(false).await.unwrap());
        assert_eq!(hit, CacheStatus::Hit);

        let (_, _, forced) = expect_payload(service.get_or_sync(true).await.unwrap());
        assert_eq!(forced, CacheStatus::Miss);
    }

    #[tokio::test]
    async fn missing_source_url_is_configuration_error() {
        let server = MockServer::start().await;
        let mut sources = Config::default().sources;
        sources.rooms_csv_url = Some(format!("{}/rooms.csv", server.uri()));
        let client = Client::new();
        let service = SyncService::new(
            sources.clone(),
            Arc::new(MemoryCacheStore::new()),
            CacheKey::payload("booking_data"),
            Duration::from_secs(60),
            RegistryLoader::new(client.clone(), &sources),
            FeedAggregator::new(client, &Config::default().feeds),
        );

        let err = service.get_or_sync(false).await.unwrap_err();
        assert_eq!(
            err,
            SyncError::Configuration(
                "SETTINGS_SHEET_CSV_URL is not defined in environment variables.".to_string()
            )
        );
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn registry_failure_leaves_cache_untouched() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rooms.csv"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/settings.csv"))
            .respond_with(ResponseTemplate::new(200).set_body_string(SETTINGS_CSV))
            .mount(&server)
            .await;

        let cache = Arc::new(MemoryCacheStore::new());
        let service = service_for(&server, cache.clone());

        let err = service.get_or_sync(false).await.unwrap_err();
        assert!(matches!(err, SyncError::SourceUnavailable(_)));
        assert!(cache.get("booking_data:v2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_cache_entry_triggers_resync() {
        let server = MockServer::start().await;
        mount_body(&server, "/rooms.csv", &rooms_csv(&server), 1).await;
        mount_body(&server, "/settings.csv", SETTINGS_CSV, 1).await;
        mount_body(&server, "/room1.ics", ROOM_ICS, 1).await;
        mount_body(&server, "/room2.ics", ROOM_ICS, 1).await;

        let cache = Arc::new(MemoryCacheStore::new());
        cache
            .set("booking_data:v2", "{not json", Duration::from_secs(60))
            .await
            .unwrap();
        let service = service_for(&server, cache);

        let (payload, _, status) = expect_payload(service.get_or_sync(false).await.unwrap());
        assert_eq!(status, CacheStatus::Miss);
        assert_eq!(payload.bookings.len(), 2);
    }

    #[tokio::test]
    async fn concurrent_misses_share_one_sync() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rooms.csv"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(rooms_csv(&server))
                    .set_delay(Duration::from_millis(300)),
            )
            .expect(1)
            .mount(&server)
            .await;
        mount_body(&server, "/settings.csv", SETTINGS_CSV, 1).await;
        mount_body(&server, "/room1.ics", ROOM_ICS, 1).await;
        mount_body(&server, "/room2.ics", ROOM_ICS, 1).await;

        let service = service_for(&server, Arc::new(MemoryCacheStore::new()));
        let (a, b, c) = tokio::join!(
            service.get_or_sync(false),
            service.get_or_sync(false),
            service.get_or_sync(false),
        );

        let (_, body_a, _) = expect_payload(a.unwrap());
        let (_, body_b, _) = expect_payload(b.unwrap());
        let (_, body_c, _) = expect_payload(c.unwrap());
        assert_eq!(body_a, body_b);
        assert_eq!(body_b, body_c);
        assert!(service.inner.in_flight.lock().await.is_empty());
    }
}
