//! Telemetry service: fetch, extract, transform and cache the status report.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::error::MeshStatusError;
use crate::extractor::extract;
use crate::fetcher::PacketSource;
use crate::metadata::MetadataLookup;
use crate::models::{RepeaterStatus, StatusReport};
use crate::transformer::{transform, Transformation};

pub const DEFAULT_API_URL: &str = "https://api.letsmesh.net/api/packets/filtered";
pub const DEFAULT_OBSERVER_KEY: &str =
    "2B63BF3DF73DA29F30DF1308ACA6480E9F09ABB43A8993533465A5FED60CCAD7";
pub const DEFAULT_REGION: &str = "CMH";
pub const DEFAULT_PACKET_LIMIT: u32 = 500;
pub const DEFAULT_ONLINE_TIMEOUT_MINUTES: u32 = 60;

/// Where to fetch packets from and how to judge them.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryConfig {
    pub api_url: String,
    /// Credential identifying the observer feed.
    pub observer_key: String,
    pub region: String,
    pub packet_limit: u32,
    /// A repeater heard within this many minutes is online.
    pub online_timeout_minutes: u32,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.into(),
            observer_key: DEFAULT_OBSERVER_KEY.into(),
            region: DEFAULT_REGION.into(),
            packet_limit: DEFAULT_PACKET_LIMIT,
            online_timeout_minutes: DEFAULT_ONLINE_TIMEOUT_MINUTES,
        }
    }
}

impl TelemetryConfig {
    pub fn online_timeout(&self) -> Duration {
        Duration::minutes(i64::from(self.online_timeout_minutes))
    }
}

pub type Clock = fn() -> DateTime<Utc>;

#[derive(Debug, Default)]
struct Cache {
    report: Option<Arc<StatusReport>>,
    last_fetch: Option<DateTime<Utc>>,
}

/// Owns the current status report.
///
/// The report is fetched on first use and replaced wholesale by every
/// successful [`fetch_and_transform`](Self::fetch_and_transform). There is no
/// staleness policy; refreshing is up to the caller. Overlapping fetches are
/// not coordinated and the last one to finish wins.
pub struct TelemetryService {
    config: TelemetryConfig,
    source: Arc<dyn PacketSource>,
    metadata: Arc<dyn MetadataLookup>,
    clock: Clock,
    cache: RwLock<Cache>,
}

impl TelemetryService {
    pub fn new(
        config: TelemetryConfig,
        source: Arc<dyn PacketSource>,
        metadata: Arc<dyn MetadataLookup>,
    ) -> Self {
        Self {
            config,
            source,
            metadata,
            clock: Utc::now,
            cache: RwLock::new(Cache::default()),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &TelemetryConfig {
        &self.config
    }

    /// Fetches the feed once and rebuilds the cached report.
    ///
    /// # Errors
    ///
    /// Transport failures, non-success statuses and bodies that are not a
    /// packet array. The previous report stays cached in that case.
    pub async fn fetch_and_transform(&self) -> Result<Arc<StatusReport>, MeshStatusError> {
        let packets = self
            .source
            .fetch_packets()
            .await
            .inspect_err(|e| error!("Error fetching API data: {}", e))?;

        let extraction = extract(&packets);
        if extraction.records.is_empty() {
            warn!("No repeater data extracted from packets");
        }
        if !extraction.skipped.is_empty() {
            warn!("Skipped {} malformed packets", extraction.skipped.len());
        }

        let now = (self.clock)();
        let Transformation { report, skipped } = transform(
            &extraction.records,
            &self.config.region,
            self.metadata.as_ref(),
            self.config.online_timeout(),
            now,
        );
        if !skipped.is_empty() {
            warn!("Left {} repeaters out of the report", skipped.len());
        }

        let report = Arc::new(report);
        {
            let mut cache = self.cache.write().await;
            cache.report = Some(Arc::clone(&report));
            cache.last_fetch = Some(now);
        }

        info!(
            "Repeater data refreshed: {} repeaters, {} online",
            report.summary.total_repeaters, report.summary.online_repeaters
        );
        Ok(report)
    }

    /// The cached report, fetching it first if there is none.
    ///
    /// `None` means the data is temporarily unavailable.
    pub async fn get_data(&self) -> Option<Arc<StatusReport>> {
        let cached = self.cache.read().await.report.clone();
        if cached.is_some() {
            return cached;
        }
        self.fetch_and_transform().await.ok()
    }

    pub async fn get_repeater(&self, id: &str) -> Option<RepeaterStatus> {
        self.get_data().await?.find(id).cloned()
    }

    /// Online repeaters in report order; empty when no data is available.
    pub async fn get_online_repeaters(&self) -> Vec<RepeaterStatus> {
        match self.get_data().await {
            Some(report) => report.online().cloned().collect(),
            None => Vec::new(),
        }
    }

    /// When the cached report was built.
    pub async fn last_fetch(&self) -> Option<DateTime<Utc>> {
        self.cache.read().await.last_fetch
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::metadata::MetadataTable;
    use crate::models::Status;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// In-memory packet source. `None` makes the next fetch fail.
    pub(crate) struct FakeSource {
        packets: Mutex<Option<Vec<Value>>>,
        calls: AtomicUsize,
    }

    impl FakeSource {
        pub(crate) fn new(packets: Option<Vec<Value>>) -> Arc<Self> {
            Arc::new(Self {
                packets: Mutex::new(packets),
                calls: AtomicUsize::new(0),
            })
        }

        pub(crate) fn set(&self, packets: Option<Vec<Value>>) {
            *self.packets.lock().unwrap() = packets;
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PacketSource for FakeSource {
        async fn fetch_packets(&self) -> Result<Vec<Value>, MeshStatusError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.packets
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| MeshStatusError::InvalidApiResponse("offline".into()))
        }
    }

    pub(crate) fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 1, 5, 0).unwrap()
    }

    pub(crate) fn advert(key: &str, heard_at: &str, rssi: i64) -> Value {
        json!({
            "public_key": key,
            "payload_type": "Advert",
            "decoded_payload": {"mode": "Repeater", "name": format!("Node {}", key)},
            "heard_at": heard_at,
            "rssi": rssi
        })
    }

    pub(crate) fn sample_feed() -> Vec<Value> {
        vec![
            advert("A", "2026-01-01T00:00:00Z", -60),
            advert("A", "2026-01-01T01:00:00Z", -90),
            advert("B", "2025-12-31T20:00:00Z", -70),
            advert("C", "2026-01-01T00:30:00Z", -100),
        ]
    }

    pub(crate) fn service_with(source: Arc<FakeSource>) -> TelemetryService {
        TelemetryService::new(
            TelemetryConfig::default(),
            source,
            Arc::new(MetadataTable::default()),
        )
        .with_clock(fixed_now)
    }

    #[tokio::test]
    async fn test_get_data_fetches_once_then_caches() {
        let source = FakeSource::new(Some(sample_feed()));
        let service = service_with(source.clone());

        let first = service.get_data().await.unwrap();
        let second = service.get_data().await.unwrap();

        assert_eq!(source.calls(), 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.summary.total_repeaters, 3);
        assert_eq!(first.summary.online_repeaters, 2);
        assert_eq!(first.region, "CMH");
        assert_eq!(service.last_fetch().await, Some(fixed_now()));
    }

    #[tokio::test]
    async fn test_fetch_failure_yields_none() {
        let source = FakeSource::new(None);
        let service = service_with(source.clone());

        assert!(service.fetch_and_transform().await.is_err());
        assert!(service.get_data().await.is_none());
        assert!(service.get_repeater("A").await.is_none());
        assert!(service.get_online_repeaters().await.is_empty());
        assert_eq!(service.last_fetch().await, None);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_report() {
        let source = FakeSource::new(Some(sample_feed()));
        let service = service_with(source.clone());
        let before = service.get_data().await.unwrap();

        source.set(None);
        assert!(service.fetch_and_transform().await.is_err());

        let after = service.get_data().await.unwrap();
        assert!(Arc::ptr_eq(&before, &after));
    }

    #[tokio::test]
    async fn test_forced_refresh_replaces_report() {
        let source = FakeSource::new(Some(sample_feed()));
        let service = service_with(source.clone());
        service.get_data().await.unwrap();

        source.set(Some(vec![advert("Z", "2026-01-01T01:00:00Z", -60)]));
        let refreshed = service.fetch_and_transform().await.unwrap();

        assert_eq!(refreshed.summary.total_repeaters, 1);
        assert_eq!(service.get_data().await.unwrap().repeaters[0].id, "Z");
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_empty_feed_is_valid_report() {
        let service = service_with(FakeSource::new(Some(Vec::new())));
        let report = service.fetch_and_transform().await.unwrap();
        assert_eq!(report.summary.total_repeaters, 0);
        assert_eq!(report.summary.network_health, 0);
        assert_eq!(report.summary.average_signal_strength, 0);
        assert!(report.repeaters.is_empty());
    }

    #[tokio::test]
    async fn test_get_repeater() {
        let service = service_with(FakeSource::new(Some(sample_feed())));
        let a = service.get_repeater("A").await.unwrap();
        assert_eq!(a.signal_strength, 25);
        assert_eq!(a.status, Status::Online);
        assert!(service.get_repeater("missing").await.is_none());
    }

    #[tokio::test]
    async fn test_online_repeaters_keep_report_order() {
        let service = service_with(FakeSource::new(Some(sample_feed())));
        let ids: Vec<_> = service
            .get_online_repeaters()
            .await
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["A", "C"]);
    }

    #[test]
    fn test_config_timeout() {
        let config = TelemetryConfig {
            online_timeout_minutes: 240,
            ..TelemetryConfig::default()
        };
        assert_eq!(config.online_timeout(), Duration::hours(4));
        assert_eq!(TelemetryConfig::default().packet_limit, 500);
    }
}
