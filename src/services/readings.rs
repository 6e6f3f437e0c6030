//! Live readings with fallback to the local store.
//!
//! Freshness is preferred but an answer is always given: when the station
//! network yields nothing usable the stored readings are served instead.

use crate::connectors::{BoundingBox, StationSource, UpstreamSettings};
use crate::db::{Store, StoreError};
use crate::models::{Reading, ReadingId};
use chrono::Utc;
use futures::future;
use futures::stream::{self, StreamExt};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum ReadingError {
    #[error("reading {0} not found")]
    NotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct ReadingService {
    source: Arc<dyn StationSource>,
    store: Arc<dyn Store>,
    bbox: BoundingBox,
    max_concurrency: usize,
}

impl ReadingService {
    pub fn new(source: Arc<dyn StationSource>, store: Arc<dyn Store>, settings: &UpstreamSettings) -> Self {
        Self {
            source,
            store,
            bbox: settings.bbox,
            max_concurrency: settings.max_concurrency.max(1),
        }
    }

    /// Configured area served by `GET /readings`.
    pub fn default_bbox(&self) -> &BoundingBox {
        &self.bbox
    }

    /// Current readings inside `bbox`. Never fails.
    #[tracing::instrument(name = "List readings", skip(self))]
    pub async fn list_readings(&self, bbox: &BoundingBox) -> Vec<Reading> {
        let live = self.live_readings(bbox).await;
        if !live.is_empty() {
            return live;
        }

        tracing::info!("No live readings available, serving stored readings");
        match self.store.list_readings().await {
            Ok(readings) => readings,
            Err(err) => {
                tracing::error!(error = %err, "Failed to load stored readings");
                Vec::new()
            }
        }
    }

    /// Normalized readings of every station that answered, in listing order.
    async fn live_readings(&self, bbox: &BoundingBox) -> Vec<Reading> {
        let stations = match self.source.list_stations(bbox).await {
            Ok(stations) => stations,
            Err(err) => {
                tracing::warn!(error = %err, "Station listing failed");
                return Vec::new();
            }
        };
        tracing::debug!(stations = stations.len(), "Fetching station feeds");

        let fetched_at = Utc::now();
        // `buffered` keeps at most `max_concurrency` feeds in flight and
        // yields in input order; the collect waits for every one to settle.
        stream::iter(stations)
            .map(|station| async move {
                let uid = station.uid;
                let outcome = self
                    .source
                    .station_feed(uid)
                    .await
                    .and_then(|feed| feed.normalize(uid, fetched_at));
                match outcome {
                    Ok(reading) => Some(reading),
                    Err(err) => {
                        tracing::warn!(station = uid, error = %err, "Discarding station");
                        None
                    }
                }
            })
            .buffered(self.max_concurrency)
            .filter_map(future::ready)
            .collect()
            .await
    }

    /// One reading by its textual id (`@uid` for stations, `n` for stored ones).
    #[tracing::instrument(name = "Get reading", skip(self))]
    pub async fn get_reading(&self, identifier: &str) -> Result<Reading, ReadingError> {
        let id: ReadingId = identifier
            .parse()
            .map_err(|_| ReadingError::NotFound(identifier.to_string()))?;

        match id {
            ReadingId::Station(uid) => {
                let outcome = self
                    .source
                    .station_feed(uid)
                    .await
                    .and_then(|feed| feed.normalize(uid, Utc::now()));
                outcome.map_err(|err| {
                    tracing::warn!(station = uid, error = %err, "Station feed unavailable");
                    ReadingError::NotFound(identifier.to_string())
                })
            }
            ReadingId::Local(key) => self
                .store
                .get_reading(key)
                .await?
                .ok_or_else(|| ReadingError::NotFound(identifier.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectors::{ConnectorError, StationFeed, StationSummary};
    use crate::db::seed::nagpur_readings;
    use crate::db::MemoryStore;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct MockSource {
        list_fails: bool,
        stations: Vec<i64>,
        /// uid to aqi; missing uids time out
        feeds: HashMap<i64, i32>,
        delay: Option<Duration>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl MockSource {
        fn with_feeds(feeds: &[(i64, Option<i32>)]) -> Self {
            Self {
                stations: feeds.iter().map(|(uid, _)| *uid).collect(),
                feeds: feeds
                    .iter()
                    .filter_map(|(uid, aqi)| aqi.map(|aqi| (*uid, aqi)))
                    .collect(),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl StationSource for MockSource {
        async fn list_stations(&self, _bbox: &BoundingBox) -> Result<Vec<StationSummary>, ConnectorError> {
            if self.list_fails {
                return Err(ConnectorError::ServiceUnavailable("connection refused".into()));
            }
            Ok(self
                .stations
                .iter()
                .map(|uid| StationSummary {
                    uid: *uid,
                    lat: None,
                    lon: None,
                    station: None,
                })
                .collect())
        }

        async fn station_feed(&self, uid: i64) -> Result<StationFeed, ConnectorError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            match self.feeds.get(&uid) {
                Some(aqi) => Ok(serde_json::from_value(json!({
                    "aqi": aqi,
                    "city": {"name": format!("Station {}", uid), "geo": [21.1, 79.0]},
                    "iaqi": {"pm25": {"v": 30.5}}
                }))
                .unwrap()),
                None => Err(ConnectorError::ServiceUnavailable("Request timeout".into())),
            }
        }
    }

    async fn seeded_store() -> Arc<dyn Store> {
        let store = MemoryStore::new();
        for reading in nagpur_readings() {
            store.create_reading(reading).await.unwrap();
        }
        Arc::new(store)
    }

    fn service(source: MockSource, store: Arc<dyn Store>, max_concurrency: usize) -> (ReadingService, Arc<MockSource>) {
        let source = Arc::new(source);
        let settings = UpstreamSettings {
            max_concurrency,
            ..UpstreamSettings::default()
        };
        (ReadingService::new(source.clone(), store, &settings), source)
    }

    #[tokio::test]
    async fn test_listing_failure_serves_store_contents() {
        let store = seeded_store().await;
        let stored = store.list_readings().await.unwrap();
        let (service, _) = service(
            MockSource {
                list_fails: true,
                ..MockSource::default()
            },
            store,
            4,
        );

        let readings = service.list_readings(&BoundingBox::default()).await;
        assert_eq!(readings, stored);
    }

    #[tokio::test]
    async fn test_failed_stations_are_excluded() {
        let (service, _) = service(
            MockSource::with_feeds(&[(1, Some(45)), (2, None), (3, Some(210))]),
            seeded_store().await,
            4,
        );

        let readings = service.list_readings(&BoundingBox::default()).await;
        let aqis: Vec<i32> = readings.iter().map(|r| r.aqi).collect();
        assert_eq!(aqis, vec![45, 210]);
        assert_eq!(readings[0].id, ReadingId::Station(1));
        assert_eq!(readings[1].id, ReadingId::Station(3));
        assert_eq!(readings[0].pm25, Some(30.5));
        assert_eq!(readings[0].co, None);
    }

    #[tokio::test]
    async fn test_every_station_failing_falls_back() {
        let store = seeded_store().await;
        let stored = store.list_readings().await.unwrap();
        let (service, _) = service(MockSource::with_feeds(&[(1, None), (2, None)]), store, 4);

        assert_eq!(service.list_readings(&BoundingBox::default()).await, stored);
    }

    #[tokio::test]
    async fn test_empty_bbox_with_empty_store_is_empty() {
        let (service, _) = service(MockSource::default(), Arc::new(MemoryStore::new()), 4);
        assert!(service.list_readings(&BoundingBox::default()).await.is_empty());
    }

    #[tokio::test]
    async fn test_fan_out_is_bounded() {
        let feeds: Vec<(i64, Option<i32>)> = (1..=20).map(|uid| (uid, Some(50 + uid as i32))).collect();
        let mut source = MockSource::with_feeds(&feeds);
        source.delay = Some(Duration::from_millis(10));
        let (service, source) = service(source, Arc::new(MemoryStore::new()), 3);

        let readings = service.list_readings(&BoundingBox::default()).await;
        assert_eq!(readings.len(), 20);
        assert!(source.max_in_flight.load(Ordering::SeqCst) <= 3);
        // listing order survives concurrent completion
        assert_eq!(readings[0].aqi, 51);
        assert_eq!(readings[19].aqi, 70);
    }

    #[tokio::test]
    async fn test_unknown_id_is_not_found() {
        let (service, _) = service(
            MockSource {
                list_fails: true,
                ..MockSource::default()
            },
            seeded_store().await,
            4,
        );
        assert!(matches!(
            service.get_reading("unknown-id").await,
            Err(ReadingError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_station_and_local_ids_do_not_cross() {
        let (service, _) = service(MockSource::with_feeds(&[(1, Some(45))]), seeded_store().await, 4);

        let live = service.get_reading("@1").await.unwrap();
        assert_eq!(live.aqi, 45);

        // local key 1 is the first seeded reading, not station 1
        let stored = service.get_reading("1").await.unwrap();
        assert_eq!(stored.id, ReadingId::Local(1));
        assert_eq!(stored.location_name, "Sitabuldi, Nagpur");

        // a failing station never resolves to a stored row
        assert!(matches!(
            service.get_reading("@2").await,
            Err(ReadingError::NotFound(_))
        ));
        assert!(matches!(
            service.get_reading("99").await,
            Err(ReadingError::NotFound(_))
        ));
    }
}
