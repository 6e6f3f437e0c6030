//! Station network (World Air Quality Index) connector
//!
//! Two endpoints are consumed:
//! - `GET /map/bounds/?latlng=lat1,lng1,lat2,lng2` lists the stations in an area
//! - `GET /feed/@{uid}/` returns one station's current measurements

use crate::connectors::config::BoundingBox;
use crate::connectors::ConnectorError;
use async_trait::async_trait;

pub mod client;
pub mod types;

pub use client::WaqiClient;
pub use types::{StationFeed, StationSummary};

#[async_trait]
pub trait StationSource: Send + Sync {
    /// Stations inside `bbox`. Any non-ok answer is an error.
    async fn list_stations(&self, bbox: &BoundingBox)
        -> Result<Vec<StationSummary>, ConnectorError>;

    /// Current feed of one station. Any non-ok answer is an error.
    async fn station_feed(&self, uid: i64) -> Result<StationFeed, ConnectorError>;
}
