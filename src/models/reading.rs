use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Identifier of a reading.
///
/// Readings come from two disjoint identifier spaces:
/// - live readings normalized from a network station (`@8688`)
/// - readings persisted in the local store (`12`)
///
/// The textual form keeps them apart: station ids always carry the `@` prefix
/// the station network itself uses, local ids are plain positive integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadingId {
    /// Upstream station uid
    Station(i64),
    /// Local store key
    Local(i32),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid reading id: {0:?}")]
pub struct ReadingIdError(pub String);

impl ReadingId {
    pub fn is_station(&self) -> bool {
        matches!(self, Self::Station(_))
    }

    pub fn as_station(&self) -> Option<i64> {
        match self {
            Self::Station(uid) => Some(*uid),
            _ => None,
        }
    }

    pub fn as_local(&self) -> Option<i32> {
        match self {
            Self::Local(id) => Some(*id),
            _ => None,
        }
    }
}

impl fmt::Display for ReadingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Station(uid) => write!(f, "@{}", uid),
            Self::Local(id) => write!(f, "{}", id),
        }
    }
}

impl FromStr for ReadingId {
    type Err = ReadingIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let parsed = match trimmed.strip_prefix('@') {
            Some(uid) => uid.parse::<i64>().ok().filter(|uid| *uid >= 0).map(Self::Station),
            None => trimmed.parse::<i32>().ok().filter(|id| *id > 0).map(Self::Local),
        };
        parsed.ok_or_else(|| ReadingIdError(s.to_string()))
    }
}

impl Serialize for ReadingId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ReadingId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(i32),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Text(text) => text.parse().map_err(serde::de::Error::custom),
            Raw::Number(id) if id > 0 => Ok(Self::Local(id)),
            Raw::Number(id) => Err(serde::de::Error::custom(ReadingIdError(id.to_string()))),
        }
    }
}

/// One normalized air-quality measurement.
///
/// Pollutant concentrations are `None` when the station did not report the
/// species; a reported zero stays `Some(0.0)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    pub id: ReadingId,
    pub location_name: String,
    pub lat: f64,
    pub lng: f64,
    pub aqi: i32,
    pub pm25: Option<f64>,
    pub pm10: Option<f64>,
    pub no2: Option<f64>,
    pub o3: Option<f64>,
    pub so2: Option<f64>,
    pub co: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl Reading {
    pub fn category(&self) -> AqiCategory {
        AqiCategory::from_aqi(self.aqi)
    }
}

/// Reading data before the store assigns it a local id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReading {
    pub location_name: String,
    pub lat: f64,
    pub lng: f64,
    pub aqi: i32,
    pub pm25: Option<f64>,
    pub pm10: Option<f64>,
    pub no2: Option<f64>,
    pub o3: Option<f64>,
    pub so2: Option<f64>,
    pub co: Option<f64>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl NewReading {
    /// Timestamp as it will be persisted: postgres keeps microseconds.
    pub fn effective_timestamp(&self) -> DateTime<Utc> {
        self.timestamp.unwrap_or_else(Utc::now).trunc_subsecs(6)
    }

    pub fn into_reading(self, id: i32) -> Reading {
        let timestamp = self.effective_timestamp();
        Reading {
            id: ReadingId::Local(id),
            location_name: self.location_name,
            lat: self.lat,
            lng: self.lng,
            aqi: self.aqi,
            pm25: self.pm25,
            pm10: self.pm10,
            no2: self.no2,
            o3: self.o3,
            so2: self.so2,
            co: self.co,
            timestamp,
        }
    }
}

/// US EPA AQI bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AqiCategory {
    Good,
    Moderate,
    UnhealthyForSensitiveGroups,
    Unhealthy,
    VeryUnhealthy,
    Hazardous,
}

impl AqiCategory {
    pub fn from_aqi(aqi: i32) -> Self {
        match aqi {
            i32::MIN..=50 => Self::Good,
            51..=100 => Self::Moderate,
            101..=150 => Self::UnhealthyForSensitiveGroups,
            151..=200 => Self::Unhealthy,
            201..=300 => Self::VeryUnhealthy,
            _ => Self::Hazardous,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Good => "Good",
            Self::Moderate => "Moderate",
            Self::UnhealthyForSensitiveGroups => "Unhealthy for Sensitive Groups",
            Self::Unhealthy => "Unhealthy",
            Self::VeryUnhealthy => "Very Unhealthy",
            Self::Hazardous => "Hazardous",
        }
    }
}

impl fmt::Display for AqiCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Rounded mean AQI of a set of readings, `None` when there are none.
pub fn average_aqi(readings: &[Reading]) -> Option<i32> {
    if readings.is_empty() {
        return None;
    }
    let total: i64 = readings.iter().map(|r| r.aqi as i64).sum();
    Some((total as f64 / readings.len() as f64).round() as i32)
}
