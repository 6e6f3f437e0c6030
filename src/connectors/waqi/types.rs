use crate::connectors::ConnectorError;
use crate::models::{Reading, ReadingId};
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

/// `{"status": "ok", "data": ...}`; on errors `data` is a message string.
#[derive(Debug, Deserialize)]
pub struct Envelope {
    pub status: String,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    /// The `data` member when the status is ok.
    pub fn into_data(self) -> Result<Value, ConnectorError> {
        if self.status == "ok" {
            return Ok(self.data);
        }
        let message = match self.data {
            Value::String(message) => message,
            Value::Null => String::new(),
            other => other.to_string(),
        };
        Err(ConnectorError::UpstreamStatus {
            status: self.status,
            message,
        })
    }
}

/// Entry of the bounding-box listing.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StationSummary {
    pub uid: i64,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
    #[serde(default)]
    pub station: Option<StationName>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StationName {
    pub name: String,
}

/// Detail record of one station (`feed/@uid`).
#[derive(Debug, Clone, Deserialize)]
pub struct StationFeed {
    /// Number, or `"-"` while the station is offline
    pub aqi: Value,
    pub city: City,
    /// Species name to `{"v": value}`
    #[serde(default)]
    pub iaqi: HashMap<String, Value>,
    #[serde(default)]
    pub time: Option<StationTime>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct City {
    pub name: String,
    pub geo: Vec<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StationTime {
    /// Local time, `2024-03-01 14:00:00`
    #[serde(default)]
    pub s: Option<String>,
    /// Offset of `s`, `+05:30`
    #[serde(default)]
    pub tz: Option<String>,
    #[serde(default)]
    pub iso: Option<String>,
}

impl StationTime {
    fn resolve(&self) -> Option<DateTime<Utc>> {
        if let Some(iso) = &self.iso {
            if let Ok(parsed) = DateTime::parse_from_rfc3339(iso) {
                return Some(parsed.with_timezone(&Utc));
            }
        }

        let local = NaiveDateTime::parse_from_str(self.s.as_deref()?, "%Y-%m-%d %H:%M:%S").ok()?;
        let offset = self
            .tz
            .as_deref()
            .and_then(parse_offset)
            .or_else(|| FixedOffset::east_opt(0))?;
        offset
            .from_local_datetime(&local)
            .single()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

fn parse_offset(tz: &str) -> Option<FixedOffset> {
    let (sign, rest) = match tz.as_bytes().first()? {
        b'+' => (1, &tz[1..]),
        b'-' => (-1, &tz[1..]),
        _ => return None,
    };
    let (hours, minutes) = rest.split_once(':').unwrap_or((rest, "0"));
    let seconds = hours.parse::<i32>().ok()? * 3600 + minutes.parse::<i32>().ok()? * 60;
    FixedOffset::east_opt(sign * seconds)
}

fn parse_aqi(value: &Value) -> Option<i32> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.round() as i64))
            .and_then(|n| i32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

impl StationFeed {
    fn species(&self, name: &str) -> Option<f64> {
        self.iaqi.get(name)?.get("v")?.as_f64()
    }

    /// Flattens the feed into a [`Reading`] identified by the station uid.
    ///
    /// A feed without a numeric aqi or without coordinates cannot form a
    /// reading and is rejected; missing species are left `None`.
    pub fn normalize(&self, uid: i64, fetched_at: DateTime<Utc>) -> Result<Reading, ConnectorError> {
        let aqi = parse_aqi(&self.aqi).ok_or_else(|| {
            ConnectorError::InvalidResponse(format!("station {} reports no aqi ({})", uid, self.aqi))
        })?;

        let (lat, lng) = match self.city.geo.as_slice() {
            [lat, lng, ..] => (*lat, *lng),
            _ => {
                return Err(ConnectorError::InvalidResponse(format!(
                    "station {} has no coordinates",
                    uid
                )))
            }
        };

        let timestamp = self
            .time
            .as_ref()
            .and_then(StationTime::resolve)
            .unwrap_or(fetched_at);

        Ok(Reading {
            id: ReadingId::Station(uid),
            location_name: self.city.name.clone(),
            lat,
            lng,
            aqi,
            pm25: self.species("pm25"),
            pm10: self.species("pm10"),
            no2: self.species("no2"),
            o3: self.species("o3"),
            so2: self.species("so2"),
            co: self.species("co"),
            timestamp,
        })
    }
}
