use crate::models::{NewReading, Reading, ReadingId};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::Instrument;

#[derive(Debug, sqlx::FromRow)]
pub struct ReadingRow {
    pub id: i32,
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

impl From<ReadingRow> for Reading {
    fn from(row: ReadingRow) -> Self {
        Reading {
            id: ReadingId::Local(row.id),
            location_name: row.location_name,
            lat: row.lat,
            lng: row.lng,
            aqi: row.aqi,
            pm25: row.pm25,
            pm10: row.pm10,
            no2: row.no2,
            o3: row.o3,
            so2: row.so2,
            co: row.co,
            timestamp: row.timestamp,
        }
    }
}

const COLUMNS: &str =
    "id, location_name, lat, lng, aqi, pm25, pm10, no2, o3, so2, co, timestamp";

pub async fn fetch_all(pool: &PgPool) -> Result<Vec<Reading>, sqlx::Error> {
    let query_span = tracing::info_span!("Fetch all stored readings.");
    sqlx::query_as::<_, ReadingRow>(&format!(
        "SELECT {COLUMNS} FROM air_quality_readings ORDER BY id"
    ))
    .fetch_all(pool)
    .instrument(query_span)
    .await
    .map(|rows| rows.into_iter().map(Into::into).collect())
    .map_err(|err| {
        tracing::error!("Failed to fetch readings: {:?}", err);
        err
    })
}

pub async fn fetch(pool: &PgPool, id: i32) -> Result<Option<Reading>, sqlx::Error> {
    let query_span = tracing::info_span!("Fetch stored reading by id.", id);
    sqlx::query_as::<_, ReadingRow>(&format!(
        "SELECT {COLUMNS} FROM air_quality_readings WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .instrument(query_span)
    .await
    .map(|row| row.map(Into::into))
    .map_err(|err| {
        tracing::error!("Failed to fetch reading {}: {:?}", id, err);
        err
    })
}

pub async fn insert(pool: &PgPool, reading: NewReading) -> Result<Reading, sqlx::Error> {
    let query_span = tracing::info_span!("Saving new reading into the database");
    let timestamp = reading.effective_timestamp();
    sqlx::query_as::<_, ReadingRow>(&format!(
        r#"
        INSERT INTO air_quality_readings
            (location_name, lat, lng, aqi, pm25, pm10, no2, o3, so2, co, timestamp)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING {COLUMNS}
        "#
    ))
    .bind(&reading.location_name)
    .bind(reading.lat)
    .bind(reading.lng)
    .bind(reading.aqi)
    .bind(reading.pm25)
    .bind(reading.pm10)
    .bind(reading.no2)
    .bind(reading.o3)
    .bind(reading.so2)
    .bind(reading.co)
    .bind(timestamp)
    .fetch_one(pool)
    .instrument(query_span)
    .await
    .map(Into::into)
    .map_err(|err| {
        tracing::error!("Failed to insert reading: {:?}", err);
        err
    })
}
