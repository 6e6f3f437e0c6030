use super::{Store, StoreError};
use crate::models::NewReading;

fn reference_reading(
    location_name: &str,
    lat: f64,
    lng: f64,
    aqi: i32,
    [pm25, pm10, no2, o3, so2, co]: [f64; 6],
) -> NewReading {
    NewReading {
        location_name: location_name.to_string(),
        lat,
        lng,
        aqi,
        pm25: Some(pm25),
        pm10: Some(pm10),
        no2: Some(no2),
        o3: Some(o3),
        so2: Some(so2),
        co: Some(co),
        timestamp: None,
    }
}

/// Reference readings for Nagpur used when the store starts out empty.
pub fn nagpur_readings() -> Vec<NewReading> {
    vec![
        reference_reading("Sitabuldi, Nagpur", 21.1458, 79.0882, 152, [65.2, 120.5, 45.1, 20.3, 12.4, 1.2]),
        reference_reading("Sonegaon, Nagpur", 21.1098, 79.0682, 85, [28.5, 55.2, 18.4, 35.1, 5.2, 0.8]),
        reference_reading("Itwari, Nagpur", 21.1622, 79.1175, 210, [110.5, 185.2, 68.9, 15.2, 25.4, 2.1]),
        reference_reading("Dharampeth, Nagpur", 21.1396, 79.0583, 115, [42.1, 85.6, 32.5, 28.4, 8.9, 1.0]),
        reference_reading("Ambazari, Nagpur", 21.1332, 79.0345, 45, [10.2, 25.4, 12.1, 42.5, 3.2, 0.5]),
    ]
}

/// Seeds the reference readings unless the store already holds readings.
/// Returns the number of rows created.
#[tracing::instrument(name = "Seed reference readings.", skip(store))]
pub async fn seed_if_empty(store: &dyn Store) -> Result<usize, StoreError> {
    if !store.list_readings().await?.is_empty() {
        tracing::debug!("Store already holds readings, skipping seed");
        return Ok(0);
    }

    let readings = nagpur_readings();
    let count = readings.len();
    for reading in readings {
        store.create_reading(reading).await?;
    }
    tracing::info!(count, "Seeded reference readings");
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;

    #[tokio::test]
    async fn test_seed_only_runs_once() {
        let store = MemoryStore::new();
        assert_eq!(seed_if_empty(&store).await.unwrap(), 5);
        assert_eq!(seed_if_empty(&store).await.unwrap(), 0);

        let readings = store.list_readings().await.unwrap();
        assert_eq!(readings.len(), 5);
        assert_eq!(readings[2].location_name, "Itwari, Nagpur");
        assert_eq!(readings[2].aqi, 210);
    }
}
