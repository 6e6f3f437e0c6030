use super::types::{Envelope, StationFeed, StationSummary};
use super::StationSource;
use crate::connectors::config::{BoundingBox, UpstreamSettings};
use crate::connectors::ConnectorError;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing::Instrument;

/// HTTP client for the WAQI station network.
pub struct WaqiClient {
    base_url: String,
    token: String,
    http_client: reqwest::Client,
    max_attempts: usize,
    retry_backoff: Duration,
    user_agent: String,
}

impl WaqiClient {
    pub fn new(config: &UpstreamSettings) -> Result<Self, ConnectorError> {
        let timeout = Duration::from_secs(config.timeout_secs.max(1));
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|err| ConnectorError::Internal(format!("HTTP client error: {}", err)))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            http_client,
            max_attempts: config.max_attempts.max(1),
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
            user_agent: format!("airwatch/{}", env!("CARGO_PKG_VERSION")),
        })
    }

    fn backoff(&self, attempt: usize) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16) as u32;
        self.retry_backoff.saturating_mul(2u32.saturating_pow(exponent))
    }

    async fn send_once(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Value, ConnectorError> {
        let resp = self
            .http_client
            .get(format!("{}{}", self.base_url, path))
            .header("User-Agent", &self.user_agent)
            .query(query)
            .send()
            .await?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|err| ConnectorError::HttpError(err.to_string()))?;

        if status.is_success() {
            let envelope = serde_json::from_str::<Envelope>(&text)
                .map_err(|_| ConnectorError::InvalidResponse(text))?;
            return envelope.into_data();
        }

        Err(match status {
            StatusCode::NOT_FOUND => ConnectorError::NotFound(text),
            StatusCode::TOO_MANY_REQUESTS => ConnectorError::RateLimited(text),
            status if status.is_server_error() => ConnectorError::ServiceUnavailable(format!(
                "station network error {}: {}",
                status, text
            )),
            status => ConnectorError::HttpError(format!("station network error {}: {}", status, text)),
        })
    }

    /// GET with retries for rate limiting and unavailability only.
    async fn send_request(
        &self,
        path: &str,
        mut query: Vec<(&str, String)>,
    ) -> Result<Value, ConnectorError> {
        query.push(("token", self.token.clone()));

        let mut attempt = 0usize;
        loop {
            attempt += 1;
            let span = tracing::info_span!("waqi_http_request", path, attempt);
            match self.send_once(path, &query).instrument(span).await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.max_attempts => {
                    let delay = self.backoff(attempt);
                    tracing::debug!(
                        error = %err,
                        path,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Retrying station network request"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn decode<T: DeserializeOwned>(value: Value) -> Result<T, ConnectorError> {
        serde_json::from_value(value).map_err(|err| ConnectorError::InvalidResponse(err.to_string()))
    }
}

#[async_trait]
impl StationSource for WaqiClient {
    async fn list_stations(
        &self,
        bbox: &BoundingBox,
    ) -> Result<Vec<StationSummary>, ConnectorError> {
        let data = self
            .send_request("/map/bounds/", vec![("latlng", bbox.to_latlng())])
            .await?;
        Self::decode(data)
    }

    async fn station_feed(&self, uid: i64) -> Result<StationFeed, ConnectorError> {
        let data = self
            .send_request(&format!("/feed/@{}/", uid), Vec::new())
            .await?;
        Self::decode(data)
    }
}
