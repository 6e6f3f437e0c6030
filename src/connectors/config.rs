use serde::{Deserialize, Serialize};

/// Station network (WAQI) connector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamSettings {
    /// Base URL of the station API (e.g., https://api.waqi.info)
    pub base_url: String,
    /// API token (from env: WAQI_TOKEN)
    #[serde(skip)]
    pub token: String,
    /// HTTP request timeout in seconds
    pub timeout_secs: u64,
    /// Total requests made for rate-limited or unavailable responses, first one included
    pub max_attempts: usize,
    /// First backoff delay, doubled for each further attempt
    pub retry_backoff_ms: u64,
    /// Upper bound of concurrent per-station detail requests
    pub max_concurrency: usize,
    /// Area whose stations are listed
    #[serde(default)]
    pub bbox: BoundingBox,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.waqi.info".to_string(),
            token: "demo".to_string(),
            timeout_secs: 10,
            max_attempts: 2,
            retry_backoff_ms: 250,
            max_concurrency: 8,
            bbox: BoundingBox::default(),
        }
    }
}

impl UpstreamSettings {
    pub fn token_from_env() -> String {
        std::env::var("WAQI_TOKEN").unwrap_or_else(|_| "demo".to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub lat_min: f64,
    pub lng_min: f64,
    pub lat_max: f64,
    pub lng_max: f64,
}

impl BoundingBox {
    /// `lat1,lng1,lat2,lng2` as expected by the bounds endpoint.
    pub fn to_latlng(&self) -> String {
        format!(
            "{},{},{},{}",
            self.lat_min, self.lng_min, self.lat_max, self.lng_max
        )
    }
}

impl Default for BoundingBox {
    // Nagpur
    fn default() -> Self {
        Self {
            lat_min: 21.0,
            lng_min: 78.9,
            lat_max: 21.3,
            lng_max: 79.3,
        }
    }
}

/// Chat completion connector configuration (OpenAI-compatible API)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionSettings {
    /// Base URL up to the API version (e.g., https://api.openai.com/v1)
    pub base_url: String,
    pub model: String,
    /// Seconds to wait for the response and then for each streamed chunk
    pub timeout_secs: u64,
    /// Prepended to every conversation as a system turn
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Bearer token (from env: COMPLETION_API_KEY)
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for CompletionSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            timeout_secs: 120,
            system_prompt: None,
            api_key: None,
        }
    }
}

impl CompletionSettings {
    pub fn api_key_from_env() -> Option<String> {
        std::env::var("COMPLETION_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
    }
}
