//! HTTP client for the airwatch server API.

use crate::models::{Conversation, ConversationWithMessages, Reading};
use futures::stream::{BoxStream, StreamExt};
use reqwest::Response;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8000";

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server answered {status}: {message}")]
    Status { status: u16, message: String },
    #[error(transparent)]
    Session(#[from] super::SessionError),
    #[error("{0}")]
    StreamFailed(String),
}

/// Error body of the server, `{"status", "message", "code"}`
#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Raw chunks of a reply body, as read from the network.
pub type ChunkStream = BoxStream<'static, Result<Vec<u8>, ClientError>>;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// AirwatchClient
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct AirwatchClient {
    base_url: String,
    http: reqwest::Client,
}

impl AirwatchClient {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        // no overall timeout: a streamed reply may take minutes
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn check(resp: Response) -> Result<Response, ClientError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let text = resp.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .map(|body| body.message)
            .unwrap_or(text);
        Err(ClientError::Status {
            status: status.as_u16(),
            message,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let resp = self.http.get(self.url(path)).send().await?;
        Ok(Self::check(resp).await?.json::<T>().await?)
    }

    // ── Readings ─────────────────────────────────────

    pub async fn readings(&self) -> Result<Vec<Reading>, ClientError> {
        self.get_json("/readings").await
    }

    /// `id` is `@uid` for a station or a stored reading id.
    pub async fn reading(&self, id: &str) -> Result<Reading, ClientError> {
        self.get_json(&format!("/readings/{}", id)).await
    }

    // ── Conversations ────────────────────────────────

    pub async fn conversations(&self) -> Result<Vec<Conversation>, ClientError> {
        self.get_json("/conversations").await
    }

    pub async fn conversation(&self, id: i32) -> Result<ConversationWithMessages, ClientError> {
        self.get_json(&format!("/conversations/{}", id)).await
    }

    pub async fn create_conversation(&self, title: Option<&str>) -> Result<Conversation, ClientError> {
        let resp = self
            .http
            .post(self.url("/conversations"))
            .json(&json!({ "title": title }))
            .send()
            .await?;
        Ok(Self::check(resp).await?.json().await?)
    }

    pub async fn delete_conversation(&self, id: i32) -> Result<(), ClientError> {
        let resp = self
            .http
            .delete(self.url(&format!("/conversations/{}", id)))
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }

    /// Sends a message and returns the reply body as it arrives.
    pub async fn send_message(&self, id: i32, content: &str) -> Result<ChunkStream, ClientError> {
        let resp = self
            .http
            .post(self.url(&format!("/conversations/{}/messages", id)))
            .json(&json!({ "content": content }))
            .send()
            .await?;
        let resp = Self::check(resp).await?;
        Ok(resp
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(ClientError::from))
            .boxed())
    }
}
