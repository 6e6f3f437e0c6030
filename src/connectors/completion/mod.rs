//! Chat completion connector
//!
//! The relay only needs "submit a conversation, receive content fragments as
//! they are generated"; [`CompletionService`] is that contract and
//! [`OpenAiCompletionClient`] implements it against any OpenAI-compatible
//! `/chat/completions` endpoint.

use crate::connectors::ConnectorError;
use crate::models::Message;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

pub mod client;

pub use client::OpenAiCompletionClient;

/// Incremental content fragments, in generation order.
pub type FragmentStream = BoxStream<'static, Result<String, ConnectorError>>;

/// One turn of the conversation sent to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

impl ChatTurn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }
}

impl From<&Message> for ChatTurn {
    fn from(message: &Message) -> Self {
        Self {
            role: message.role.as_str().to_string(),
            content: message.content.clone(),
        }
    }
}

#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Opens a streaming completion. Fails before any fragment when the
    /// service cannot be reached or refuses the request; errors after that
    /// arrive as stream items.
    async fn stream_completion(&self, turns: Vec<ChatTurn>) -> Result<FragmentStream, ConnectorError>;
}
