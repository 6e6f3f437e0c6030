use super::{ChatTurn, CompletionService, FragmentStream};
use crate::connectors::config::CompletionSettings;
use crate::connectors::ConnectorError;
use crate::helpers::LineDecoder;
use async_trait::async_trait;
use futures::stream::{self, Stream, StreamExt};
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;
use std::collections::VecDeque;
use std::time::Duration;
use tracing::Instrument;

const COMPLETIONS_PATH: &str = "/chat/completions";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct OpenAiCompletionClient {
    endpoint: String,
    model: String,
    api_key: Option<String>,
    idle_timeout: Duration,
    http_client: reqwest::Client,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatTurn],
    stream: bool,
}

impl OpenAiCompletionClient {
    pub fn new(config: &CompletionSettings) -> Result<Self, ConnectorError> {
        // no overall timeout: a reply streams for as long as the model writes
        let http_client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|err| ConnectorError::Internal(format!("HTTP client error: {}", err)))?;

        Ok(Self {
            endpoint: format!("{}{}", config.base_url.trim_end_matches('/'), COMPLETIONS_PATH),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            idle_timeout: Duration::from_secs(config.timeout_secs.max(1)),
            http_client,
        })
    }
}

#[async_trait]
impl CompletionService for OpenAiCompletionClient {
    async fn stream_completion(&self, turns: Vec<ChatTurn>) -> Result<FragmentStream, ConnectorError> {
        let body = CompletionRequest {
            model: &self.model,
            messages: &turns,
            stream: true,
        };

        let mut builder = self.http_client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let span = tracing::info_span!("completion_http_request", model = %self.model, turns = turns.len());
        let resp = tokio::time::timeout(self.idle_timeout, builder.send().instrument(span))
            .await
            .map_err(|_| ConnectorError::ServiceUnavailable("completion service did not answer".to_string()))??;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(match status {
                StatusCode::TOO_MANY_REQUESTS => ConnectorError::RateLimited(text),
                status if status.is_server_error() => ConnectorError::ServiceUnavailable(format!(
                    "completion service error {}: {}",
                    status, text
                )),
                status => ConnectorError::HttpError(format!(
                    "completion service error {}: {}",
                    status, text
                )),
            });
        }

        Ok(sse_fragments(resp.bytes_stream(), self.idle_timeout))
    }
}

enum SseLine {
    Fragment(String),
    Done,
    Skip,
}

fn parse_sse_line(line: &str) -> SseLine {
    let data = match line.strip_prefix("data:") {
        Some(rest) => rest.trim_start(),
        None => return SseLine::Skip,
    };
    if data == "[DONE]" {
        return SseLine::Done;
    }

    match serde_json::from_str::<Value>(data) {
        Ok(value) => {
            let choice = &value["choices"][0];
            let content = choice["delta"]["content"]
                .as_str()
                .or_else(|| choice["message"]["content"].as_str());
            match content {
                Some(fragment) if !fragment.is_empty() => SseLine::Fragment(fragment.to_string()),
                _ => SseLine::Skip,
            }
        }
        Err(err) => {
            tracing::warn!(error = %err, "Skipping malformed completion event");
            SseLine::Skip
        }
    }
}

struct SseState<S> {
    body: S,
    idle_timeout: Duration,
    decoder: LineDecoder,
    queue: VecDeque<String>,
    finished: bool,
}

/// Turns an OpenAI style server-sent-event body into content fragments.
/// The stream ends at `data: [DONE]` or when the body ends, and fails when no
/// chunk arrives within `idle_timeout`.
pub fn sse_fragments<S, B, E>(body: S, idle_timeout: Duration) -> FragmentStream
where
    S: Stream<Item = Result<B, E>> + Send + Unpin + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<ConnectorError> + Send + 'static,
{
    let state = SseState {
        body,
        idle_timeout,
        decoder: LineDecoder::new(),
        queue: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(fragment) = state.queue.pop_front() {
                return Some((Ok(fragment), state));
            }
            if state.finished {
                return None;
            }
            let next = match tokio::time::timeout(state.idle_timeout, state.body.next()).await {
                Ok(next) => next,
                Err(_) => {
                    state.finished = true;
                    let err = ConnectorError::ServiceUnavailable(format!(
                        "completion stream idle for {:?}",
                        state.idle_timeout
                    ));
                    return Some((Err(err), state));
                }
            };
            match next {
                Some(Ok(chunk)) => {
                    for line in state.decoder.push(chunk.as_ref()) {
                        match parse_sse_line(&line) {
                            SseLine::Fragment(fragment) => state.queue.push_back(fragment),
                            SseLine::Done => {
                                state.finished = true;
                                break;
                            }
                            SseLine::Skip => {}
                        }
                    }
                }
                Some(Err(err)) => {
                    state.finished = true;
                    return Some((Err(err.into()), state));
                }
                None => state.finished = true,
            }
        }
    })
    .boxed()
}
