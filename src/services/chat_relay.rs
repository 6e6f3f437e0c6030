//! Relays a streaming completion to the HTTP client and persists the reply.
//!
//! The relay runs in its own task and hands the response body a channel
//! receiver. Every fragment is written as one event line as soon as it
//! arrives. Only a reply that completed is stored:
//! - completion refused or failed mid-way: the body ends without the `done`
//!   event and nothing is persisted
//! - client gone: the completion request is dropped (which aborts it) and the
//!   partial reply is discarded
//! - completed: the assistant message is persisted, then `done` is sent

use crate::connectors::{ChatTurn, CompletionService, FragmentStream};
use crate::db::{Store, StoreError};
use crate::events::StreamEvent;
use crate::models::NewMessage;
use actix_web::web::Bytes;
use futures::StreamExt;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::Instrument;

/// Buffered event lines between the relay task and the response body.
const CHANNEL_CAPACITY: usize = 32;

pub type RelayStream = ReceiverStream<Bytes>;

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("conversation {0} not found")]
    NotFound(i32),
    #[error("conversation {0} already has a reply in progress")]
    Busy(i32),
    #[error(transparent)]
    Store(#[from] StoreError),
}

type InFlight = Arc<Mutex<HashSet<i32>>>;

/// Marks a conversation as relaying until dropped.
struct InFlightGuard {
    in_flight: InFlight,
    conversation_id: i32,
}

impl InFlightGuard {
    fn acquire(in_flight: &InFlight, conversation_id: i32) -> Option<Self> {
        let inserted = in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(conversation_id);
        inserted.then(|| Self {
            in_flight: in_flight.clone(),
            conversation_id,
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&self.conversation_id);
    }
}

pub struct ChatRelay {
    store: Arc<dyn Store>,
    completion: Arc<dyn CompletionService>,
    system_prompt: Option<String>,
    in_flight: InFlight,
}

impl ChatRelay {
    pub fn new(
        store: Arc<dyn Store>,
        completion: Arc<dyn CompletionService>,
        system_prompt: Option<String>,
    ) -> Self {
        Self {
            store,
            completion,
            system_prompt,
            in_flight: Arc::default(),
        }
    }

    pub fn is_busy(&self, conversation_id: i32) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(&conversation_id)
    }

    /// Stores the user message and starts relaying the assistant reply.
    ///
    /// Errors are returned before anything is streamed; once the stream is
    /// handed out, failures only show as a missing `done` event.
    #[tracing::instrument(name = "Send message", skip(self, content))]
    pub async fn send(&self, conversation_id: i32, content: String) -> Result<RelayStream, RelayError> {
        let guard = InFlightGuard::acquire(&self.in_flight, conversation_id)
            .ok_or(RelayError::Busy(conversation_id))?;

        if self.store.get_conversation(conversation_id).await?.is_none() {
            return Err(RelayError::NotFound(conversation_id));
        }

        self.store
            .create_message(NewMessage::user(conversation_id, content))
            .await
            .map_err(|err| match err {
                StoreError::NotFound(_) => RelayError::NotFound(conversation_id),
                err => RelayError::Store(err),
            })?;

        let history = self.store.list_messages(conversation_id).await?;
        let turns: Vec<ChatTurn> = self
            .system_prompt
            .iter()
            .map(ChatTurn::system)
            .chain(history.iter().map(ChatTurn::from))
            .collect();

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let store = self.store.clone();
        let completion = self.completion.clone();
        let span = tracing::info_span!("chat_relay", conversation_id);
        tokio::spawn(
            async move {
                let opened = tokio::select! {
                    biased;
                    _ = tx.closed() => {
                        tracing::info!("Client disconnected before the completion opened");
                        return;
                    }
                    opened = completion.stream_completion(turns) => opened,
                };
                match opened {
                    Ok(fragments) => relay(store, fragments, conversation_id, tx, guard).await,
                    Err(err) => {
                        tracing::error!(error = %err, "Completion request failed");
                    }
                }
            }
            .instrument(span),
        );

        Ok(ReceiverStream::new(rx))
    }
}

async fn relay(
    store: Arc<dyn Store>,
    mut fragments: FragmentStream,
    conversation_id: i32,
    tx: mpsc::Sender<Bytes>,
    guard: InFlightGuard,
) {
    let mut reply = String::new();
    loop {
        let next = tokio::select! {
            biased;
            _ = tx.closed() => {
                tracing::info!(streamed = reply.len(), "Client disconnected, discarding partial reply");
                return;
            }
            next = fragments.next() => next,
        };

        match next {
            Some(Ok(fragment)) => {
                reply.push_str(&fragment);
                let line = Bytes::from(StreamEvent::content(fragment).encode());
                if tx.send(line).await.is_err() {
                    tracing::info!(streamed = reply.len(), "Client disconnected, discarding partial reply");
                    return;
                }
            }
            Some(Err(err)) => {
                tracing::error!(error = %err, "Completion stream failed");
                return;
            }
            None => break,
        }
    }
    drop(fragments);

    if reply.is_empty() {
        tracing::warn!("Completion ended without content");
        return;
    }

    match store
        .create_message(NewMessage::assistant(conversation_id, reply))
        .await
    {
        Ok(message) => {
            tracing::info!(message_id = message.id, "Assistant reply stored");
            drop(guard);
            // the client may already be gone; the reply is stored either way
            let _ = tx.send(Bytes::from(StreamEvent::done().encode())).await;
        }
        Err(err) => {
            tracing::error!(error = %err, "Failed to store assistant reply");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectors::ConnectorError;
    use crate::db::MemoryStore;
    use crate::models::Role;
    use async_trait::async_trait;
    use futures::stream;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    enum Script {
        Fragments(Vec<&'static str>),
        /// fragments, then nothing until dropped
        Hang(Vec<&'static str>),
        /// fragments, then a transport error
        Break(Vec<&'static str>),
        Refuse,
        /// the request never gets an answer
        Stall,
        /// fragments, one pending poll, then the end of the stream
        PauseThenEnd(Vec<&'static str>),
    }

    struct MockCompletion {
        script: Script,
        seen: Mutex<Vec<Vec<ChatTurn>>>,
        cancelled: Arc<AtomicBool>,
    }

    /// Sets its flag when the pending request is dropped.
    struct CancelFlag(Arc<AtomicBool>);

    impl Drop for CancelFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    impl MockCompletion {
        fn new(script: Script) -> Arc<Self> {
            Arc::new(Self {
                script,
                seen: Mutex::new(Vec::new()),
                cancelled: Arc::new(AtomicBool::new(false)),
            })
        }
    }

    fn owned(parts: &[&'static str]) -> Vec<Result<String, ConnectorError>> {
        parts.iter().map(|p| Ok(p.to_string())).collect()
    }

    #[async_trait]
    impl CompletionService for MockCompletion {
        async fn stream_completion(&self, turns: Vec<ChatTurn>) -> Result<FragmentStream, ConnectorError> {
            self.seen.lock().unwrap().push(turns);
            match &self.script {
                Script::Fragments(parts) => Ok(stream::iter(owned(parts)).boxed()),
                Script::Hang(parts) => Ok(stream::iter(owned(parts)).chain(stream::pending()).boxed()),
                Script::Break(parts) => {
                    let mut items = owned(parts);
                    items.push(Err(ConnectorError::ServiceUnavailable("reset".into())));
                    Ok(stream::iter(items).boxed())
                }
                Script::Refuse => Err(ConnectorError::HttpError("401 Unauthorized".into())),
                Script::PauseThenEnd(parts) => {
                    let pause = stream::once(tokio::task::yield_now()).filter_map(|_| futures::future::ready(None));
                    Ok(stream::iter(owned(parts)).chain(pause).boxed())
                }
                Script::Stall => {
                    let _flag = CancelFlag(self.cancelled.clone());
                    futures::future::pending().await
                }
            }
        }
    }

    async fn setup(script: Script) -> (ChatRelay, Arc<dyn Store>, Arc<MockCompletion>, i32) {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let conversation = store.create_conversation("Air").await.unwrap();
        let completion = MockCompletion::new(script);
        let relay = ChatRelay::new(store.clone(), completion.clone(), Some("You know AQI.".into()));
        (relay, store, completion, conversation.id)
    }

    async fn body(stream: RelayStream) -> String {
        let chunks: Vec<Bytes> = stream.collect().await;
        String::from_utf8(chunks.concat()).unwrap()
    }

    async fn wait_until_idle(relay: &ChatRelay, conversation_id: i32) {
        for _ in 0..200 {
            if !relay.is_busy(conversation_id) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("relay did not finish");
    }

    #[tokio::test]
    async fn test_reply_is_streamed_and_stored() {
        let (relay, store, completion, id) = setup(Script::Fragments(vec!["AQI", " is..."])).await;

        let stream = relay.send(id, "What is AQI?".into()).await.unwrap();
        assert_eq!(
            body(stream).await,
            "data: {\"content\":\"AQI\"}\ndata: {\"content\":\" is...\"}\ndata: {\"content\":\"\",\"done\":true}\n"
        );

        let messages = store.list_messages(id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[0].content, "What is AQI?");
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(messages[1].content, "AQI is...");

        let seen = completion.seen.lock().unwrap();
        assert_eq!(seen[0][0], ChatTurn::system("You know AQI."));
        assert_eq!(seen[0][1].role, "user");
        assert_eq!(seen[0][1].content, "What is AQI?");
    }

    #[tokio::test]
    async fn test_history_is_sent_with_each_message() {
        let (relay, _store, completion, id) = setup(Script::Fragments(vec!["ok"])).await;

        body(relay.send(id, "first".into()).await.unwrap()).await;
        wait_until_idle(&relay, id).await;
        body(relay.send(id, "second".into()).await.unwrap()).await;

        let seen = completion.seen.lock().unwrap();
        let contents: Vec<&str> = seen[1].iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["You know AQI.", "first", "ok", "second"]);
    }

    #[tokio::test]
    async fn test_refused_completion_ends_empty() {
        let (relay, store, _, id) = setup(Script::Refuse).await;

        let stream = relay.send(id, "hello".into()).await.unwrap();
        assert_eq!(body(stream).await, "");

        let messages = store.list_messages(id).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::User);
    }

    #[tokio::test]
    async fn test_broken_completion_is_not_stored() {
        let (relay, store, _, id) = setup(Script::Break(vec!["AQI"])).await;

        let text = body(relay.send(id, "hello".into()).await.unwrap()).await;
        assert_eq!(text, "data: {\"content\":\"AQI\"}\n");

        wait_until_idle(&relay, id).await;
        assert_eq!(store.list_messages(id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_disconnect_discards_partial_reply() {
        let (relay, store, _, id) = setup(Script::Hang(vec!["AQI"])).await;

        let mut stream = relay.send(id, "hello".into()).await.unwrap();
        let first = stream.next().await.unwrap();
        assert_eq!(&first[..], b"data: {\"content\":\"AQI\"}\n");
        drop(stream);

        wait_until_idle(&relay, id).await;
        let messages = store.list_messages(id).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::User);
    }

    #[tokio::test]
    async fn test_disconnect_before_completion_opens_aborts_request() {
        let (relay, store, completion, id) = setup(Script::Stall).await;

        let stream = relay.send(id, "hello".into()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(relay.is_busy(id));
        drop(stream);

        wait_until_idle(&relay, id).await;
        assert!(completion.cancelled.load(Ordering::SeqCst));
        assert_eq!(store.list_messages(id).await.unwrap().len(), 1);
        assert!(relay.send(id, "again".into()).await.is_ok());
    }

    #[tokio::test]
    async fn test_disconnect_at_end_of_stream_discards_reply() {
        let (relay, store, _, id) = setup(Script::PauseThenEnd(vec!["AQI"])).await;

        let mut stream = relay.send(id, "hello".into()).await.unwrap();
        assert!(stream.next().await.is_some());
        // the relay now sees the client gone and the stream ended at once
        drop(stream);

        wait_until_idle(&relay, id).await;
        let messages = store.list_messages(id).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::User);
    }

    #[tokio::test]
    async fn test_concurrent_send_is_rejected() {
        let (relay, store, _, id) = setup(Script::Hang(vec![])).await;

        let stream = relay.send(id, "one".into()).await.unwrap();
        assert!(matches!(
            relay.send(id, "two".into()).await,
            Err(RelayError::Busy(busy)) if busy == id
        ));
        // the rejected message was not stored
        assert_eq!(store.list_messages(id).await.unwrap().len(), 1);

        drop(stream);
        wait_until_idle(&relay, id).await;
        assert!(relay.send(id, "three".into()).await.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_conversation() {
        let (relay, _, _, _) = setup(Script::Fragments(vec!["x"])).await;
        assert!(matches!(
            relay.send(999, "hello".into()).await,
            Err(RelayError::NotFound(999))
        ));
        assert!(!relay.is_busy(999));
    }
}
