//! Local message list of the conversation currently open in the client.
//!
//! The list is a cache of the store's history plus the optimistic entries of
//! an in-flight send. It is never merged with server state while a reply is
//! streaming; it is invalidated instead:
//! - on switching conversations, the whole list is replaced by fetched history
//! - on stream completion, [`ChatSession::needs_refresh`] turns true so the
//!   caller re-fetches the authoritative history

use super::reassembler::{StreamOutcome, StreamReassembler};
use crate::models::{Message, Role};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalMessage {
    /// Store id; `None` for optimistic entries
    pub id: Option<i32>,
    pub role: Role,
    pub content: String,
}

impl From<Message> for LocalMessage {
    fn from(message: Message) -> Self {
        Self {
            id: Some(message.id),
            role: message.role,
            content: message.content,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendState {
    Idle,
    Streaming,
    Failed(String),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("no conversation is open")]
    NoConversation,
    #[error("a reply is still streaming")]
    SendInProgress,
    #[error("the send belongs to a conversation that is no longer open")]
    Stale,
}

/// Handle of one send; chunks of an abandoned send are recognised by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendTicket {
    conversation_id: i32,
    generation: u64,
}

impl SendTicket {
    pub fn conversation_id(&self) -> i32 {
        self.conversation_id
    }
}

#[derive(Debug)]
pub struct ChatSession {
    conversation_id: Option<i32>,
    messages: Vec<LocalMessage>,
    reply: Option<StreamReassembler>,
    state: SendState,
    generation: u64,
    needs_refresh: bool,
}

impl Default for ChatSession {
    fn default() -> Self {
        Self {
            conversation_id: None,
            messages: Vec::new(),
            reply: None,
            state: SendState::Idle,
            generation: 0,
            needs_refresh: false,
        }
    }
}

impl ChatSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Switches to `conversation_id` with its fetched history. Any local state,
    /// including an in-flight reply, is dropped.
    pub fn open(&mut self, conversation_id: i32, history: Vec<Message>) {
        self.conversation_id = Some(conversation_id);
        self.messages = history.into_iter().map(LocalMessage::from).collect();
        self.reply = None;
        self.state = SendState::Idle;
        self.generation += 1;
        self.needs_refresh = false;
    }

    pub fn conversation_id(&self) -> Option<i32> {
        self.conversation_id
    }

    pub fn messages(&self) -> &[LocalMessage] {
        &self.messages
    }

    pub fn state(&self) -> &SendState {
        &self.state
    }

    pub fn needs_refresh(&self) -> bool {
        self.needs_refresh
    }

    /// Adds the user message and an empty assistant placeholder before any
    /// network traffic.
    pub fn begin_send(&mut self, content: &str) -> Result<SendTicket, SessionError> {
        let conversation_id = self.conversation_id.ok_or(SessionError::NoConversation)?;
        if self.state == SendState::Streaming {
            return Err(SessionError::SendInProgress);
        }

        self.messages.push(LocalMessage {
            id: None,
            role: Role::User,
            content: content.to_string(),
        });
        self.messages.push(LocalMessage {
            id: None,
            role: Role::Assistant,
            content: String::new(),
        });
        self.reply = Some(StreamReassembler::new());
        self.state = SendState::Streaming;
        self.generation += 1;

        Ok(SendTicket {
            conversation_id,
            generation: self.generation,
        })
    }

    fn check(&self, ticket: &SendTicket) -> Result<(), SessionError> {
        if ticket.generation != self.generation || self.reply.is_none() {
            return Err(SessionError::Stale);
        }
        Ok(())
    }

    /// Applies one read of the reply body and returns the fragments it added.
    /// The placeholder is replaced with the whole reply so far.
    pub fn apply_chunk(&mut self, ticket: &SendTicket, chunk: &[u8]) -> Result<Vec<String>, SessionError> {
        self.check(ticket)?;
        let Some(reply) = self.reply.as_mut() else {
            return Err(SessionError::Stale);
        };

        let fragments = reply.feed(chunk);
        if !fragments.is_empty() {
            let text = reply.text().to_string();
            if let Some(last) = self.messages.last_mut().filter(|m| m.role == Role::Assistant) {
                last.content = text;
            }
        }
        Ok(fragments)
    }

    /// Ends the reply body. A reply without the completion marker leaves the
    /// session in [`SendState::Failed`].
    pub fn finish(&mut self, ticket: &SendTicket) -> Result<StreamOutcome, SessionError> {
        self.check(ticket)?;
        let Some(mut reply) = self.reply.take() else {
            return Err(SessionError::Stale);
        };

        let outcome = reply.finish();
        self.state = match outcome {
            StreamOutcome::Completed => SendState::Idle,
            StreamOutcome::Truncated if reply.text().is_empty() => {
                SendState::Failed("The assistant did not reply".to_string())
            }
            StreamOutcome::Truncated => SendState::Failed("The reply was cut short".to_string()),
        };
        self.needs_refresh = true;
        Ok(outcome)
    }

    /// Marks the send as failed before or during streaming.
    pub fn fail(&mut self, ticket: &SendTicket, reason: impl Into<String>) -> Result<(), SessionError> {
        self.check(ticket)?;
        self.reply = None;
        self.state = SendState::Failed(reason.into());
        self.needs_refresh = true;
        Ok(())
    }
}
