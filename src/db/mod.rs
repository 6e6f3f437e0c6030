//! Persistence for readings, conversations and messages.
//!
//! Handlers and services talk to a [`Store`] trait object so the backend can be
//! swapped per environment:
//! - [`PgStore`]: postgres through the free query functions in `reading`,
//!   `conversation` and `message`
//! - [`MemoryStore`]: process-local tables, used when `store.backend = memory`
//!   and throughout the tests
//!
//! Every method is individually atomic; nothing here spans several rows in one
//! transaction.

pub mod conversation;
mod memory;
pub mod message;
mod pg;
pub mod reading;
pub mod seed;

pub use memory::MemoryStore;
pub use pg::PgStore;

use crate::models::{Conversation, Message, NewMessage, NewReading, Reading};
use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("corrupt row: {0}")]
    Internal(String),
}

#[async_trait]
pub trait Store: Send + Sync {
    /// All persisted readings, oldest id first.
    async fn list_readings(&self) -> Result<Vec<Reading>, StoreError>;
    async fn get_reading(&self, id: i32) -> Result<Option<Reading>, StoreError>;
    async fn create_reading(&self, reading: NewReading) -> Result<Reading, StoreError>;

    /// Conversations, newest first.
    async fn list_conversations(&self) -> Result<Vec<Conversation>, StoreError>;
    async fn get_conversation(&self, id: i32) -> Result<Option<Conversation>, StoreError>;
    async fn create_conversation(&self, title: &str) -> Result<Conversation, StoreError>;
    /// Removes the conversation and its messages. `false` when it did not exist.
    async fn delete_conversation(&self, id: i32) -> Result<bool, StoreError>;

    /// Messages of one conversation in creation order.
    async fn list_messages(&self, conversation_id: i32) -> Result<Vec<Message>, StoreError>;
    /// Fails with [`StoreError::NotFound`] when the conversation is gone.
    async fn create_message(&self, message: NewMessage) -> Result<Message, StoreError>;
}
