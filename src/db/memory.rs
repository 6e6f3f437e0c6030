use super::{Store, StoreError};
use crate::models::{Conversation, Message, NewMessage, NewReading, Reading};
use async_trait::async_trait;
use chrono::{SubsecRound, Utc};
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    readings: Vec<Reading>,
    conversations: Vec<Conversation>,
    messages: Vec<Message>,
    reading_seq: i32,
    conversation_seq: i32,
    message_seq: i32,
}

/// Process-local [`Store`]; ids are assigned from per-table sequences that
/// start at 1 and are never reused, like postgres `SERIAL`.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn list_readings(&self) -> Result<Vec<Reading>, StoreError> {
        Ok(self.tables.read().await.readings.clone())
    }

    async fn get_reading(&self, id: i32) -> Result<Option<Reading>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .readings
            .iter()
            .find(|r| r.id.as_local() == Some(id))
            .cloned())
    }

    async fn create_reading(&self, reading: NewReading) -> Result<Reading, StoreError> {
        let mut tables = self.tables.write().await;
        tables.reading_seq += 1;
        let stored = reading.into_reading(tables.reading_seq);
        tables.readings.push(stored.clone());
        Ok(stored)
    }

    async fn list_conversations(&self) -> Result<Vec<Conversation>, StoreError> {
        let tables = self.tables.read().await;
        let mut conversations = tables.conversations.clone();
        conversations.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(conversations)
    }

    async fn get_conversation(&self, id: i32) -> Result<Option<Conversation>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.conversations.iter().find(|c| c.id == id).cloned())
    }

    async fn create_conversation(&self, title: &str) -> Result<Conversation, StoreError> {
        let mut tables = self.tables.write().await;
        tables.conversation_seq += 1;
        let conversation = Conversation {
            id: tables.conversation_seq,
            title: title.to_string(),
            created_at: Utc::now().trunc_subsecs(6),
        };
        tables.conversations.push(conversation.clone());
        Ok(conversation)
    }

    async fn delete_conversation(&self, id: i32) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        let before = tables.conversations.len();
        tables.conversations.retain(|c| c.id != id);
        if tables.conversations.len() == before {
            return Ok(false);
        }
        tables.messages.retain(|m| m.conversation_id != id);
        Ok(true)
    }

    async fn list_messages(&self, conversation_id: i32) -> Result<Vec<Message>, StoreError> {
        let tables = self.tables.read().await;
        // insertion order is creation order
        Ok(tables
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect())
    }

    async fn create_message(&self, message: NewMessage) -> Result<Message, StoreError> {
        let mut tables = self.tables.write().await;
        if !tables
            .conversations
            .iter()
            .any(|c| c.id == message.conversation_id)
        {
            return Err(StoreError::NotFound(format!(
                "conversation {}",
                message.conversation_id
            )));
        }
        tables.message_seq += 1;
        let stored = Message {
            id: tables.message_seq,
            conversation_id: message.conversation_id,
            role: message.role,
            content: message.content,
            created_at: Utc::now().trunc_subsecs(6),
        };
        tables.messages.push(stored.clone());
        Ok(stored)
    }
}
