use super::{conversation, message, reading, Store, StoreError};
use crate::configuration::DatabaseSettings;
use crate::models::{Conversation, Message, NewMessage, NewReading, Reading};
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use sqlx::PgPool;
use std::time::Duration;

/// Postgres backed [`Store`].
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects with the configured credentials and applies pending migrations.
    pub async fn connect(settings: &DatabaseSettings) -> Result<Self, sqlx::Error> {
        let connect_options = PgConnectOptions::new()
            .host(&settings.host)
            .port(settings.port)
            .username(&settings.username)
            .password(&settings.password)
            .database(&settings.database_name)
            .ssl_mode(PgSslMode::Disable);

        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(connect_options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn into_message(row: message::MessageRow) -> Result<Message, StoreError> {
    Message::try_from(row).map_err(StoreError::Internal)
}

#[async_trait]
impl Store for PgStore {
    async fn list_readings(&self) -> Result<Vec<Reading>, StoreError> {
        Ok(reading::fetch_all(&self.pool).await?)
    }

    async fn get_reading(&self, id: i32) -> Result<Option<Reading>, StoreError> {
        Ok(reading::fetch(&self.pool, id).await?)
    }

    async fn create_reading(&self, new_reading: NewReading) -> Result<Reading, StoreError> {
        Ok(reading::insert(&self.pool, new_reading).await?)
    }

    async fn list_conversations(&self) -> Result<Vec<Conversation>, StoreError> {
        Ok(conversation::fetch_all(&self.pool).await?)
    }

    async fn get_conversation(&self, id: i32) -> Result<Option<Conversation>, StoreError> {
        Ok(conversation::fetch(&self.pool, id).await?)
    }

    async fn create_conversation(&self, title: &str) -> Result<Conversation, StoreError> {
        Ok(conversation::insert(&self.pool, title).await?)
    }

    async fn delete_conversation(&self, id: i32) -> Result<bool, StoreError> {
        Ok(conversation::delete(&self.pool, id).await? > 0)
    }

    async fn list_messages(&self, conversation_id: i32) -> Result<Vec<Message>, StoreError> {
        message::fetch_by_conversation(&self.pool, conversation_id)
            .await?
            .into_iter()
            .map(into_message)
            .collect()
    }

    async fn create_message(&self, new_message: NewMessage) -> Result<Message, StoreError> {
        match message::insert(&self.pool, &new_message).await {
            Ok(row) => into_message(row),
            Err(sqlx::Error::Database(err)) if err.is_foreign_key_violation() => Err(
                StoreError::NotFound(format!("conversation {}", new_message.conversation_id)),
            ),
            Err(err) => {
                tracing::error!("Failed to insert message: {:?}", err);
                Err(err.into())
            }
        }
    }
}
