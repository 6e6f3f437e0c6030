use crate::models::{Message, NewMessage};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::Instrument;

#[derive(Debug, sqlx::FromRow)]
pub struct MessageRow {
    pub id: i32,
    pub conversation_id: i32,
    pub role: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<MessageRow> for Message {
    type Error = String;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        Ok(Message {
            id: row.id,
            conversation_id: row.conversation_id,
            role: row.role.parse()?,
            content: row.content,
            created_at: row.created_at,
        })
    }
}

pub async fn fetch_by_conversation(
    pool: &PgPool,
    conversation_id: i32,
) -> Result<Vec<MessageRow>, sqlx::Error> {
    let query_span = tracing::info_span!("Fetch conversation messages.", conversation_id);
    sqlx::query_as::<_, MessageRow>(
        r#"
        SELECT id, conversation_id, role, content, created_at
        FROM messages
        WHERE conversation_id = $1
        ORDER BY created_at, id
        "#,
    )
    .bind(conversation_id)
    .fetch_all(pool)
    .instrument(query_span)
    .await
}

pub async fn insert(pool: &PgPool, message: &NewMessage) -> Result<MessageRow, sqlx::Error> {
    let query_span = tracing::info_span!(
        "Saving new message into the database",
        conversation_id = message.conversation_id,
        role = %message.role
    );
    sqlx::query_as::<_, MessageRow>(
        r#"
        INSERT INTO messages (conversation_id, role, content, created_at)
        VALUES ($1, $2, $3, clock_timestamp())
        RETURNING id, conversation_id, role, content, created_at
        "#,
    )
    .bind(message.conversation_id)
    .bind(message.role.as_str())
    .bind(&message.content)
    .fetch_one(pool)
    .instrument(query_span)
    .await
}
