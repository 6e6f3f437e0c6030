use crate::models::Conversation;
use sqlx::PgPool;
use tracing::Instrument;

pub async fn fetch_all(pool: &PgPool) -> Result<Vec<Conversation>, sqlx::Error> {
    let query_span = tracing::info_span!("Fetch conversations.");
    sqlx::query_as::<_, Conversation>(
        "SELECT id, title, created_at FROM conversations ORDER BY created_at DESC, id DESC",
    )
    .fetch_all(pool)
    .instrument(query_span)
    .await
}

pub async fn fetch(pool: &PgPool, id: i32) -> Result<Option<Conversation>, sqlx::Error> {
    let query_span = tracing::info_span!("Fetch conversation by id.", id);
    sqlx::query_as::<_, Conversation>(
        "SELECT id, title, created_at FROM conversations WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .instrument(query_span)
    .await
}

pub async fn insert(pool: &PgPool, title: &str) -> Result<Conversation, sqlx::Error> {
    let query_span = tracing::info_span!("Saving new conversation into the database");
    sqlx::query_as::<_, Conversation>(
        r#"
        INSERT INTO conversations (title, created_at)
        VALUES ($1, NOW())
        RETURNING id, title, created_at
        "#,
    )
    .bind(title)
    .fetch_one(pool)
    .instrument(query_span)
    .await
    .map_err(|err| {
        tracing::error!("Failed to insert conversation: {:?}", err);
        err
    })
}

/// Messages go with the conversation through `ON DELETE CASCADE`.
pub async fn delete(pool: &PgPool, id: i32) -> Result<u64, sqlx::Error> {
    let query_span = tracing::info_span!("Deleting conversation.", id);
    sqlx::query("DELETE FROM conversations WHERE id = $1")
        .bind(id)
        .execute(pool)
        .instrument(query_span)
        .await
        .map(|result| result.rows_affected())
}
