use crate::db::Store;
use crate::helpers::JsonResponse;
use crate::models::ConversationWithMessages;
use actix_web::{get, web, Responder, Result};
use std::sync::Arc;

#[tracing::instrument(name = "List conversations.", skip(store))]
#[get("")]
pub async fn list(store: web::Data<Arc<dyn Store>>) -> Result<impl Responder> {
    store
        .list_conversations()
        .await
        .map(web::Json)
        .map_err(JsonResponse::internal_server_error)
}

#[tracing::instrument(name = "Get conversation.", skip(store))]
#[get("/{id}")]
pub async fn item(
    path: web::Path<(i32,)>,
    store: web::Data<Arc<dyn Store>>,
) -> Result<impl Responder> {
    let id = path.0;
    let conversation = store
        .get_conversation(id)
        .await
        .map_err(JsonResponse::internal_server_error)?
        .ok_or_else(|| JsonResponse::not_found("Conversation not found"))?;

    let messages = store
        .list_messages(id)
        .await
        .map_err(JsonResponse::internal_server_error)?;

    Ok(web::Json(ConversationWithMessages {
        conversation,
        messages,
    }))
}
