use crate::db::Store;
use crate::forms;
use crate::helpers::JsonResponse;
use actix_web::{post, web, HttpResponse, Result};
use serde_valid::Validate;
use std::sync::Arc;

/// The body is optional: no body, or `{}`, creates an untitled conversation.
#[tracing::instrument(name = "Add conversation.", skip(body, store))]
#[post("")]
pub async fn item(body: web::Bytes, store: web::Data<Arc<dyn Store>>) -> Result<HttpResponse> {
    let form: forms::NewConversation = if body.iter().all(u8::is_ascii_whitespace) {
        forms::NewConversation::default()
    } else {
        serde_json::from_slice(&body).map_err(|err| JsonResponse::bad_request(&err.to_string()))?
    };
    if let Err(errors) = form.validate() {
        return Err(JsonResponse::bad_request(&errors.to_string()));
    }

    let conversation = store
        .create_conversation(form.title())
        .await
        .map_err(JsonResponse::internal_server_error)?;
    tracing::info!(conversation_id = conversation.id, "Conversation created");

    Ok(HttpResponse::Created().json(conversation))
}
