use crate::forms;
use crate::helpers::JsonResponse;
use crate::services::{ChatRelay, RelayError};
use actix_web::{post, web, HttpResponse, Result};
use futures_util::StreamExt;
use serde_valid::Validate;

/// Streams the assistant reply as `data: {json}` lines.
#[tracing::instrument(name = "Send message.", skip(form, relay))]
#[post("/{id}/messages")]
pub async fn send(
    path: web::Path<(i32,)>,
    form: web::Json<forms::SendMessage>,
    relay: web::Data<ChatRelay>,
) -> Result<HttpResponse> {
    if let Err(errors) = form.validate() {
        return Err(JsonResponse::bad_request(&errors.to_string()));
    }

    let events = relay
        .send(path.0, form.into_inner().content)
        .await
        .map_err(|err| match err {
            RelayError::NotFound(_) => JsonResponse::not_found("Conversation not found"),
            RelayError::Busy(_) => JsonResponse::conflict("A reply is already in progress"),
            RelayError::Store(err) => JsonResponse::internal_server_error(err),
        })?;

    Ok(HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(("Cache-Control", "no-cache"))
        .insert_header(("X-Accel-Buffering", "no"))
        .streaming(events.map(Ok::<_, std::io::Error>)))
}
