use crate::db::Store;
use crate::helpers::JsonResponse;
use actix_web::{delete, web, HttpResponse, Result};
use std::sync::Arc;

#[tracing::instrument(name = "Delete conversation.", skip(store))]
#[delete("/{id}")]
pub async fn item(
    path: web::Path<(i32,)>,
    store: web::Data<Arc<dyn Store>>,
) -> Result<HttpResponse> {
    let deleted = store
        .delete_conversation(path.0)
        .await
        .map_err(JsonResponse::internal_server_error)?;

    if !deleted {
        return Err(JsonResponse::not_found("Conversation not found"));
    }
    Ok(HttpResponse::NoContent().finish())
}
