use crate::helpers::JsonResponse;
use crate::services::{ReadingError, ReadingService};
use actix_web::{get, web, Responder, Result};

#[tracing::instrument(name = "List readings.", skip(service))]
#[get("")]
pub async fn list(service: web::Data<ReadingService>) -> Result<impl Responder> {
    let readings = service.list_readings(service.default_bbox()).await;
    Ok(web::Json(readings))
}

#[tracing::instrument(name = "Get reading.", skip(service))]
#[get("/{id}")]
pub async fn item(
    path: web::Path<(String,)>,
    service: web::Data<ReadingService>,
) -> Result<impl Responder> {
    let id = path.into_inner().0;
    service
        .get_reading(&id)
        .await
        .map(web::Json)
        .map_err(|err| match err {
            ReadingError::NotFound(_) => JsonResponse::not_found("Reading not found"),
            ReadingError::Store(err) => JsonResponse::internal_server_error(err),
        })
}
