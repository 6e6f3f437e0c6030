use actix_web::error::InternalError;
use actix_web::http::StatusCode;
use actix_web::HttpResponse;
use serde::{Deserialize, Serialize};

/// Error envelope returned by every failing handler.
///
/// ```json
/// {"status": "Error", "message": "Reading not found", "code": 404}
/// ```
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonResponse {
    pub status: String,
    pub message: String,
    pub code: u16,
}

impl JsonResponse {
    fn new(code: StatusCode, message: &str, fallback: &str) -> Self {
        let msg = if !message.trim().is_empty() {
            message.to_string()
        } else {
            String::from(fallback)
        };

        JsonResponse {
            status: "Error".to_string(),
            message: msg,
            code: code.as_u16(),
        }
    }

    fn into_error(self) -> actix_web::Error {
        let status = StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let message = self.message.clone();
        let response = HttpResponse::build(status).json(self);
        InternalError::from_response(message, response).into()
    }

    pub fn not_found(message: &str) -> actix_web::Error {
        Self::new(StatusCode::NOT_FOUND, message, "Object not found").into_error()
    }

    pub fn bad_request(message: &str) -> actix_web::Error {
        Self::new(StatusCode::BAD_REQUEST, message, "Validation error").into_error()
    }

    pub fn conflict(message: &str) -> actix_web::Error {
        Self::new(StatusCode::CONFLICT, message, "Conflict").into_error()
    }

    /// The detail is logged; callers only ever see the generic message.
    pub fn internal_server_error(detail: impl std::fmt::Display) -> actix_web::Error {
        tracing::error!(error = %detail, "Internal error");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "", "Internal error").into_error()
    }
}
