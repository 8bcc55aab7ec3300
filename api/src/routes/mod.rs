use actix_web::{HttpRequest, HttpResponse, error::InternalError, error::JsonPayloadError};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod health_check;
pub mod metrics;
pub mod webhook;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorMessage {
    #[schema(example = "connection_id is required for successful sync events")]
    pub error: String,
}

/// Renders JSON extraction failures as a `400` with an [`ErrorMessage`] body.
pub fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    let response = HttpResponse::BadRequest().json(ErrorMessage {
        error: format!("invalid request body: {err}"),
    });

    InternalError::from_response(err, response).into()
}
