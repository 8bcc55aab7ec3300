use actix_web::{
    HttpResponse, Responder, ResponseError,
    http::StatusCode,
    post,
    web::{Data, Json},
};
use etl::dispatch::MergeDispatcher;
use etl::error::EtlError;
use etl::types::{DispatchDecision, ObjectKind, SyncEvent, SyncResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, warn};
use utoipa::ToSchema;

use crate::routes::ErrorMessage;

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("{0} is required for successful sync events")]
    MissingField(&'static str),

    #[error("{0} must be a string")]
    InvalidField(&'static str),

    #[error(transparent)]
    Dispatch(#[from] EtlError),
}

impl WebhookError {
    pub fn to_message(&self) -> String {
        match self {
            // Store and queue errors may contain connection details.
            WebhookError::Dispatch(_) => "internal server error".to_string(),
            e => e.to_string(),
        }
    }
}

impl ResponseError for WebhookError {
    fn status_code(&self) -> StatusCode {
        match self {
            WebhookError::MissingField(_) | WebhookError::InvalidField(_) => {
                StatusCode::BAD_REQUEST
            }
            WebhookError::Dispatch(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let error_message = ErrorMessage {
            error: self.to_message(),
        };
        HttpResponse::build(self.status_code()).json(error_message)
    }
}

/// Sync completion notification. Fields other than these are ignored.
///
/// Fields are kept untyped so events that are not successful are acknowledged whatever
/// their shape; types are only enforced for successful events.
#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct SyncWebhookRequest {
    #[schema(value_type = Option<String>, example = "f3a1c2d4-connection")]
    pub connection_id: Option<Value>,
    #[schema(value_type = Option<String>, example = "contact")]
    pub object: Option<Value>,
    #[schema(value_type = Option<String>, example = "SUCCESS")]
    pub result: Option<Value>,
}

impl SyncWebhookRequest {
    fn result(&self) -> SyncResult {
        self.result
            .clone()
            .and_then(|result| serde_json::from_value(result).ok())
            .unwrap_or(SyncResult::Other)
    }
}

/// Returns the string held by a required field. Empty strings count as missing.
fn required_string(value: Option<Value>, field: &'static str) -> Result<String, WebhookError> {
    match value {
        None | Some(Value::Null) => Err(WebhookError::MissingField(field)),
        Some(Value::String(value)) if value.is_empty() => Err(WebhookError::MissingField(field)),
        Some(Value::String(value)) => Ok(value),
        Some(_) => Err(WebhookError::InvalidField(field)),
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SyncWebhookResponse {
    #[schema(example = "OK")]
    pub status: String,
}

impl SyncWebhookResponse {
    fn ok() -> Self {
        Self {
            status: "OK".to_string(),
        }
    }
}

#[utoipa::path(
    summary = "Report a completed object sync",
    description = "Records the sync and dispatches a merge once contacts, opportunities and accounts all synced successfully for the connection.",
    request_body = SyncWebhookRequest,
    responses(
        (status = 200, description = "Event accepted", body = SyncWebhookResponse),
        (status = 400, description = "Malformed body, or successful event without a string connection or object", body = ErrorMessage),
        (status = 500, description = "Internal server error", body = ErrorMessage)
    ),
    tag = "Webhook"
)]
#[post("/webhook")]
pub async fn sync_webhook(
    dispatcher: Data<MergeDispatcher>,
    request: Json<SyncWebhookRequest>,
) -> Result<impl Responder, WebhookError> {
    let request = request.into_inner();

    let result = request.result();
    if !result.is_success() {
        debug!(
            connection_id = ?request.connection_id,
            object = ?request.object,
            ?result,
            "ignoring unsuccessful sync event"
        );

        return Ok(Json(SyncWebhookResponse::ok()));
    }

    let connection_id = required_string(request.connection_id, "connection_id")?;
    let object = required_string(request.object, "object")?;

    let object: ObjectKind = match object.parse() {
        Ok(object) => object,
        Err(err) => {
            warn!(%connection_id, %object, %err, "dropping sync event for unknown object kind");

            return Ok(Json(SyncWebhookResponse::ok()));
        }
    };

    let event = SyncEvent::new(connection_id, object, result);
    let decision = dispatcher.handle_event(&event).await.inspect_err(|err| {
        error!(connection_id = %event.connection_id, %err, "failed to handle sync event");
    })?;

    if let DispatchDecision::Pending { missing } = decision {
        debug!(connection_id = %event.connection_id, ?missing, "waiting for more syncs");
    }

    Ok(Json(SyncWebhookResponse::ok()))
}
