use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use reserva_core::{BookingError, StoreError};
use reserva_ticket::PipelineError;

#[derive(Debug)]
pub enum AppError {
    ValidationError(String),
    NotFoundError(String),
    ConflictError(String),
    ServiceUnavailable(String),
    InternalServerError(String),
    Anyhow(anyhow::Error),
}

impl AppError {
    pub fn from_booking(err: BookingError) -> Self {
        match err {
            BookingError::SlotUnavailable => {
                AppError::ConflictError("slot is no longer available".to_string())
            }
            BookingError::InvalidRequest(msg) => AppError::ValidationError(msg),
            BookingError::InvalidPackage(msg) => AppError::ValidationError(msg),
            BookingError::TransientStorage(msg) => AppError::ServiceUnavailable(msg),
            BookingError::NotFound(what) => AppError::NotFoundError(what),
            BookingError::InvalidTransition { from, to } => {
                AppError::ConflictError(format!("invalid state transition from {} to {}", from, to))
            }
            BookingError::LineItemConflict(service_id) => AppError::InternalServerError(format!(
                "line item uniqueness violated for service {}",
                service_id
            )),
        }
    }

    pub fn from_pipeline(err: PipelineError) -> Self {
        match err {
            PipelineError::AlreadyRunning(id) => {
                AppError::ConflictError(format!("ticket pipeline already running for booking {}", id))
            }
            PipelineError::ArtifactMissing(id) => AppError::ConflictError(format!(
                "no ticket artifact for booking {}; generate the PDF first",
                id
            )),
            PipelineError::Store(StoreError::Transient(msg)) => AppError::ServiceUnavailable(msg),
            PipelineError::Store(e) => AppError::InternalServerError(e.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFoundError(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::ConflictError(msg) => (StatusCode::CONFLICT, msg),
            AppError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
            AppError::Anyhow(err) => {
                tracing::error!("Internal Server Error: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::Anyhow(err.into())
    }
}
