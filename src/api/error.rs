use crate::services::error::TransferError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Payload Too Large: {0}")]
    PayloadTooLarge(String),

    #[error(transparent)]
    Transfer(#[from] TransferError),
}

impl AppError {
    fn status_and_body(&self) -> (StatusCode, String, &'static str) {
        match self {
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone(), "UNAUTHORIZED"),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone(), "BAD_REQUEST"),
            AppError::PayloadTooLarge(msg) => {
                (StatusCode::PAYLOAD_TOO_LARGE, msg.clone(), "PAYLOAD_TOO_LARGE")
            }
            AppError::Transfer(e) => {
                let status = match e {
                    e if e.is_validation() => StatusCode::BAD_REQUEST,
                    TransferError::Incomplete { .. }
                    | TransferError::MissingChunk { .. }
                    | TransferError::SizeMismatch { .. }
                    | TransferError::DigestMismatch { .. } => StatusCode::BAD_REQUEST,
                    TransferError::SessionNotFound(_) => StatusCode::NOT_FOUND,
                    TransferError::SessionBusy(_) => StatusCode::CONFLICT,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
                    tracing::error!("Upload storage failure: {:?}", e);
                    "Internal Server Error".to_string()
                } else {
                    e.to_string()
                };
                (status, message, e.code())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message, code) = self.status_and_body();

        let mut body = json!({
            "error": message,
            "code": code,
        });
        if let AppError::Transfer(TransferError::Incomplete { received, total }) = &self {
            body["received"] = json!(received);
            body["total"] = json!(total);
        }

        (status, Json(body)).into_response()
    }
}
