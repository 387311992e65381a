use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use clipforge_engine::{EngineError, WebhookError};

pub fn engine_error_to_response(err: EngineError) -> axum::response::Response {
    match err {
        EngineError::InsufficientCredits => json_error(
            StatusCode::PAYMENT_REQUIRED,
            "insufficient_credits",
            "not enough credits to start this job",
        ),
        EngineError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        EngineError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        EngineError::Forbidden => json_error(StatusCode::FORBIDDEN, "forbidden", "forbidden"),
        EngineError::ProviderCreateFailed(msg) => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "provider_error",
            msg,
        ),
        EngineError::ArtifactFetchFailed(msg) | EngineError::ArtifactUploadFailed(msg) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "artifact_error", msg)
        }
        EngineError::Store(msg) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", msg)
        }
    }
}

pub fn webhook_error_to_response(err: WebhookError) -> axum::response::Response {
    match err {
        WebhookError::InvalidSignature => json_error(
            StatusCode::BAD_REQUEST,
            "invalid_signature",
            "webhook signature verification failed",
        ),
        WebhookError::Malformed(msg) => json_error(StatusCode::BAD_REQUEST, "malformed_event", msg),
        WebhookError::Store(msg) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", msg)
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
