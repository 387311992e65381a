use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};

use clipforge_engine::WebhookOutcome;

use crate::app::errors;
use crate::app::services::AppServices;

const SIGNATURE_HEADER: &str = "stripe-signature";

/// Payment webhook endpoint. Unauthenticated; trust comes from the gateway
/// signature over the raw body, so the body must not be parsed before
/// verification.
pub async fn ingest_payment_event(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
    body: Bytes,
) -> axum::response::Response {
    let Some(signature) = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
    else {
        return errors::json_error(
            StatusCode::BAD_REQUEST,
            "missing_signature",
            "stripe-signature header is required",
        );
    };

    match services.ingester.ingest(&body, signature).await {
        Ok(WebhookOutcome::Credited { owner, amount }) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "received": true,
                "credited": amount,
                "owner_id": owner.to_string(),
            })),
        )
            .into_response(),
        Ok(WebhookOutcome::AlreadyProcessed) => (
            StatusCode::OK,
            Json(serde_json::json!({ "received": true, "duplicate": true })),
        )
            .into_response(),
        Ok(WebhookOutcome::Ignored) => (
            StatusCode::OK,
            Json(serde_json::json!({ "received": true, "ignored": true })),
        )
            .into_response(),
        Err(e) => errors::webhook_error_to_response(e),
    }
}
