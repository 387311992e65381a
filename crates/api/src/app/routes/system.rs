use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use tracing::warn;

use crate::app::errors;
use crate::app::services::AppServices;
use crate::app::CronSecret;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn whoami(
    Extension(owner): Extension<crate::context::OwnerContext>,
) -> impl IntoResponse {
    Json(serde_json::json!({
        "owner_id": owner.owner().to_string(),
    }))
}

/// Scheduled sweep trigger. The secret rides in the path because the caller
/// is a dumb cron that cannot set headers.
pub async fn refresh_jobs(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(expected): Extension<CronSecret>,
    Path(secret): Path<String>,
) -> axum::response::Response {
    if secret != *expected.0 {
        warn!("sweep trigger rejected: secret mismatch");
        return errors::json_error(StatusCode::UNAUTHORIZED, "unauthorized", "unauthorized");
    }

    let report = services.sweeper.sweep_once().await;
    (StatusCode::OK, Json(report)).into_response()
}
