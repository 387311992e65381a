use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::OwnerContext;

const DEFAULT_LEDGER_LIMIT: usize = 50;

pub fn router() -> Router {
    Router::new()
        .route("/balance", get(get_balance))
        .route("/ledger", get(list_ledger))
}

pub async fn get_balance(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(owner): Extension<OwnerContext>,
) -> axum::response::Response {
    let ledger = services.controller.settlement().ledger();
    match ledger.balance(owner.owner()).await {
        Ok(credits) => {
            (StatusCode::OK, Json(serde_json::json!({ "credits": credits }))).into_response()
        }
        Err(e) => errors::json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", e.to_string()),
    }
}

pub async fn list_ledger(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(owner): Extension<OwnerContext>,
    Query(query): Query<dto::ListQuery>,
) -> axum::response::Response {
    let limit = query.limit.unwrap_or(DEFAULT_LEDGER_LIMIT);
    let ledger = services.controller.settlement().ledger();
    match ledger.list_for_owner(owner.owner(), limit).await {
        Ok(entries) => {
            let items = entries.into_iter().map(dto::entry_to_json).collect::<Vec<_>>();
            (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
        }
        Err(e) => errors::json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", e.to_string()),
    }
}
