use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use clipforge_core::JobId;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::OwnerContext;

const DEFAULT_LIST_LIMIT: usize = 50;

pub fn router() -> Router {
    Router::new()
        .route("/", post(submit_job).get(list_jobs))
        .route("/:id", get(get_job))
        .route("/:id/refresh", post(refresh_job))
        .route("/:id/remix", post(remix_job))
}

pub async fn submit_job(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(owner): Extension<OwnerContext>,
    Json(body): Json<dto::SubmitJobRequest>,
) -> axum::response::Response {
    let job = match services
        .controller
        .submit(owner.owner(), &body.user_prompt, body.template_id.as_deref())
        .await
    {
        Ok(job) => job,
        Err(e) => return errors::engine_error_to_response(e),
    };
    (StatusCode::OK, Json(dto::job_to_json(job))).into_response()
}

pub async fn list_jobs(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(owner): Extension<OwnerContext>,
    Query(query): Query<dto::ListQuery>,
) -> axum::response::Response {
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    let jobs = match services.controller.list_for_owner(owner.owner(), limit).await {
        Ok(jobs) => jobs,
        Err(e) => return errors::engine_error_to_response(e),
    };
    let items = jobs.into_iter().map(dto::job_to_json).collect::<Vec<_>>();
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}

pub async fn get_job(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(owner): Extension<OwnerContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let job_id = match parse_job_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match services.controller.get_for_owner(owner.owner(), job_id).await {
        Ok(job) => (StatusCode::OK, Json(dto::job_to_json(job))).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

/// Pull the provider's current status into the store and report it.
pub async fn refresh_job(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(owner): Extension<OwnerContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let job_id = match parse_job_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match services
        .controller
        .reconcile_for_owner(owner.owner(), job_id)
        .await
    {
        Ok(view) => (StatusCode::OK, Json(dto::view_to_json(view))).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn remix_job(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(owner): Extension<OwnerContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::RemixJobRequest>,
) -> axum::response::Response {
    let parent_id = match parse_job_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match services
        .controller
        .remix_submit(owner.owner(), parent_id, &body.user_prompt)
        .await
    {
        Ok(job) => (StatusCode::OK, Json(dto::job_to_json(job))).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

fn parse_job_id(raw: &str) -> Result<JobId, axum::response::Response> {
    JobId::from_str(raw).map_err(|_| {
        errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "id must be a uuid")
    })
}
