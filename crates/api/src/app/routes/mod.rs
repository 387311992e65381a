use axum::{routing::get, Router};

pub mod credits;
pub mod jobs;
pub mod system;
pub mod webhooks;

/// Router for all authenticated (owner-scoped) endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .nest("/video-jobs", jobs::router())
        .nest("/credits", credits::router())
}
