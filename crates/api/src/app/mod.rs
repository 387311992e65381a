//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: infrastructure wiring (stores, collaborator clients,
//!   controller, webhook ingester, sweeper)
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request/response DTOs and JSON mapping helpers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::get, routing::post, Extension, Router};

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

use services::AppServices;

/// Secret path segment the scheduled sweep trigger must present.
#[derive(Clone)]
pub struct CronSecret(pub Arc<String>);

/// Build the full HTTP router (public entrypoint used by `main.rs` and the
/// black-box tests).
pub fn build_app(services: AppServices, jwt_secret: String, cron_secret: String) -> Router {
    let jwt = Arc::new(clipforge_auth::Hs256JwtValidator::new(
        jwt_secret.into_bytes(),
    ));
    let auth_state = middleware::AuthState { jwt };
    let services = Arc::new(services);

    // Owner routes: bearer token required.
    let protected = routes::router()
        .layer(Extension(services.clone()))
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            middleware::auth_middleware,
        ));

    // Public surface: health, the signature-verified webhook, and the
    // secret-path sweep trigger.
    let public = Router::new()
        .route("/health", get(routes::system::health))
        .route("/webhooks/payments", post(routes::webhooks::ingest_payment_event))
        .route("/cron/refresh-jobs/:secret", get(routes::system::refresh_jobs))
        .layer(Extension(services))
        .layer(Extension(CronSecret(Arc::new(cron_secret))));

    Router::new().merge(public).merge(protected)
}
