use std::time::Duration;

use clipforge_api::app::services::{build_services, CollaboratorConfig};
use clipforge_infra::ProviderConfig;

fn env_or_dev_default(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| {
        tracing::warn!("{name} not set; using insecure dev default");
        default.to_string()
    })
}

#[tokio::main]
async fn main() {
    clipforge_observability::init();

    let jwt_secret = env_or_dev_default("JWT_SECRET", "dev-secret");
    let cron_secret = env_or_dev_default("CRON_SECRET", "dev-cron-secret");

    let config = CollaboratorConfig {
        provider: ProviderConfig::new(
            std::env::var("PROVIDER_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            env_or_dev_default("PROVIDER_API_KEY", "dev-provider-key"),
        ),
        artifact_base_url: env_or_dev_default("ARTIFACT_BASE_URL", "http://localhost:54321"),
        artifact_bucket: std::env::var("ARTIFACT_BUCKET").unwrap_or_else(|_| "videos".to_string()),
        artifact_service_key: env_or_dev_default("ARTIFACT_SERVICE_KEY", "dev-service-key"),
        stripe_webhook_secret: env_or_dev_default("STRIPE_WEBHOOK_SECRET", "whsec_dev"),
        stripe_api_key: env_or_dev_default("STRIPE_API_KEY", "sk_test_dev"),
        sweep_interval: Duration::from_secs(60),
        #[cfg(feature = "postgres")]
        database_url: std::env::var("DATABASE_URL")
            .expect("DATABASE_URL is required with the postgres feature"),
    };

    let services = build_services(config)
        .await
        .expect("failed to wire services");

    // Background sweep so stuck jobs converge even when no owner polls.
    services.sweeper.clone().spawn();

    let app = clipforge_api::app::build_app(services, jwt_secret, cron_secret);

    let listener = tokio::net::TcpListener::bind("0.0.0.0:8080")
        .await
        .expect("failed to bind 0.0.0.0:8080");

    tracing::info!("listening on {}", listener.local_addr().unwrap());

    axum::serve(listener, app).await.unwrap();
}
