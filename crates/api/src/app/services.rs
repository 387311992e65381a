//! Service wiring: stores, collaborator clients, controller, ingester.

use std::sync::Arc;
use std::time::Duration;

use clipforge_engine::{
    JobLifecycleController, PaymentGateway, ReconcileSweeper, WebhookIngester,
};
#[cfg(not(feature = "postgres"))]
use clipforge_jobs::InMemoryJobStore;
use clipforge_jobs::InMemoryTemplateStore;
#[cfg(not(feature = "postgres"))]
use clipforge_ledger::InMemoryLedgerStore;
use clipforge_ledger::SettlementEngine;
use clipforge_infra::{HttpArtifactStore, HttpProviderClient, ProviderConfig, StripePaymentGateway};

#[cfg(feature = "postgres")]
use clipforge_infra::{PostgresJobStore, PostgresLedgerStore};
#[cfg(feature = "postgres")]
use sqlx::postgres::PgPoolOptions;

/// Everything the handlers need, behind one Extension.
#[derive(Clone)]
pub struct AppServices {
    pub controller: Arc<JobLifecycleController>,
    pub ingester: Arc<WebhookIngester>,
    pub sweeper: ReconcileSweeper,
}

impl AppServices {
    pub fn new(
        controller: Arc<JobLifecycleController>,
        ingester: Arc<WebhookIngester>,
        sweep_interval: Duration,
    ) -> Self {
        let sweeper = ReconcileSweeper::new(controller.clone(), sweep_interval);
        Self {
            controller,
            ingester,
            sweeper,
        }
    }
}

/// Collaborator configuration read from the environment by `main.rs`.
#[derive(Debug, Clone)]
pub struct CollaboratorConfig {
    pub provider: ProviderConfig,
    pub artifact_base_url: String,
    pub artifact_bucket: String,
    pub artifact_service_key: String,
    pub stripe_webhook_secret: String,
    pub stripe_api_key: String,
    pub sweep_interval: Duration,
    #[cfg(feature = "postgres")]
    pub database_url: String,
}

/// Wire services against in-memory stores (default) or Postgres (feature).
pub async fn build_services(config: CollaboratorConfig) -> anyhow::Result<AppServices> {
    let provider = Arc::new(HttpProviderClient::new(config.provider.clone()));
    let artifacts = Arc::new(HttpArtifactStore::new(
        config.artifact_base_url.clone(),
        config.artifact_bucket.clone(),
        config.artifact_service_key.clone(),
    ));
    let gateway: Arc<dyn PaymentGateway> = Arc::new(StripePaymentGateway::new(
        config.stripe_webhook_secret.clone(),
        config.stripe_api_key.clone(),
    ));

    #[cfg(feature = "postgres")]
    {
        let pool = PgPoolOptions::new()
            .max_connections(8)
            .connect(&config.database_url)
            .await?;
        let settlement = SettlementEngine::new(Arc::new(PostgresLedgerStore::new(pool.clone())));
        let controller = Arc::new(JobLifecycleController::new(
            Arc::new(PostgresJobStore::new(pool)),
            InMemoryTemplateStore::arc(),
            provider,
            artifacts,
            settlement.clone(),
        ));
        let ingester = Arc::new(WebhookIngester::new(gateway, settlement));
        Ok(AppServices::new(controller, ingester, config.sweep_interval))
    }

    #[cfg(not(feature = "postgres"))]
    {
        let settlement = SettlementEngine::new(InMemoryLedgerStore::arc());
        let controller = Arc::new(JobLifecycleController::new(
            InMemoryJobStore::arc(),
            InMemoryTemplateStore::arc(),
            provider,
            artifacts,
            settlement.clone(),
        ));
        let ingester = Arc::new(WebhookIngester::new(gateway, settlement));
        Ok(AppServices::new(controller, ingester, config.sweep_interval))
    }
}
