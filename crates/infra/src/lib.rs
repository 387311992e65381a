//! Infrastructure layer: HTTP collaborator clients and Postgres stores.

pub mod artifact;
pub mod payments;
pub mod provider;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use artifact::HttpArtifactStore;
pub use payments::StripePaymentGateway;
pub use provider::{HttpProviderClient, ProviderConfig};

#[cfg(feature = "postgres")]
pub use postgres::{PostgresJobStore, PostgresLedgerStore};
