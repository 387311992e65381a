//! Inbound payment webhook handling.
//!
//! Signature verification happens at the boundary; everything past it is
//! idempotent. A redelivered event settles as a no-op, and the transport
//! answer for a verified, well-formed event is always success.

use std::sync::Arc;

use tracing::{info, warn};

use clipforge_core::OwnerId;
use clipforge_ledger::{PaymentReceipt, SettlementEngine, SettlementError, SettlementOutcome};

use crate::ports::{GatewayError, PaymentEvent, PaymentGateway};

const CHECKOUT_COMPLETED: &str = "checkout.session.completed";
const STATUS_PAID: &str = "paid";

/// What ingesting one delivery did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// Verified but not a paid checkout completion; dropped without effect.
    Ignored,
    /// First delivery: credits applied.
    Credited { owner: OwnerId, amount: i64 },
    /// Redelivery of an already-settled event.
    AlreadyProcessed,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum WebhookError {
    #[error("invalid webhook signature")]
    InvalidSignature,
    #[error("{0}")]
    Malformed(String),
    #[error("storage error: {0}")]
    Store(String),
}

/// Validates and applies payment events through the settlement engine.
#[derive(Clone)]
pub struct WebhookIngester {
    gateway: Arc<dyn PaymentGateway>,
    settlement: SettlementEngine,
}

impl WebhookIngester {
    pub fn new(gateway: Arc<dyn PaymentGateway>, settlement: SettlementEngine) -> Self {
        Self { gateway, settlement }
    }

    /// Ingest one raw delivery. Unverified payloads cause no state change.
    pub async fn ingest(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<WebhookOutcome, WebhookError> {
        let event = match self.gateway.verify_signature(payload, signature) {
            Ok(event) => event,
            Err(GatewayError::InvalidSignature) => return Err(WebhookError::InvalidSignature),
            Err(GatewayError::Malformed(detail)) => return Err(WebhookError::Malformed(detail)),
            Err(GatewayError::Transport(detail)) => return Err(WebhookError::Malformed(detail)),
        };

        if event.event_type != CHECKOUT_COMPLETED {
            return Ok(WebhookOutcome::Ignored);
        }
        if event.payment_status.as_deref() != Some(STATUS_PAID) {
            info!(event_ref = %event.event_ref, "checkout completed but not paid; ignoring");
            return Ok(WebhookOutcome::Ignored);
        }

        let owner = required_metadata(&event, "owner_id")?
            .parse::<OwnerId>()
            .map_err(|_| WebhookError::Malformed("owner_id is not a valid id".into()))?;
        let amount = required_metadata(&event, "credits")?
            .parse::<i64>()
            .map_err(|_| WebhookError::Malformed("credits is not an integer".into()))?;
        if amount <= 0 {
            return Err(WebhookError::Malformed("credits must be positive".into()));
        }

        let receipt = self.build_receipt(&event).await;
        let outcome = self
            .settlement
            .credit_from_payment(owner, amount, event.event_ref.clone(), receipt)
            .await
            .map_err(|e| match e {
                SettlementError::Ledger(inner) => WebhookError::Store(inner.to_string()),
                SettlementError::InsufficientCredits => {
                    // Credits never fail admission; keep the arm for the type.
                    WebhookError::Store("unexpected admission failure".into())
                }
            })?;

        match outcome {
            SettlementOutcome::Applied => {
                info!(event_ref = %event.event_ref, %owner, amount, "payment credited");
                Ok(WebhookOutcome::Credited { owner, amount })
            }
            SettlementOutcome::AlreadyApplied => Ok(WebhookOutcome::AlreadyProcessed),
        }
    }

    /// Receipt enrichment is best-effort: a gateway lookup failure is logged
    /// and the credit proceeds with what the event itself carried.
    async fn build_receipt(&self, event: &PaymentEvent) -> PaymentReceipt {
        let mut receipt = PaymentReceipt {
            amount_total: event.amount_total,
            currency: event.currency.clone(),
            receipt_url: None,
            payment_ref: event.payment_ref.clone(),
            charge_ref: None,
            session_ref: event.session_ref.clone(),
        };

        if let Some(payment_ref) = &event.payment_ref {
            match self.gateway.fetch_charge_details(payment_ref).await {
                Ok(details) => {
                    receipt.amount_total = details.amount_total.or(receipt.amount_total);
                    receipt.currency = details.currency.or(receipt.currency);
                    receipt.receipt_url = details.receipt_url;
                    receipt.charge_ref = details.charge_ref;
                }
                Err(e) => {
                    warn!(event_ref = %event.event_ref, error = %e, "charge detail lookup failed");
                }
            }
        }
        receipt
    }
}

fn required_metadata<'a>(event: &'a PaymentEvent, key: &str) -> Result<&'a str, WebhookError> {
    event
        .metadata
        .get(key)
        .map(String::as_str)
        .ok_or_else(|| WebhookError::Malformed(format!("missing metadata field: {key}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{paid_checkout_event, FakePaymentGateway};
    use crate::ports::ChargeDetails;
    use clipforge_ledger::{InMemoryLedgerStore, LedgerStore};

    const SIG: &str = "t=1,v1=valid";

    fn ingester() -> (WebhookIngester, Arc<FakePaymentGateway>, Arc<InMemoryLedgerStore>) {
        let gateway = Arc::new(FakePaymentGateway::new(SIG));
        let ledger = InMemoryLedgerStore::arc();
        let ingester =
            WebhookIngester::new(gateway.clone(), SettlementEngine::new(ledger.clone()));
        (ingester, gateway, ledger)
    }

    #[tokio::test]
    async fn paid_checkout_credits_the_owner() {
        let (ingester, gateway, ledger) = ingester();
        let owner = OwnerId::new();
        gateway.set_event(paid_checkout_event("evt_1", owner, 10));
        gateway.set_charge_details(Ok(ChargeDetails {
            receipt_url: Some("https://pay.test/receipt/1".into()),
            charge_ref: Some("ch_1".into()),
            ..ChargeDetails::default()
        }));

        let outcome = ingester.ingest(b"{}", SIG).await.unwrap();

        assert_eq!(outcome, WebhookOutcome::Credited { owner, amount: 10 });
        assert_eq!(ledger.balance(owner).await.unwrap(), 10);
        let entries = ledger.list_for_owner(owner, 10).await.unwrap();
        assert_eq!(entries.len(), 1);
        let receipt = entries[0].receipt.as_ref().unwrap();
        assert_eq!(receipt.receipt_url.as_deref(), Some("https://pay.test/receipt/1"));
        assert_eq!(receipt.charge_ref.as_deref(), Some("ch_1"));
    }

    #[tokio::test]
    async fn redelivery_is_accepted_but_credits_once() {
        let (ingester, gateway, ledger) = ingester();
        let owner = OwnerId::new();
        gateway.set_event(paid_checkout_event("evt_pack10", owner, 10));

        let first = ingester.ingest(b"{}", SIG).await.unwrap();
        let second = ingester.ingest(b"{}", SIG).await.unwrap();

        assert_eq!(first, WebhookOutcome::Credited { owner, amount: 10 });
        assert_eq!(second, WebhookOutcome::AlreadyProcessed);
        assert_eq!(ledger.balance(owner).await.unwrap(), 10);
        assert_eq!(ledger.recompute_balance(owner).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn bad_signature_causes_no_state_change() {
        let (ingester, gateway, ledger) = ingester();
        let owner = OwnerId::new();
        gateway.set_event(paid_checkout_event("evt_1", owner, 10));

        let err = ingester.ingest(b"{}", "t=1,v1=wrong").await.unwrap_err();

        assert!(matches!(err, WebhookError::InvalidSignature));
        assert_eq!(ledger.balance(owner).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn other_event_types_are_ignored() {
        let (ingester, gateway, ledger) = ingester();
        let owner = OwnerId::new();
        let mut event = paid_checkout_event("evt_1", owner, 10);
        event.event_type = "invoice.paid".into();
        gateway.set_event(event);

        let outcome = ingester.ingest(b"{}", SIG).await.unwrap();

        assert_eq!(outcome, WebhookOutcome::Ignored);
        assert_eq!(ledger.balance(owner).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unpaid_checkout_is_ignored() {
        let (ingester, gateway, ledger) = ingester();
        let owner = OwnerId::new();
        let mut event = paid_checkout_event("evt_1", owner, 10);
        event.payment_status = Some("unpaid".into());
        gateway.set_event(event);

        let outcome = ingester.ingest(b"{}", SIG).await.unwrap();

        assert_eq!(outcome, WebhookOutcome::Ignored);
        assert_eq!(ledger.balance(owner).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn missing_or_bad_metadata_is_malformed() {
        let (ingester, gateway, _ledger) = ingester();
        let owner = OwnerId::new();

        let mut event = paid_checkout_event("evt_1", owner, 10);
        event.metadata.remove("owner_id");
        gateway.set_event(event);
        let err = ingester.ingest(b"{}", SIG).await.unwrap_err();
        assert!(matches!(err, WebhookError::Malformed(_)));

        let mut event = paid_checkout_event("evt_2", owner, 10);
        event.metadata.insert("credits".into(), "-3".into());
        gateway.set_event(event);
        let err = ingester.ingest(b"{}", SIG).await.unwrap_err();
        assert!(matches!(err, WebhookError::Malformed(_)));
    }

    #[tokio::test]
    async fn charge_lookup_failure_does_not_block_crediting() {
        let (ingester, gateway, ledger) = ingester();
        let owner = OwnerId::new();
        gateway.set_event(paid_checkout_event("evt_1", owner, 10));
        gateway.set_charge_details(Err(GatewayError::Transport("timeout".into())));

        let outcome = ingester.ingest(b"{}", SIG).await.unwrap();

        assert_eq!(outcome, WebhookOutcome::Credited { owner, amount: 10 });
        assert_eq!(ledger.balance(owner).await.unwrap(), 10);
        let entries = ledger.list_for_owner(owner, 10).await.unwrap();
        let receipt = entries[0].receipt.as_ref().unwrap();
        assert!(receipt.receipt_url.is_none());
        assert_eq!(receipt.amount_total, Some(1000));
    }
}
