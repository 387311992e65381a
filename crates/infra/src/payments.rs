//! Stripe payment gateway: webhook signature verification and charge lookup.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use tracing::warn;

use clipforge_engine::{ChargeDetails, GatewayError, PaymentEvent, PaymentGateway};

type HmacSha256 = Hmac<Sha256>;

/// Maximum accepted age of a signed webhook, in seconds.
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";

/// Wire shape of a checkout webhook event.
#[derive(Debug, Deserialize)]
struct WireEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: WireEventData,
}

#[derive(Debug, Deserialize)]
struct WireEventData {
    object: WireSession,
}

#[derive(Debug, Deserialize)]
struct WireSession {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    payment_status: Option<String>,
    #[serde(default)]
    payment_intent: Option<String>,
    #[serde(default)]
    amount_total: Option<i64>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct WirePaymentIntent {
    #[serde(default)]
    latest_charge: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireCharge {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    amount: Option<i64>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    receipt_url: Option<String>,
}

pub struct StripePaymentGateway {
    http: reqwest::Client,
    webhook_secret: String,
    api_key: String,
    api_base: String,
}

impl StripePaymentGateway {
    pub fn new(webhook_secret: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            webhook_secret: webhook_secret.into(),
            api_key: api_key.into(),
            api_base: STRIPE_API_BASE.to_string(),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Check the `t=...,v1=...` header against HMAC-SHA256 of
    /// `"{timestamp}.{body}"`, within the tolerance window.
    fn check_signature(&self, payload: &[u8], signature: &str) -> Result<(), GatewayError> {
        let mut timestamp: Option<i64> = None;
        let mut candidates: Vec<&str> = Vec::new();
        for part in signature.split(',') {
            match part.split_once('=') {
                Some(("t", value)) => timestamp = value.parse().ok(),
                Some(("v1", value)) => candidates.push(value),
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or(GatewayError::InvalidSignature)?;
        if candidates.is_empty() {
            return Err(GatewayError::InvalidSignature);
        }
        if (Utc::now().timestamp() - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
            warn!(timestamp, "webhook timestamp outside tolerance window");
            return Err(GatewayError::InvalidSignature);
        }

        let mut mac = HmacSha256::new_from_slice(self.webhook_secret.as_bytes())
            .map_err(|_| GatewayError::InvalidSignature)?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        let computed = hex::encode(mac.finalize().into_bytes());

        if candidates.iter().any(|c| constant_time_eq(c, &computed)) {
            Ok(())
        } else {
            Err(GatewayError::InvalidSignature)
        }
    }
}

#[async_trait]
impl PaymentGateway for StripePaymentGateway {
    fn verify_signature(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<PaymentEvent, GatewayError> {
        self.check_signature(payload, signature)?;

        let event: WireEvent = serde_json::from_slice(payload)
            .map_err(|e| GatewayError::Malformed(e.to_string()))?;
        let session = event.data.object;

        Ok(PaymentEvent {
            event_ref: event.id,
            event_type: event.event_type,
            payment_status: session.payment_status,
            metadata: session.metadata,
            payment_ref: session.payment_intent,
            session_ref: session.id,
            amount_total: session.amount_total,
            currency: session.currency,
        })
    }

    async fn fetch_charge_details(
        &self,
        payment_ref: &str,
    ) -> Result<ChargeDetails, GatewayError> {
        let intent: WirePaymentIntent = self
            .http
            .get(format!("{}/payment_intents/{payment_ref}", self.api_base))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?
            .json()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        let Some(charge_ref) = intent.latest_charge else {
            return Ok(ChargeDetails::default());
        };

        let charge: WireCharge = self
            .http
            .get(format!("{}/charges/{charge_ref}", self.api_base))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?
            .json()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        Ok(ChargeDetails {
            amount_total: charge.amount,
            currency: charge.currency,
            receipt_url: charge.receipt_url,
            charge_ref: charge.id,
        })
    }
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
