//! Ledger entry model (immutable, append-only).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use clipforge_core::{JobId, LedgerEntryId, OwnerId};

/// Why an entry moved credits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerReason {
    /// Debit for a completed generate job.
    VideoDone,
    /// Debit for a completed remix job.
    VideoRemix,
    /// Refund of a job debit after terminal failure.
    Refund,
    /// Credit top-up from a confirmed payment.
    Purchase,
}

impl LedgerReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerReason::VideoDone => "video_done",
            LedgerReason::VideoRemix => "video_remix",
            LedgerReason::Refund => "refund",
            LedgerReason::Purchase => "purchase",
        }
    }
}

impl std::fmt::Display for LedgerReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receipt metadata attached to purchase entries (best-effort; any field may
/// be absent when the gateway lookup fails).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentReceipt {
    pub amount_total: Option<i64>,
    pub currency: Option<String>,
    pub receipt_url: Option<String>,
    pub payment_ref: Option<String>,
    pub charge_ref: Option<String>,
    pub session_ref: Option<String>,
}

/// One balance-affecting ledger row. Never mutated or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: LedgerEntryId,
    pub owner: OwnerId,
    /// Signed credit delta: negative for debits, positive for credits/refunds.
    pub delta: i64,
    pub reason: LedgerReason,
    /// Idempotency key for job debits and refunds.
    pub job_ref: Option<JobId>,
    /// Idempotency key for external payment events.
    pub event_ref: Option<String>,
    pub receipt: Option<PaymentReceipt>,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn debit_for_job(owner: OwnerId, job_ref: JobId, cost: i64, reason: LedgerReason) -> Self {
        debug_assert!(cost > 0);
        Self {
            id: LedgerEntryId::new(),
            owner,
            delta: -cost,
            reason,
            job_ref: Some(job_ref),
            event_ref: None,
            receipt: None,
            created_at: Utc::now(),
        }
    }

    pub fn refund_for_job(owner: OwnerId, job_ref: JobId, cost: i64) -> Self {
        debug_assert!(cost > 0);
        Self {
            id: LedgerEntryId::new(),
            owner,
            delta: cost,
            reason: LedgerReason::Refund,
            job_ref: Some(job_ref),
            event_ref: None,
            receipt: None,
            created_at: Utc::now(),
        }
    }

    pub fn credit_for_payment(
        owner: OwnerId,
        amount: i64,
        event_ref: String,
        receipt: PaymentReceipt,
    ) -> Self {
        debug_assert!(amount > 0);
        Self {
            id: LedgerEntryId::new(),
            owner,
            delta: amount,
            reason: LedgerReason::Purchase,
            job_ref: None,
            event_ref: Some(event_ref),
            receipt: Some(receipt),
            created_at: Utc::now(),
        }
    }

    pub fn is_debit(&self) -> bool {
        self.delta < 0
    }
}
