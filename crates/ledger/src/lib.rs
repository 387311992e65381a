//! `clipforge-ledger` — the credit ledger and the settlement engine.
//!
//! The ledger is the source of truth for balances; the cached balance column
//! is a derived projection. Concurrency safety comes from the store's
//! uniqueness constraints: at most one debit per job, at most one refund per
//! job, at most one entry per external payment event.

pub mod engine;
pub mod entry;
pub mod store;

pub use engine::{SettlementEngine, SettlementError, SettlementOutcome};
pub use entry::{LedgerEntry, LedgerReason, PaymentReceipt};
pub use store::{AppendOutcome, DebitOutcome, InMemoryLedgerStore, LedgerError, LedgerStore};
