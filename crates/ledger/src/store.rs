//! Ledger storage contract and the in-memory implementation.
//!
//! The store enforces the same uniqueness constraints as the Postgres
//! schema's partial unique indexes: at most one negative entry per job ref,
//! at most one positive job-scoped entry per job ref, at most one entry per
//! payment event ref. Constraint hits are outcomes, not errors.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use clipforge_core::{JobId, OwnerId};

use crate::entry::LedgerEntry;

/// Result of an append attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Inserted,
    /// A debit for this job ref already exists.
    DuplicateJobDebit,
    /// A refund for this job ref already exists.
    DuplicateJobRefund,
    /// An entry for this payment event ref already exists.
    DuplicateEvent,
}

/// Result of the atomic admission debit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebitOutcome {
    Charged,
    AlreadyCharged,
    InsufficientCredits,
}

/// Ledger store error (infrastructure failures only; duplicates are outcomes).
#[derive(Debug, Clone, thiserror::Error)]
pub enum LedgerError {
    #[error("owner not found: {0}")]
    OwnerNotFound(OwnerId),
    #[error("storage error: {0}")]
    Storage(String),
}

/// Ledger store abstraction.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Append an entry, honoring the uniqueness constraints. Does not touch
    /// the cached balance.
    async fn append(&self, entry: LedgerEntry) -> Result<AppendOutcome, LedgerError>;

    /// Atomic admission primitive: decrement the owner's cached balance and
    /// insert the debit entry iff the balance covers `-entry.delta`. At most
    /// one concurrent caller racing the same balance wins the last coverable
    /// slot.
    async fn debit_if_covered(&self, entry: LedgerEntry) -> Result<DebitOutcome, LedgerError>;

    /// Cached balance column (derived projection, may be transiently stale).
    async fn balance(&self, owner: OwnerId) -> Result<i64, LedgerError>;

    /// Authoritative balance: SUM(delta) over the owner's entries.
    async fn recompute_balance(&self, owner: OwnerId) -> Result<i64, LedgerError>;

    /// Best-effort mutation of the cached balance.
    async fn apply_balance_delta(&self, owner: OwnerId, delta: i64) -> Result<(), LedgerError>;

    /// The owner's entries, newest first.
    async fn list_for_owner(
        &self,
        owner: OwnerId,
        limit: usize,
    ) -> Result<Vec<LedgerEntry>, LedgerError>;
}

#[derive(Debug, Default)]
struct Inner {
    entries: Vec<LedgerEntry>,
    balances: HashMap<OwnerId, i64>,
}

impl Inner {
    fn check_constraints(&self, entry: &LedgerEntry) -> AppendOutcome {
        if let Some(job_ref) = entry.job_ref {
            let dup = self.entries.iter().any(|e| {
                e.job_ref == Some(job_ref) && (e.delta < 0) == (entry.delta < 0)
            });
            if dup {
                return if entry.delta < 0 {
                    AppendOutcome::DuplicateJobDebit
                } else {
                    AppendOutcome::DuplicateJobRefund
                };
            }
        }
        if let Some(event_ref) = &entry.event_ref {
            if self
                .entries
                .iter()
                .any(|e| e.event_ref.as_deref() == Some(event_ref.as_str()))
            {
                return AppendOutcome::DuplicateEvent;
            }
        }
        AppendOutcome::Inserted
    }
}

/// In-memory ledger store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    inner: Mutex<Inner>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Count entries matching a predicate (test helper).
    pub fn count_where(&self, pred: impl Fn(&LedgerEntry) -> bool) -> usize {
        self.lock().entries.iter().filter(|e| pred(e)).count()
    }

    /// Count debits referencing a job (test helper).
    pub fn debit_count_for_job(&self, job_ref: JobId) -> usize {
        self.count_where(|e| e.job_ref == Some(job_ref) && e.delta < 0)
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn append(&self, entry: LedgerEntry) -> Result<AppendOutcome, LedgerError> {
        let mut inner = self.lock();
        match inner.check_constraints(&entry) {
            AppendOutcome::Inserted => {
                inner.entries.push(entry);
                Ok(AppendOutcome::Inserted)
            }
            dup => Ok(dup),
        }
    }

    async fn debit_if_covered(&self, entry: LedgerEntry) -> Result<DebitOutcome, LedgerError> {
        let cost = -entry.delta;
        debug_assert!(cost > 0, "debit_if_covered requires a negative delta");

        let mut inner = self.lock();
        match inner.check_constraints(&entry) {
            AppendOutcome::Inserted => {}
            _ => return Ok(DebitOutcome::AlreadyCharged),
        }
        let balance = inner.balances.entry(entry.owner).or_insert(0);
        if *balance < cost {
            return Ok(DebitOutcome::InsufficientCredits);
        }
        *balance -= cost;
        inner.entries.push(entry);
        Ok(DebitOutcome::Charged)
    }

    async fn balance(&self, owner: OwnerId) -> Result<i64, LedgerError> {
        Ok(*self.lock().balances.get(&owner).unwrap_or(&0))
    }

    async fn recompute_balance(&self, owner: OwnerId) -> Result<i64, LedgerError> {
        Ok(self
            .lock()
            .entries
            .iter()
            .filter(|e| e.owner == owner)
            .map(|e| e.delta)
            .sum())
    }

    async fn apply_balance_delta(&self, owner: OwnerId, delta: i64) -> Result<(), LedgerError> {
        let mut inner = self.lock();
        *inner.balances.entry(owner).or_insert(0) += delta;
        Ok(())
    }

    async fn list_for_owner(
        &self,
        owner: OwnerId,
        limit: usize,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        let mut result: Vec<_> = self
            .lock()
            .entries
            .iter()
            .filter(|e| e.owner == owner)
            .cloned()
            .collect();
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        result.truncate(limit);
        Ok(result)
    }
}

#[async_trait]
impl<T: LedgerStore + ?Sized> LedgerStore for Arc<T> {
    async fn append(&self, entry: LedgerEntry) -> Result<AppendOutcome, LedgerError> {
        (**self).append(entry).await
    }

    async fn debit_if_covered(&self, entry: LedgerEntry) -> Result<DebitOutcome, LedgerError> {
        (**self).debit_if_covered(entry).await
    }

    async fn balance(&self, owner: OwnerId) -> Result<i64, LedgerError> {
        (**self).balance(owner).await
    }

    async fn recompute_balance(&self, owner: OwnerId) -> Result<i64, LedgerError> {
        (**self).recompute_balance(owner).await
    }

    async fn apply_balance_delta(&self, owner: OwnerId, delta: i64) -> Result<(), LedgerError> {
        (**self).apply_balance_delta(owner, delta).await
    }

    async fn list_for_owner(
        &self,
        owner: OwnerId,
        limit: usize,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        (**self).list_for_owner(owner, limit).await
    }
}
