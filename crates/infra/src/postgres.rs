//! Postgres-backed job and ledger stores.
//!
//! The conditional writes are single UPDATE statements whose WHERE clause
//! carries the compare-and-swap condition; `rows_affected` tells the caller
//! whether it won. Ledger uniqueness is enforced by partial unique indexes
//! (see `migrations/0001_init.sql`), and a `23505` on insert is reported as a
//! duplicate outcome, never as an error.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use clipforge_core::{JobId, LedgerEntryId, OwnerId};
use clipforge_jobs::{Job, JobKind, JobStatus, JobStore, JobStoreError, ProviderRef};
use clipforge_ledger::{
    AppendOutcome, DebitOutcome, LedgerEntry, LedgerError, LedgerReason, LedgerStore,
};

const DEBIT_INDEX: &str = "ledger_one_debit_per_job";
const REFUND_INDEX: &str = "ledger_one_refund_per_job";
const EVENT_INDEX: &str = "ledger_one_entry_per_event";

#[derive(Debug, Clone)]
pub struct PostgresJobStore {
    pool: Arc<PgPool>,
}

impl PostgresJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    async fn exists(&self, job_id: JobId) -> Result<bool, JobStoreError> {
        let row = sqlx::query("SELECT 1 FROM jobs WHERE id = $1")
            .bind(job_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(storage_err)?;
        Ok(row.is_some())
    }

    /// Distinguish "lost the race" from "no such row" after a zero-row CAS.
    async fn lost_or_missing(&self, job_id: JobId) -> Result<bool, JobStoreError> {
        if self.exists(job_id).await? {
            Ok(false)
        } else {
            Err(JobStoreError::NotFound(job_id))
        }
    }
}

#[async_trait]
impl JobStore for PostgresJobStore {
    async fn insert(&self, job: Job) -> Result<JobId, JobStoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO jobs
                (id, owner_id, status, kind, prompt, prompt_final, provider_ref,
                 result_ref, progress, cost, parent_ref, error, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(job.id.as_uuid())
        .bind(job.owner.as_uuid())
        .bind(job.status.as_str())
        .bind(job.kind.as_str())
        .bind(&job.prompt)
        .bind(&job.prompt_final)
        .bind(job.provider_ref.as_ref().map(|p| p.as_str()))
        .bind(job.result_ref.as_deref())
        .bind(job.progress as i16)
        .bind(job.cost)
        .bind(job.parent_ref.map(Uuid::from))
        .bind(job.error.as_deref())
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&*self.pool)
        .await;

        match result {
            Ok(_) => Ok(job.id),
            Err(e) if is_unique_violation(&e) => Err(JobStoreError::AlreadyExists(job.id)),
            Err(e) => Err(storage_err(e)),
        }
    }

    async fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        let row = sqlx::query("SELECT * FROM jobs WHERE id = $1")
            .bind(job_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(storage_err)?;
        row.map(job_from_row).transpose()
    }

    async fn list_for_owner(
        &self,
        owner: OwnerId,
        limit: usize,
    ) -> Result<Vec<Job>, JobStoreError> {
        let rows = sqlx::query(
            "SELECT * FROM jobs WHERE owner_id = $1 ORDER BY created_at DESC LIMIT $2",
        )
        .bind(owner.as_uuid())
        .bind(limit as i64)
        .fetch_all(&*self.pool)
        .await
        .map_err(storage_err)?;
        rows.into_iter().map(job_from_row).collect()
    }

    async fn list_active(&self, limit: usize) -> Result<Vec<Job>, JobStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM jobs
            WHERE status IN ('queued', 'processing')
            ORDER BY created_at ASC
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&*self.pool)
        .await
        .map_err(storage_err)?;
        rows.into_iter().map(job_from_row).collect()
    }

    async fn mark_processing(
        &self,
        job_id: JobId,
        provider_ref: &ProviderRef,
        progress: u8,
    ) -> Result<bool, JobStoreError> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'processing', provider_ref = $2, progress = $3, updated_at = now()
            WHERE id = $1 AND status = 'queued'
            "#,
        )
        .bind(job_id.as_uuid())
        .bind(provider_ref.as_str())
        .bind(progress.min(100) as i16)
        .execute(&*self.pool)
        .await
        .map_err(storage_err)?;

        if result.rows_affected() == 1 {
            Ok(true)
        } else {
            self.lost_or_missing(job_id).await
        }
    }

    async fn update_progress(&self, job_id: JobId, progress: u8) -> Result<(), JobStoreError> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'processing', progress = $2, updated_at = now()
            WHERE id = $1 AND status NOT IN ('done', 'failed')
            "#,
        )
        .bind(job_id.as_uuid())
        .bind(progress.min(100) as i16)
        .execute(&*self.pool)
        .await
        .map_err(storage_err)?;

        // Terminal rows silently ignore progress updates.
        if result.rows_affected() == 0 {
            self.lost_or_missing(job_id).await?;
        }
        Ok(())
    }

    async fn finalize_if_unset(
        &self,
        job_id: JobId,
        result_ref: &str,
    ) -> Result<bool, JobStoreError> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'done', result_ref = $2, progress = 100, updated_at = now()
            WHERE id = $1 AND result_ref IS NULL AND status NOT IN ('done', 'failed')
            "#,
        )
        .bind(job_id.as_uuid())
        .bind(result_ref)
        .execute(&*self.pool)
        .await
        .map_err(storage_err)?;

        if result.rows_affected() == 1 {
            Ok(true)
        } else {
            self.lost_or_missing(job_id).await
        }
    }

    async fn fail_if_active(&self, job_id: JobId, error: &str) -> Result<bool, JobStoreError> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'failed', error = $2, updated_at = now()
            WHERE id = $1 AND status NOT IN ('done', 'failed')
            "#,
        )
        .bind(job_id.as_uuid())
        .bind(error)
        .execute(&*self.pool)
        .await
        .map_err(storage_err)?;

        if result.rows_affected() == 1 {
            Ok(true)
        } else {
            self.lost_or_missing(job_id).await
        }
    }
}

#[derive(Debug, Clone)]
pub struct PostgresLedgerStore {
    pool: Arc<PgPool>,
}

impl PostgresLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    async fn append(&self, entry: LedgerEntry) -> Result<AppendOutcome, LedgerError> {
        match insert_entry(&self.pool, &entry).await {
            Ok(()) => Ok(AppendOutcome::Inserted),
            Err(e) => duplicate_outcome(&e).ok_or_else(|| ledger_storage_err(e)),
        }
    }

    async fn debit_if_covered(&self, entry: LedgerEntry) -> Result<DebitOutcome, LedgerError> {
        let cost = -entry.delta;
        debug_assert!(cost > 0, "debit_if_covered requires a negative delta");

        let mut tx = self.pool.begin().await.map_err(ledger_storage_err)?;

        // Conditional cached-balance decrement: zero rows means the balance
        // cannot cover the cost.
        let result = sqlx::query(
            "UPDATE profiles SET credits = credits - $2 WHERE owner_id = $1 AND credits >= $2",
        )
        .bind(entry.owner.as_uuid())
        .bind(cost)
        .execute(&mut *tx)
        .await
        .map_err(ledger_storage_err)?;

        if result.rows_affected() == 0 {
            tx.rollback().await.map_err(ledger_storage_err)?;
            return Ok(DebitOutcome::InsufficientCredits);
        }

        match insert_entry_tx(&mut tx, &entry).await {
            Ok(()) => {
                tx.commit().await.map_err(ledger_storage_err)?;
                Ok(DebitOutcome::Charged)
            }
            Err(e) if duplicate_outcome(&e).is_some() => {
                tx.rollback().await.map_err(ledger_storage_err)?;
                Ok(DebitOutcome::AlreadyCharged)
            }
            Err(e) => {
                let _ = tx.rollback().await;
                Err(ledger_storage_err(e))
            }
        }
    }

    async fn balance(&self, owner: OwnerId) -> Result<i64, LedgerError> {
        let row = sqlx::query("SELECT credits FROM profiles WHERE owner_id = $1")
            .bind(owner.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(ledger_storage_err)?;
        Ok(row.map(|r| r.get::<i64, _>("credits")).unwrap_or(0))
    }

    async fn recompute_balance(&self, owner: OwnerId) -> Result<i64, LedgerError> {
        let row = sqlx::query(
            "SELECT COALESCE(SUM(delta), 0)::BIGINT AS balance FROM ledger_entries WHERE owner_id = $1",
        )
        .bind(owner.as_uuid())
        .fetch_one(&*self.pool)
        .await
        .map_err(ledger_storage_err)?;
        Ok(row.get::<i64, _>("balance"))
    }

    async fn apply_balance_delta(&self, owner: OwnerId, delta: i64) -> Result<(), LedgerError> {
        sqlx::query(
            r#"
            INSERT INTO profiles (owner_id, credits) VALUES ($1, $2)
            ON CONFLICT (owner_id) DO UPDATE SET credits = profiles.credits + $2
            "#,
        )
        .bind(owner.as_uuid())
        .bind(delta)
        .execute(&*self.pool)
        .await
        .map_err(ledger_storage_err)?;
        Ok(())
    }

    async fn list_for_owner(
        &self,
        owner: OwnerId,
        limit: usize,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        let rows = sqlx::query(
            "SELECT * FROM ledger_entries WHERE owner_id = $1 ORDER BY created_at DESC LIMIT $2",
        )
        .bind(owner.as_uuid())
        .bind(limit as i64)
        .fetch_all(&*self.pool)
        .await
        .map_err(ledger_storage_err)?;
        rows.into_iter().map(entry_from_row).collect()
    }
}

async fn insert_entry(pool: &PgPool, entry: &LedgerEntry) -> Result<(), sqlx::Error> {
    entry_insert_query(entry).execute(pool).await.map(|_| ())
}

async fn insert_entry_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    entry: &LedgerEntry,
) -> Result<(), sqlx::Error> {
    entry_insert_query(entry).execute(&mut **tx).await.map(|_| ())
}

fn entry_insert_query(
    entry: &LedgerEntry,
) -> sqlx::query::Query<'_, sqlx::Postgres, sqlx::postgres::PgArguments> {
    sqlx::query(
        r#"
        INSERT INTO ledger_entries
            (id, owner_id, delta, reason, job_ref, event_ref, receipt, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(entry.id.as_uuid())
    .bind(entry.owner.as_uuid())
    .bind(entry.delta)
    .bind(entry.reason.as_str())
    .bind(entry.job_ref.map(Uuid::from))
    .bind(entry.event_ref.as_deref())
    .bind(
        entry
            .receipt
            .as_ref()
            .map(|r| serde_json::to_value(r).unwrap_or(serde_json::Value::Null)),
    )
    .bind(entry.created_at)
}

/// Map a 23505 to the duplicate outcome its index name implies.
fn duplicate_outcome(e: &sqlx::Error) -> Option<AppendOutcome> {
    let db_err = match e {
        sqlx::Error::Database(db_err) => db_err,
        _ => return None,
    };
    if db_err.code().as_deref() != Some("23505") {
        return None;
    }
    match db_err.constraint() {
        Some(DEBIT_INDEX) => Some(AppendOutcome::DuplicateJobDebit),
        Some(REFUND_INDEX) => Some(AppendOutcome::DuplicateJobRefund),
        Some(EVENT_INDEX) => Some(AppendOutcome::DuplicateEvent),
        _ => None,
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505"))
}

fn storage_err(e: sqlx::Error) -> JobStoreError {
    JobStoreError::Storage(e.to_string())
}

fn ledger_storage_err(e: sqlx::Error) -> LedgerError {
    LedgerError::Storage(e.to_string())
}

fn job_from_row(row: sqlx::postgres::PgRow) -> Result<Job, JobStoreError> {
    let status = status_from_str(row.get::<&str, _>("status"))
        .map_err(JobStoreError::Storage)?;
    let kind = kind_from_str(row.get::<&str, _>("kind")).map_err(JobStoreError::Storage)?;

    Ok(Job {
        id: JobId::from_uuid(row.get("id")),
        owner: OwnerId::from_uuid(row.get("owner_id")),
        status,
        kind,
        prompt: row.get("prompt"),
        prompt_final: row.get("prompt_final"),
        provider_ref: row
            .get::<Option<String>, _>("provider_ref")
            .map(ProviderRef::new),
        result_ref: row.get("result_ref"),
        progress: row.get::<i16, _>("progress").clamp(0, 100) as u8,
        cost: row.get("cost"),
        parent_ref: row.get::<Option<Uuid>, _>("parent_ref").map(JobId::from_uuid),
        error: row.get("error"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn entry_from_row(row: sqlx::postgres::PgRow) -> Result<LedgerEntry, LedgerError> {
    let reason = reason_from_str(row.get::<&str, _>("reason")).map_err(LedgerError::Storage)?;
    let receipt = row
        .get::<Option<serde_json::Value>, _>("receipt")
        .map(serde_json::from_value)
        .transpose()
        .map_err(|e| LedgerError::Storage(format!("bad receipt json: {e}")))?;

    Ok(LedgerEntry {
        id: LedgerEntryId::from_uuid(row.get("id")),
        owner: OwnerId::from_uuid(row.get("owner_id")),
        delta: row.get("delta"),
        reason,
        job_ref: row.get::<Option<Uuid>, _>("job_ref").map(JobId::from_uuid),
        event_ref: row.get("event_ref"),
        receipt,
        created_at: row.get("created_at"),
    })
}

fn status_from_str(s: &str) -> Result<JobStatus, String> {
    match s {
        "queued" => Ok(JobStatus::Queued),
        "processing" => Ok(JobStatus::Processing),
        "done" => Ok(JobStatus::Done),
        "failed" => Ok(JobStatus::Failed),
        other => Err(format!("unknown job status in store: {other}")),
    }
}

fn kind_from_str(s: &str) -> Result<JobKind, String> {
    match s {
        "generate" => Ok(JobKind::Generate),
        "remix" => Ok(JobKind::Remix),
        other => Err(format!("unknown job kind in store: {other}")),
    }
}

fn reason_from_str(s: &str) -> Result<LedgerReason, String> {
    match s {
        "video_done" => Ok(LedgerReason::VideoDone),
        "video_remix" => Ok(LedgerReason::VideoRemix),
        "refund" => Ok(LedgerReason::Refund),
        "purchase" => Ok(LedgerReason::Purchase),
        other => Err(format!("unknown ledger reason in store: {other}")),
    }
}
