//! Scheduled reconciliation sweep.
//!
//! Polling stands in for provider push notifications: the sweep lists the
//! oldest active jobs and funnels each through the same idempotent
//! `reconcile` path that on-demand callers use. Staleness is bounded by the
//! sweep cadence.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::controller::JobLifecycleController;

/// Active jobs examined per sweep, oldest first.
pub const DEFAULT_SWEEP_BATCH: usize = 50;

/// Summary of one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct SweepReport {
    pub scanned: usize,
    pub done: usize,
    pub failed: usize,
    pub still_active: usize,
    pub errors: usize,
}

/// Periodically reconciles active jobs against the provider.
#[derive(Clone)]
pub struct ReconcileSweeper {
    controller: Arc<JobLifecycleController>,
    batch_limit: usize,
    interval: Duration,
}

impl ReconcileSweeper {
    pub fn new(controller: Arc<JobLifecycleController>, interval: Duration) -> Self {
        Self {
            controller,
            batch_limit: DEFAULT_SWEEP_BATCH,
            interval,
        }
    }

    pub fn with_batch_limit(mut self, batch_limit: usize) -> Self {
        self.batch_limit = batch_limit;
        self
    }

    /// Run one pass. Per-job failures are counted, not propagated; the next
    /// pass retries whatever is still active.
    pub async fn sweep_once(&self) -> SweepReport {
        let mut report = SweepReport::default();

        let batch = match self.controller.jobs().list_active(self.batch_limit).await {
            Ok(batch) => batch,
            Err(e) => {
                warn!(error = %e, "sweep could not list active jobs");
                report.errors += 1;
                return report;
            }
        };

        report.scanned = batch.len();
        for job in batch {
            match self.controller.reconcile(job.id).await {
                Ok(view) if view.status.is_terminal() => {
                    if view.status == clipforge_jobs::JobStatus::Done {
                        report.done += 1;
                    } else {
                        report.failed += 1;
                    }
                }
                Ok(_) => report.still_active += 1,
                Err(e) => {
                    warn!(job_id = %job.id, error = %e, "sweep reconcile failed");
                    report.errors += 1;
                }
            }
        }
        report
    }

    /// Spawn the periodic loop on the current runtime.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(interval_secs = self.interval.as_secs(), batch = self.batch_limit, "reconcile sweeper started");
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let report = self.sweep_once().await;
                if report.scanned > 0 || report.errors > 0 {
                    info!(
                        scanned = report.scanned,
                        done = report.done,
                        failed = report.failed,
                        still_active = report.still_active,
                        errors = report.errors,
                        "sweep pass complete"
                    );
                }
            }
        })
    }
}
