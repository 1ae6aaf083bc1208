//! Cron-driven sweep over the store's job records.
//!
//! This is the second, externally-triggered scheduling path: an outside
//! cron hits `GET /api/cron`, and every enabled record whose `next_run`
//! has passed is executed and restamped. It is deliberately not reconciled
//! with the in-process timer map (see DESIGN.md).

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use super::JobExecutor;
use crate::store::TestDataStore;

#[derive(Debug, Clone, Copy, Serialize)]
pub struct SweepReport {
    /// Job records inspected.
    pub swept: usize,
    /// Due jobs that executed successfully.
    pub executed: usize,
    /// Due jobs whose execution failed (restamped anyway).
    pub failed: usize,
}

/// Execute every enabled job record with `next_run <= now`, then stamp
/// `last_run` and recompute `next_run` whether or not the execution
/// succeeded.
pub async fn sweep_due_jobs(
    store: &TestDataStore,
    executor: &dyn JobExecutor,
    now: DateTime<Utc>,
) -> SweepReport {
    let jobs = store.all_jobs();
    let mut report = SweepReport {
        swept: jobs.len(),
        executed: 0,
        failed: 0,
    };

    for mut job in jobs {
        if !job.enabled || job.next_run > now {
            continue;
        }
        let key = job.key();
        info!(job = %key, next_run = %job.next_run, "sweep executing due job");
        match executor.execute(&job).await {
            Ok(()) => report.executed += 1,
            Err(err) => {
                report.failed += 1;
                warn!(job = %key, error = %err, "sweep execution failed; restamping anyway");
            }
        }
        job.last_run = Some(now);
        job.next_run = job.interval.next_run_after(now);
        store.upsert_job(job);
    }

    info!(
        swept = report.swept,
        executed = report.executed,
        failed = report.failed,
        "sweep complete"
    );
    report
}
