//! In-process recurring test execution.
//!
//! One scheduler instance is constructed at process start and shared by
//! reference through the API state; `shutdown()` cancels every timer.
//! State is entirely volatile -- a restart drops all jobs, which is a
//! documented property of the droplet, not a bug.

pub mod executor;
pub mod sweep;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::runner::TestType;
use crate::store::TestSettings;

pub use executor::{HttpJobExecutor, JobExecutor};

/// Fixed recurrence options. Pure offset arithmetic: no jitter, no drift
/// correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScheduleInterval {
    #[serde(rename = "every-30-minutes")]
    Every30Minutes,
    #[serde(rename = "hourly")]
    Hourly,
    #[serde(rename = "daily")]
    Daily,
    #[serde(rename = "every-2-days")]
    Every2Days,
}

impl ScheduleInterval {
    pub fn period(&self) -> chrono::Duration {
        match self {
            ScheduleInterval::Every30Minutes => chrono::Duration::minutes(30),
            ScheduleInterval::Hourly => chrono::Duration::hours(1),
            ScheduleInterval::Daily => chrono::Duration::days(1),
            ScheduleInterval::Every2Days => chrono::Duration::days(2),
        }
    }

    /// Next firing time: a fixed offset from `from`.
    pub fn next_run_after(&self, from: DateTime<Utc>) -> DateTime<Utc> {
        from + self.period()
    }
}

impl std::fmt::Display for ScheduleInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ScheduleInterval::Every30Minutes => "every-30-minutes",
            ScheduleInterval::Hourly => "hourly",
            ScheduleInterval::Daily => "daily",
            ScheduleInterval::Every2Days => "every-2-days",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for ScheduleInterval {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "every-30-minutes" => Ok(ScheduleInterval::Every30Minutes),
            "hourly" => Ok(ScheduleInterval::Hourly),
            "daily" => Ok(ScheduleInterval::Daily),
            "every-2-days" => Ok(ScheduleInterval::Every2Days),
            other => anyhow::bail!(
                "unknown interval '{}' (expected one of: every-30-minutes, hourly, daily, every-2-days)",
                other
            ),
        }
    }
}

/// Partition key for scheduling: at most one live timer per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobKey {
    pub company_id: String,
    pub test_type: TestType,
}

impl std::fmt::Display for JobKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.company_id, self.test_type)
    }
}

/// One recurring job. Doubles as the swept store record; the live timer
/// handle is tracked separately inside the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub company_id: String,
    pub test_type: TestType,
    pub company_subdomain: String,
    pub interval: ScheduleInterval,
    pub enabled: bool,
    /// Never echoed in API responses. No refresh path exists: a token that
    /// expires between scheduling and firing fails the run.
    #[serde(default, skip_serializing)]
    pub auth_token: String,
    #[serde(default)]
    pub settings: TestSettings,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: DateTime<Utc>,
}

impl ScheduledJob {
    pub fn key(&self) -> JobKey {
        JobKey {
            company_id: self.company_id.clone(),
            test_type: self.test_type,
        }
    }
}

#[derive(Default)]
struct SchedulerInner {
    jobs: HashMap<JobKey, ScheduledJob>,
    timers: HashMap<JobKey, JoinHandle<()>>,
}

/// Recurring execution of enabled tests without an external scheduler
/// process.
#[derive(Clone)]
pub struct TestScheduler {
    inner: Arc<Mutex<SchedulerInner>>,
    executor: Arc<dyn JobExecutor>,
}

impl TestScheduler {
    pub fn new(executor: Arc<dyn JobExecutor>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SchedulerInner::default())),
            executor,
        }
    }

    /// Schedule (or reschedule) a job. Any prior timer for the key is
    /// cleared first so at most one timer is armed per key. Returns the
    /// stored job with its computed `next_run`.
    pub fn schedule(&self, mut job: ScheduledJob) -> ScheduledJob {
        let key = job.key();
        job.enabled = true;
        job.next_run = job.interval.next_run_after(Utc::now());

        let mut inner = self.inner.lock().expect("scheduler lock poisoned");
        if let Some(existing) = inner.timers.remove(&key) {
            existing.abort();
        }
        inner.jobs.insert(key.clone(), job.clone());

        let handle = tokio::spawn(job_loop(
            self.inner.clone(),
            self.executor.clone(),
            key.clone(),
        ));
        inner.timers.insert(key.clone(), handle);
        info!(job = %key, interval = %job.interval, next_run = %job.next_run, "job scheduled");
        job
    }

    /// Cancel a job. The timer is aborted before the map entry is removed,
    /// so a fired timer can never race a cancel-initiated removal.
    pub fn cancel(&self, key: &JobKey) -> bool {
        let mut inner = self.inner.lock().expect("scheduler lock poisoned");
        if let Some(handle) = inner.timers.remove(key) {
            handle.abort();
        }
        let removed = inner.jobs.remove(key).is_some();
        if removed {
            info!(job = %key, "job cancelled");
        }
        removed
    }

    pub fn job(&self, key: &JobKey) -> Option<ScheduledJob> {
        self.inner
            .lock()
            .expect("scheduler lock poisoned")
            .jobs
            .get(key)
            .cloned()
    }

    pub fn jobs_for_company(&self, company_id: &str) -> Vec<ScheduledJob> {
        let inner = self.inner.lock().expect("scheduler lock poisoned");
        let mut jobs: Vec<ScheduledJob> = inner
            .jobs
            .values()
            .filter(|j| j.company_id == company_id)
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.next_run);
        jobs
    }

    /// Cancel every timer and drop all jobs. Called on process shutdown.
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock().expect("scheduler lock poisoned");
        for (_, handle) in inner.timers.drain() {
            handle.abort();
        }
        let dropped = inner.jobs.len();
        inner.jobs.clear();
        info!(jobs = dropped, "scheduler shut down");
    }
}

/// Timer loop for one job: sleep until `next_run`, execute, restamp, and
/// re-arm -- whether or not the execution succeeded. Exits when the job is
/// removed or disabled.
async fn job_loop(inner: Arc<Mutex<SchedulerInner>>, executor: Arc<dyn JobExecutor>, key: JobKey) {
    loop {
        let next_run = {
            let inner = inner.lock().expect("scheduler lock poisoned");
            match inner.jobs.get(&key) {
                Some(job) if job.enabled => job.next_run,
                _ => return,
            }
        };

        let delay = (next_run - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        tokio::time::sleep(delay).await;

        // Re-read after the sleep: the job may have been replaced or
        // disabled while we slept.
        let job = {
            let inner = inner.lock().expect("scheduler lock poisoned");
            match inner.jobs.get(&key) {
                Some(job) if job.enabled => job.clone(),
                _ => return,
            }
        };

        info!(job = %key, "scheduled run firing");
        if let Err(err) = executor.execute(&job).await {
            // No backoff and no retry cap: the next firing is the retry.
            warn!(job = %key, error = %err, "scheduled run failed; keeping schedule");
        }

        let now = Utc::now();
        let mut inner = inner.lock().expect("scheduler lock poisoned");
        match inner.jobs.get_mut(&key) {
            Some(job) if job.enabled => {
                job.last_run = Some(now);
                job.next_run = job.interval.next_run_after(now);
            }
            _ => return,
        }
    }
}
