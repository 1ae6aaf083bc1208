//! Timing-sensitive scheduler properties, run under tokio's paused clock.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;

use fluidprobe::runner::TestType;
use fluidprobe::scheduler::{
    sweep, JobExecutor, JobKey, ScheduleInterval, ScheduledJob, TestScheduler,
};
use fluidprobe::store::{TestDataStore, TestSettings};

/// Records every executed job key instead of running anything.
#[derive(Default)]
struct RecordingExecutor {
    runs: Mutex<Vec<JobKey>>,
}

impl RecordingExecutor {
    fn count(&self) -> usize {
        self.runs.lock().unwrap().len()
    }
}

#[async_trait]
impl JobExecutor for RecordingExecutor {
    async fn execute(&self, job: &ScheduledJob) -> Result<()> {
        self.runs.lock().unwrap().push(job.key());
        Ok(())
    }
}

/// Always errors, to verify that failures keep the schedule alive.
struct FailingExecutor;

#[async_trait]
impl JobExecutor for FailingExecutor {
    async fn execute(&self, _job: &ScheduledJob) -> Result<()> {
        anyhow::bail!("run endpoint unreachable")
    }
}

fn job(company: &str, test_type: TestType, interval: ScheduleInterval) -> ScheduledJob {
    ScheduledJob {
        company_id: company.to_string(),
        test_type,
        company_subdomain: "acme".to_string(),
        interval,
        enabled: true,
        auth_token: "tok".to_string(),
        settings: TestSettings::default(),
        last_run: None,
        next_run: Utc::now(),
    }
}

#[tokio::test(start_paused = true)]
async fn cancel_before_fire_never_executes() {
    let executor = Arc::new(RecordingExecutor::default());
    let scheduler = TestScheduler::new(executor.clone());

    let scheduled = scheduler.schedule(job("c1", TestType::Enrollment, ScheduleInterval::Every30Minutes));
    assert!(scheduler.cancel(&scheduled.key()));

    tokio::time::sleep(Duration::from_secs(2 * 60 * 60)).await;
    assert_eq!(executor.count(), 0);
    assert!(scheduler.job(&scheduled.key()).is_none());
}

#[tokio::test(start_paused = true)]
async fn scheduling_twice_replaces_rather_than_duplicates() {
    let executor = Arc::new(RecordingExecutor::default());
    let scheduler = TestScheduler::new(executor.clone());

    let j = job("c1", TestType::CustomerAuth, ScheduleInterval::Hourly);
    scheduler.schedule(j.clone());
    scheduler.schedule(j.clone());

    assert_eq!(scheduler.jobs_for_company("c1").len(), 1);

    // One armed timer -> exactly one fire within the first interval.
    tokio::time::sleep(Duration::from_secs(61 * 60)).await;
    assert_eq!(executor.count(), 1);
}

#[tokio::test(start_paused = true)]
async fn job_rearms_after_each_fire() {
    let executor = Arc::new(RecordingExecutor::default());
    let scheduler = TestScheduler::new(executor.clone());

    scheduler.schedule(job("c1", TestType::RefundFlow, ScheduleInterval::Every30Minutes));

    tokio::time::sleep(Duration::from_secs(65 * 60)).await;
    assert_eq!(executor.count(), 2);

    let stored = scheduler
        .job(&JobKey {
            company_id: "c1".to_string(),
            test_type: TestType::RefundFlow,
        })
        .unwrap();
    assert!(stored.last_run.is_some());
}

#[tokio::test(start_paused = true)]
async fn failed_execution_keeps_the_schedule() {
    let scheduler = TestScheduler::new(Arc::new(FailingExecutor));

    let scheduled = scheduler.schedule(job("c1", TestType::Enrollment, ScheduleInterval::Every30Minutes));
    tokio::time::sleep(Duration::from_secs(35 * 60)).await;

    // Still present, restamped, ready to fire again.
    let stored = scheduler.job(&scheduled.key()).unwrap();
    assert!(stored.last_run.is_some());
    assert!(stored.next_run > Utc::now());
}

#[tokio::test(start_paused = true)]
async fn shutdown_cancels_every_timer() {
    let executor = Arc::new(RecordingExecutor::default());
    let scheduler = TestScheduler::new(executor.clone());

    scheduler.schedule(job("c1", TestType::Enrollment, ScheduleInterval::Every30Minutes));
    scheduler.schedule(job("c2", TestType::CustomerAuth, ScheduleInterval::Every30Minutes));
    scheduler.shutdown();

    tokio::time::sleep(Duration::from_secs(2 * 60 * 60)).await;
    assert_eq!(executor.count(), 0);
    assert!(scheduler.jobs_for_company("c1").is_empty());
}

#[tokio::test]
async fn sweep_executes_only_due_enabled_jobs() {
    let store = TestDataStore::new(100);
    let executor = RecordingExecutor::default();
    let now = Utc::now();

    let mut due = job("c1", TestType::Enrollment, ScheduleInterval::Hourly);
    due.next_run = now - chrono::Duration::minutes(5);
    store.upsert_job(due.clone());

    let mut not_due = job("c1", TestType::RefundFlow, ScheduleInterval::Hourly);
    not_due.next_run = now + chrono::Duration::hours(1);
    store.upsert_job(not_due);

    let mut disabled = job("c1", TestType::CustomerAuth, ScheduleInterval::Hourly);
    disabled.enabled = false;
    disabled.next_run = now - chrono::Duration::hours(5);
    store.upsert_job(disabled);

    let report = sweep::sweep_due_jobs(&store, &executor, now).await;
    assert_eq!(report.swept, 3);
    assert_eq!(report.executed, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(executor.count(), 1);

    // The due job was restamped one interval ahead.
    let restamped = store.job(&due.key()).unwrap();
    assert_eq!(restamped.last_run, Some(now));
    assert_eq!(restamped.next_run, ScheduleInterval::Hourly.next_run_after(now));
}

#[tokio::test]
async fn sweep_restamps_failed_jobs_too() {
    let store = TestDataStore::new(100);
    let now = Utc::now();

    let mut due = job("c1", TestType::Enrollment, ScheduleInterval::Daily);
    due.next_run = now - chrono::Duration::minutes(1);
    store.upsert_job(due.clone());

    let report = sweep::sweep_due_jobs(&store, &FailingExecutor, now).await;
    assert_eq!(report.executed, 0);
    assert_eq!(report.failed, 1);

    let restamped = store.job(&due.key()).unwrap();
    assert_eq!(restamped.next_run, ScheduleInterval::Daily.next_run_after(now));
}
