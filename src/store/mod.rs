//! In-memory data store -- per-company results, configs, and job records.
//!
//! Deliberately volatile: nothing survives a process restart. Individual
//! map operations are effectively atomic behind their locks; multi-step
//! read-then-write sequences are not transactional, which is acceptable in
//! the droplet's single-process deployment.

use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::runner::{TestResult, TestType};
use crate::scheduler::{JobKey, ScheduleInterval, ScheduledJob};

/// Test-specific product-selection settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestSettings {
    /// Random choice among these; empty means "first available in catalog".
    #[serde(default)]
    pub product_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_type: Option<String>,
}

/// Per-company, per-test-type settings. Created with defaults on first
/// read; mutated via save; never deleted, only disabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestConfig {
    pub id: TestType,
    pub enabled: bool,
    pub schedule: ScheduleInterval,
    #[serde(default)]
    pub settings: TestSettings,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
}

impl TestConfig {
    pub fn default_for(test_type: TestType) -> Self {
        Self {
            id: test_type,
            enabled: false,
            schedule: ScheduleInterval::Daily,
            settings: TestSettings::default(),
            last_run: None,
            next_run: None,
        }
    }
}

pub struct TestDataStore {
    result_limit: usize,
    results: RwLock<HashMap<String, VecDeque<TestResult>>>,
    configs: RwLock<HashMap<String, Vec<TestConfig>>>,
    jobs: RwLock<HashMap<JobKey, ScheduledJob>>,
}

impl TestDataStore {
    pub fn new(result_limit: usize) -> Self {
        Self {
            result_limit: result_limit.max(1),
            results: RwLock::new(HashMap::new()),
            configs: RwLock::new(HashMap::new()),
            jobs: RwLock::new(HashMap::new()),
        }
    }

    /// Prepend a result for the company, evicting the oldest past the
    /// bound.
    pub fn push_result(&self, company_id: &str, result: TestResult) {
        let mut results = self.results.write().expect("store lock poisoned");
        let list = results.entry(company_id.to_string()).or_default();
        list.push_front(result);
        while list.len() > self.result_limit {
            list.pop_back();
        }
    }

    /// Newest-first results, optionally truncated.
    pub fn results(&self, company_id: &str, limit: Option<usize>) -> Vec<TestResult> {
        let results = self.results.read().expect("store lock poisoned");
        let list = match results.get(company_id) {
            Some(list) => list,
            None => return Vec::new(),
        };
        let take = limit.unwrap_or(list.len());
        list.iter().take(take).cloned().collect()
    }

    /// Stored configs for a company; the five defaults are seeded on first
    /// access.
    pub fn configs(&self, company_id: &str) -> Vec<TestConfig> {
        let mut configs = self.configs.write().expect("store lock poisoned");
        configs
            .entry(company_id.to_string())
            .or_insert_with(|| TestType::all().map(TestConfig::default_for).to_vec())
            .clone()
    }

    /// Upsert one config by test type.
    pub fn save_config(&self, company_id: &str, config: TestConfig) {
        let mut configs = self.configs.write().expect("store lock poisoned");
        let list = configs
            .entry(company_id.to_string())
            .or_insert_with(|| TestType::all().map(TestConfig::default_for).to_vec());
        match list.iter_mut().find(|c| c.id == config.id) {
            Some(existing) => *existing = config,
            None => list.push(config),
        }
    }

    pub fn upsert_job(&self, job: ScheduledJob) {
        let mut jobs = self.jobs.write().expect("store lock poisoned");
        jobs.insert(job.key(), job);
    }

    pub fn job(&self, key: &JobKey) -> Option<ScheduledJob> {
        self.jobs
            .read()
            .expect("store lock poisoned")
            .get(key)
            .cloned()
    }

    pub fn remove_job(&self, key: &JobKey) -> bool {
        self.jobs
            .write()
            .expect("store lock poisoned")
            .remove(key)
            .is_some()
    }

    pub fn jobs_for_company(&self, company_id: &str) -> Vec<ScheduledJob> {
        let jobs = self.jobs.read().expect("store lock poisoned");
        let mut list: Vec<ScheduledJob> = jobs
            .values()
            .filter(|j| j.company_id == company_id)
            .cloned()
            .collect();
        list.sort_by_key(|j| j.next_run);
        list
    }

    pub fn all_jobs(&self) -> Vec<ScheduledJob> {
        self.jobs
            .read()
            .expect("store lock poisoned")
            .values()
            .cloned()
            .collect()
    }
}
