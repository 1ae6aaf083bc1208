//! Test execution engine -- scenarios, step recording, result assembly.

mod scenarios;

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::fluid::gateway::{AuthGateway, RefundGateway};
use crate::fluid::CommerceApi;
use crate::store::TestSettings;

/// The five synthetic test scenarios the droplet can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TestType {
    #[serde(rename = "product-purchase")]
    ProductPurchase,
    #[serde(rename = "subscription-purchase")]
    SubscriptionPurchase,
    #[serde(rename = "enrollment")]
    Enrollment,
    #[serde(rename = "refund-flow")]
    RefundFlow,
    #[serde(rename = "customer-auth")]
    CustomerAuth,
}

impl TestType {
    pub fn all() -> [TestType; 5] {
        [
            TestType::ProductPurchase,
            TestType::SubscriptionPurchase,
            TestType::Enrollment,
            TestType::RefundFlow,
            TestType::CustomerAuth,
        ]
    }

    /// Nominal step count for the scenario. Product purchase downgrades to
    /// three steps when no storefront SDK is reachable.
    pub fn step_count(&self) -> usize {
        match self {
            TestType::ProductPurchase => 4,
            TestType::SubscriptionPurchase | TestType::Enrollment => 5,
            TestType::RefundFlow | TestType::CustomerAuth => 4,
        }
    }
}

impl std::fmt::Display for TestType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TestType::ProductPurchase => "product-purchase",
            TestType::SubscriptionPurchase => "subscription-purchase",
            TestType::Enrollment => "enrollment",
            TestType::RefundFlow => "refund-flow",
            TestType::CustomerAuth => "customer-auth",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for TestType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "product-purchase" => Ok(TestType::ProductPurchase),
            "subscription-purchase" => Ok(TestType::SubscriptionPurchase),
            "enrollment" => Ok(TestType::Enrollment),
            "refund-flow" => Ok(TestType::RefundFlow),
            "customer-auth" => Ok(TestType::CustomerAuth),
            other => anyhow::bail!(
                "unknown test type '{}' (expected one of: product-purchase, \
                 subscription-purchase, enrollment, refund-flow, customer-auth)",
                other
            ),
        }
    }
}

/// Terminal state of a whole run. Transitions only `running -> passed`
/// or `running -> failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Running,
    Passed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Passed,
    Failed,
    Skipped,
}

/// One unit of work inside a run. Immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestStep {
    pub name: String,
    pub status: StepStatus,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// One execution record, fully populated at run end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub id: Uuid,
    pub test_type: TestType,
    pub status: TestStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: u64,
    pub steps: Vec<TestStep>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

/// Progress hook: `(step_name, current_step, total_steps)`, 1-based.
pub type ProgressFn = Arc<dyn Fn(&str, usize, usize) + Send + Sync>;

/// Collects the append-only step list for one run and drives the
/// progress callback.
pub(crate) struct RunRecorder {
    steps: Vec<TestStep>,
    total: usize,
    progress: Option<ProgressFn>,
}

impl RunRecorder {
    fn new(total: usize, progress: Option<ProgressFn>) -> Self {
        Self {
            steps: Vec::new(),
            total,
            progress,
        }
    }

    /// Scenario step totals are fixed, except product purchase which is
    /// only known after SDK detection.
    pub(crate) fn set_total(&mut self, total: usize) {
        self.total = total;
    }

    fn notify(&self, name: &str) {
        if let Some(cb) = &self.progress {
            cb(name, self.steps.len() + 1, self.total);
        }
    }

    /// Execute one fatal step: measure wall-clock time, record the outcome,
    /// and propagate the error so the scenario aborts.
    pub(crate) async fn step<T, F>(&mut self, name: &str, fut: F) -> Result<T>
    where
        T: Serialize,
        F: Future<Output = Result<T>>,
    {
        self.notify(name);
        let started = Instant::now();
        match fut.await {
            Ok(value) => {
                self.steps.push(TestStep {
                    name: name.to_string(),
                    status: StepStatus::Passed,
                    duration_ms: started.elapsed().as_millis() as u64,
                    error: None,
                    details: serde_json::to_value(&value).ok(),
                });
                Ok(value)
            }
            Err(err) => {
                self.steps.push(TestStep {
                    name: name.to_string(),
                    status: StepStatus::Failed,
                    duration_ms: started.elapsed().as_millis() as u64,
                    error: Some(err.to_string()),
                    details: Some(diagnostic_payload(&err)),
                });
                Err(err)
            }
        }
    }

    /// Execute a best-effort step: a failure is warn-logged and recorded as
    /// `skipped`, and the run continues.
    pub(crate) async fn step_best_effort<T, F>(&mut self, name: &str, fut: F)
    where
        T: Serialize,
        F: Future<Output = Result<T>>,
    {
        self.notify(name);
        let started = Instant::now();
        match fut.await {
            Ok(value) => {
                self.steps.push(TestStep {
                    name: name.to_string(),
                    status: StepStatus::Passed,
                    duration_ms: started.elapsed().as_millis() as u64,
                    error: None,
                    details: serde_json::to_value(&value).ok(),
                });
            }
            Err(err) => {
                warn!(step = %name, error = %err, "best-effort step failed; continuing run");
                self.steps.push(TestStep {
                    name: name.to_string(),
                    status: StepStatus::Skipped,
                    duration_ms: started.elapsed().as_millis() as u64,
                    error: Some(err.to_string()),
                    details: Some(diagnostic_payload(&err)),
                });
            }
        }
    }

    /// Record an already-measured step that cannot fail (SDK detection).
    pub(crate) fn record_passed(&mut self, name: &str, duration_ms: u64, details: Value) {
        self.notify(name);
        self.steps.push(TestStep {
            name: name.to_string(),
            status: StepStatus::Passed,
            duration_ms,
            error: None,
            details: Some(details),
        });
    }

    fn into_steps(self) -> Vec<TestStep> {
        self.steps
    }
}

/// Serialize an error and its source chain into a step diagnostic payload.
fn diagnostic_payload(err: &anyhow::Error) -> Value {
    let chain: Vec<String> = err.chain().skip(1).map(|c| c.to_string()).collect();
    json!({
        "message": err.to_string(),
        "chain": chain,
    })
}

/// Executes one of the five scenarios as an ordered list of named steps,
/// threading output of each step into later steps.
pub struct TestRunner {
    pub(crate) api: Arc<dyn CommerceApi>,
    pub(crate) refunds: Arc<dyn RefundGateway>,
    pub(crate) auth: Arc<dyn AuthGateway>,
    pub(crate) settings: TestSettings,
    pub(crate) company_subdomain: String,
    progress: Option<ProgressFn>,
}

impl TestRunner {
    pub fn new(
        api: Arc<dyn CommerceApi>,
        refunds: Arc<dyn RefundGateway>,
        auth: Arc<dyn AuthGateway>,
        settings: TestSettings,
        company_subdomain: impl Into<String>,
    ) -> Self {
        Self {
            api,
            refunds,
            auth,
            settings,
            company_subdomain: company_subdomain.into(),
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Run one scenario to completion. Never errors: failures land in the
    /// result (`status: failed`, `error` = the failing step's message, steps
    /// after the failure are not executed).
    pub async fn run_test(&self, test_type: TestType) -> TestResult {
        let id = Uuid::new_v4();
        let started_at = Utc::now();
        let started = Instant::now();
        info!(run = %id, test = %test_type, company = %self.company_subdomain, "starting test run");

        let mut recorder = RunRecorder::new(test_type.step_count(), self.progress.clone());
        let mut metadata = Map::new();
        metadata.insert(
            "company_subdomain".to_string(),
            Value::String(self.company_subdomain.clone()),
        );

        let outcome = match test_type {
            TestType::ProductPurchase => {
                self.product_purchase(&mut recorder, &mut metadata).await
            }
            TestType::SubscriptionPurchase => {
                self.checkout_flow(&mut recorder, &mut metadata, scenarios::CatalogSource::Tenant)
                    .await
            }
            TestType::Enrollment => {
                self.checkout_flow(
                    &mut recorder,
                    &mut metadata,
                    scenarios::CatalogSource::Enrollment,
                )
                .await
            }
            TestType::RefundFlow => self.refund_flow(&mut recorder).await,
            TestType::CustomerAuth => self.customer_auth(&mut recorder).await,
        };

        let (status, error) = match outcome {
            Ok(()) => (TestStatus::Passed, None),
            Err(err) => {
                warn!(run = %id, test = %test_type, error = %err, "test run failed");
                (TestStatus::Failed, Some(err.to_string()))
            }
        };

        let result = TestResult {
            id,
            test_type,
            status,
            started_at,
            finished_at: Some(Utc::now()),
            duration_ms: started.elapsed().as_millis() as u64,
            steps: recorder.into_steps(),
            error,
            metadata,
        };
        info!(
            run = %id,
            test = %test_type,
            status = ?result.status,
            steps = result.steps.len(),
            duration_ms = result.duration_ms,
            "test run finished"
        );
        result
    }
}
