//! Email summary notifications.
//!
//! The droplet has no mail credentials: "sending" renders the templates
//! and emits a structured log line, and the rendered preview is echoed
//! back to the caller.

use anyhow::{Context, Result};
use askama::Template;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::runner::{TestResult, TestStatus};

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationRequest {
    pub to: String,
    pub subject: String,
    #[serde(default)]
    pub test_results: Vec<TestResult>,
    #[serde(default)]
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmailPreview {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
}

struct RunLine {
    test_type: String,
    status: String,
    duration_ms: u64,
    error: String,
}

#[derive(Template)]
#[template(path = "summary.html")]
struct SummaryHtml<'a> {
    subject: &'a str,
    summary: &'a str,
    total: usize,
    passed: usize,
    failed: usize,
    runs: &'a [RunLine],
}

#[derive(Template)]
#[template(path = "summary.txt")]
struct SummaryText<'a> {
    summary: &'a str,
    total: usize,
    passed: usize,
    failed: usize,
    runs: &'a [RunLine],
}

#[derive(Default)]
pub struct EmailNotifier;

impl EmailNotifier {
    pub fn new() -> Self {
        Self
    }

    /// Render the summary templates without sending.
    pub fn render(&self, request: &NotificationRequest) -> Result<EmailPreview> {
        let runs: Vec<RunLine> = request
            .test_results
            .iter()
            .map(|r| RunLine {
                test_type: r.test_type.to_string(),
                status: match r.status {
                    TestStatus::Passed => "passed".to_string(),
                    TestStatus::Failed => "failed".to_string(),
                    TestStatus::Running => "running".to_string(),
                },
                duration_ms: r.duration_ms,
                error: r.error.clone().unwrap_or_default(),
            })
            .collect();
        let passed = request
            .test_results
            .iter()
            .filter(|r| r.status == TestStatus::Passed)
            .count();
        let failed = request
            .test_results
            .iter()
            .filter(|r| r.status == TestStatus::Failed)
            .count();
        let summary = request.summary.clone().unwrap_or_default();

        let html = SummaryHtml {
            subject: &request.subject,
            summary: &summary,
            total: request.test_results.len(),
            passed,
            failed,
            runs: &runs,
        }
        .render()
        .context("failed to render HTML summary")?;

        let text = SummaryText {
            summary: &summary,
            total: request.test_results.len(),
            passed,
            failed,
            runs: &runs,
        }
        .render()
        .context("failed to render text summary")?;

        Ok(EmailPreview {
            to: request.to.clone(),
            subject: request.subject.clone(),
            html,
            text,
        })
    }

    /// Render and "send" (log). Returns the preview for the API echo.
    pub fn send(&self, request: &NotificationRequest) -> Result<EmailPreview> {
        let preview = self.render(request)?;
        info!(
            to = %preview.to,
            subject = %preview.subject,
            runs = request.test_results.len(),
            "test summary email (log-only delivery)"
        );
        Ok(preview)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::TestType;
    use chrono::Utc;
    use serde_json::Map;
    use uuid::Uuid;

    fn sample_result(status: TestStatus, error: Option<&str>) -> TestResult {
        TestResult {
            id: Uuid::new_v4(),
            test_type: TestType::CustomerAuth,
            status,
            started_at: Utc::now(),
            finished_at: Some(Utc::now()),
            duration_ms: 1234,
            steps: Vec::new(),
            error: error.map(str::to_string),
            metadata: Map::new(),
        }
    }

    #[test]
    fn render_includes_counts_and_failures() {
        let notifier = EmailNotifier::new();
        let request = NotificationRequest {
            to: "qa@example.com".to_string(),
            subject: "Nightly synthetic tests".to_string(),
            test_results: vec![
                sample_result(TestStatus::Passed, None),
                sample_result(TestStatus::Failed, Some("timeout")),
            ],
            summary: Some("1 of 2 passed".to_string()),
        };
        let preview = notifier.render(&request).unwrap();
        assert_eq!(preview.to, "qa@example.com");
        assert!(preview.html.contains("Nightly synthetic tests"));
        assert!(preview.html.contains("timeout"));
        assert!(preview.text.contains("customer-auth"));
        assert!(preview.text.contains("1 of 2 passed"));
        assert!(preview.text.contains("passed: 1"));
        assert!(preview.text.contains("failed: 1"));
    }

    #[test]
    fn render_handles_empty_result_list() {
        let notifier = EmailNotifier::new();
        let request = NotificationRequest {
            to: "qa@example.com".to_string(),
            subject: "Empty".to_string(),
            test_results: Vec::new(),
            summary: None,
        };
        let preview = notifier.render(&request).unwrap();
        assert!(preview.text.contains("total: 0"));
    }
}
