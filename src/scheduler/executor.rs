//! Job execution seam.
//!
//! The scheduler never runs tests in-line; it hands the job to a
//! [`JobExecutor`]. Production uses [`HttpJobExecutor`], which calls back
//! into the droplet's own run endpoint so scheduled and manual runs share
//! one code path. Tests substitute a recording executor.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use super::ScheduledJob;

#[async_trait]
pub trait JobExecutor: Send + Sync {
    async fn execute(&self, job: &ScheduledJob) -> Result<()>;
}

/// Executes a job by POSTing to the droplet's `/api/tests/run` endpoint.
pub struct HttpJobExecutor {
    http: Client,
    app_url: String,
}

impl HttpJobExecutor {
    pub fn new(app_url: impl Into<String>) -> Self {
        Self {
            http: Client::builder()
                // Runs include real upstream calls; give them room.
                .timeout(Duration::from_secs(120))
                .user_agent(concat!("fluidprobe-scheduler/", env!("CARGO_PKG_VERSION")))
                .build()
                .expect("failed to build HTTP client"),
            app_url: app_url.into(),
        }
    }
}

#[async_trait]
impl JobExecutor for HttpJobExecutor {
    async fn execute(&self, job: &ScheduledJob) -> Result<()> {
        let url = format!("{}/api/tests/run", self.app_url.trim_end_matches('/'));
        let body = json!({
            "test_type": job.test_type,
            "company_id": job.company_id,
            "company_subdomain": job.company_subdomain,
            "auth_token": job.auth_token,
            "settings": job.settings,
        });

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("run request to {} failed", url))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("run endpoint returned {}: {}", status, text);
        }
        Ok(())
    }
}
