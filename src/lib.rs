//! fluidprobe -- synthetic end-to-end commerce testing droplet for the
//! Fluid platform.
//!
//! This crate provides the test runner, the in-process scheduler, the
//! Fluid API client, in-memory result storage, derived analytics, and the
//! HTTP API that ties them together.

pub mod analytics;
pub mod api;
pub mod config;
pub mod fluid;
pub mod notify;
pub mod runner;
pub mod scheduler;
pub mod store;

use std::sync::Arc;

use anyhow::Result;

use crate::api::AppState;
use crate::config::DropletConfig;
use crate::notify::EmailNotifier;
use crate::scheduler::{HttpJobExecutor, JobExecutor, TestScheduler};
use crate::store::TestDataStore;

/// Start the fluidprobe droplet: API server plus scheduler.
pub async fn serve(config: DropletConfig) -> Result<()> {
    let config = Arc::new(config);
    let store = Arc::new(TestDataStore::new(config.result_history_limit));
    let executor: Arc<dyn JobExecutor> = Arc::new(HttpJobExecutor::new(config.app_url.clone()));
    let scheduler = TestScheduler::new(executor.clone());
    let notifier = Arc::new(EmailNotifier::new());

    let state = AppState {
        config: config.clone(),
        store,
        scheduler: scheduler.clone(),
        notifier,
        executor,
    };

    let addr: std::net::SocketAddr = config.bind.parse()?;
    let app = api::router(state);

    tracing::info!(%addr, "fluidprobe listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(scheduler))
        .await?;

    Ok(())
}

async fn shutdown_signal(scheduler: TestScheduler) {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown requested; cancelling scheduled jobs");
    scheduler.shutdown();
}
