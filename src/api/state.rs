//! Shared application state threaded through every handler.

use std::sync::Arc;

use crate::config::DropletConfig;
use crate::notify::EmailNotifier;
use crate::scheduler::{JobExecutor, TestScheduler};
use crate::store::TestDataStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<DropletConfig>,
    pub store: Arc<TestDataStore>,
    pub scheduler: TestScheduler,
    pub notifier: Arc<EmailNotifier>,
    pub executor: Arc<dyn JobExecutor>,
}
