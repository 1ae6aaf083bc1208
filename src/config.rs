//! Droplet configuration: TOML file with environment overrides.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Environment variables applied after the file is loaded.
const ENV_CRON_SECRET: &str = "CRON_SECRET";
const ENV_APP_URL: &str = "FLUIDPROBE_APP_URL";
const ENV_BIND: &str = "FLUIDPROBE_BIND";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DropletConfig {
    /// API bind address.
    pub bind: String,
    /// Base URL the scheduler uses to call back into this process.
    pub app_url: String,
    /// Bearer secret gating `GET /api/cron`. Unset disables the sweep
    /// endpoint entirely.
    pub cron_secret: Option<String>,
    /// Refund/auth gateways: simulated (default) or real HTTP.
    pub simulate_gateways: bool,
    /// Bounded per-company result history.
    pub result_history_limit: usize,
}

impl Default for DropletConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
            app_url: "http://127.0.0.1:8080".to_string(),
            cron_secret: None,
            simulate_gateways: true,
            result_history_limit: 1000,
        }
    }
}

impl DropletConfig {
    /// Load from a TOML file if it exists, apply env overrides, validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) if p.exists() => {
                let raw = std::fs::read_to_string(p)
                    .with_context(|| format!("failed to read config file {}", p.display()))?;
                toml::from_str(&raw)
                    .with_context(|| format!("failed to parse config file {}", p.display()))?
            }
            _ => Self::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(secret) = std::env::var(ENV_CRON_SECRET) {
            if !secret.is_empty() {
                self.cron_secret = Some(secret);
            }
        }
        if let Ok(url) = std::env::var(ENV_APP_URL) {
            if !url.is_empty() {
                self.app_url = url;
            }
        }
        if let Ok(bind) = std::env::var(ENV_BIND) {
            if !bind.is_empty() {
                self.bind = bind;
            }
        }
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.result_history_limit >= 1,
            "result_history_limit must be at least 1"
        );
        Ok(())
    }
}
