use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use fluidprobe::config::DropletConfig;
use fluidprobe::fluid::gateway::{SimulatedAuthGateway, SimulatedRefundGateway};
use fluidprobe::fluid::FluidApiClient;
use fluidprobe::runner::{ProgressFn, StepStatus, TestRunner, TestType};
use fluidprobe::store::TestSettings;

#[derive(Parser)]
#[command(
    name = "fluidprobe",
    about = "Synthetic end-to-end commerce testing droplet for the Fluid platform",
    version,
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the droplet (API server + scheduler)
    Serve {
        /// Bind address (overrides config file)
        #[arg(long)]
        bind: Option<String>,

        /// Path to a TOML config file
        #[arg(long, default_value = "fluidprobe.toml")]
        config: PathBuf,
    },

    /// Run one synthetic test immediately from the terminal
    Run {
        /// Test type (product-purchase, subscription-purchase, enrollment,
        /// refund-flow, customer-auth)
        #[arg(long)]
        test: String,

        /// Company subdomain (tenant identifier)
        #[arg(long)]
        company: String,

        /// Bearer token for the tenant API
        #[arg(long, default_value = "")]
        token: String,

        /// Product IDs to choose among (repeatable)
        #[arg(long = "product-id")]
        product_ids: Vec<String>,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Manage scheduled tests on a running droplet
    Schedule {
        #[command(subcommand)]
        action: ScheduleAction,
    },
}

#[derive(Subcommand)]
enum ScheduleAction {
    /// List scheduled jobs for a company
    List {
        /// Droplet base URL
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        server: String,

        /// Company identifier
        #[arg(long)]
        company: String,
    },

    /// Add or replace a schedule
    Add {
        /// Droplet base URL
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        server: String,

        /// Company identifier
        #[arg(long)]
        company: String,

        /// Company subdomain (tenant identifier)
        #[arg(long)]
        subdomain: String,

        /// Test type to run
        #[arg(long)]
        test: String,

        /// Interval (every-30-minutes, hourly, daily, every-2-days)
        #[arg(long, default_value = "daily")]
        interval: String,

        /// Bearer token for the tenant API
        #[arg(long, default_value = "")]
        token: String,
    },

    /// Cancel a schedule
    Remove {
        /// Droplet base URL
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        server: String,

        /// Company identifier
        #[arg(long)]
        company: String,

        /// Test type to cancel
        #[arg(long)]
        test: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { bind, config } => {
            let mut config = DropletConfig::load(Some(config.as_path()))?;
            if let Some(bind) = bind {
                config.bind = bind;
            }
            tracing::info!(bind = %config.bind, "starting fluidprobe droplet");
            fluidprobe::serve(config).await?;
        }
        Commands::Run {
            test,
            company,
            token,
            product_ids,
            json,
        } => {
            let test_type: TestType = test.parse()?;
            let settings = TestSettings {
                product_ids,
                product_type: None,
            };
            let client = Arc::new(FluidApiClient::new(&company, &token));
            let runner = TestRunner::new(
                client,
                Arc::new(SimulatedRefundGateway),
                Arc::new(SimulatedAuthGateway),
                settings,
                company.clone(),
            );

            let runner = if json {
                runner
            } else {
                let progress: ProgressFn = Arc::new(|name, current, total| {
                    println!("[{}/{}] {}...", current, total, name);
                });
                runner.with_progress(progress)
            };

            let result = runner.run_test(test_type).await;

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("\nfluidprobe Synthetic Test Report");
                println!("Test:     {}", result.test_type);
                println!("Company:  {}", company);
                println!("Status:   {:?}", result.status);
                println!("Duration: {} ms", result.duration_ms);
                println!();
                println!("{:<32} | {:<8} | Duration", "Step", "Status");
                println!("{:-<32}-|-{:-<8}-|-{:-<12}", "", "", "");
                for step in &result.steps {
                    let status = match step.status {
                        StepStatus::Passed => "PASS",
                        StepStatus::Failed => "FAIL",
                        StepStatus::Skipped => "SKIP",
                    };
                    println!("{:<32} | {:<8} | {} ms", step.name, status, step.duration_ms);
                    if let Some(err) = &step.error {
                        println!("{:<32} | {:<8} |   -> {}", "", "", err);
                    }
                }
                if let Some(error) = &result.error {
                    println!("\nRun failed: {}", error);
                }
                println!();
            }
        }
        Commands::Schedule { action } => match action {
            ScheduleAction::List { server, company } => {
                let url = format!(
                    "{}/api/tests/schedule?company_id={}",
                    server.trim_end_matches('/'),
                    company
                );
                let body: serde_json::Value = reqwest::get(&url)
                    .await
                    .context("droplet not reachable")?
                    .json()
                    .await?;
                let jobs = body["data"].as_array().cloned().unwrap_or_default();
                if jobs.is_empty() {
                    println!("No schedules found for '{}'.", company);
                } else {
                    println!("{:<24} | {:<18} | Next run", "Test", "Interval");
                    println!("{:-<24}-|-{:-<18}-|-{:-<25}", "", "", "");
                    for job in jobs {
                        println!(
                            "{:<24} | {:<18} | {}",
                            job["test_type"].as_str().unwrap_or("?"),
                            job["interval"].as_str().unwrap_or("?"),
                            job["next_run"].as_str().unwrap_or("?"),
                        );
                    }
                }
            }
            ScheduleAction::Add {
                server,
                company,
                subdomain,
                test,
                interval,
                token,
            } => {
                let test_type: TestType = test.parse()?;
                let interval: fluidprobe::scheduler::ScheduleInterval = interval.parse()?;
                let url = format!("{}/api/tests/schedule", server.trim_end_matches('/'));
                let body = serde_json::json!({
                    "company_id": company,
                    "company_subdomain": subdomain,
                    "test_type": test_type,
                    "interval": interval,
                    "enabled": true,
                    "auth_token": token,
                });
                let response: serde_json::Value = reqwest::Client::new()
                    .post(&url)
                    .json(&body)
                    .send()
                    .await
                    .context("droplet not reachable")?
                    .json()
                    .await?;
                println!(
                    "Schedule '{}' for '{}' added. Next run: {}",
                    test_type,
                    company,
                    response["meta"]["next_run"].as_str().unwrap_or("?")
                );
            }
            ScheduleAction::Remove {
                server,
                company,
                test,
            } => {
                let test_type: TestType = test.parse()?;
                let url = format!("{}/api/tests/schedule", server.trim_end_matches('/'));
                let body = serde_json::json!({
                    "company_id": company,
                    "company_subdomain": "",
                    "test_type": test_type,
                    "interval": "daily",
                    "enabled": false,
                });
                reqwest::Client::new()
                    .post(&url)
                    .json(&body)
                    .send()
                    .await
                    .context("droplet not reachable")?
                    .error_for_status()?;
                println!("Schedule '{}' for '{}' removed.", test_type, company);
            }
        },
    }

    Ok(())
}
