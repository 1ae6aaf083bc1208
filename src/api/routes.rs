//! API route definitions.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{Local, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{ApiFailure, AppState};
use crate::analytics;
use crate::config::DropletConfig;
use crate::fluid::gateway::{
    AuthGateway, HttpAuthGateway, HttpRefundGateway, RefundGateway, SimulatedAuthGateway,
    SimulatedRefundGateway,
};
use crate::fluid::{CommerceApi, FluidApiClient};
use crate::notify::NotificationRequest;
use crate::runner::{TestResult, TestRunner, TestType};
use crate::scheduler::{sweep, JobKey, ScheduleInterval, ScheduledJob};
use crate::store::{TestConfig, TestSettings};

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/tests/run", post(run_test))
        .route("/tests/schedule", get(list_schedules).post(save_schedule))
        .route("/tests/results", get(list_results).post(push_result))
        .route("/tests/config", get(read_config).post(save_config))
        .route("/tests/analytics", get(read_analytics))
        .route("/tests/notify", post(send_notification))
        .route("/cron", get(cron_sweep))
        .route("/fluid/products", post(fluid_products))
}

fn envelope(data: impl Serialize, meta: Value) -> Json<Value> {
    Json(json!({ "data": data, "meta": meta }))
}

async fn health() -> Json<Value> {
    envelope(
        json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }),
        json!({ "timestamp": Utc::now().to_rfc3339() }),
    )
}

/// Gateway selection is a deployment decision, not a per-request one.
fn build_gateways(
    config: &DropletConfig,
    client: &FluidApiClient,
) -> (Arc<dyn RefundGateway>, Arc<dyn AuthGateway>) {
    if config.simulate_gateways {
        (Arc::new(SimulatedRefundGateway), Arc::new(SimulatedAuthGateway))
    } else {
        (
            Arc::new(HttpRefundGateway::new(client.clone())),
            Arc::new(HttpAuthGateway::new(client.clone())),
        )
    }
}

#[derive(Debug, Deserialize)]
pub struct RunRequest {
    pub test_type: TestType,
    pub company_subdomain: String,
    pub auth_token: String,
    #[serde(default)]
    pub company_id: Option<String>,
    #[serde(default)]
    pub settings: TestSettings,
}

async fn run_test(
    State(state): State<AppState>,
    Json(req): Json<RunRequest>,
) -> Result<Json<Value>, ApiFailure> {
    if req.company_subdomain.is_empty() {
        return Err(ApiFailure::bad_request("company_subdomain is required"));
    }
    let client = FluidApiClient::new(&req.company_subdomain, &req.auth_token);
    let (refunds, auth) = build_gateways(&state.config, &client);
    let runner = TestRunner::new(
        Arc::new(client),
        refunds,
        auth,
        req.settings,
        req.company_subdomain.clone(),
    );

    let result = runner.run_test(req.test_type).await;
    let company_id = req.company_id.unwrap_or(req.company_subdomain);
    state.store.push_result(&company_id, result.clone());

    Ok(envelope(
        &result,
        json!({ "company_id": company_id, "timestamp": Utc::now().to_rfc3339() }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct ScheduleRequest {
    pub company_id: String,
    pub test_type: TestType,
    pub interval: ScheduleInterval,
    pub enabled: bool,
    #[serde(default)]
    pub auth_token: String,
    pub company_subdomain: String,
    #[serde(default)]
    pub settings: TestSettings,
}

async fn save_schedule(
    State(state): State<AppState>,
    Json(req): Json<ScheduleRequest>,
) -> Result<Json<Value>, ApiFailure> {
    let key = JobKey {
        company_id: req.company_id.clone(),
        test_type: req.test_type,
    };

    if !req.enabled {
        let cancelled = state.scheduler.cancel(&key);
        // Keep the swept record, disabled, so the sweep stops firing it.
        if let Some(mut record) = state.store.job(&key) {
            record.enabled = false;
            state.store.upsert_job(record);
        }
        return Ok(envelope(
            json!({ "cancelled": cancelled }),
            json!({ "company_id": req.company_id }),
        ));
    }

    let job = ScheduledJob {
        company_id: req.company_id.clone(),
        test_type: req.test_type,
        company_subdomain: req.company_subdomain,
        interval: req.interval,
        enabled: true,
        auth_token: req.auth_token,
        settings: req.settings,
        last_run: None,
        next_run: Utc::now(),
    };
    let scheduled = state.scheduler.schedule(job);
    state.store.upsert_job(scheduled.clone());

    Ok(envelope(
        &scheduled,
        json!({
            "company_id": req.company_id,
            "next_run": scheduled.next_run.to_rfc3339(),
            "last_run": scheduled.last_run.map(|t| t.to_rfc3339()),
        }),
    ))
}

#[derive(Debug, Deserialize)]
struct CompanyQuery {
    company_id: String,
    #[serde(default)]
    limit: Option<usize>,
}

async fn list_schedules(
    State(state): State<AppState>,
    Query(query): Query<CompanyQuery>,
) -> Json<Value> {
    let jobs = state.scheduler.jobs_for_company(&query.company_id);
    let total = jobs.len();
    envelope(&jobs, json!({ "total": total }))
}

async fn list_results(
    State(state): State<AppState>,
    Query(query): Query<CompanyQuery>,
) -> Json<Value> {
    let results = state.store.results(&query.company_id, query.limit);
    let total = results.len();
    envelope(&results, json!({ "total": total }))
}

#[derive(Debug, Deserialize)]
pub struct PushResultRequest {
    pub company_id: String,
    pub result: TestResult,
}

async fn push_result(
    State(state): State<AppState>,
    Json(req): Json<PushResultRequest>,
) -> Json<Value> {
    let id = req.result.id;
    state.store.push_result(&req.company_id, req.result);
    envelope(json!({ "stored": id }), json!({ "company_id": req.company_id }))
}

async fn read_config(
    State(state): State<AppState>,
    Query(query): Query<CompanyQuery>,
) -> Json<Value> {
    let configs = state.store.configs(&query.company_id);
    let total = configs.len();
    envelope(&configs, json!({ "total": total }))
}

#[derive(Debug, Deserialize)]
pub struct SaveConfigRequest {
    pub company_id: String,
    pub config: TestConfig,
}

async fn save_config(
    State(state): State<AppState>,
    Json(req): Json<SaveConfigRequest>,
) -> Json<Value> {
    state.store.save_config(&req.company_id, req.config);
    let configs = state.store.configs(&req.company_id);
    envelope(&configs, json!({ "company_id": req.company_id }))
}

async fn read_analytics(
    State(state): State<AppState>,
    Query(query): Query<CompanyQuery>,
) -> Json<Value> {
    let results = state.store.results(&query.company_id, None);
    let report = analytics::compute(&results, Local::now().date_naive());
    envelope(&report, json!({ "company_id": query.company_id }))
}

async fn send_notification(
    State(state): State<AppState>,
    Json(req): Json<NotificationRequest>,
) -> Result<Json<Value>, ApiFailure> {
    let preview = state.notifier.send(&req)?;
    Ok(envelope(&preview, json!({ "delivery": "log-only" })))
}

/// Bearer-gated sweep of the persisted-style job records.
async fn cron_sweep(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiFailure> {
    let secret = state
        .config
        .cron_secret
        .as_deref()
        .ok_or_else(|| ApiFailure::not_found("cron sweep is not configured"))?;
    let provided = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    if provided != Some(secret) {
        return Err(ApiFailure::unauthorized("invalid cron token"));
    }

    let report = sweep::sweep_due_jobs(&state.store, state.executor.as_ref(), Utc::now()).await;
    Ok(envelope(report, json!({ "timestamp": Utc::now().to_rfc3339() })))
}

#[derive(Debug, Deserialize)]
pub struct ProductsRequest {
    pub company_subdomain: String,
    pub auth_token: String,
    /// `enrollment` switches to the global enrollment catalog.
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub product_type: Option<String>,
}

async fn fluid_products(
    Json(req): Json<ProductsRequest>,
) -> Result<Json<Value>, ApiFailure> {
    let client = FluidApiClient::new(&req.company_subdomain, &req.auth_token);
    let items = if req.kind.as_deref() == Some("enrollment") {
        client.get_enrollment_packs().await?
    } else {
        client.fetch_all_products(req.product_type.as_deref()).await?
    };
    let total = items.len();
    Ok(envelope(&items, json!({ "total": total })))
}
