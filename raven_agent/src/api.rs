//! Status API: JSON endpoints under `/api` plus the `/ws` upgrade.
//!
//! Handlers are stateless; every call recomputes from the live inspection stack or reads
//! through to the telemetry files. Errors are rendered as `{"error": "..."}`.

use axum::{
    body::Bytes,
    extract::{Query, Request, State},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::time::SystemTime;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use crate::config::ApplianceInfo;
use crate::error::{ApiError, Error};
use crate::sampler::{FLOWS_DIR, SNMP_DIR, SYSLOG_DIR};
use crate::settings::Settings;
use crate::state::AppState;
use crate::tail;
use crate::types::{
    unix_millis, FlowsResponse, HealthResponse, ResourceMetrics, Services, SnmpResponse,
    StatusSnapshot, SyslogEntry, SyslogResponse, TelemetryStats,
};
use crate::ws::ws_handler;

pub const DEFAULT_LIMIT: usize = 100;
pub const MAX_LIMIT: usize = 10_000;

const FLOW_FILES: usize = 5;
const SYSLOG_FILES: usize = 3;
const SNMP_POLLS: usize = 100;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/status", get(status))
        .route("/api/services", get(services))
        .route("/api/metrics", get(metrics))
        .route("/api/telemetry", get(telemetry))
        .route("/api/flows", get(flows))
        .route("/api/syslog", get(syslog))
        .route("/api/snmp", get(snmp))
        .route("/api/config", get(get_config).post(post_config))
        .route("/api/health", get(health))
        .route("/ws", get(ws_handler))
        .layer(middleware::from_fn(catch_panic))
        // the dashboard may be served from another origin than the API
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Turns a panicking handler into a 500 instead of a dropped connection.
pub async fn catch_panic(req: Request, next: Next) -> Response {
    let path = req.uri().path().to_owned();
    match AssertUnwindSafe(next.run(req)).catch_unwind().await {
        Ok(resp) => resp,
        Err(_) => {
            error!("handler for {path} panicked");
            ApiError::internal("internal server error").into_response()
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct LimitParams {
    limit: Option<String>,
}

/// `limit` query value: missing, zero, negative or unparsable means the default.
pub fn parse_limit(raw: Option<&str>) -> usize {
    match raw.and_then(|s| s.trim().parse::<i64>().ok()) {
        Some(n) if n > 0 => (n as u64).min(MAX_LIMIT as u64) as usize,
        _ => DEFAULT_LIMIT,
    }
}

async fn status(State(state): State<AppState>) -> Json<StatusSnapshot> {
    Json(state.aggregator.build_snapshot().await)
}

async fn services(State(state): State<AppState>) -> Json<Services> {
    Json(state.aggregator.inspector().sample_services().await)
}

async fn metrics(State(state): State<AppState>) -> Json<ResourceMetrics> {
    Json(state.aggregator.inspector().sample_resource_metrics().await)
}

async fn telemetry(State(state): State<AppState>) -> Json<TelemetryStats> {
    Json(state.aggregator.sampler().sample().await)
}

async fn flows(
    State(state): State<AppState>,
    Query(q): Query<LimitParams>,
) -> Result<Json<FlowsResponse>, ApiError> {
    let limit = parse_limit(q.limit.as_deref());
    let dir = state.config.data_dir.join(FLOWS_DIR);
    let flows = tail::tail_dir(&dir, FLOW_FILES, limit, |l| {
        serde_json::from_str::<Value>(l).ok()
    })
    .await
    .map_err(Error::from)?;
    Ok(Json(FlowsResponse {
        total_count: flows.len(),
        flows,
        timestamp: now_ms(),
    }))
}

async fn syslog(
    State(state): State<AppState>,
    Query(q): Query<LimitParams>,
) -> Result<Json<SyslogResponse>, ApiError> {
    let limit = parse_limit(q.limit.as_deref());
    let dir = state.config.data_dir.join(SYSLOG_DIR);
    let ts = now_ms();
    let logs = tail::tail_dir(&dir, SYSLOG_FILES, limit, |l| {
        Some(SyslogEntry {
            host: Some("unknown".into()),
            ..SyslogEntry::from_line(l, ts)
        })
    })
    .await
    .map_err(Error::from)?;
    Ok(Json(SyslogResponse {
        total_count: logs.len(),
        logs,
        timestamp: ts,
    }))
}

async fn snmp(State(state): State<AppState>) -> Result<Json<SnmpResponse>, ApiError> {
    let mut polls = read_snmp_polls(&state.config.data_dir.join(SNMP_DIR)).await?;
    let total_count = polls.len();
    polls.drain(..total_count.saturating_sub(SNMP_POLLS));
    Ok(Json(SnmpResponse {
        polls,
        total_count,
        timestamp: now_ms(),
    }))
}

// Every file is one poll document, read in name order; files that are not JSON are skipped.
async fn read_snmp_polls(dir: &Path) -> Result<Vec<Value>, Error> {
    let Some(mut names) = tail::list_files(dir).await? else {
        return Ok(Vec::new());
    };
    names.sort_unstable();
    let mut polls = Vec::with_capacity(names.len());
    for name in names {
        let Ok(bytes) = tokio::fs::read(dir.join(&name)).await else {
            continue;
        };
        if let Ok(v) = serde_json::from_slice::<Value>(&bytes) {
            polls.push(v);
        }
    }
    Ok(polls)
}

#[derive(Serialize)]
struct ConfigView {
    #[serde(flatten)]
    appliance: ApplianceInfo,
    // same top-level shape that POST accepts
    #[serde(flatten)]
    settings: Settings,
}

#[derive(Serialize)]
struct ConfigUpdated {
    success: bool,
    message: &'static str,
    config: Settings,
}

async fn get_config(State(state): State<AppState>) -> Json<ConfigView> {
    Json(ConfigView {
        appliance: state.config.appliance.clone(),
        settings: Settings::default(),
    })
}

// Validated and echoed back; nothing is persisted.
async fn post_config(body: Bytes) -> Result<Json<ConfigUpdated>, ApiError> {
    let value: Value = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request(format!("malformed JSON body: {e}")))?;
    let settings = Settings::from_json(value)?;
    info!("configuration update accepted, restart required to apply");
    Ok(Json(ConfigUpdated {
        success: true,
        message: "Configuration updated (restart required)",
        config: settings,
    }))
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        timestamp: now_ms(),
        uptime: state.started.elapsed().as_secs_f64(),
    })
}

fn now_ms() -> u64 {
    unix_millis(SystemTime::now())
}
