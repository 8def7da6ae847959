//! HTTP server for acquisition status.
//!
//! Provides endpoints for:
//! - Run statistics and the last run
//! - Recent run history
//! - Effective schedule and the cycle the next run would try first

use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use chrono::Utc;
use grib_common::{forecast_offsets, BoundingBox, ForecastCycle};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::config::AcquisitionConfig;
use crate::state::{RunHistory, RunRecord, RunStats};

const DEFAULT_RUNS_LIMIT: usize = 20;
const MAX_RUNS_LIMIT: usize = 500;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub service: String,
    pub stats: RunStats,
    pub last_run: Option<RunRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunsResponse {
    pub runs: Vec<RunRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScheduleResponse {
    pub run_interval_minutes: u64,
    pub run_at_startup: bool,
    pub clean_enabled: bool,
    pub retention_days: u32,
    pub region: BoundingBox,
    pub days: u32,
    pub offsets: usize,
    pub variables: Vec<&'static str>,
    pub output_dir: String,
    pub next_candidate: ForecastCycle,
    pub next_candidate_label: String,
}

// ============================================================================
// Query Parameters
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct RunsQuery {
    pub limit: Option<usize>,
}

// ============================================================================
// Shared State
// ============================================================================

pub struct ServerState {
    pub history: Arc<RunHistory>,
    pub config: Arc<AcquisitionConfig>,
}

/// Create the status API router.
pub fn create_router(state: Arc<ServerState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/status", get(status_handler))
        .route("/runs", get(runs_handler))
        .route("/schedule", get(schedule_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(Extension(state))
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /status - Run statistics and the most recent run
async fn status_handler(Extension(state): Extension<Arc<ServerState>>) -> impl IntoResponse {
    let stats = match state.history.stats().await {
        Ok(s) => s,
        Err(e) => return internal_error(e),
    };
    let last_run = match state.history.last().await {
        Ok(r) => r,
        Err(e) => return internal_error(e),
    };

    Json(StatusResponse {
        service: "grib-downloader".to_string(),
        stats,
        last_run,
    })
    .into_response()
}

/// GET /runs?limit=N - Recent runs, newest first
async fn runs_handler(
    Extension(state): Extension<Arc<ServerState>>,
    Query(params): Query<RunsQuery>,
) -> impl IntoResponse {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_RUNS_LIMIT)
        .min(MAX_RUNS_LIMIT);

    match state.history.recent(limit).await {
        Ok(runs) => Json(RunsResponse { runs }).into_response(),
        Err(e) => internal_error(e),
    }
}

/// GET /schedule - Effective acquisition settings
async fn schedule_handler(Extension(state): Extension<Arc<ServerState>>) -> impl IntoResponse {
    let config = &state.config;
    let next_candidate = ForecastCycle::naive_candidate(Utc::now());

    Json(ScheduleResponse {
        run_interval_minutes: config.run_interval.as_secs() / 60,
        run_at_startup: config.run_at_startup,
        clean_enabled: config.clean_enabled,
        retention_days: config.retention_days,
        region: config.region,
        days: config.days,
        offsets: forecast_offsets(config.days).len(),
        variables: config.variables.iter().map(|v| v.name()).collect(),
        output_dir: config.output_dir.display().to_string(),
        next_candidate,
        next_candidate_label: next_candidate.to_string(),
    })
}

/// GET /health - Health check endpoint
async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "grib-downloader"
    }))
}

fn internal_error(e: anyhow::Error) -> axum::response::Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({ "error": e.to_string() })),
    )
        .into_response()
}

/// Start the HTTP server.
pub async fn run_server(state: Arc<ServerState>, port: u16) -> anyhow::Result<()> {
    let app = create_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    info!(port = port, "Starting status server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::RunStatus;
    use crate::test_support::test_config;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    async fn app() -> (Router, Arc<RunHistory>, tempfile::TempDir) {
        let dir = test_utils::output_dir();
        let history = Arc::new(RunHistory::open_memory().await.unwrap());
        let config = Arc::new(test_config(dir.path(), "http://unused.invalid"));
        let state = Arc::new(ServerState {
            history: history.clone(),
            config,
        });
        (create_router(state), history, dir)
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    fn record(status: RunStatus, artifact: &str) -> RunRecord {
        RunRecord {
            started_at: Utc::now(),
            finished_at: Utc::now(),
            cycle: Some("20240115 06Z".to_string()),
            artifact: Some(artifact.to_string()),
            status,
            fetched: 12,
            skipped: 0,
            failed: 0,
            bytes: 1024,
            error_message: None,
        }
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _history, _dir) = app().await;
        let (status, body) = get_json(app, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_status_without_runs() {
        let (app, _history, _dir) = app().await;
        let (status, body) = get_json(app, "/status").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["stats"]["total"], 0);
        assert!(body["last_run"].is_null());
    }

    #[tokio::test]
    async fn test_status_reports_last_run() {
        let (app, history, _dir) = app().await;
        history
            .record(&record(RunStatus::Completed, "20240115090000.grb"))
            .await
            .unwrap();
        history
            .record(&record(RunStatus::Partial, "20240115100000.grb"))
            .await
            .unwrap();

        let (_, body) = get_json(app, "/status").await;
        assert_eq!(body["stats"]["total"], 2);
        assert_eq!(body["stats"]["partial"], 1);
        assert_eq!(body["last_run"]["status"], "partial");
        assert_eq!(body["last_run"]["artifact"], "20240115100000.grb");
    }

    #[tokio::test]
    async fn test_runs_limit() {
        let (app, history, _dir) = app().await;
        for i in 0..5 {
            history
                .record(&record(RunStatus::Completed, &format!("2024011509000{i}.grb")))
                .await
                .unwrap();
        }

        let (_, body) = get_json(app, "/runs?limit=2").await;
        let runs = body["runs"].as_array().unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0]["artifact"], "20240115090004.grb");
    }

    #[tokio::test]
    async fn test_schedule() {
        let (app, _history, _dir) = app().await;
        let (status, body) = get_json(app, "/schedule").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["run_interval_minutes"], 60);
        assert_eq!(body["offsets"], 12);
        assert_eq!(body["variables"].as_array().unwrap().len(), 11);
        assert_eq!(body["region"]["lat_max"], 60.0);
    }
}
