//! ==============================================================================
//! server.rs - http api and dashboard hosting
//! ==============================================================================
//!
//! purpose:
//!     stateless request routing. every handler receives the same AppState,
//!     which holds the store handle built once in main.rs.
//!
//! routes:
//!     GET  /api/health               liveness + live database ping
//!     GET  /api/measurements         time series, <= 100 rows
//!     GET  /api/measurements/metrics avg/min/max/stdDev/count
//!     POST /api/measurements/seed    append 30 days of synthetic data
//!     GET  /env.js                   deploy-time config for the dashboard
//!     *                              static files, index.html fallback
//!
//! relationships:
//!     - uses: query.rs (validation + dispatch), seed.rs (on-demand seed)
//!     - serves: ../static (dashboard bundle)
//!
//! ==============================================================================

use crate::config::FrontendConfig;
use crate::domain::format_timestamp;
use crate::query::{MeasurementQuery, QueryError, QueryService};
use crate::seed;
use crate::store::SharedStore;

use anyhow::Result;
use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::Serialize;
use std::future::Future;
use std::path::Path;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

// ==============================================================================
// shared state
// ==============================================================================
// cloned into every request. nothing in here is mutable; the store handle
// is an Arc and the database engine does its own concurrency control.

#[derive(Clone)]
pub struct AppState {
    store: SharedStore,
    queries: QueryService,
    frontend: FrontendConfig,
}

impl AppState {
    pub fn new(store: SharedStore, frontend: FrontendConfig) -> Self {
        Self { queries: QueryService::new(store.clone()), store, frontend }
    }
}

pub fn router(state: AppState, static_dir: &Path) -> Router {
    // unknown paths get index.html so client-side routes resolve
    let frontend = ServeDir::new(static_dir).fallback(ServeFile::new(static_dir.join("index.html")));

    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/measurements", get(measurements_handler))
        .route("/api/measurements/metrics", get(metrics_handler))
        .route("/api/measurements/seed", post(seed_handler))
        .route("/env.js", get(env_js_handler))
        .fallback_service(frontend)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn run_server<F>(listener: tokio::net::TcpListener, app: Router, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

// ==============================================================================
// error mapping
// ==============================================================================

impl IntoResponse for QueryError {
    fn into_response(self) -> Response {
        let status = if self.is_validation() {
            tracing::debug!(rejected = ?self.rejected_value(), "{}", self);
            StatusCode::BAD_REQUEST
        } else {
            tracing::error!("Error querying measurements: {}", self);
            StatusCode::INTERNAL_SERVER_ERROR
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

// ==============================================================================
// handlers
// ==============================================================================

#[derive(Serialize)]
struct HealthReport {
    status: &'static str,
    message: &'static str,
    timestamp: String,
    database: &'static str,
    version: &'static str,
}

/// always 200; `database` reflects a fresh ping, not a cached flag
async fn health_handler(State(state): State<AppState>) -> Json<HealthReport> {
    let database = if state.store.is_connected().await { "connected" } else { "disconnected" };
    Json(HealthReport {
        status: "OK",
        message: "Analytics Platform API is running",
        timestamp: format_timestamp(&Utc::now()),
        database,
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// keeps undecodable query strings on the same json error shape as validation
fn malformed_query(rejection: QueryRejection) -> QueryError {
    QueryError::MalformedQuery(rejection.body_text())
}

async fn measurements_handler(
    State(state): State<AppState>,
    params: Result<Query<MeasurementQuery>, QueryRejection>,
) -> Result<impl IntoResponse, QueryError> {
    let Query(params) = params.map_err(malformed_query)?;
    let rows = state.queries.series(&params).await?;
    Ok(Json(rows))
}

async fn metrics_handler(
    State(state): State<AppState>,
    params: Result<Query<MeasurementQuery>, QueryRejection>,
) -> Result<impl IntoResponse, QueryError> {
    let Query(params) = params.map_err(malformed_query)?;
    let metrics = state.queries.metrics(&params).await?;
    Ok(Json(metrics))
}

/// POST /api/measurements/seed - never idempotent, each call appends 720 rows
async fn seed_handler(State(state): State<AppState>) -> Response {
    match seed::seed_series(state.store.as_ref()).await {
        Ok(report) => {
            tracing::info!(count = report.count, "seeded synthetic measurements");
            Json(report).into_response()
        }
        Err(e) => {
            tracing::error!("Error seeding data: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "error": "Failed to seed data",
                    "message": e.to_string(),
                })),
            )
                .into_response()
        }
    }
}

async fn env_js_handler(State(state): State<AppState>) -> Response {
    let config = serde_json::to_string(&state.frontend).unwrap_or_else(|_| "{}".to_string());
    (
        [
            (header::CONTENT_TYPE, "application/javascript; charset=utf-8"),
            (header::CACHE_CONTROL, "no-store"),
        ],
        format!("window.DASHBOARD_CONFIG = {};\n", config),
    )
        .into_response()
}
