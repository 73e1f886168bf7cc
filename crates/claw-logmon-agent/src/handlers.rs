//! HTTP request handlers.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::error::AgentResult;
use crate::state::AgentState;

/// Body returned by a successful configuration push.
pub const PUSH_SUCCESS: &str = "success";

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` while the server answers.
    pub status: String,
    /// Number of monitor jobs.
    pub jobs: usize,
    /// Points in the current snapshot.
    pub points: usize,
    /// Records waiting for the next tick.
    pub pending_records: usize,
    /// When the snapshot was last replaced.
    pub last_aggregation: Option<DateTime<Utc>>,
    /// Seconds since the agent started.
    pub uptime_secs: u64,
}

/// Handle POST /business/config - replace the whole job configuration.
pub async fn push_config(
    State(state): State<Arc<AgentState>>,
    body: Bytes,
) -> AgentResult<&'static str> {
    let summary = state.collector().apply_push(&body)?;
    info!(
        jobs = state.collector().job_count(),
        added = summary.added,
        removed = summary.removed,
        "configuration push accepted"
    );

    if state.persist_on_push() {
        drop(state.save_in_background());
    }

    Ok(PUSH_SUCCESS)
}

/// Handle GET /metrics - Prometheus scrape of the current snapshot.
pub async fn scrape(State(state): State<Arc<AgentState>>) -> Response {
    (
        [(header::CONTENT_TYPE, claw_logmon::prometheus::CONTENT_TYPE)],
        state.collector().encode_metrics(),
    )
        .into_response()
}

/// Handle GET /health - liveness and collector counters.
pub async fn health_check(State(state): State<Arc<AgentState>>) -> Json<HealthResponse> {
    let collector = state.collector();
    Json(HealthResponse {
        status: "ok".to_string(),
        jobs: collector.job_count(),
        points: collector.metric_points().len(),
        pending_records: collector.pending_records(),
        last_aggregation: collector.last_aggregation(),
        uptime_secs: state.uptime_secs(),
    })
}
