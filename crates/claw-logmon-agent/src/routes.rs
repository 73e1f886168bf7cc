//! Route configuration for the agent.

use std::sync::Arc;

use axum::routing::{get, post, Router};
use tower_http::trace::TraceLayer;

use crate::handlers::{health_check, push_config, scrape};
use crate::state::AgentState;

/// Create the agent router.
pub fn create_router(state: Arc<AgentState>) -> Router {
    Router::new()
        // Configuration push
        .route("/business/config", post(push_config))
        // Prometheus scrape
        .route("/metrics", get(scrape))
        // Health check
        .route("/health", get(health_check))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
