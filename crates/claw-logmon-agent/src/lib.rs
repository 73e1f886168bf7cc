//! # claw-logmon-agent
//!
//! Node agent for [`claw_logmon`]: accepts configuration pushes over HTTP and
//! serves the aggregated business metrics for Prometheus.
//!
//! ## API Endpoints
//!
//! | Endpoint | Method | Description |
//! |----------|--------|-------------|
//! | `/business/config` | POST | Replace the whole job configuration |
//! | `/metrics` | GET | Prometheus scrape of the latest snapshot |
//! | `/health` | GET | Liveness plus job and snapshot counters |
//!
//! ## Example
//!
//! ```rust,no_run
//! use claw_logmon_agent::{AgentConfig, AgentServer};
//!
//! #[tokio::main]
//! async fn main() {
//!     let server = AgentServer::new(AgentConfig::default());
//!     // server.run(async { let _ = tokio::signal::ctrl_c().await; }).await.unwrap();
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod server;
pub mod state;

// Re-export main types
pub use config::AgentConfig;
pub use error::{AgentError, AgentResult};
pub use routes::create_router;
pub use server::AgentServer;
pub use state::AgentState;
