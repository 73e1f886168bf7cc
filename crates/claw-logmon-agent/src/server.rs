//! Agent server lifecycle.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use claw_logmon::{Collector, spawn_aggregator};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::config::AgentConfig;
use crate::error::{AgentError, AgentResult};
use crate::routes::create_router;
use crate::state::AgentState;

/// The log monitor agent: collector, aggregation task, and HTTP server.
#[derive(Debug, Clone)]
pub struct AgentServer {
    config: AgentConfig,
    state: Arc<AgentState>,
}

impl AgentServer {
    /// Creates an agent with no jobs.
    #[must_use]
    pub fn new(config: AgentConfig) -> Self {
        let collector = Arc::new(Collector::new(config.collector_config()));
        let state = Arc::new(AgentState::new(collector, config.persist_on_push));
        Self { config, state }
    }

    /// The agent's configuration.
    #[must_use]
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// The shared collector.
    #[must_use]
    pub fn collector(&self) -> Arc<Collector> {
        Arc::clone(self.state.collector())
    }

    /// Create the router without starting the server.
    pub fn router(&self) -> axum::Router {
        create_router(Arc::clone(&self.state))
    }

    /// Serves HTTP on `addr` until `shutdown` completes.
    ///
    /// # Errors
    ///
    /// Returns an error if binding fails or the server stops abnormally.
    pub async fn serve_with_shutdown<F>(&self, addr: SocketAddr, shutdown: F) -> AgentResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| AgentError::BindFailed(addr, e))?;

        let local = listener.local_addr().unwrap_or(addr);
        info!(addr = %local, "log monitor agent listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| AgentError::Internal(e.to_string()))?;

        info!("log monitor agent HTTP server shut down");
        Ok(())
    }

    /// Runs the agent until `shutdown` completes.
    ///
    /// Restores saved jobs, starts the aggregation task, and serves HTTP.
    /// On shutdown the aggregation task is stopped, the job configuration
    /// saved, and every tailer stopped.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP server fails. Cleanup runs either way.
    pub async fn run<F>(&self, shutdown: F) -> AgentResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let collector = self.collector();
        let restored = collector.load();
        info!(jobs = restored, state = %self.config.state_path.display(), "saved jobs restored");

        let aggregator =
            spawn_aggregator(Arc::clone(&collector), self.config.aggregation_interval());
        let served = self.serve_with_shutdown(self.config.listen_addr, shutdown).await;

        aggregator.stop();
        match self.state.save_in_background().await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "job configuration not saved on shutdown"),
            Err(e) => warn!(error = %e, "save task failed on shutdown"),
        }
        collector.shutdown();

        served
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use claw_logmon::{JobConfig, RuleConfig};
    use tempfile::TempDir;

    fn make_test_server(dir: &TempDir) -> AgentServer {
        AgentServer::new(AgentConfig {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            state_path: dir.path().join("state.data"),
            ..AgentConfig::default()
        })
    }

    #[test]
    fn test_server_creation() {
        let dir = TempDir::new().unwrap();
        let server = make_test_server(&dir);

        assert_eq!(server.collector().job_count(), 0);
        assert!(server.config().persist_on_push);
    }

    #[tokio::test]
    async fn test_run_saves_on_shutdown() {
        let dir = TempDir::new().unwrap();
        let server = make_test_server(&dir);

        server.run(async {}).await.unwrap();

        let saved = claw_logmon::persist::load(&dir.path().join("state.data")).unwrap();
        assert!(saved.jobs.is_empty());
    }

    #[tokio::test]
    async fn test_run_restores_and_keeps_saved_jobs() {
        let dir = TempDir::new().unwrap();
        {
            let first = make_test_server(&dir);
            first
                .collector()
                .reconcile(&[JobConfig::new("/nonexistent/app.log")
                    .with_rule(RuleConfig::new("REQ ${json_content}").with_tags("host"))])
                .unwrap();
            first.collector().save().unwrap();
            first.collector().shutdown();
        }

        let second = make_test_server(&dir);
        second.run(async {}).await.unwrap();

        let saved = claw_logmon::persist::load(&dir.path().join("state.data")).unwrap();
        assert_eq!(saved.jobs.len(), 1);
        assert_eq!(saved.jobs[0].rules[0].tags_key, vec!["host"]);
        assert_eq!(second.collector().job_count(), 0);
    }

    #[tokio::test]
    async fn test_bind_failure() {
        let dir = TempDir::new().unwrap();
        let server = make_test_server(&dir);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let taken = listener.local_addr().unwrap();

        let result = server.serve_with_shutdown(taken, async {}).await;
        assert!(matches!(result, Err(AgentError::BindFailed(_, _))));
    }
}
