use crate::analyzer::CrowdAnalyzer;
use crate::config::ServiceConfig;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Clone)]
pub struct CrowdServiceState {
    inner: Arc<CrowdServiceStateInner>,
}

struct CrowdServiceStateInner {
    node_id: String,
    analyzer: CrowdAnalyzer,
    shutdown: CancellationToken,
}

impl CrowdServiceState {
    /// The analyzer's in-flight media analyses are abandoned on shutdown
    pub fn new(node_id: String, analyzer: CrowdAnalyzer) -> Self {
        let shutdown = CancellationToken::new();
        Self {
            inner: Arc::new(CrowdServiceStateInner {
                node_id,
                analyzer: analyzer.with_cancellation(shutdown.clone()),
                shutdown,
            }),
        }
    }

    /// Demo-mode analyzer configured from the environment
    pub fn from_config(config: &ServiceConfig) -> Self {
        let analyzer = CrowdAnalyzer::new()
            .with_failure_rate(config.failure_rate)
            .with_options(config.options.clone());
        Self::new(config.node_id.clone(), analyzer)
    }

    pub fn node_id(&self) -> &str {
        &self.inner.node_id
    }

    pub fn analyzer(&self) -> &CrowdAnalyzer {
        &self.inner.analyzer
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Cancel in-flight analyses
    pub fn shutdown(&self) {
        info!(node_id = %self.inner.node_id, "cancelling in-flight analyses");
        self.inner.shutdown.cancel();
    }
}
