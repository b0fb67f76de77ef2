//! Shared application state

use anyhow::Result;
use mailguard_classifiers::{ComplianceChecker, Redactor};
use mailguard_policy::{
    BuiltinPolicyStore, DecisionPolicy, DirectoryPolicyStore, LlmPolicy, PolicyStore,
    ReviewEngine, RuleBasedPolicy, ToolExecutor,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tracing::info;

use crate::config::{DecisionMode, ServerConfig};

/// Application state shared across all requests
#[derive(Clone)]
pub struct AppState {
    /// Loaded configuration
    pub config: Arc<ServerConfig>,

    /// Review loop; every run gets its own draft and history
    pub engine: Arc<ReviewEngine>,

    /// Prometheus metrics handle for rendering
    pub metrics_handle: PrometheusHandle,
}

impl AppState {
    /// Initialize state with the decision policy named in the configuration
    pub fn new(config: ServerConfig, metrics_handle: PrometheusHandle) -> Result<Self> {
        let policy = build_policy(&config)?;
        Self::with_policy(config, policy, metrics_handle)
    }

    /// Initialize state with an explicit decision policy
    pub fn with_policy(
        config: ServerConfig,
        policy: Arc<dyn DecisionPolicy>,
        metrics_handle: PrometheusHandle,
    ) -> Result<Self> {
        let engine = build_engine(&config, policy)?;
        Ok(Self {
            config: Arc::new(config),
            engine: Arc::new(engine),
            metrics_handle,
        })
    }

    /// Tools used by the one-shot endpoints
    pub fn tools(&self) -> &ToolExecutor {
        self.engine.executor()
    }
}

/// Build the decision policy selected by `config.decision`
pub fn build_policy(config: &ServerConfig) -> Result<Arc<dyn DecisionPolicy>> {
    let policy: Arc<dyn DecisionPolicy> = match config.decision {
        DecisionMode::Rules => Arc::new(RuleBasedPolicy::new()?),
        DecisionMode::Llm => {
            info!(model = %config.llm.model, base_url = %config.llm.base_url, "Using model-backed decision policy");
            Arc::new(LlmPolicy::new(config.llm.clone())?)
        }
    };
    Ok(policy)
}

/// Build the review engine and its tools from configuration
pub fn build_engine(config: &ServerConfig, policy: Arc<dyn DecisionPolicy>) -> Result<ReviewEngine> {
    let checker = ComplianceChecker::new(&config.detector)?;
    let redactor = Redactor::new(&config.detector)?;

    let store: Arc<dyn PolicyStore> = match &config.policy_dir {
        Some(dir) => {
            info!(dir = %dir.display(), "Loading policy documents from directory");
            Arc::new(DirectoryPolicyStore::new(dir.clone()))
        }
        None => Arc::new(BuiltinPolicyStore::new()),
    };

    let executor = ToolExecutor::new(Arc::new(checker), Arc::new(redactor), store);
    info!(
        policy = policy.name(),
        max_iterations = config.engine.max_iterations,
        max_decisions = config.engine.max_decisions,
        "Review engine ready"
    );
    Ok(ReviewEngine::new(executor, policy, config.engine.clone()))
}
