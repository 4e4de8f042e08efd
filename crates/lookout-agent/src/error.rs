// Allow unused assignments for diagnostic fields - they're used by the macros
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

/// Error type for agent registry lookups and agent RPCs
#[derive(Error, Debug, Diagnostic)]
pub enum AgentError {
    /// The cluster exists but has no agent
    #[error("No agent configured for cluster {cluster_id}")]
    #[diagnostic(
        code(lookout::agent::not_configured),
        help("Register an agent endpoint for the cluster; until then it is skipped")
    )]
    NotConfigured {
        #[allow(unused)]
        cluster_id: u64,
    },

    /// The cluster is not registered at all
    #[error("Unknown cluster: {cluster}")]
    #[diagnostic(
        code(lookout::agent::unknown_cluster),
        help("Selectors must name a registered cluster or use \"__all__\"")
    )]
    UnknownCluster {
        #[allow(unused)]
        cluster: String,
    },

    /// The request never got a response
    #[error("Request to agent of cluster {cluster_id} failed: {message}")]
    #[diagnostic(
        code(lookout::agent::request_failed),
        help("Check that the agent endpoint is reachable from the control plane")
    )]
    RequestFailed {
        #[allow(unused)]
        cluster_id: u64,
        #[allow(unused)]
        message: String,
    },

    /// The agent answered but refused the push
    #[error("Agent of cluster {cluster_id} rejected the push with status {status}: {message}")]
    #[diagnostic(
        code(lookout::agent::rejected),
        help("Inspect the agent logs; a 401 usually means the pass key does not match")
    )]
    Rejected {
        #[allow(unused)]
        cluster_id: u64,
        #[allow(unused)]
        status: u16,
        #[allow(unused)]
        message: String,
    },

    /// The per-call timeout elapsed
    #[error("Agent of cluster {cluster_id} did not answer within {timeout_ms}ms")]
    #[diagnostic(
        code(lookout::agent::timeout),
        help("Raise --agent-timeout-secs if the agent is slow but healthy")
    )]
    Timeout {
        #[allow(unused)]
        cluster_id: u64,
        #[allow(unused)]
        timeout_ms: u64,
    },

    /// Invalid configuration
    #[error("Invalid agent configuration: {message}")]
    #[diagnostic(code(lookout::agent::invalid_config), help("{suggestion}"))]
    InvalidConfig {
        #[allow(unused)]
        message: String,
        #[allow(unused)]
        suggestion: String,
    },
}

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

impl AgentError {
    pub fn not_configured(cluster_id: u64) -> Self {
        Self::NotConfigured { cluster_id }
    }

    pub fn unknown_cluster(cluster: impl Into<String>) -> Self {
        Self::UnknownCluster {
            cluster: cluster.into(),
        }
    }

    pub fn request_failed(cluster_id: u64, message: impl Into<String>) -> Self {
        Self::RequestFailed {
            cluster_id,
            message: message.into(),
        }
    }

    pub fn rejected(cluster_id: u64, status: u16, message: impl Into<String>) -> Self {
        Self::Rejected {
            cluster_id,
            status,
            message: message.into(),
        }
    }

    pub fn timeout(cluster_id: u64, timeout_ms: u64) -> Self {
        Self::Timeout {
            cluster_id,
            timeout_ms,
        }
    }

    pub fn invalid_config(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Whether the cluster should be skipped rather than counted as a failure
    pub fn is_not_configured(&self) -> bool {
        matches!(self, Self::NotConfigured { .. })
    }
}
