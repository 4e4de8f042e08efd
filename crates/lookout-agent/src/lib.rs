//! Lookout Agent - Cluster registry and agent RPC client
//!
//! This crate provides:
//! - AgentRegistry trait mapping clusters to agent endpoints
//! - HTTP client pushing watcher configuration to agents
//! - In-memory mock agent fleet for tests

pub mod client;
pub mod error;
pub mod mock;
pub mod registry;
pub mod types;

// Re-export primary types
pub use client::{AgentClient, HttpAgentClient, DEFAULT_AGENT_TIMEOUT};
pub use error::{AgentError, Result};
pub use mock::{MockAgentClient, RecordedPush};
pub use registry::{AgentRegistry, StaticAgentRegistry};
pub use types::{
    AgentConfig, AgentEndpoint, ClusterConfig, ClusterInfo, PushRequest, PushResponse,
    PASS_KEY_HEADER,
};
