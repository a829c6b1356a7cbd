//! Execution agent seam
//!
//! The agent is the long-running collaborator that actually drives the
//! browser. It receives the task text and a step budget, reports progress on a
//! channel, and finishes with success or an error description.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use super::screenshot::Screenshot;

/// What the agent is asked to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentJob {
    /// Task text: the accepted plan plus any operator feedback
    pub task: String,
    /// Maximum number of agent steps
    pub max_steps: u32,
}

/// One progress report from a running agent
#[derive(Debug, Clone)]
pub struct AgentProgress {
    pub step: u32,
    pub screenshot: Option<Screenshot>,
}

/// Successful agent run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentOutcome {
    /// Optional summary artifact (e.g. an animated history of the run)
    pub artifact: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Failed to start agent `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Agent I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The agent's own error description, passed through untouched
    #[error("{0}")]
    Failed(String),

    #[error("timed out after {0:?}")]
    TimedOut(Duration),
}

/// Long-running execution collaborator
#[async_trait]
pub trait ExecutionAgent: Send + Sync {
    /// Run one job to completion, sending progress in step order
    async fn run(
        &self,
        job: AgentJob,
        progress: mpsc::UnboundedSender<AgentProgress>,
    ) -> Result<AgentOutcome, AgentError>;

    /// Short agent name for logs
    fn name(&self) -> &str;
}
