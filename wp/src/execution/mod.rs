//! Plan execution
//!
//! - [`agent`] - the execution agent seam and its job/progress types
//! - [`command`] - agent backed by an external process speaking JSON lines
//! - [`screenshot`] - screenshot decoding and best-effort export
//! - [`supervisor`] - attempts, failure diagnosis and resumption

pub mod agent;
mod command;
mod screenshot;
mod supervisor;

pub use agent::{AgentError, AgentJob, AgentOutcome, AgentProgress, ExecutionAgent};
pub use command::{CommandAgent, MAX_STEPS_ENV};
pub use screenshot::{ImageFormat, Screenshot, ScreenshotError};
pub use supervisor::{
    DEFAULT_MAX_STEPS, ExecutionAttempt, ExecutionEvent, ExecutionSupervisor, SupervisorConfig, agent_task,
};
