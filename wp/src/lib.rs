//! webpilot - human-in-the-loop planner and supervisor for browser agents
//!
//! An operator describes a task in natural language. An oracle (a hosted
//! language model) turns it into a step-by-step plan or asks for the details
//! it is missing; once the operator confirms, an execution agent carries the
//! plan out in a browser while webpilot follows its progress. Failures are
//! diagnosed in plain language and the operator's feedback is folded into the
//! next attempt.
//!
//! # Modules
//!
//! - [`workflow`] - the session state machine and its single entry point
//! - [`parser`] - decoding oracle replies into planning decisions and diagnoses
//! - [`ledger`] - the ordered conversation history fed back to the planner
//! - [`planning`] - one planning round against the oracle
//! - [`execution`] - agent adapter, screenshots and the attempt supervisor
//! - [`oracle`] - the text-generation backends
//! - [`lookup`] - optional search grounding before planning
//! - [`bridge`] - running long operations off the interactive thread
//! - [`events`] - broadcast of session activity
//! - [`prompts`] - embedded and overridable prompt templates
//! - [`config`] - configuration types and loading
//! - [`cli`] / [`repl`] - command line and interactive surfaces

pub mod bridge;
pub mod cli;
pub mod config;
pub mod events;
pub mod execution;
pub mod ledger;
pub mod lookup;
pub mod oracle;
pub mod parser;
pub mod planning;
pub mod prompts;
pub mod repl;
pub mod workflow;

// Re-export commonly used types
pub use bridge::{BridgeError, ExecutionBridge, Finished, OutputCollector, OutputSink};
pub use config::{AgentConfig, Config, LookupConfig, OracleConfig};
pub use events::{EventBus, EventRecord, SessionEvent, create_event_bus};
pub use execution::{
    AgentError, AgentJob, AgentOutcome, AgentProgress, CommandAgent, ExecutionAgent, ExecutionAttempt, ExecutionEvent,
    ExecutionSupervisor, Screenshot,
};
pub use ledger::{ConversationLedger, LedgerEntry, Role};
pub use lookup::{DuckDuckGoLookup, Grounder, Lookup, LookupError};
pub use oracle::{GenerateRequest, Oracle, OracleError, create_oracle};
pub use parser::{ErrorDiagnosis, PlanningDecision};
pub use planning::PlanningCoordinator;
pub use prompts::PromptLoader;
pub use workflow::{Workflow, WorkflowError, WorkflowEvent, WorkflowSettings, WorkflowState};
