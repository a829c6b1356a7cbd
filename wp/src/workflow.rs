//! Workflow state machine
//!
//! The single entry point for a session. A surface feeds [`WorkflowEvent`]s to
//! [`Workflow::handle`]; the workflow sequences the planner, the lookup, the
//! execution supervisor and the ledger, and moves between [`WorkflowState`]s.
//!
//! ```text
//!  Idle --submit--> Planning --complete--> PlanReady --confirm--> Executing --completed--> Done
//!                    |   ^                    |                     |   ^
//!            needs   |   | detail    modify   |             failed  |   | feedback
//!            detail  v   |                    v                     v   |
//!                 NeedsDetail <------------ Planning          ErrorRecovery
//!                    |
//!     parse failure: Planning --> PlanningError (reset only)
//! ```
//!
//! `Reset` is accepted everywhere. Any other event not listed for the current
//! state is rejected with [`WorkflowError::InvalidEvent`] and changes nothing.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use eyre::Context;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::bridge::OutputSink;
use crate::config::Config;
use crate::events::{EventBus, SessionEvent, create_event_bus};
use crate::execution::{
    CommandAgent, ExecutionAgent, ExecutionAttempt, ExecutionEvent, ExecutionSupervisor, Screenshot,
    SupervisorConfig, agent_task,
};
use crate::ledger::{ConversationLedger, LedgerEntry};
use crate::lookup::{DuckDuckGoLookup, Grounder, Lookup};
use crate::oracle::{Oracle, create_oracle};
use crate::parser::{ErrorDiagnosis, PlanningDecision};
use crate::planning::PlanningCoordinator;
use crate::prompts::PromptLoader;

/// Where the session is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkflowState {
    Idle,
    Planning,
    NeedsDetail,
    PlanReady,
    Executing,
    ErrorRecovery,
    Done,
    PlanningError,
}

impl WorkflowState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Planning => "planning",
            Self::NeedsDetail => "needs detail",
            Self::PlanReady => "plan ready",
            Self::Executing => "executing",
            Self::ErrorRecovery => "error recovery",
            Self::Done => "done",
            Self::PlanningError => "planning error",
        }
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Something the operator did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowEvent {
    /// A new task (from `Idle`)
    SubmitTask(String),
    /// Requested detail (from `NeedsDetail`)
    ProvideDetail(String),
    /// A change to the ready plan (from `PlanReady`)
    Modify(String),
    /// Run the ready plan (from `PlanReady`)
    Confirm,
    /// Guidance after a failure (from `ErrorRecovery`)
    Feedback(String),
    /// Back to `Idle`, forgetting everything (from anywhere)
    Reset,
}

impl WorkflowEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SubmitTask(_) => "submit task",
            Self::ProvideDetail(_) => "provide detail",
            Self::Modify(_) => "modify plan",
            Self::Confirm => "confirm plan",
            Self::Feedback(_) => "feedback",
            Self::Reset => "reset",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    #[error("Cannot {event} while {state}")]
    InvalidEvent { state: WorkflowState, event: &'static str },

    #[error("The {0} must not be empty")]
    EmptyInput(&'static str),
}

/// Execution-related settings
#[derive(Debug, Clone)]
pub struct WorkflowSettings {
    pub max_steps: u32,
    pub attempt_timeout: Duration,
    /// Each attempt exports its screenshots into `{dir}/{attempt id}/`
    pub screenshots_dir: Option<PathBuf>,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        let supervisor = SupervisorConfig::default();
        Self {
            max_steps: supervisor.max_steps,
            attempt_timeout: supervisor.timeout,
            screenshots_dir: None,
        }
    }
}

impl WorkflowSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_steps: config.agent.max_steps,
            attempt_timeout: Duration::from_millis(config.agent.timeout_ms),
            screenshots_dir: config.session.expanded_screenshots_dir(),
        }
    }
}

/// Raw reply and reason of the last unreadable planning round
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseFailureInfo {
    pub raw_text: String,
    pub diagnostic: String,
}

/// One interactive session
pub struct Workflow {
    state: WorkflowState,
    task: Option<String>,
    ledger: ConversationLedger,
    plan: Option<String>,
    missing: Vec<String>,
    parse_failure: Option<ParseFailureInfo>,
    diagnosis: Option<ErrorDiagnosis>,
    last_error: Option<String>,
    screenshots: Vec<Screenshot>,
    steps: u32,
    artifact: Option<PathBuf>,
    attempts: u32,

    planner: PlanningCoordinator,
    supervisor: ExecutionSupervisor,
    grounder: Option<Grounder>,
    oracle: Arc<dyn Oracle>,
    prompts: Arc<PromptLoader>,
    screenshots_dir: Option<PathBuf>,
    events: Arc<EventBus>,
    output: OutputSink,
}

impl Workflow {
    pub fn new(
        oracle: Arc<dyn Oracle>,
        agent: Arc<dyn ExecutionAgent>,
        prompts: Arc<PromptLoader>,
        settings: WorkflowSettings,
    ) -> Self {
        debug!(oracle = oracle.name(), agent = agent.name(), "Workflow::new: called");
        let supervisor = ExecutionSupervisor::new(
            agent,
            oracle.clone(),
            prompts.clone(),
            SupervisorConfig {
                max_steps: settings.max_steps,
                timeout: settings.attempt_timeout,
            },
        );

        Self {
            state: WorkflowState::Idle,
            task: None,
            ledger: ConversationLedger::new(),
            plan: None,
            missing: Vec::new(),
            parse_failure: None,
            diagnosis: None,
            last_error: None,
            screenshots: Vec::new(),
            steps: 0,
            artifact: None,
            attempts: 0,
            planner: PlanningCoordinator::new(oracle.clone(), prompts.clone()),
            supervisor,
            grounder: None,
            oracle,
            prompts,
            screenshots_dir: settings.screenshots_dir,
            events: create_event_bus(),
            output: OutputSink::discard(),
        }
    }

    /// Build every collaborator from configuration
    pub fn from_config(config: &Config) -> eyre::Result<Self> {
        debug!(provider = %config.oracle.provider, "Workflow::from_config: called");
        let oracle = create_oracle(&config.oracle).context("Failed to create oracle")?;
        let prompts = Arc::new(PromptLoader::new(config.prompts.expanded_dir()));
        let agent: Arc<dyn ExecutionAgent> = Arc::new(CommandAgent::from_config(&config.agent));

        let mut workflow = Self::new(oracle, agent, prompts, WorkflowSettings::from_config(config));
        if config.lookup.enabled {
            let lookup = DuckDuckGoLookup::from_config(&config.lookup).context("Failed to create lookup")?;
            workflow = workflow.with_lookup(Arc::new(lookup));
        }
        Ok(workflow)
    }

    /// Ground new tasks with `lookup` before planning
    pub fn with_lookup(mut self, lookup: Arc<dyn Lookup>) -> Self {
        self.grounder = Some(Grounder::new(lookup, self.oracle.clone(), self.prompts.clone()));
        self
    }

    /// Emit session events on `bus`
    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.events = bus;
        self
    }

    /// Send operator-facing output lines to `sink` from now on
    pub fn attach_output(&mut self, sink: OutputSink) {
        self.output = sink;
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn state(&self) -> WorkflowState {
        self.state
    }

    pub fn task(&self) -> Option<&str> {
        self.task.as_deref()
    }

    pub fn ledger(&self) -> &ConversationLedger {
        &self.ledger
    }

    pub fn plan(&self) -> Option<&str> {
        self.plan.as_deref()
    }

    /// Details the planner asked for (only in `NeedsDetail`)
    pub fn missing(&self) -> &[String] {
        &self.missing
    }

    /// Why planning failed (only in `PlanningError`)
    pub fn parse_failure(&self) -> Option<&ParseFailureInfo> {
        self.parse_failure.as_ref()
    }

    /// Explanation of the last execution failure (only in `ErrorRecovery`)
    pub fn diagnosis(&self) -> Option<&ErrorDiagnosis> {
        self.diagnosis.as_ref()
    }

    /// The agent's error text for the last failed attempt
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Screenshots of the current (or last) attempt, in step order
    pub fn screenshots(&self) -> &[Screenshot] {
        &self.screenshots
    }

    /// Steps reported by the current (or last) attempt
    pub fn steps(&self) -> u32 {
        self.steps
    }

    pub fn artifact(&self) -> Option<&PathBuf> {
        self.artifact.as_ref()
    }

    /// Number of execution attempts this session
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Feed one event to the state machine
    ///
    /// Long-running work (planning, execution, diagnosis) happens inside this
    /// call. On error nothing has been changed.
    pub async fn handle(&mut self, event: WorkflowEvent) -> Result<WorkflowState, WorkflowError> {
        debug!(state = %self.state, event = event.name(), "Workflow::handle: called");

        match (self.state, event) {
            (_, WorkflowEvent::Reset) => self.reset(),
            (WorkflowState::Idle, WorkflowEvent::SubmitTask(task)) => {
                let task = non_empty(task, "task")?;
                self.task = Some(task.clone());
                self.append(LedgerEntry::user(task.clone()));
                self.transition(WorkflowState::Planning);
                self.ground(&task).await;
                self.plan_round().await;
            }
            (WorkflowState::NeedsDetail, WorkflowEvent::ProvideDetail(detail)) => {
                let detail = non_empty(detail, "detail")?;
                self.missing.clear();
                self.append(LedgerEntry::user(detail));
                self.transition(WorkflowState::Planning);
                self.plan_round().await;
            }
            (WorkflowState::PlanReady, WorkflowEvent::Modify(modification)) => {
                let modification = non_empty(modification, "modification")?;
                self.append(LedgerEntry::modification(modification));
                self.transition(WorkflowState::Planning);
                self.plan_round().await;
            }
            (WorkflowState::PlanReady, WorkflowEvent::Confirm) => {
                let plan = self.require_plan(WorkflowEvent::Confirm.name())?;
                self.transition(WorkflowState::Executing);
                let attempt = self.supervisor.execute(&agent_task(&plan, &self.ledger));
                self.run_attempt(attempt).await;
            }
            (WorkflowState::ErrorRecovery, WorkflowEvent::Feedback(feedback)) => {
                let feedback = non_empty(feedback, "feedback")?;
                let plan = self.require_plan("feedback")?;
                self.diagnosis = None;
                self.transition(WorkflowState::Executing);
                let attempt = self.supervisor.resume(&plan, &feedback, &mut self.ledger);
                self.events.emit(SessionEvent::LedgerAppended {
                    role: crate::ledger::Role::Feedback,
                    text_len: feedback.len(),
                });
                self.run_attempt(attempt).await;
            }
            (state, event) => {
                debug!(%state, event = event.name(), "Workflow::handle: rejected");
                return Err(WorkflowError::InvalidEvent {
                    state,
                    event: event.name(),
                });
            }
        }

        Ok(self.state)
    }

    fn require_plan(&self, event: &'static str) -> Result<String, WorkflowError> {
        self.plan.clone().ok_or(WorkflowError::InvalidEvent {
            state: self.state,
            event,
        })
    }

    fn reset(&mut self) {
        info!(from = %self.state, "Session reset");
        self.task = None;
        self.ledger.clear();
        self.plan = None;
        self.missing.clear();
        self.parse_failure = None;
        self.diagnosis = None;
        self.last_error = None;
        self.screenshots.clear();
        self.steps = 0;
        self.artifact = None;
        self.attempts = 0;
        self.events.emit(SessionEvent::SessionReset);
        self.transition(WorkflowState::Idle);
        self.output.line("Session reset.");
    }

    fn transition(&mut self, to: WorkflowState) {
        let from = self.state;
        self.state = to;
        if from != to {
            info!(%from, %to, "Workflow transition");
        }
        self.events.emit(SessionEvent::StateChanged { from, to });
    }

    fn append(&mut self, entry: LedgerEntry) {
        self.events.emit(SessionEvent::LedgerAppended {
            role: entry.role,
            text_len: entry.text.len(),
        });
        self.ledger.append(entry);
    }

    async fn ground(&mut self, task: &str) {
        let Some(ref grounder) = self.grounder else {
            return;
        };
        let facts = grounder.ground(task).await;
        if let Some(facts) = facts {
            self.output.line(format!("Lookup: {}", facts.replace('\n', "; ")));
            self.append(LedgerEntry::system(facts));
        }
    }

    /// Ask for a plan and move to whatever the decision says
    async fn plan_round(&mut self) {
        let task = self.task.clone().unwrap_or_default();
        self.output.line("Planning...");

        match self.planner.request_plan(&task, &self.ledger).await {
            PlanningDecision::Complete { plan } => {
                self.output.line("Plan:");
                self.output.line(plan.clone());
                self.plan = Some(plan);
                self.transition(WorkflowState::PlanReady);
            }
            PlanningDecision::NeedsDetail { missing } => {
                self.plan = None;
                self.output.line("More detail is needed:");
                for item in &missing {
                    self.output.line(format!("  - {}", item));
                }
                self.missing = missing;
                self.transition(WorkflowState::NeedsDetail);
            }
            PlanningDecision::ParseFailure { raw_text, diagnostic } => {
                warn!(%diagnostic, "Planning reply could not be used");
                self.output.line(format!("Could not use the planner's reply: {}", diagnostic));
                if !raw_text.is_empty() {
                    self.output.line(raw_text.clone());
                }
                self.plan = None;
                self.parse_failure = Some(ParseFailureInfo { raw_text, diagnostic });
                self.transition(WorkflowState::PlanningError);
            }
        }
    }

    /// Drive one attempt to its terminal event
    async fn run_attempt(&mut self, mut attempt: ExecutionAttempt) {
        self.screenshots.clear();
        self.steps = 0;
        self.artifact = None;
        self.last_error = None;
        self.attempts += 1;

        let attempt_id = attempt.id().to_string();
        let export_dir = self.screenshots_dir.as_ref().map(|dir| dir.join(&attempt_id));
        self.events.emit(SessionEvent::AttemptStarted {
            attempt_id: attempt_id.clone(),
            number: self.attempts,
        });
        self.output.line(format!("Executing plan (attempt {})...", self.attempts));

        while let Some(event) = attempt.next().await {
            match event {
                ExecutionEvent::Progress { step, screenshot } => {
                    self.steps = step;
                    self.events.emit(SessionEvent::StepCompleted {
                        attempt_id: attempt_id.clone(),
                        step,
                        has_screenshot: screenshot.is_some(),
                    });
                    match screenshot {
                        Some(shot) => {
                            if let Some(ref dir) = export_dir {
                                // Best effort
                                if let Err(e) = shot.export(dir, step) {
                                    warn!(step, error = %e, "Screenshot export failed");
                                }
                            }
                            self.output.line(format!("  step {} [screenshot]", step));
                            self.screenshots.push(shot);
                        }
                        None => self.output.line(format!("  step {}", step)),
                    }
                }
                ExecutionEvent::Completed { summary_artifact } => {
                    self.events.emit(SessionEvent::AttemptFinished {
                        attempt_id: attempt_id.clone(),
                        success: true,
                    });
                    self.output.line("Task completed successfully.");
                    if let Some(ref path) = summary_artifact {
                        self.output.line(format!("Run summary: {}", path.display()));
                    }
                    self.artifact = summary_artifact;
                    self.transition(WorkflowState::Done);
                }
                ExecutionEvent::Failed { error_text } => {
                    self.events.emit(SessionEvent::AttemptFinished {
                        attempt_id: attempt_id.clone(),
                        success: false,
                    });
                    self.fail_attempt(error_text).await;
                }
            }
        }
    }

    async fn fail_attempt(&mut self, error_text: String) {
        self.output.line(format!("Execution failed: {}", error_text));
        let diagnosis = self.supervisor.diagnose_failure(&error_text).await;
        self.output.line(format!("Problem: {}", diagnosis.problem));
        self.output.line(format!("Question: {}", diagnosis.clarifying_question));
        self.last_error = Some(error_text);
        self.diagnosis = Some(diagnosis);
        self.transition(WorkflowState::ErrorRecovery);
    }
}

fn non_empty(text: String, what: &'static str) -> Result<String, WorkflowError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(WorkflowError::EmptyInput(what));
    }
    Ok(trimmed.to_string())
}
