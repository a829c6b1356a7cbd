//! ExecutionSupervisor - run an accepted plan and explain failures
//!
//! Each call to [`ExecutionSupervisor::execute`] produces a fresh
//! [`ExecutionAttempt`]: a pull-based event sequence that starts the agent on
//! first poll, yields every progress report in step order, and ends with
//! exactly one `Completed` or `Failed`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::agent::{AgentError, AgentJob, AgentOutcome, AgentProgress, ExecutionAgent};
use super::screenshot::Screenshot;
use crate::ledger::{ConversationLedger, LedgerEntry, Role};
use crate::oracle::{GenerateRequest, Oracle};
use crate::parser::{self, ErrorDiagnosis};
use crate::prompts::PromptLoader;

/// Default step budget handed to the agent
pub const DEFAULT_MAX_STEPS: u32 = 100;

/// Reply token budget for diagnosis calls
const DIAGNOSIS_MAX_TOKENS: u32 = 1024;

/// Observable outcome of an execution attempt
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    /// The agent finished a step
    Progress { step: u32, screenshot: Option<Screenshot> },
    /// The agent succeeded
    Completed { summary_artifact: Option<PathBuf> },
    /// The agent failed; `error_text` is the agent's own description
    Failed { error_text: String },
}

impl ExecutionEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Progress { .. })
    }
}

/// Execution settings
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub max_steps: u32,
    pub timeout: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
            timeout: Duration::from_secs(30 * 60),
        }
    }
}

/// Runs plans through the agent and diagnoses failures with the oracle
pub struct ExecutionSupervisor {
    agent: Arc<dyn ExecutionAgent>,
    oracle: Arc<dyn Oracle>,
    prompts: Arc<PromptLoader>,
    config: SupervisorConfig,
}

impl ExecutionSupervisor {
    pub fn new(
        agent: Arc<dyn ExecutionAgent>,
        oracle: Arc<dyn Oracle>,
        prompts: Arc<PromptLoader>,
        config: SupervisorConfig,
    ) -> Self {
        debug!(agent = agent.name(), ?config, "ExecutionSupervisor::new: called");
        Self {
            agent,
            oracle,
            prompts,
            config,
        }
    }

    /// Start a fresh attempt for `task`
    ///
    /// Nothing runs until the attempt is first polled.
    pub fn execute(&self, task: &str) -> ExecutionAttempt {
        let id = Uuid::now_v7();
        debug!(%id, task_len = task.len(), "ExecutionSupervisor::execute: called");
        ExecutionAttempt {
            id,
            agent: self.agent.clone(),
            job: Some(AgentJob {
                task: task.to_string(),
                max_steps: self.config.max_steps,
            }),
            timeout: self.config.timeout,
            running: None,
            finished: false,
        }
    }

    /// Fold `feedback` into the ledger and start over from the top of the plan
    pub fn resume(&self, plan: &str, feedback: &str, ledger: &mut ConversationLedger) -> ExecutionAttempt {
        debug!(feedback_len = feedback.len(), "ExecutionSupervisor::resume: called");
        ledger.append(LedgerEntry::feedback(feedback));
        self.execute(&agent_task(plan, ledger))
    }

    /// Explain a failure; never fails and never alters `error_text`
    pub async fn diagnose_failure(&self, error_text: &str) -> ErrorDiagnosis {
        debug!(error_len = error_text.len(), "ExecutionSupervisor::diagnose_failure: called");

        let request = match (self.prompts.diagnosis_system(), self.prompts.diagnosis_user(error_text)) {
            (Ok(system), Ok(user)) => GenerateRequest::new(system, user).with_max_tokens(DIAGNOSIS_MAX_TOKENS),
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %e, "Diagnosis prompt could not be built, using fallback");
                return ErrorDiagnosis::fallback();
            }
        };

        match self.oracle.generate(request).await {
            Ok(raw) => parser::parse_diagnosis(&raw),
            Err(e) => {
                warn!(error = %e, "Diagnosis call failed, using fallback");
                ErrorDiagnosis::fallback()
            }
        }
    }
}

/// Text handed to the agent: the plan followed by all operator feedback
pub fn agent_task(plan: &str, ledger: &ConversationLedger) -> String {
    let feedback: Vec<&str> = ledger.texts_for(Role::Feedback).collect();
    if feedback.is_empty() {
        return plan.to_string();
    }

    let mut task = plan.trim_end().to_string();
    task.push_str("\n\nOperator feedback from earlier attempts:");
    for line in feedback {
        task.push_str("\n- ");
        task.push_str(line);
    }
    task
}

struct Running {
    progress: mpsc::UnboundedReceiver<AgentProgress>,
    handle: JoinHandle<Result<AgentOutcome, AgentError>>,
}

/// One execution attempt, consumed by repeated calls to [`ExecutionAttempt::next`]
pub struct ExecutionAttempt {
    id: Uuid,
    agent: Arc<dyn ExecutionAgent>,
    job: Option<AgentJob>,
    timeout: Duration,
    running: Option<Running>,
    finished: bool,
}

impl ExecutionAttempt {
    /// Attempt identifier (time-ordered)
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Next event, or `None` once the terminal event has been returned
    pub async fn next(&mut self) -> Option<ExecutionEvent> {
        if self.finished {
            return None;
        }

        if self.running.is_none() {
            let job = self.job.take()?;
            self.running = Some(self.start(job));
        }
        let running = self.running.as_mut()?;

        // The sender lives inside the agent task, so the channel closes only
        // after the agent returned; every progress report is seen first.
        if let Some(progress) = running.progress.recv().await {
            return Some(ExecutionEvent::Progress {
                step: progress.step,
                screenshot: progress.screenshot,
            });
        }

        let result = match (&mut running.handle).await {
            Ok(result) => result,
            Err(e) => Err(AgentError::Failed(format!("agent task aborted: {}", e))),
        };
        self.finished = true;
        self.running = None;

        let event = match result {
            Ok(outcome) => {
                info!(attempt = %self.id, "Execution completed");
                ExecutionEvent::Completed {
                    summary_artifact: outcome.artifact,
                }
            }
            Err(e) => {
                info!(attempt = %self.id, error = %e, "Execution failed");
                ExecutionEvent::Failed {
                    error_text: e.to_string(),
                }
            }
        };
        Some(event)
    }

    fn start(&self, job: AgentJob) -> Running {
        debug!(attempt = %self.id, agent = self.agent.name(), "ExecutionAttempt::start: called");
        let (tx, rx) = mpsc::unbounded_channel();
        let agent = self.agent.clone();
        let timeout = self.timeout;

        let handle = tokio::spawn(async move {
            match tokio::time::timeout(timeout, agent.run(job, tx)).await {
                Ok(result) => result,
                Err(_) => Err(AgentError::TimedOut(timeout)),
            }
        });

        Running { progress: rx, handle }
    }
}
