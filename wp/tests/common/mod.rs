//! Scripted collaborators shared by the integration tests

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::{Arc, Barrier, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use webpilot::execution::{AgentError, AgentJob, AgentOutcome, AgentProgress, ExecutionAgent, Screenshot};
use webpilot::oracle::{GenerateRequest, Oracle, OracleError};
use webpilot::prompts::PromptLoader;
use webpilot::workflow::{Workflow, WorkflowSettings};

/// Smallest byte string that sniffs as PNG
pub const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

/// Oracle that answers from a fixed list of replies, in order
pub struct ScriptedOracle {
    replies: Mutex<Vec<String>>,
    requests: Mutex<Vec<GenerateRequest>>,
}

impl ScriptedOracle {
    pub fn new(replies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn generate(&self, request: GenerateRequest) -> Result<String, OracleError> {
        self.requests.lock().unwrap().push(request);
        let mut replies = self.replies.lock().unwrap();
        if replies.is_empty() {
            return Err(OracleError::InvalidResponse("script exhausted".to_string()));
        }
        Ok(replies.remove(0))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// One agent run: `steps` progress reports (with a PNG when `true`), then the result
#[derive(Clone)]
pub struct Run {
    pub steps: Vec<bool>,
    pub result: Result<Option<PathBuf>, String>,
}

impl Run {
    pub fn ok(steps: Vec<bool>) -> Self {
        Self { steps, result: Ok(None) }
    }

    pub fn fail(steps: Vec<bool>, error: &str) -> Self {
        Self {
            steps,
            result: Err(error.to_string()),
        }
    }
}

/// Agent that replays one [`Run`] per call; optionally waits at a gate first
pub struct ScriptedAgent {
    runs: Mutex<Vec<Run>>,
    jobs: Mutex<Vec<AgentJob>>,
    gate: Option<Arc<Barrier>>,
}

impl ScriptedAgent {
    pub fn new(runs: Vec<Run>) -> Self {
        Self {
            runs: Mutex::new(runs),
            jobs: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    /// Block every run until the other side of `gate` arrives
    pub fn gated(runs: Vec<Run>, gate: Arc<Barrier>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new(runs)
        }
    }

    pub fn jobs(&self) -> Vec<AgentJob> {
        self.jobs.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExecutionAgent for ScriptedAgent {
    async fn run(
        &self,
        job: AgentJob,
        progress: mpsc::UnboundedSender<AgentProgress>,
    ) -> Result<AgentOutcome, AgentError> {
        if let Some(ref gate) = self.gate {
            gate.wait();
        }
        self.jobs.lock().unwrap().push(job);
        let run = {
            let mut runs = self.runs.lock().unwrap();
            if runs.is_empty() {
                return Err(AgentError::Failed("no run left".to_string()));
            }
            runs.remove(0)
        };

        for (i, with_screenshot) in run.steps.iter().enumerate() {
            let screenshot = with_screenshot.then(|| Screenshot::from_bytes(PNG.to_vec()).unwrap());
            let _ = progress.send(AgentProgress {
                step: i as u32 + 1,
                screenshot,
            });
        }

        run.result
            .map(|artifact| AgentOutcome { artifact })
            .map_err(AgentError::Failed)
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Workflow over the given collaborators with embedded prompts
pub fn workflow(oracle: Arc<ScriptedOracle>, agent: Arc<ScriptedAgent>, settings: WorkflowSettings) -> Workflow {
    Workflow::new(oracle, agent, Arc::new(PromptLoader::embedded_only()), settings)
}
