//! PlanningCoordinator - one "clarify until complete" round
//!
//! Builds the planning prompt from the ledger and the task, asks the oracle
//! exactly once, and turns the reply into a [`PlanningDecision`]. The ledger
//! is only read here; the workflow decides what gets appended.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::ledger::ConversationLedger;
use crate::oracle::{GenerateRequest, Oracle};
use crate::parser::{self, PlanningDecision};
use crate::prompts::PromptLoader;

/// Asks the oracle for a plan
pub struct PlanningCoordinator {
    oracle: Arc<dyn Oracle>,
    prompts: Arc<PromptLoader>,
}

impl PlanningCoordinator {
    pub fn new(oracle: Arc<dyn Oracle>, prompts: Arc<PromptLoader>) -> Self {
        debug!(oracle = oracle.name(), "PlanningCoordinator::new: called");
        Self { oracle, prompts }
    }

    /// Run one planning round
    ///
    /// Transport failures and unreadable replies both come back as
    /// [`PlanningDecision::ParseFailure`]; nothing is retried.
    pub async fn request_plan(&self, task: &str, ledger: &ConversationLedger) -> PlanningDecision {
        debug!(task_len = task.len(), entries = ledger.len(), "PlanningCoordinator::request_plan: called");

        let request = match self.build_request(task, ledger) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "PlanningCoordinator::request_plan: could not build prompt");
                return PlanningDecision::failure("", format!("prompt error: {}", e));
            }
        };

        let raw = match self.oracle.generate(request).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, oracle = self.oracle.name(), "PlanningCoordinator::request_plan: oracle call failed");
                let hint = if e.is_transient() {
                    "; this looks temporary, resubmitting may help"
                } else {
                    ""
                };
                return PlanningDecision::failure("", format!("oracle call failed: {}{}", e, hint));
            }
        };

        let decision = parser::parse(&raw);
        info!(decision = decision.kind(), "Planning round finished");
        decision
    }

    fn build_request(&self, task: &str, ledger: &ConversationLedger) -> eyre::Result<GenerateRequest> {
        let system = self.prompts.planning_system()?;
        let prompt = self.prompts.planning_user(&ledger.render(), task)?;
        Ok(GenerateRequest::new(system, prompt))
    }
}
