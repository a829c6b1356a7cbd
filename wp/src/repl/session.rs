//! REPL session state and main loop

use std::io::Write;
use std::time::Duration;

use colored::Colorize;
use eyre::{Context, Result};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::input::{SlashCommand, events_for_input, parse_slash};
use crate::bridge::{BridgeError, ExecutionBridge, OutputSink};
use crate::config::Config;
use crate::events::{EventRecord, SessionEvent};
use crate::workflow::{Workflow, WorkflowError, WorkflowEvent, WorkflowState};

/// How often the live progress line is refreshed while the worker runs
const POLL_INTERVAL: Duration = Duration::from_millis(100);

type WorkflowBridge = ExecutionBridge<Workflow, Result<WorkflowState, WorkflowError>>;

/// Interactive session around one workflow
pub struct ReplSession {
    bridge: WorkflowBridge,
    config: Config,
}

enum SlashResult {
    Continue,
    Quit,
}

impl ReplSession {
    /// Build the workflow from `config`
    pub fn new(config: Config) -> Result<Self> {
        debug!("ReplSession::new: called");
        let workflow = Workflow::from_config(&config).context("Failed to create workflow")?;
        Ok(Self::with_workflow(workflow, config))
    }

    /// Wrap an already built workflow; `config` is used to rebuild it if lost
    pub fn with_workflow(workflow: Workflow, config: Config) -> Self {
        Self {
            bridge: ExecutionBridge::new(workflow),
            config,
        }
    }

    /// Current workflow state, `None` while the workflow is unavailable
    pub fn state(&self) -> Option<WorkflowState> {
        self.bridge.get().map(Workflow::state)
    }

    pub fn workflow(&self) -> Option<&Workflow> {
        self.bridge.get()
    }

    /// Run the REPL main loop
    pub fn run(&mut self, initial_task: Option<String>) -> Result<()> {
        self.print_welcome();

        if let Some(task) = initial_task {
            println!("{} {}", ">".bright_green(), task);
            self.process_user_input(&task)?;
        }

        let mut rl = DefaultEditor::new().map_err(|e| eyre::eyre!("Failed to initialize readline: {}", e))?;

        loop {
            let readline = rl.readline(&self.prompt());

            match readline {
                Ok(line) => {
                    let input = line.trim();
                    if input.is_empty() {
                        continue;
                    }
                    let _ = rl.add_history_entry(input);

                    match parse_slash(input) {
                        Some(command) => match self.handle_slash_command(command)? {
                            SlashResult::Continue => continue,
                            SlashResult::Quit => break,
                        },
                        None => self.process_user_input(input)?,
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("^C");
                    continue;
                }
                Err(ReadlineError::Eof) => {
                    println!();
                    break;
                }
                Err(err) => {
                    return Err(eyre::eyre!("Readline error: {}", err));
                }
            }
        }

        println!("Goodbye!");
        Ok(())
    }

    /// Turn typed text into events for the current state and run them
    pub fn process_user_input(&mut self, input: &str) -> Result<()> {
        debug!(input_len = input.len(), "ReplSession::process_user_input: called");
        let Some(state) = self.state() else {
            self.recover()?;
            return Ok(());
        };

        let events = events_for_input(state, input);
        if events.is_empty() {
            println!("{} Still {}; wait for it to finish", "!".yellow(), state);
            return Ok(());
        }
        self.dispatch(events)?;
        Ok(())
    }

    /// Run `events` in order on the worker, stopping at the first rejection
    ///
    /// Blocks until the worker hands the workflow back, showing live step
    /// progress meanwhile. Returns the state after the last handled event.
    pub fn dispatch(&mut self, events: Vec<WorkflowEvent>) -> Result<Option<WorkflowState>> {
        debug!(count = events.len(), "ReplSession::dispatch: called");
        let mut progress = match self.bridge.get() {
            Some(workflow) => workflow.events().subscribe(),
            None => {
                self.recover()?;
                return Ok(None);
            }
        };

        let submitted = self.bridge.submit(move |mut workflow: Workflow, out: OutputSink| async move {
            workflow.attach_output(out);
            let mut result = Ok(workflow.state());
            for event in events {
                result = workflow.handle(event).await;
                if result.is_err() {
                    break;
                }
            }
            workflow.attach_output(OutputSink::discard());
            (workflow, result)
        });

        match submitted {
            Ok(()) => {}
            Err(BridgeError::Busy) => {
                println!("{} An operation is already running", "!".yellow());
                return Ok(None);
            }
            Err(BridgeError::WorkerLost) => {
                self.recover()?;
                return Ok(None);
            }
            Err(e) => return Err(e).context("Failed to start operation"),
        }

        loop {
            let Some(finished) = self.bridge.wait_timeout(POLL_INTERVAL) else {
                show_progress(&mut progress);
                continue;
            };
            clear_progress();

            return match finished {
                Ok(finished) => {
                    if !finished.output.is_empty() {
                        println!("{}", finished.output);
                    }
                    match finished.result {
                        Ok(state) => {
                            self.print_hint(state);
                            Ok(Some(state))
                        }
                        Err(e) => {
                            println!("{} {}", "!".yellow(), e);
                            Ok(self.state())
                        }
                    }
                }
                Err(BridgeError::WorkerLost) => {
                    self.recover()?;
                    Ok(None)
                }
                Err(e) => Err(e).context("Operation failed"),
            };
        }
    }

    /// Replace a lost workflow with a fresh one
    fn recover(&mut self) -> Result<()> {
        warn!("Workflow lost; creating a new session");
        println!("{}", "The session was lost; starting a fresh one.".red());
        let workflow = Workflow::from_config(&self.config).context("Failed to recreate workflow")?;
        self.bridge.replace(workflow).context("Failed to install new workflow")?;
        Ok(())
    }

    fn handle_slash_command(&mut self, command: SlashCommand) -> Result<SlashResult> {
        debug!(?command, "ReplSession::handle_slash_command: called");
        match command {
            SlashCommand::Quit => return Ok(SlashResult::Quit),
            SlashCommand::Help => self.print_help(),
            SlashCommand::Run => {
                self.dispatch(vec![WorkflowEvent::Confirm])?;
            }
            SlashCommand::Reset => {
                info!("Operator reset the session");
                self.dispatch(vec![WorkflowEvent::Reset])?;
            }
            SlashCommand::Plan => self.print_plan(),
            SlashCommand::Ledger => self.print_ledger(),
            SlashCommand::Unknown(name) => {
                println!("{} Unknown command: {}", "?".yellow(), name);
                println!("Type {} for available commands", "/help".yellow());
            }
        }
        Ok(SlashResult::Continue)
    }

    fn prompt(&self) -> String {
        let state = self.state().map(|s| s.label()).unwrap_or("lost");
        format!("{} {} ", state.dimmed(), ">".bright_green())
    }

    fn print_welcome(&self) {
        println!();
        println!("{}", "webpilot".bright_cyan().bold());
        println!("Oracle: {} ({})", self.config.oracle.provider, self.config.oracle.model());
        println!("Agent: {}", self.config.agent.command);
        println!("Describe a task. Type {} for help, {} to quit", "/help".yellow(), "/quit".yellow());
        println!();
    }

    fn print_help(&self) {
        println!();
        println!("{}", "Available Commands:".bright_cyan());
        println!("  {:14} Execute the ready plan", "/run".yellow());
        println!("  {:14} Forget this session and start over", "/reset".yellow());
        println!("  {:14} Show the current plan", "/plan".yellow());
        println!("  {:14} Show the conversation ledger", "/ledger".yellow());
        println!("  {:14} Show this help", "/help".yellow());
        println!("  {:14} Exit the REPL", "/quit".yellow());
        println!();
        println!("{}", "Typed text means:".bright_cyan());
        println!("  {:14} a new task", "idle".yellow());
        println!("  {:14} the requested details", "needs detail".yellow());
        println!("  {:14} a change to the plan", "plan ready".yellow());
        println!("  {:14} guidance for the next attempt", "error recovery".yellow());
        println!("  {:14} a new task (after a reset)", "done".yellow());
        println!();
    }

    fn print_plan(&self) {
        match self.bridge.get().and_then(Workflow::plan) {
            Some(plan) => {
                println!();
                println!("{}", "Plan:".bright_cyan());
                println!("{}", plan);
                println!();
            }
            None => println!("{}", "No plan yet.".dimmed()),
        }
    }

    fn print_ledger(&self) {
        let Some(workflow) = self.bridge.get() else {
            return;
        };
        let ledger = workflow.ledger();
        if ledger.is_empty() {
            println!("{}", "Ledger is empty.".dimmed());
            return;
        }

        println!();
        println!("{}", "Conversation Ledger:".bright_cyan());
        for (i, entry) in ledger.entries().iter().enumerate() {
            println!("  {}. {}", i + 1, entry);
        }
        println!();
    }

    fn print_hint(&self, state: WorkflowState) {
        let hint = match state {
            WorkflowState::Idle => "Describe a task.",
            WorkflowState::NeedsDetail => "Provide the missing details.",
            WorkflowState::PlanReady => "Type /run to execute, or describe a change to the plan.",
            WorkflowState::ErrorRecovery => "Answer the question to retry with your feedback, or /reset.",
            WorkflowState::Done => "Type a new task to start over.",
            WorkflowState::PlanningError => "Type the task again to start over, or /reset.",
            WorkflowState::Planning | WorkflowState::Executing => return,
        };
        println!("{}", hint.dimmed());
    }
}

/// Redraw the live progress line from pending bus events
fn show_progress(progress: &mut broadcast::Receiver<EventRecord>) {
    let mut latest = None;
    loop {
        match progress.try_recv() {
            Ok(record) => {
                let text = match record.event {
                    SessionEvent::StateChanged { to, .. } => format!("{}...", to),
                    SessionEvent::StepCompleted { step, .. } => format!("executing... step {}", step),
                    _ => continue,
                };
                latest = Some(text);
            }
            Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }

    if let Some(text) = latest {
        print!("\r\x1b[2K{}", text.dimmed());
        let _ = std::io::stdout().flush();
    }
}

fn clear_progress() {
    print!("\r\x1b[2K");
    let _ = std::io::stdout().flush();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::execution::agent::mock::{Script, ScriptedAgent};
    use crate::oracle::client::mock::MockOracle;
    use crate::prompts::PromptLoader;
    use crate::workflow::WorkflowSettings;

    const PLAN_REPLY: &str = r#"{"complete": true, "plan": "1. Open the forecast site"}"#;

    fn session(replies: &[&str], scripts: Vec<Script>) -> ReplSession {
        let workflow = Workflow::new(
            Arc::new(MockOracle::replying(replies)),
            Arc::new(ScriptedAgent::new(scripts)),
            Arc::new(PromptLoader::embedded_only()),
            WorkflowSettings::default(),
        );
        ReplSession::with_workflow(workflow, Config::default())
    }

    #[test]
    fn test_typed_task_reaches_plan_ready() {
        let mut repl = session(&[PLAN_REPLY], vec![]);
        repl.process_user_input("what is the weather in Berlin").unwrap();

        assert_eq!(repl.state(), Some(WorkflowState::PlanReady));
        assert_eq!(repl.workflow().unwrap().plan(), Some("1. Open the forecast site"));
    }

    #[test]
    fn test_run_command_executes_plan() {
        let mut repl = session(&[PLAN_REPLY], vec![Script::succeed(2)]);
        repl.process_user_input("what is the weather in Berlin").unwrap();

        let state = repl.dispatch(vec![WorkflowEvent::Confirm]).unwrap();
        assert_eq!(state, Some(WorkflowState::Done));
        assert_eq!(repl.workflow().unwrap().steps(), 2);
    }

    #[test]
    fn test_rejected_event_keeps_state() {
        let mut repl = session(&[], vec![]);
        let state = repl.dispatch(vec![WorkflowEvent::Confirm]).unwrap();
        assert_eq!(state, Some(WorkflowState::Idle));
    }

    #[test]
    fn test_text_after_done_starts_fresh_session() {
        let mut repl = session(&[PLAN_REPLY, PLAN_REPLY], vec![Script::succeed(1)]);
        repl.process_user_input("first task").unwrap();
        repl.dispatch(vec![WorkflowEvent::Confirm]).unwrap();
        assert_eq!(repl.state(), Some(WorkflowState::Done));

        repl.process_user_input("second task").unwrap();

        let workflow = repl.workflow().unwrap();
        assert_eq!(workflow.state(), WorkflowState::PlanReady);
        assert_eq!(workflow.task(), Some("second task"));
        assert_eq!(workflow.ledger().len(), 1);
    }
}
