//! Mapping typed input to workflow events

use tracing::debug;

use crate::workflow::{WorkflowEvent, WorkflowState};

/// REPL slash commands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashCommand {
    /// Execute the ready plan
    Run,
    /// Forget the session and start over
    Reset,
    /// Show the current plan
    Plan,
    /// Show the conversation ledger
    Ledger,
    Help,
    Quit,
    Unknown(String),
}

/// Parse `/command`; `None` when the input is not a slash command
pub fn parse_slash(input: &str) -> Option<SlashCommand> {
    let rest = input.trim().strip_prefix('/')?;
    let name = rest.split_whitespace().next().unwrap_or_default().to_lowercase();
    debug!(%name, "parse_slash: called");

    let command = match name.as_str() {
        "run" | "go" => SlashCommand::Run,
        "reset" | "clear" => SlashCommand::Reset,
        "plan" => SlashCommand::Plan,
        "ledger" | "history" => SlashCommand::Ledger,
        "help" | "h" | "?" => SlashCommand::Help,
        "quit" | "exit" | "q" => SlashCommand::Quit,
        _ => SlashCommand::Unknown(format!("/{}", name)),
    };
    Some(command)
}

/// Events that typed text stands for in `state`
///
/// In `Done` and `PlanningError` the text starts a fresh session, so it is
/// preceded by a reset. Empty when the text means nothing in `state`.
pub fn events_for_input(state: WorkflowState, text: &str) -> Vec<WorkflowEvent> {
    debug!(%state, "events_for_input: called");
    let text = text.to_string();
    match state {
        WorkflowState::Idle => vec![WorkflowEvent::SubmitTask(text)],
        WorkflowState::NeedsDetail => vec![WorkflowEvent::ProvideDetail(text)],
        WorkflowState::PlanReady => vec![WorkflowEvent::Modify(text)],
        WorkflowState::ErrorRecovery => vec![WorkflowEvent::Feedback(text)],
        WorkflowState::Done | WorkflowState::PlanningError => {
            vec![WorkflowEvent::Reset, WorkflowEvent::SubmitTask(text)]
        }
        WorkflowState::Planning | WorkflowState::Executing => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_slash() {
        assert_eq!(parse_slash("/run"), Some(SlashCommand::Run));
        assert_eq!(parse_slash("  /RESET "), Some(SlashCommand::Reset));
        assert_eq!(parse_slash("/plan please"), Some(SlashCommand::Plan));
        assert_eq!(parse_slash("/ledger"), Some(SlashCommand::Ledger));
        assert_eq!(parse_slash("/q"), Some(SlashCommand::Quit));
        assert_eq!(parse_slash("/frobnicate"), Some(SlashCommand::Unknown("/frobnicate".to_string())));
        assert_eq!(parse_slash("book a flight"), None);
    }

    #[test]
    fn test_events_by_state() {
        assert_eq!(
            events_for_input(WorkflowState::Idle, "book a flight"),
            vec![WorkflowEvent::SubmitTask("book a flight".into())]
        );
        assert_eq!(
            events_for_input(WorkflowState::NeedsDetail, "to Paris"),
            vec![WorkflowEvent::ProvideDetail("to Paris".into())]
        );
        assert_eq!(
            events_for_input(WorkflowState::PlanReady, "window seat"),
            vec![WorkflowEvent::Modify("window seat".into())]
        );
        assert_eq!(
            events_for_input(WorkflowState::ErrorRecovery, "use Lufthansa"),
            vec![WorkflowEvent::Feedback("use Lufthansa".into())]
        );
    }

    #[test]
    fn test_terminal_states_start_over() {
        for state in [WorkflowState::Done, WorkflowState::PlanningError] {
            assert_eq!(
                events_for_input(state, "new task"),
                vec![WorkflowEvent::Reset, WorkflowEvent::SubmitTask("new task".into())]
            );
        }
    }

    #[test]
    fn test_busy_states_take_no_text() {
        assert!(events_for_input(WorkflowState::Planning, "x").is_empty());
        assert!(events_for_input(WorkflowState::Executing, "x").is_empty());
    }
}
