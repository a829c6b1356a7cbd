//! Event types for webpilot session observability
//!
//! These events describe everything an observer may want to follow while the
//! workflow runs on its worker:
//! - State transitions
//! - Ledger growth
//! - Execution attempts and their steps

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ledger::Role;
use crate::workflow::WorkflowState;

/// Core event enum - the vocabulary of session activity
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SessionEvent {
    /// The workflow moved between states
    StateChanged { from: WorkflowState, to: WorkflowState },
    /// An entry was appended to the ledger
    LedgerAppended { role: Role, text_len: usize },
    /// An execution attempt started
    AttemptStarted { attempt_id: String, number: u32 },
    /// The agent reported a step
    StepCompleted {
        attempt_id: String,
        step: u32,
        has_screenshot: bool,
    },
    /// An execution attempt ended
    AttemptFinished { attempt_id: String, success: bool },
    /// The session was reset
    SessionReset,
}

impl SessionEvent {
    /// Get the event type as a string (for logging/filtering)
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::StateChanged { .. } => "StateChanged",
            Self::LedgerAppended { .. } => "LedgerAppended",
            Self::AttemptStarted { .. } => "AttemptStarted",
            Self::StepCompleted { .. } => "StepCompleted",
            Self::AttemptFinished { .. } => "AttemptFinished",
            Self::SessionReset => "SessionReset",
        }
    }
}

/// Event plus the moment it was emitted
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventRecord {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: SessionEvent,
}

impl EventRecord {
    pub fn new(event: SessionEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type() {
        let event = SessionEvent::StateChanged {
            from: WorkflowState::Idle,
            to: WorkflowState::Planning,
        };
        assert_eq!(event.event_type(), "StateChanged");
        assert_eq!(SessionEvent::SessionReset.event_type(), "SessionReset");
    }

    #[test]
    fn test_record_serialization() {
        let record = EventRecord::new(SessionEvent::StepCompleted {
            attempt_id: "a1".to_string(),
            step: 4,
            has_screenshot: true,
        });

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["type"], "StepCompleted");
        assert_eq!(json["step"], 4);
        assert!(json["timestamp"].is_string());

        let back: EventRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back.event, record.event);
    }
}
