//! Conversation ledger
//!
//! The ordered record of everything the user (and the lookup step) has told
//! the planner during a session. It is rendered verbatim into every planning
//! prompt.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Who contributed a ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The task itself and any requested detail
    User,
    /// Context injected by the orchestrator (lookup facts)
    System,
    /// A change requested to a ready plan
    Modification,
    /// Operator guidance after a failed execution
    Feedback,
}

impl Role {
    /// Label used when rendering the ledger into a prompt
    pub fn label(&self) -> &'static str {
        match self {
            Self::User => "User",
            Self::System => "System",
            Self::Modification => "Modification",
            Self::Feedback => "Feedback",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// One line of dialogue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub role: Role,
    pub text: String,
}

impl LedgerEntry {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self { role, text: text.into() }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, text)
    }

    pub fn modification(text: impl Into<String>) -> Self {
        Self::new(Role::Modification, text)
    }

    pub fn feedback(text: impl Into<String>) -> Self {
        Self::new(Role::Feedback, text)
    }
}

impl fmt::Display for LedgerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.role, self.text)
    }
}

/// Append-only dialogue record
///
/// Entries are never reordered, deduplicated or truncated. Repeating yourself
/// is allowed and costs prompt space; only [`ConversationLedger::clear`] shrinks
/// the ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationLedger {
    entries: Vec<LedgerEntry>,
}

impl ConversationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry at the end
    pub fn append(&mut self, entry: LedgerEntry) {
        debug!(role = %entry.role, text_len = entry.text.len(), "ConversationLedger::append: called");
        self.entries.push(entry);
    }

    /// Render all entries in insertion order, one `Role: text` line each
    pub fn render(&self) -> String {
        debug!(entries = self.entries.len(), "ConversationLedger::render: called");
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(&entry.to_string());
            out.push('\n');
        }
        out
    }

    /// Forget everything
    pub fn clear(&mut self) {
        debug!(entries = self.entries.len(), "ConversationLedger::clear: called");
        self.entries.clear();
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    /// Texts of every entry with the given role, oldest first
    pub fn texts_for(&self, role: Role) -> impl Iterator<Item = &str> {
        self.entries.iter().filter(move |e| e.role == role).map(|e| e.text.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_in_insertion_order() {
        let mut ledger = ConversationLedger::new();
        ledger.append(LedgerEntry::user("book a flight"));
        ledger.append(LedgerEntry::user("destination: Paris"));
        ledger.append(LedgerEntry::modification("window seat"));
        ledger.append(LedgerEntry::feedback("use the mobile site"));

        assert_eq!(
            ledger.render(),
            "User: book a flight\nUser: destination: Paris\nModification: window seat\nFeedback: use the mobile site\n"
        );
    }

    #[test]
    fn test_render_is_idempotent() {
        let mut ledger = ConversationLedger::new();
        ledger.append(LedgerEntry::system("Paris is in France"));
        assert_eq!(ledger.render(), ledger.render());
    }

    #[test]
    fn test_duplicates_are_kept() {
        let mut ledger = ConversationLedger::new();
        ledger.append(LedgerEntry::user("same"));
        ledger.append(LedgerEntry::user("same"));
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.render(), "User: same\nUser: same\n");
    }

    #[test]
    fn test_no_truncation() {
        let mut ledger = ConversationLedger::new();
        for i in 0..5_000 {
            ledger.append(LedgerEntry::user(format!("detail {}", i)));
        }
        assert_eq!(ledger.len(), 5_000);
        let rendered = ledger.render();
        assert!(rendered.starts_with("User: detail 0\n"));
        assert!(rendered.ends_with("User: detail 4999\n"));
    }

    #[test]
    fn test_clear() {
        let mut ledger = ConversationLedger::new();
        ledger.append(LedgerEntry::user("x"));
        ledger.clear();
        assert!(ledger.is_empty());
        assert_eq!(ledger.render(), "");
    }

    #[test]
    fn test_texts_for_role() {
        let mut ledger = ConversationLedger::new();
        ledger.append(LedgerEntry::user("task"));
        ledger.append(LedgerEntry::feedback("first"));
        ledger.append(LedgerEntry::modification("m"));
        ledger.append(LedgerEntry::feedback("second"));

        let feedback: Vec<&str> = ledger.texts_for(Role::Feedback).collect();
        assert_eq!(feedback, vec!["first", "second"]);
    }
}
