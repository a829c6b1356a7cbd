//! Embedded prompts
//!
//! These are compiled into the binary from .pmt files at build time.

use tracing::debug;

/// Planning system prompt (states the JSON contract)
pub const PLANNING: &str = include_str!("../../prompts/planning.pmt");

/// Failure diagnosis system prompt
pub const DIAGNOSIS: &str = include_str!("../../prompts/diagnosis.pmt");

/// Search result reduction system prompt
pub const LOOKUP: &str = include_str!("../../prompts/lookup.pmt");

/// Names of every embedded prompt
pub const NAMES: &[&str] = &["planning", "diagnosis", "lookup"];

/// Get the embedded prompt by name
pub fn get_embedded(name: &str) -> Option<&'static str> {
    debug!(%name, "get_embedded: called");
    match name {
        "planning" => Some(PLANNING),
        "diagnosis" => Some(DIAGNOSIS),
        "lookup" => Some(LOOKUP),
        _ => {
            debug!("get_embedded: no match found");
            None
        }
    }
}
