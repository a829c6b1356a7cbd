//! Interactive REPL for webpilot
//!
//! Reads operator input with line editing, turns it into workflow events for
//! the current state and runs each event off the input thread through the
//! execution bridge.

mod input;
mod session;

pub use input::{SlashCommand, events_for_input, parse_slash};
pub use session::ReplSession;

use eyre::{Context, Result};
use tracing::debug;

use crate::config::Config;

/// Run the interactive REPL
///
/// This is the main entry point for `wp` and `wp session`.
pub fn run_interactive(config: &Config, initial_task: Option<String>) -> Result<()> {
    debug!(has_task = initial_task.is_some(), "run_interactive: called");
    config.validate().context("Configuration is not usable")?;

    let mut session = ReplSession::new(config.clone())?;
    session.run(initial_task)
}
