//! CLI command definitions and subcommands

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

/// webpilot - plan with an oracle, run with a browser agent, stay in the loop
#[derive(Parser)]
#[command(
    name = "wp",
    about = "Human-in-the-loop planner and supervisor for browser agents",
    version
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Session arguments when no subcommand is given
    #[command(flatten)]
    pub session: SessionArgs,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Cli {
    /// Arguments for the interactive session, when that is what was asked for
    pub fn session_args(&self) -> Option<&SessionArgs> {
        match self.command {
            None => Some(&self.session),
            Some(Command::Session(ref args)) => Some(args),
            Some(_) => None,
        }
    }
}

/// Arguments of an interactive session
#[derive(Debug, Clone, Default, Args)]
pub struct SessionArgs {
    /// Task to submit as soon as the session starts
    #[arg(value_name = "TASK")]
    pub task: Option<String>,

    /// Export screenshots of every attempt into this directory
    #[arg(long, value_name = "DIR")]
    pub screenshots_dir: Option<PathBuf>,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start an interactive session (the default)
    Session(SessionArgs),

    /// Print the effective configuration as YAML
    Config,

    /// List prompt templates, or print one
    Prompts {
        /// Template name (planning, diagnosis, lookup)
        name: Option<String>,
    },
}

/// Whether an oracle API key variable is set
pub struct KeyCheck {
    pub provider: &'static str,
    pub env: &'static str,
    pub present: bool,
}

impl KeyCheck {
    pub fn check(provider: &'static str, env: &'static str) -> Self {
        debug!(provider, env, "KeyCheck::check: called");
        let present = std::env::var(env).map(|v| !v.trim().is_empty()).unwrap_or(false);
        Self { provider, env, present }
    }
}

/// Check the default key variable of every oracle provider
pub fn check_api_keys() -> Vec<KeyCheck> {
    debug!("check_api_keys: called");
    vec![
        KeyCheck::check("gemini", "GOOGLE_API_KEY"),
        KeyCheck::check("openai", "OPENAI_API_KEY"),
        KeyCheck::check("anthropic", "ANTHROPIC_API_KEY"),
    ]
}

/// Get the log file path
pub fn get_log_path() -> PathBuf {
    debug!("get_log_path: called");
    let path = log_dir().join("webpilot.log");
    debug!(?path, "get_log_path: returning path");
    path
}

/// Directory holding the log file
pub fn log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("webpilot")
        .join("logs")
}

/// Generate the after_help text with key checks and the log location
pub fn generate_after_help() -> String {
    debug!("generate_after_help: called");
    let keys = check_api_keys();
    let log_path = get_log_path();

    let mut help = String::new();

    help.push_str("Oracle API Keys:\n");
    for key in &keys {
        let icon = if key.present { "\u{2705}" } else { "\u{274C}" };
        let status = if key.present { "set" } else { "not set" };
        help.push_str(&format!("  {} {:<10} {:<18} {}\n", icon, key.provider, key.env, status));
    }

    help.push('\n');
    help.push_str(&format!("Logs are written to: {}\n", log_path.display()));

    debug!("generate_after_help: returning help text");
    help
}
