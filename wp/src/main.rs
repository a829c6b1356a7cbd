//! webpilot - human-in-the-loop planner and supervisor for browser agents
//!
//! CLI entry point. The interactive session blocks on the terminal while the
//! execution bridge runs each long operation on its own worker runtime, so
//! `main` itself is synchronous.

use std::fs;

use clap::{CommandFactory, FromArgMatches};
use eyre::{Context, Result};
use tracing::{debug, info};

use webpilot::cli::{Cli, Command, generate_after_help, get_log_path, log_dir};
use webpilot::config::Config;
use webpilot::prompts::PromptLoader;
use webpilot::prompts::embedded;
use webpilot::repl;

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Can't log params here since logging isn't initialized yet
    fs::create_dir_all(log_dir()).context("Failed to create log directory")?;

    // Priority: CLI --log-level > config file > INFO
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(get_log_path()).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

fn main() -> Result<()> {
    let cmd = Cli::command().after_help(generate_after_help());
    let cli = Cli::from_arg_matches(&cmd.get_matches())?;

    // Log level from the config file, before the full load
    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let mut config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    info!(provider = %config.oracle.provider, agent = %config.agent.command, "webpilot loaded config");

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Some(Command::Config) => cmd_config(&config),
        Some(Command::Prompts { ref name }) => cmd_prompts(&config, name.as_deref()),
        Some(Command::Session(_)) | None => {
            let session = cli.session_args().cloned().unwrap_or_default();
            if let Some(dir) = session.screenshots_dir {
                debug!(?dir, "main: screenshots dir from CLI");
                config.session.screenshots_dir = Some(dir.display().to_string());
            }
            repl::run_interactive(&config, session.task)
        }
    }
}

/// Print the effective configuration
fn cmd_config(config: &Config) -> Result<()> {
    debug!("cmd_config: called");
    let yaml = serde_yaml::to_string(config).context("Failed to serialize configuration")?;
    print!("{}", yaml);
    Ok(())
}

/// List prompt templates, or print the one named
fn cmd_prompts(config: &Config, name: Option<&str>) -> Result<()> {
    debug!(?name, "cmd_prompts: called");
    match name {
        Some(name) => {
            let loader = PromptLoader::new(config.prompts.expanded_dir());
            let template = loader.load_template(name)?;
            println!("{}", template.trim_end());
        }
        None => {
            for name in embedded::NAMES {
                println!("{}", name);
            }
        }
    }
    Ok(())
}
