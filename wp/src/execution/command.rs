//! CommandAgent - run an external browser agent as a child process
//!
//! Protocol: the task text is written to the child's stdin, the step budget is
//! passed as `WEBPILOT_MAX_STEPS`, and the child reports on stdout with one
//! JSON object per line:
//!
//! ```text
//! {"type":"progress","step":1,"screenshot":"data:image/png;base64,..."}
//! {"type":"completed","artifact":"/tmp/history.gif"}
//! {"type":"failed","error":"element not found"}
//! ```
//!
//! Lines that are not part of the protocol are logged and ignored.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::agent::{AgentError, AgentJob, AgentOutcome, AgentProgress, ExecutionAgent};
use super::screenshot::Screenshot;
use crate::config::AgentConfig;

/// Environment variable carrying the step budget
pub const MAX_STEPS_ENV: &str = "WEBPILOT_MAX_STEPS";

/// Longest stderr tail carried into a failure message
const STDERR_TAIL_CHARS: usize = 2_000;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum AgentLine {
    Progress {
        #[serde(default)]
        step: Option<u32>,
        #[serde(default)]
        screenshot: Option<String>,
    },
    Completed {
        #[serde(default)]
        artifact: Option<String>,
    },
    Failed {
        error: String,
    },
}

/// Agent backed by an external command
pub struct CommandAgent {
    command: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
}

impl CommandAgent {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            working_dir: None,
        }
    }

    pub fn from_config(config: &AgentConfig) -> Self {
        debug!(command = %config.command, args = ?config.args, "CommandAgent::from_config: called");
        Self {
            command: config.command.clone(),
            args: config.args.clone(),
            working_dir: config.working_dir.clone(),
        }
    }

}

#[async_trait]
impl ExecutionAgent for CommandAgent {
    async fn run(
        &self,
        job: AgentJob,
        progress: mpsc::UnboundedSender<AgentProgress>,
    ) -> Result<AgentOutcome, AgentError> {
        debug!(command = %self.command, max_steps = job.max_steps, "CommandAgent::run: called");

        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args)
            .env(MAX_STEPS_ENV, job.max_steps.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(ref dir) = self.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|source| AgentError::Spawn {
            command: self.command.clone(),
            source,
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            // A child that never reads stdin closes the pipe early
            if let Err(e) = stdin.write_all(job.task.as_bytes()).await {
                debug!(error = %e, "CommandAgent::run: stdin write failed");
            }
            drop(stdin);
        }

        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut buf = String::new();
                let _ = stderr.read_to_string(&mut buf).await;
                buf
            })
        });

        let mut terminal: Option<Result<AgentOutcome, AgentError>> = None;
        let mut last_step = 0u32;

        if let Some(stdout) = child.stdout.take() {
            let mut reader = BufReader::new(stdout);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                if reader.read_until(b'\n', &mut buf).await? == 0 {
                    break;
                }
                // Stray binary output is not protocol, but must not end the read
                let text = String::from_utf8_lossy(&buf);
                let line = text.trim();
                if line.is_empty() {
                    continue;
                }

                match serde_json::from_str::<AgentLine>(line) {
                    Ok(AgentLine::Progress { step, screenshot }) => {
                        // Keep steps strictly increasing whatever the child reports
                        let Some(step) = step.filter(|s| *s > last_step).or_else(|| last_step.checked_add(1)) else {
                            warn!("Agent step counter exhausted; ignoring progress");
                            continue;
                        };
                        last_step = step;

                        let screenshot = screenshot.and_then(|s| match Screenshot::decode(&s) {
                            Ok(shot) => Some(shot),
                            Err(e) => {
                                warn!(step, error = %e, "Agent screenshot could not be decoded");
                                None
                            }
                        });
                        let _ = progress.send(AgentProgress { step, screenshot });
                    }
                    Ok(AgentLine::Completed { artifact }) => {
                        terminal = Some(Ok(AgentOutcome {
                            artifact: artifact.filter(|a| !a.is_empty()).map(PathBuf::from),
                        }));
                    }
                    Ok(AgentLine::Failed { error }) => {
                        terminal = Some(Err(AgentError::Failed(error)));
                    }
                    Err(_) => debug!(%line, "CommandAgent::run: ignoring non-protocol line"),
                }
            }
        }

        let status = child.wait().await?;
        let stderr = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };
        info!(%status, steps = last_step, "Agent process exited");

        match terminal {
            Some(result) => result,
            None if status.success() => Ok(AgentOutcome::default()),
            None => {
                let tail = stderr_tail(&stderr);
                let message = if tail.is_empty() {
                    format!("agent exited with {}", status)
                } else {
                    format!("agent exited with {}: {}", status, tail)
                };
                Err(AgentError::Failed(message))
            }
        }
    }

    fn name(&self) -> &str {
        &self.command
    }
}

fn stderr_tail(stderr: &str) -> &str {
    let trimmed = stderr.trim();
    if trimmed.len() <= STDERR_TAIL_CHARS {
        return trimmed;
    }
    let mut start = trimmed.len() - STDERR_TAIL_CHARS;
    while !trimmed.is_char_boundary(start) {
        start += 1;
    }
    &trimmed[start..]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> CommandAgent {
        CommandAgent::new("sh", vec!["-c".to_string(), script.to_string()])
    }

    fn job(task: &str) -> AgentJob {
        AgentJob {
            task: task.to_string(),
            max_steps: 5,
        }
    }

    async fn run(agent: &CommandAgent, task: &str) -> (Result<AgentOutcome, AgentError>, Vec<AgentProgress>) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let result = agent.run(job(task), tx).await;
        let mut steps = Vec::new();
        while let Ok(p) = rx.try_recv() {
            steps.push(p);
        }
        (result, steps)
    }

    #[tokio::test]
    async fn test_progress_then_completed() {
        let agent = sh(r#"
            echo '{"type":"progress","step":1}'
            echo 'some debug chatter'
            echo '{"type":"progress","step":2,"screenshot":"data:image/png;base64,iVBORw0KGgo="}'
            echo '{"type":"completed","artifact":"/tmp/run.gif"}'
        "#);

        let (result, steps) = run(&agent, "plan").await;
        assert_eq!(result.unwrap().artifact, Some(PathBuf::from("/tmp/run.gif")));
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].step, 1);
        assert!(steps[0].screenshot.is_none());
        assert_eq!(steps[1].step, 2);
        assert!(steps[1].screenshot.is_some());
    }

    #[tokio::test]
    async fn test_binary_chatter_does_not_end_the_run() {
        let agent = sh(r#"
            printf '\377\376 binary chatter\n'
            echo '{"type":"progress","step":1}'
            echo '{"type":"completed"}'
        "#);

        let (result, steps) = run(&agent, "plan").await;
        assert_eq!(result.unwrap(), AgentOutcome::default());
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].step, 1);
    }

    #[tokio::test]
    async fn test_step_counter_at_limit() {
        let agent = sh(r#"
            echo '{"type":"progress","step":4294967295}'
            echo '{"type":"progress"}'
            echo '{"type":"failed","error":"gave up"}'
        "#);

        let (result, steps) = run(&agent, "plan").await;
        assert_eq!(result.unwrap_err().to_string(), "gave up");
        let numbers: Vec<u32> = steps.iter().map(|p| p.step).collect();
        assert_eq!(numbers, vec![u32::MAX]);
    }

    #[tokio::test]
    async fn test_working_dir_from_config() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = AgentConfig {
            command: "sh".to_string(),
            args: vec![
                "-c".to_string(),
                r#"printf '{"type":"failed","error":"%s"}\n' "$(pwd -P)""#.to_string(),
            ],
            working_dir: Some(dir.path().to_path_buf()),
            ..AgentConfig::default()
        };

        let (result, _) = run(&CommandAgent::from_config(&config), "plan").await;
        let expected = dir.path().canonicalize().unwrap();
        assert_eq!(result.unwrap_err().to_string(), expected.display().to_string());
    }

    #[tokio::test]
    async fn test_failed_line_keeps_error_text() {
        let agent = sh(r#"echo '{"type":"failed","error":"element not found"}'"#);
        let (result, _) = run(&agent, "plan").await;
        assert_eq!(result.unwrap_err().to_string(), "element not found");
    }

    #[tokio::test]
    async fn test_task_on_stdin_and_budget_in_env() {
        let agent = sh(r#"
            read -r task
            printf '{"type":"failed","error":"%s/%s"}\n' "$task" "$WEBPILOT_MAX_STEPS"
        "#);
        let (result, _) = run(&agent, "open-site\n").await;
        assert_eq!(result.unwrap_err().to_string(), "open-site/5");
    }

    #[tokio::test]
    async fn test_nonzero_exit_carries_stderr() {
        let agent = sh("echo 'browser crashed' >&2; exit 3");
        let (result, _) = run(&agent, "plan").await;
        let message = result.unwrap_err().to_string();
        assert!(message.contains("browser crashed"), "{message}");
    }

    #[tokio::test]
    async fn test_clean_exit_without_terminal_line_succeeds() {
        let (result, _) = run(&sh("true"), "plan").await;
        assert_eq!(result.unwrap(), AgentOutcome::default());
    }

    #[tokio::test]
    async fn test_steps_stay_increasing() {
        let agent = sh(r#"
            echo '{"type":"progress","step":3}'
            echo '{"type":"progress","step":1}'
            echo '{"type":"progress"}'
        "#);
        let (_, steps) = run(&agent, "plan").await;
        let numbers: Vec<u32> = steps.iter().map(|p| p.step).collect();
        assert_eq!(numbers, vec![3, 4, 5]);
    }

    #[tokio::test]
    async fn test_missing_program() {
        let agent = CommandAgent::new("/nonexistent/webpilot-agent", Vec::new());
        let (result, _) = run(&agent, "plan").await;
        assert!(matches!(result, Err(AgentError::Spawn { .. })));
    }

    #[test]
    fn test_stderr_tail() {
        assert_eq!(stderr_tail("  short \n"), "short");
        let long = "x".repeat(STDERR_TAIL_CHARS + 10);
        assert_eq!(stderr_tail(&long).len(), STDERR_TAIL_CHARS);
    }
}
