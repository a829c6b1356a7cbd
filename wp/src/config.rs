//! webpilot configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::execution::DEFAULT_MAX_STEPS;
use crate::oracle::{DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE, OracleError};

/// Main webpilot configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR); the CLI flag wins
    #[serde(rename = "log-level", skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Oracle provider configuration
    pub oracle: OracleConfig,

    /// Execution agent configuration
    pub agent: AgentConfig,

    /// Optional search/lookup grounding
    pub lookup: LookupConfig,

    /// Prompt template overrides
    pub prompts: PromptsConfig,

    /// Interactive session settings
    pub session: SessionConfig,
}

impl Config {
    /// Validate configuration before use
    ///
    /// Fails fast when the oracle API key variable is not set.
    pub fn validate(&self) -> Result<()> {
        self.oracle.get_api_key()?;
        if self.agent.command.trim().is_empty() {
            return Err(eyre::eyre!("agent.command must not be empty"));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Project-local config: .webpilot.yml
        let local_config = PathBuf::from(".webpilot.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // User config: ~/.config/webpilot/webpilot.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("webpilot").join("webpilot.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read only the log level, before logging is set up
    ///
    /// Errors are swallowed: a broken config file is reported later by `load`.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        let candidates: Vec<PathBuf> = match config_path {
            Some(path) => vec![path.clone()],
            None => {
                let mut paths = vec![PathBuf::from(".webpilot.yml")];
                if let Some(config_dir) = dirs::config_dir() {
                    paths.push(config_dir.join("webpilot").join("webpilot.yml"));
                }
                paths
            }
        };

        candidates
            .iter()
            .filter(|p| p.exists())
            .find_map(|p| Self::load_from_file(p).ok())
            .and_then(|c| c.log_level)
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Oracle provider configuration
///
/// `model`, `api-key-env` and `base-url` fall back to per-provider defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    /// Provider name: gemini, openai or anthropic
    pub provider: String,

    /// Model identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Environment variable containing the API key
    #[serde(rename = "api-key-env", skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    /// API base URL
    #[serde(rename = "base-url", skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Maximum tokens per reply
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,

    /// Sampling temperature
    pub temperature: f32,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            model: None,
            api_key_env: None,
            base_url: None,
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            timeout_ms: 120_000,
        }
    }
}

impl OracleConfig {
    /// Model identifier, or the provider default
    pub fn model(&self) -> String {
        self.model.clone().unwrap_or_else(|| {
            match self.provider.as_str() {
                "openai" => "gpt-4o",
                "anthropic" => "claude-sonnet-4-20250514",
                _ => "gemini-2.0-flash",
            }
            .to_string()
        })
    }

    /// API key environment variable, or the provider default
    pub fn api_key_env(&self) -> String {
        self.api_key_env.clone().unwrap_or_else(|| {
            match self.provider.as_str() {
                "openai" => "OPENAI_API_KEY",
                "anthropic" => "ANTHROPIC_API_KEY",
                _ => "GOOGLE_API_KEY",
            }
            .to_string()
        })
    }

    /// API base URL, or the provider default
    pub fn base_url(&self) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| {
                match self.provider.as_str() {
                    "openai" => "https://api.openai.com",
                    "anthropic" => "https://api.anthropic.com",
                    _ => "https://generativelanguage.googleapis.com",
                }
                .to_string()
            })
            .trim_end_matches('/')
            .to_string()
    }

    /// Read the API key from the configured environment variable
    pub fn get_api_key(&self) -> Result<String, OracleError> {
        let env = self.api_key_env();
        debug!(%env, "OracleConfig::get_api_key: called");
        match std::env::var(&env) {
            Ok(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(OracleError::MissingApiKey(env)),
        }
    }
}

/// Execution agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Program that drives the browser and speaks the JSON-lines event protocol
    pub command: String,

    /// Extra arguments passed to the program
    pub args: Vec<String>,

    /// Step budget handed to the agent
    #[serde(rename = "max-steps")]
    pub max_steps: u32,

    /// Wall-clock limit for one execution attempt in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    /// Working directory for the agent process
    #[serde(rename = "working-dir", skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            command: "browser-agent".to_string(),
            args: Vec::new(),
            max_steps: DEFAULT_MAX_STEPS,
            timeout_ms: 1_800_000,
            working_dir: None,
        }
    }
}

/// Search/lookup grounding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupConfig {
    /// Ground new tasks with a lookup before planning
    pub enabled: bool,

    /// Lookup API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Maximum related results folded into the lookup text
    #[serde(rename = "max-results")]
    pub max_results: usize,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: "https://api.duckduckgo.com".to_string(),
            max_results: 3,
            timeout_ms: 15_000,
        }
    }
}

/// Prompt template configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptsConfig {
    /// Directory with `{name}.pmt` overrides
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
}

impl PromptsConfig {
    /// Override directory with `~/` expanded
    pub fn expanded_dir(&self) -> Option<PathBuf> {
        self.dir.as_deref().map(expand_home)
    }
}

/// Interactive session settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Export each attempt's screenshots here
    #[serde(rename = "screenshots-dir", skip_serializing_if = "Option::is_none")]
    pub screenshots_dir: Option<String>,
}

impl SessionConfig {
    /// Screenshot directory with `~/` expanded
    pub fn expanded_screenshots_dir(&self) -> Option<PathBuf> {
        self.screenshots_dir.as_deref().map(expand_home)
    }
}

/// Resolve a leading `~/` against the home directory
fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.oracle.provider, "gemini");
        assert_eq!(config.agent.max_steps, 100);
        assert!(!config.lookup.enabled);
        assert!(config.log_level.is_none());
    }

    #[test]
    fn test_provider_defaults() {
        let gemini = OracleConfig::default();
        assert_eq!(gemini.api_key_env(), "GOOGLE_API_KEY");
        assert!(gemini.model().starts_with("gemini"));

        let openai = OracleConfig {
            provider: "openai".to_string(),
            ..Default::default()
        };
        assert_eq!(openai.api_key_env(), "OPENAI_API_KEY");
        assert_eq!(openai.base_url(), "https://api.openai.com");

        let anthropic = OracleConfig {
            provider: "anthropic".to_string(),
            base_url: Some("https://proxy.example.com/".to_string()),
            ..Default::default()
        };
        assert_eq!(anthropic.base_url(), "https://proxy.example.com");
        assert!(anthropic.model().contains("sonnet"));
    }

    #[test]
    fn test_deserialize_config() {
        let yaml = r#"
log-level: debug

oracle:
  provider: openai
  model: gpt-4.1
  api-key-env: MY_KEY
  max-tokens: 2048
  temperature: 0.1

agent:
  command: python
  args: ["-m", "agent_runner"]
  max-steps: 40
  timeout-ms: 60000

lookup:
  enabled: true
  max-results: 5

session:
  screenshots-dir: /tmp/shots
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(config.oracle.model(), "gpt-4.1");
        assert_eq!(config.oracle.api_key_env(), "MY_KEY");
        assert_eq!(config.oracle.max_tokens, 2048);
        assert_eq!(config.agent.command, "python");
        assert_eq!(config.agent.args, vec!["-m", "agent_runner"]);
        assert_eq!(config.agent.max_steps, 40);
        assert!(config.lookup.enabled);
        assert_eq!(config.lookup.max_results, 5);
        assert_eq!(
            config.session.expanded_screenshots_dir(),
            Some(PathBuf::from("/tmp/shots"))
        );
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let yaml = r#"
oracle:
  model: gemini-1.5-pro
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.oracle.model(), "gemini-1.5-pro");
        assert_eq!(config.oracle.provider, "gemini");
        assert_eq!(config.agent.max_steps, 100);
        assert_eq!(config.lookup.base_url, "https://api.duckduckgo.com");
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("webpilot.yml");
        fs::write(&path, "log-level: warn\nagent:\n  max-steps: 7\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.agent.max_steps, 7);
        assert_eq!(Config::load_log_level(Some(&path)).as_deref(), Some("warn"));
    }

    #[test]
    fn test_load_explicit_missing_file_fails() {
        let path = PathBuf::from("/nonexistent/webpilot.yml");
        assert!(Config::load(Some(&path)).is_err());
        assert!(Config::load_log_level(Some(&path)).is_none());
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home("/abs/path"), PathBuf::from("/abs/path"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~/shots"), home.join("shots"));
        }
    }

    #[test]
    #[serial]
    fn test_api_key_from_env() {
        let config = OracleConfig {
            api_key_env: Some("WEBPILOT_TEST_API_KEY".to_string()),
            ..Default::default()
        };

        unsafe { std::env::remove_var("WEBPILOT_TEST_API_KEY") };
        assert!(matches!(config.get_api_key(), Err(OracleError::MissingApiKey(_))));

        unsafe { std::env::set_var("WEBPILOT_TEST_API_KEY", "secret") };
        assert_eq!(config.get_api_key().unwrap(), "secret");

        unsafe { std::env::remove_var("WEBPILOT_TEST_API_KEY") };
    }

    #[test]
    #[serial]
    fn test_validate_requires_api_key() {
        let mut config = Config::default();
        config.oracle.api_key_env = Some("WEBPILOT_TEST_VALIDATE_KEY".to_string());

        unsafe { std::env::remove_var("WEBPILOT_TEST_VALIDATE_KEY") };
        assert!(config.validate().is_err());

        unsafe { std::env::set_var("WEBPILOT_TEST_VALIDATE_KEY", "k") };
        assert!(config.validate().is_ok());

        config.agent.command = "  ".to_string();
        assert!(config.validate().is_err());

        unsafe { std::env::remove_var("WEBPILOT_TEST_VALIDATE_KEY") };
    }
}
