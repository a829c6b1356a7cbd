//! Oracle request types

use tracing::debug;

/// A generation request - everything needed for one oracle call
///
/// Sampling temperature is a property of the configured backend, not of the
/// request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateRequest {
    /// System prompt (rendered from a prompt template)
    pub system_prompt: String,

    /// The single user prompt
    pub prompt: String,

    /// Max tokens for the reply (capped by the backend's configured budget)
    pub max_tokens: u32,
}

impl GenerateRequest {
    /// Create a request with the default token budget
    pub fn new(system_prompt: impl Into<String>, prompt: impl Into<String>) -> Self {
        debug!("GenerateRequest::new: called");
        Self {
            system_prompt: system_prompt.into(),
            prompt: prompt.into(),
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    /// Override the token budget
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Default reply budget for planning and diagnosis calls
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Default sampling temperature
pub const DEFAULT_TEMPERATURE: f32 = 0.3;
