//! Oracle error types

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while calling the oracle
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("API error {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("API key not found. Set the {0} environment variable.")]
    MissingApiKey(String),

    #[error("Unknown oracle provider: '{0}'. Supported: gemini, openai, anthropic")]
    UnknownProvider(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl OracleError {
    /// Whether resubmitting the same request later could plausibly succeed
    ///
    /// Nothing retries automatically; planning failures mention it to the user.
    pub fn is_transient(&self) -> bool {
        match self {
            OracleError::RateLimited { .. } => true,
            OracleError::ApiError { status, .. } => *status >= 500,
            OracleError::Network(_) => true,
            OracleError::Timeout(_) => true,
            OracleError::InvalidResponse(_) => false,
            OracleError::MissingApiKey(_) => false,
            OracleError::UnknownProvider(_) => false,
            OracleError::Json(_) => false,
        }
    }
}
