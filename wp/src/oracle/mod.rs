//! Oracle module for webpilot
//!
//! The oracle is the text-generation service consulted for plan synthesis,
//! failure diagnosis and lookup reduction. Every backend implements the
//! [`Oracle`] trait and is chosen once from configuration.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

mod anthropic;
pub mod client;
mod error;
mod gemini;
mod openai;
mod types;

pub use anthropic::AnthropicOracle;
pub use client::Oracle;
pub use error::OracleError;
pub use gemini::GeminiOracle;
pub use openai::OpenAIOracle;
pub use types::{DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE, GenerateRequest};

use crate::config::OracleConfig;

/// Create an oracle based on the provider specified in config
///
/// Supports "gemini", "openai" and "anthropic" providers.
pub fn create_oracle(config: &OracleConfig) -> Result<Arc<dyn Oracle>, OracleError> {
    debug!(provider = %config.provider, model = %config.model(), "create_oracle: called");
    match config.provider.as_str() {
        "gemini" => {
            debug!("create_oracle: creating Gemini oracle");
            Ok(Arc::new(GeminiOracle::from_config(config)?))
        }
        "openai" => {
            debug!("create_oracle: creating OpenAI oracle");
            Ok(Arc::new(OpenAIOracle::from_config(config)?))
        }
        "anthropic" => {
            debug!("create_oracle: creating Anthropic oracle");
            Ok(Arc::new(AnthropicOracle::from_config(config)?))
        }
        other => {
            debug!(provider = %other, "create_oracle: unknown provider");
            Err(OracleError::UnknownProvider(other.to_string()))
        }
    }
}

/// Build the shared HTTP client for a backend
fn http_client(timeout: Duration) -> Result<reqwest::Client, OracleError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(OracleError::Network)
}

/// Map a send failure, keeping timeouts distinct from other network errors
fn send_error(error: reqwest::Error, timeout: Duration) -> OracleError {
    if error.is_timeout() {
        debug!(?timeout, "send_error: request timed out");
        OracleError::Timeout(timeout)
    } else {
        debug!(%error, "send_error: network error");
        OracleError::Network(error)
    }
}

/// Turn non-success statuses into typed errors
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, OracleError> {
    let status = response.status().as_u16();

    if status == 429 {
        debug!("check_status: rate limited (429)");
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(60);

        return Err(OracleError::RateLimited {
            retry_after: Duration::from_secs(retry_after),
        });
    }

    if !response.status().is_success() {
        debug!(%status, "check_status: API error");
        let text = response.text().await.unwrap_or_default();
        return Err(OracleError::ApiError { status, message: text });
    }

    Ok(response)
}
