//! Anthropic Claude API oracle
//!
//! Implements the Oracle trait for Anthropic's Messages API.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::{GenerateRequest, Oracle, OracleError, check_status, http_client, send_error};
use crate::config::OracleConfig;

/// Anthropic Claude API oracle
pub struct AnthropicOracle {
    model: String,
    api_key: String,
    base_url: String,
    http: Client,
    max_tokens: u32,
    temperature: f32,
    timeout: Duration,
}

impl AnthropicOracle {
    /// Create a new oracle from configuration
    ///
    /// Reads the API key from the environment variable named in config.
    pub fn from_config(config: &OracleConfig) -> Result<Self, OracleError> {
        debug!(model = %config.model(), "AnthropicOracle::from_config: called");
        let api_key = config.get_api_key()?;
        let timeout = Duration::from_millis(config.timeout_ms);

        Ok(Self {
            model: config.model(),
            api_key,
            base_url: config.base_url(),
            http: http_client(timeout)?,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            timeout,
        })
    }

    /// Build the request body for the Anthropic API
    fn build_request_body(&self, request: &GenerateRequest) -> serde_json::Value {
        debug!(%self.model, %request.max_tokens, "build_request_body: called");
        serde_json::json!({
            "model": self.model,
            "max_tokens": request.max_tokens.min(self.max_tokens),
            "temperature": self.temperature,
            "system": request.system_prompt,
            "messages": [{ "role": "user", "content": request.prompt }],
        })
    }

    /// Join the text blocks of the reply
    fn parse_response(&self, api_response: AnthropicResponse) -> Result<String, OracleError> {
        debug!(?api_response.stop_reason, "parse_response: called");
        let text: String = api_response
            .content
            .into_iter()
            .filter_map(|block| match block {
                AnthropicContentBlock::Text { text } => Some(text),
                AnthropicContentBlock::Other => None,
            })
            .collect();

        if text.is_empty() {
            return Err(OracleError::InvalidResponse(
                "Anthropic returned no text content".to_string(),
            ));
        }
        Ok(text)
    }
}

#[async_trait]
impl Oracle for AnthropicOracle {
    async fn generate(&self, request: GenerateRequest) -> Result<String, OracleError> {
        debug!(%self.model, "AnthropicOracle::generate: called");
        let url = format!("{}/v1/messages", self.base_url);
        let body = self.build_request_body(&request);

        let response = self
            .http
            .post(url)
            .header("x-api-key", self.api_key.clone())
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| send_error(e, self.timeout))?;

        let response = check_status(response).await?;
        let api_response: AnthropicResponse = response.json().await?;
        self.parse_response(api_response)
    }

    fn name(&self) -> &str {
        "anthropic"
    }
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<AnthropicContentBlock>,
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum AnthropicContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oracle() -> AnthropicOracle {
        AnthropicOracle {
            model: "claude-sonnet-4".to_string(),
            api_key: "test-key".to_string(),
            base_url: "https://api.anthropic.com".to_string(),
            http: Client::new(),
            max_tokens: 1000,
            temperature: 0.3,
            timeout: Duration::from_secs(30),
        }
    }

    #[test]
    fn test_build_request_body() {
        let body = oracle().build_request_body(&GenerateRequest::new("You are helpful", "Hello").with_max_tokens(500));

        assert_eq!(body["model"], "claude-sonnet-4");
        assert_eq!(body["max_tokens"], 500);
        assert_eq!(body["system"], "You are helpful");
        assert_eq!(body["messages"][0]["content"], "Hello");
    }

    #[test]
    fn test_max_tokens_capped() {
        let body = oracle().build_request_body(&GenerateRequest::new("Test", "p").with_max_tokens(5000));

        // Should be capped to the configured budget
        assert_eq!(body["max_tokens"], 1000);
    }

    #[test]
    fn test_parse_response_skips_non_text_blocks() {
        let api: AnthropicResponse = serde_json::from_value(serde_json::json!({
            "content": [
                { "type": "thinking", "thinking": "..." },
                { "type": "text", "text": "{\"complete\": false}" }
            ],
            "stop_reason": "end_turn"
        }))
        .unwrap();

        assert_eq!(oracle().parse_response(api).unwrap(), "{\"complete\": false}");
    }
}
