//! Google Gemini API oracle
//!
//! Implements the Oracle trait for the Generative Language `generateContent`
//! endpoint.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::{GenerateRequest, Oracle, OracleError, check_status, http_client, send_error};
use crate::config::OracleConfig;

/// Gemini API oracle
pub struct GeminiOracle {
    model: String,
    api_key: String,
    base_url: String,
    http: Client,
    max_tokens: u32,
    temperature: f32,
    timeout: Duration,
}

impl GeminiOracle {
    /// Create a new oracle from configuration
    pub fn from_config(config: &OracleConfig) -> Result<Self, OracleError> {
        debug!(model = %config.model(), "GeminiOracle::from_config: called");
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

    /// Build the request body for the Gemini API
    fn build_request_body(&self, request: &GenerateRequest) -> serde_json::Value {
        debug!(%self.model, %request.max_tokens, "build_request_body: called");
        serde_json::json!({
            "systemInstruction": {
                "parts": [{ "text": request.system_prompt }]
            },
            "contents": [{
                "role": "user",
                "parts": [{ "text": request.prompt }]
            }],
            "generationConfig": {
                "temperature": self.temperature,
                "maxOutputTokens": request.max_tokens.min(self.max_tokens),
            }
        })
    }

    /// Concatenate the text parts of the first candidate
    fn parse_response(&self, api_response: GeminiResponse) -> Result<String, OracleError> {
        debug!(candidates = api_response.candidates.len(), "parse_response: called");
        let candidate = api_response
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| OracleError::InvalidResponse("Gemini returned no candidates".to_string()))?;

        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.is_empty() {
            debug!(finish_reason = ?candidate.finish_reason, "parse_response: empty candidate");
            return Err(OracleError::InvalidResponse(format!(
                "Gemini returned an empty candidate (finish reason: {})",
                candidate.finish_reason.as_deref().unwrap_or("unknown")
            )));
        }

        Ok(text)
    }
}

#[async_trait]
impl Oracle for GeminiOracle {
    async fn generate(&self, request: GenerateRequest) -> Result<String, OracleError> {
        debug!(%self.model, "GeminiOracle::generate: called");
        let url = format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model);
        let body = self.build_request_body(&request);

        let response = self
            .http
            .post(url)
            .header("x-goog-api-key", self.api_key.clone())
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| send_error(e, self.timeout))?;

        let response = check_status(response).await?;
        let api_response: GeminiResponse = response.json().await?;
        self.parse_response(api_response)
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    text: Option<String>,
}
