//! Gemini backend for [`TextOracle`].

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use rig::client::CompletionClient;
use rig::completion::Prompt;
use rig::providers::gemini;
use secrecy::{ExposeSecret, SecretString};

use crate::config::GeminiConfig;
use crate::error::LlmError;

use super::TextOracle;
use super::prompts::{BUILDING_ANALYSIS_INSTRUCTION, IMAGE_DESCRIPTION_INSTRUCTION};

const PROVIDER: &str = "gemini";
const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Gemini via rig-core (text) and the generateContent REST endpoint (images).
pub struct GeminiOracle {
    client: gemini::Client,
    http: reqwest::Client,
    api_key: SecretString,
    model: String,
}

impl GeminiOracle {
    pub fn new(config: &GeminiConfig) -> Result<Self, LlmError> {
        let client = gemini::Client::new(config.api_key.expose_secret()).map_err(|e| {
            LlmError::RequestFailed {
                provider: PROVIDER.to_string(),
                reason: format!("Failed to create Gemini client: {e}"),
            }
        })?;

        Ok(Self {
            client,
            http: reqwest::Client::new(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl TextOracle for GeminiOracle {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn summarize(&self, text: &str) -> Result<String, LlmError> {
        let agent = self
            .client
            .agent(&self.model)
            .preamble(BUILDING_ANALYSIS_INSTRUCTION)
            .build();

        tracing::debug!(model = %self.model, chars = text.chars().count(), "Requesting summary");

        let response = agent
            .prompt(text)
            .await
            .map_err(|e| LlmError::RequestFailed {
                provider: PROVIDER.to_string(),
                reason: e.to_string(),
            })?;

        Ok(response.trim().to_string())
    }

    async fn describe_image(&self, image: &[u8], mime_type: &str) -> Result<String, LlmError> {
        let body = serde_json::json!({
            "contents": [{
                "parts": [
                    { "text": IMAGE_DESCRIPTION_INSTRUCTION },
                    { "inline_data": { "mime_type": mime_type, "data": BASE64.encode(image) } }
                ]
            }]
        });

        let resp = self
            .http
            .post(format!("{API_BASE}/models/{}:generateContent", self.model))
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed {
                provider: PROVIDER.to_string(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(LlmError::RateLimited {
                provider: PROVIDER.to_string(),
                retry_after: None,
            });
        }
        if !status.is_success() {
            let err = resp.text().await.unwrap_or_default();
            return Err(LlmError::RequestFailed {
                provider: PROVIDER.to_string(),
                reason: format!("generateContent failed ({status}): {err}"),
            });
        }

        let data: serde_json::Value = resp.json().await.map_err(|e| LlmError::InvalidResponse {
            provider: PROVIDER.to_string(),
            reason: e.to_string(),
        })?;

        parse_generated_text(&data)
    }
}

/// Concatenate the text parts of the first candidate of a generateContent reply.
fn parse_generated_text(data: &serde_json::Value) -> Result<String, LlmError> {
    let parts = data
        .pointer("/candidates/0/content/parts")
        .and_then(serde_json::Value::as_array)
        .ok_or_else(|| LlmError::InvalidResponse {
            provider: PROVIDER.to_string(),
            reason: "no candidate content in response".to_string(),
        })?;

    let text = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(serde_json::Value::as_str))
        .collect::<Vec<_>>()
        .join("");

    if text.trim().is_empty() {
        return Err(LlmError::InvalidResponse {
            provider: PROVIDER.to_string(),
            reason: "empty text in response".to_string(),
        });
    }
    Ok(text.trim().to_string())
}
