//! Anthropic Messages API client.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::auth::{CredentialStore, Service};
use crate::config::ClaudeConfig;
use crate::error::{Error, Result};

use super::CompletionProvider;

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize)]
struct MessageRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "str::is_empty")]
    system: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f64,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    #[serde(default)]
    model: String,
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(rename = "type")]
    error_type: String,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorBody,
}

/// Client for the Claude Messages API.
pub struct ClaudeClient {
    http: reqwest::Client,
    base_url: String,
    model_id: String,
    max_tokens: u32,
    temperature: f64,
    credentials: Arc<dyn CredentialStore>,
}

impl ClaudeClient {
    pub fn new(config: &ClaudeConfig, credentials: Arc<dyn CredentialStore>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|err| Error::Llm(err.to_string()))?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model_id: config.model_id.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            credentials,
        })
    }
}

#[async_trait]
impl CompletionProvider for ClaudeClient {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let creds = self.credentials.get(Service::Claude).await?;
        if creds.api_key.is_empty() {
            return Err(Error::Llm("no API key configured".to_string()));
        }

        let request = MessageRequest {
            model: &self.model_id,
            max_tokens: self.max_tokens,
            system: system_prompt,
            messages: vec![Message { role: "user", content: user_prompt }],
            temperature: self.temperature,
        };

        debug!(
            model = %self.model_id,
            system_len = system_prompt.len(),
            user_len = user_prompt.len(),
            "sending completion request"
        );

        let response = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &creds.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|err| Error::Llm(format!("request failed: {err}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| Error::Llm(format!("failed to read response: {err}")))?;

        if !status.is_success() {
            if let Ok(api_error) = serde_json::from_str::<ApiErrorResponse>(&body) {
                return Err(Error::Llm(format!(
                    "{}: {}",
                    api_error.error.error_type, api_error.error.message
                )));
            }
            return Err(Error::Llm(format!("status {status}: {body}")));
        }

        let message: MessageResponse = serde_json::from_str(&body)
            .map_err(|err| Error::Llm(format!("failed to decode response: {err}")))?;

        let text: String = message
            .content
            .iter()
            .filter(|block| block.block_type == "text")
            .map(|block| block.text.as_str())
            .collect();

        if let Some(usage) = &message.usage {
            debug!(
                model = %message.model,
                input_tokens = usage.input_tokens,
                output_tokens = usage.output_tokens,
                "received completion"
            );
        }
        Ok(text)
    }
}
