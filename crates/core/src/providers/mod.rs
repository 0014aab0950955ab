//! Provider dispatch
//!
//! One adapter per upstream provider behind the `ProviderClient` trait:
//! - OpenAI (Chat Completions API)
//! - Claude (Messages API)
//! - Gemini (generateContent API)
//!
//! Each adapter owns its native wire types (typed structs, so schema drift
//! is caught at compile time), translates the normalized request to them,
//! and maps the response back. Adapters are immutable once constructed and
//! safe to share across requests. No retries happen at this layer: any
//! upstream failure surfaces as `GatewayError::Provider`.

pub mod claude;
pub mod gemini;
pub mod openai;

pub use claude::ClaudeClient;
pub use gemini::GeminiClient;
pub use openai::OpenAiClient;

use crate::config::ProviderCredentials;
use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// The closed set of supported upstream providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Provider {
    #[serde(rename = "OPENAI", alias = "openai")]
    OpenAi,
    #[serde(rename = "CLAUDE", alias = "claude", alias = "ANTHROPIC", alias = "anthropic")]
    Claude,
    #[serde(rename = "GEMINI", alias = "gemini")]
    Gemini,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Claude => "claude",
            Self::Gemini => "gemini",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message role in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One conversation message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Normalized chat request, provider-independent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub provider: Provider,
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub stream: bool,
}

impl ChatRequest {
    /// Schema and business-rule validation.
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(GatewayError::Validation("model must not be empty".into()));
        }
        if self.messages.is_empty() {
            return Err(GatewayError::Validation(
                "messages must not be empty".into(),
            ));
        }
        if !self.messages.iter().any(|m| m.role != Role::System) {
            return Err(GatewayError::Validation(
                "at least one non-system message is required".into(),
            ));
        }
        Ok(())
    }
}

/// Normalized token usage
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// One response choice
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatChoice {
    pub message: ChatMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Normalized chat response, provider-independent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub id: String,
    pub choices: Vec<ChatChoice>,
    #[serde(default)]
    pub usage: Option<ChatUsage>,
    pub model: String,
    pub created: i64,
}

impl ChatResponse {
    /// Text of the first assistant choice, if any
    pub fn first_text(&self) -> Option<&str> {
        self.choices.first().map(|c| c.message.content.as_str())
    }
}

/// Per-1k-token prices for a model
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPrice {
    pub input_per_1k: f64,
    pub output_per_1k: f64,
}

/// Provider adapter interface.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Which provider this adapter speaks to
    fn provider(&self) -> Provider;

    /// Send a chat request upstream and normalize the response.
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse>;

    /// Per-1k pricing for a model; unknown models get the default table row.
    fn price_for(&self, model: &str) -> ModelPrice;

    /// Cost of one exchange in USD.
    fn cost(&self, model: &str, usage: &ChatUsage) -> f64 {
        let price = self.price_for(model);
        usage.prompt_tokens as f64 / 1000.0 * price.input_per_1k
            + usage.completion_tokens as f64 / 1000.0 * price.output_per_1k
    }
}

/// Select and construct the adapter for a provider.
pub fn create_provider_client(
    provider: Provider,
    credentials: &ProviderCredentials,
) -> Arc<dyn ProviderClient> {
    let api_key = credentials.api_key.clone().unwrap_or_default();
    match provider {
        Provider::OpenAi => {
            let mut client = OpenAiClient::new(api_key);
            if let Some(base_url) = &credentials.base_url {
                client = client.with_base_url(base_url.clone());
            }
            Arc::new(client)
        }
        Provider::Claude => {
            let mut client = ClaudeClient::new(api_key);
            if let Some(base_url) = &credentials.base_url {
                client = client.with_base_url(base_url.clone());
            }
            Arc::new(client)
        }
        Provider::Gemini => {
            let mut client = GeminiClient::new(api_key);
            if let Some(base_url) = &credentials.base_url {
                client = client.with_base_url(base_url.clone());
            }
            Arc::new(client)
        }
    }
}

/// Normalize base URL by stripping trailing slashes and a trailing /v1
pub(crate) fn normalize_base_url(base_url: &str) -> String {
    base_url
        .trim_end_matches('/')
        .trim_end_matches("/v1")
        .trim_end_matches('/')
        .to_string()
}

/// POST a JSON body, returning status and raw body text.
pub(crate) async fn http_post_json<B: Serialize>(
    client: &reqwest::Client,
    url: &str,
    headers: Vec<(&str, &str)>,
    body: &B,
) -> Result<(reqwest::StatusCode, String)> {
    let mut request = client.post(url);
    for (key, value) in headers {
        request = request.header(key, value);
    }
    let response = request.json(body).send().await?;
    let status = response.status();
    let body = response.text().await?;
    Ok((status, body))
}
