//! Claude adapter (Messages API)
//!
//! The Messages API takes the system prompt as a dedicated `system` field
//! and reports usage as `input_tokens` / `output_tokens`; the adapter splits
//! off the first system message and sums the two counters for the total.

use super::{
    http_post_json, normalize_base_url, ChatChoice, ChatMessage, ChatRequest, ChatResponse,
    ChatUsage, ModelPrice, Provider, ProviderClient, Role,
};
use crate::error::{GatewayError, Result};
use crate::secret::SecretString;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Messages API requires max_tokens; used when the caller leaves it unset
const DEFAULT_MAX_TOKENS: u32 = 4096;

const PRICING: &[(&str, f64, f64)] = &[
    ("claude-3-5-sonnet-20241022", 0.003, 0.015),
    ("claude-3-5-haiku-20241022", 0.0008, 0.004),
    ("claude-3-opus-20240229", 0.015, 0.075),
    ("claude-3-haiku-20240307", 0.000_25, 0.001_25),
];

const DEFAULT_PRICE: ModelPrice = ModelPrice {
    input_per_1k: 0.003,
    output_per_1k: 0.015,
};

// Claude wire types

#[derive(Debug, Serialize)]
struct ClaudeMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ClaudeChatRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<ClaudeMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ClaudeChatResponse {
    id: String,
    model: String,
    content: Vec<ClaudeContentBlock>,
    stop_reason: Option<String>,
    usage: ClaudeUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ClaudeContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
}

#[derive(Debug, Deserialize)]
struct ClaudeUsage {
    input_tokens: u64,
    output_tokens: u64,
}

/// Claude chat client
pub struct ClaudeClient {
    api_key: SecretString,
    base_url: String,
    client: reqwest::Client,
}

impl ClaudeClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::new(api_key.into()),
            base_url: "https://api.anthropic.com".to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = normalize_base_url(&base_url);
        self
    }

    fn build_request<'a>(&self, request: &'a ChatRequest) -> ClaudeChatRequest<'a> {
        // First system message becomes the dedicated system field; the
        // remaining messages are sent as-is.
        let system = request
            .messages
            .iter()
            .find(|m| m.role == Role::System)
            .map(|m| m.content.as_str());

        let messages = request
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| ClaudeMessage {
                role: match m.role {
                    Role::Assistant => "assistant",
                    _ => "user",
                },
                content: &m.content,
            })
            .collect();

        ClaudeChatRequest {
            model: &request.model,
            max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            messages,
            system,
            temperature: request.temperature,
        }
    }
}

#[async_trait]
impl ProviderClient for ClaudeClient {
    fn provider(&self) -> Provider {
        Provider::Claude
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = self.build_request(request);

        let (status, text) = http_post_json(
            &self.client,
            &url,
            vec![
                ("x-api-key", self.api_key.expose()),
                ("anthropic-version", ANTHROPIC_VERSION),
            ],
            &body,
        )
        .await?;

        if !status.is_success() {
            return Err(GatewayError::Provider {
                provider: "claude".to_string(),
                message: format!("{}: {}", status, text),
            });
        }

        let response: ClaudeChatResponse = serde_json::from_str(&text).map_err(|e| {
            GatewayError::Provider {
                provider: "claude".to_string(),
                message: format!("invalid response: {}", e),
            }
        })?;

        let content = response
            .content
            .into_iter()
            .map(|ClaudeContentBlock::Text { text }| text)
            .collect::<Vec<_>>()
            .join("");

        let usage = ChatUsage {
            prompt_tokens: response.usage.input_tokens,
            completion_tokens: response.usage.output_tokens,
            total_tokens: response.usage.input_tokens + response.usage.output_tokens,
        };

        Ok(ChatResponse {
            id: response.id,
            choices: vec![ChatChoice {
                message: ChatMessage::new(Role::Assistant, content),
                finish_reason: response.stop_reason,
            }],
            usage: Some(usage),
            model: response.model,
            created: chrono::Utc::now().timestamp(),
        })
    }

    fn price_for(&self, model: &str) -> ModelPrice {
        PRICING
            .iter()
            .find(|(id, _, _)| *id == model)
            .map(|(_, input, output)| ModelPrice {
                input_per_1k: *input,
                output_per_1k: *output,
            })
            .unwrap_or(DEFAULT_PRICE)
    }
}
