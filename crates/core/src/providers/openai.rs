//! OpenAI adapter (Chat Completions API)

use super::{
    http_post_json, normalize_base_url, ChatChoice, ChatMessage, ChatRequest, ChatResponse,
    ChatUsage, ModelPrice, Provider, ProviderClient, Role,
};
use crate::error::{GatewayError, Result};
use crate::secret::SecretString;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// `(model, input $/1k, output $/1k)`; first column is an exact model id.
const PRICING: &[(&str, f64, f64)] = &[
    ("gpt-4o", 0.0025, 0.01),
    ("gpt-4o-mini", 0.000_15, 0.0006),
    ("gpt-4-turbo", 0.01, 0.03),
    ("gpt-4", 0.03, 0.06),
    ("gpt-3.5-turbo", 0.0005, 0.0015),
];

/// Default row for unknown models
const DEFAULT_PRICE: ModelPrice = ModelPrice {
    input_per_1k: 0.0025,
    output_per_1k: 0.01,
};

// OpenAI wire types

#[derive(Debug, Serialize)]
struct OpenAiMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct OpenAiChatRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAiMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChatResponse {
    id: String,
    model: String,
    created: i64,
    choices: Vec<OpenAiChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
    total_tokens: u64,
}

/// OpenAI chat client
pub struct OpenAiClient {
    api_key: SecretString,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::new(api_key.into()),
            base_url: "https://api.openai.com".to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = normalize_base_url(&base_url);
        self
    }

    fn build_request<'a>(&self, request: &'a ChatRequest) -> OpenAiChatRequest<'a> {
        // Messages pass through unchanged, system messages included
        let messages = request
            .messages
            .iter()
            .map(|m| OpenAiMessage {
                role: match m.role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                },
                content: &m.content,
            })
            .collect();

        OpenAiChatRequest {
            model: &request.model,
            messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        }
    }
}

#[async_trait]
impl ProviderClient for OpenAiClient {
    fn provider(&self) -> Provider {
        Provider::OpenAi
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let auth_header = format!("Bearer {}", self.api_key.expose());
        let body = self.build_request(request);

        let (status, text) = http_post_json(
            &self.client,
            &url,
            vec![("Authorization", auth_header.as_str())],
            &body,
        )
        .await?;

        if !status.is_success() {
            return Err(GatewayError::Provider {
                provider: "openai".to_string(),
                message: format!("{}: {}", status, text),
            });
        }

        let response: OpenAiChatResponse = serde_json::from_str(&text).map_err(|e| {
            GatewayError::Provider {
                provider: "openai".to_string(),
                message: format!("invalid response: {}", e),
            }
        })?;

        Ok(ChatResponse {
            id: response.id,
            choices: response
                .choices
                .into_iter()
                .map(|c| ChatChoice {
                    message: ChatMessage::new(Role::Assistant, c.message.content.unwrap_or_default()),
                    finish_reason: c.finish_reason,
                })
                .collect(),
            usage: response.usage.map(|u| ChatUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            }),
            model: response.model,
            created: response.created,
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
