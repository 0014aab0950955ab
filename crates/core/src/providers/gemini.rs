//! Gemini adapter (generateContent API)
//!
//! Gemini models a conversation as prior history plus the final user turn,
//! with role `assistant` mapped to `model`. The REST shape carries both in
//! one ordered `contents` array; the system message becomes
//! `systemInstruction`. Usage comes from the response's `usageMetadata`.

use super::{
    http_post_json, normalize_base_url, ChatChoice, ChatMessage, ChatRequest, ChatResponse,
    ChatUsage, ModelPrice, Provider, ProviderClient, Role,
};
use crate::error::{GatewayError, Result};
use crate::secret::SecretString;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const PRICING: &[(&str, f64, f64)] = &[
    ("gemini-1.5-pro", 0.001_25, 0.005),
    ("gemini-1.5-flash", 0.000_075, 0.0003),
    ("gemini-2.0-flash", 0.0001, 0.0004),
];

const DEFAULT_PRICE: ModelPrice = ModelPrice {
    input_per_1k: 0.001_25,
    output_per_1k: 0.005,
};

// Gemini wire types

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    text: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiChatRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GeminiGenerationConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiChatResponse {
    candidates: Vec<GeminiCandidate>,
    usage_metadata: Option<GeminiUsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: GeminiContent,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
    #[serde(default)]
    total_token_count: u64,
}

/// Gemini chat client
pub struct GeminiClient {
    api_key: SecretString,
    base_url: String,
    client: reqwest::Client,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::new(api_key.into()),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = normalize_base_url(&base_url);
        self
    }

    fn map_role(role: Role) -> &'static str {
        match role {
            Role::Assistant => "model",
            _ => "user",
        }
    }

    fn build_request(&self, request: &ChatRequest) -> GeminiChatRequest {
        let system_instruction = request
            .messages
            .iter()
            .find(|m| m.role == Role::System)
            .map(|m| GeminiContent {
                role: None,
                parts: vec![GeminiPart {
                    text: m.content.clone(),
                }],
            });

        // Prior turns form the history; the final turn closes the request.
        // The wire shape is one ordered contents array covering both.
        let turns: Vec<&ChatMessage> = request
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .collect();
        let (history, last) = turns.split_at(turns.len().saturating_sub(1));

        let contents = history
            .iter()
            .chain(last.iter())
            .map(|m| GeminiContent {
                role: Some(Self::map_role(m.role).to_string()),
                parts: vec![GeminiPart {
                    text: m.content.clone(),
                }],
            })
            .collect();

        let generation_config = if request.temperature.is_some() || request.max_tokens.is_some() {
            Some(GeminiGenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_tokens,
            })
        } else {
            None
        };

        GeminiChatRequest {
            contents,
            system_instruction,
            generation_config,
        }
    }
}

#[async_trait]
impl ProviderClient for GeminiClient {
    fn provider(&self) -> Provider {
        Provider::Gemini
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url,
            request.model,
            self.api_key.expose()
        );
        let body = self.build_request(request);

        let (status, text) = http_post_json(&self.client, &url, vec![], &body).await?;

        if !status.is_success() {
            return Err(GatewayError::Provider {
                provider: "gemini".to_string(),
                message: format!("{}: {}", status, text),
            });
        }

        let response: GeminiChatResponse = serde_json::from_str(&text).map_err(|e| {
            GatewayError::Provider {
                provider: "gemini".to_string(),
                message: format!("invalid response: {}", e),
            }
        })?;

        let choices = response
            .candidates
            .into_iter()
            .map(|c| {
                let content = c
                    .content
                    .parts
                    .into_iter()
                    .map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("");
                ChatChoice {
                    message: ChatMessage::new(Role::Assistant, content),
                    finish_reason: c.finish_reason,
                }
            })
            .collect();

        let usage = response.usage_metadata.map(|u| ChatUsage {
            prompt_tokens: u.prompt_token_count,
            completion_tokens: u.candidates_token_count,
            total_tokens: u.total_token_count,
        });

        Ok(ChatResponse {
            id: uuid::Uuid::new_v4().to_string(),
            choices,
            usage,
            model: request.model.clone(),
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
