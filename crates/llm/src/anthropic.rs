//! Anthropic Claude Provider
//!
//! Implementation of the LlmProvider trait for Anthropic's Claude API.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::http_client::build_http_client;
use super::provider::LlmProvider;
use super::types::{CompletionRequest, LlmError, LlmResponse, LlmResult, ProviderConfig, UsageStats};

/// Default Anthropic API endpoint
const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";

/// Current API version
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Instruction appended to the system prompt when strict JSON is requested.
/// The messages API has no response_format parameter.
const JSON_MODE_INSTRUCTION: &str =
    "Respond with a single valid JSON object and nothing else. No prose, no code fences.";

/// Anthropic Claude provider
pub struct AnthropicProvider {
    config: ProviderConfig,
    client: reqwest::Client,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider with the given configuration
    pub fn new(config: ProviderConfig) -> Self {
        let client = build_http_client(config.timeout_secs);
        Self { config, client }
    }

    /// Get the API base URL
    fn base_url(&self) -> &str {
        self.config.base_url.as_deref().unwrap_or(ANTHROPIC_API_URL)
    }

    fn api_key(&self) -> LlmResult<&str> {
        self.config
            .api_key
            .as_deref()
            .ok_or_else(|| LlmError::no_api_key("anthropic"))
    }

    /// Build the request body for the messages API
    fn build_request_body(&self, request: &CompletionRequest) -> serde_json::Value {
        let mut content = vec![serde_json::json!({
            "type": "text",
            "text": request.prompt,
        })];
        for image in &request.images {
            content.push(serde_json::json!({
                "type": "image",
                "source": {
                    "type": "base64",
                    "media_type": image.media_type,
                    "data": image.data,
                },
            }));
        }

        let mut body = serde_json::json!({
            "model": self.config.model,
            "max_tokens": request.max_tokens.unwrap_or(self.config.max_tokens),
            "temperature": request.temperature.unwrap_or(self.config.temperature),
            "messages": [{
                "role": "user",
                "content": content,
            }],
        });

        let system = match (&request.system, request.json_mode) {
            (Some(system), true) => Some(format!("{system}\n\n{JSON_MODE_INSTRUCTION}")),
            (Some(system), false) => Some(system.clone()),
            (None, true) => Some(JSON_MODE_INSTRUCTION.to_string()),
            (None, false) => None,
        };
        if let Some(system) = system {
            body["system"] = serde_json::json!(system);
        }

        body
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    fn supports_vision(&self) -> bool {
        true
    }

    async fn complete(&self, request: CompletionRequest) -> LlmResult<LlmResponse> {
        let api_key = self.api_key()?.to_string();
        let body = self.build_request_body(&request);

        debug!(model = %self.config.model, multimodal = request.is_multimodal(), "anthropic completion request");

        let response = self
            .client
            .post(self.base_url())
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;

        let status = response.status().as_u16();
        let text = response.text().await?;

        if !(200..300).contains(&status) {
            return Err(LlmError::from_http_status("anthropic", status, &text));
        }

        let parsed: MessagesResponse =
            serde_json::from_str(&text).map_err(|e| LlmError::ParseError {
                message: format!("anthropic response: {e}"),
            })?;

        let content = parsed
            .content
            .iter()
            .filter_map(|block| match block {
                ResponseBlock::Text { text } => Some(text.as_str()),
            })
            .collect::<Vec<_>>()
            .join("");

        if content.is_empty() {
            return Err(LlmError::ParseError {
                message: "anthropic response contained no text blocks".to_string(),
            });
        }

        Ok(LlmResponse {
            content,
            usage: UsageStats {
                input_tokens: parsed.usage.input_tokens,
                output_tokens: parsed.usage.output_tokens,
            },
            model: parsed.model,
        })
    }

    async fn health_check(&self) -> LlmResult<()> {
        // Minimal request; an auth failure surfaces as 401.
        let probe = CompletionRequest::text("ping").with_max_tokens(1);
        match self.complete(probe).await {
            Ok(_) => Ok(()),
            Err(LlmError::ParseError { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }
}

/// Response shape for the messages API
#[derive(Debug, Deserialize)]
struct MessagesResponse {
    model: String,
    content: Vec<ResponseBlock>,
    usage: MessagesUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseBlock {
    Text { text: String },
}

#[derive(Debug, Deserialize)]
struct MessagesUsage {
    input_tokens: u32,
    output_tokens: u32,
}
