//! OpenAI-Compatible Provider
//!
//! Implementation of the LlmProvider trait for the OpenAI chat completions
//! API and compatible endpoints.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::http_client::build_http_client;
use super::provider::LlmProvider;
use super::types::{CompletionRequest, LlmError, LlmResponse, LlmResult, ProviderConfig, UsageStats};

/// Default OpenAI API base URL
const OPENAI_API_URL: &str = "https://api.openai.com/v1";

/// OpenAI-compatible provider
pub struct OpenAIProvider {
    config: ProviderConfig,
    client: reqwest::Client,
}

impl OpenAIProvider {
    /// Create a new OpenAI provider with the given configuration
    pub fn new(config: ProviderConfig) -> Self {
        let client = build_http_client(config.timeout_secs);
        Self { config, client }
    }

    /// Get the API base URL
    fn base_url(&self) -> &str {
        self.config.base_url.as_deref().unwrap_or(OPENAI_API_URL)
    }

    fn api_key(&self) -> LlmResult<&str> {
        self.config
            .api_key
            .as_deref()
            .ok_or_else(|| LlmError::no_api_key("openai"))
    }

    /// Build the request body for the chat completions API
    fn build_request_body(&self, request: &CompletionRequest) -> serde_json::Value {
        let mut messages: Vec<serde_json::Value> = Vec::new();

        if let Some(system) = &request.system {
            messages.push(serde_json::json!({
                "role": "system",
                "content": system,
            }));
        }

        // Text-only requests use a plain string; multimodal requests use
        // the content-parts array with data-URI image entries.
        if request.images.is_empty() {
            messages.push(serde_json::json!({
                "role": "user",
                "content": request.prompt,
            }));
        } else {
            let mut parts = vec![serde_json::json!({
                "type": "text",
                "text": request.prompt,
            })];
            for image in &request.images {
                parts.push(serde_json::json!({
                    "type": "image_url",
                    "image_url": {
                        "url": format!("data:{};base64,{}", image.media_type, image.data),
                    },
                }));
            }
            messages.push(serde_json::json!({
                "role": "user",
                "content": parts,
            }));
        }

        let mut body = serde_json::json!({
            "model": self.config.model,
            "messages": messages,
            "max_tokens": request.max_tokens.unwrap_or(self.config.max_tokens),
            "temperature": request.temperature.unwrap_or(self.config.temperature),
        });

        if request.json_mode {
            body["response_format"] = serde_json::json!({ "type": "json_object" });
        }

        body
    }
}

#[async_trait]
impl LlmProvider for OpenAIProvider {
    fn name(&self) -> &'static str {
        "openai"
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
        let url = format!("{}/chat/completions", self.base_url());

        debug!(model = %self.config.model, multimodal = request.is_multimodal(), "openai completion request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status().as_u16();
        let text = response.text().await?;

        if !(200..300).contains(&status) {
            return Err(LlmError::from_http_status("openai", status, &text));
        }

        let parsed: ChatCompletionResponse =
            serde_json::from_str(&text).map_err(|e| LlmError::ParseError {
                message: format!("openai response: {e}"),
            })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LlmError::ParseError {
                message: "openai response contained no choices".to_string(),
            })?;

        Ok(LlmResponse {
            content,
            usage: UsageStats {
                input_tokens: parsed.usage.as_ref().map(|u| u.prompt_tokens).unwrap_or(0),
                output_tokens: parsed
                    .usage
                    .as_ref()
                    .map(|u| u.completion_tokens)
                    .unwrap_or(0),
            },
            model: parsed.model.unwrap_or_else(|| self.config.model.clone()),
        })
    }

    async fn health_check(&self) -> LlmResult<()> {
        let api_key = self.api_key()?.to_string();
        let url = format!("{}/models", self.base_url());

        let response = self.client.get(&url).bearer_auth(api_key).send().await?;

        let status = response.status().as_u16();
        if (200..300).contains(&status) {
            Ok(())
        } else {
            let text = response.text().await.unwrap_or_default();
            Err(LlmError::from_http_status("openai", status, &text))
        }
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }
}

/// Response shape for the chat completions API
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    model: Option<String>,
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ImageAttachment, ProviderType};

    fn test_provider() -> OpenAIProvider {
        OpenAIProvider::new(ProviderConfig {
            provider: ProviderType::OpenAI,
            api_key: Some("sk-test".to_string()),
            base_url: None,
            model: "gpt-4o".to_string(),
            max_tokens: 1024,
            temperature: 0.1,
            timeout_secs: 30,
        })
    }

    #[test]
    fn test_build_text_request_body() {
        let provider = test_provider();
        let request = CompletionRequest::text("Extract fields").with_system("You are an analyst");
        let body = provider.build_request_body(&request);

        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["messages"][1]["content"], "Extract fields");
        assert!(body.get("response_format").is_none());
    }

    #[test]
    fn test_build_json_mode_body() {
        let provider = test_provider();
        let request = CompletionRequest::text("Extract fields").with_json_mode();
        let body = provider.build_request_body(&request);
        assert_eq!(body["response_format"]["type"], "json_object");
    }

    #[test]
    fn test_build_multimodal_body() {
        let provider = test_provider();
        let request = CompletionRequest::text("Describe page").with_images(vec![ImageAttachment {
            media_type: "image/png".to_string(),
            data: "Zm9v".to_string(),
        }]);
        let body = provider.build_request_body(&request);

        let parts = body["messages"][0]["content"].as_array().unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0]["type"], "text");
        assert_eq!(parts[1]["type"], "image_url");
        assert!(parts[1]["image_url"]["url"]
            .as_str()
            .unwrap()
            .starts_with("data:image/png;base64,"));
    }

    #[test]
    fn test_missing_api_key() {
        let provider = OpenAIProvider::new(ProviderConfig {
            provider: ProviderType::OpenAI,
            api_key: None,
            ..ProviderConfig::default()
        });
        assert!(provider.api_key().is_err());
    }

    #[test]
    fn test_parse_response_shape() {
        let json = r#"{
            "model": "gpt-4o",
            "choices": [{"message": {"content": "{\"claim_number\": \"CLM-1\"}"}}],
            "usage": {"prompt_tokens": 120, "completion_tokens": 18}
        }"#;
        let parsed: ChatCompletionResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.choices.len(), 1);
        assert_eq!(parsed.usage.unwrap().prompt_tokens, 120);
    }
}
