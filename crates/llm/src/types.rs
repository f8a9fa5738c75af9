//! LLM Types
//!
//! Core types for LLM provider interactions.

use serde::{Deserialize, Serialize};

/// Supported LLM provider types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    Anthropic,
    OpenAI,
}

impl std::fmt::Display for ProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderType::Anthropic => write!(f, "anthropic"),
            ProviderType::OpenAI => write!(f, "openai"),
        }
    }
}

impl std::str::FromStr for ProviderType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "anthropic" => Ok(ProviderType::Anthropic),
            "openai" => Ok(ProviderType::OpenAI),
            other => Err(format!("unknown provider: {other}")),
        }
    }
}

/// Configuration for an LLM provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// The provider type
    pub provider: ProviderType,
    /// API key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Base URL override (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Model name to use
    pub model: String,
    /// Maximum tokens to generate
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Temperature (0.0 - 1.0)
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_temperature() -> f32 {
    0.2
}

fn default_timeout_secs() -> u64 {
    120
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider: ProviderType::Anthropic,
            api_key: None,
            base_url: None,
            model: "claude-3-5-sonnet-20241022".to_string(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// A base64-encoded image attached to a completion request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageAttachment {
    /// MIME type, e.g. "image/png"
    pub media_type: String,
    /// Base64-encoded image data (no data-URI prefix)
    pub data: String,
}

/// A single blocking completion request.
///
/// The pipeline issues plain request/response calls; there is no streaming
/// and no tool calling in this surface.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Optional system prompt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    /// The user prompt
    pub prompt: String,
    /// Images for multimodal requests (empty for text-only)
    #[serde(default)]
    pub images: Vec<ImageAttachment>,
    /// Override the provider's configured max_tokens
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Override the provider's configured temperature
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Ask the provider for strict-JSON output
    #[serde(default)]
    pub json_mode: bool,
}

impl CompletionRequest {
    /// Create a text-only request.
    pub fn text(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    /// Set the system prompt.
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Attach images.
    pub fn with_images(mut self, images: Vec<ImageAttachment>) -> Self {
        self.images = images;
        self
    }

    /// Request strict-JSON output.
    pub fn with_json_mode(mut self) -> Self {
        self.json_mode = true;
        self
    }

    /// Override max tokens.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Override temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Whether the request carries images.
    pub fn is_multimodal(&self) -> bool {
        !self.images.is_empty()
    }
}

/// Token usage statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageStats {
    /// Number of input/prompt tokens
    pub input_tokens: u32,
    /// Number of output/completion tokens
    pub output_tokens: u32,
}

impl UsageStats {
    /// Total tokens used
    pub fn total_tokens(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

/// Response from an LLM provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    /// Text content of the response
    pub content: String,
    /// Token usage statistics
    pub usage: UsageStats,
    /// The model that generated the response
    pub model: String,
}

/// Error types for LLM operations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LlmError {
    /// Authentication failed (invalid API key)
    AuthenticationFailed { message: String },
    /// Rate limit exceeded
    RateLimited {
        message: String,
        retry_after: Option<u32>,
    },
    /// Model not found or not available
    ModelNotFound { model: String },
    /// Invalid request (bad parameters)
    InvalidRequest { message: String },
    /// Server error from the provider
    ServerError {
        message: String,
        status: Option<u16>,
    },
    /// Network/connection error
    NetworkError { message: String },
    /// Request timed out
    Timeout { message: String },
    /// Response parsing error
    ParseError { message: String },
    /// Other error
    Other { message: String },
}

/// Longest response-body excerpt carried into an error message.
const BODY_SNIPPET_LEN: usize = 200;

/// Trimmed, bounded excerpt of a provider response body.
fn body_snippet(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.len() <= BODY_SNIPPET_LEN {
        trimmed.to_string()
    } else {
        let mut end = BODY_SNIPPET_LEN;
        while !trimmed.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &trimmed[..end])
    }
}

impl LlmError {
    /// Error for a provider constructed without an API key.
    pub fn no_api_key(provider: &str) -> Self {
        LlmError::AuthenticationFailed {
            message: format!("no API key configured for the {provider} provider"),
        }
    }

    /// Classify a non-success HTTP response from a provider endpoint.
    ///
    /// Server-side failures (5xx) are grouped first since they share one
    /// variant; the remaining client-side statuses each map to the variant
    /// the caller branches on for retry decisions.
    pub fn from_http_status(provider: &str, status: u16, body: &str) -> Self {
        if (500..600).contains(&status) {
            return LlmError::ServerError {
                message: format!("{provider} failed server-side: {}", body_snippet(body)),
                status: Some(status),
            };
        }
        match status {
            401 | 403 => LlmError::AuthenticationFailed {
                message: format!("{provider} rejected the API key (HTTP {status})"),
            },
            404 => LlmError::ModelNotFound {
                model: body_snippet(body),
            },
            429 => LlmError::RateLimited {
                message: format!("{provider} throttled the request: {}", body_snippet(body)),
                retry_after: None,
            },
            400 | 422 => LlmError::InvalidRequest {
                message: format!("{provider} rejected the request: {}", body_snippet(body)),
            },
            other => LlmError::Other {
                message: format!(
                    "{provider} returned unexpected HTTP {other}: {}",
                    body_snippet(body)
                ),
            },
        }
    }

    /// Whether the caller may reasonably retry this error.
    ///
    /// Rate limits, transient gateway failures, network errors, and timeouts
    /// are retryable; authentication and request-shape errors are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LlmError::RateLimited { .. }
                | LlmError::ServerError {
                    status: Some(502 | 503 | 504),
                    ..
                }
                | LlmError::NetworkError { .. }
                | LlmError::Timeout { .. }
        )
    }
}

impl std::fmt::Display for LlmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LlmError::AuthenticationFailed { message } => {
                write!(f, "Authentication failed: {}", message)
            }
            LlmError::RateLimited { message, .. } => {
                write!(f, "Rate limited: {}", message)
            }
            LlmError::ModelNotFound { model } => {
                write!(f, "Model not found: {}", model)
            }
            LlmError::InvalidRequest { message } => {
                write!(f, "Invalid request: {}", message)
            }
            LlmError::ServerError { message, status } => {
                if let Some(s) = status {
                    write!(f, "Server error ({}): {}", s, message)
                } else {
                    write!(f, "Server error: {}", message)
                }
            }
            LlmError::NetworkError { message } => {
                write!(f, "Network error: {}", message)
            }
            LlmError::Timeout { message } => {
                write!(f, "Timeout: {}", message)
            }
            LlmError::ParseError { message } => {
                write!(f, "Parse error: {}", message)
            }
            LlmError::Other { message } => {
                write!(f, "Error: {}", message)
            }
        }
    }
}

impl std::error::Error for LlmError {}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout {
                message: err.to_string(),
            }
        } else if err.is_connect() {
            LlmError::NetworkError {
                message: err.to_string(),
            }
        } else {
            LlmError::Other {
                message: err.to_string(),
            }
        }
    }
}

/// Result type for LLM operations
pub type LlmResult<T> = Result<T, LlmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_config_default() {
        let config = ProviderConfig::default();
        assert_eq!(config.provider, ProviderType::Anthropic);
        assert_eq!(config.max_tokens, 4096);
        assert!((config.temperature - 0.2).abs() < f32::EPSILON);
    }

    #[test]
    fn test_provider_config_serialization() {
        let config = ProviderConfig {
            provider: ProviderType::OpenAI,
            api_key: Some("sk-test".to_string()),
            base_url: None,
            model: "gpt-4o".to_string(),
            max_tokens: 2048,
            temperature: 0.5,
            timeout_secs: 60,
        };

        let json = serde_json::to_string(&config).unwrap();
        let parsed: ProviderConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.model, "gpt-4o");
        assert_eq!(parsed.max_tokens, 2048);
    }

    #[test]
    fn test_provider_type_parse() {
        assert_eq!("anthropic".parse::<ProviderType>().unwrap(), ProviderType::Anthropic);
        assert_eq!("OpenAI".parse::<ProviderType>().unwrap(), ProviderType::OpenAI);
        assert!("mystery".parse::<ProviderType>().is_err());
    }

    #[test]
    fn test_completion_request_builders() {
        let req = CompletionRequest::text("Extract the claim number")
            .with_system("You are a claims analyst")
            .with_json_mode()
            .with_max_tokens(512);
        assert_eq!(req.prompt, "Extract the claim number");
        assert!(req.json_mode);
        assert_eq!(req.max_tokens, Some(512));
        assert!(!req.is_multimodal());

        let req = req.with_images(vec![ImageAttachment {
            media_type: "image/png".to_string(),
            data: "aGVsbG8=".to_string(),
        }]);
        assert!(req.is_multimodal());
    }

    #[test]
    fn test_no_api_key_error() {
        let err = LlmError::no_api_key("anthropic");
        match err {
            LlmError::AuthenticationFailed { message } => {
                assert!(message.contains("anthropic"));
                assert!(message.contains("no API key"));
            }
            _ => panic!("Expected AuthenticationFailed"),
        }
    }

    #[test]
    fn test_from_http_status_classification() {
        assert!(matches!(
            LlmError::from_http_status("openai", 401, "unauthorized"),
            LlmError::AuthenticationFailed { .. }
        ));
        assert!(matches!(
            LlmError::from_http_status("openai", 403, "forbidden"),
            LlmError::AuthenticationFailed { .. }
        ));
        assert!(matches!(
            LlmError::from_http_status("openai", 404, "gpt-nope"),
            LlmError::ModelNotFound { .. }
        ));
        assert!(matches!(
            LlmError::from_http_status("openai", 429, "slow down"),
            LlmError::RateLimited { .. }
        ));
        assert!(matches!(
            LlmError::from_http_status("openai", 400, "bad body"),
            LlmError::InvalidRequest { .. }
        ));
        assert!(matches!(
            LlmError::from_http_status("openai", 503, "overloaded"),
            LlmError::ServerError {
                status: Some(503),
                ..
            }
        ));
        assert!(matches!(
            LlmError::from_http_status("openai", 418, "teapot"),
            LlmError::Other { .. }
        ));
    }

    #[test]
    fn test_from_http_status_truncates_long_bodies() {
        let body = "x".repeat(1000);
        match LlmError::from_http_status("anthropic", 429, &body) {
            LlmError::RateLimited { message, .. } => {
                assert!(message.len() < 300);
                assert!(message.ends_with("..."));
            }
            _ => panic!("Expected RateLimited"),
        }
    }

    #[test]
    fn test_retryable_errors() {
        assert!(LlmError::RateLimited {
            message: "slow down".to_string(),
            retry_after: Some(30),
        }
        .is_retryable());
        assert!(LlmError::ServerError {
            message: "bad gateway".to_string(),
            status: Some(502),
        }
        .is_retryable());
        assert!(LlmError::Timeout {
            message: "deadline".to_string(),
        }
        .is_retryable());

        assert!(!LlmError::AuthenticationFailed {
            message: "bad key".to_string(),
        }
        .is_retryable());
        assert!(!LlmError::InvalidRequest {
            message: "bad body".to_string(),
        }
        .is_retryable());
    }

    #[test]
    fn test_usage_stats_total() {
        let usage = UsageStats {
            input_tokens: 100,
            output_tokens: 50,
        };
        assert_eq!(usage.total_tokens(), 150);
    }
}
