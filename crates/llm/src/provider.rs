//! LLM Provider Trait
//!
//! Defines the common interface for all LLM providers.

use async_trait::async_trait;

use super::types::{CompletionRequest, LlmResponse, LlmResult, ProviderConfig};

/// Trait that all LLM providers must implement.
///
/// Provides a unified interface for:
/// - Blocking completions (complete)
/// - Health checking
///
/// The pipeline treats every call as plain request/response; failure modes
/// (auth, rate limit, timeout) are distinguished in `LlmError` so the caller
/// can decide whether to retry.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Returns the provider name for identification.
    fn name(&self) -> &'static str;

    /// Returns the current model being used.
    fn model(&self) -> &str;

    /// Returns whether this provider supports multimodal content (images).
    fn supports_vision(&self) -> bool {
        false
    }

    /// Send a completion request and get the full response.
    async fn complete(&self, request: CompletionRequest) -> LlmResult<LlmResponse>;

    /// Check if the provider is healthy and reachable.
    ///
    /// For API providers, this validates the API key.
    async fn health_check(&self) -> LlmResult<()>;

    /// Get the configuration for this provider.
    fn config(&self) -> &ProviderConfig;
}
