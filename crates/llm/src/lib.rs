//! ClaimLens LLM
//!
//! Provides a unified interface for the LLM providers the pipeline calls:
//! - Anthropic Claude
//! - OpenAI (and OpenAI-compatible endpoints)
//!
//! Every call is a blocking request/response completion; failures are
//! distinguished (auth, rate limit, network, timeout) so callers can decide
//! whether to retry.

pub mod anthropic;
pub mod http_client;
pub mod openai;
pub mod provider;
pub mod types;

// Re-export main types
pub use anthropic::AnthropicProvider;
pub use http_client::build_http_client;
pub use openai::OpenAIProvider;
pub use provider::LlmProvider;
pub use types::*;

use std::sync::Arc;

/// Build a provider from its configuration.
pub fn build_provider(config: types::ProviderConfig) -> Arc<dyn LlmProvider> {
    match config.provider {
        types::ProviderType::Anthropic => Arc::new(AnthropicProvider::new(config)),
        types::ProviderType::OpenAI => Arc::new(OpenAIProvider::new(config)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_provider_dispatch() {
        let anthropic = build_provider(types::ProviderConfig::default());
        assert_eq!(anthropic.name(), "anthropic");

        let openai = build_provider(types::ProviderConfig {
            provider: types::ProviderType::OpenAI,
            model: "gpt-4o".to_string(),
            ..types::ProviderConfig::default()
        });
        assert_eq!(openai.name(), "openai");
    }
}
