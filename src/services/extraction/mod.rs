//! Extraction Services
//!
//! The two document extraction agents and their shared machinery: strategy
//! policy, text-quality gating, per-field prompt calls, response parsing,
//! and text/vision fusion.

pub mod estimate_agent;
pub mod fusion;
pub mod parse;
pub mod quality;
pub mod roof_agent;
pub mod strategy;

pub use estimate_agent::EstimateExtractionAgent;
pub use roof_agent::RoofExtractionAgent;
pub use strategy::ExtractionStrategy;

use std::collections::HashMap;
use std::sync::Arc;

use claimlens_core::{CoreError, CoreResult, ExtractedField, FieldSource};
use claimlens_docs::{ConvertOptions, ImageConverter, PageImage};
use claimlens_llm::{CompletionRequest, ImageAttachment, LlmProvider};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::models::LineItem;
use crate::services::prompt::{render_prompt, PromptConfigSource};

/// One uploaded document plus the strategy for extracting it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentInput {
    /// Original filename, for logs and provenance
    pub filename: String,
    /// Raw document bytes
    pub bytes: Vec<u8>,
    /// Which extraction path(s) to run
    #[serde(default)]
    pub strategy: ExtractionStrategy,
}

impl DocumentInput {
    /// Create an input with the default (fallback) strategy.
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
            strategy: ExtractionStrategy::default(),
        }
    }

    /// Override the strategy.
    pub fn with_strategy(mut self, strategy: ExtractionStrategy) -> Self {
        self.strategy = strategy;
        self
    }
}

/// Shared provider/prompt plumbing for the extraction agents.
///
/// Field prompts are issued sequentially; under provider rate limits that is
/// the safer default, and per-field parallelism is an optimization the
/// pipeline does not depend on.
pub(crate) struct FieldPromptClient {
    provider: Arc<dyn LlmProvider>,
    prompts: Arc<dyn PromptConfigSource>,
}

impl FieldPromptClient {
    pub(crate) fn new(provider: Arc<dyn LlmProvider>, prompts: Arc<dyn PromptConfigSource>) -> Self {
        Self { provider, prompts }
    }

    pub(crate) fn provider(&self) -> &Arc<dyn LlmProvider> {
        &self.provider
    }

    /// Run one per-field prompt against the document text.
    ///
    /// Provider failures degrade to a missing field carrying the error in its
    /// rationale; the stage-level validation decides whether enough fields
    /// survived.
    pub(crate) async fn extract_field(
        &self,
        step: &str,
        document_text: &str,
    ) -> ExtractedField<serde_json::Value> {
        let config = self.prompts.step_config(step);
        let mut vars = HashMap::new();
        vars.insert("document", document_text.to_string());
        let prompt = render_prompt(&config.prompt, &vars);

        let request = CompletionRequest::text(prompt)
            .with_json_mode()
            .with_max_tokens(config.max_tokens)
            .with_temperature(config.temperature);

        match self.provider.complete(request).await {
            Ok(response) => parse::parse_field_response(&response.content, FieldSource::Text),
            Err(e) => {
                warn!(step, error = %e, "field extraction call failed");
                ExtractedField::missing(format!("provider call failed: {e}"), FieldSource::Text)
            }
        }
    }

    /// Run the line-items prompt against the document text.
    pub(crate) async fn extract_line_items(
        &self,
        step: &str,
        document_text: &str,
    ) -> ExtractedField<Vec<LineItem>> {
        let config = self.prompts.step_config(step);
        let mut vars = HashMap::new();
        vars.insert("document", document_text.to_string());
        let prompt = render_prompt(&config.prompt, &vars);

        let request = CompletionRequest::text(prompt)
            .with_json_mode()
            .with_max_tokens(config.max_tokens)
            .with_temperature(config.temperature);

        match self.provider.complete(request).await {
            Ok(response) => parse::parse_line_items_response(&response.content, FieldSource::Text),
            Err(e) => {
                warn!(step, error = %e, "line items call failed");
                ExtractedField::missing(format!("provider call failed: {e}"), FieldSource::Text)
            }
        }
    }

    /// Run the single vision prompt over the page images and return the
    /// parsed record object.
    pub(crate) async fn vision_record(
        &self,
        step: &str,
        pages: Vec<PageImage>,
    ) -> CoreResult<serde_json::Value> {
        let config = self.prompts.step_config(step);
        let images: Vec<ImageAttachment> = pages
            .into_iter()
            .map(|p| ImageAttachment {
                media_type: p.media_type,
                data: p.data,
            })
            .collect();

        let request = CompletionRequest::text(config.prompt)
            .with_images(images)
            .with_json_mode()
            .with_max_tokens(config.max_tokens)
            .with_temperature(config.temperature);

        let response = self
            .provider
            .complete(request)
            .await
            .map_err(|e| CoreError::extraction(format!("vision call failed: {e}")))?;

        parse::extract_json_object(&response.content)
    }
}

/// Convert a document into page images, mapping collaborator failures into
/// core errors the agents can classify.
pub(crate) fn document_pages(
    converter: &Arc<dyn ImageConverter>,
    bytes: &[u8],
) -> CoreResult<Vec<PageImage>> {
    converter
        .convert_to_images(bytes, &ConvertOptions::default())
        .map_err(|e| CoreError::extraction(format!("image conversion failed: {e}")))
}
