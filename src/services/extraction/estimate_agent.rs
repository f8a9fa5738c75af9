//! Estimate Extraction Agent
//!
//! Extracts the structured `EstimateRecord` from a damage-estimate document.
//! Runs the text path (per-field prompts over extracted text) and, per the
//! configured strategy, the vision path (one multimodal prompt over page
//! images), then fuses the two candidates field by field.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use claimlens_core::{
    CoreError, CoreResult, ExtractedField, FieldSource, PipelineStage, StageConfig, StagePlan,
    StageResult, TaskContext, ValidationResult,
};
use claimlens_docs::{ImageConverter, TextExtractor};
use claimlens_llm::LlmProvider;
use tracing::{debug, info, warn};

use crate::models::{EstimateRecord, LineItem};
use crate::services::prompt::PromptConfigSource;

use super::fusion::{fuse_collection, fuse_fields};
use super::parse::{coerce_f64, coerce_string, field_from_value, line_items_from_value};
use super::quality::{text_quality_score, DEFAULT_MIN_TEXT_QUALITY, ESTIMATE_KEYWORDS};
use super::strategy::ExtractionStrategy;
use super::{document_pages, DocumentInput, FieldPromptClient};

/// The agent's key fields for completeness scoring.
const KEY_FIELDS: &[&str] = &["property_address", "claim_number", "total_rcv"];

/// Extraction agent for damage estimates.
pub struct EstimateExtractionAgent {
    config: StageConfig,
    min_text_quality: f64,
    client: FieldPromptClient,
    text_extractor: Arc<dyn TextExtractor>,
    image_converter: Arc<dyn ImageConverter>,
}

impl EstimateExtractionAgent {
    /// Create an agent with the default stage configuration.
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        text_extractor: Arc<dyn TextExtractor>,
        image_converter: Arc<dyn ImageConverter>,
        prompts: Arc<dyn PromptConfigSource>,
    ) -> Self {
        Self {
            config: StageConfig::new("estimate_extraction")
                .with_capabilities(vec!["text".to_string(), "vision".to_string()]),
            min_text_quality: DEFAULT_MIN_TEXT_QUALITY,
            client: FieldPromptClient::new(provider, prompts),
            text_extractor,
            image_converter,
        }
    }

    /// Override the stage configuration.
    pub fn with_config(mut self, config: StageConfig) -> Self {
        self.config = config;
        self
    }

    /// Override the minimum text quality for the text path.
    pub fn with_min_text_quality(mut self, min: f64) -> Self {
        self.min_text_quality = min;
        self
    }

    /// Run the text path: one prompt per field plus the line-items prompt.
    async fn text_record(&self, text: &str) -> EstimateRecord {
        let property_address = self
            .client
            .extract_field("estimate.property_address", text)
            .await;
        let claim_number = self.client.extract_field("estimate.claim_number", text).await;
        let carrier = self.client.extract_field("estimate.carrier", text).await;
        let date_of_loss = self.client.extract_field("estimate.date_of_loss", text).await;
        let total_rcv = self.client.extract_field("estimate.total_rcv", text).await;
        let total_acv = self.client.extract_field("estimate.total_acv", text).await;
        let deductible = self.client.extract_field("estimate.deductible", text).await;
        let line_items = self.client.extract_line_items("estimate.line_items", text).await;

        EstimateRecord {
            property_address: string_field(property_address),
            claim_number: string_field(claim_number),
            carrier: string_field(carrier),
            date_of_loss: string_field(date_of_loss),
            total_rcv: money_field(total_rcv),
            total_acv: money_field(total_acv),
            deductible: money_field(deductible),
            line_items,
        }
    }

    /// Run the vision path: one multimodal prompt over the page images.
    async fn vision_record(&self, bytes: &[u8]) -> CoreResult<EstimateRecord> {
        let pages = document_pages(&self.image_converter, bytes)?;
        let record = self.client.vision_record("estimate.vision", pages).await?;

        Ok(EstimateRecord {
            property_address: string_field(field_from_value(
                record.get("property_address"),
                FieldSource::Vision,
            )),
            claim_number: string_field(field_from_value(
                record.get("claim_number"),
                FieldSource::Vision,
            )),
            carrier: string_field(field_from_value(record.get("carrier"), FieldSource::Vision)),
            date_of_loss: string_field(field_from_value(
                record.get("date_of_loss"),
                FieldSource::Vision,
            )),
            total_rcv: money_field(field_from_value(record.get("total_rcv"), FieldSource::Vision)),
            total_acv: money_field(field_from_value(record.get("total_acv"), FieldSource::Vision)),
            deductible: money_field(field_from_value(
                record.get("deductible"),
                FieldSource::Vision,
            )),
            line_items: line_items_from_value(record.get("line_items"), FieldSource::Vision),
        })
    }

    /// Fuse the text and vision candidates field by field.
    fn fuse_records(
        text: Option<EstimateRecord>,
        vision: Option<EstimateRecord>,
        text_quality_adequate: bool,
    ) -> EstimateRecord {
        let non_empty = |s: &String| !s.trim().is_empty();
        let positive = |v: &f64| v.is_finite() && *v > 0.0;

        let (t, v) = (text, vision);
        let pick_items = |t: &Option<EstimateRecord>, v: &Option<EstimateRecord>| {
            fuse_collection::<LineItem>(
                text_quality_adequate,
                t.as_ref().map(|r| r.line_items.clone()),
                v.as_ref().map(|r| r.line_items.clone()),
            )
        };
        let line_items = pick_items(&t, &v);

        EstimateRecord {
            property_address: fuse_fields(
                t.as_ref().map(|r| r.property_address.clone()),
                v.as_ref().map(|r| r.property_address.clone()),
                Some(&non_empty),
            ),
            claim_number: fuse_fields(
                t.as_ref().map(|r| r.claim_number.clone()),
                v.as_ref().map(|r| r.claim_number.clone()),
                Some(&non_empty),
            ),
            carrier: fuse_fields(
                t.as_ref().map(|r| r.carrier.clone()),
                v.as_ref().map(|r| r.carrier.clone()),
                Some(&non_empty),
            ),
            date_of_loss: fuse_fields(
                t.as_ref().map(|r| r.date_of_loss.clone()),
                v.as_ref().map(|r| r.date_of_loss.clone()),
                Some(&non_empty),
            ),
            total_rcv: fuse_fields(
                t.as_ref().map(|r| r.total_rcv.clone()),
                v.as_ref().map(|r| r.total_rcv.clone()),
                Some(&positive),
            ),
            total_acv: fuse_fields(
                t.as_ref().map(|r| r.total_acv.clone()),
                v.as_ref().map(|r| r.total_acv.clone()),
                Some(&positive),
            ),
            deductible: fuse_fields(
                t.as_ref().map(|r| r.deductible.clone()),
                v.as_ref().map(|r| r.deductible.clone()),
                Some(&positive),
            ),
            line_items,
        }
    }

    /// Score a record's completeness: presence of key fields and line items,
    /// blended with the record's aggregate field confidence.
    fn assess(record: &EstimateRecord) -> ValidationResult {
        if !record.has_usable_data() {
            return ValidationResult::invalid("no usable fields extracted from estimate");
        }

        let key_present = [
            record.property_address.is_present(),
            record.claim_number.is_present(),
            record.total_rcv.is_present(),
        ]
        .iter()
        .filter(|present| **present)
        .count();
        let items_present = !record.items().is_empty();

        let presence_ratio =
            (key_present + usize::from(items_present)) as f64 / (KEY_FIELDS.len() + 1) as f64;
        let confidence = 0.5 * presence_ratio + 0.5 * record.aggregate_confidence();

        let mut validation = ValidationResult::valid(confidence);
        if !record.claim_number.is_present() {
            validation = validation.with_warning("claim number not extracted");
        }
        if !record.total_rcv.is_present() {
            validation = validation.with_warning("total RCV not extracted");
        }
        if !items_present {
            validation = validation
                .with_warning("no line items extracted")
                .with_suggestion("consider vision extraction for scanned estimates");
        }
        validation
    }
}

/// Convert a raw field payload into a string field.
fn string_field(field: ExtractedField<serde_json::Value>) -> ExtractedField<String> {
    let coerced = field.value.as_ref().and_then(coerce_string);
    ExtractedField::from_option(coerced, field.confidence, field.rationale, field.source)
        .with_attempts(field.attempts)
}

/// Convert a raw field payload into a monetary/numeric field.
fn money_field(field: ExtractedField<serde_json::Value>) -> ExtractedField<f64> {
    let coerced = field.value.as_ref().and_then(coerce_f64);
    ExtractedField::from_option(coerced, field.confidence, field.rationale, field.source)
        .with_attempts(field.attempts)
}

#[async_trait]
impl PipelineStage for EstimateExtractionAgent {
    type Input = DocumentInput;
    type Output = EstimateRecord;

    fn config(&self) -> &StageConfig {
        &self.config
    }

    async fn plan(&self, input: &DocumentInput, _ctx: &TaskContext) -> CoreResult<StagePlan> {
        let mut plan = StagePlan::default();
        if input.strategy.runs_text() {
            plan = plan.with_subtask("extract text and run per-field prompts", 8_000, 0.8);
        }
        if input.strategy != ExtractionStrategy::TextOnly {
            plan = plan.with_subtask("convert pages and run vision prompt", 12_000, 0.7);
        }
        plan = plan.with_subtask("fuse text and vision candidates", 10, 0.95);
        Ok(plan)
    }

    async fn act(
        &self,
        input: &DocumentInput,
        ctx: &TaskContext,
    ) -> CoreResult<StageResult<EstimateRecord>> {
        let started = Instant::now();
        debug!(job_id = %ctx.job_id, file = %input.filename, strategy = %input.strategy, "estimate extraction starting");

        let mut text_candidate: Option<EstimateRecord> = None;
        let mut text_quality_adequate = false;

        if input.strategy.runs_text() {
            match self.text_extractor.extract_text(&input.bytes) {
                Ok(text) => {
                    let quality = text_quality_score(&text, ESTIMATE_KEYWORDS);
                    if quality < self.min_text_quality {
                        info!(
                            quality,
                            minimum = self.min_text_quality,
                            "text quality below minimum, skipping text path"
                        );
                    } else {
                        text_quality_adequate = true;
                        text_candidate = Some(self.text_record(&text).await);
                    }
                }
                Err(e) => {
                    warn!(error = %e, "text extraction collaborator failed");
                    if input.strategy == ExtractionStrategy::TextOnly {
                        return Err(CoreError::extraction(format!(
                            "text path failed under text_only strategy: {e}"
                        )));
                    }
                }
            }

            if input.strategy == ExtractionStrategy::TextOnly && text_candidate.is_none() {
                return Err(CoreError::extraction(
                    "text path unavailable under text_only strategy",
                ));
            }
        }

        let run_vision = match input.strategy {
            ExtractionStrategy::VisionOnly | ExtractionStrategy::Hybrid => true,
            ExtractionStrategy::TextOnly => false,
            ExtractionStrategy::Fallback => text_candidate
                .as_ref()
                .map(|r| r.aggregate_confidence() < self.config.confidence_threshold)
                .unwrap_or(true),
        };

        let mut vision_candidate: Option<EstimateRecord> = None;
        if run_vision {
            match self.vision_record(&input.bytes).await {
                Ok(record) => vision_candidate = Some(record),
                Err(e) => {
                    warn!(error = %e, "vision path unavailable");
                    if input.strategy == ExtractionStrategy::VisionOnly {
                        return Err(e);
                    }
                }
            }
        }

        if text_candidate.is_none() && vision_candidate.is_none() {
            return Err(CoreError::extraction(
                "no extraction path produced data for the estimate",
            ));
        }

        let record = Self::fuse_records(text_candidate, vision_candidate, text_quality_adequate);
        let validation = Self::assess(&record);

        Ok(
            StageResult::new(record, validation, started.elapsed().as_millis() as u64)
                .with_model(self.client.provider().model().to_string()),
        )
    }

    async fn validate(
        &self,
        result: &StageResult<EstimateRecord>,
        _ctx: &TaskContext,
    ) -> CoreResult<ValidationResult> {
        Ok(Self::assess(&result.data))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use claimlens_core::execute_stage;
    use claimlens_docs::{
        ConvertOptions, DocsError, DocsResult, DocumentTextExtractor, PageImage,
    };
    use claimlens_llm::{
        CompletionRequest, LlmError, LlmResponse, LlmResult, ProviderConfig, UsageStats,
    };

    use super::*;
    use crate::services::prompt::BuiltinPrompts;

    /// Provider scripted off prompt content; counts text and vision calls.
    struct ScriptedProvider {
        config: ProviderConfig,
        text_calls: AtomicU32,
        vision_calls: AtomicU32,
    }

    impl ScriptedProvider {
        fn new() -> Self {
            Self {
                config: ProviderConfig::default(),
                text_calls: AtomicU32::new(0),
                vision_calls: AtomicU32::new(0),
            }
        }

        fn text_response(prompt: &str) -> String {
            if prompt.contains("line item") {
                r#"{"line_items": [
                    {"description": "Remove & replace laminated shingles", "quantity": 32.5, "unit": "SQ"},
                    {"description": "Drip edge - aluminum", "quantity": 120, "unit": "LF"}
                ], "confidence": 0.85}"#
                    .to_string()
            } else if prompt.contains("claim number") {
                r#"{"value": "CLM-2024-0142", "confidence": 0.92, "rationale": "header"}"#.to_string()
            } else if prompt.contains("street address") {
                r#"{"value": "12 Oak St, Springfield", "confidence": 0.9, "rationale": "header"}"#
                    .to_string()
            } else if prompt.contains("carrier") {
                r#"{"value": "Example Mutual", "confidence": 0.88, "rationale": "logo"}"#.to_string()
            } else if prompt.contains("date of loss") {
                r#"{"value": "04/12/2024", "confidence": 0.8, "rationale": "header"}"#.to_string()
            } else if prompt.contains("(RCV)") {
                r#"{"value": "$18,432.10", "confidence": 0.9, "rationale": "totals"}"#.to_string()
            } else if prompt.contains("(ACV)") {
                r#"{"value": "$16,220.45", "confidence": 0.85, "rationale": "totals"}"#.to_string()
            } else if prompt.contains("deductible") {
                r#"{"value": 1000, "confidence": 0.8, "rationale": "totals"}"#.to_string()
            } else {
                r#"{"value": null, "confidence": 0.1, "rationale": "not found"}"#.to_string()
            }
        }

        fn vision_response() -> String {
            r#"{
                "property_address": {"value": "12 Oak St, Springfield", "confidence": 0.7, "rationale": "page 1"},
                "claim_number": {"value": "CLM-2024-0142", "confidence": 0.75, "rationale": "page 1"},
                "carrier": {"value": "Example Mutual", "confidence": 0.7, "rationale": "page 1"},
                "date_of_loss": {"value": "04/12/2024", "confidence": 0.6, "rationale": "page 1"},
                "total_rcv": {"value": 18432.10, "confidence": 0.7, "rationale": "totals"},
                "total_acv": {"value": 16220.45, "confidence": 0.65, "rationale": "totals"},
                "deductible": {"value": 1000, "confidence": 0.6, "rationale": "totals"},
                "line_items": {"line_items": [
                    {"description": "Laminated shingles", "quantity": 32.0, "unit": "SQ"}
                ], "confidence": 0.6}
            }"#
            .to_string()
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn model(&self) -> &str {
            "scripted-model"
        }

        fn supports_vision(&self) -> bool {
            true
        }

        async fn complete(&self, request: CompletionRequest) -> LlmResult<LlmResponse> {
            let content = if request.is_multimodal() {
                self.vision_calls.fetch_add(1, Ordering::SeqCst);
                Self::vision_response()
            } else {
                self.text_calls.fetch_add(1, Ordering::SeqCst);
                Self::text_response(&request.prompt)
            };
            Ok(LlmResponse {
                content,
                usage: UsageStats::default(),
                model: "scripted-model".to_string(),
            })
        }

        async fn health_check(&self) -> LlmResult<()> {
            Ok(())
        }

        fn config(&self) -> &ProviderConfig {
            &self.config
        }
    }

    /// Provider whose every call fails.
    struct FailingProvider {
        config: ProviderConfig,
    }

    #[async_trait]
    impl LlmProvider for FailingProvider {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn model(&self) -> &str {
            "failing-model"
        }

        async fn complete(&self, _request: CompletionRequest) -> LlmResult<LlmResponse> {
            Err(LlmError::NetworkError {
                message: "connection refused".to_string(),
            })
        }

        async fn health_check(&self) -> LlmResult<()> {
            Ok(())
        }

        fn config(&self) -> &ProviderConfig {
            &self.config
        }
    }

    /// Converter returning one dummy page image.
    struct StubConverter;

    impl ImageConverter for StubConverter {
        fn convert_to_images(
            &self,
            _document: &[u8],
            _options: &ConvertOptions,
        ) -> DocsResult<Vec<PageImage>> {
            Ok(vec![PageImage {
                page: 0,
                media_type: "image/png".to_string(),
                data: "ZmFrZQ==".to_string(),
            }])
        }
    }

    /// Converter that cannot handle anything.
    struct NoConverter;

    impl ImageConverter for NoConverter {
        fn convert_to_images(
            &self,
            _document: &[u8],
            _options: &ConvertOptions,
        ) -> DocsResult<Vec<PageImage>> {
            Err(DocsError::unsupported("no rasterizer"))
        }
    }

    const ESTIMATE_TEXT: &str = "Insurance Claim Estimate\n\
        Claim Number: CLM-2024-0142\n\
        Carrier: Example Mutual\n\
        Insured property: 12 Oak St, Springfield\n\
        Deductible: $1,000.00\n\
        Date of Loss: 04/12/2024\n\
        Total RCV: $18,432.10  Total ACV: $16,220.45\n\
        Remove & replace laminated shingles    32.5 SQ\n\
        Drip edge - aluminum    120 LF\n";

    fn agent_with(
        provider: Arc<dyn LlmProvider>,
        converter: Arc<dyn ImageConverter>,
    ) -> EstimateExtractionAgent {
        EstimateExtractionAgent::new(
            provider,
            Arc::new(DocumentTextExtractor::new()),
            converter,
            Arc::new(BuiltinPrompts),
        )
    }

    fn ctx() -> TaskContext {
        TaskContext::new("job-test", "estimate-task")
    }

    #[tokio::test]
    async fn test_text_path_extracts_full_record() {
        let provider = Arc::new(ScriptedProvider::new());
        let agent = agent_with(provider.clone(), Arc::new(NoConverter));
        let input = DocumentInput::new("estimate.txt", ESTIMATE_TEXT.as_bytes().to_vec());

        let result = execute_stage(&agent, &input, &ctx()).await.unwrap();
        let record = &result.data;

        assert_eq!(record.claim_number.value.as_deref(), Some("CLM-2024-0142"));
        assert_eq!(record.total_rcv.value, Some(18432.10));
        assert_eq!(record.items().len(), 2);
        assert!(result.validation.is_valid);
        // High-confidence text result: fallback strategy never ran vision.
        assert_eq!(provider.vision_calls.load(Ordering::SeqCst), 0);
        assert!(provider.text_calls.load(Ordering::SeqCst) >= 8);
    }

    #[tokio::test]
    async fn test_low_quality_text_skips_to_vision_under_fallback() {
        let provider = Arc::new(ScriptedProvider::new());
        let agent = agent_with(provider.clone(), Arc::new(StubConverter))
            .with_min_text_quality(0.1);

        // Control-character noise scores ~0.0, well below the 0.1 minimum.
        let noise: Vec<u8> = "\u{0007}".repeat(300).into_bytes();
        let input = DocumentInput::new("scan.bin", noise);

        let result = agent.act(&input, &ctx()).await.unwrap();

        // Text-path field extraction never ran; vision did.
        assert_eq!(provider.text_calls.load(Ordering::SeqCst), 0);
        assert_eq!(provider.vision_calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            result.data.claim_number.value.as_deref(),
            Some("CLM-2024-0142")
        );
        assert_eq!(result.data.claim_number.source, FieldSource::Vision);
    }

    #[tokio::test]
    async fn test_text_only_fails_terminally_when_text_unavailable() {
        let provider = Arc::new(ScriptedProvider::new());
        let agent = agent_with(provider, Arc::new(StubConverter)).with_min_text_quality(0.1);

        let noise: Vec<u8> = "\u{0007}".repeat(300).into_bytes();
        let input = DocumentInput::new("scan.bin", noise)
            .with_strategy(ExtractionStrategy::TextOnly);

        let err = agent.act(&input, &ctx()).await.unwrap_err();
        assert!(matches!(err, CoreError::Extraction(_)));
    }

    #[tokio::test]
    async fn test_provider_outage_yields_invalid_result_not_panic() {
        let provider = Arc::new(FailingProvider {
            config: ProviderConfig::default(),
        });
        let agent = agent_with(provider, Arc::new(NoConverter));
        let input = DocumentInput::new("estimate.txt", ESTIMATE_TEXT.as_bytes().to_vec());

        // Text path runs but every field call fails; vision is unavailable.
        let result = agent.act(&input, &ctx()).await.unwrap();
        assert!(!result.validation.is_valid);
        assert!(!result.data.has_usable_data());
    }

    #[tokio::test]
    async fn test_hybrid_fuses_sources() {
        let provider = Arc::new(ScriptedProvider::new());
        let agent = agent_with(provider.clone(), Arc::new(StubConverter));
        let input = DocumentInput::new("estimate.txt", ESTIMATE_TEXT.as_bytes().to_vec())
            .with_strategy(ExtractionStrategy::Hybrid);

        let result = agent.act(&input, &ctx()).await.unwrap();
        assert_eq!(provider.vision_calls.load(Ordering::SeqCst), 1);
        // Both paths produced the field; winner carries hybrid provenance.
        assert_eq!(result.data.claim_number.source, FieldSource::Hybrid);
        // Text list wins the all-or-nothing collection fusion.
        assert_eq!(result.data.items().len(), 2);
    }
}
