//! Roof Report Extraction Agent
//!
//! Extracts the structured `RoofMeasurementRecord` from a roof-measurement
//! report. Same text/vision/fusion shape as the estimate agent, with numeric
//! measurement fields.

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

use crate::models::RoofMeasurementRecord;
use crate::services::prompt::PromptConfigSource;

use super::fusion::fuse_fields;
use super::parse::{coerce_f64, coerce_string, coerce_u32, field_from_value};
use super::quality::{text_quality_score, DEFAULT_MIN_TEXT_QUALITY, ROOF_KEYWORDS};
use super::strategy::ExtractionStrategy;
use super::{document_pages, DocumentInput, FieldPromptClient};

/// Extraction agent for roof-measurement reports.
pub struct RoofExtractionAgent {
    config: StageConfig,
    min_text_quality: f64,
    client: FieldPromptClient,
    text_extractor: Arc<dyn TextExtractor>,
    image_converter: Arc<dyn ImageConverter>,
}

impl RoofExtractionAgent {
    /// Create an agent with the default stage configuration.
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        text_extractor: Arc<dyn TextExtractor>,
        image_converter: Arc<dyn ImageConverter>,
        prompts: Arc<dyn PromptConfigSource>,
    ) -> Self {
        Self {
            config: StageConfig::new("roof_extraction")
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

    /// Run the text path: one prompt per measurement.
    async fn text_record(&self, text: &str) -> RoofMeasurementRecord {
        let total_area = self.client.extract_field("roof.total_area_sqft", text).await;
        let eave = self.client.extract_field("roof.eave_length_ft", text).await;
        let rake = self.client.extract_field("roof.rake_length_ft", text).await;
        let ridge_hip = self.client.extract_field("roof.ridge_hip_length_ft", text).await;
        let valley = self.client.extract_field("roof.valley_length_ft", text).await;
        let stories = self.client.extract_field("roof.story_count", text).await;
        let pitch = self.client.extract_field("roof.pitch", text).await;
        let facets = self.client.extract_field("roof.facet_count", text).await;

        RoofMeasurementRecord {
            total_area_sqft: length_field(total_area),
            eave_length_ft: length_field(eave),
            rake_length_ft: length_field(rake),
            ridge_hip_length_ft: length_field(ridge_hip),
            valley_length_ft: length_field(valley),
            story_count: count_field(stories),
            pitch: pitch_field(pitch),
            facet_count: count_field(facets),
        }
    }

    /// Run the vision path: one multimodal prompt over the page images.
    async fn vision_record(&self, bytes: &[u8]) -> CoreResult<RoofMeasurementRecord> {
        let pages = document_pages(&self.image_converter, bytes)?;
        let record = self.client.vision_record("roof.vision", pages).await?;

        Ok(RoofMeasurementRecord {
            total_area_sqft: length_field(field_from_value(
                record.get("total_area_sqft"),
                FieldSource::Vision,
            )),
            eave_length_ft: length_field(field_from_value(
                record.get("eave_length_ft"),
                FieldSource::Vision,
            )),
            rake_length_ft: length_field(field_from_value(
                record.get("rake_length_ft"),
                FieldSource::Vision,
            )),
            ridge_hip_length_ft: length_field(field_from_value(
                record.get("ridge_hip_length_ft"),
                FieldSource::Vision,
            )),
            valley_length_ft: length_field(field_from_value(
                record.get("valley_length_ft"),
                FieldSource::Vision,
            )),
            story_count: count_field(field_from_value(
                record.get("story_count"),
                FieldSource::Vision,
            )),
            pitch: pitch_field(field_from_value(record.get("pitch"), FieldSource::Vision)),
            facet_count: count_field(field_from_value(
                record.get("facet_count"),
                FieldSource::Vision,
            )),
        })
    }

    /// Fuse the text and vision candidates field by field.
    fn fuse_records(
        text: Option<RoofMeasurementRecord>,
        vision: Option<RoofMeasurementRecord>,
    ) -> RoofMeasurementRecord {
        let positive = |v: &f64| v.is_finite() && *v > 0.0;
        let positive_count = |v: &u32| *v > 0;
        let non_empty = |s: &String| !s.trim().is_empty();

        let (t, v) = (text, vision);
        RoofMeasurementRecord {
            total_area_sqft: fuse_fields(
                t.as_ref().map(|r| r.total_area_sqft.clone()),
                v.as_ref().map(|r| r.total_area_sqft.clone()),
                Some(&positive),
            ),
            eave_length_ft: fuse_fields(
                t.as_ref().map(|r| r.eave_length_ft.clone()),
                v.as_ref().map(|r| r.eave_length_ft.clone()),
                Some(&positive),
            ),
            rake_length_ft: fuse_fields(
                t.as_ref().map(|r| r.rake_length_ft.clone()),
                v.as_ref().map(|r| r.rake_length_ft.clone()),
                Some(&positive),
            ),
            ridge_hip_length_ft: fuse_fields(
                t.as_ref().map(|r| r.ridge_hip_length_ft.clone()),
                v.as_ref().map(|r| r.ridge_hip_length_ft.clone()),
                Some(&positive),
            ),
            valley_length_ft: fuse_fields(
                t.as_ref().map(|r| r.valley_length_ft.clone()),
                v.as_ref().map(|r| r.valley_length_ft.clone()),
                Some(&positive),
            ),
            story_count: fuse_fields(
                t.as_ref().map(|r| r.story_count.clone()),
                v.as_ref().map(|r| r.story_count.clone()),
                Some(&positive_count),
            ),
            pitch: fuse_fields(
                t.as_ref().map(|r| r.pitch.clone()),
                v.as_ref().map(|r| r.pitch.clone()),
                Some(&non_empty),
            ),
            facet_count: fuse_fields(
                t.as_ref().map(|r| r.facet_count.clone()),
                v.as_ref().map(|r| r.facet_count.clone()),
                Some(&positive_count),
            ),
        }
    }

    /// Score a record's completeness.
    fn assess(record: &RoofMeasurementRecord) -> ValidationResult {
        if !record.has_usable_data() {
            return ValidationResult::invalid("no usable measurements extracted from roof report");
        }

        let key_present = [
            record.total_area_sqft.is_present(),
            record.eave_length_ft.is_present(),
            record.ridge_hip_length_ft.is_present(),
        ]
        .iter()
        .filter(|present| **present)
        .count();

        let presence_ratio = key_present as f64 / 3.0;
        let confidence = 0.5 * presence_ratio + 0.5 * record.aggregate_confidence();

        let mut validation = ValidationResult::valid(confidence);
        if !record.total_area_sqft.is_present() {
            validation = validation.with_warning("total roof area not extracted");
        }
        if !record.eave_length_ft.is_present() {
            validation = validation.with_warning("eave length not extracted");
        }
        validation
    }
}

/// Convert a raw field payload into a length/area field.
fn length_field(field: ExtractedField<serde_json::Value>) -> ExtractedField<f64> {
    let coerced = field.value.as_ref().and_then(coerce_f64);
    ExtractedField::from_option(coerced, field.confidence, field.rationale, field.source)
        .with_attempts(field.attempts)
}

/// Convert a raw field payload into a count field.
fn count_field(field: ExtractedField<serde_json::Value>) -> ExtractedField<u32> {
    let coerced = field.value.as_ref().and_then(coerce_u32);
    ExtractedField::from_option(coerced, field.confidence, field.rationale, field.source)
        .with_attempts(field.attempts)
}

/// Convert a raw field payload into the pitch string field.
fn pitch_field(field: ExtractedField<serde_json::Value>) -> ExtractedField<String> {
    let coerced = field.value.as_ref().and_then(coerce_string);
    ExtractedField::from_option(coerced, field.confidence, field.rationale, field.source)
        .with_attempts(field.attempts)
}

#[async_trait]
impl PipelineStage for RoofExtractionAgent {
    type Input = DocumentInput;
    type Output = RoofMeasurementRecord;

    fn config(&self) -> &StageConfig {
        &self.config
    }

    async fn plan(&self, input: &DocumentInput, _ctx: &TaskContext) -> CoreResult<StagePlan> {
        let mut plan = StagePlan::default();
        if input.strategy.runs_text() {
            plan = plan.with_subtask("extract text and run measurement prompts", 8_000, 0.8);
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
    ) -> CoreResult<StageResult<RoofMeasurementRecord>> {
        let started = Instant::now();
        debug!(job_id = %ctx.job_id, file = %input.filename, strategy = %input.strategy, "roof extraction starting");

        let mut text_candidate: Option<RoofMeasurementRecord> = None;

        if input.strategy.runs_text() {
            match self.text_extractor.extract_text(&input.bytes) {
                Ok(text) => {
                    let quality = text_quality_score(&text, ROOF_KEYWORDS);
                    if quality < self.min_text_quality {
                        info!(
                            quality,
                            minimum = self.min_text_quality,
                            "text quality below minimum, skipping text path"
                        );
                    } else {
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

        let mut vision_candidate: Option<RoofMeasurementRecord> = None;
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
                "no extraction path produced data for the roof report",
            ));
        }

        let record = Self::fuse_records(text_candidate, vision_candidate);
        let validation = Self::assess(&record);

        Ok(
            StageResult::new(record, validation, started.elapsed().as_millis() as u64)
                .with_model(self.client.provider().model().to_string()),
        )
    }

    async fn validate(
        &self,
        result: &StageResult<RoofMeasurementRecord>,
        _ctx: &TaskContext,
    ) -> CoreResult<ValidationResult> {
        Ok(Self::assess(&result.data))
    }
}
