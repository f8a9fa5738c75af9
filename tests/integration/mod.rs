//! End-to-end pipeline tests
//!
//! Drive the real agents, engines, orchestrator, and supervisor against a
//! scripted provider and in-memory storage. No network, no real models.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use claimlens::models::ComparisonStatus;
use claimlens::services::prompt::BuiltinPrompts;
use claimlens::services::{
    DocumentInput, EstimateExtractionAgent, JobRequest, Orchestrator, RoofExtractionAgent,
    Supervisor,
};
use claimlens::storage::Database;
use claimlens::ExtractionStrategy;
use claimlens_core::{execute_stage, JobStatus, TaskContext};
use claimlens_docs::{ConvertOptions, DocsError, DocsResult, DocumentTextExtractor, ImageConverter, PageImage};
use claimlens_llm::{
    CompletionRequest, LlmProvider, LlmResponse, LlmResult, ProviderConfig, UsageStats,
};

const ESTIMATE_TEXT: &str = "Insurance Claim Estimate\n\
    Claim Number: CLM-2024-0142\n\
    Carrier: Example Mutual\n\
    Insured property: 12 Oak St, Springfield\n\
    Deductible: $1,000.00\n\
    Date of Loss: 04/12/2024\n\
    Total RCV: $18,432.10  Total ACV: $16,220.45\n\
    Remove & replace laminated shingles    32.5 SQ\n\
    Drip edge - aluminum    260 LF\n";

const ROOF_TEXT: &str = "Roof Measurement Report\n\
    Total roof area: 3250 sq ft (32.5 squares)\n\
    Eave length: 150 ft, Rake length: 110 ft\n\
    Ridge/Hip: 62 ft, Valleys: 38 ft\n\
    Predominant pitch: 8/12, Stories: 2, Facets: 14\n";

/// Provider scripted off prompt content for both document types.
struct ScriptedProvider {
    config: ProviderConfig,
    calls: AtomicU32,
}

impl ScriptedProvider {
    fn new() -> Self {
        Self {
            config: ProviderConfig::default(),
            calls: AtomicU32::new(0),
        }
    }

    fn respond(prompt: &str) -> String {
        // Estimate fields.
        if prompt.contains("line item") {
            return r#"{"line_items": [
                {"description": "Remove & replace laminated shingles", "quantity": 32.5, "unit": "SQ", "unit_price": 285.0, "total": 9262.5},
                {"description": "Drip edge - aluminum", "quantity": 260, "unit": "LF"}
            ], "confidence": 0.88}"#
                .to_string();
        }
        if prompt.contains("claim number") {
            return r#"{"value": "CLM-2024-0142", "confidence": 0.92, "rationale": "header"}"#.into();
        }
        if prompt.contains("street address") {
            return r#"{"value": "12 Oak St, Springfield", "confidence": 0.9, "rationale": "header"}"#
                .into();
        }
        if prompt.contains("insurance carrier") {
            return r#"{"value": "Example Mutual", "confidence": 0.88, "rationale": "header"}"#.into();
        }
        if prompt.contains("date of loss") {
            return r#"{"value": "04/12/2024", "confidence": 0.85, "rationale": "header"}"#.into();
        }
        if prompt.contains("(RCV)") {
            return r#"{"value": "$18,432.10", "confidence": 0.9, "rationale": "totals row"}"#.into();
        }
        if prompt.contains("(ACV)") {
            return r#"{"value": "$16,220.45", "confidence": 0.87, "rationale": "totals row"}"#.into();
        }
        if prompt.contains("deductible") {
            return r#"{"value": 1000, "confidence": 0.85, "rationale": "totals row"}"#.into();
        }

        // Roof measurements.
        if prompt.contains("total roof area") {
            return r#"{"value": 3250, "confidence": 0.9, "rationale": "summary"}"#.into();
        }
        if prompt.contains("eave length") {
            return r#"{"value": 150, "confidence": 0.9, "rationale": "measurement table"}"#.into();
        }
        if prompt.contains("rake length") {
            return r#"{"value": 110, "confidence": 0.85, "rationale": "measurement table"}"#.into();
        }
        if prompt.contains("ridge and hip") {
            return r#"{"value": 62, "confidence": 0.85, "rationale": "measurement table"}"#.into();
        }
        if prompt.contains("valley length") {
            return r#"{"value": 38, "confidence": 0.8, "rationale": "measurement table"}"#.into();
        }
        if prompt.contains("number of stories") {
            return r#"{"value": 2, "confidence": 0.8, "rationale": "diagram"}"#.into();
        }
        if prompt.contains("pitch") {
            return r#"{"value": "8/12", "confidence": 0.85, "rationale": "diagram"}"#.into();
        }
        if prompt.contains("facets") {
            return r#"{"value": 14, "confidence": 0.75, "rationale": "diagram"}"#.into();
        }

        r#"{"value": null, "confidence": 0.1, "rationale": "not found"}"#.into()
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

    async fn complete(&self, request: CompletionRequest) -> LlmResult<LlmResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(LlmResponse {
            content: Self::respond(&request.prompt),
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

/// No rasterizer in the test environment.
struct NoConverter;

impl ImageConverter for NoConverter {
    fn convert_to_images(
        &self,
        _document: &[u8],
        _options: &ConvertOptions,
    ) -> DocsResult<Vec<PageImage>> {
        Err(DocsError::unsupported("no rasterizer in tests"))
    }
}

fn build_orchestrator(
    provider: Arc<ScriptedProvider>,
) -> Orchestrator<EstimateExtractionAgent, RoofExtractionAgent> {
    let text_extractor = Arc::new(DocumentTextExtractor::new());
    let image_converter = Arc::new(NoConverter);
    let prompts = Arc::new(BuiltinPrompts);

    let estimate_agent = EstimateExtractionAgent::new(
        provider.clone(),
        text_extractor.clone(),
        image_converter.clone(),
        prompts.clone(),
    );
    let roof_agent =
        RoofExtractionAgent::new(provider, text_extractor, image_converter, prompts);

    Orchestrator::new(estimate_agent, roof_agent)
}

fn estimate_doc() -> DocumentInput {
    DocumentInput::new("estimate.txt", ESTIMATE_TEXT.as_bytes().to_vec())
        .with_strategy(ExtractionStrategy::Fallback)
}

fn roof_doc() -> DocumentInput {
    DocumentInput::new("roof.txt", ROOF_TEXT.as_bytes().to_vec())
        .with_strategy(ExtractionStrategy::Fallback)
}

#[tokio::test]
async fn full_pipeline_completes_and_recommends_starter() {
    let provider = Arc::new(ScriptedProvider::new());
    let orchestrator = build_orchestrator(provider.clone());

    let outcome = orchestrator
        .run(JobRequest::new(estimate_doc()).with_roof_document(roof_doc()))
        .await;

    assert_eq!(outcome.status, JobStatus::Completed);
    assert_eq!(outcome.fatal_error_count(), 0);

    // Extraction results.
    let estimate = outcome.estimate.as_ref().unwrap();
    assert_eq!(
        estimate.data.claim_number.value.as_deref(),
        Some("CLM-2024-0142")
    );
    assert_eq!(estimate.data.items().len(), 2);

    let roof = outcome.roof.as_ref().unwrap();
    assert_eq!(roof.data.eave_length_ft.value, Some(150.0));

    // Discrepancy: implied area 3250 matches reported 3250.
    let discrepancy = outcome.discrepancy.as_ref().unwrap();
    let area = discrepancy
        .comparison_points
        .iter()
        .find(|p| p.field == "roof_area_sqft")
        .unwrap();
    assert_eq!(area.status, ComparisonStatus::Match);
    assert!((0.05..=0.95).contains(&discrepancy.overall_consistency_score));

    // Eave length 150 present, no starter line item: exactly one starter
    // recommendation at quantity 150 LF.
    let starters: Vec<_> = outcome
        .recommendations
        .iter()
        .filter(|r| r.id == "starter-shingles")
        .collect();
    assert_eq!(starters.len(), 1);
    assert_eq!(starters[0].quantity.value, Some(150.0));
    assert_eq!(starters[0].unit, "LF");

    // Supervisor keeps the job completed.
    let supervisor = Supervisor::new();
    let ctx = TaskContext::new(&outcome.job_id, "supervision");
    let report = execute_stage(&supervisor, &outcome, &ctx).await.unwrap();
    assert_eq!(report.data.final_status, JobStatus::Completed);
    assert!(report.data.overall_confidence > 0.5);
}

#[tokio::test]
async fn roof_document_omitted_still_completes() {
    let provider = Arc::new(ScriptedProvider::new());
    let orchestrator = build_orchestrator(provider);

    let outcome = orchestrator.run(JobRequest::new(estimate_doc())).await;

    assert_eq!(outcome.status, JobStatus::Completed);
    assert!(outcome.roof.is_none());
    assert!(outcome
        .skipped
        .iter()
        .any(|s| s.stage == "roof_extraction"));

    // One-sided discrepancy analysis still ran.
    assert!(outcome.discrepancy.is_some());

    let supervisor = Supervisor::new();
    let ctx = TaskContext::new(&outcome.job_id, "supervision");
    let report = execute_stage(&supervisor, &outcome, &ctx).await.unwrap();
    assert_eq!(report.data.final_status, JobStatus::Completed);
}

#[tokio::test]
async fn unreadable_estimate_fails_job_and_review() {
    let provider = Arc::new(ScriptedProvider::new());
    let orchestrator = build_orchestrator(provider);

    // Not UTF-8, not PDF, and no rasterizer: both paths unavailable.
    let garbage = vec![0xFFu8, 0xFE, 0x00, 0x9C, 0x80, 0x01];
    let outcome = orchestrator
        .run(JobRequest::new(DocumentInput::new("junk.bin", garbage)))
        .await;

    assert_eq!(outcome.status, JobStatus::Failed);
    assert!(!outcome.errors.is_empty());
    assert!(outcome
        .skipped
        .iter()
        .any(|s| s.stage == "discrepancy_analysis"));

    let supervisor = Supervisor::new();
    let ctx = TaskContext::new(&outcome.job_id, "supervision");
    let report = execute_stage(&supervisor, &outcome, &ctx).await.unwrap();
    assert_eq!(report.data.final_status, JobStatus::Failed);
}

#[tokio::test]
async fn job_history_lands_in_storage() {
    let db = Database::new_in_memory().unwrap();
    let provider = Arc::new(ScriptedProvider::new());
    let orchestrator = build_orchestrator(provider).with_sink(Arc::new(db.clone()));

    let outcome = orchestrator
        .run(
            JobRequest::new(estimate_doc())
                .with_roof_document(roof_doc())
                .with_job_id("job-e2e"),
        )
        .await;
    assert_eq!(outcome.status, JobStatus::Completed);

    let record = db.get_job("job-e2e").unwrap().unwrap();
    assert_eq!(record.status, JobStatus::Completed);

    let events = db.list_events("job-e2e").unwrap();
    assert!(events.len() >= 4);
    assert!(events.iter().any(|e| e.stage == "estimate_extraction"));
    assert!(events.iter().any(|e| e.stage == "roof_extraction"));
}
