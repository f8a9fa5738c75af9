//! Pipeline Services
//!
//! The pipeline stages and their supporting services.

pub mod discrepancy;
pub mod extraction;
pub mod orchestrator;
pub mod prompt;
pub mod rules;
pub mod supervisor;

pub use discrepancy::{DiscrepancyEngine, DiscrepancyInput, DiscrepancyStage};
pub use extraction::{DocumentInput, EstimateExtractionAgent, ExtractionStrategy, RoofExtractionAgent};
pub use orchestrator::{JobRequest, Orchestrator};
pub use prompt::{BuiltinPrompts, PromptConfigSource, PromptService, StepPromptConfig};
pub use rules::{RecommendationEngine, RecommendationInput, RecommendationStage, RuleContext};
pub use supervisor::Supervisor;
