//! Prompt Configuration Service
//!
//! Per-step prompt configuration for the extraction and supervision stages.
//! Configurations live in SQLite and can be edited per deployment; a missing
//! row always yields the built-in default for that step, so an empty or
//! unreachable table never blocks the pipeline.

use std::collections::HashMap;

use regex::Regex;
use rusqlite::OptionalExtension;
use tracing::debug;

use crate::storage::database::DbPool;
use crate::utils::error::{AppError, AppResult};

/// Resolved configuration for one pipeline step.
#[derive(Debug, Clone)]
pub struct StepPromptConfig {
    /// Prompt template; placeholders use `{{variable}}` syntax
    pub prompt: String,
    /// Provider override, when configured
    pub provider: Option<String>,
    /// Model override, when configured
    pub model: Option<String>,
    /// Sampling temperature
    pub temperature: f32,
    /// Token budget for the response
    pub max_tokens: u32,
}

/// Source of per-step prompt configuration.
///
/// Implemented by the SQLite-backed service and by `BuiltinPrompts` for
/// tests and store-less deployments.
pub trait PromptConfigSource: Send + Sync {
    /// Resolve the configuration for a step. Never fails; absence yields
    /// the built-in default.
    fn step_config(&self, step: &str) -> StepPromptConfig;
}

/// Built-in defaults only, no store behind them.
#[derive(Debug, Default, Clone)]
pub struct BuiltinPrompts;

impl PromptConfigSource for BuiltinPrompts {
    fn step_config(&self, step: &str) -> StepPromptConfig {
        default_step_config(step)
    }
}

/// Human descriptions for the extracted fields, used in default prompts.
fn field_description(step: &str) -> &'static str {
    match step {
        "estimate.property_address" => "the street address of the insured property",
        "estimate.claim_number" => "the carrier's claim number",
        "estimate.carrier" => "the name of the insurance carrier",
        "estimate.date_of_loss" => "the date of loss",
        "estimate.total_rcv" => "the total replacement cost value (RCV) in dollars",
        "estimate.total_acv" => "the total actual cash value (ACV) in dollars",
        "estimate.deductible" => "the policy deductible in dollars",
        "roof.total_area_sqft" => "the total roof area in square feet",
        "roof.eave_length_ft" => "the total eave length in linear feet",
        "roof.rake_length_ft" => "the total rake length in linear feet",
        "roof.ridge_hip_length_ft" => "the combined ridge and hip length in linear feet",
        "roof.valley_length_ft" => "the total valley length in linear feet",
        "roof.story_count" => "the number of stories",
        "roof.pitch" => "the predominant roof pitch in rise/12 notation",
        "roof.facet_count" => "the number of roof facets",
        _ => "the requested field",
    }
}

/// The documented safe default for a step.
pub fn default_step_config(step: &str) -> StepPromptConfig {
    let prompt = match step {
        "estimate.line_items" => "You are an insurance claims analyst. List every line item in the \
             estimate document below. Respond with a JSON object: \
             {\"line_items\": [{\"description\": string, \"quantity\": number, \"unit\": string, \
             \"unit_price\": number|null, \"total\": number|null}], \"confidence\": number}. \
             Use the units printed on the estimate (SQ, LF, EA, ...).\n\nDocument:\n{{document}}"
            .to_string(),
        "estimate.vision" => "You are an insurance claims analyst reading a scanned damage estimate. \
             Extract the header fields and line items you can see. Respond with a JSON object whose \
             keys are property_address, claim_number, carrier, date_of_loss, total_rcv, total_acv, \
             deductible (each {\"value\": ..., \"confidence\": number, \"rationale\": string}) and \
             line_items ({\"line_items\": [...], \"confidence\": number})."
            .to_string(),
        "roof.vision" => "You are reading a scanned roof measurement report. Extract the measurements \
             you can see. Respond with a JSON object whose keys are total_area_sqft, eave_length_ft, \
             rake_length_ft, ridge_hip_length_ft, valley_length_ft, story_count, pitch, facet_count \
             (each {\"value\": ..., \"confidence\": number, \"rationale\": string})."
            .to_string(),
        "supervisor.narrative" => "You are reviewing the output of an automated claim analysis. \
             Given the job summary below, point out anything that looks inconsistent or worth a \
             human second look, in two or three sentences.\n\nSummary:\n{{summary}}"
            .to_string(),
        field_step => format!(
            "You are an insurance claims analyst. From the document below, extract {}. \
             Respond with a JSON object: {{\"value\": ..., \"confidence\": number between 0 and 1, \
             \"rationale\": string}}. Use null for value if the document does not contain it.\n\n\
             Document:\n{{{{document}}}}",
            field_description(field_step)
        ),
    };

    StepPromptConfig {
        prompt,
        provider: None,
        model: None,
        temperature: 0.1,
        max_tokens: if step.ends_with("line_items") || step.ends_with("vision") {
            2048
        } else {
            512
        },
    }
}

/// Render a prompt template, substituting `{{variable}}` placeholders.
pub fn render_prompt(template: &str, vars: &HashMap<&str, String>) -> String {
    let mut rendered = template.to_string();
    for (key, value) in vars {
        rendered = rendered.replace(&format!("{{{{{key}}}}}"), value);
    }
    rendered
}

/// Extract `{{variable}}` names from template content
pub fn extract_variables(content: &str) -> Vec<String> {
    let re = Regex::new(r"\{\{(\w+)\}\}").unwrap();
    let mut vars: Vec<String> = re
        .captures_iter(content)
        .map(|c| c[1].to_string())
        .collect();
    vars.dedup();
    vars
}

/// SQLite-backed prompt configuration store.
pub struct PromptService {
    pool: DbPool,
}

impl PromptService {
    /// Create a new PromptService with a database pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Store or replace the configuration for a step.
    pub fn set_step_config(&self, step: &str, config: &StepPromptConfig) -> AppResult<()> {
        let conn = self
            .pool
            .get()
            .map_err(|e| AppError::database(format!("Failed to get connection: {}", e)))?;

        conn.execute(
            "INSERT INTO prompt_configs (step, prompt, provider, model, temperature, max_tokens, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, datetime('now'))
             ON CONFLICT(step) DO UPDATE SET
                prompt = excluded.prompt,
                provider = excluded.provider,
                model = excluded.model,
                temperature = excluded.temperature,
                max_tokens = excluded.max_tokens,
                updated_at = datetime('now')",
            rusqlite::params![
                step,
                config.prompt,
                config.provider,
                config.model,
                config.temperature as f64,
                config.max_tokens,
            ],
        )?;
        Ok(())
    }

    /// Fetch the stored configuration for a step, if any.
    fn stored_step_config(&self, step: &str) -> AppResult<Option<StepPromptConfig>> {
        let conn = self
            .pool
            .get()
            .map_err(|e| AppError::database(format!("Failed to get connection: {}", e)))?;

        let mut stmt = conn.prepare(
            "SELECT prompt, provider, model, temperature, max_tokens
             FROM prompt_configs WHERE step = ?1",
        )?;

        let result = stmt
            .query_row(rusqlite::params![step], |row| {
                Ok(StepPromptConfig {
                    prompt: row.get(0)?,
                    provider: row.get(1)?,
                    model: row.get(2)?,
                    temperature: row.get::<_, f64>(3)? as f32,
                    max_tokens: row.get(4)?,
                })
            })
            .optional()?;

        Ok(result)
    }
}

impl PromptConfigSource for PromptService {
    fn step_config(&self, step: &str) -> StepPromptConfig {
        match self.stored_step_config(step) {
            Ok(Some(config)) => config,
            Ok(None) => default_step_config(step),
            Err(e) => {
                // A broken store must not block the pipeline.
                debug!(step, error = %e, "prompt store unavailable, using default");
                default_step_config(step)
            }
        }
    }
}
