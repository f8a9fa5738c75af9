//! ClaimLens CLI
//!
//! Runs one analysis job: extracts the estimate (and optionally a roof
//! report), reconciles them, generates supplement recommendations, and
//! prints the supervisor's terminal report as JSON.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use claimlens::services::prompt::{BuiltinPrompts, PromptConfigSource, PromptService};
use claimlens::services::{
    DocumentInput, EstimateExtractionAgent, ExtractionStrategy, JobRequest, Orchestrator,
    RoofExtractionAgent, Supervisor,
};
use claimlens::storage::Database;
use claimlens_core::{execute_stage, JobStatus, TaskContext};
use claimlens_docs::{DocumentTextExtractor, RasterImageConverter};
use claimlens_llm::{build_provider, ProviderConfig, ProviderType};

#[derive(Parser)]
#[command(name = "claimlens", about = "Estimate vs. roof report reconciliation", version)]
struct Cli {
    /// Path to the damage estimate document (PDF, text, or image)
    estimate: PathBuf,

    /// Path to the roof measurement report
    #[arg(long)]
    roof: Option<PathBuf>,

    /// Extraction strategy: text_only, vision_only, hybrid, fallback
    #[arg(long, default_value = "fallback")]
    strategy: String,

    /// Path to the configuration file
    #[arg(long, default_value = "claimlens.toml")]
    config: PathBuf,

    /// Persist job status and events to the local database
    #[arg(long)]
    persist: bool,

    /// Add the LLM narrative re-review to the supervisor pass
    #[arg(long)]
    narrative: bool,

    /// Print the full job outcome instead of just the review report
    #[arg(long)]
    full: bool,
}

/// On-disk configuration, all optional.
#[derive(Debug, Default, serde::Deserialize)]
struct FileConfig {
    #[serde(default)]
    provider: Option<ProviderConfig>,
}

/// Load configuration and fill the API key from the environment when the
/// file does not carry one.
fn load_provider_config(path: &PathBuf) -> anyhow::Result<ProviderConfig> {
    let mut config = if path.exists() {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let parsed: FileConfig =
            toml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
        parsed.provider.unwrap_or_default()
    } else {
        ProviderConfig::default()
    };

    if config.api_key.is_none() {
        let env_var = match config.provider {
            ProviderType::Anthropic => "ANTHROPIC_API_KEY",
            ProviderType::OpenAI => "OPENAI_API_KEY",
        };
        config.api_key = std::env::var(env_var).ok();
    }

    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let strategy: ExtractionStrategy = cli
        .strategy
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;

    let provider_config = load_provider_config(&cli.config)?;
    let provider = build_provider(provider_config);

    let text_extractor = Arc::new(DocumentTextExtractor::new());
    let image_converter = Arc::new(RasterImageConverter::new());

    let database = if cli.persist || cli.narrative {
        Some(Database::new()?)
    } else {
        None
    };
    let prompts: Arc<dyn PromptConfigSource> = match &database {
        Some(db) => Arc::new(PromptService::new(db.pool().clone())),
        None => Arc::new(BuiltinPrompts),
    };

    let estimate_agent = EstimateExtractionAgent::new(
        provider.clone(),
        text_extractor.clone(),
        image_converter.clone(),
        prompts.clone(),
    );
    let roof_agent = RoofExtractionAgent::new(
        provider.clone(),
        text_extractor,
        image_converter,
        prompts.clone(),
    );

    let mut orchestrator = Orchestrator::new(estimate_agent, roof_agent);
    if let Some(db) = &database {
        if cli.persist {
            orchestrator = orchestrator.with_sink(Arc::new(db.clone()));
        }
    }

    let estimate_bytes = std::fs::read(&cli.estimate)
        .with_context(|| format!("reading {}", cli.estimate.display()))?;
    let mut request = JobRequest::new(
        DocumentInput::new(cli.estimate.display().to_string(), estimate_bytes)
            .with_strategy(strategy),
    );
    if let Some(roof_path) = &cli.roof {
        let roof_bytes =
            std::fs::read(roof_path).with_context(|| format!("reading {}", roof_path.display()))?;
        request = request.with_roof_document(
            DocumentInput::new(roof_path.display().to_string(), roof_bytes).with_strategy(strategy),
        );
    }

    let outcome = orchestrator.run(request).await;

    let supervisor = if cli.narrative {
        Supervisor::new().with_narrative(provider, prompts)
    } else {
        Supervisor::new()
    };
    let supervision_ctx = TaskContext::new(&outcome.job_id, format!("{}:supervision", outcome.job_id));
    let report = execute_stage(&supervisor, &outcome, &supervision_ctx)
        .await
        .context("supervision failed")?;

    if cli.full {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "outcome": outcome,
                "review": report.data,
            }))?
        );
    } else {
        println!("{}", serde_json::to_string_pretty(&report.data)?);
    }

    if report.data.final_status == JobStatus::Failed {
        std::process::exit(1);
    }
    Ok(())
}
