//! Clinical consultation crew runner.
//!
//! Usage:
//!   crew --question "Varón de 75 años con FA, ¿anticoagulamos?"
//!   crew --config crew.toml --question-file caso.txt --output expediente.md
//!   crew --question "..." --json
//!
//! # Environment Variables
//!
//! - `OPENAI_API_KEY` / `ANTHROPIC_API_KEY` - provider keys when not set in the config
//! - `RUST_LOG` - log filter (default: `info`); logs go to stderr

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{ArgGroup, Parser};
use crew_coordinator::{ConsultationOutcome, Coordinator, CrewConfig};
use crew_knowledge::{EmbeddingService, KnowledgeStore};
use crew_tools::{PubMedClient, ToolServices};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_CONFIG: &str = "crew.toml";

#[derive(Parser)]
#[command(name = "crew")]
#[command(about = "Multi-agent clinical consultation: GP coordinator, specialists and clinical record")]
#[command(group(ArgGroup::new("input").required(true).args(["question", "question_file"])))]
struct Cli {
    /// Configuration file (defaults apply when crew.toml is absent)
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Clinical question
    #[arg(long, short)]
    question: Option<String>,

    /// Read the clinical question from a file
    #[arg(long)]
    question_file: Option<PathBuf>,

    /// Write the document to this file instead of stdout
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Print the full outcome as JSON
    #[arg(long, default_value_t = false)]
    json: bool,
}

fn load_config(path: Option<&Path>) -> anyhow::Result<CrewConfig> {
    match path {
        Some(path) => CrewConfig::from_file(path),
        None if Path::new(DEFAULT_CONFIG).exists() => CrewConfig::from_file(DEFAULT_CONFIG),
        None => {
            info!("No {DEFAULT_CONFIG} found, using default configuration");
            let config = CrewConfig::default();
            config.validate()?;
            Ok(config)
        }
    }
}

async fn read_question(cli: &Cli) -> anyhow::Result<String> {
    let question = match (&cli.question, &cli.question_file) {
        (Some(text), _) => text.clone(),
        (None, Some(path)) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read question file '{}'", path.display()))?,
        (None, None) => bail!("Provide --question or --question-file"),
    };
    let question = question.trim().to_string();
    if question.is_empty() {
        bail!("The clinical question is empty");
    }
    Ok(question)
}

async fn build_services(config: &CrewConfig) -> anyhow::Result<ToolServices> {
    let embedder = EmbeddingService::from_model_str(&config.knowledge.embedding_model)?;
    let store = KnowledgeStore::new(config.knowledge.clone(), Arc::new(embedder));
    let documents = store
        .load_all(&config.workflow.available_specialties)
        .await
        .context("Failed to load knowledge bases")?;
    for stats in store.statistics().await {
        info!(
            specialty = %stats.specialty,
            documents = stats.documents,
            chunks = stats.chunks,
            "Knowledge base ready"
        );
    }
    info!(documents, "Knowledge bases loaded");

    let mut services = ToolServices::default().with_knowledge(Arc::new(store));
    if config.tools.enable_literature_search {
        let pubmed = PubMedClient::new(
            config.tools.pubmed_api_key.clone(),
            config.tools.pubmed_email.clone(),
            Duration::from_millis(config.tools.pubmed_timeout_ms),
        )?;
        services = services.with_literature(Arc::new(pubmed));
    }
    Ok(services)
}

fn emit(cli: &Cli, outcome: &ConsultationOutcome) -> anyhow::Result<()> {
    let text = if cli.json {
        serde_json::to_string_pretty(outcome)?
    } else {
        outcome.document().to_string()
    };

    match &cli.output {
        Some(path) => {
            std::fs::write(path, &text)
                .with_context(|| format!("Failed to write output '{}'", path.display()))?;
            info!(path = %path.display(), "Output written");
        }
        None => println!("{text}"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    let question = read_question(&cli).await?;
    let services = build_services(&config).await?;
    let coordinator = Coordinator::from_config(&config, services)?;

    let outcome = coordinator.consult(&question).await;
    emit(&cli, &outcome)
}
