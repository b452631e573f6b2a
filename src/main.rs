use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use adocs::config::Config;
use adocs::generator::{BackoffPolicy, DocStructureGenerator, GenerationRequest};
use adocs::kb::{builder, KnowledgeBaseSnapshot};
use adocs::llm::{HttpChatProvider, HttpEmbedder};
use adocs::models::RepositoryRecord;
use adocs::state::AppState;

#[derive(Parser)]
#[command(name = "adocs")]
#[command(about = "Generate documentation outlines from similar repositories via RAG")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the knowledge base snapshot from a corpus directory
    Build {
        /// Directory of per-repository metadata JSON documents
        #[arg(long)]
        corpus: PathBuf,
        /// JSON file mapping repositories to documentation structures
        #[arg(long)]
        structures: PathBuf,
        /// Snapshot output path (defaults to ADOCS_SNAPSHOT_PATH)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Generate a documentation structure for one repository
    Generate {
        /// Path to the query repository's metadata JSON document
        query: PathBuf,
        /// Snapshot path (defaults to ADOCS_SNAPSHOT_PATH)
        #[arg(long)]
        snapshot: Option<PathBuf>,
        /// Number of similar repositories to use as exemplars
        #[arg(short)]
        k: Option<usize>,
        /// Model to try, in order; repeat for a fallback chain
        #[arg(long = "model")]
        models: Vec<String>,
        /// Retries per model after the initial attempt
        #[arg(long)]
        max_retries: Option<u32>,
        /// Write the structure here instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build {
            corpus,
            structures,
            out,
        } => build_snapshot(config, corpus, structures, out).await,
        Commands::Generate {
            query,
            snapshot,
            k,
            models,
            max_retries,
            out,
        } => generate_structure(config, query, snapshot, k, models, max_retries, out).await,
    }
}

async fn build_snapshot(
    config: Config,
    corpus: PathBuf,
    structures: PathBuf,
    out: Option<PathBuf>,
) -> anyhow::Result<()> {
    let out = out.unwrap_or_else(|| config.snapshot_path.clone());
    tracing::info!(
        "LLM provider: {} ({})",
        config.llm.provider,
        config.llm.base_url
    );

    let records = builder::load_corpus_dir(&corpus)?;
    let structures_by_url = builder::load_structures(&structures)?;

    let http_client = reqwest::Client::builder()
        .connect_timeout(std::time::Duration::from_secs(10))
        .timeout(std::time::Duration::from_secs(
            config.llm.request_timeout_secs,
        ))
        .build()?;
    let embedder = HttpEmbedder::new(http_client, config.llm.clone());

    let snapshot = builder::build(&embedder, records, &structures_by_url)
        .await
        .context("Knowledge base build failed")?;

    snapshot.save(&out)?;
    tracing::info!(entries = snapshot.len(), path = %out.display(), "Snapshot written");
    Ok(())
}

async fn generate_structure(
    config: Config,
    query_path: PathBuf,
    snapshot_path: Option<PathBuf>,
    k: Option<usize>,
    models: Vec<String>,
    max_retries: Option<u32>,
    out: Option<PathBuf>,
) -> anyhow::Result<()> {
    let snapshot_path = snapshot_path.unwrap_or_else(|| config.snapshot_path.clone());
    let snapshot = KnowledgeBaseSnapshot::load(&snapshot_path)?;
    let stats = snapshot.stats();
    tracing::info!(
        entries = stats.total_entries,
        technologies = stats.unique_technologies,
        domains = stats.unique_business_domains,
        "Knowledge base loaded"
    );

    let data = std::fs::read_to_string(&query_path)
        .with_context(|| format!("Failed to read query file {}", query_path.display()))?;
    let query: RepositoryRecord = serde_json::from_str(&data)
        .with_context(|| format!("Failed to parse query file {}", query_path.display()))?;

    let state = AppState::new(config, snapshot)?;
    let snapshot = state.snapshot();

    let embedder = Arc::new(HttpEmbedder::new(
        state.http_client.clone(),
        state.config.llm.clone(),
    ));
    let chat = Arc::new(HttpChatProvider::new(
        state.http_client.clone(),
        state.config.llm.clone(),
    ));
    let backoff = BackoffPolicy {
        initial: std::time::Duration::from_millis(state.config.generation.initial_backoff_ms),
        max: std::time::Duration::from_millis(state.config.generation.max_backoff_ms),
    };
    let generator = DocStructureGenerator::new(embedder, chat, backoff);

    let mut request = GenerationRequest::new(query, &state.config.generation);
    if let Some(k) = k {
        request.k = k;
    }
    if !models.is_empty() {
        request.model_fallback_chain = models;
    }
    if let Some(retries) = max_retries {
        request.max_retries = retries;
    }

    let structure = generator
        .generate(&request, &snapshot)
        .await
        .context("Generation failed")?;

    let json = serde_json::to_string_pretty(&structure)?;
    match out {
        Some(path) => {
            std::fs::write(&path, &json)
                .with_context(|| format!("Failed to write output to {}", path.display()))?;
            tracing::info!(path = %path.display(), "Documentation structure written");
        }
        None => println!("{json}"),
    }
    Ok(())
}
