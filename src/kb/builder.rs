//! Knowledge base builder: joins corpus metadata to known-good structures,
//! embeds each entry's normalized text, and produces an immutable snapshot.
//!
//! Ingestion is best-effort per record: malformed or unmatched entries are
//! skipped with a warning. The build fails only when nothing valid remains.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::IngestionError;
use crate::kb::snapshot::{KbEntry, KnowledgeBaseSnapshot};
use crate::llm::EmbeddingProvider;
use crate::models::{DocumentationStructure, RepositoryRecord};

/// Build a snapshot from in-memory records and their structures, keyed by
/// `repo_url`. Records that cannot contribute a valid entry are skipped.
pub async fn build(
    embedder: &dyn EmbeddingProvider,
    records: Vec<RepositoryRecord>,
    structures_by_url: &HashMap<String, DocumentationStructure>,
) -> Result<KnowledgeBaseSnapshot, IngestionError> {
    let mut seen_urls: HashSet<String> = HashSet::new();
    let mut accepted: Vec<(RepositoryRecord, DocumentationStructure, String)> = Vec::new();
    let mut skipped = 0usize;

    for record in records {
        if record.repo_url.is_empty() {
            warn!("Corpus entry has no repo_url, skipping");
            skipped += 1;
            continue;
        }
        if !seen_urls.insert(record.repo_url.clone()) {
            warn!(repo = %record.repo_url, "Duplicate repo_url in corpus, skipping");
            skipped += 1;
            continue;
        }
        let Some(structure) = structures_by_url.get(&record.repo_url) else {
            warn!(repo = %record.repo_url, "No documentation structure found, skipping");
            skipped += 1;
            continue;
        };
        let corpus_text = record.corpus_text();
        if corpus_text.is_empty() {
            warn!(repo = %record.repo_url, "No usable metadata fields, skipping");
            skipped += 1;
            continue;
        }
        accepted.push((record, structure.clone(), corpus_text));
    }

    if accepted.is_empty() {
        return Err(IngestionError::EmptyCorpus);
    }

    let texts: Vec<String> = accepted.iter().map(|(_, _, text)| text.clone()).collect();
    let embeddings = embedder
        .embed_batch(&texts)
        .await
        .map_err(IngestionError::Embedding)?;

    if embeddings.len() != accepted.len() {
        return Err(IngestionError::EmbeddingCountMismatch {
            want: accepted.len(),
            got: embeddings.len(),
        });
    }

    // The embedding function has a fixed dimension; a mid-batch change is a
    // provider bug, not a bad record.
    let embedding_dim = embeddings[0].len();
    for embedding in &embeddings {
        if embedding.len() != embedding_dim {
            return Err(IngestionError::InconsistentDimensions {
                expected: embedding_dim,
                actual: embedding.len(),
            });
        }
    }

    let entries: Vec<KbEntry> = accepted
        .into_iter()
        .zip(embeddings)
        .map(|((record, structure, corpus_text), embedding)| KbEntry {
            record,
            structure,
            embedding,
            corpus_text,
        })
        .collect();

    info!(
        processed = entries.len(),
        skipped, embedding_dim, "Knowledge base build complete"
    );

    Ok(KnowledgeBaseSnapshot {
        embedding_model: embedder.model_id().to_string(),
        embedding_dim,
        built_at: Utc::now(),
        entries,
    })
}

/// Load all `*.json` metadata documents from a directory, one
/// `RepositoryRecord` each. Unparseable files are skipped with a warning.
pub fn load_corpus_dir(dir: &Path) -> Result<Vec<RepositoryRecord>> {
    let mut records = Vec::new();
    let read_dir = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read corpus directory {}", dir.display()))?;

    let mut paths: Vec<_> = read_dir
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    // Deterministic build input order regardless of filesystem iteration
    paths.sort();

    for path in paths {
        let data = match std::fs::read_to_string(&path) {
            Ok(data) => data,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "Failed to read corpus file, skipping");
                continue;
            }
        };
        match serde_json::from_str::<RepositoryRecord>(&data) {
            Ok(record) => records.push(record),
            Err(e) => {
                warn!(file = %path.display(), error = %e, "Failed to parse corpus file, skipping");
            }
        }
    }

    info!(count = records.len(), dir = %dir.display(), "Loaded corpus metadata");
    Ok(records)
}

/// One item of the structures collection: a repository and its known-good
/// documentation structure. Accepts the field names used by exported
/// wiki dumps.
#[derive(Deserialize)]
struct StructureItem {
    #[serde(alias = "github_url", alias = "github_repo")]
    repo_url: String,
    #[serde(alias = "documentation_structure")]
    structure: DocumentationStructure,
}

/// Load the `repo_url -> DocumentationStructure` mapping from a JSON array
/// of `{repo_url, structure}` items.
pub fn load_structures(path: &Path) -> Result<HashMap<String, DocumentationStructure>> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read structures file {}", path.display()))?;
    let items: Vec<serde_json::Value> = serde_json::from_str(&data)
        .with_context(|| format!("Failed to parse structures file {}", path.display()))?;

    let mut mapping = HashMap::new();
    for item in items {
        match serde_json::from_value::<StructureItem>(item) {
            Ok(parsed) if !parsed.repo_url.is_empty() => {
                mapping.insert(parsed.repo_url, parsed.structure);
            }
            Ok(_) => warn!("Structure item has empty repo_url, skipping"),
            Err(e) => warn!(error = %e, "Malformed structure item, skipping"),
        }
    }

    info!(count = mapping.len(), file = %path.display(), "Loaded documentation structures");
    Ok(mapping)
}
