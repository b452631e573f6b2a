//! Structure generation: LLM invocation with a prioritized model fallback
//! chain, bounded retries with backoff, and strict schema validation of the
//! response.
//!
//! The retry state machine treats transient provider failures (timeout,
//! rate limit, unavailable model) and schema-invalid output identically:
//! retry the same model up to the budget, then advance to the next model.
//! Schema-invalid output is never repaired; exhausting every model yields
//! `RetriesExhausted` carrying the last underlying error.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::GenerationConfig;
use crate::error::{GenerateError, GenerationError, RetrievalError};
use crate::kb::KnowledgeBaseSnapshot;
use crate::llm::{ChatProvider, EmbeddingProvider};
use crate::models::{DocSection, DocumentationStructure, RepositoryRecord, Subsection};
use crate::prompt;
use crate::retrieve;

// ─── Response parsing and schema validation ──────────────

/// Why a parseable response failed the schema check. Kept separate from
/// parse errors so diagnostics distinguish "not JSON" from "JSON of the
/// wrong shape".
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaViolation {
    #[error("section list is empty")]
    EmptySectionList,
    #[error("section {index} has an empty title")]
    EmptyTitle { index: usize },
    #[error("duplicate sibling title `{title}`")]
    DuplicateTitle { title: String },
    #[error("section `{section}` has an empty subsection title")]
    EmptySubsection { section: String },
}

/// Strip markdown code fences so a response wrapped in ```json blocks
/// still parses. Models add these despite instructions not to.
fn clean_json_response(response: &str) -> &str {
    let cleaned = if let Some(start) = response.find("```json") {
        let rest = &response[start + 7..];
        match rest.find("```") {
            Some(end) => &rest[..end],
            None => rest,
        }
    } else if let Some(start) = response.find("```") {
        let rest = &response[start + 3..];
        match rest.find("```") {
            Some(end) => &rest[..end],
            None => rest,
        }
    } else {
        response
    };
    cleaned.trim()
}

/// Parse and validate an LLM response into a documentation structure.
/// Only a top-level JSON array is accepted; wrapper objects such as
/// `{"sections": [...]}` are schema violations, not alternate encodings.
pub fn parse_structure(raw: &str) -> Result<DocumentationStructure, GenerationError> {
    let cleaned = clean_json_response(raw);

    let value: serde_json::Value = serde_json::from_str(cleaned)
        .map_err(|e| GenerationError::InvalidResponseFormat(format!("not valid JSON: {e}")))?;

    if !value.is_array() {
        return Err(GenerationError::InvalidResponseFormat(
            "expected a top-level JSON array of sections".to_string(),
        ));
    }

    let sections: DocumentationStructure = serde_json::from_value(value)
        .map_err(|e| GenerationError::InvalidResponseFormat(format!("wrong section shape: {e}")))?;

    validate_structure(&sections)
        .map_err(|v| GenerationError::InvalidResponseFormat(v.to_string()))?;

    Ok(sections)
}

/// Schema check: non-empty section list, non-empty titles, unique titles
/// among siblings, recursively for nested sections.
pub fn validate_structure(sections: &[DocSection]) -> Result<(), SchemaViolation> {
    if sections.is_empty() {
        return Err(SchemaViolation::EmptySectionList);
    }

    let mut titles = HashSet::new();
    for (index, section) in sections.iter().enumerate() {
        if section.title.trim().is_empty() {
            return Err(SchemaViolation::EmptyTitle { index });
        }
        if !titles.insert(section.title.clone()) {
            return Err(SchemaViolation::DuplicateTitle {
                title: section.title.clone(),
            });
        }
        validate_subsections(section)?;
    }
    Ok(())
}

/// Check one section's subsection list: plain titles and nested section
/// titles share the sibling namespace. Recurses into nested sections.
fn validate_subsections(section: &DocSection) -> Result<(), SchemaViolation> {
    let mut titles = HashSet::new();
    for sub in &section.subsections {
        let title = match sub {
            Subsection::Title(t) => t.as_str(),
            Subsection::Nested(inner) => inner.title.as_str(),
        };
        if title.trim().is_empty() {
            return Err(SchemaViolation::EmptySubsection {
                section: section.title.clone(),
            });
        }
        if !titles.insert(title.to_string()) {
            return Err(SchemaViolation::DuplicateTitle {
                title: title.to_string(),
            });
        }
        if let Subsection::Nested(inner) = sub {
            validate_subsections(inner)?;
        }
    }
    Ok(())
}

// ─── Retry state machine ─────────────────────────────────

/// Backoff schedule between retries of the same model. No jitter: delays
/// are deterministic.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub max: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(10),
        }
    }
}

impl BackoffPolicy {
    /// No waiting between attempts; used by tests.
    pub fn none() -> Self {
        Self {
            initial: Duration::ZERO,
            max: Duration::ZERO,
        }
    }

    fn delay(&self, attempt: u32) -> Duration {
        let base = self.initial.as_millis() as u64;
        let exp = base.saturating_mul(2u64.saturating_pow(attempt));
        Duration::from_millis(exp.min(self.max.as_millis() as u64))
    }
}

/// Invokes the LLM through the fallback chain and validates the response.
pub struct StructureGenerator {
    chat: Arc<dyn ChatProvider>,
    backoff: BackoffPolicy,
}

impl StructureGenerator {
    pub fn new(chat: Arc<dyn ChatProvider>, backoff: BackoffPolicy) -> Self {
        Self { chat, backoff }
    }

    /// Run the prompt through the model fallback chain. Each model gets one
    /// attempt plus `max_retries` retries before the next model is tried.
    pub async fn generate(
        &self,
        prompt: &str,
        models: &[String],
        max_retries: u32,
        cancel: &CancellationToken,
    ) -> Result<DocumentationStructure, GenerationError> {
        let mut last_error: Option<GenerationError> = None;

        for model in models {
            for attempt in 0..=max_retries {
                if cancel.is_cancelled() {
                    return Err(GenerationError::Cancelled);
                }

                let outcome = tokio::select! {
                    _ = cancel.cancelled() => return Err(GenerationError::Cancelled),
                    result = self.attempt(prompt, model) => result,
                };

                match outcome {
                    Ok(structure) => {
                        info!(model, attempt, "Generated valid documentation structure");
                        return Ok(structure);
                    }
                    Err(err) => {
                        warn!(model, attempt, error = %err, "Generation attempt failed");
                        last_error = Some(err);
                        if attempt < max_retries {
                            let delay = self.backoff.delay(attempt);
                            if !delay.is_zero() {
                                tokio::select! {
                                    _ = cancel.cancelled() => return Err(GenerationError::Cancelled),
                                    _ = tokio::time::sleep(delay) => {}
                                }
                            }
                        }
                    }
                }
            }
            info!(model, "Retry budget exhausted, advancing to next model");
        }

        Err(GenerationError::RetriesExhausted {
            last: Box::new(last_error.unwrap_or_else(|| {
                GenerationError::ModelUnavailable("empty model fallback chain".to_string())
            })),
        })
    }

    async fn attempt(
        &self,
        prompt: &str,
        model: &str,
    ) -> Result<DocumentationStructure, GenerationError> {
        let response = self.chat.complete(prompt, model).await?;
        parse_structure(&response)
    }
}

// ─── Facade ──────────────────────────────────────────────

/// One generation call: query metadata plus per-request parameters.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub query: RepositoryRecord,
    pub k: usize,
    pub model_fallback_chain: Vec<String>,
    pub max_retries: u32,
}

impl GenerationRequest {
    pub fn new(query: RepositoryRecord, defaults: &GenerationConfig) -> Self {
        Self {
            query,
            k: defaults.top_k,
            model_fallback_chain: defaults.model_fallback_chain.clone(),
            max_retries: defaults.max_retries,
        }
    }
}

/// Composes retrieval, prompt composition and generation into a single
/// call: query metadata in, validated structure out.
pub struct DocStructureGenerator {
    embedder: Arc<dyn EmbeddingProvider>,
    generator: StructureGenerator,
}

impl DocStructureGenerator {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        chat: Arc<dyn ChatProvider>,
        backoff: BackoffPolicy,
    ) -> Self {
        Self {
            embedder,
            generator: StructureGenerator::new(chat, backoff),
        }
    }

    pub async fn generate(
        &self,
        request: &GenerationRequest,
        snapshot: &KnowledgeBaseSnapshot,
    ) -> Result<DocumentationStructure, GenerateError> {
        self.generate_with_cancel(request, snapshot, &CancellationToken::new())
            .await
    }

    pub async fn generate_with_cancel(
        &self,
        request: &GenerationRequest,
        snapshot: &KnowledgeBaseSnapshot,
        cancel: &CancellationToken,
    ) -> Result<DocumentationStructure, GenerateError> {
        if snapshot.embedding_model != self.embedder.model_id() {
            return Err(RetrievalError::EmbeddingModelMismatch {
                snapshot: snapshot.embedding_model.clone(),
                embedder: self.embedder.model_id().to_string(),
            }
            .into());
        }

        info!(repo = %request.query.repo_url, "Starting documentation structure generation");

        let matches = retrieve::retrieve(
            self.embedder.as_ref(),
            &request.query,
            snapshot,
            request.k,
        )
        .await?;

        let prompt = prompt::compose(&request.query, &matches)?;

        let structure = self
            .generator
            .generate(
                &prompt,
                &request.model_fallback_chain,
                request.max_retries,
                cancel,
            )
            .await?;

        Ok(structure)
    }
}
