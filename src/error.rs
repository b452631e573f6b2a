//! Error taxonomy for the generation pipeline.
//!
//! Ingestion failures are absorbed per-record by the builder; everything
//! else is surfaced to the caller as a typed error. The pipeline never
//! converts a failure into a default or partially-valid structure.

use thiserror::Error;

/// Fatal knowledge-base build failures. Per-record problems (missing
/// structure, empty metadata) are logged and skipped, not raised.
#[derive(Debug, Error)]
pub enum IngestionError {
    #[error("no valid corpus entries remained after filtering")]
    EmptyCorpus,
    #[error("embedding provider returned {actual}-dim vector, expected {expected}")]
    InconsistentDimensions { expected: usize, actual: usize },
    #[error("embedding request failed: {0}")]
    Embedding(anyhow::Error),
    #[error("embedding provider returned {got} vectors for {want} texts")]
    EmbeddingCountMismatch { want: usize, got: usize },
}

/// Fatal to the current request: the snapshot cannot answer this query.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("knowledge base snapshot is empty")]
    EmptySnapshot,
    #[error("query embedding dimension {query} does not match snapshot dimension {snapshot}")]
    DimensionMismatch { query: usize, snapshot: usize },
    #[error("snapshot was built with embedding model `{snapshot}` but the configured model is `{embedder}`")]
    EmbeddingModelMismatch { snapshot: String, embedder: String },
    #[error("embedding request failed: {0}")]
    Embedding(anyhow::Error),
}

/// The query is missing metadata the prompt (and the embedding text) relies on.
#[derive(Debug, Error)]
pub enum CompositionError {
    #[error("query record is missing required field `{field}`")]
    MissingField { field: &'static str },
}

/// LLM invocation and validation failures.
///
/// The first four kinds are transient from the retry state machine's point
/// of view: each occurrence retries the same model, then advances down the
/// fallback chain. `RetriesExhausted` and `Cancelled` are terminal.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("response does not match the required schema: {0}")]
    InvalidResponseFormat(String),
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),
    #[error("rate limited by LLM provider")]
    RateLimited,
    #[error("LLM request timed out")]
    Timeout,
    #[error("all models and retries exhausted; last error: {last}")]
    RetriesExhausted { last: Box<GenerationError> },
    #[error("generation cancelled")]
    Cancelled,
}

impl GenerationError {
    /// Whether the retry state machine may try again after this failure.
    pub fn is_transient(&self) -> bool {
        !matches!(
            self,
            GenerationError::RetriesExhausted { .. } | GenerationError::Cancelled
        )
    }
}

/// Any request-fatal failure from the generation facade.
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),
    #[error(transparent)]
    Composition(#[from] CompositionError),
    #[error(transparent)]
    Generation(#[from] GenerationError),
}
