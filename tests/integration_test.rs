//! Integration tests for the generation pipeline.
//!
//! These tests exercise ingestion, retrieval and the generation state
//! machine without a live LLM: the embedding and chat providers are
//! replaced by deterministic stubs behind the same traits.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use adocs::error::{GenerateError, GenerationError, IngestionError, RetrievalError};
use adocs::generator::{
    BackoffPolicy, DocStructureGenerator, GenerationRequest, StructureGenerator,
};
use adocs::kb::{builder, KbEntry, KnowledgeBaseSnapshot};
use adocs::llm::{ChatProvider, EmbeddingProvider};
use adocs::models::{
    Architecture, DocSection, DocumentationStructure, RepositoryRecord, Subsection, TechStack,
};
use adocs::retrieve::{rank_matches, retrieve};

// ─── Stub providers ──────────────────────────────────────

/// Deterministic embedder: maps each corpus text to a fixed vector.
struct StubEmbedder {
    model: String,
    vectors: HashMap<String, Vec<f32>>,
}

impl StubEmbedder {
    fn new(vectors: HashMap<String, Vec<f32>>) -> Self {
        Self {
            model: "stub-embed-v1".to_string(),
            vectors,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for StubEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        texts
            .iter()
            .map(|t| {
                self.vectors
                    .get(t)
                    .cloned()
                    .ok_or_else(|| anyhow::anyhow!("no stub vector for text: {t}"))
            })
            .collect()
    }
}

/// Chat provider that replays a scripted list of responses and records
/// which model each call used.
struct ScriptedChat {
    responses: Mutex<Vec<Result<String, GenerationError>>>,
    calls: AtomicUsize,
    models_seen: Mutex<Vec<String>>,
}

impl ScriptedChat {
    fn new(responses: Vec<Result<String, GenerationError>>) -> Self {
        Self {
            responses: Mutex::new(responses),
            calls: AtomicUsize::new(0),
            models_seen: Mutex::new(Vec::new()),
        }
    }

    /// Always returns the same response, forever.
    fn repeating(response: &str) -> Self {
        Self::new(vec![Ok(response.to_string())])
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatProvider for ScriptedChat {
    async fn complete(&self, _prompt: &str, model: &str) -> Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.models_seen.lock().push(model.to_string());

        let mut responses = self.responses.lock();
        if responses.len() > 1 {
            responses.remove(0)
        } else {
            responses[0].clone_response()
        }
    }
}

/// `GenerationError` is not `Clone`; re-create the scripted outcome.
trait CloneResponse {
    fn clone_response(&self) -> Result<String, GenerationError>;
}

impl CloneResponse for Result<String, GenerationError> {
    fn clone_response(&self) -> Result<String, GenerationError> {
        match self {
            Ok(s) => Ok(s.clone()),
            Err(GenerationError::RateLimited) => Err(GenerationError::RateLimited),
            Err(GenerationError::Timeout) => Err(GenerationError::Timeout),
            Err(GenerationError::ModelUnavailable(m)) => {
                Err(GenerationError::ModelUnavailable(m.clone()))
            }
            Err(GenerationError::InvalidResponseFormat(m)) => {
                Err(GenerationError::InvalidResponseFormat(m.clone()))
            }
            Err(other) => panic!("scripted response cannot be {other:?}"),
        }
    }
}

// ─── Fixtures ────────────────────────────────────────────

fn record(url: &str, overview: &str, domain: &str, techs: &[&str]) -> RepositoryRecord {
    RepositoryRecord {
        repo_url: url.to_string(),
        overview: overview.to_string(),
        business_domain: domain.to_string(),
        architecture: Architecture {
            description: format!("{overview} architecture"),
            components: vec!["Core".to_string()],
        },
        tech_stack: TechStack::List(techs.iter().map(|t| t.to_string()).collect()),
    }
}

fn structure(titles: &[&str]) -> DocumentationStructure {
    titles
        .iter()
        .map(|t| DocSection {
            title: t.to_string(),
            subsections: vec![Subsection::Title(format!("{t} Basics"))],
        })
        .collect()
}

/// Corpus of three repositories with hand-picked embeddings.
fn sample_corpus() -> (
    Vec<RepositoryRecord>,
    HashMap<String, DocumentationStructure>,
    StubEmbedder,
) {
    let a = record("https://github.com/x/alpha", "Payments API", "Fintech", &["Rust"]);
    let b = record("https://github.com/x/beta", "Game engine", "Gaming", &["C++"]);
    let c = record("https://github.com/x/gamma", "Billing service", "Fintech", &["Go"]);

    let mut structures = HashMap::new();
    structures.insert(a.repo_url.clone(), structure(&["Overview", "API Reference"]));
    structures.insert(b.repo_url.clone(), structure(&["Overview", "Rendering"]));
    structures.insert(c.repo_url.clone(), structure(&["Overview", "Invoicing"]));

    let mut vectors = HashMap::new();
    vectors.insert(a.corpus_text(), vec![1.0, 0.0, 0.0]);
    vectors.insert(b.corpus_text(), vec![0.0, 1.0, 0.0]);
    vectors.insert(c.corpus_text(), vec![0.8, 0.0, 0.6]);

    (vec![a, b, c], structures, StubEmbedder::new(vectors))
}

fn valid_response() -> &'static str {
    r#"[{"title": "Overview", "subsections": ["Goals"]}, {"title": "Setup", "subsections": []}]"#
}

// ─── Knowledge base builder ──────────────────────────────

#[tokio::test]
async fn test_build_joins_records_to_structures() {
    let (records, structures, embedder) = sample_corpus();
    let snapshot = builder::build(&embedder, records, &structures).await.unwrap();

    assert_eq!(snapshot.len(), 3);
    assert_eq!(snapshot.embedding_model, "stub-embed-v1");
    assert_eq!(snapshot.embedding_dim, 3);
    for entry in &snapshot.entries {
        assert_eq!(entry.corpus_text, entry.record.corpus_text());
        assert_eq!(entry.embedding.len(), 3);
    }
}

#[tokio::test]
async fn test_build_skips_invalid_entries_but_succeeds() {
    let (mut records, structures, _) = sample_corpus();
    // One record without an identifier, one with no matching structure
    records.push(record("", "Mystery repo", "Unknown", &["?"]));
    records.push(record("https://github.com/x/orphan", "Orphan", "Misc", &["Sh"]));

    // Re-stub so every remaining text embeds
    let mut vectors = HashMap::new();
    for r in &records {
        vectors.insert(r.corpus_text(), vec![1.0, 0.0, 0.0]);
    }
    let embedder = StubEmbedder::new(vectors);

    let snapshot = builder::build(&embedder, records, &structures).await.unwrap();
    let urls: Vec<&str> = snapshot
        .entries
        .iter()
        .map(|e| e.record.repo_url.as_str())
        .collect();
    assert_eq!(snapshot.len(), 3);
    assert!(!urls.contains(&""));
    assert!(!urls.contains(&"https://github.com/x/orphan"));
}

#[tokio::test]
async fn test_build_skips_duplicate_repo_urls() {
    let (mut records, structures, _) = sample_corpus();
    records.push(records[0].clone());

    let mut vectors = HashMap::new();
    for r in &records {
        vectors.insert(r.corpus_text(), vec![0.5, 0.5, 0.0]);
    }
    let embedder = StubEmbedder::new(vectors);

    let snapshot = builder::build(&embedder, records, &structures).await.unwrap();
    assert_eq!(snapshot.len(), 3);
}

#[tokio::test]
async fn test_build_fails_only_when_nothing_valid_remains() {
    let embedder = StubEmbedder::new(HashMap::new());
    let records = vec![record("https://github.com/x/alone", "Alone", "Misc", &["C"])];
    // No structures at all: the single record is skipped, corpus is empty
    let result = builder::build(&embedder, records, &HashMap::new()).await;
    assert!(matches!(result, Err(IngestionError::EmptyCorpus)));
}

#[tokio::test]
async fn test_snapshot_round_trips_through_disk() {
    let (records, structures, embedder) = sample_corpus();
    let built = builder::build(&embedder, records, &structures).await.unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kb.json");
    built.save(&path).unwrap();
    let loaded = KnowledgeBaseSnapshot::load(&path).unwrap();

    assert_eq!(loaded.embedding_model, built.embedding_model);
    assert_eq!(loaded.embedding_dim, built.embedding_dim);
    assert_eq!(loaded.len(), built.len());
    for (a, b) in loaded.entries.iter().zip(&built.entries) {
        assert_eq!(a.record, b.record);
        assert_eq!(a.structure, b.structure);
        assert_eq!(a.embedding.len(), b.embedding.len());
        for (x, y) in a.embedding.iter().zip(&b.embedding) {
            assert!((x - y).abs() < 1e-6);
        }
    }
}

#[test]
fn test_corpus_dir_loading_skips_malformed_files() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("alpha.json"),
        r#"{"repo_url": "https://github.com/x/alpha", "overview": "Payments"}"#,
    )
    .unwrap();
    std::fs::write(
        dir.path().join("beta.json"),
        r#"{"github_url": "https://github.com/x/beta", "overview": "Games"}"#,
    )
    .unwrap();
    // Missing any identifier field: parse fails, file is skipped
    std::fs::write(dir.path().join("broken.json"), r#"{"overview": "Nameless"}"#).unwrap();
    std::fs::write(dir.path().join("garbage.json"), "not json at all").unwrap();
    std::fs::write(dir.path().join("ignored.txt"), "not a corpus file").unwrap();

    let records = builder::load_corpus_dir(dir.path()).unwrap();
    let urls: Vec<&str> = records.iter().map(|r| r.repo_url.as_str()).collect();
    assert_eq!(
        urls,
        vec!["https://github.com/x/alpha", "https://github.com/x/beta"]
    );
}

#[test]
fn test_structures_file_accepts_export_field_names() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("structures.json");
    std::fs::write(
        &path,
        r#"[
            {"github_url": "https://github.com/x/alpha",
             "documentation_structure": [{"title": "Overview", "subsections": []}]},
            {"repo_url": "https://github.com/x/beta",
             "structure": [{"title": "Guide", "subsections": ["Install"]}]},
            {"unrelated": true}
        ]"#,
    )
    .unwrap();

    let mapping = builder::load_structures(&path).unwrap();
    assert_eq!(mapping.len(), 2);
    assert_eq!(mapping["https://github.com/x/alpha"][0].title, "Overview");
    assert_eq!(mapping["https://github.com/x/beta"][0].title, "Guide");
}

// ─── Retrieval ───────────────────────────────────────────

fn snapshot_with_embeddings(embeddings: &[(&str, Vec<f32>)]) -> KnowledgeBaseSnapshot {
    let entries: Vec<KbEntry> = embeddings
        .iter()
        .map(|(url, embedding)| {
            let r = record(url, "overview", "domain", &["tech"]);
            KbEntry {
                corpus_text: r.corpus_text(),
                record: r,
                structure: structure(&["Overview"]),
                embedding: embedding.clone(),
            }
        })
        .collect();
    KnowledgeBaseSnapshot {
        embedding_model: "stub-embed-v1".to_string(),
        embedding_dim: entries[0].embedding.len(),
        built_at: chrono::Utc::now(),
        entries,
    }
}

#[test]
fn test_rank_matches_concrete_scores() {
    // Unit vectors whose first component equals the target cosine to [1, 0]
    let snapshot = snapshot_with_embeddings(&[
        ("https://a", vec![0.92, (1.0f32 - 0.92 * 0.92).sqrt()]),
        ("https://b", vec![0.41, (1.0f32 - 0.41 * 0.41).sqrt()]),
        ("https://c", vec![0.77, (1.0f32 - 0.77 * 0.77).sqrt()]),
    ]);

    let matches = rank_matches(&[1.0, 0.0], &snapshot, 2).unwrap();
    assert_eq!(matches.len(), 2);
    assert_eq!(matches[0].record.repo_url, "https://a");
    assert_eq!(matches[1].record.repo_url, "https://c");
    assert!((matches[0].score - 0.92).abs() < 1e-3);
    assert!((matches[1].score - 0.77).abs() < 1e-3);
}

#[test]
fn test_rank_matches_is_deterministic() {
    let snapshot = snapshot_with_embeddings(&[
        ("https://a", vec![0.9, 0.1]),
        ("https://b", vec![0.4, 0.6]),
        ("https://c", vec![0.7, 0.3]),
    ]);
    let first = rank_matches(&[1.0, 0.0], &snapshot, 3).unwrap();
    let second = rank_matches(&[1.0, 0.0], &snapshot, 3).unwrap();
    let urls = |ms: &[adocs::models::RankedMatch]| {
        ms.iter().map(|m| m.record.repo_url.clone()).collect::<Vec<_>>()
    };
    assert_eq!(urls(&first), urls(&second));
    for (a, b) in first.iter().zip(&second) {
        assert_eq!(a.score, b.score);
    }
}

#[test]
fn test_rank_matches_cardinality_and_ordering() {
    let snapshot = snapshot_with_embeddings(&[
        ("https://a", vec![0.2, 0.8]),
        ("https://b", vec![0.9, 0.1]),
        ("https://c", vec![0.5, 0.5]),
    ]);

    // k larger than n returns exactly n
    let all = rank_matches(&[1.0, 0.0], &snapshot, 10).unwrap();
    assert_eq!(all.len(), 3);
    for pair in all.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }

    let top = rank_matches(&[1.0, 0.0], &snapshot, 1).unwrap();
    assert_eq!(top.len(), 1);
    assert_eq!(top[0].record.repo_url, "https://b");
}

#[test]
fn test_rank_matches_ties_keep_snapshot_order() {
    let snapshot = snapshot_with_embeddings(&[
        ("https://first", vec![1.0, 0.0]),
        ("https://second", vec![2.0, 0.0]), // same direction, same cosine
        ("https://third", vec![0.0, 1.0]),
    ]);
    let matches = rank_matches(&[1.0, 0.0], &snapshot, 2).unwrap();
    assert_eq!(matches[0].record.repo_url, "https://first");
    assert_eq!(matches[1].record.repo_url, "https://second");
}

#[test]
fn test_rank_matches_dimension_mismatch_is_fatal() {
    let snapshot = snapshot_with_embeddings(&[("https://a", vec![1.0, 0.0])]);
    let result = rank_matches(&[1.0, 0.0, 0.0], &snapshot, 1);
    assert!(matches!(
        result,
        Err(RetrievalError::DimensionMismatch {
            query: 3,
            snapshot: 2
        })
    ));
}

#[tokio::test]
async fn test_retrieve_empty_snapshot_is_fatal() {
    let snapshot = KnowledgeBaseSnapshot {
        embedding_model: "stub-embed-v1".to_string(),
        embedding_dim: 2,
        built_at: chrono::Utc::now(),
        entries: vec![],
    };
    let embedder = StubEmbedder::new(HashMap::new());
    let query = record("https://q", "Query", "Domain", &["Rust"]);
    let result = retrieve(&embedder, &query, &snapshot, 3).await;
    assert!(matches!(result, Err(RetrievalError::EmptySnapshot)));
}

// ─── Structure generator ─────────────────────────────────

#[tokio::test]
async fn test_retry_bound_across_fallback_chain() {
    let chat = Arc::new(ScriptedChat::repeating("this is not json"));
    let generator = StructureGenerator::new(chat.clone(), BackoffPolicy::none());
    let models = vec!["model-a".to_string(), "model-b".to_string()];
    let cancel = CancellationToken::new();

    let err = generator
        .generate("prompt", &models, 2, &cancel)
        .await
        .unwrap_err();

    // 1 attempt + 2 retries per model, across both models
    assert_eq!(chat.call_count(), 6);
    let seen = chat.models_seen.lock().clone();
    assert_eq!(
        seen,
        ["model-a", "model-a", "model-a", "model-b", "model-b", "model-b"]
    );
    match err {
        GenerationError::RetriesExhausted { last } => {
            assert!(matches!(*last, GenerationError::InvalidResponseFormat(_)));
        }
        other => panic!("expected RetriesExhausted, got {other:?}"),
    }
}

#[tokio::test]
async fn test_schema_invalid_response_is_retried_not_accepted() {
    // First response parses but fails the schema; the retry succeeds
    let chat = Arc::new(ScriptedChat::new(vec![
        Ok(r#"{"sections": []}"#.to_string()),
        Ok(valid_response().to_string()),
    ]));
    let generator = StructureGenerator::new(chat.clone(), BackoffPolicy::none());
    let cancel = CancellationToken::new();

    let sections = generator
        .generate("prompt", &["model-a".to_string()], 2, &cancel)
        .await
        .unwrap();

    assert_eq!(chat.call_count(), 2);
    assert_eq!(sections.len(), 2);
    assert_eq!(sections[0].title, "Overview");
}

#[tokio::test]
async fn test_transient_provider_errors_feed_the_same_retry_path() {
    let chat = Arc::new(ScriptedChat::new(vec![
        Err(GenerationError::RateLimited),
        Err(GenerationError::Timeout),
        Ok(valid_response().to_string()),
    ]));
    let generator = StructureGenerator::new(chat.clone(), BackoffPolicy::none());
    let cancel = CancellationToken::new();

    let sections = generator
        .generate("prompt", &["model-a".to_string()], 2, &cancel)
        .await
        .unwrap();

    assert_eq!(chat.call_count(), 3);
    assert!(!sections.is_empty());
}

#[tokio::test]
async fn test_fallback_model_rescues_generation() {
    // model-a always rate limited; model-b answers correctly
    let chat = Arc::new(ScriptedChat::new(vec![
        Err(GenerationError::RateLimited),
        Err(GenerationError::RateLimited),
        Ok(valid_response().to_string()),
    ]));
    let generator = StructureGenerator::new(chat.clone(), BackoffPolicy::none());
    let models = vec!["model-a".to_string(), "model-b".to_string()];
    let cancel = CancellationToken::new();

    let sections = generator.generate("prompt", &models, 1, &cancel).await.unwrap();

    assert_eq!(chat.call_count(), 3);
    let seen = chat.models_seen.lock().clone();
    assert_eq!(seen[2], "model-b");
    assert_eq!(sections[0].title, "Overview");
}

#[tokio::test]
async fn test_cancelled_token_aborts_without_calling_provider() {
    let chat = Arc::new(ScriptedChat::repeating(valid_response()));
    let generator = StructureGenerator::new(chat.clone(), BackoffPolicy::none());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = generator
        .generate("prompt", &["model-a".to_string()], 2, &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, GenerationError::Cancelled));
    assert_eq!(chat.call_count(), 0);
}

// ─── Facade ──────────────────────────────────────────────

#[tokio::test]
async fn test_facade_end_to_end() {
    let (records, structures, embedder) = sample_corpus();
    let snapshot = builder::build(&embedder, records, &structures).await.unwrap();

    // Query embeds near alpha and gamma (the fintech pair)
    let query = record("https://github.com/x/new", "Invoice API", "Fintech", &["Rust"]);
    let mut vectors = HashMap::new();
    vectors.insert(query.corpus_text(), vec![0.9, 0.0, 0.44]);
    let query_embedder = {
        let (recs, _, _) = sample_corpus();
        for r in recs {
            vectors.insert(r.corpus_text(), vec![0.0; 3]);
        }
        StubEmbedder::new(vectors)
    };

    let chat = Arc::new(ScriptedChat::repeating(valid_response()));
    let generator = DocStructureGenerator::new(
        Arc::new(query_embedder),
        chat.clone(),
        BackoffPolicy::none(),
    );

    let request = GenerationRequest {
        query,
        k: 2,
        model_fallback_chain: vec!["model-a".to_string()],
        max_retries: 1,
    };
    let sections = generator.generate(&request, &snapshot).await.unwrap();

    assert_eq!(chat.call_count(), 1);
    assert_eq!(sections.len(), 2);
    assert_eq!(sections[0].title, "Overview");
    assert_eq!(sections[1].title, "Setup");
}

#[tokio::test]
async fn test_facade_rejects_snapshot_from_different_embedding_model() {
    let (records, structures, embedder) = sample_corpus();
    let mut snapshot = builder::build(&embedder, records, &structures).await.unwrap();
    snapshot.embedding_model = "some-other-model".to_string();

    let query = record("https://github.com/x/new", "Invoice API", "Fintech", &["Rust"]);
    let generator = DocStructureGenerator::new(
        Arc::new(StubEmbedder::new(HashMap::new())),
        Arc::new(ScriptedChat::repeating(valid_response())),
        BackoffPolicy::none(),
    );

    let request = GenerationRequest {
        query,
        k: 2,
        model_fallback_chain: vec!["model-a".to_string()],
        max_retries: 0,
    };
    let err = generator.generate(&request, &snapshot).await.unwrap_err();
    assert!(matches!(
        err,
        GenerateError::Retrieval(RetrievalError::EmbeddingModelMismatch { .. })
    ));
}

#[tokio::test]
async fn test_facade_missing_metadata_is_composition_error() {
    let (records, structures, embedder) = sample_corpus();
    let snapshot = builder::build(&embedder, records, &structures).await.unwrap();

    let mut query = record("https://github.com/x/new", "Invoice API", "", &["Rust"]);
    query.business_domain.clear();
    let mut vectors = HashMap::new();
    vectors.insert(query.corpus_text(), vec![1.0, 0.0, 0.0]);

    let generator = DocStructureGenerator::new(
        Arc::new(StubEmbedder::new(vectors)),
        Arc::new(ScriptedChat::repeating(valid_response())),
        BackoffPolicy::none(),
    );

    let request = GenerationRequest {
        query,
        k: 2,
        model_fallback_chain: vec!["model-a".to_string()],
        max_retries: 0,
    };
    let err = generator.generate(&request, &snapshot).await.unwrap_err();
    assert!(matches!(err, GenerateError::Composition(_)));
}
