use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path of the persisted knowledge base snapshot
    pub snapshot_path: PathBuf,
    /// LLM provider configuration
    pub llm: LlmConfig,
    /// Generation defaults (overridable per request)
    pub generation: GenerationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// "ollama" or "openai"
    pub provider: String,
    /// Base URL for the LLM API
    pub base_url: String,
    /// Model name for embeddings
    pub embedding_model: String,
    /// API key (only needed for cloud providers)
    pub api_key: Option<String>,
    /// Per-request timeout in seconds for embedding and chat calls
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Number of similar repositories retrieved as exemplars
    pub top_k: usize,
    /// Models tried in order; each gets the full retry budget before the
    /// next is attempted
    pub model_fallback_chain: Vec<String>,
    /// Retries per model after the initial attempt
    pub max_retries: u32,
    /// First backoff delay; doubles per retry up to `max_backoff_ms`
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            snapshot_path: PathBuf::from("./data/knowledge_base.json"),
            llm: LlmConfig::default(),
            generation: GenerationConfig::default(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            base_url: "http://localhost:11434".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            api_key: None,
            request_timeout_secs: 120,
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            model_fallback_chain: vec!["llama3.2".to_string()],
            max_retries: 2,
            initial_backoff_ms: 500,
            max_backoff_ms: 10_000,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("ADOCS_SNAPSHOT_PATH") {
            config.snapshot_path = PathBuf::from(path);
        }
        if let Ok(provider) = std::env::var("LLM_PROVIDER") {
            config.llm.provider = provider;
        }
        if let Ok(url) = std::env::var("LLM_BASE_URL") {
            config.llm.base_url = url;
        }
        if let Ok(model) = std::env::var("LLM_EMBEDDING_MODEL") {
            config.llm.embedding_model = model;
        }
        if let Ok(key) = std::env::var("LLM_API_KEY") {
            config.llm.api_key = Some(key);
        }
        if let Ok(val) = std::env::var("ADOCS_REQUEST_TIMEOUT_SECS") {
            if let Ok(v) = val.parse() {
                config.llm.request_timeout_secs = v;
            }
        }
        if let Ok(models) = std::env::var("LLM_CHAT_MODELS") {
            let chain: Vec<String> = models
                .split(',')
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty())
                .collect();
            if !chain.is_empty() {
                config.generation.model_fallback_chain = chain;
            }
        }
        if let Ok(val) = std::env::var("ADOCS_TOP_K") {
            if let Ok(v) = val.parse() {
                config.generation.top_k = v;
            }
        }
        if let Ok(val) = std::env::var("ADOCS_MAX_RETRIES") {
            if let Ok(v) = val.parse() {
                config.generation.max_retries = v;
            }
        }
        if let Ok(val) = std::env::var("ADOCS_INITIAL_BACKOFF_MS") {
            if let Ok(v) = val.parse() {
                config.generation.initial_backoff_ms = v;
            }
        }

        config
    }
}
