use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::error::GenerationError;

/// Chat completion seam. Failures are pre-classified into the retry
/// taxonomy so the generator's state machine never inspects provider
/// internals.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn complete(&self, prompt: &str, model: &str) -> Result<String, GenerationError>;
}

/// Chat client for Ollama or OpenAI-compatible APIs.
pub struct HttpChatProvider {
    client: reqwest::Client,
    config: LlmConfig,
}

impl HttpChatProvider {
    pub fn new(client: reqwest::Client, config: LlmConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl ChatProvider for HttpChatProvider {
    async fn complete(&self, prompt: &str, model: &str) -> Result<String, GenerationError> {
        match self.config.provider.as_str() {
            "ollama" => call_ollama(&self.client, &self.config, prompt, model).await,
            "openai" => call_openai(&self.client, &self.config, prompt, model).await,
            other => Err(GenerationError::ModelUnavailable(format!(
                "unknown LLM provider: {other}"
            ))),
        }
    }
}

/// Map a transport-level failure into the retry taxonomy.
fn classify_request_error(err: reqwest::Error) -> GenerationError {
    if err.is_timeout() {
        GenerationError::Timeout
    } else {
        GenerationError::ModelUnavailable(err.to_string())
    }
}

/// Map a non-success HTTP status into the retry taxonomy.
fn classify_status(status: reqwest::StatusCode, body: String) -> GenerationError {
    match status.as_u16() {
        429 => GenerationError::RateLimited,
        408 | 504 => GenerationError::Timeout,
        _ => GenerationError::ModelUnavailable(format!("{status}: {body}")),
    }
}

// ─── Ollama ──────────────────────────────────────────────

#[derive(Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<Message>,
    stream: bool,
}

#[derive(Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: Message,
}

async fn call_ollama(
    client: &reqwest::Client,
    config: &LlmConfig,
    prompt: &str,
    model: &str,
) -> Result<String, GenerationError> {
    let url = format!("{}/api/chat", config.base_url);

    let req = OllamaChatRequest {
        model: model.to_string(),
        messages: vec![Message {
            role: "user".to_string(),
            content: prompt.to_string(),
        }],
        stream: false,
    };

    let resp = client
        .post(&url)
        .json(&req)
        .send()
        .await
        .map_err(classify_request_error)?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        return Err(classify_status(status, body));
    }

    let body: OllamaChatResponse = resp
        .json()
        .await
        .map_err(|e| GenerationError::InvalidResponseFormat(e.to_string()))?;
    Ok(body.message.content)
}

// ─── OpenAI-compatible ───────────────────────────────────

#[derive(Serialize)]
struct OpenAiChatRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct OpenAiMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct OpenAiChatResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
}

#[derive(Deserialize)]
struct OpenAiResponseMessage {
    content: String,
}

async fn call_openai(
    client: &reqwest::Client,
    config: &LlmConfig,
    prompt: &str,
    model: &str,
) -> Result<String, GenerationError> {
    let url = format!("{}/v1/chat/completions", config.base_url);
    let api_key = config.api_key.as_deref().unwrap_or_default();

    // Low temperature: the outline should be driven by the exemplars, not
    // sampling variety.
    let req = OpenAiChatRequest {
        model: model.to_string(),
        messages: vec![OpenAiMessage {
            role: "user".to_string(),
            content: prompt.to_string(),
        }],
        temperature: 0.1,
        max_tokens: 4000,
    };

    let resp = client
        .post(&url)
        .header("Authorization", format!("Bearer {api_key}"))
        .json(&req)
        .send()
        .await
        .map_err(classify_request_error)?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        return Err(classify_status(status, body));
    }

    let body: OpenAiChatResponse = resp
        .json()
        .await
        .map_err(|e| GenerationError::InvalidResponseFormat(e.to_string()))?;

    body.choices
        .into_iter()
        .next()
        .map(|c| c.message.content)
        .filter(|content| !content.is_empty())
        .ok_or_else(|| {
            GenerationError::InvalidResponseFormat("empty completion from provider".to_string())
        })
}
