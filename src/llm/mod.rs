//! Provider clients for the two outbound calls the pipeline makes:
//! text embedding and chat completion. Both dispatch on the configured
//! provider ("ollama" or "openai"-compatible) and are hidden behind traits
//! so the pipeline can be exercised without a live endpoint.

pub mod chat;
pub mod embeddings;

pub use chat::{ChatProvider, HttpChatProvider};
pub use embeddings::{EmbeddingProvider, HttpEmbedder};
