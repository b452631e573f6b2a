//! # adocs
//!
//! Generates a documentation outline for a new software repository using
//! retrieval-augmented generation (RAG): the repository's metadata is
//! embedded, the most similar repositories are retrieved from a prebuilt
//! knowledge base, and their known-good documentation structures are fed to
//! an LLM as worked examples to synthesize a tailored outline.
//!
//! ## Pipeline
//!
//! ```text
//!   query RepositoryRecord
//!           │
//!           ▼
//!   ┌────────────────┐     ┌───────────────────────┐
//!   │ embed metadata │ ──► │ cosine top-k over the │
//!   │ (same rule as  │     │ KnowledgeBaseSnapshot │
//!   │  the builder)  │     └──────────┬────────────┘
//!   └────────────────┘                │ RankedMatch[]
//!                                     ▼
//!                          ┌───────────────────────┐
//!                          │ compose prompt with   │
//!                          │ exemplar structures   │
//!                          └──────────┬────────────┘
//!                                     ▼
//!                          ┌───────────────────────┐
//!                          │ LLM call with model   │
//!                          │ fallback + retries    │
//!                          │ + schema validation   │
//!                          └──────────┬────────────┘
//!                                     ▼
//!                        validated DocumentationStructure
//! ```
//!
//! The knowledge base is built offline by [`kb::builder`] and persisted as a
//! single snapshot artifact; at request time it is loaded once and shared
//! read-only across concurrent generation calls.
//!
//! ## Module Overview
//!
//! - [`config`] - Environment-based configuration for providers and generation defaults
//! - [`models`] - Shared data types: `RepositoryRecord`, `DocSection`, `RankedMatch`
//! - [`error`] - Typed error taxonomy for ingestion, retrieval, composition and generation
//! - [`kb`] - Knowledge base builder and persisted snapshot format
//! - [`retrieve`] - Cosine-similarity top-k retrieval over a snapshot
//! - [`prompt`] - Deterministic prompt composition from query + exemplars
//! - [`generator`] - LLM invocation with model fallback, retries and schema validation
//! - [`llm`] - Embedding and chat provider clients (Ollama or OpenAI-compatible APIs)
//! - [`state`] - Process-wide state holding the current snapshot, swapped on rebuild

pub mod config;
pub mod error;
pub mod generator;
pub mod kb;
pub mod llm;
pub mod models;
pub mod prompt;
pub mod retrieve;
pub mod state;
