//! Knowledge base: offline ingestion of corpus records into an immutable,
//! persisted snapshot consumed read-only at query time.

pub mod builder;
pub mod snapshot;

pub use snapshot::{KbEntry, KnowledgeBaseSnapshot};
