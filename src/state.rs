use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::Config;
use crate::kb::KnowledgeBaseSnapshot;

/// Shared application state.
///
/// The snapshot is held as an `Arc` behind a lock: readers clone the `Arc`
/// once per request and keep working against that snapshot even if a
/// rebuild swaps in a new one mid-flight. The snapshot itself is never
/// mutated.
pub struct AppState {
    pub config: Config,
    pub http_client: reqwest::Client,
    snapshot: RwLock<Arc<KnowledgeBaseSnapshot>>,
}

impl AppState {
    pub fn new(config: Config, snapshot: KnowledgeBaseSnapshot) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .timeout(std::time::Duration::from_secs(
                config.llm.request_timeout_secs,
            ))
            .build()?;

        Ok(Self {
            config,
            http_client,
            snapshot: RwLock::new(Arc::new(snapshot)),
        })
    }

    /// The current snapshot. Hold the returned `Arc` for the duration of a
    /// request; do not re-fetch mid-request.
    pub fn snapshot(&self) -> Arc<KnowledgeBaseSnapshot> {
        self.snapshot.read().clone()
    }

    /// Atomically publish a rebuilt snapshot. In-flight requests keep the
    /// `Arc` they already cloned.
    pub fn swap_snapshot(&self, snapshot: KnowledgeBaseSnapshot) {
        *self.snapshot.write() = Arc::new(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn snapshot(model: &str) -> KnowledgeBaseSnapshot {
        KnowledgeBaseSnapshot {
            embedding_model: model.to_string(),
            embedding_dim: 2,
            built_at: Utc::now(),
            entries: vec![],
        }
    }

    #[test]
    fn test_swap_does_not_affect_held_snapshot() {
        let state = AppState::new(Config::default(), snapshot("v1")).unwrap();
        let held = state.snapshot();

        state.swap_snapshot(snapshot("v2"));

        assert_eq!(held.embedding_model, "v1");
        assert_eq!(state.snapshot().embedding_model, "v2");
    }
}
