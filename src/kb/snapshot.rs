use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{DocumentationStructure, RepositoryRecord};

/// One corpus entry: a repository, its known-good documentation structure,
/// and the embedding of its normalized metadata text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KbEntry {
    pub record: RepositoryRecord,
    pub structure: DocumentationStructure,
    pub embedding: Vec<f32>,
    /// The exact text the embedding was computed from. Kept for debugging.
    pub corpus_text: String,
}

/// Immutable knowledge base. Built once by [`crate::kb::builder`], then
/// shared read-only; a corpus update produces a new snapshot rather than
/// mutating this one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeBaseSnapshot {
    /// Embedding model the vectors were computed with. Queries must be
    /// embedded with the same model or similarity scores are meaningless.
    pub embedding_model: String,
    pub embedding_dim: usize,
    pub built_at: DateTime<Utc>,
    pub entries: Vec<KbEntry>,
}

impl KnowledgeBaseSnapshot {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Load a snapshot from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read snapshot from {}", path.display()))?;
        let snapshot: Self = serde_json::from_str(&data)
            .with_context(|| format!("Failed to parse snapshot at {}", path.display()))?;
        Ok(snapshot)
    }

    /// Persist atomically: write to a temp path in the same directory, then
    /// rename over the target so readers never observe a half-written file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create snapshot directory {}", parent.display())
                })?;
            }
        }

        let data = serde_json::to_string(self).context("Failed to serialize snapshot")?;
        let tmp_path = path.with_extension("tmp");
        std::fs::write(&tmp_path, &data)
            .with_context(|| format!("Failed to write snapshot to {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("Failed to publish snapshot at {}", path.display()))?;
        Ok(())
    }

    /// Summary counts over the corpus, logged after loading.
    pub fn stats(&self) -> SnapshotStats {
        let mut technologies = BTreeSet::new();
        let mut domains = BTreeSet::new();
        for entry in &self.entries {
            technologies.extend(entry.record.tech_stack.flatten());
            if !entry.record.business_domain.is_empty() {
                domains.insert(entry.record.business_domain.clone());
            }
        }
        SnapshotStats {
            total_entries: self.entries.len(),
            unique_technologies: technologies.len(),
            unique_business_domains: domains.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotStats {
    pub total_entries: usize,
    pub unique_technologies: usize,
    pub unique_business_domains: usize,
}
