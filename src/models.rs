use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Metadata describing one repository. Used both for corpus entries and for
/// the incoming query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryRecord {
    /// Unique key within a knowledge base.
    #[serde(alias = "github_url", alias = "github_repo")]
    pub repo_url: String,
    #[serde(default)]
    pub overview: String,
    #[serde(default)]
    pub business_domain: String,
    #[serde(default)]
    pub architecture: Architecture,
    #[serde(default)]
    pub tech_stack: TechStack,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Architecture {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub components: Vec<String>,
}

/// Tech stack as found in metadata documents. Corpus files use three shapes
/// interchangeably: a flat list, a category map, or a single string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TechStack {
    List(Vec<String>),
    /// Category name to technologies, e.g. `{"backend": ["Rust", "Axum"]}`.
    /// BTreeMap keeps category order stable across runs.
    Categorized(BTreeMap<String, CategoryTechs>),
    Single(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CategoryTechs {
    Many(Vec<String>),
    One(String),
}

impl Default for TechStack {
    fn default() -> Self {
        TechStack::List(Vec::new())
    }
}

impl TechStack {
    /// Flatten to an ordered list of technology names.
    pub fn flatten(&self) -> Vec<String> {
        match self {
            TechStack::List(items) => items.clone(),
            TechStack::Categorized(map) => map
                .values()
                .flat_map(|techs| match techs {
                    CategoryTechs::Many(items) => items.clone(),
                    CategoryTechs::One(item) => vec![item.clone()],
                })
                .collect(),
            TechStack::Single(item) => {
                if item.is_empty() {
                    Vec::new()
                } else {
                    vec![item.clone()]
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.flatten().is_empty()
    }
}

impl RepositoryRecord {
    /// Normalized text representation used for embedding. The builder and the
    /// retriever must use this exact rule, or build-time and query-time
    /// vectors are not comparable.
    pub fn corpus_text(&self) -> String {
        let mut parts = Vec::new();

        if !self.overview.is_empty() {
            parts.push(format!("Overview: {}", self.overview));
        }
        if !self.business_domain.is_empty() {
            parts.push(format!("Business Domain: {}", self.business_domain));
        }
        if !self.architecture.description.is_empty() {
            parts.push(format!("Architecture: {}", self.architecture.description));
        }
        let techs = self.tech_stack.flatten();
        if !techs.is_empty() {
            parts.push(format!("Tech Stack: {}", techs.join(", ")));
        }

        parts.join(" ")
    }
}

/// One section of a documentation outline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocSection {
    pub title: String,
    #[serde(default)]
    pub subsections: Vec<Subsection>,
}

/// A subsection is either a plain title or a nested section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Subsection {
    Title(String),
    Nested(DocSection),
}

/// An ordered documentation outline: the unit stored per corpus entry and
/// the unit produced by generation.
pub type DocumentationStructure = Vec<DocSection>;

/// A retrieval result: one corpus entry with its similarity to the query.
#[derive(Debug, Clone, Serialize)]
pub struct RankedMatch {
    pub record: RepositoryRecord,
    pub structure: DocumentationStructure,
    pub score: f32,
}
