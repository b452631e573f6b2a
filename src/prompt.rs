//! Prompt composition: renders the query metadata and the retrieved
//! exemplars into a single instruction with an explicit output schema.
//!
//! Composition is deterministic for identical inputs; reproducing a
//! generation only requires the same query, matches, and LLM response.

use crate::error::CompositionError;
use crate::models::{RankedMatch, RepositoryRecord};

/// Render the generation prompt. Fails if the query is missing any of the
/// metadata fields the normalized embedding text is built from.
pub fn compose(
    query: &RepositoryRecord,
    matches: &[RankedMatch],
) -> Result<String, CompositionError> {
    check_required_fields(query)?;

    let query_json =
        serde_json::to_string_pretty(query).unwrap_or_else(|_| "{}".to_string());

    let mut examples = String::new();
    for (i, m) in matches.iter().enumerate() {
        let structure_json =
            serde_json::to_string_pretty(&m.structure).unwrap_or_else(|_| "[]".to_string());
        examples.push_str(&format!(
            "### Example {}: Similar Repo ({})\n\
             #### Similarity Score: {:.3}\n\
             #### Documentation Structure:\n```json\n{}\n```\n\n",
            i + 1,
            m.record.repo_url,
            m.score,
            structure_json
        ));
    }

    Ok(format!(
        "As a principal engineer, your task is to create the ideal documentation structure \
         for a new software project.\n\
         \n\
         Analyze the provided metadata for the new repository and use the provided examples \
         from similar projects as a reference to ensure high quality and relevance.\n\
         \n\
         The output MUST be a single, valid JSON array and nothing else. Do not add any \
         explanatory text before or after the JSON.\n\
         \n\
         ### New Repository Metadata:\n\
         ```json\n{query_json}\n```\n\
         \n\
         ---\n\
         \n\
         ### High-Quality Documentation Examples from Similar Repositories:\n\
         {examples}\
         ---\n\
         \n\
         ### Your Task:\n\
         Based on all the information above, generate the documentation structure JSON for \
         the new repository.\n\
         \n\
         The documentation structure should be comprehensive and include all necessary \
         sections for the project type, technology stack, and business domain. Consider the \
         patterns from the similar repositories but adapt them to the specific needs of this \
         new repository.\n\
         \n\
         ### CRITICAL: Required JSON Format\n\
         The response MUST be a JSON array following this exact structure:\n\
         ```json\n\
         [\n\
         \x20 {{\n\
         \x20   \"title\": \"Section Title\",\n\
         \x20   \"subsections\": [\"Subsection Title\", \"Another Subsection\"]\n\
         \x20 }}\n\
         ]\n\
         ```\n\
         \n\
         IMPORTANT FORMAT RULES:\n\
         1. The top level MUST be an array of section objects\n\
         2. Each section MUST have a non-empty string \"title\"\n\
         3. Each section MUST have a \"subsections\" array of non-empty strings (it may be empty)\n\
         4. Section titles MUST be unique\n\
         5. Do NOT add keys other than \"title\" and \"subsections\"\n\
         \n\
         Return only the JSON array, no additional text.\n"
    ))
}

fn check_required_fields(query: &RepositoryRecord) -> Result<(), CompositionError> {
    if query.overview.is_empty() {
        return Err(CompositionError::MissingField { field: "overview" });
    }
    if query.business_domain.is_empty() {
        return Err(CompositionError::MissingField {
            field: "business_domain",
        });
    }
    if query.architecture.description.is_empty() {
        return Err(CompositionError::MissingField {
            field: "architecture.description",
        });
    }
    if query.tech_stack.is_empty() {
        return Err(CompositionError::MissingField { field: "tech_stack" });
    }
    Ok(())
}
