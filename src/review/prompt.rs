#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// An assignment problem and the attachment filename it applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptDefinition {
    /// Problem statement sent to the reviewer.
    pub problem:  String,
    /// Expected code placeholder, not used for matching.
    #[serde(default)]
    pub code:     String,
    /// Original filename this problem applies to, eg. `pa6p1.c`.
    pub filename: String,
}

impl PromptDefinition {
    /// Creates a definition with an empty code placeholder.
    pub fn new(problem: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            problem:  problem.into(),
            code:     String::new(),
            filename: filename.into(),
        }
    }
}

/// Finds the definition whose filename equals `filename`, ignoring case.
///
/// The whole name is compared, extension included; the first match wins.
pub fn match_prompt<'a>(
    filename: &str,
    definitions: &'a [PromptDefinition],
) -> Option<&'a PromptDefinition> {
    let wanted = filename.to_lowercase();
    definitions
        .iter()
        .find(|definition| definition.filename.to_lowercase() == wanted)
}

/// Loads prompt definitions from a JSON array.
pub fn load_prompts(path: &Path) -> Result<Vec<PromptDefinition>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Could not read prompt definitions from {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("Could not parse prompt definitions in {}", path.display()))
}
