//! Prompt configurations as loaded from the prompts file.

use serde::{Deserialize, Serialize};

/// One named prompt template bound to a vendor and model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PromptConfig {
    /// Unique name within a run; also the key used to find its cases.
    pub name: String,

    /// Provider identifier (e.g. `openai`, `anthropic`), matched case-insensitively.
    pub vendor: String,

    /// Provider model identifier.
    pub model: String,

    /// System prompt template containing `{{param}}` placeholders.
    #[serde(rename = "prompt")]
    pub template: String,
}

impl PromptConfig {
    pub fn new(
        name: impl Into<String>,
        vendor: impl Into<String>,
        model: impl Into<String>,
        template: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            vendor: vendor.into(),
            model: model.into(),
            template: template.into(),
        }
    }
}

/// On-disk layout of the prompts file: `{ "prompts": [...] }`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptFile {
    #[serde(default)]
    pub prompts: Vec<PromptConfig>,
}
