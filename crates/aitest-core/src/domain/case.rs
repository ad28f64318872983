//! Test case definitions as loaded from the cases directory.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single test case: the user content sent to the model plus template arguments.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CaseDefinition {
    pub id: String,

    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// User message content.
    pub content: String,

    /// Values substituted into the prompt template.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub args: BTreeMap<String, Value>,

    /// Legacy single-argument form used by older `translate` case files.
    #[serde(
        default,
        rename = "targetLanguage",
        skip_serializing_if = "Option::is_none"
    )]
    pub target_language: Option<String>,
}

impl CaseDefinition {
    pub fn new(id: impl Into<String>, name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            content: content.into(),
            args: BTreeMap::new(),
            target_language: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }

    /// Arguments as they should be reported.
    ///
    /// Cases without `args` but with the legacy `targetLanguage` field report
    /// it as `language`.
    pub fn effective_args(&self) -> BTreeMap<String, Value> {
        if !self.args.is_empty() {
            return self.args.clone();
        }
        match &self.target_language {
            Some(lang) => BTreeMap::from([("language".to_string(), Value::String(lang.clone()))]),
            None => BTreeMap::new(),
        }
    }
}

/// On-disk layout of one case file: `{ "caseName": <prompt>, "cases": [...] }`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaseFile {
    /// Name of the prompt these cases belong to.
    #[serde(rename = "caseName", default)]
    pub case_name: String,

    #[serde(default)]
    pub cases: Vec<CaseDefinition>,
}
