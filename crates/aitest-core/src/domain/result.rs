//! Per-case results and the run-level result tree.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::work_item::WorkKey;

/// Token usage reported by a provider, keyed by the provider's own field names.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Usage(BTreeMap<String, u64>);

impl Usage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: u64) -> Self {
        self.0.insert(key.into(), value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: u64) {
        self.0.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<u64> {
        self.0.get(key).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Total tokens for this call.
    ///
    /// Uses `total_tokens` when the provider reports it, otherwise
    /// `input_tokens + output_tokens`; zero when neither is present.
    pub fn total_tokens(&self) -> u64 {
        if let Some(total) = self.get("total_tokens") {
            return total;
        }
        match (self.get("input_tokens"), self.get("output_tokens")) {
            (Some(input), Some(output)) => input + output,
            _ => 0,
        }
    }
}

impl<K: Into<String>> FromIterator<(K, u64)> for Usage {
    fn from_iter<I: IntoIterator<Item = (K, u64)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// What a single case produced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CaseOutcome {
    Success { output: String, usage: Usage },
    Failed { error: String },
}

/// Result of executing one work item. Created exactly once per item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CaseResult {
    pub round: u32,
    pub prompt_name: String,
    pub case_index: usize,
    pub case_id: String,
    pub case_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_description: Option<String>,
    pub case_content: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub case_args: BTreeMap<String, Value>,
    pub vendor: String,
    pub model: String,
    /// Template before substitution.
    pub prompt_template: String,
    /// Template after substitution, as sent to the provider.
    pub resolved_prompt: String,
    pub elapsed_secs: f64,
    #[serde(flatten)]
    pub outcome: CaseOutcome,
}

impl CaseResult {
    pub fn key(&self) -> WorkKey {
        WorkKey::new(self.round, &self.prompt_name, self.case_index)
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, CaseOutcome::Success { .. })
    }

    /// Output text, or the error marker for failed cases.
    pub fn display_output(&self) -> String {
        match &self.outcome {
            CaseOutcome::Success { output, .. } => output.clone(),
            CaseOutcome::Failed { error } => format!("error: {error}"),
        }
    }

    pub fn usage(&self) -> Option<&Usage> {
        match &self.outcome {
            CaseOutcome::Success { usage, .. } => Some(usage),
            CaseOutcome::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            CaseOutcome::Success { .. } => None,
            CaseOutcome::Failed { error } => Some(error),
        }
    }
}

/// Results of one round, keyed by prompt name.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RoundResults {
    pub prompts: BTreeMap<String, Vec<CaseResult>>,
}

impl RoundResults {
    pub fn case_count(&self) -> usize {
        self.prompts.values().map(Vec::len).sum()
    }
}

/// The run-level result tree: round → prompt → ordered case results.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RunResult {
    /// Set when the run was interrupted and this holds fewer results than planned.
    pub partial: bool,
    pub rounds: BTreeMap<u32, RoundResults>,
}

impl RunResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Human-readable label for a round number.
    pub fn round_label(round: u32) -> String {
        format!("round-{round}")
    }

    /// Insert a case result, keeping each prompt's sequence ordered by case index.
    ///
    /// Returns `false` (and leaves the tree unchanged) if a result with the
    /// same key is already present.
    pub fn record(&mut self, result: CaseResult) -> bool {
        let cases = self
            .rounds
            .entry(result.round)
            .or_default()
            .prompts
            .entry(result.prompt_name.clone())
            .or_default();
        match cases.binary_search_by_key(&result.case_index, |c| c.case_index) {
            Ok(_) => false,
            Err(pos) => {
                cases.insert(pos, result);
                true
            }
        }
    }

    pub fn case_count(&self) -> usize {
        self.rounds.values().map(RoundResults::case_count).sum()
    }

    pub fn failed_count(&self) -> usize {
        self.iter_cases().filter(|c| !c.is_success()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.case_count() == 0
    }

    /// Every case result in round, prompt, case-index order.
    pub fn iter_cases(&self) -> impl Iterator<Item = &CaseResult> {
        self.rounds
            .values()
            .flat_map(|r| r.prompts.values())
            .flat_map(|cases| cases.iter())
    }

    pub fn into_partial(mut self) -> Self {
        self.partial = true;
        self
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn success(round: u32, prompt: &str, index: usize, secs: f64, usage: Usage) -> CaseResult {
        CaseResult {
            round,
            prompt_name: prompt.to_string(),
            case_index: index,
            case_id: format!("{prompt}-{index}"),
            case_name: format!("case {index}"),
            case_description: None,
            case_content: "content".to_string(),
            case_args: BTreeMap::new(),
            vendor: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            prompt_template: "template".to_string(),
            resolved_prompt: "template".to_string(),
            elapsed_secs: secs,
            outcome: CaseOutcome::Success {
                output: format!("output {index}"),
                usage,
            },
        }
    }

    pub fn failure(round: u32, prompt: &str, index: usize, error: &str) -> CaseResult {
        let mut result = success(round, prompt, index, 0.5, Usage::new());
        result.outcome = CaseOutcome::Failed {
            error: error.to_string(),
        };
        result
    }
}
