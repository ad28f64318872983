//! Work item model: the immutable units of execution and the plan that holds them.
//!
//! A [`WorkPlan`] is the cross product rounds × selected prompts × that
//! prompt's cases, grouped by round and prompt so the engine can fan out
//! level by level.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::{BenchError, CaseDefinition, PromptConfig, Result};
use crate::loader::Catalog;

/// Three-level address of a work item: `(round, prompt, case index)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkKey {
    pub round: u32,
    pub prompt: String,
    pub case_index: usize,
}

impl WorkKey {
    pub fn new(round: u32, prompt: impl Into<String>, case_index: usize) -> Self {
        Self {
            round,
            prompt: prompt.into(),
            case_index,
        }
    }
}

impl fmt::Display for WorkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "round {} / {} / case #{}",
            self.round, self.prompt, self.case_index
        )
    }
}

/// One case, of one prompt, in one round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub round: u32,
    pub prompt_name: String,
    pub case_index: usize,
    pub case_id: String,
    pub case_name: String,
}

impl WorkItem {
    pub fn key(&self) -> WorkKey {
        WorkKey::new(self.round, &self.prompt_name, self.case_index)
    }
}

/// A work item together with the case definition it executes.
#[derive(Debug, Clone)]
pub struct PlannedCase {
    pub item: WorkItem,
    pub case: Arc<CaseDefinition>,
}

/// All cases of one prompt within one round.
#[derive(Debug, Clone)]
pub struct PromptPlan {
    pub prompt: Arc<PromptConfig>,
    pub cases: Vec<PlannedCase>,
}

/// All prompts of one round.
#[derive(Debug, Clone)]
pub struct RoundPlan {
    pub round: u32,
    pub prompts: Vec<PromptPlan>,
}

impl RoundPlan {
    pub fn case_count(&self) -> usize {
        self.prompts.iter().map(|p| p.cases.len()).sum()
    }
}

/// The full, ordered set of work items for a run.
#[derive(Debug, Clone)]
pub struct WorkPlan {
    rounds: Vec<RoundPlan>,
}

impl WorkPlan {
    /// Build the plan for `round_count` rounds over `selected` prompt names.
    ///
    /// Selected names with no prompt configuration, or with zero cases,
    /// contribute nothing and are logged. Duplicate selections are ignored.
    /// Fails only when no plan can be built at all: zero rounds, an empty
    /// selection, or a selection that yields no work items.
    pub fn build(round_count: u32, selected: &[String], catalog: &Catalog) -> Result<Self> {
        if round_count == 0 {
            return Err(BenchError::NoRounds);
        }
        if selected.is_empty() {
            return Err(BenchError::EmptySelection);
        }

        let mut seen = HashSet::new();
        let mut resolved: Vec<(Arc<PromptConfig>, Vec<Arc<CaseDefinition>>)> = Vec::new();
        for name in selected {
            if !seen.insert(name.as_str()) {
                warn!(prompt = %name, "prompt selected more than once; ignoring duplicate");
                continue;
            }
            let Some(prompt) = catalog.prompt(name) else {
                warn!(prompt = %name, "no prompt configuration found; skipping");
                continue;
            };
            let cases = catalog.cases_for(name);
            if cases.is_empty() {
                warn!(prompt = %name, "no test cases found; skipping");
                continue;
            }
            debug!(prompt = %name, cases = cases.len(), "prompt planned");
            resolved.push((
                Arc::new(prompt.clone()),
                cases.iter().cloned().map(Arc::new).collect(),
            ));
        }

        if resolved.is_empty() {
            return Err(BenchError::NoWorkItems);
        }

        let rounds = (1..=round_count)
            .map(|round| RoundPlan {
                round,
                prompts: resolved
                    .iter()
                    .map(|(prompt, cases)| PromptPlan {
                        prompt: Arc::clone(prompt),
                        cases: cases
                            .iter()
                            .enumerate()
                            .map(|(case_index, case)| PlannedCase {
                                item: WorkItem {
                                    round,
                                    prompt_name: prompt.name.clone(),
                                    case_index,
                                    case_id: case.id.clone(),
                                    case_name: case.name.clone(),
                                },
                                case: Arc::clone(case),
                            })
                            .collect(),
                    })
                    .collect(),
            })
            .collect();

        Ok(Self { rounds })
    }

    pub fn rounds(&self) -> &[RoundPlan] {
        &self.rounds
    }

    pub fn into_rounds(self) -> Vec<RoundPlan> {
        self.rounds
    }

    pub fn round_count(&self) -> usize {
        self.rounds.len()
    }

    /// Work items in round, prompt, case order.
    pub fn items(&self) -> impl Iterator<Item = &WorkItem> {
        self.rounds
            .iter()
            .flat_map(|r| r.prompts.iter())
            .flat_map(|p| p.cases.iter())
            .map(|c| &c.item)
    }

    pub fn len(&self) -> usize {
        self.rounds.iter().map(RoundPlan::case_count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
