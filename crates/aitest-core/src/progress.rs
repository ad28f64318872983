//! Nested progress counters with atomic rollup.
//!
//! [`ProgressAggregator`] owns the round → prompt → case tree behind one
//! mutex. Every mutation is a single critical section that updates the leaf
//! and all of its ancestors together, so a [`ProgressSnapshot`] can never
//! observe a case counted at one level but not another.

use std::fmt;
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::work_item::{WorkKey, WorkPlan};

/// Lifecycle of one case.
///
/// Moves forward only, except that any non-terminal state may go straight
/// to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Pending,
    Calling,
    AwaitingResponse,
    Processing,
    Done,
    Failed,
}

impl CaseStatus {
    fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Calling => 1,
            Self::AwaitingResponse => 2,
            Self::Processing => 3,
            Self::Done | Self::Failed => 4,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    pub fn is_in_flight(self) -> bool {
        matches!(
            self,
            Self::Calling | Self::AwaitingResponse | Self::Processing
        )
    }

    pub fn can_transition_to(self, next: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        next == Self::Failed || next.rank() > self.rank()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Calling => "calling",
            Self::AwaitingResponse => "awaiting-response",
            Self::Processing => "processing",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of an interior node (round or prompt).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Pending,
    Running,
    Done,
}

/// A mutation that would break the progress invariants. Always a bug.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProgressViolation {
    #[error("unknown round {0}")]
    UnknownRound(u32),

    #[error("unknown case: {0}")]
    UnknownCase(WorkKey),

    #[error("case already completed: {0}")]
    AlreadyCompleted(WorkKey),

    #[error("illegal status transition for {key}: {from} -> {to}")]
    IllegalTransition {
        key: WorkKey,
        from: CaseStatus,
        to: CaseStatus,
    },

    #[error("prompt {prompt} in round {round} still has {remaining} unfinished case(s)")]
    PromptIncomplete {
        round: u32,
        prompt: String,
        remaining: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseProgress {
    pub index: usize,
    pub case_id: String,
    pub case_name: String,
    pub status: CaseStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptProgress {
    pub name: String,
    pub status: PhaseStatus,
    pub completed: usize,
    pub total: usize,
    pub failed: usize,
    pub cases: Vec<CaseProgress>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundProgress {
    pub round: u32,
    pub status: PhaseStatus,
    pub completed: usize,
    pub total: usize,
    pub prompts: Vec<PromptProgress>,
}

/// Point-in-time copy of the whole progress tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub completed: usize,
    pub total: usize,
    pub failed: usize,
    pub rounds: Vec<RoundProgress>,
}

impl ProgressSnapshot {
    fn from_plan(plan: &WorkPlan) -> Self {
        let rounds: Vec<RoundProgress> = plan
            .rounds()
            .iter()
            .map(|r| RoundProgress {
                round: r.round,
                status: PhaseStatus::Pending,
                completed: 0,
                total: r.case_count(),
                prompts: r
                    .prompts
                    .iter()
                    .map(|p| PromptProgress {
                        name: p.prompt.name.clone(),
                        status: PhaseStatus::Pending,
                        completed: 0,
                        total: p.cases.len(),
                        failed: 0,
                        cases: p
                            .cases
                            .iter()
                            .map(|c| CaseProgress {
                                index: c.item.case_index,
                                case_id: c.item.case_id.clone(),
                                case_name: c.item.case_name.clone(),
                                status: CaseStatus::Pending,
                            })
                            .collect(),
                    })
                    .collect(),
            })
            .collect();
        Self {
            completed: 0,
            total: plan.len(),
            failed: 0,
            rounds,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.completed == self.total
    }

    /// Cases currently between admission and completion.
    pub fn in_flight(&self) -> usize {
        self.cases().filter(|c| c.status.is_in_flight()).count()
    }

    pub fn round(&self, round: u32) -> Option<&RoundProgress> {
        self.rounds.iter().find(|r| r.round == round)
    }

    pub fn case(&self, key: &WorkKey) -> Option<&CaseProgress> {
        self.round(key.round)?
            .prompts
            .iter()
            .find(|p| p.name == key.prompt)?
            .cases
            .get(key.case_index)
    }

    pub fn cases(&self) -> impl Iterator<Item = &CaseProgress> {
        self.rounds
            .iter()
            .flat_map(|r| r.prompts.iter())
            .flat_map(|p| p.cases.iter())
    }

    /// Verify counters agree at every level.
    ///
    /// Checks `completed <= total` at each node, that each prompt's counter
    /// equals its terminal leaves, and that the rollups match the global counter.
    pub fn check_consistency(&self) -> std::result::Result<(), String> {
        let mut global = 0;
        for round in &self.rounds {
            let mut round_sum = 0;
            for prompt in &round.prompts {
                let terminal = prompt.cases.iter().filter(|c| c.status.is_terminal()).count();
                if prompt.completed != terminal {
                    return Err(format!(
                        "round {} prompt {}: completed {} but {} terminal cases",
                        round.round, prompt.name, prompt.completed, terminal
                    ));
                }
                if prompt.completed > prompt.total {
                    return Err(format!(
                        "round {} prompt {}: completed {} exceeds total {}",
                        round.round, prompt.name, prompt.completed, prompt.total
                    ));
                }
                round_sum += prompt.completed;
            }
            if round.completed != round_sum || round.completed > round.total {
                return Err(format!(
                    "round {}: completed {} (leaf sum {}, total {})",
                    round.round, round.completed, round_sum, round.total
                ));
            }
            global += round.completed;
        }
        if self.completed != global || self.completed > self.total {
            return Err(format!(
                "global completed {} (leaf sum {}, total {})",
                self.completed, global, self.total
            ));
        }
        Ok(())
    }

    fn round_mut(&mut self, round: u32) -> Result<&mut RoundProgress, ProgressViolation> {
        self.rounds
            .iter_mut()
            .find(|r| r.round == round)
            .ok_or(ProgressViolation::UnknownRound(round))
    }

    fn locate(&mut self, key: &WorkKey) -> Result<(usize, usize), ProgressViolation> {
        let round_pos = self
            .rounds
            .iter()
            .position(|r| r.round == key.round)
            .ok_or_else(|| ProgressViolation::UnknownCase(key.clone()))?;
        let prompt_pos = self.rounds[round_pos]
            .prompts
            .iter()
            .position(|p| p.name == key.prompt)
            .ok_or_else(|| ProgressViolation::UnknownCase(key.clone()))?;
        if key.case_index >= self.rounds[round_pos].prompts[prompt_pos].cases.len() {
            return Err(ProgressViolation::UnknownCase(key.clone()));
        }
        Ok((round_pos, prompt_pos))
    }
}

/// Thread-safe owner of the progress tree.
#[derive(Debug)]
pub struct ProgressAggregator {
    tree: Mutex<ProgressSnapshot>,
}

impl ProgressAggregator {
    pub fn new(plan: &WorkPlan) -> Self {
        Self {
            tree: Mutex::new(ProgressSnapshot::from_plan(plan)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ProgressSnapshot> {
        self.tree.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn begin_round(&self, round: u32) -> Result<(), ProgressViolation> {
        let mut tree = self.lock();
        let node = tree.round_mut(round)?;
        if node.status == PhaseStatus::Pending {
            node.status = PhaseStatus::Running;
        }
        Ok(())
    }

    /// Mark a case as admitted: `pending -> calling`.
    pub fn begin_case(&self, key: &WorkKey) -> Result<(), ProgressViolation> {
        self.update_case_status(key, CaseStatus::Calling)
    }

    /// Move a case to `status`.
    ///
    /// Terminal statuses are routed through [`complete_case`](Self::complete_case)
    /// so the counters roll up in the same critical section.
    pub fn update_case_status(
        &self,
        key: &WorkKey,
        status: CaseStatus,
    ) -> Result<(), ProgressViolation> {
        if status.is_terminal() {
            return self.complete_case(key, status == CaseStatus::Done);
        }
        let mut tree = self.lock();
        let (r, p) = tree.locate(key)?;
        let round = &mut tree.rounds[r];
        let prompt = &mut round.prompts[p];
        let case = &mut prompt.cases[key.case_index];
        if !case.status.can_transition_to(status) {
            return Err(ProgressViolation::IllegalTransition {
                key: key.clone(),
                from: case.status,
                to: status,
            });
        }
        case.status = status;
        if prompt.status == PhaseStatus::Pending {
            prompt.status = PhaseStatus::Running;
        }
        if round.status == PhaseStatus::Pending {
            round.status = PhaseStatus::Running;
        }
        Ok(())
    }

    /// Record a case's terminal state and roll the completion up to its
    /// prompt, its round and the global counter.
    pub fn complete_case(&self, key: &WorkKey, success: bool) -> Result<(), ProgressViolation> {
        let mut tree = self.lock();
        let (r, p) = tree.locate(key)?;
        {
            let case = &mut tree.rounds[r].prompts[p].cases[key.case_index];
            if case.status.is_terminal() {
                return Err(ProgressViolation::AlreadyCompleted(key.clone()));
            }
            case.status = if success {
                CaseStatus::Done
            } else {
                CaseStatus::Failed
            };
        }
        let round = &mut tree.rounds[r];
        let prompt = &mut round.prompts[p];
        prompt.completed += 1;
        if !success {
            prompt.failed += 1;
        }
        if prompt.status == PhaseStatus::Pending {
            prompt.status = PhaseStatus::Running;
        }
        round.completed += 1;
        if round.status == PhaseStatus::Pending {
            round.status = PhaseStatus::Running;
        }
        tree.completed += 1;
        if !success {
            tree.failed += 1;
        }
        Ok(())
    }

    /// Close out one prompt within a round once all of its cases are terminal.
    ///
    /// Returns `true` when this was the round's last open prompt.
    pub fn complete_in_round(&self, round: u32, prompt: &str) -> Result<bool, ProgressViolation> {
        let mut tree = self.lock();
        let node = tree.round_mut(round)?;
        let entry = node
            .prompts
            .iter_mut()
            .find(|p| p.name == prompt)
            .ok_or_else(|| ProgressViolation::UnknownCase(WorkKey::new(round, prompt, 0)))?;
        if entry.completed < entry.total {
            return Err(ProgressViolation::PromptIncomplete {
                round,
                prompt: prompt.to_string(),
                remaining: entry.total - entry.completed,
            });
        }
        entry.status = PhaseStatus::Done;
        let round_done = node.prompts.iter().all(|p| p.status == PhaseStatus::Done);
        if round_done {
            node.status = PhaseStatus::Done;
        }
        Ok(round_done)
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        self.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CaseDefinition, PromptConfig};
    use crate::loader::Catalog;
    use proptest::prelude::*;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn plan(rounds: u32, layout: &[(&str, usize)]) -> WorkPlan {
        let prompts = layout
            .iter()
            .map(|(n, _)| PromptConfig::new(*n, "openai", "m", "t"))
            .collect();
        let cases: HashMap<String, Vec<CaseDefinition>> = layout
            .iter()
            .map(|(n, k)| {
                (
                    n.to_string(),
                    (0..*k)
                        .map(|i| CaseDefinition::new(i.to_string(), format!("c{i}"), "x"))
                        .collect(),
                )
            })
            .collect();
        let names: Vec<String> = layout.iter().map(|(n, _)| n.to_string()).collect();
        WorkPlan::build(rounds, &names, &Catalog::new(prompts, cases)).unwrap()
    }

    #[test]
    fn test_complete_case_rolls_up_every_level() {
        let agg = ProgressAggregator::new(&plan(2, &[("A", 2), ("B", 1)]));
        agg.begin_round(1).unwrap();
        agg.begin_case(&WorkKey::new(1, "A", 1)).unwrap();
        agg.complete_case(&WorkKey::new(1, "A", 1), true).unwrap();
        agg.complete_case(&WorkKey::new(1, "B", 0), false).unwrap();

        let snap = agg.snapshot();
        assert_eq!(snap.total, 6);
        assert_eq!(snap.completed, 2);
        assert_eq!(snap.failed, 1);
        let round = snap.round(1).unwrap();
        assert_eq!((round.completed, round.total), (2, 3));
        assert_eq!(round.prompts[0].completed, 1);
        assert_eq!(
            snap.case(&WorkKey::new(1, "B", 0)).unwrap().status,
            CaseStatus::Failed
        );
        snap.check_consistency().unwrap();
    }

    #[test]
    fn test_double_completion_is_a_violation() {
        let agg = ProgressAggregator::new(&plan(1, &[("A", 1)]));
        let key = WorkKey::new(1, "A", 0);
        agg.complete_case(&key, true).unwrap();
        assert_eq!(
            agg.complete_case(&key, false),
            Err(ProgressViolation::AlreadyCompleted(key))
        );
        assert_eq!(agg.snapshot().completed, 1);
    }

    #[test]
    fn test_status_transitions_are_monotonic() {
        let agg = ProgressAggregator::new(&plan(1, &[("A", 1)]));
        let key = WorkKey::new(1, "A", 0);
        agg.begin_case(&key).unwrap();
        agg.update_case_status(&key, CaseStatus::Processing).unwrap();
        let err = agg
            .update_case_status(&key, CaseStatus::AwaitingResponse)
            .unwrap_err();
        assert!(matches!(err, ProgressViolation::IllegalTransition { .. }));
        agg.update_case_status(&key, CaseStatus::Failed).unwrap();
        assert_eq!(agg.snapshot().failed, 1);
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let agg = ProgressAggregator::new(&plan(1, &[("A", 1)]));
        assert!(agg.begin_round(9).is_err());
        assert!(agg.complete_case(&WorkKey::new(1, "A", 5), true).is_err());
        assert!(agg.complete_case(&WorkKey::new(1, "Z", 0), true).is_err());
    }

    #[test]
    fn test_complete_in_round_requires_finished_cases() {
        let agg = ProgressAggregator::new(&plan(1, &[("A", 2), ("B", 1)]));
        agg.complete_case(&WorkKey::new(1, "A", 0), true).unwrap();
        assert!(matches!(
            agg.complete_in_round(1, "A"),
            Err(ProgressViolation::PromptIncomplete { remaining: 1, .. })
        ));
        agg.complete_case(&WorkKey::new(1, "A", 1), true).unwrap();
        assert!(!agg.complete_in_round(1, "A").unwrap());
        agg.complete_case(&WorkKey::new(1, "B", 0), true).unwrap();
        assert!(agg.complete_in_round(1, "B").unwrap());
        let snap = agg.snapshot();
        assert_eq!(snap.rounds[0].status, PhaseStatus::Done);
        assert!(snap.is_finished());
    }

    #[test]
    fn test_concurrent_completions_do_not_drift() {
        let plan = plan(3, &[("A", 20), ("B", 13)]);
        let keys: Vec<WorkKey> = plan.items().map(|i| i.key()).collect();
        let agg = Arc::new(ProgressAggregator::new(&plan));

        std::thread::scope(|s| {
            for chunk in keys.chunks(11) {
                let agg = Arc::clone(&agg);
                s.spawn(move || {
                    for key in chunk {
                        agg.begin_case(key).unwrap();
                        agg.complete_case(key, key.case_index % 3 != 0).unwrap();
                        agg.snapshot().check_consistency().unwrap();
                    }
                });
            }
        });

        let snap = agg.snapshot();
        assert_eq!(snap.completed, keys.len());
        assert_eq!(snap.in_flight(), 0);
        snap.check_consistency().unwrap();
    }

    proptest! {
        #[test]
        fn prop_any_completion_order_stays_consistent(
            sizes in proptest::collection::vec(1usize..5, 1..4),
            rounds in 1u32..3,
            seed in any::<u64>(),
        ) {
            let owned: Vec<(String, usize)> =
                sizes.iter().enumerate().map(|(i, n)| (format!("p{i}"), *n)).collect();
            let layout: Vec<(&str, usize)> = owned.iter().map(|(s, n)| (s.as_str(), *n)).collect();
            let plan = plan(rounds, &layout);
            let mut keys: Vec<WorkKey> = plan.items().map(|i| i.key()).collect();
            let len = keys.len();
            for i in 0..len {
                let j = ((seed.wrapping_mul(i as u64 + 1)) % len as u64) as usize;
                keys.swap(i, j);
            }

            let agg = ProgressAggregator::new(&plan);
            let mut previous = 0;
            for key in &keys {
                agg.complete_case(key, true).unwrap();
                let snap = agg.snapshot();
                prop_assert!(snap.check_consistency().is_ok());
                prop_assert!(snap.completed > previous);
                previous = snap.completed;
            }
            prop_assert_eq!(previous, len);
        }
    }
}
