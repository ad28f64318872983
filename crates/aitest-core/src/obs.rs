//! Structured lifecycle events for aitest runs.
//!
//! Each `emit_*` function logs exactly one event with an `event = "..."`
//! field, so log pipelines can filter on it. [`RunSpan`] tags everything
//! logged during a run with its `run_id`.

use std::path::Path;

use tracing::{info, warn};

/// RAII guard that keeps a run-scoped span entered.
pub struct RunSpan {
    _span: tracing::span::EnteredSpan,
}

impl RunSpan {
    pub fn enter(run_id: &str) -> Self {
        let span = tracing::info_span!("aitest.run", run_id = %run_id);
        Self {
            _span: span.entered(),
        }
    }
}

pub fn emit_run_started(run_id: &str, rounds: u32, work_items: usize, limits: &str) {
    info!(
        event = "run.started",
        run_id = %run_id,
        rounds = rounds,
        work_items = work_items,
        limits = %limits,
    );
}

pub fn emit_round_started(run_id: &str, round: u32, cases: usize) {
    info!(event = "round.started", run_id = %run_id, round = round, cases = cases);
}

/// A single case failed. The run continues.
pub fn emit_case_failed(run_id: &str, key: &dyn std::fmt::Display, error: &dyn std::fmt::Display) {
    warn!(event = "case.failed", run_id = %run_id, case = %key, error = %error);
}

pub fn emit_run_interrupted(run_id: &str, completed: usize, total: usize, in_flight: usize) {
    warn!(
        event = "run.interrupted",
        run_id = %run_id,
        completed = completed,
        total = total,
        in_flight = in_flight,
    );
}

pub fn emit_run_finished(run_id: &str, duration_ms: u64, cases: usize, failed: usize, state: &str) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        cases = cases,
        failed = failed,
        state = %state,
    );
}

pub fn emit_report_written(run_id: &str, path: &Path, partial: bool) {
    info!(
        event = "report.written",
        run_id = %run_id,
        path = %path.display(),
        partial = partial,
    );
}
