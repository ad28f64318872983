//! Domain-level error taxonomy for aitest.

use crate::progress::ProgressViolation;

/// Errors surfaced by setup, loading, and run supervision.
///
/// Per-case model failures are never represented here: they are recorded as
/// failed [`CaseResult`](crate::domain::CaseResult)s and the run continues.
#[derive(Debug, thiserror::Error)]
pub enum BenchError {
    #[error("round count must be at least 1")]
    NoRounds,

    #[error("no prompts selected")]
    EmptySelection,

    #[error("none of the selected prompts produced any work items")]
    NoWorkItems,

    #[error("{gate} concurrency must be at least 1")]
    InvalidConcurrency { gate: &'static str },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("progress consistency violation: {0}")]
    ProgressViolation(#[from] ProgressViolation),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for aitest core operations.
pub type Result<T> = std::result::Result<T, BenchError>;
