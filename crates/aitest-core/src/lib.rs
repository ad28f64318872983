//! aitest core library
//!
//! Concurrent prompt-evaluation engine: plans rounds × prompts × cases,
//! executes them under three independent concurrency gates, tracks progress
//! with a consistent live view, and reports complete or partial results.

pub mod domain;
pub mod engine;
pub mod gates;
pub mod interrupt;
pub mod invocation;
pub mod live_view;
pub mod loader;
pub mod metrics;
pub mod obs;
pub mod progress;
pub mod report;
pub mod telemetry;
pub mod template;
pub mod work_item;

pub use domain::{
    BenchError, CaseDefinition, CaseFile, CaseOutcome, CaseResult, PromptConfig, PromptFile,
    Result, RoundResults, RunResult, Usage,
};

pub use engine::{ExecutionEngine, RunOptions, RunOutcome, RunState, DEFAULT_GRACE};
pub use gates::{ConcurrencyGates, ConcurrencyLimits, Gate, GateLevel, GatePermit, GateStats};
pub use interrupt::{DrainOutcome, InterruptController};
pub use invocation::{InvocationError, InvocationOutput, InvocationRequest, ModelInvoker};
pub use live_view::{format_frame, LiveRenderer, DEFAULT_REFRESH};
pub use loader::{load_cases, load_prompts, Catalog};
pub use progress::{
    CaseProgress, CaseStatus, PhaseStatus, ProgressAggregator, ProgressSnapshot, ProgressViolation,
    PromptProgress, RoundProgress,
};
pub use report::{
    report_file_name, HtmlReport, JsonReport, ReportFormat, ReportRenderer, RunSummary, XmlReport,
};
pub use template::{resolve, ResolvedPrompt};
pub use work_item::{PlannedCase, PromptPlan, RoundPlan, WorkItem, WorkKey, WorkPlan};

pub use metrics::METRICS;
pub use obs::RunSpan;
pub use telemetry::{hold_logs, init_tracing, LogFormat, LogHold};

/// aitest version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
