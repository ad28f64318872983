//! Domain models for aitest.
//!
//! Canonical definitions for the entities the engine reads and produces:
//! - `PromptConfig`: a named template bound to a vendor and model
//! - `CaseDefinition`: one test input with template arguments
//! - `CaseResult` / `RunResult`: what execution produced

pub mod case;
pub mod error;
pub mod prompt;
pub mod result;

pub use case::{CaseDefinition, CaseFile};
pub use error::{BenchError, Result};
pub use prompt::{PromptConfig, PromptFile};
pub use result::{CaseOutcome, CaseResult, RoundResults, RunResult, Usage};
