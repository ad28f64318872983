use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

use super::{write_report, ReportFormat, ReportRenderer, RunSummary};
use crate::domain::RunResult;

pub const SCHEMA_VERSION: &str = "1.0";

/// Machine-readable report artifact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonReportArtifact {
    pub schema_version: String,
    pub generated_at: DateTime<Utc>,
    pub partial: bool,
    pub summary: RunSummary,
    pub result: RunResult,
}

impl JsonReportArtifact {
    pub fn new(run: &RunResult, generated_at: DateTime<Utc>, partial: bool) -> Self {
        let mut result = run.clone();
        result.partial = partial;
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            generated_at,
            partial,
            summary: RunSummary::from_run(run),
            result,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonReport;

impl ReportRenderer for JsonReport {
    fn format(&self) -> ReportFormat {
        ReportFormat::Json
    }

    fn render(&self, run: &RunResult, output_dir: &Path, partial: bool) -> Result<PathBuf> {
        let at = Local::now();
        let artifact = JsonReportArtifact::new(run, at.with_timezone(&Utc), partial);
        let content = serde_json::to_string_pretty(&artifact).context("serialize report artifact")?;
        write_report(output_dir, ReportFormat::Json, partial, at, &content)
    }
}
