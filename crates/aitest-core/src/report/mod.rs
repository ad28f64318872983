//! Report renderers: persist a [`RunResult`] as HTML, XML or JSON.
//!
//! Every renderer writes `test_results_<YYYYmmdd_HHMMSS>.<ext>` into the
//! output directory; partial (interrupted) runs get a `_partial` suffix.

pub mod html;
pub mod json;
pub mod xml;

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::domain::RunResult;

pub use html::HtmlReport;
pub use json::JsonReport;
pub use xml::XmlReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Html,
    Xml,
    Json,
}

impl ReportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Xml => "xml",
            Self::Json => "json",
        }
    }

    pub fn renderer(self) -> Box<dyn ReportRenderer> {
        match self {
            Self::Html => Box::new(HtmlReport),
            Self::Xml => Box::new(XmlReport),
            Self::Json => Box::new(JsonReport),
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "html" => Ok(Self::Html),
            "xml" => Ok(Self::Xml),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown report format: {other}")),
        }
    }
}

/// Sink for a finished run.
pub trait ReportRenderer: Send + Sync {
    fn format(&self) -> ReportFormat;

    /// Write the report into `output_dir` and return the file's path.
    fn render(&self, run: &RunResult, output_dir: &Path, partial: bool) -> Result<PathBuf>;
}

pub fn report_file_name(at: DateTime<Local>, format: ReportFormat, partial: bool) -> String {
    let suffix = if partial { "_partial" } else { "" };
    format!(
        "test_results_{}{}.{}",
        at.format("%Y%m%d_%H%M%S"),
        suffix,
        format.extension()
    )
}

/// Write `content` to a fresh report file under `output_dir`.
///
/// Creates the directory if needed. If a report with the same name already
/// exists, a numeric suffix is appended rather than overwriting it.
pub(crate) fn write_report(
    output_dir: &Path,
    format: ReportFormat,
    partial: bool,
    at: DateTime<Local>,
    content: &str,
) -> Result<PathBuf> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("create output directory {:?}", output_dir))?;
    let name = report_file_name(at, format, partial);
    let mut path = output_dir.join(&name);
    let mut n = 1;
    while path.exists() {
        let stem = name.trim_end_matches(&format!(".{}", format.extension()));
        path = output_dir.join(format!("{stem}_{n}.{}", format.extension()));
        n += 1;
    }
    std::fs::write(&path, content).with_context(|| format!("write {:?}", path))?;
    Ok(path)
}

/// Headline numbers shown at the top of every report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total_cases: usize,
    pub failed_cases: usize,
    pub prompt_count: usize,
    pub round_count: usize,
    pub average_response_secs: f64,
    pub total_tokens: u64,
}

impl RunSummary {
    pub fn from_run(run: &RunResult) -> Self {
        let total_cases = run.case_count();
        let prompts: BTreeSet<&str> = run
            .rounds
            .values()
            .flat_map(|r| r.prompts.keys().map(String::as_str))
            .collect();
        let total_secs: f64 = run.iter_cases().map(|c| c.elapsed_secs).sum();
        let total_tokens = run
            .iter_cases()
            .filter_map(|c| c.usage())
            .map(|u| u.total_tokens())
            .sum();
        Self {
            total_cases,
            failed_cases: run.failed_count(),
            prompt_count: prompts.len(),
            round_count: run.rounds.len(),
            average_response_secs: if total_cases == 0 {
                0.0
            } else {
                total_secs / total_cases as f64
            },
            total_tokens,
        }
    }
}

fn escape(text: &str, apos: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str(apos),
            c => out.push(c),
        }
    }
    out
}

pub fn escape_html(text: &str) -> String {
    escape(text, "&#x27;")
}

pub fn escape_xml(text: &str) -> String {
    escape(text, "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::result::fixtures::{failure, success};
    use crate::domain::Usage;
    use chrono::TimeZone;

    #[test]
    fn test_report_file_names() {
        let at = Local.with_ymd_and_hms(2026, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(
            report_file_name(at, ReportFormat::Html, false),
            "test_results_20260309_140507.html"
        );
        assert_eq!(
            report_file_name(at, ReportFormat::Xml, true),
            "test_results_20260309_140507_partial.xml"
        );
    }

    #[test]
    fn test_write_report_never_overwrites() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("nested/out");
        let at = Local.with_ymd_and_hms(2026, 3, 9, 14, 5, 7).unwrap();
        let first = write_report(&dir, ReportFormat::Json, false, at, "1").unwrap();
        let second = write_report(&dir, ReportFormat::Json, false, at, "2").unwrap();
        assert_ne!(first, second);
        assert!(second.to_string_lossy().ends_with("test_results_20260309_140507_1.json"));
        assert_eq!(std::fs::read_to_string(first).unwrap(), "1");
    }

    #[test]
    fn test_summary_counts_tokens_from_either_usage_shape() {
        let mut run = RunResult::new();
        run.record(success(1, "A", 0, 1.0, Usage::new().with("total_tokens", 30)));
        run.record(success(
            1,
            "B",
            0,
            2.0,
            Usage::new().with("input_tokens", 5).with("output_tokens", 7),
        ));
        run.record(failure(2, "A", 0, "boom"));

        let summary = RunSummary::from_run(&run);
        assert_eq!(summary.total_cases, 3);
        assert_eq!(summary.failed_cases, 1);
        assert_eq!(summary.prompt_count, 2);
        assert_eq!(summary.round_count, 2);
        assert_eq!(summary.total_tokens, 42);
        assert!((summary.average_response_secs - 3.5 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_escaping() {
        assert_eq!(escape_html("<a href='x'>&</a>"), "&lt;a href=&#x27;x&#x27;&gt;&amp;&lt;/a&gt;");
        assert_eq!(escape_xml("\"it's\""), "&quot;it&apos;s&quot;");
    }

    #[test]
    fn test_format_parse_and_renderer() {
        assert_eq!("XML".parse::<ReportFormat>(), Ok(ReportFormat::Xml));
        assert!("pdf".parse::<ReportFormat>().is_err());
        assert_eq!(ReportFormat::Json.renderer().format(), ReportFormat::Json);
    }
}
