//! XML report, one `<Case>` element per result.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::{DateTime, Local};

use super::{escape_xml as esc, write_report, ReportFormat, ReportRenderer, RunSummary};
use crate::domain::{CaseResult, RunResult};

#[derive(Debug, Clone, Copy, Default)]
pub struct XmlReport;

impl XmlReport {
    pub fn render_string(run: &RunResult, at: DateTime<Local>, partial: bool) -> String {
        let summary = RunSummary::from_run(run);
        let mut out = String::with_capacity(8 * 1024);
        out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        let _ = writeln!(out, "<TestResults partial=\"{partial}\">");
        let _ = writeln!(out, "  <TestTime>{}</TestTime>", at.format("%Y-%m-%d %H:%M:%S"));
        let _ = writeln!(
            out,
            "  <Summary totalCases=\"{}\" failedCases=\"{}\" prompts=\"{}\" rounds=\"{}\" averageResponseTime=\"{:.3}\" totalTokens=\"{}\"/>",
            summary.total_cases,
            summary.failed_cases,
            summary.prompt_count,
            summary.round_count,
            summary.average_response_secs,
            summary.total_tokens
        );

        for (round, results) in &run.rounds {
            let _ = writeln!(out, "  <Round number=\"{round}\">");
            for (prompt, cases) in &results.prompts {
                let _ = writeln!(out, "    <PromptTest name=\"{}\">", esc(prompt));
                for case in cases {
                    write_case(&mut out, case);
                }
                out.push_str("    </PromptTest>\n");
            }
            out.push_str("  </Round>\n");
        }
        out.push_str("</TestResults>\n");
        out
    }
}

fn element(out: &mut String, indent: &str, name: &str, text: &str) {
    let _ = writeln!(out, "{indent}<{name}>{}</{name}>", esc(text));
}

fn write_case(out: &mut String, case: &CaseResult) {
    let status = if case.is_success() { "success" } else { "failed" };
    let _ = writeln!(
        out,
        "      <Case id=\"{}\" name=\"{}\" status=\"{status}\">",
        esc(&case.case_id),
        esc(&case.case_name)
    );
    const I: &str = "        ";
    if let Some(description) = &case.case_description {
        element(out, I, "Description", description);
    }

    let _ = writeln!(out, "{I}<PromptInfo>");
    element(out, "          ", "Model", &case.model);
    element(out, "          ", "Vendor", &case.vendor);
    element(out, "          ", "OriginalPrompt", &case.prompt_template);
    element(out, "          ", "ProcessedPrompt", &case.resolved_prompt);
    let _ = writeln!(out, "{I}</PromptInfo>");

    if !case.case_args.is_empty() {
        let _ = writeln!(out, "{I}<Args>");
        for (key, value) in &case.case_args {
            let value = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            let _ = writeln!(out, "{I}  <Arg name=\"{}\">{}</Arg>", esc(key), esc(&value));
        }
        let _ = writeln!(out, "{I}</Args>");
    }

    element(out, I, "CaseContent", &case.case_content);
    match case.error() {
        Some(error) => element(out, I, "Error", error),
        None => element(out, I, "Output", &case.display_output()),
    }

    let _ = writeln!(out, "{I}<Metrics>");
    let _ = writeln!(out, "{I}  <ElapsedTime>{:.3}</ElapsedTime>", case.elapsed_secs);
    let _ = writeln!(out, "{I}  <Tokens>");
    if let Some(usage) = case.usage() {
        for (key, value) in usage.iter() {
            let _ = writeln!(out, "{I}    <Token name=\"{}\">{value}</Token>", esc(key));
        }
    }
    let _ = writeln!(out, "{I}  </Tokens>");
    let _ = writeln!(out, "{I}</Metrics>");
    out.push_str("      </Case>\n");
}

impl ReportRenderer for XmlReport {
    fn format(&self) -> ReportFormat {
        ReportFormat::Xml
    }

    fn render(&self, run: &RunResult, output_dir: &Path, partial: bool) -> Result<PathBuf> {
        let at = Local::now();
        let xml = Self::render_string(run, at, partial);
        write_report(output_dir, ReportFormat::Xml, partial, at, &xml)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::result::fixtures::{failure, success};
    use crate::domain::Usage;

    #[test]
    fn test_xml_layout() {
        let mut run = RunResult::new();
        let mut ok = success(2, "A&B", 0, 0.25, Usage::new().with("prompt_tokens", 3));
        ok.case_args.insert("count".into(), 4.into());
        run.record(ok);
        run.record(failure(2, "A&B", 1, "bad <gateway>"));

        let xml = XmlReport::render_string(&run, Local::now(), true);
        assert!(xml.contains("<TestResults partial=\"true\">"));
        assert!(xml.contains("<Round number=\"2\">"));
        assert!(xml.contains("<PromptTest name=\"A&amp;B\">"));
        assert!(xml.contains("<Case id=\"A&amp;B-1\" name=\"case 1\" status=\"failed\">"));
        assert!(xml.contains("<Error>bad &lt;gateway&gt;</Error>"));
        assert!(xml.contains("<Arg name=\"count\">4</Arg>"));
        assert!(xml.contains("<Token name=\"prompt_tokens\">3</Token>"));
        assert!(xml.contains("<ElapsedTime>0.250</ElapsedTime>"));
        assert!(xml.trim_end().ends_with("</TestResults>"));
    }
}
