//! Single-page HTML report.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::{DateTime, Local};

use super::{escape_html as esc, write_report, ReportFormat, ReportRenderer, RunSummary};
use crate::domain::{CaseResult, RunResult};

const STYLE: &str = r#"
:root { --blue: #106AED; --gray-1: #F5F8FA; --gray-3: #DCE4EB; --gray-7: #5C7080; --gray-9: #1C2B35; --red: #DB2020; --green: #0DA976; --radius: 4px; }
* { box-sizing: border-box; margin: 0; padding: 0; }
body { font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, Arial, sans-serif; background: var(--gray-1); color: var(--gray-9); line-height: 1.5; font-size: 14px; }
.container { max-width: 1200px; margin: 0 auto; padding: 20px; }
.header { margin-bottom: 24px; padding-bottom: 16px; border-bottom: 1px solid var(--gray-3); }
.title { font-size: 24px; font-weight: 600; }
.subtitle { color: var(--gray-7); margin-top: 4px; }
.partial { margin-top: 12px; padding: 8px 12px; border-radius: var(--radius); background: #FFE0E0; color: var(--red); font-weight: 600; }
.stats { display: grid; grid-template-columns: repeat(auto-fill, minmax(200px, 1fr)); gap: 16px; margin-bottom: 24px; }
.stat { background: white; border-radius: var(--radius); padding: 16px; box-shadow: 0 1px 2px rgba(31,35,41,.08); }
.stat-title { font-size: 13px; color: var(--gray-7); margin-bottom: 8px; }
.stat-value { font-size: 24px; font-weight: 600; }
.round > h2 { font-size: 18px; margin: 24px 0 12px; }
.prompt { background: white; border-radius: var(--radius); padding: 16px; margin-bottom: 16px; box-shadow: 0 1px 2px rgba(31,35,41,.08); }
.prompt h3 { font-size: 16px; margin-bottom: 12px; }
.badge { display: inline-block; margin-left: 8px; padding: 2px 8px; border-radius: 10px; background: #DEEBFF; color: var(--blue); font-size: 12px; font-weight: 500; }
details.case { border: 1px solid var(--gray-3); border-radius: var(--radius); margin-bottom: 8px; }
details.case > summary { cursor: pointer; padding: 8px 12px; font-weight: 500; }
details.case.failed > summary { color: var(--red); }
.case-body { padding: 12px; border-top: 1px solid var(--gray-3); }
.section-title { font-size: 12px; color: var(--gray-7); text-transform: uppercase; margin: 12px 0 4px; }
pre { white-space: pre-wrap; word-break: break-word; background: var(--gray-1); padding: 8px; border-radius: var(--radius); }
table { border-collapse: collapse; }
td, th { border: 1px solid var(--gray-3); padding: 4px 8px; text-align: left; }
.meta { color: var(--gray-7); font-size: 12px; }
"#;

#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlReport;

impl HtmlReport {
    pub fn render_string(run: &RunResult, at: DateTime<Local>, partial: bool) -> String {
        let summary = RunSummary::from_run(run);
        let time = at.format("%Y-%m-%d %H:%M:%S").to_string();
        let mut out = String::with_capacity(16 * 1024);

        let _ = write!(
            out,
            "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"UTF-8\">\n\
             <meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n\
             <title>Prompt Test Report - {time}</title>\n<style>{STYLE}</style>\n</head>\n<body>\n\
             <div class=\"container\">\n<div class=\"header\">\n\
             <div class=\"title\">Prompt Test Report</div>\n\
             <div class=\"subtitle\">Generated {time}</div>\n"
        );
        if partial {
            out.push_str(
                "<div class=\"partial\">Partial results: the run was interrupted before all cases finished.</div>\n",
            );
        }
        out.push_str("</div>\n<div class=\"stats\">\n");
        stat(&mut out, "Total cases", &summary.total_cases.to_string());
        stat(&mut out, "Failed cases", &summary.failed_cases.to_string());
        stat(&mut out, "Prompts", &summary.prompt_count.to_string());
        stat(&mut out, "Rounds", &summary.round_count.to_string());
        stat(
            &mut out,
            "Average response time",
            &format!("{:.2} s", summary.average_response_secs),
        );
        stat(&mut out, "Total tokens", &summary.total_tokens.to_string());
        out.push_str("</div>\n");

        for (round, results) in &run.rounds {
            let _ = writeln!(
                out,
                "<div class=\"round\">\n<h2>{}</h2>",
                esc(&RunResult::round_label(*round))
            );
            for (prompt, cases) in &results.prompts {
                let badge = cases
                    .first()
                    .map(|c| format!("{} / {}", c.vendor, c.model))
                    .unwrap_or_default();
                let _ = writeln!(
                    out,
                    "<div class=\"prompt\">\n<h3>{}<span class=\"badge\">{}</span></h3>",
                    esc(prompt),
                    esc(&badge)
                );
                for case in cases {
                    case_card(&mut out, case);
                }
                out.push_str("</div>\n");
            }
            out.push_str("</div>\n");
        }

        out.push_str("</div>\n</body>\n</html>\n");
        out
    }
}

fn stat(out: &mut String, title: &str, value: &str) {
    let _ = writeln!(
        out,
        "<div class=\"stat\"><div class=\"stat-title\">{}</div><div class=\"stat-value\">{}</div></div>",
        esc(title),
        esc(value)
    );
}

fn section(out: &mut String, title: &str, body: &str) {
    let _ = writeln!(
        out,
        "<div class=\"section-title\">{}</div><pre>{}</pre>",
        esc(title),
        esc(body)
    );
}

fn case_card(out: &mut String, case: &CaseResult) {
    let class = if case.is_success() { "case" } else { "case failed" };
    let _ = writeln!(
        out,
        "<details class=\"{class}\">\n<summary>#{} {} <span class=\"meta\">({}, {:.2} s)</span></summary>\n<div class=\"case-body\">",
        esc(&case.case_id),
        esc(&case.case_name),
        if case.is_success() { "ok" } else { "failed" },
        case.elapsed_secs
    );

    if let Some(description) = &case.case_description {
        section(out, "Description", description);
    }
    if !case.case_args.is_empty() {
        out.push_str("<div class=\"section-title\">Arguments</div>\n<table>\n");
        for (key, value) in &case.case_args {
            let value = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            let _ = writeln!(out, "<tr><th>{}</th><td>{}</td></tr>", esc(key), esc(&value));
        }
        out.push_str("</table>\n");
    }
    section(out, "User input", &case.case_content);
    section(
        out,
        if case.is_success() { "Output" } else { "Error" },
        &case.display_output(),
    );
    section(out, "Processed prompt", &case.resolved_prompt);

    if let Some(usage) = case.usage().filter(|u| !u.is_empty()) {
        out.push_str("<div class=\"section-title\">Tokens</div>\n<table>\n");
        for (key, value) in usage.iter() {
            let _ = writeln!(out, "<tr><th>{}</th><td>{value}</td></tr>", esc(key));
        }
        out.push_str("</table>\n");
    }
    out.push_str("</div>\n</details>\n");
}

impl ReportRenderer for HtmlReport {
    fn format(&self) -> ReportFormat {
        ReportFormat::Html
    }

    fn render(&self, run: &RunResult, output_dir: &Path, partial: bool) -> Result<PathBuf> {
        let at = Local::now();
        let html = Self::render_string(run, at, partial);
        write_report(output_dir, ReportFormat::Html, partial, at, &html)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::result::fixtures::{failure, success};
    use crate::domain::Usage;

    fn sample() -> RunResult {
        let mut run = RunResult::new();
        let mut ok = success(1, "A", 0, 1.5, Usage::new().with("total_tokens", 12));
        ok.case_description = Some("greets <politely>".into());
        ok.case_args.insert("lang".into(), "French".into());
        run.record(ok);
        run.record(failure(1, "A", 1, "provider returned 500: oops"));
        run
    }

    #[test]
    fn test_html_contains_cards_and_escapes_text() {
        let html = HtmlReport::render_string(&sample(), Local::now(), false);
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("round-1"));
        assert!(html.contains("openai / gpt-4o-mini"));
        assert!(html.contains("greets &lt;politely&gt;"));
        assert!(html.contains("<tr><th>lang</th><td>French</td></tr>"));
        assert!(html.contains("error: provider returned 500: oops"));
        assert!(html.contains("<tr><th>total_tokens</th><td>12</td></tr>"));
        assert!(!html.contains("Partial results"));
    }

    #[test]
    fn test_partial_report_has_banner_and_distinct_name() {
        let tmp = tempfile::tempdir().unwrap();
        let path = HtmlReport.render(&sample(), tmp.path(), true).unwrap();
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("test_results_"));
        assert!(name.ends_with("_partial.html"));
        let html = std::fs::read_to_string(path).unwrap();
        assert!(html.contains("Partial results"));
    }
}
