//! Loading prompt configurations and case files from disk.
//!
//! The prompts file must parse; individual case files that fail to read or
//! parse are warned about and skipped, so one bad file never blocks a run.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::domain::{BenchError, CaseDefinition, CaseFile, PromptConfig, PromptFile, Result};

/// Read-only view of everything the engine can select from.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    prompts: Vec<PromptConfig>,
    cases: HashMap<String, Vec<CaseDefinition>>,
}

impl Catalog {
    /// Build a catalog, keeping the first prompt of each name.
    pub fn new(prompts: Vec<PromptConfig>, cases: HashMap<String, Vec<CaseDefinition>>) -> Self {
        let mut seen = HashSet::new();
        let prompts = prompts
            .into_iter()
            .filter(|p| {
                let fresh = seen.insert(p.name.clone());
                if !fresh {
                    warn!(prompt = %p.name, "duplicate prompt name; keeping the first definition");
                }
                fresh
            })
            .collect();
        Self { prompts, cases }
    }

    /// Load the prompts file and every `*.json` case file under `cases_dir`.
    pub fn load(prompts_path: &Path, cases_dir: &Path) -> Result<Self> {
        let prompts = load_prompts(prompts_path)?;
        let cases = load_cases(cases_dir)?;
        Ok(Self::new(prompts, cases))
    }

    pub fn prompts(&self) -> &[PromptConfig] {
        &self.prompts
    }

    pub fn prompt(&self, name: &str) -> Option<&PromptConfig> {
        self.prompts.iter().find(|p| p.name == name)
    }

    pub fn prompt_names(&self) -> Vec<String> {
        self.prompts.iter().map(|p| p.name.clone()).collect()
    }

    pub fn cases_for(&self, prompt: &str) -> &[CaseDefinition] {
        self.cases.get(prompt).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Parse the prompts file (`{ "prompts": [...] }`).
pub fn load_prompts(path: &Path) -> Result<Vec<PromptConfig>> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        BenchError::InvalidConfig(format!("cannot read prompts file {}: {e}", path.display()))
    })?;
    let file: PromptFile = serde_json::from_str(&raw)?;
    debug!(path = %path.display(), prompts = file.prompts.len(), "loaded prompts");
    Ok(file.prompts)
}

/// Load every `*.json` case file in `dir`, keyed by the file's `caseName`.
///
/// Files are visited in sorted order. When two files claim the same
/// `caseName`, the later file replaces the earlier one.
pub fn load_cases(dir: &Path) -> Result<HashMap<String, Vec<CaseDefinition>>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|e| {
            BenchError::InvalidConfig(format!("cannot read cases directory {}: {e}", dir.display()))
        })?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();

    let mut cases: HashMap<String, Vec<CaseDefinition>> = HashMap::new();
    for path in paths {
        match read_case_file(&path) {
            Ok(file) if file.case_name.is_empty() => {
                warn!(path = %path.display(), "case file has no caseName; skipping");
            }
            Ok(file) => {
                debug!(path = %path.display(), prompt = %file.case_name, cases = file.cases.len(), "loaded case file");
                if let Some(previous) = cases.insert(file.case_name.clone(), file.cases) {
                    warn!(
                        path = %path.display(),
                        prompt = %file.case_name,
                        replaced = previous.len(),
                        "case file replaces an earlier file with the same caseName"
                    );
                }
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load case file; skipping");
            }
        }
    }
    Ok(cases)
}

fn read_case_file(path: &Path) -> Result<CaseFile> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, content: &str) {
        std::fs::write(dir.join(name), content).unwrap();
    }

    #[test]
    fn test_load_catalog_from_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let prompts = tmp.path().join("prompts.json");
        std::fs::write(
            &prompts,
            r#"{"prompts": [
                {"name": "translate", "vendor": "openai", "model": "gpt-4o", "prompt": "To {{language}}"},
                {"name": "summarize", "vendor": "anthropic", "model": "claude-3-5-haiku", "prompt": "Summarize"}
            ]}"#,
        )
        .unwrap();
        let cases_dir = tmp.path().join("cases");
        std::fs::create_dir(&cases_dir).unwrap();
        write(
            &cases_dir,
            "translate.json",
            r#"{"caseName": "translate", "cases": [{"id": "1", "name": "hi", "content": "hello", "args": {"language": "French"}}]}"#,
        );
        write(&cases_dir, "broken.json", "{ not json");
        write(&cases_dir, "nameless.json", r#"{"cases": []}"#);
        write(&cases_dir, "notes.txt", "ignored");

        let catalog = Catalog::load(&prompts, &cases_dir).unwrap();
        assert_eq!(catalog.prompt_names(), vec!["translate", "summarize"]);
        assert_eq!(catalog.cases_for("translate").len(), 1);
        assert!(catalog.cases_for("summarize").is_empty());
        assert_eq!(catalog.prompt("summarize").unwrap().vendor, "anthropic");
    }

    #[test]
    fn test_later_case_file_with_same_name_wins() {
        let tmp = tempfile::tempdir().unwrap();
        write(
            tmp.path(),
            "a.json",
            r#"{"caseName": "p", "cases": [{"id": "1", "name": "one", "content": "x"}]}"#,
        );
        write(
            tmp.path(),
            "b.json",
            r#"{"caseName": "p", "cases": [{"id": "2", "name": "two", "content": "y"}]}"#,
        );
        let cases = load_cases(tmp.path()).unwrap();
        let ids: Vec<&str> = cases["p"].iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["2"]);
    }

    #[test]
    fn test_missing_prompts_file_is_config_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = load_prompts(&tmp.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, BenchError::InvalidConfig(_)));
    }

    #[test]
    fn test_duplicate_prompt_names_keep_first() {
        let catalog = Catalog::new(
            vec![
                PromptConfig::new("a", "openai", "m1", "first"),
                PromptConfig::new("a", "openai", "m2", "second"),
            ],
            HashMap::new(),
        );
        assert_eq!(catalog.prompts().len(), 1);
        assert_eq!(catalog.prompt("a").unwrap().template, "first");
    }
}
