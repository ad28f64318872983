//! `{{param}}` substitution of prompt templates against case arguments.

use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde_json::Value;
use tracing::warn;

use crate::domain::{CaseDefinition, PromptConfig};

/// Template text after substitution, plus which placeholders were filled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPrompt {
    pub text: String,
    pub substituted: Vec<String>,
    pub missing: Vec<String>,
}

impl ResolvedPrompt {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

fn placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{(\w+)\}\}").unwrap_or_else(|e| unreachable!("{e}")))
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Substitute every `{{name}}` in the prompt template with `case.args[name]`.
///
/// Placeholders with no matching argument stay in the text and are reported
/// in [`ResolvedPrompt::missing`]. The legacy `translate` prompt also accepts
/// `targetLanguage` as `{{language}}` when the case carries no `args`.
pub fn resolve(prompt: &PromptConfig, case: &CaseDefinition) -> ResolvedPrompt {
    let legacy_language = (case.args.is_empty() && prompt.name == "translate")
        .then(|| case.target_language.clone())
        .flatten();

    let mut substituted = Vec::new();
    let mut missing = Vec::new();
    let text = placeholder()
        .replace_all(&prompt.template, |caps: &Captures<'_>| {
            let name = &caps[1];
            let value = case.args.get(name).map(render_value).or_else(|| {
                (name == "language")
                    .then(|| legacy_language.clone())
                    .flatten()
            });
            match value {
                Some(v) => {
                    if !substituted.iter().any(|s| s == name) {
                        substituted.push(name.to_string());
                    }
                    v
                }
                None => {
                    if !missing.iter().any(|s| s == name) {
                        missing.push(name.to_string());
                    }
                    caps[0].to_string()
                }
            }
        })
        .into_owned();

    if !missing.is_empty() {
        warn!(
            prompt = %prompt.name,
            case_id = %case.id,
            missing = ?missing,
            "template parameters missing from case args; sending unsubstituted"
        );
    }

    ResolvedPrompt {
        text,
        substituted,
        missing,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substitutes_string_and_non_string_args() {
        let prompt = PromptConfig::new("p", "openai", "m", "Write {{count}} lines in {{style}}.");
        let case = CaseDefinition::new("1", "c", "x")
            .with_arg("count", 3)
            .with_arg("style", "haiku");
        let resolved = resolve(&prompt, &case);
        assert_eq!(resolved.text, "Write 3 lines in haiku.");
        assert_eq!(resolved.substituted, vec!["count", "style"]);
        assert!(resolved.is_complete());
    }

    #[test]
    fn test_missing_args_are_left_in_place() {
        let prompt = PromptConfig::new("p", "openai", "m", "{{a}} and {{b}} and {{b}}");
        let case = CaseDefinition::new("1", "c", "x").with_arg("a", "A");
        let resolved = resolve(&prompt, &case);
        assert_eq!(resolved.text, "A and {{b}} and {{b}}");
        assert_eq!(resolved.missing, vec!["b"]);
    }

    #[test]
    fn test_legacy_target_language_for_translate_prompt() {
        let prompt = PromptConfig::new("translate", "openai", "m", "Translate into {{language}}");
        let mut case = CaseDefinition::new("1", "c", "hello");
        case.target_language = Some("Japanese".into());
        assert_eq!(resolve(&prompt, &case).text, "Translate into Japanese");

        let other = PromptConfig::new("other", "openai", "m", "Translate into {{language}}");
        assert_eq!(resolve(&other, &case).missing, vec!["language"]);
    }

    #[test]
    fn test_template_without_placeholders_is_unchanged() {
        let prompt = PromptConfig::new("p", "openai", "m", "You are helpful. {not a placeholder}");
        let resolved = resolve(&prompt, &CaseDefinition::new("1", "c", "x"));
        assert_eq!(resolved.text, "You are helpful. {not a placeholder}");
        assert!(resolved.substituted.is_empty());
    }
}
