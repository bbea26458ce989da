use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::info;

use crate::tools::manual_qa::DEFAULT_QA_TEMPLATE;

/// Prompt templates for every stage.
///
/// A YAML override file may set any subset of the fields; the rest keep
/// their built-in text.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PromptSet {
    pub system: String,
    pub parse: String,
    pub manual_qa: String,
    pub sql_lookup: String,
    pub diagnose: String,
    pub enrich: String,
    pub format: String,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            system: "You are an experienced automotive technician helping a car owner \
                     diagnose and repair their vehicle."
                .to_string(),
            parse: "A driver describes a problem with their vehicle:\n\n{input}\n\n\
                    Rewrite it as a concise summary for a mechanic. Include the vehicle \
                    (make, model and year when given) and the symptoms with when they occur. \
                    Reply with the summary only."
                .to_string(),
            manual_qa: DEFAULT_QA_TEMPLATE.to_string(),
            sql_lookup: "Write one SQLite SELECT statement against the table \
                         manifest(make TEXT, model TEXT, year TEXT, bundle_url TEXT) that finds \
                         the repair manual bundle for the vehicle below. Reply with the SQL only.\n\n\
                         {input}"
                .to_string(),
            diagnose: "{input}\n\nUsing the problem summary and the manual guidance above, give \
                       the most likely diagnosis, a step-by-step repair procedure with safety \
                       notes, and an estimated repair cost in USD for parts and labor."
                .to_string(),
            enrich: "{input}\n\nList the replacement parts and tools needed for this repair \
                     as one comma-separated line. Reply with the list only."
                .to_string(),
            format: "{input}\n\nFormat the repair information above as a single JSON object \
                     inside a ```json fenced code block with these keys:\n\
                     \"diagnosis\": string, the likely cause of the problem\n\
                     \"cost\": string, the estimated cost\n\
                     \"parts\": array of strings, the parts and tools needed\n\
                     \"links\": object mapping retailer name to shopping URL\n\
                     \"guide\": string, a print-ready numbered repair guide\n\
                     Output nothing after the code block."
                .to_string(),
        }
    }
}

impl PromptSet {
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Loads overrides from `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read prompts: {}", path.display()))?;
        let prompts = Self::from_yaml(&data)
            .with_context(|| format!("invalid prompts file: {}", path.display()))?;
        info!("Loaded prompt overrides from {}", path.display());
        Ok(prompts)
    }
}

/// Substitutes `{name}` placeholders. Unknown placeholders are left as-is.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    vars.iter().fold(template.to_string(), |acc, (name, value)| {
        acc.replace(&format!("{{{name}}}"), value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_substitutes_placeholders() {
        let out = render("{input} / {context} / {other}", &[("input", "A"), ("context", "B")]);
        assert_eq!(out, "A / B / {other}");
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let prompts = PromptSet::from_yaml("parse: |\n  Summarize: {input}\n").unwrap();
        assert_eq!(prompts.parse, "Summarize: {input}\n");
        assert_eq!(prompts.format, PromptSet::default().format);
    }

    #[test]
    fn test_defaults_carry_placeholders() {
        let p = PromptSet::default();
        for template in [&p.parse, &p.sql_lookup, &p.diagnose, &p.enrich, &p.format] {
            assert!(template.contains("{input}"));
        }
        assert!(p.manual_qa.contains("{context}"));
        assert!(p.manual_qa.contains("{question}"));
    }

    #[test]
    fn test_load_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(PromptSet::load(&dir.path().join("prompts.yaml")).is_err());
    }
}
