//! The fixed repair-assistant pipeline:
//! `parse → locate → diagnose → enrich → format`.
//!
//! Every stage receives the previous stage's output verbatim. Stages cannot
//! be skipped or reordered.

pub mod extract;
pub mod prompts;

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::llm::{CompletionRequest, LanguageModel, LlmError};
use crate::tools::{ManualQaTool, ManualSqlTool, PartsSearchTool, ToolError};

pub use extract::{ExtractError, PipelineResult};
pub use prompts::PromptSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Parse,
    Locate,
    Diagnose,
    Enrich,
    Format,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Parse,
        Stage::Locate,
        Stage::Diagnose,
        Stage::Enrich,
        Stage::Format,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Stage::Parse => "parse",
            Stage::Locate => "locate",
            Stage::Diagnose => "diagnose",
            Stage::Enrich => "enrich",
            Stage::Format => "format",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Query is required")]
    EmptyQuery,

    #[error("{stage} stage failed: {source}")]
    Generation {
        stage: Stage,
        #[source]
        source: LlmError,
    },

    #[error("{stage} stage failed: {source}")]
    Tool {
        stage: Stage,
        #[source]
        source: ToolError,
    },

    #[error(transparent)]
    Extraction(#[from] ExtractError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct StageOutput {
    pub stage: Stage,
    pub output: String,
}

pub struct Pipeline {
    llm: Arc<dyn LanguageModel>,
    manual_qa: Arc<ManualQaTool>,
    manual_sql: Option<Arc<ManualSqlTool>>,
    prompts: PromptSet,
    temperature: f32,
}

impl Pipeline {
    pub fn new(llm: Arc<dyn LanguageModel>, manual_qa: Arc<ManualQaTool>) -> Self {
        Self {
            llm,
            manual_qa,
            manual_sql: None,
            prompts: PromptSet::default(),
            temperature: 0.0,
        }
    }

    pub fn with_prompts(mut self, prompts: PromptSet) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Enables the manifest lookup in the locate stage.
    pub fn with_sql_lookup(mut self, tool: Arc<ManualSqlTool>) -> Self {
        self.manual_sql = Some(tool);
        self
    }

    /// Runs the pipeline and extracts the structured result.
    pub fn run(&self, query: &str) -> Result<PipelineResult, PipelineError> {
        let transcript = self.run_stages(query)?;
        Self::result_from(&transcript)
    }

    /// Extracts the result from a finished transcript and rebuilds its links.
    pub fn result_from(transcript: &[StageOutput]) -> Result<PipelineResult, PipelineError> {
        let last = transcript
            .last()
            .map(|s| s.output.as_str())
            .unwrap_or_default();

        let mut result = extract::parse_result(last).inspect_err(|e| {
            warn!("result extraction failed: {e}");
        })?;
        if !result.parts.is_empty() {
            result.links = PartsSearchTool::urls_for(&result.parts.join(","));
        }
        Ok(result)
    }

    /// Runs every stage and returns their outputs in order.
    pub fn run_stages(&self, query: &str) -> Result<Vec<StageOutput>, PipelineError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(PipelineError::EmptyQuery);
        }

        let mut transcript = Vec::with_capacity(Stage::ALL.len());
        let mut input = query.to_string();
        for stage in Stage::ALL {
            let output = self.run_stage(stage, &input)?;
            info!(stage = %stage, chars = output.len(), "stage complete");
            transcript.push(StageOutput {
                stage,
                output: output.clone(),
            });
            input = output;
        }
        Ok(transcript)
    }

    fn run_stage(&self, stage: Stage, input: &str) -> Result<String, PipelineError> {
        match stage {
            Stage::Parse => self.generate(stage, &self.prompts.parse, input),
            Stage::Locate => self.locate(input),
            Stage::Diagnose => self.generate(stage, &self.prompts.diagnose, input),
            Stage::Enrich => self.enrich(input),
            Stage::Format => self.generate(stage, &self.prompts.format, input),
        }
    }

    fn generate(&self, stage: Stage, template: &str, input: &str) -> Result<String, PipelineError> {
        let prompt = prompts::render(template, &[("input", input)]);
        let text = self
            .llm
            .complete(&CompletionRequest {
                system: Some(&self.prompts.system),
                prompt: &prompt,
                temperature: self.temperature,
            })
            .map_err(|source| PipelineError::Generation { stage, source })?;
        Ok(text.trim().to_string())
    }

    fn locate(&self, summary: &str) -> Result<String, PipelineError> {
        let guidance = self
            .manual_qa
            .answer(summary)
            .map_err(|source| PipelineError::Tool {
                stage: Stage::Locate,
                source,
            })?;

        let mut output = format!("Problem summary:\n{summary}\n\nManual guidance:\n{guidance}");
        if let Some(rows) = self.manifest_lookup(summary) {
            output.push_str("\n\nManual bundle:\n");
            output.push_str(rows.trim_end());
        }
        Ok(output)
    }

    /// Optional SQL lookup; failures are logged and ignored.
    fn manifest_lookup(&self, summary: &str) -> Option<String> {
        let tool = self.manual_sql.as_ref()?;
        let sql = match self.generate(Stage::Locate, &self.prompts.sql_lookup, summary) {
            Ok(sql) => sql,
            Err(e) => {
                warn!("manifest lookup skipped: {e}");
                return None;
            }
        };
        match tool.lookup(extract::strip_code_fence(&sql)) {
            Ok(rows) if rows.is_empty() => None,
            Ok(rows) => Some(rows),
            Err(e) => {
                warn!("manifest lookup failed: {e}");
                None
            }
        }
    }

    fn enrich(&self, diagnosis: &str) -> Result<String, PipelineError> {
        let reply = self.generate(Stage::Enrich, &self.prompts.enrich, diagnosis)?;
        let parts = parts_from_reply(&reply).join(", ");
        let links = PartsSearchTool::urls_for(&parts);

        let mut output = format!("{diagnosis}\n\nParts needed: {parts}\n\nShopping links:");
        for (retailer, url) in &links {
            output.push_str(&format!("\n- {retailer}: {url}"));
        }
        Ok(output)
    }
}

/// Parts named in a comma-separated or one-per-line reply.
fn parts_from_reply(reply: &str) -> Vec<&str> {
    extract::strip_code_fence(reply)
        .split([',', '\n'])
        .map(strip_list_marker)
        .filter(|p| !p.is_empty())
        .collect()
}

/// Drops a leading `-`, `*`, `•`, `1.` or `1)` marker.
fn strip_list_marker(item: &str) -> &str {
    let item = item.trim().trim_start_matches(['-', '*', '•']).trim_start();
    let digits = item.len() - item.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    if digits > 0 {
        let mut rest = item[digits..].chars();
        if matches!(rest.next(), Some('.' | ')'))
            && rest.next().is_none_or(char::is_whitespace)
        {
            return item[digits + 1..].trim();
        }
    }
    item.trim()
}
