use std::sync::Arc;

use tracing::debug;

use super::{Tool, ToolError};
use crate::index::{ManualIndex, RetrievedChunk};
use crate::llm::{CompletionRequest, LanguageModel};

pub const DEFAULT_QA_TEMPLATE: &str = "Use the following excerpts from vehicle repair manuals to answer the \
question at the end. Answer only from the excerpts. If they do not contain the answer, say that \
the manuals do not cover it; do not make one up.\n\n{context}\n\nQuestion: {question}\nHelpful Answer:";

/// Retrieval-augmented answers over the manual index.
pub struct ManualQaTool {
    index: Arc<ManualIndex>,
    llm: Arc<dyn LanguageModel>,
    top_k: usize,
    temperature: f32,
    template: String,
}

/// Joins retrieved chunks into a labelled context block.
pub fn format_context(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .map(|c| match c.page {
            Some(page) => format!("[{} p.{page}]\n{}", c.source, c.text.trim()),
            None => format!("[{}]\n{}", c.source, c.text.trim()),
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

impl ManualQaTool {
    pub fn new(index: Arc<ManualIndex>, llm: Arc<dyn LanguageModel>, top_k: usize) -> Self {
        Self {
            index,
            llm,
            top_k,
            temperature: 0.0,
            template: DEFAULT_QA_TEMPLATE.to_string(),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Replaces the prompt; `{context}` and `{question}` are substituted.
    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    pub fn answer(&self, query: &str) -> Result<String, ToolError> {
        let chunks = self.index.find_relevant(query, self.top_k)?;
        debug!(chunks = chunks.len(), "manual_qa context retrieved");

        let prompt = self
            .template
            .replace("{context}", &format_context(&chunks))
            .replace("{question}", query);
        let answer = self.llm.complete(&CompletionRequest {
            system: None,
            prompt: &prompt,
            temperature: self.temperature,
        })?;
        Ok(answer.trim().to_string())
    }
}

impl Tool for ManualQaTool {
    fn name(&self) -> &'static str {
        "manual_qa"
    }

    fn description(&self) -> &'static str {
        "A repair question → precise manual lookup + QA answer"
    }

    fn call(&self, input: &str) -> Result<String, ToolError> {
        self.answer(input)
    }
}
