//! Language-model clients used by the pipeline stages and the manual Q&A tool.

pub mod mock;
pub mod openai;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("generation request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("language model returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("language model response had no text content")]
    EmptyResponse,

    #[error("invalid language model configuration: {0}")]
    Config(String),
}

/// One generation call.
#[derive(Debug, Clone, Copy)]
pub struct CompletionRequest<'a> {
    pub system: Option<&'a str>,
    pub prompt: &'a str,
    pub temperature: f32,
}

/// Trait implemented by concrete chat model backends.
pub trait LanguageModel: Send + Sync {
    fn complete(&self, request: &CompletionRequest<'_>) -> Result<String, LlmError>;
}
