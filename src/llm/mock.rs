/// Scripted language model for tests and dry runs.
use std::collections::VecDeque;
use std::sync::Mutex;

use super::{CompletionRequest, LanguageModel, LlmError};

type Responder = Box<dyn Fn(&CompletionRequest<'_>) -> Result<String, LlmError> + Send + Sync>;

enum Script {
    Queue(Mutex<VecDeque<String>>),
    Respond(Responder),
}

/// A [`LanguageModel`] that answers from a fixed queue or a closure and
/// records every prompt it receives.
pub struct MockModel {
    script: Script,
    prompts: Mutex<Vec<String>>,
}

impl MockModel {
    /// Answers calls with `responses` in order; fails once they run out.
    pub fn scripted<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            script: Script::Queue(Mutex::new(responses.into_iter().map(Into::into).collect())),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Answers every call through `respond`.
    pub fn responding<F>(respond: F) -> Self
    where
        F: Fn(&CompletionRequest<'_>) -> Result<String, LlmError> + Send + Sync + 'static,
    {
        Self {
            script: Script::Respond(Box::new(respond)),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Prompts received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().map(|p| p.len()).unwrap_or_default()
    }
}

impl LanguageModel for MockModel {
    fn complete(&self, request: &CompletionRequest<'_>) -> Result<String, LlmError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(request.prompt.to_string());
        }
        match &self.script {
            Script::Queue(queue) => queue
                .lock()
                .ok()
                .and_then(|mut q| q.pop_front())
                .ok_or(LlmError::EmptyResponse),
            Script::Respond(respond) => respond(request),
        }
    }
}
