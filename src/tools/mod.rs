//! Tools the pipeline stages call, also invocable by name from the CLI.
//!
//! | name           | input                          | output                  |
//! |----------------|--------------------------------|-------------------------|
//! | `manual_qa`    | repair question                | grounded answer text    |
//! | `parts_search` | comma-separated parts list     | retailer → URL as JSON  |
//! | `manual_sql`   | read-only SQL statement        | CSV with header, or ""  |

pub mod manual_qa;
pub mod manual_sql;
pub mod parts;

use std::sync::Arc;

use thiserror::Error;

use crate::index::IndexError;
use crate::llm::LlmError;

pub use manual_qa::ManualQaTool;
pub use manual_sql::ManualSqlTool;
pub use parts::PartsSearchTool;

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("retrieval failed: {0}")]
    Index(#[from] IndexError),

    #[error("generation failed: {0}")]
    Generation(#[from] LlmError),

    #[error("SQL lookup failed: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("statement rejected: {0}")]
    Rejected(String),

    #[error("could not render tool output: {0}")]
    Format(String),

    #[error("unknown tool: {0}")]
    Unknown(String),
}

/// A named capability with text input and text output.
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn call(&self, input: &str) -> Result<String, ToolError>;
}

/// Tools registered for name-based dispatch.
#[derive(Clone, Default)]
pub struct ToolBox {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolBox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) -> &mut Self {
        self.tools.push(tool);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    pub fn call(&self, name: &str, input: &str) -> Result<String, ToolError> {
        self.get(name)
            .ok_or_else(|| ToolError::Unknown(name.to_string()))?
            .call(input)
    }

    /// `(name, description)` for every registered tool.
    pub fn describe(&self) -> Vec<(&'static str, &'static str)> {
        self.tools
            .iter()
            .map(|t| (t.name(), t.description()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toolbox_dispatches_by_name() {
        let mut tools = ToolBox::new();
        tools.register(Arc::new(PartsSearchTool));

        let out = tools.call("parts_search", "spark plugs").unwrap();
        assert!(out.contains("spark+plugs"));
        assert_eq!(tools.describe().len(), 1);
    }

    #[test]
    fn test_toolbox_unknown_tool() {
        let tools = ToolBox::new();
        let err = tools.call("scraper", "x").unwrap_err();
        assert_eq!(err.to_string(), "unknown tool: scraper");
    }
}
