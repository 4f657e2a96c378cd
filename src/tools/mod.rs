pub mod document_query;
pub mod note_sink;
pub mod registry;
pub mod tabular_query;

pub use document_query::DocumentQueryTool;
pub use note_sink::NoteSink;
pub use registry::ToolRegistry;
pub use tabular_query::TabularQueryTool;

use crate::dataset::QueryError;
use crate::llm::{LlmError, ToolSpec};

/// Name, description and single string parameter of a tool, as shown to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub parameter: &'static str,
}

impl ToolDescriptor {
    pub fn to_spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name.to_string(),
            description: self.description.to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    self.parameter: { "type": "string" }
                },
                "required": [self.parameter]
            }),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Model error: {0}")]
    Model(#[from] LlmError),
    #[error("Could not translate question into a table query: {0}")]
    Translation(String),
    #[error("Query failed: {0}")]
    Query(#[from] QueryError),
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),
}

/// Capability the orchestrator can invoke with a natural-language input.
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn descriptor(&self) -> &ToolDescriptor;
    async fn invoke(&self, input: &str) -> Result<String, ToolError>;
}

/// The closed set of tools this agent ships with.
pub enum RegisteredTool {
    NoteSink(NoteSink),
    TabularQuery(TabularQueryTool),
    DocumentQuery(DocumentQueryTool),
}

impl From<NoteSink> for RegisteredTool {
    fn from(tool: NoteSink) -> Self {
        Self::NoteSink(tool)
    }
}

impl From<TabularQueryTool> for RegisteredTool {
    fn from(tool: TabularQueryTool) -> Self {
        Self::TabularQuery(tool)
    }
}

impl From<DocumentQueryTool> for RegisteredTool {
    fn from(tool: DocumentQueryTool) -> Self {
        Self::DocumentQuery(tool)
    }
}

#[async_trait::async_trait]
impl Tool for RegisteredTool {
    fn descriptor(&self) -> &ToolDescriptor {
        match self {
            Self::NoteSink(t) => t.descriptor(),
            Self::TabularQuery(t) => t.descriptor(),
            Self::DocumentQuery(t) => t.descriptor(),
        }
    }

    async fn invoke(&self, input: &str) -> Result<String, ToolError> {
        match self {
            Self::NoteSink(t) => t.invoke(input).await,
            Self::TabularQuery(t) => t.invoke(input).await,
            Self::DocumentQuery(t) => t.invoke(input).await,
        }
    }
}

/// Pull the JSON object out of a model reply that may wrap it in prose or code fences.
pub(crate) fn extract_json_object(reply: &str) -> Option<&str> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    (end > start).then(|| &reply[start..=end])
}
