use anyhow::Result;

use crate::llm::ToolSpec;
use super::{RegisteredTool, Tool, ToolDescriptor, ToolError};

/// Ordered, name-unique set of tools. Fixed after construction.
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
}

impl ToolRegistry {
    pub fn new(tools: Vec<RegisteredTool>) -> Result<Self> {
        for (i, tool) in tools.iter().enumerate() {
            let name = tool.descriptor().name;
            if tools[..i].iter().any(|t| t.descriptor().name == name) {
                anyhow::bail!("Duplicate tool name: {}", name);
            }
        }
        Ok(Self { tools })
    }

    /// Descriptors in registration order.
    pub fn list(&self) -> Vec<&ToolDescriptor> {
        self.tools.iter().map(|t| t.descriptor()).collect()
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|t| t.descriptor().to_spec()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredTool> {
        self.tools.iter().find(|t| t.descriptor().name == name)
    }

    /// Invoke `tool` with JSON-encoded arguments from the model.
    pub async fn invoke(tool: &RegisteredTool, arguments: &str) -> Result<String, ToolError> {
        let parameter = tool.descriptor().parameter;
        let args: serde_json::Value = serde_json::from_str(arguments)
            .map_err(|e| ToolError::InvalidArguments(format!("{}: {}", arguments, e)))?;

        let input = match args.get(parameter) {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => {
                return Err(ToolError::InvalidArguments(format!(
                    "missing \"{}\" in {}",
                    parameter, arguments
                )))
            }
        };

        tool.invoke(&input).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::NoteSink;

    #[test]
    fn test_duplicate_names_rejected() {
        let result = ToolRegistry::new(vec![
            NoteSink::new("a.txt").into(),
            NoteSink::new("b.txt").into(),
        ]);
        let err = result.err().unwrap();
        assert!(err.to_string().contains("note_saver"));
    }

    #[test]
    fn test_list_and_lookup() {
        let registry = ToolRegistry::new(vec![NoteSink::new("notes.txt").into()]).unwrap();
        let names: Vec<&str> = registry.list().iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["note_saver"]);
        assert!(registry.get("note_saver").is_some());
        assert!(registry.get("population_data").is_none());
        assert_eq!(registry.specs()[0].parameters["required"][0], "note");
    }

    #[tokio::test]
    async fn test_invoke_extracts_declared_parameter() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        let registry = ToolRegistry::new(vec![NoteSink::new(&path).into()]).unwrap();
        let tool = registry.get("note_saver").unwrap();

        let out = ToolRegistry::invoke(tool, r#"{"note": "remember Ottawa"}"#).await.unwrap();
        assert_eq!(out, "note saved");
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "remember Ottawa\n");
    }

    #[tokio::test]
    async fn test_invoke_rejects_bad_arguments() {
        let registry = ToolRegistry::new(vec![NoteSink::new("unused.txt").into()]).unwrap();
        let tool = registry.get("note_saver").unwrap();

        let err = ToolRegistry::invoke(tool, r#"{"text": "x"}"#).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
        let err = ToolRegistry::invoke(tool, "not json").await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
