use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A message in a chat conversation, serialized in the OpenAI wire shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum ChatMessage {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        #[serde(default)]
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    Tool {
        tool_call_id: String,
        content: String,
    },
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::System { content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::User { content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::Assistant {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }
}

/// A function call requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default = "function_kind")]
    pub kind: String,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded arguments, as produced by the model.
    pub arguments: String,
}

fn function_kind() -> String {
    "function".to_string()
}

impl ToolCall {
    #[cfg(test)]
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            kind: function_kind(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.to_string(),
            },
        }
    }
}

/// A function the model may call.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Parameters for a chat completion.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolSpec>,
    pub temperature: f32,
}

/// The assistant turn returned by the model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssistantReply {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

impl AssistantReply {
    #[cfg(test)]
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn into_message(self) -> ChatMessage {
        ChatMessage::Assistant {
            content: self.content,
            tool_calls: self.tool_calls,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },
    #[error("Network error: {0}")]
    Network(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Empty response from model")]
    EmptyResponse,
}

/// Chat-capable language model.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn chat(&self, request: ChatRequest) -> Result<AssistantReply, LlmError>;

    /// Single-shot completion without tools, returning the text content.
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        temperature: f32,
    ) -> Result<String, LlmError> {
        let reply = self
            .chat(ChatRequest {
                messages: vec![ChatMessage::system(system_prompt), ChatMessage::user(user_prompt)],
                tools: Vec::new(),
                temperature,
            })
            .await?;

        reply.content.ok_or(LlmError::EmptyResponse)
    }
}

/// Text embedding model.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn model_name(&self) -> &str;
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, LlmError>;
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assistant_message_wire_shape() {
        let msg = AssistantReply {
            content: None,
            tool_calls: vec![ToolCall::new("call_1", "note_saver", serde_json::json!({"note": "hi"}))],
        }
        .into_message();

        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "assistant");
        assert_eq!(json["tool_calls"][0]["type"], "function");
        assert_eq!(json["tool_calls"][0]["function"]["name"], "note_saver");
        assert_eq!(json["tool_calls"][0]["function"]["arguments"], r#"{"note":"hi"}"#);
    }

    #[test]
    fn test_plain_assistant_omits_tool_calls() {
        let json = serde_json::to_value(ChatMessage::assistant("hello")).unwrap();
        assert!(json.get("tool_calls").is_none());
        assert_eq!(json["content"], "hello");
    }

    #[test]
    fn test_parse_response_message_with_null_content() {
        let raw = r#"{
            "role": "assistant",
            "content": null,
            "tool_calls": [{
                "id": "call_abc",
                "type": "function",
                "function": { "name": "population_data", "arguments": "{\"input\":\"total\"}" }
            }]
        }"#;
        let msg: ChatMessage = serde_json::from_str(raw).unwrap();
        match msg {
            ChatMessage::Assistant { content, tool_calls } => {
                assert!(content.is_none());
                assert_eq!(tool_calls[0].function.name, "population_data");
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }
}
