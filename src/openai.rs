use async_trait::async_trait;

use crate::llm::{AssistantReply, ChatMessage, ChatRequest, Embedder, LanguageModel, LlmError, ToolSpec};

/// Inputs per embeddings request.
const EMBEDDING_BATCH_SIZE: usize = 64;

/// Shared HTTP client for OpenAI-compatible chat and embedding APIs.
pub struct OpenAiClient {
    pub endpoint: String,
    pub model: String,
    pub embedding_model: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(endpoint: String, model: String, embedding_model: String, api_key: String) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model,
            embedding_model,
            api_key,
            client: reqwest::Client::new(),
        }
    }

    fn chat_body(&self, request: &ChatRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": request.messages,
            "temperature": request.temperature,
        });

        if !request.tools.is_empty() {
            body["tools"] = request.tools.iter().map(tool_json).collect();
        }

        body
    }

    async fn post(&self, path: &str, body: &serde_json::Value) -> Result<serde_json::Value, LlmError> {
        let response = self
            .client
            .post(format!("{}/{}", self.endpoint, path))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
            let text = text.chars().take(300).collect::<String>();
            return Err(LlmError::Api { status: status.as_u16(), body: text });
        }

        response
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))
    }
}

fn tool_json(spec: &ToolSpec) -> serde_json::Value {
    serde_json::json!({
        "type": "function",
        "function": {
            "name": spec.name,
            "description": spec.description,
            "parameters": spec.parameters,
        }
    })
}

/// Extract the assistant turn from a `/chat/completions` response body.
fn parse_chat_response(json: serde_json::Value) -> Result<AssistantReply, LlmError> {
    let message = json
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .cloned()
        .ok_or(LlmError::EmptyResponse)?;

    match serde_json::from_value::<ChatMessage>(message) {
        Ok(ChatMessage::Assistant { content, tool_calls }) => Ok(AssistantReply { content, tool_calls }),
        Ok(other) => Err(LlmError::Parse(format!("unexpected message role: {:?}", other))),
        Err(e) => Err(LlmError::Parse(e.to_string())),
    }
}

/// Extract vectors from an `/embeddings` response body, ordered by `index`.
fn parse_embedding_response(json: serde_json::Value) -> Result<Vec<Vec<f32>>, LlmError> {
    #[derive(serde::Deserialize)]
    struct Item {
        index: usize,
        embedding: Vec<f32>,
    }
    #[derive(serde::Deserialize)]
    struct Body {
        data: Vec<Item>,
    }

    let mut body: Body = serde_json::from_value(json).map_err(|e| LlmError::Parse(e.to_string()))?;
    body.data.sort_by_key(|item| item.index);
    Ok(body.data.into_iter().map(|item| item.embedding).collect())
}

#[async_trait]
impl LanguageModel for OpenAiClient {
    async fn chat(&self, request: ChatRequest) -> Result<AssistantReply, LlmError> {
        log::debug!(
            "OpenAI chat request: model={} messages={} tools={}",
            self.model,
            request.messages.len(),
            request.tools.len()
        );

        let json = self.post("chat/completions", &self.chat_body(&request)).await?;
        parse_chat_response(json)
    }
}

#[async_trait]
impl Embedder for OpenAiClient {
    fn model_name(&self) -> &str {
        &self.embedding_model
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        let mut vectors = Vec::with_capacity(inputs.len());

        for batch in inputs.chunks(EMBEDDING_BATCH_SIZE) {
            let body = serde_json::json!({
                "model": self.embedding_model,
                "input": batch,
            });
            let json = self.post("embeddings", &body).await?;
            let batch_vectors = parse_embedding_response(json)?;

            if batch_vectors.len() != batch.len() {
                return Err(LlmError::Parse(format!(
                    "expected {} embeddings, got {}",
                    batch.len(),
                    batch_vectors.len()
                )));
            }
            vectors.extend(batch_vectors);
        }

        log::debug!("OpenAI embeddings: {} input(s) embedded", inputs.len());
        Ok(vectors)
    }
}
