use std::sync::Arc;

use crate::documents::{DocumentChunk, DocumentIndex};
use crate::llm::{Embedder, LanguageModel};
use super::{Tool, ToolDescriptor, ToolError};

const DESCRIPTOR: ToolDescriptor = ToolDescriptor {
    name: "canada_data",
    description: "Provides detailed information about Canada",
    parameter: "input",
};

/// Answers questions from the chunks of a document index closest to the question.
pub struct DocumentQueryTool {
    index: DocumentIndex,
    embedder: Arc<dyn Embedder>,
    model: Arc<dyn LanguageModel>,
    temperature: f32,
    top_k: usize,
}

impl DocumentQueryTool {
    pub fn new(
        index: DocumentIndex,
        embedder: Arc<dyn Embedder>,
        model: Arc<dyn LanguageModel>,
        temperature: f32,
        top_k: usize,
    ) -> Self {
        Self {
            index,
            embedder,
            model,
            temperature,
            top_k,
        }
    }

    fn system_prompt() -> &'static str {
        "You are an expert Q&A system. Always answer the query using the provided context \
        information, and not prior knowledge. Never directly reference the given context \
        in your answer."
    }

    fn user_prompt(question: &str, chunks: &[&DocumentChunk]) -> String {
        let context = chunks
            .iter()
            .map(|c| format!("source: {}\n\n{}", c.source, c.text))
            .collect::<Vec<_>>()
            .join("\n\n");

        format!(
            "Context information is below.\n\
            ---------------------\n\
            {}\n\
            ---------------------\n\
            Given the context information and not prior knowledge, answer the query.\n\
            Query: {}\n\
            Answer: ",
            context, question
        )
    }
}

#[async_trait::async_trait]
impl Tool for DocumentQueryTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &DESCRIPTOR
    }

    async fn invoke(&self, question: &str) -> Result<String, ToolError> {
        let chunks = self
            .index
            .retrieve(question, self.embedder.as_ref(), self.top_k)
            .await?;
        log::info!("DocumentQuery: retrieved {} chunk(s)", chunks.len());

        let answer = self
            .model
            .complete(Self::system_prompt(), &Self::user_prompt(question, &chunks), self.temperature)
            .await?;
        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::Document;
    use crate::llm::testing::{BagOfLettersEmbedder, ScriptedModel};
    use crate::llm::{AssistantReply, ChatMessage};

    #[tokio::test]
    async fn test_answer_uses_retrieved_context() {
        let embedder = Arc::new(BagOfLettersEmbedder::new());
        let docs = vec![Document {
            source: "canada.txt".to_string(),
            text: "Ottawa capital city\n\nzzz zzzz zz".to_string(),
        }];
        let index = DocumentIndex::build(&docs, embedder.as_ref(), 20).await.unwrap();
        let model = Arc::new(ScriptedModel::new(vec![AssistantReply::text("Ottawa")]));

        let tool = DocumentQueryTool::new(index, embedder, model.clone(), 0.0, 1);
        let answer = tool.invoke("which city is the capital").await.unwrap();
        assert_eq!(answer, "Ottawa");

        let requests = model.requests.lock().unwrap();
        match &requests[0].messages[1] {
            ChatMessage::User { content } => {
                assert!(content.contains("Ottawa capital city"));
                assert!(!content.contains("zzz"));
                assert!(content.contains("Query: which city is the capital"));
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_model_failure_propagates() {
        let embedder = Arc::new(BagOfLettersEmbedder::new());
        let docs = vec![Document {
            source: "canada.txt".to_string(),
            text: "Maple".to_string(),
        }];
        let index = DocumentIndex::build(&docs, embedder.as_ref(), 100).await.unwrap();
        let model = Arc::new(ScriptedModel::new(vec![]));

        let tool = DocumentQueryTool::new(index, embedder, model, 0.0, 2);
        let err = tool.invoke("anything").await.unwrap_err();
        assert!(matches!(err, ToolError::Model(_)));
    }
}
