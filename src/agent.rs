use std::collections::VecDeque;
use std::sync::Arc;

use crate::llm::{AssistantReply, ChatMessage, ChatRequest, LanguageModel, LlmError};
use crate::tools::{ToolError, ToolRegistry};

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("{0}")]
    Model(#[from] LlmError),
    #[error("Tool {name} failed: {source}")]
    Tool {
        name: String,
        #[source]
        source: ToolError,
    },
    #[error("Model requested unknown tool: {0}")]
    UnknownTool(String),
    #[error("Reached max iterations ({0}) without a final answer")]
    MaxIterations(usize),
}

/// Anything that turns a prompt into an answer for the interactive shell.
#[async_trait::async_trait]
pub trait Responder {
    async fn query(&mut self, prompt: &str) -> Result<String, AgentError>;
}

/// Routes prompts through the model, invoking registry tools when it asks for them.
pub struct Orchestrator {
    model: Arc<dyn LanguageModel>,
    registry: ToolRegistry,
    context: String,
    temperature: f32,
    max_iterations: usize,
    max_history_turns: usize,
    /// Completed (user, answer) turns, oldest first.
    history: VecDeque<(String, String)>,
}

impl Orchestrator {
    pub fn new(model: Arc<dyn LanguageModel>, registry: ToolRegistry, context: impl Into<String>) -> Self {
        Self {
            model,
            registry,
            context: context.into(),
            temperature: 0.1,
            max_iterations: 10,
            max_history_turns: 20,
            history: VecDeque::new(),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max.max(1);
        self
    }

    pub fn with_max_history_turns(mut self, max: usize) -> Self {
        self.max_history_turns = max;
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    fn system_prompt(&self) -> String {
        let mut prompt = String::new();
        prompt.push_str(self.context.trim());
        prompt.push_str("\n\nYou have access to the following tools:\n");
        for descriptor in self.registry.list() {
            prompt.push_str(&format!("- {}: {}\n", descriptor.name, descriptor.description));
        }
        prompt.push_str(
            "\nCall a tool when it can answer the question or carry out the request. \
            Use as many tool calls as needed, then reply to the user in natural language. \
            If no tool applies, answer directly from your own knowledge while staying within the purpose above.",
        );
        prompt
    }

    fn build_messages(&self, prompt: &str) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(2 + self.history.len() * 2);
        messages.push(ChatMessage::system(self.system_prompt()));
        for (user, answer) in &self.history {
            messages.push(ChatMessage::user(user.clone()));
            messages.push(ChatMessage::assistant(answer.clone()));
        }
        messages.push(ChatMessage::user(prompt));
        messages
    }

    fn remember(&mut self, prompt: &str, answer: &str) {
        if self.max_history_turns == 0 {
            return;
        }
        self.history.push_back((prompt.to_string(), answer.to_string()));
        while self.history.len() > self.max_history_turns {
            self.history.pop_front();
        }
    }

    /// Run every requested tool call in order, appending the results.
    async fn run_tool_calls(&self, reply: AssistantReply, messages: &mut Vec<ChatMessage>) -> Result<(), AgentError> {
        let calls = reply.tool_calls.clone();
        messages.push(reply.into_message());

        for call in calls {
            let name = call.function.name;
            let tool = self
                .registry
                .get(&name)
                .ok_or_else(|| AgentError::UnknownTool(name.clone()))?;

            log::info!("Agent: calling {} with {}", name, call.function.arguments);
            let output = ToolRegistry::invoke(tool, &call.function.arguments)
                .await
                .map_err(|source| AgentError::Tool { name: name.clone(), source })?;
            log::info!("Agent: {} returned {} chars", name, output.len());

            messages.push(ChatMessage::Tool {
                tool_call_id: call.id,
                content: output,
            });
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Responder for Orchestrator {
    async fn query(&mut self, prompt: &str) -> Result<String, AgentError> {
        let mut messages = self.build_messages(prompt);
        let tools = self.registry.specs();

        for iteration in 1..=self.max_iterations {
            let reply = self
                .model
                .chat(ChatRequest {
                    messages: messages.clone(),
                    tools: tools.clone(),
                    temperature: self.temperature,
                })
                .await?;

            if reply.tool_calls.is_empty() {
                let answer = reply.content.unwrap_or_default();
                log::debug!("Agent: final answer after {} model call(s)", iteration);
                self.remember(prompt, &answer);
                return Ok(answer);
            }

            if iteration == self.max_iterations {
                log::warn!(
                    "Agent: dropping {} tool call(s) requested on the last iteration",
                    reply.tool_calls.len()
                );
                break;
            }

            self.run_tool_calls(reply, &mut messages).await?;
        }

        Err(AgentError::MaxIterations(self.max_iterations))
    }
}
