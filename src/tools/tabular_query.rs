use std::sync::Arc;

use crate::dataset::{QueryOutcome, Table, TableQuery};
use crate::llm::LanguageModel;
use super::{extract_json_object, Tool, ToolDescriptor, ToolError};

const DESCRIPTOR: ToolDescriptor = ToolDescriptor {
    name: "population_data",
    description: "Provides information on world population and demographics",
    parameter: "input",
};

/// Governs how the model shapes the table query.
const INSTRUCTIONS: &str = r#"1. Convert the query to a single JSON object describing a table operation.
2. The "operation" field must be one of: "count", "sum", "mean", "min", "max", "lookup", "top".
3. "sum", "mean", "min", "max" and "top" need a "column" naming a numeric column.
4. "lookup" may list "columns" to return and a "limit"; "top" may set "limit" and "descending".
5. Any operation may carry "filters": a list of {"column", "op", "value"} with op one of "eq", "ne", "gt", "ge", "lt", "le", "contains". All filters must hold.
6. Use column names exactly as listed.
7. PRINT ONLY THE JSON OBJECT. Do not wrap it in quotes or code fences."#;

/// Answers questions about a table by having the model write a structured
/// query, running it, then phrasing the result.
pub struct TabularQueryTool {
    table: Table,
    model: Arc<dyn LanguageModel>,
    temperature: f32,
    preview_rows: usize,
    synthesize_response: bool,
}

impl TabularQueryTool {
    pub fn new(
        table: Table,
        model: Arc<dyn LanguageModel>,
        temperature: f32,
        preview_rows: usize,
        synthesize_response: bool,
    ) -> Self {
        Self {
            table,
            model,
            temperature,
            preview_rows,
            synthesize_response,
        }
    }

    fn system_prompt() -> &'static str {
        "You translate questions about a table into structured JSON queries."
    }

    fn query_prompt(&self, question: &str) -> String {
        format!(
            "You are working with a table named `df`.\n\
            Columns: {}\n\
            This is the result of `df.head({})`:\n{}\n\
            Follow these instructions:\n{}\n\
            Query: {}\n\n\
            Expression: ",
            self.table.headers().join(", "),
            self.preview_rows,
            self.table.head(self.preview_rows),
            INSTRUCTIONS,
            question
        )
    }

    fn synthesis_prompt(question: &str, query_json: &str, outcome: &QueryOutcome) -> String {
        format!(
            "Given an input question, synthesize a response from the query results.\n\
            Quote every number exactly as it appears in the output, without rounding or rescaling.\n\
            Query: {}\n\n\
            Table query: {}\n\n\
            Output: {}\n\n\
            Response: ",
            question, query_json, outcome
        )
    }

    /// Ask the model for a query, parse it and run it against the table.
    async fn translate_and_execute(&self, question: &str) -> Result<(String, QueryOutcome), ToolError> {
        let reply = self
            .model
            .complete(Self::system_prompt(), &self.query_prompt(question), self.temperature)
            .await?;

        let query_json = extract_json_object(&reply)
            .ok_or_else(|| ToolError::Translation(format!("no JSON object in {:?}", reply.trim())))?;
        let query: TableQuery =
            serde_json::from_str(query_json).map_err(|e| ToolError::Translation(e.to_string()))?;

        log::info!("TabularQuery: executing {}", query_json);
        let outcome = self.table.execute(&query)?;
        Ok((query_json.to_string(), outcome))
    }
}

#[async_trait::async_trait]
impl Tool for TabularQueryTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &DESCRIPTOR
    }

    async fn invoke(&self, question: &str) -> Result<String, ToolError> {
        let (query_json, outcome) = self.translate_and_execute(question).await?;
        log::info!("TabularQuery: result {}", outcome);

        if !self.synthesize_response {
            return Ok(outcome.to_string());
        }

        let answer = self
            .model
            .complete(
                "You answer questions about a table using query results.",
                &Self::synthesis_prompt(question, &query_json, &outcome),
                self.temperature,
            )
            .await?;
        Ok(answer)
    }
}
