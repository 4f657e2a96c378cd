use anyhow::{Context, Result};
use std::io::{BufRead, Write};

use crate::agent::Responder;

pub const PROMPT: &str = "Enter a prompt (q to quit): ";
pub const QUIT: &str = "q";

/// Read prompts until the quit token (or end of input), printing one line per answer.
pub async fn run<R, W>(responder: &mut dyn Responder, mut input: R, mut output: W) -> Result<()>
where
    R: BufRead,
    W: Write,
{
    let mut line = String::new();

    loop {
        write!(output, "{}", PROMPT)?;
        output.flush()?;

        line.clear();
        let read = input.read_line(&mut line).context("Failed to read from stdin")?;
        if read == 0 {
            log::info!("Shell: end of input");
            break;
        }

        let prompt = line.trim_end_matches(['\n', '\r']);
        if prompt == QUIT {
            break;
        }

        match responder.query(prompt).await {
            Ok(answer) => writeln!(output, "{}", answer)?,
            Err(e) => {
                log::error!("Shell: query failed: {}", e);
                writeln!(output, "An error occurred: {}", single_line(&e.to_string()))?;
            }
        }
    }

    Ok(())
}

/// Collapse runs of whitespace, newlines included, into single spaces.
fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentError;
    use crate::llm::LlmError;

    /// Echoes prompts back, failing on prompts that start with "fail".
    struct EchoResponder {
        calls: Vec<String>,
    }

    #[async_trait::async_trait]
    impl Responder for EchoResponder {
        async fn query(&mut self, prompt: &str) -> Result<String, AgentError> {
            self.calls.push(prompt.to_string());
            if prompt == "unauthorized" {
                return Err(AgentError::Model(LlmError::Api {
                    status: 401,
                    body: "{\n    \"error\": {\n        \"message\": \"Incorrect API key\"\n    }\n}\n".to_string(),
                }));
            }
            if prompt.starts_with("fail") {
                return Err(AgentError::UnknownTool("weather".to_string()));
            }
            Ok(format!("echo: {}", prompt))
        }
    }

    async fn session(input: &str) -> (Vec<String>, String) {
        let mut responder = EchoResponder { calls: Vec::new() };
        let mut output = Vec::new();
        run(&mut responder, input.as_bytes(), &mut output).await.unwrap();
        (responder.calls, String::from_utf8(output).unwrap())
    }

    #[tokio::test]
    async fn test_quit_immediately() {
        let (calls, output) = session("q\n").await;
        assert!(calls.is_empty());
        assert_eq!(output, PROMPT);
    }

    #[tokio::test]
    async fn test_one_call_and_one_line_per_prompt() {
        let (calls, output) = session("hello\nworld\nq\n").await;
        assert_eq!(calls, vec!["hello", "world"]);
        assert_eq!(
            output,
            format!("{p}echo: hello\n{p}echo: world\n{p}", p = PROMPT)
        );
    }

    #[tokio::test]
    async fn test_only_exact_sentinel_quits() {
        let (calls, _) = session("Q\n q\nquit\nq \nq\n").await;
        assert_eq!(calls, vec!["Q", " q", "quit", "q "]);
    }

    #[tokio::test]
    async fn test_error_is_reported_and_loop_continues() {
        let (calls, output) = session("fail now\nafter\nq\n").await;
        assert_eq!(calls, vec!["fail now", "after"]);
        assert_eq!(
            output,
            format!(
                "{p}An error occurred: Model requested unknown tool: weather\n{p}echo: after\n{p}",
                p = PROMPT
            )
        );
    }

    #[tokio::test]
    async fn test_multiline_error_prints_one_line() {
        let (calls, output) = session("unauthorized\nq\n").await;
        assert_eq!(calls, vec!["unauthorized"]);

        let turn = output.strip_prefix(PROMPT).unwrap().strip_suffix(PROMPT).unwrap();
        assert_eq!(turn.lines().count(), 1);
        assert_eq!(
            turn,
            "An error occurred: API error (401): { \"error\": { \"message\": \"Incorrect API key\" } }\n"
        );
    }

    #[test]
    fn test_single_line() {
        assert_eq!(single_line("a\r\n  b\tc\n"), "a b c");
    }

    #[tokio::test]
    async fn test_crlf_line_endings() {
        let (calls, _) = session("hello\r\nq\r\n").await;
        assert_eq!(calls, vec!["hello"]);
    }

    #[tokio::test]
    async fn test_end_of_input_terminates() {
        let (calls, output) = session("hello").await;
        assert_eq!(calls, vec!["hello"]);
        assert_eq!(output, format!("{p}echo: hello\n{p}", p = PROMPT));
    }
}
