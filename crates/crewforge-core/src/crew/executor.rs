//! The tool-use loop an agent runs for a single task

use anyhow::{Result, anyhow};
use tracing::{debug, info, warn};

use super::rpm::RpmLimiter;
use super::steps::{AgentAction, StepCallback, StepEvent};
use super::usage::AccumulatedUsage;
use crate::providers::{
    ChatBlock, ChatMessage, ChatMessageContent, ChatResponseBlock, ChatRole, LlmProvider,
};
use crate::tools::{ToolExecutor, ToolSet};

/// Tool output beyond this many bytes is cut before it goes back to the model
pub const MAX_TOOL_OUTPUT: usize = 100_000;

pub struct AgentExecutor<'a> {
    llm: &'a dyn LlmProvider,
    tools: &'a ToolSet,
    max_iter: usize,
    step_callback: Option<&'a dyn StepCallback>,
    limiter: Option<&'a RpmLimiter>,
}

impl<'a> AgentExecutor<'a> {
    pub fn new(llm: &'a dyn LlmProvider, tools: &'a ToolSet, max_iter: usize) -> Self {
        Self {
            llm,
            tools,
            max_iter,
            step_callback: None,
            limiter: None,
        }
    }

    pub fn with_step_callback(mut self, callback: Option<&'a dyn StepCallback>) -> Self {
        self.step_callback = callback;
        self
    }

    pub fn with_limiter(mut self, limiter: Option<&'a RpmLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    async fn report(&self, step: StepEvent) {
        if let Some(callback) = self.step_callback {
            callback.on_step(&step).await;
        }
    }

    /// Run until the model answers without calling tools
    pub async fn invoke(&self, system: &str, prompt: &str) -> Result<(String, AccumulatedUsage)> {
        let mut usage = AccumulatedUsage::new();
        let definitions = self.tools.list_tools();
        let mut conversation = vec![ChatMessage::user(prompt)];

        for iteration in 1..=self.max_iter {
            debug!("Agent loop iteration {} on {}", iteration, self.llm.model());

            if let Some(limiter) = self.limiter {
                limiter.acquire().await;
            }

            let response = self.llm.chat(&conversation, &definitions, system).await?;
            usage.add(response.usage.input_tokens, response.usage.output_tokens);

            let calls: Vec<_> = response
                .blocks
                .iter()
                .filter_map(|b| match b {
                    ChatResponseBlock::ToolCall { id, name, input } => Some((id, name, input)),
                    ChatResponseBlock::Text { .. } => None,
                })
                .collect();

            if calls.is_empty() {
                let text = response.text();
                if text.is_empty() {
                    return Err(anyhow!("No text response from agent"));
                }
                debug!(
                    "Agent finished after {} iterations (tokens: in={} out={})",
                    iteration, usage.input_tokens, usage.output_tokens
                );
                self.report(StepEvent::finish(text.clone())).await;
                return Ok((text, usage));
            }

            let thought = response.text();
            conversation.push(ChatMessage {
                role: ChatRole::Assistant,
                content: ChatMessageContent::Blocks(
                    response
                        .blocks
                        .iter()
                        .map(|b| match b {
                            ChatResponseBlock::Text { text } => {
                                ChatBlock::Text { text: text.clone() }
                            }
                            ChatResponseBlock::ToolCall { id, name, input } => ChatBlock::ToolCall {
                                id: id.clone(),
                                name: name.clone(),
                                input: input.clone(),
                            },
                        })
                        .collect(),
                ),
            });

            let mut results = Vec::with_capacity(calls.len());
            let mut steps = Vec::with_capacity(calls.len());
            for (id, name, input) in calls {
                info!("Executing tool: {}", name);
                usage.record_tool_call(name);

                let observation = match self.tools.execute(name, input.clone()).await {
                    Ok(output) => truncate_output(output),
                    Err(e) => {
                        warn!("Tool {} failed: {}", name, e);
                        format!("Error: {}", e)
                    }
                };

                steps.push(StepEvent::Action {
                    action: AgentAction {
                        tool: name.clone(),
                        tool_input: input.clone(),
                        log: thought.clone(),
                    },
                    observation: observation.clone(),
                });
                results.push(ChatBlock::ToolResult {
                    tool_call_id: id.clone(),
                    content: observation,
                });
            }

            conversation.push(ChatMessage {
                role: ChatRole::User,
                content: ChatMessageContent::Blocks(results),
            });
            self.report(StepEvent::Batch(steps)).await;
        }

        warn!("Agent exceeded maximum iterations ({})", self.max_iter);
        Err(anyhow!(
            "Agent exceeded maximum iterations ({})",
            self.max_iter
        ))
    }
}

/// Cut oversized output on a char boundary
fn truncate_output(mut output: String) -> String {
    if output.len() <= MAX_TOOL_OUTPUT {
        return output;
    }
    let mut end = MAX_TOOL_OUTPUT;
    while !output.is_char_boundary(end) {
        end -= 1;
    }
    output.truncate(end);
    output.push_str("\n[Output truncated]");
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingSteps, ScriptedProvider, text_response, tool_response};
    use crate::tools::{ToolHandler, json_schema};
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::sync::Arc;

    struct LookupTool;

    #[async_trait]
    impl ToolHandler for LookupTool {
        fn name(&self) -> &str {
            "lookup"
        }
        fn description(&self) -> &str {
            "Looks things up"
        }
        fn input_schema(&self) -> Value {
            json_schema(json!({"query": {"type": "string"}}), vec!["query"])
        }
        async fn execute(&self, input: Value) -> Result<String> {
            match input["query"].as_str() {
                Some("boom") => Err(anyhow!("backend down")),
                Some(q) => Ok(format!("facts about {}", q)),
                None => Err(anyhow!("Missing 'query' parameter")),
            }
        }
    }

    fn tools() -> ToolSet {
        [Arc::new(LookupTool) as Arc<dyn ToolHandler>].into_iter().collect()
    }

    #[tokio::test]
    async fn test_direct_answer() {
        let llm = ScriptedProvider::new("gpt-test", vec![text_response("42")]);
        let tools = ToolSet::new();
        let (text, usage) = AgentExecutor::new(&llm, &tools, 5)
            .invoke("sys", "question")
            .await
            .unwrap();
        assert_eq!(text, "42");
        assert_eq!(usage.api_calls, 1);
        assert_eq!(usage.total_tokens(), 15);
    }

    #[tokio::test]
    async fn test_tool_round_then_answer() {
        let llm = ScriptedProvider::new(
            "gpt-test",
            vec![
                tool_response(&[
                    ("lookup", json!({"query": "rust"})),
                    ("lookup", json!({"query": "boom"})),
                ]),
                text_response("Rust is a language"),
            ],
        );
        let tools = tools();
        let steps = RecordingSteps::default();

        let (text, usage) = AgentExecutor::new(&llm, &tools, 5)
            .with_step_callback(Some(&steps))
            .invoke("sys", "what is rust?")
            .await
            .unwrap();

        assert_eq!(text, "Rust is a language");
        assert_eq!(usage.tool_calls, vec!["lookup", "lookup"]);

        let recorded = steps.steps();
        assert_eq!(recorded.len(), 2);
        match &recorded[0] {
            StepEvent::Batch(parts) => {
                assert_eq!(parts.len(), 2);
                match &parts[0] {
                    StepEvent::Action { action, observation } => {
                        assert_eq!(action.tool, "lookup");
                        assert_eq!(observation, "facts about rust");
                    }
                    other => panic!("unexpected step {:?}", other),
                }
                match &parts[1] {
                    StepEvent::Action { observation, .. } => {
                        assert_eq!(observation, "Error: backend down");
                    }
                    other => panic!("unexpected step {:?}", other),
                }
            }
            other => panic!("unexpected step {:?}", other),
        }
        assert_eq!(recorded[1], StepEvent::finish("Rust is a language"));

        // second call sees the assistant tool calls and the tool results
        let calls = llm.calls.lock().unwrap();
        assert_eq!(calls[1].0.len(), 3);
        assert_eq!(calls[1].1, vec!["lookup".to_string()]);
    }

    #[tokio::test]
    async fn test_max_iterations() {
        let llm = ScriptedProvider::new(
            "gpt-test",
            vec![
                tool_response(&[("lookup", json!({"query": "a"}))]),
                tool_response(&[("lookup", json!({"query": "b"}))]),
            ],
        );
        let tools = tools();
        let err = AgentExecutor::new(&llm, &tools, 2)
            .invoke("sys", "loop")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("maximum iterations"));
        assert_eq!(llm.call_count(), 2);
    }

    #[tokio::test]
    async fn test_empty_answer_is_error() {
        let llm = ScriptedProvider::new("gpt-test", vec![text_response("")]);
        let tools = ToolSet::new();
        let err = AgentExecutor::new(&llm, &tools, 3)
            .invoke("sys", "q")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("No text response"));
    }

    #[test]
    fn test_truncate_output_on_char_boundary() {
        let output = "é".repeat(MAX_TOOL_OUTPUT);
        let truncated = truncate_output(output);
        assert!(truncated.ends_with("[Output truncated]"));
        assert!(truncated.len() <= MAX_TOOL_OUTPUT + "\n[Output truncated]".len());

        assert_eq!(truncate_output("short".to_string()), "short");
    }
}
