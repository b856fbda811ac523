//! Fakes shared by unit tests

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::crew::{StepCallback, StepEvent};
use crate::events::EventSink;
use crate::providers::{
    ChatMessage, ChatResponse, ChatResponseBlock, ChatUsage, EmbeddingProvider, LlmProvider,
    StopReason,
};
use crate::tools::ToolDefinition;

/// Replays canned responses and records what it was asked
pub struct ScriptedProvider {
    model: String,
    responses: Mutex<VecDeque<ChatResponse>>,
    pub calls: Mutex<Vec<(Vec<ChatMessage>, Vec<String>, String)>>,
}

impl ScriptedProvider {
    pub fn new(model: &str, responses: Vec<ChatResponse>) -> Self {
        Self {
            model: model.to_string(),
            responses: Mutex::new(responses.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn provider_name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        system: &str,
    ) -> Result<ChatResponse> {
        self.calls.lock().unwrap().push((
            messages.to_vec(),
            tools.iter().map(|t| t.name.clone()).collect(),
            system.to_string(),
        ));
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow!("script exhausted"))
    }
}

pub fn text_response(text: &str) -> ChatResponse {
    ChatResponse {
        blocks: vec![ChatResponseBlock::Text {
            text: text.to_string(),
        }],
        stop_reason: StopReason::EndTurn,
        usage: ChatUsage {
            input_tokens: 10,
            output_tokens: 5,
        },
    }
}

pub fn tool_response(calls: &[(&str, Value)]) -> ChatResponse {
    ChatResponse {
        blocks: calls
            .iter()
            .enumerate()
            .map(|(i, (name, input))| ChatResponseBlock::ToolCall {
                id: format!("call_{}", i),
                name: name.to_string(),
                input: input.clone(),
            })
            .collect(),
        stop_reason: StopReason::ToolUse,
        usage: ChatUsage {
            input_tokens: 10,
            output_tokens: 5,
        },
    }
}

/// Embeds text as counts of 'a' and 'b'
pub struct CountingEmbeddings;

#[async_trait]
impl EmbeddingProvider for CountingEmbeddings {
    fn provider_name(&self) -> &str {
        "counting"
    }

    fn model(&self) -> &str {
        "ab-2"
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| vec![t.matches('a').count() as f32, t.matches('b').count() as f32])
            .collect())
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub events: Mutex<Vec<(String, Value)>>,
    pub fail: bool,
}

impl RecordingSink {
    pub fn failing() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn events(&self) -> Vec<(String, Value)> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn emit(&self, event: &str, payload: Value) -> Result<()> {
        if self.fail {
            return Err(anyhow!("socket closed"));
        }
        self.events.lock().unwrap().push((event.to_string(), payload));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingSteps {
    pub steps: Mutex<Vec<StepEvent>>,
}

impl RecordingSteps {
    pub fn steps(&self) -> Vec<StepEvent> {
        self.steps.lock().unwrap().clone()
    }
}

#[async_trait]
impl StepCallback for RecordingSteps {
    async fn on_step(&self, step: &StepEvent) {
        self.steps.lock().unwrap().push(step.clone());
    }
}
