//! Intermediate steps reported while agents work

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool call the agent decided to make
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentAction {
    pub tool: String,
    pub tool_input: Value,
    /// Model text that accompanied the call, if any
    #[serde(default)]
    pub log: String,
}

/// The agent's final answer for a task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentFinish {
    pub output: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StepEvent {
    Finish(AgentFinish),
    /// A tool call paired with what the tool returned
    Action {
        action: AgentAction,
        observation: String,
    },
    /// Every tool call from one model turn
    Batch(Vec<StepEvent>),
}

impl StepEvent {
    pub fn finish(output: impl Into<String>) -> Self {
        Self::Finish(AgentFinish {
            output: Some(output.into()),
        })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Finish(_) => "finish",
            Self::Action { .. } => "action",
            Self::Batch(_) => "batch",
        }
    }
}

/// Receives every step of a crew run
#[async_trait]
pub trait StepCallback: Send + Sync {
    async fn on_step(&self, step: &StepEvent);
}
