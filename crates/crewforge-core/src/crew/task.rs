use std::sync::Arc;

use super::agent::CrewAgent;
use crate::tools::ToolSet;

/// One unit of work in a crew
#[derive(Debug, Clone)]
pub struct CrewTask {
    pub description: String,
    pub expected_output: String,
    pub agent: Option<Arc<CrewAgent>>,
    pub tools: ToolSet,
    /// Whether the previous task's output is handed to this one
    pub context_from_previous: bool,
}

impl CrewTask {
    pub fn new(description: impl Into<String>, expected_output: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            expected_output: expected_output.into(),
            agent: None,
            tools: ToolSet::new(),
            context_from_previous: true,
        }
    }

    pub fn with_agent(mut self, agent: Option<Arc<CrewAgent>>) -> Self {
        self.agent = agent;
        self
    }

    pub fn with_tools(mut self, tools: ToolSet) -> Self {
        self.tools = tools;
        self
    }

    pub fn prompt(&self, context: Option<&str>) -> String {
        let mut prompt = self.description.clone();
        if !self.expected_output.is_empty() {
            prompt.push_str("\n\nThis is the expected criteria for your final answer: ");
            prompt.push_str(&self.expected_output);
            prompt.push_str(
                "\nYou MUST return the actual complete content as the final answer, not a summary.",
            );
        }
        if let Some(context) = context.filter(|c| !c.is_empty()) {
            prompt.push_str("\n\nThis is the context you're working with:\n");
            prompt.push_str(context);
        }
        prompt
    }
}
