use std::sync::Arc;

use crate::providers::LlmProvider;
use crate::tools::ToolSet;

/// Model calls an agent may make for one task unless its record says otherwise
pub const DEFAULT_MAX_ITER: usize = 15;

/// A role-playing agent backed by a chat model
#[derive(Clone)]
pub struct CrewAgent {
    pub role: String,
    pub goal: String,
    pub backstory: String,
    pub llm: Option<Arc<dyn LlmProvider>>,
    pub tools: ToolSet,
    pub verbose: bool,
    pub allow_delegation: bool,
    pub max_iter: usize,
}

impl CrewAgent {
    pub fn new(
        role: impl Into<String>,
        goal: impl Into<String>,
        backstory: impl Into<String>,
    ) -> Self {
        Self {
            role: role.into(),
            goal: goal.into(),
            backstory: backstory.into(),
            llm: None,
            tools: ToolSet::new(),
            verbose: false,
            allow_delegation: false,
            max_iter: DEFAULT_MAX_ITER,
        }
    }

    pub fn with_llm(mut self, llm: Option<Arc<dyn LlmProvider>>) -> Self {
        self.llm = llm;
        self
    }

    pub fn with_tools(mut self, tools: ToolSet) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_max_iter(mut self, max_iter: Option<usize>) -> Self {
        self.max_iter = max_iter.unwrap_or(DEFAULT_MAX_ITER).max(1);
        self
    }

    pub fn system_prompt(&self) -> String {
        let mut prompt = format!("You are {}.", self.role);
        if !self.backstory.is_empty() {
            prompt.push(' ');
            prompt.push_str(&self.backstory);
        }
        prompt.push_str("\n\nYour personal goal is: ");
        prompt.push_str(&self.goal);
        if !self.tools.is_empty() {
            prompt.push_str("\n\nUse the tools available to you when they help answer accurately.");
        }
        prompt
    }
}

impl std::fmt::Debug for CrewAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrewAgent")
            .field("role", &self.role)
            .field("llm", &self.llm.as_ref().map(|l| l.model().to_string()))
            .field("tools", &self.tools)
            .field("max_iter", &self.max_iter)
            .finish()
    }
}
