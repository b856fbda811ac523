//! Minimal crew runtime: agents working through tasks in order
//!
//! Each task runs its agent's tool loop against the agent's chat model with
//! the union of agent and task tools. Steps are reported to an optional
//! [`StepCallback`] as they happen.

pub mod agent;
pub mod executor;
pub mod rpm;
pub mod steps;
pub mod task;
pub mod usage;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::BuildError;
use crate::records::Process;

pub use agent::{CrewAgent, DEFAULT_MAX_ITER};
pub use executor::{AgentExecutor, MAX_TOOL_OUTPUT};
pub use rpm::RpmLimiter;
pub use steps::{AgentAction, AgentFinish, StepCallback, StepEvent};
pub use task::CrewTask;
pub use usage::AccumulatedUsage;

/// Result of one task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskOutput {
    pub description: String,
    pub agent: String,
    pub raw: String,
}

/// Result of a full run; `raw` is the last task's output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrewOutput {
    pub raw: String,
    pub tasks_output: Vec<TaskOutput>,
    pub usage: AccumulatedUsage,
}

pub struct Crew {
    pub agents: Vec<Arc<CrewAgent>>,
    pub tasks: Vec<CrewTask>,
    pub process: Process,
    pub verbose: bool,
    rpm_limiter: Option<RpmLimiter>,
    step_callback: Option<Arc<dyn StepCallback>>,
}

impl Crew {
    pub fn new(agents: Vec<Arc<CrewAgent>>, tasks: Vec<CrewTask>) -> Self {
        Self {
            agents,
            tasks,
            process: Process::Sequential,
            verbose: false,
            rpm_limiter: None,
            step_callback: None,
        }
    }

    pub fn with_process(mut self, process: Process) -> Self {
        self.process = process;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_max_rpm(mut self, max_rpm: Option<u32>) -> Self {
        self.rpm_limiter = max_rpm.map(RpmLimiter::new);
        self
    }

    pub fn with_step_callback(mut self, callback: Arc<dyn StepCallback>) -> Self {
        self.step_callback = Some(callback);
        self
    }

    pub fn max_rpm(&self) -> Option<u32> {
        self.rpm_limiter.as_ref().map(|l| l.max_rpm())
    }

    /// Run every task and return the combined output
    pub async fn kickoff(&self) -> Result<CrewOutput> {
        if self.process == Process::Hierarchical {
            return Err(BuildError::UnsupportedProcess(self.process.to_string()).into());
        }
        if self.tasks.is_empty() {
            return Err(BuildError::NoTasks.into());
        }

        info!(
            "Crew kickoff: {} agents, {} tasks, {} process",
            self.agents.len(),
            self.tasks.len(),
            self.process
        );

        let mut usage = AccumulatedUsage::new();
        let mut tasks_output: Vec<TaskOutput> = Vec::with_capacity(self.tasks.len());

        for (index, task) in self.tasks.iter().enumerate() {
            let agent = task
                .agent
                .as_ref()
                .or_else(|| self.agents.first())
                .ok_or_else(|| BuildError::NoAgentForTask(index.to_string()))?;
            let llm = agent
                .llm
                .as_ref()
                .ok_or_else(|| BuildError::MissingLlm(agent.role.clone()))?;

            let context = if task.context_from_previous {
                tasks_output.last().map(|o| o.raw.as_str())
            } else {
                None
            };
            let tools = agent.tools.merged(&task.tools);

            if self.verbose || agent.verbose {
                info!(
                    "Task {} -> {} (tools: {:?})",
                    index + 1,
                    agent.role,
                    tools.names()
                );
            }

            let (raw, task_usage) = AgentExecutor::new(llm.as_ref(), &tools, agent.max_iter)
                .with_step_callback(self.step_callback.as_deref())
                .with_limiter(self.rpm_limiter.as_ref())
                .invoke(&agent.system_prompt(), &task.prompt(context))
                .await
                .with_context(|| format!("Task {} ({}) failed", index + 1, agent.role))?;

            debug!("Task {} output: {} bytes", index + 1, raw.len());
            usage.merge(&task_usage);
            tasks_output.push(TaskOutput {
                description: task.description.clone(),
                agent: agent.role.clone(),
                raw,
            });
        }

        let raw = tasks_output
            .last()
            .map(|o| o.raw.clone())
            .unwrap_or_default();
        info!(
            "Crew finished: {} API calls, {} tokens",
            usage.api_calls,
            usage.total_tokens()
        );

        Ok(CrewOutput {
            raw,
            tasks_output,
            usage,
        })
    }
}

impl std::fmt::Debug for Crew {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Crew")
            .field("agents", &self.agents)
            .field("tasks", &self.tasks.len())
            .field("process", &self.process)
            .field("max_rpm", &self.max_rpm())
            .field("step_callback", &self.step_callback.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::LlmProvider;
    use crate::testing::{RecordingSteps, ScriptedProvider, text_response};

    fn agent(role: &str, llm: Arc<ScriptedProvider>) -> Arc<CrewAgent> {
        Arc::new(CrewAgent::new(role, "help", "").with_llm(Some(llm as Arc<dyn LlmProvider>)))
    }

    #[tokio::test]
    async fn test_sequential_chains_context() {
        let llm = Arc::new(ScriptedProvider::new(
            "gpt-test",
            vec![text_response("draft"), text_response("final")],
        ));
        let writer = agent("Writer", llm.clone());
        let crew = Crew::new(
            vec![writer.clone()],
            vec![
                CrewTask::new("Draft it", "a draft").with_agent(Some(writer.clone())),
                CrewTask::new("Polish it", "a final text").with_agent(Some(writer)),
            ],
        );

        let output = crew.kickoff().await.unwrap();
        assert_eq!(output.raw, "final");
        assert_eq!(output.tasks_output.len(), 2);
        assert_eq!(output.tasks_output[0].raw, "draft");
        assert_eq!(output.usage.api_calls, 2);

        let calls = llm.calls.lock().unwrap();
        let second_prompt = match &calls[1].0[0].content {
            crate::providers::ChatMessageContent::Text(t) => t.clone(),
            other => panic!("unexpected content {:?}", other),
        };
        assert!(second_prompt.contains("This is the context you're working with:\ndraft"));
    }

    #[tokio::test]
    async fn test_task_without_agent_uses_first_crew_agent() {
        let llm = Arc::new(ScriptedProvider::new("gpt-test", vec![text_response("ok")]));
        let steps = Arc::new(RecordingSteps::default());
        let crew = Crew::new(vec![agent("Lead", llm)], vec![CrewTask::new("Go", "")])
            .with_step_callback(steps.clone());

        let output = crew.kickoff().await.unwrap();
        assert_eq!(output.tasks_output[0].agent, "Lead");
        assert_eq!(steps.steps(), vec![StepEvent::finish("ok")]);
    }

    #[tokio::test]
    async fn test_hierarchical_rejected() {
        let crew = Crew::new(vec![], vec![CrewTask::new("x", "")])
            .with_process(Process::Hierarchical);
        let err = crew.kickoff().await.unwrap_err();
        assert!(err.to_string().contains("hierarchical"));
    }

    #[tokio::test]
    async fn test_agent_without_llm_fails() {
        let lonely = Arc::new(CrewAgent::new("Lonely", "wait", ""));
        let crew = Crew::new(vec![lonely], vec![CrewTask::new("x", "")]);
        let err = crew.kickoff().await.unwrap_err();
        assert!(err.to_string().contains("no chat model"));
    }

    #[tokio::test]
    async fn test_no_tasks() {
        let crew = Crew::new(vec![], vec![]);
        assert!(crew.kickoff().await.is_err());
    }

    #[test]
    fn test_max_rpm() {
        let crew = Crew::new(vec![], vec![]).with_max_rpm(Some(30));
        assert_eq!(crew.max_rpm(), Some(30));
    }
}
