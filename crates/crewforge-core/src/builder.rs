//! Assembles a runnable [`Crew`] from a keyed [`RecordBundle`]
//!
//! Build order matters: models first, then the tools that embed with them,
//! then agents holding models and tools, then tasks holding agents, and
//! finally the crew. Each step reads what the previous ones built through
//! key-subset matches, see [`crate::keys`].

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::bundle::RecordBundle;
use crate::crew::{Crew, CrewAgent, CrewOutput, CrewTask, StepCallback, StepEvent};
use crate::events::{EventSink, Message, SocketEvents, SocketMessage, send};
use crate::keys::{KeyedMap, MatchMode, match_entry, match_key, search_subordinate_keys};
use crate::providers::{HttpModelFactory, LlmProvider, ModelFactory, ModelHandle};
use crate::records::keyset;
use crate::tools::{RagToolFactory, ToolHandler, ToolSet};
use crate::vector::{DEFAULT_CONTENT_KEY, VectorStoreFactory};

/// Author shown on messages the crew posts to the room
const SYSTEM_AUTHOR: &str = "system";

/// Forwards finished-agent output to the session room
#[derive(Clone)]
pub struct StepForwarder {
    session_id: String,
    sink: Arc<dyn EventSink>,
}

impl StepForwarder {
    pub fn new(session_id: impl Into<String>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            session_id: session_id.into(),
            sink,
        }
    }

    fn collect(&self, step: &StepEvent, out: &mut Vec<SocketMessage>) {
        match step {
            StepEvent::Finish(finish) => match &finish.output {
                Some(output) => out.push(SocketMessage {
                    room: self.session_id.clone(),
                    author_name: SYSTEM_AUTHOR.to_string(),
                    message: Message::new(output.clone(), 1, true),
                }),
                None => debug!("Finish step without output, nothing to send"),
            },
            StepEvent::Batch(parts) => {
                for part in parts {
                    self.collect(part, out);
                }
            }
            other => debug!("Failed to process {} step: {:?}", other.kind(), other),
        }
    }

    /// Send whatever in `step` the front-end shows; failures are logged only
    pub async fn forward(&self, step: &StepEvent) {
        let mut messages = Vec::new();
        self.collect(step, &mut messages);

        for message in messages {
            if let Err(e) = send(self.sink.as_ref(), SocketEvents::MESSAGE, &message).await {
                error!("Failed to send step to room {}: {:#}", self.session_id, e);
            }
        }
    }
}

#[async_trait]
impl StepCallback for StepForwarder {
    async fn on_step(&self, step: &StepEvent) {
        self.forward(step).await;
    }
}

pub struct CrewBuilder {
    session_id: String,
    records: RecordBundle,
    sink: Arc<dyn EventSink>,
    stores: Arc<dyn VectorStoreFactory>,
    model_factory: Arc<dyn ModelFactory>,
    models: KeyedMap<ModelHandle>,
    tools: KeyedMap<Arc<dyn ToolHandler>>,
    agents: KeyedMap<Arc<CrewAgent>>,
    tasks: KeyedMap<CrewTask>,
    crew: Option<Crew>,
}

impl CrewBuilder {
    pub fn new(
        session_id: impl Into<String>,
        records: RecordBundle,
        sink: Arc<dyn EventSink>,
        stores: Arc<dyn VectorStoreFactory>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            records,
            sink,
            stores,
            model_factory: Arc::new(HttpModelFactory::new()),
            models: KeyedMap::new(),
            tools: KeyedMap::new(),
            agents: KeyedMap::new(),
            tasks: KeyedMap::new(),
            crew: None,
        }
    }

    pub fn with_model_factory(mut self, factory: Arc<dyn ModelFactory>) -> Self {
        self.model_factory = factory;
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn records(&self) -> &RecordBundle {
        &self.records
    }

    pub fn models(&self) -> &KeyedMap<ModelHandle> {
        &self.models
    }

    pub fn tools(&self) -> &KeyedMap<Arc<dyn ToolHandler>> {
        &self.tools
    }

    pub fn agents(&self) -> &KeyedMap<Arc<CrewAgent>> {
        &self.agents
    }

    pub fn tasks(&self) -> &KeyedMap<CrewTask> {
        &self.tasks
    }

    pub fn crew(&self) -> Option<&Crew> {
        self.crew.as_ref()
    }

    /// Step 1: a provider for every model that has a credential in scope
    pub fn build_models_with_credentials(&mut self) {
        for (key, model) in self.records.models.iter() {
            let Some(credential) = match_key(&self.records.credentials, key, MatchMode::Subset)
            else {
                warn!("No credential for model {} ({}), skipping", model.id, model.model_name);
                continue;
            };

            match self.model_factory.build(model, credential) {
                Ok(handle) => {
                    debug!("Built {} model {}", handle.kind(), handle.model());
                    self.models.insert(key.clone(), handle);
                }
                Err(e) => warn!("Skipping model {}: {:#}", model.id, e),
            }
        }
        info!("Built {} models", self.models.len());
    }

    /// Step 2: a retrieval tool for every tool backed by a datasource
    pub fn build_tools_and_their_datasources(&mut self) {
        for (key, tool) in self.records.tools.iter() {
            let Some(datasource) = match_key(&self.records.datasources, key, MatchMode::Subset)
            else {
                debug!("Tool {} has no datasource, skipping", tool.name);
                continue;
            };
            let Some((model_key, handle)) = match_entry(&self.models, key, MatchMode::Subset)
            else {
                warn!("No embedding model for tool {}, skipping", tool.name);
                continue;
            };
            let Some(embeddings) = handle.as_embedding() else {
                warn!(
                    "Model {} in scope of tool {} is not an embedding model, skipping",
                    handle.model(),
                    tool.name
                );
                continue;
            };
            // vector name is the record's model name, not the provider's
            let vector_name = self
                .records
                .models
                .get(model_key)
                .map(|m| m.model_name.as_str());
            let content_key = datasource
                .content_key
                .as_deref()
                .unwrap_or(DEFAULT_CONTENT_KEY);
            let collection = datasource.collection_name();

            let store = match self.stores.open(&collection, vector_name, content_key) {
                Ok(store) => store,
                Err(e) => {
                    warn!("Failed to open collection {} for {}: {:#}", collection, tool.name, e);
                    continue;
                }
            };

            let top_k = tool.retriever_config.as_ref().and_then(|c| c.top_k);
            let rag = RagToolFactory::init(store, embeddings.clone()).generate_tool(
                tool.name.clone(),
                tool.description.clone(),
                top_k,
            );
            debug!("Built tool {} over {}", tool.name, collection);
            self.tools.insert(key.clone(), Arc::new(rag));
        }
        info!("Built {} tools", self.tools.len());
    }

    fn tools_under(&self, key: &crate::records::KeySet) -> ToolSet {
        search_subordinate_keys(&self.tools, key)
            .into_iter()
            .map(|(_, tool)| tool.clone())
            .collect()
    }

    /// Step 3: agents with their chat model and scoped tools
    pub fn build_agents(&mut self) {
        let mut built = Vec::with_capacity(self.records.agents.len());
        for (key, agent) in self.records.agents.iter() {
            let llm: Option<Arc<dyn LlmProvider>> =
                match match_key(&self.models, key, MatchMode::Exact) {
                    Some(ModelHandle::Chat(llm)) => Some(llm.clone()),
                    Some(other) => {
                        warn!(
                            "Model {} matched for agent {} is not a chat model",
                            other.model(),
                            agent.role
                        );
                        None
                    }
                    None => {
                        warn!("Agent {} has no chat model", agent.role);
                        None
                    }
                };
            if agent.allow_delegation {
                debug!("Agent {} allows delegation, which this runtime ignores", agent.role);
            }

            let mut crew_agent = CrewAgent::new(&agent.role, &agent.goal, &agent.backstory)
                .with_llm(llm)
                .with_tools(self.tools_under(key))
                .with_max_iter(agent.max_iter);
            crew_agent.verbose = agent.verbose;
            crew_agent.allow_delegation = agent.allow_delegation;

            debug!("Built agent {} with tools {:?}", agent.role, crew_agent.tools.names());
            built.push((key.clone(), Arc::new(crew_agent)));
        }
        self.agents.extend(built);
        info!("Built {} agents", self.agents.len());
    }

    /// Step 4: tasks bound to their agent and scoped tools
    pub fn build_tasks(&mut self) {
        let mut built = Vec::with_capacity(self.records.tasks.len());
        for (key, task) in self.records.tasks.iter() {
            let agent = match_key(
                &self.agents,
                &keyset([task.agent_id.clone()]),
                MatchMode::Exact,
            )
            .cloned();
            if agent.is_none() {
                warn!("Task {} references unbuilt agent {}", task.id, task.agent_id);
            }

            let mut crew_task = CrewTask::new(&task.description, &task.expected_output)
                .with_agent(agent)
                .with_tools(self.tools_under(key));
            crew_task.context_from_previous = task.context.unwrap_or(true);
            built.push((key.clone(), crew_task));
        }
        self.tasks.extend(built);
        info!("Built {} tasks", self.tasks.len());
    }

    /// Run every build step and assemble the crew
    pub fn build_crew(&mut self) -> &Crew {
        self.build_models_with_credentials();
        self.build_tools_and_their_datasources();
        self.build_agents();
        self.build_tasks();

        let settings = &self.records.crew;
        let forwarder = StepForwarder::new(self.session_id.clone(), self.sink.clone());
        let crew = Crew::new(
            self.agents.values().cloned().collect(),
            self.tasks.values().cloned().collect(),
        )
        .with_process(settings.process)
        .with_verbose(settings.verbose)
        .with_max_rpm(settings.max_rpm)
        .with_step_callback(Arc::new(forwarder));

        info!(
            "Assembled crew {} for session {}: {:?}",
            settings.id, self.session_id, crew
        );
        self.crew.insert(crew)
    }

    /// Step callback body: forwards `step` to the session room
    pub async fn send_it(&self, step: &StepEvent) {
        StepForwarder::new(self.session_id.clone(), self.sink.clone())
            .forward(step)
            .await;
    }

    /// Kick the crew off; failures are logged and reported as `None`
    pub async fn run_crew(&self) -> Option<CrewOutput> {
        let Some(crew) = &self.crew else {
            error!("run_crew called before build_crew for session {}", self.session_id);
            return None;
        };

        match crew.kickoff().await {
            Ok(output) => Some(output),
            Err(e) => {
                error!("Crew run failed for session {}: {:#}", self.session_id, e);
                None
            }
        }
    }
}

impl std::fmt::Debug for CrewBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrewBuilder")
            .field("session_id", &self.session_id)
            .field("models", &self.models.len())
            .field("tools", &self.tools.len())
            .field("agents", &self.agents.len())
            .field("tasks", &self.tasks.len())
            .field("built", &self.crew.is_some())
            .finish()
    }
}
