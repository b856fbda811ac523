//! Keyed record bundles and where they are loaded from
//!
//! A bundle carries one [`KeyedMap`] per record kind. Keys encode scope: a
//! model keyed `{agent, model}` belongs to that agent, a datasource keyed
//! `{agent, tool, datasource}` belongs to that agent's tool, and so on.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::keys::KeyedMap;
use crate::records::{
    Agent, Credentials, Crew, Datasource, KeySet, Model, RecordId, Task, Tool, keyset,
};

/// Everything the builder needs to assemble one crew
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordBundle {
    pub crew: Crew,
    #[serde(default)]
    pub agents: KeyedMap<Agent>,
    #[serde(default)]
    pub tasks: KeyedMap<Task>,
    #[serde(default)]
    pub tools: KeyedMap<Tool>,
    #[serde(default)]
    pub datasources: KeyedMap<Datasource>,
    #[serde(default)]
    pub models: KeyedMap<Model>,
    #[serde(default)]
    pub credentials: KeyedMap<Credentials>,
}

/// Records as plain lists, the way they sit in the document store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlatRecords {
    pub crew: Option<Crew>,
    #[serde(default)]
    pub agents: Vec<Agent>,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub tools: Vec<Tool>,
    #[serde(default)]
    pub datasources: Vec<Datasource>,
    #[serde(default)]
    pub models: Vec<Model>,
    #[serde(default)]
    pub credentials: Vec<Credentials>,
}

/// Id lookups over a [`FlatRecords`]
struct Index<'a> {
    agents: HashMap<&'a RecordId, &'a Agent>,
    tasks: HashMap<&'a RecordId, &'a Task>,
    tools: HashMap<&'a RecordId, &'a Tool>,
    datasources: HashMap<&'a RecordId, &'a Datasource>,
    models: HashMap<&'a RecordId, &'a Model>,
    credentials: HashMap<&'a RecordId, &'a Credentials>,
}

impl<'a> Index<'a> {
    fn new(flat: &'a FlatRecords) -> Self {
        Self {
            agents: flat.agents.iter().map(|r| (&r.id, r)).collect(),
            tasks: flat.tasks.iter().map(|r| (&r.id, r)).collect(),
            tools: flat.tools.iter().map(|r| (&r.id, r)).collect(),
            datasources: flat.datasources.iter().map(|r| (&r.id, r)).collect(),
            models: flat.models.iter().map(|r| (&r.id, r)).collect(),
            credentials: flat.credentials.iter().map(|r| (&r.id, r)).collect(),
        }
    }
}

fn scoped(scope: &KeySet, id: &RecordId) -> KeySet {
    let mut key = scope.clone();
    key.insert(id.clone());
    key
}

impl RecordBundle {
    pub fn new(crew: Crew) -> Self {
        Self {
            crew,
            agents: KeyedMap::new(),
            tasks: KeyedMap::new(),
            tools: KeyedMap::new(),
            datasources: KeyedMap::new(),
            models: KeyedMap::new(),
            credentials: KeyedMap::new(),
        }
    }

    /// Key flat records by ownership, starting from the crew's agents and tasks.
    ///
    /// Each agent's chat model goes in before its tools so that subset scans
    /// on the agent key reach the chat model before any embedding model.
    pub fn from_flat(flat: FlatRecords) -> Result<Self> {
        let crew = flat
            .crew
            .clone()
            .context("Record bundle has no crew record")?;
        let index = Index::new(&flat);
        let mut bundle = Self::new(crew);

        let agent_ids: Vec<RecordId> = if bundle.crew.agents.is_empty() {
            flat.agents.iter().map(|a| a.id.clone()).collect()
        } else {
            bundle.crew.agents.clone()
        };
        for agent_id in &agent_ids {
            let Some(agent) = index.agents.get(agent_id) else {
                warn!("Crew references unknown agent {}, skipping", agent_id);
                continue;
            };
            let scope = keyset([agent_id.clone()]);
            bundle.agents.insert(scope.clone(), (*agent).clone());

            if let Some(model_id) = &agent.model_id {
                bundle.insert_model(&index, &scope, model_id);
            }
            for tool_id in &agent.tool_ids {
                bundle.insert_tool(&index, &scope, tool_id);
            }
        }

        let task_ids: Vec<RecordId> = if bundle.crew.tasks.is_empty() {
            flat.tasks.iter().map(|t| t.id.clone()).collect()
        } else {
            bundle.crew.tasks.clone()
        };
        for task_id in &task_ids {
            let Some(task) = index.tasks.get(task_id) else {
                warn!("Crew references unknown task {}, skipping", task_id);
                continue;
            };
            let scope = keyset([task_id.clone()]);
            bundle.tasks.insert(scope.clone(), (*task).clone());

            for tool_id in &task.tool_ids {
                bundle.insert_tool(&index, &scope, tool_id);
            }
        }

        debug!(
            "Keyed {} agents, {} tasks, {} tools, {} datasources, {} models, {} credentials",
            bundle.agents.len(),
            bundle.tasks.len(),
            bundle.tools.len(),
            bundle.datasources.len(),
            bundle.models.len(),
            bundle.credentials.len()
        );
        Ok(bundle)
    }

    fn insert_model(&mut self, index: &Index<'_>, scope: &KeySet, model_id: &RecordId) {
        let Some(model) = index.models.get(model_id) else {
            warn!("Unknown model {} under {:?}, skipping", model_id, scope);
            return;
        };
        let key = scoped(scope, model_id);
        self.models.insert(key.clone(), (*model).clone());

        let Some(credential_id) = &model.credential_id else {
            return;
        };
        match index.credentials.get(credential_id) {
            Some(credential) => {
                self.credentials
                    .insert(scoped(&key, credential_id), (*credential).clone());
            }
            None => warn!("Model {} references unknown credential {}", model_id, credential_id),
        }
    }

    fn insert_tool(&mut self, index: &Index<'_>, scope: &KeySet, tool_id: &RecordId) {
        let Some(tool) = index.tools.get(tool_id) else {
            warn!("Unknown tool {} under {:?}, skipping", tool_id, scope);
            return;
        };
        let key = scoped(scope, tool_id);
        self.tools.insert(key.clone(), (*tool).clone());

        let Some(datasource_id) = &tool.datasource_id else {
            return;
        };
        let Some(datasource) = index.datasources.get(datasource_id) else {
            warn!("Tool {} references unknown datasource {}", tool_id, datasource_id);
            return;
        };
        let key = scoped(&key, datasource_id);
        self.datasources.insert(key.clone(), (*datasource).clone());

        if let Some(model_id) = &datasource.model_id {
            self.insert_model(index, &key, model_id);
        }
    }

    /// Parse a bundle from JSON, keyed or flat
    pub fn from_json(value: Value) -> Result<Self> {
        if is_keyed(&value) {
            serde_json::from_value(value).context("Failed to parse keyed record bundle")
        } else {
            let flat: FlatRecords =
                serde_json::from_value(value).context("Failed to parse flat record bundle")?;
            Self::from_flat(flat)
        }
    }
}

/// Keyed bundles hold `{"key": [...], "record": {...}}` entries
fn is_keyed(value: &Value) -> bool {
    ["agents", "tasks", "tools", "datasources", "models", "credentials"]
        .iter()
        .filter_map(|kind| value.get(kind).and_then(|v| v.as_array()))
        .filter_map(|entries| entries.first())
        .any(|entry| entry.get("key").is_some() && entry.get("record").is_some())
}

/// Source of record bundles for a session
#[async_trait]
pub trait RecordSource: Send + Sync {
    async fn load(&self, session_id: &str) -> Result<RecordBundle>;
}

/// Reads a bundle from a JSON file
pub struct FileRecordSource {
    path: PathBuf,
}

impl FileRecordSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RecordSource for FileRecordSource {
    async fn load(&self, session_id: &str) -> Result<RecordBundle> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read records from {}", self.path.display()))?;
        let value: Value = serde_json::from_str(&content)
            .with_context(|| format!("Invalid JSON in {}", self.path.display()))?;
        let bundle = RecordBundle::from_json(value)?;
        info!(
            "Loaded crew {} for session {} from {}",
            bundle.crew.id,
            session_id,
            self.path.display()
        );
        Ok(bundle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn flat_json() -> Value {
        serde_json::json!({
            "crew": {"id": "crew1", "agents": ["a1"], "tasks": ["k1"]},
            "agents": [{
                "id": "a1", "role": "Researcher", "goal": "Answer questions",
                "modelId": "m1", "toolIds": ["t1"]
            }],
            "tasks": [{
                "id": "k1", "description": "Summarise the handbook",
                "agentId": "a1", "toolIds": ["t2"]
            }],
            "tools": [
                {"id": "t1", "name": "handbook", "datasourceId": "d1"},
                {"id": "t2", "name": "calculator"}
            ],
            "datasources": [{"id": "d1", "modelId": "e1"}],
            "models": [
                {"id": "m1", "modelName": "gpt-4o", "credentialId": "c1"},
                {"id": "e1", "modelName": "BAAI/bge-small-en", "credentialId": "c2"}
            ],
            "credentials": [
                {"id": "c1", "type": "ChatOpenAI", "credentials": {"apiKey": "sk-test"}},
                {"id": "c2", "type": "FastEmbed"}
            ]
        })
    }

    #[test]
    fn test_from_flat_derives_scopes() {
        let bundle = RecordBundle::from_json(flat_json()).unwrap();

        assert!(bundle.agents.contains_key(&keyset(["a1"])));
        assert!(bundle.tasks.contains_key(&keyset(["k1"])));
        assert!(bundle.tools.contains_key(&keyset(["a1", "t1"])));
        assert!(bundle.tools.contains_key(&keyset(["k1", "t2"])));
        assert!(bundle.datasources.contains_key(&keyset(["a1", "t1", "d1"])));

        let model_keys: Vec<&KeySet> = bundle.models.keys().collect();
        assert_eq!(
            model_keys,
            vec![&keyset(["a1", "m1"]), &keyset(["a1", "t1", "d1", "e1"])]
        );
        assert!(bundle.credentials.contains_key(&keyset(["a1", "m1", "c1"])));
        assert!(
            bundle
                .credentials
                .contains_key(&keyset(["a1", "t1", "d1", "e1", "c2"]))
        );
    }

    #[test]
    fn test_from_flat_skips_unknown_references() {
        let mut json = flat_json();
        json["crew"]["agents"] = serde_json::json!(["a1", "ghost"]);
        json["agents"][0]["toolIds"] = serde_json::json!(["t1", "missing"]);

        let bundle = RecordBundle::from_json(json).unwrap();
        assert_eq!(bundle.agents.len(), 1);
        assert_eq!(bundle.tools.len(), 2);
    }

    #[test]
    fn test_from_flat_requires_crew() {
        let err = RecordBundle::from_flat(FlatRecords::default()).unwrap_err();
        assert!(err.to_string().contains("no crew"));
    }

    #[test]
    fn test_keyed_bundle_roundtrip_through_json() {
        let bundle = RecordBundle::from_json(flat_json()).unwrap();
        let json = serde_json::to_value(&bundle).unwrap();
        assert!(is_keyed(&json));

        let reparsed = RecordBundle::from_json(json).unwrap();
        assert_eq!(reparsed.models.len(), 2);
        assert_eq!(reparsed.crew.id, RecordId::new("crew1"));
    }

    #[test]
    fn test_demo_bundle_parses() {
        let value: Value =
            serde_json::from_str(include_str!("../../../demos/hr-assistant.json")).unwrap();
        let bundle = RecordBundle::from_json(value).unwrap();
        assert_eq!(bundle.agents.len(), 2);
        assert_eq!(bundle.tasks.len(), 2);
        assert_eq!(bundle.models.len(), 3);
        assert_eq!(bundle.credentials.len(), 3);
        assert_eq!(bundle.crew.max_rpm, Some(20));
    }

    #[tokio::test]
    async fn test_file_record_source() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", flat_json()).unwrap();

        let source = FileRecordSource::new(file.path());
        let bundle = source.load("session-1").await.unwrap();
        assert_eq!(bundle.agents.len(), 1);
        assert_eq!(bundle.credentials.len(), 2);
    }

    #[tokio::test]
    async fn test_file_record_source_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = FileRecordSource::new(dir.path().join("nope.json"));
        let err = source.load("s").await.unwrap_err();
        assert!(err.to_string().contains("Failed to read records"));
    }
}
