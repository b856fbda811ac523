//! Configuration records as stored upstream (agents, tasks, tools, ...)
//!
//! Field names follow the document store's camelCase layout on the wire.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// String form of an upstream document id
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for RecordId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Set of record ids scoping a record within a crew
pub type KeySet = BTreeSet<RecordId>;

/// Build a key set from any list of ids
pub fn keyset<I, T>(ids: I) -> KeySet
where
    I: IntoIterator<Item = T>,
    T: Into<RecordId>,
{
    ids.into_iter().map(Into::into).collect()
}

/// Platform a credential authenticates against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Platform {
    #[serde(rename = "ChatOpenAI")]
    ChatOpenAi,
    #[serde(rename = "AzureChatOpenAI")]
    AzureChatOpenAi,
    FastEmbed,
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ChatOpenAi => write!(f, "ChatOpenAI"),
            Self::AzureChatOpenAi => write!(f, "AzureChatOpenAI"),
            Self::FastEmbed => write!(f, "FastEmbed"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Model {
    pub id: RecordId,
    #[serde(default)]
    pub name: String,
    pub model_name: String,
    #[serde(default)]
    pub credential_id: Option<RecordId>,
    #[serde(default)]
    pub embedding_length: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub base_url: Option<String>,
}

/// Secret material inside a credentials record
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Secret {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub api_version: Option<String>,
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secret")
            .field("api_key", &self.api_key.as_deref().map(mask_secret))
            .field("endpoint", &self.endpoint)
            .field("api_version", &self.api_version)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub id: RecordId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub platform: Platform,
    #[serde(default)]
    pub credentials: Secret,
}

impl Credentials {
    pub fn api_key(&self) -> &str {
        self.credentials.api_key.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrieverConfig {
    #[serde(default)]
    pub top_k: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    pub id: RecordId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub datasource_id: Option<RecordId>,
    #[serde(default)]
    pub retriever_config: Option<RetrieverConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Datasource {
    pub id: RecordId,
    #[serde(default)]
    pub name: Option<String>,
    /// Embedding model the collection was indexed with
    #[serde(default)]
    pub model_id: Option<RecordId>,
    #[serde(default)]
    pub collection: Option<String>,
    #[serde(default)]
    pub content_key: Option<String>,
}

impl Datasource {
    /// Vector collection backing this datasource
    pub fn collection_name(&self) -> String {
        self.collection
            .clone()
            .unwrap_or_else(|| self.id.to_string())
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub id: RecordId,
    pub role: String,
    pub goal: String,
    #[serde(default)]
    pub backstory: String,
    #[serde(default)]
    pub model_id: Option<RecordId>,
    #[serde(default)]
    pub tool_ids: Vec<RecordId>,
    #[serde(default)]
    pub task_ids: Vec<RecordId>,
    #[serde(default)]
    pub verbose: bool,
    #[serde(default = "default_true")]
    pub allow_delegation: bool,
    #[serde(default)]
    pub max_iter: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: RecordId,
    pub description: String,
    #[serde(default)]
    pub expected_output: String,
    pub agent_id: RecordId,
    #[serde(default)]
    pub tool_ids: Vec<RecordId>,
    /// Feed the previous task's output into this one
    #[serde(default)]
    pub context: Option<bool>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Process {
    #[default]
    Sequential,
    Hierarchical,
}

impl std::fmt::Display for Process {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sequential => write!(f, "sequential"),
            Self::Hierarchical => write!(f, "hierarchical"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Crew {
    pub id: RecordId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub tasks: Vec<RecordId>,
    #[serde(default)]
    pub agents: Vec<RecordId>,
    #[serde(default)]
    pub process: Process,
    #[serde(default)]
    pub verbose: bool,
    #[serde(default)]
    pub max_rpm: Option<u32>,
}

/// Mask a secret for display: first 3 and last 4 characters
pub fn mask_secret(s: &str) -> String {
    if s.is_empty() {
        return "(empty)".to_string();
    }
    let chars: Vec<char> = s.chars().collect();
    if chars.len() > 7 {
        let prefix: String = chars[..3].iter().collect();
        let suffix: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", prefix, suffix)
    } else {
        "***".to_string()
    }
}
