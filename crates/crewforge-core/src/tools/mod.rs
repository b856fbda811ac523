//! Tool handlers and the per-agent tool set

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

pub mod rag;

pub use rag::{RagTool, RagToolFactory};

/// Tool definition handed to the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Trait for executing tools by name
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, tool_name: &str, input: Value) -> Result<String>;
    fn list_tools(&self) -> Vec<ToolDefinition>;
}

/// Individual tool handler
#[async_trait]
pub trait ToolHandler: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn input_schema(&self) -> Value;
    async fn execute(&self, input: Value) -> Result<String>;

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: function_name(self.name()),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
        }
    }
}

/// Ordered set of tools available to one agent or task.
///
/// A tool whose record name is already present is ignored, so the first
/// registration wins. Distinct tools whose names sanitise to the same
/// function name get a numeric suffix so the model can tell them apart.
#[derive(Clone, Default)]
pub struct ToolSet {
    tools: Vec<(String, Arc<dyn ToolHandler>)>,
}

impl ToolSet {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Register a tool handler
    pub fn register(&mut self, handler: Arc<dyn ToolHandler>) {
        if self.tools.iter().any(|(_, t)| t.name() == handler.name()) {
            debug!("Tool {} already registered, keeping first", handler.name());
            return;
        }

        let base = function_name(handler.name());
        let mut fn_name = base.clone();
        let mut n = 2;
        while self.tools.iter().any(|(f, _)| *f == fn_name) {
            let suffix = format!("_{}", n);
            let keep = base.len().min(MAX_FUNCTION_NAME - suffix.len());
            fn_name = format!("{}{}", &base[..keep], suffix);
            n += 1;
        }
        if fn_name != base {
            warn!(
                "Tool {} collides with function name {}, exposing it as {}",
                handler.name(),
                base,
                fn_name
            );
        }

        debug!("Registering tool: {} as {}", handler.name(), fn_name);
        self.tools.push((fn_name, handler));
    }

    /// Get a tool by the function name the model sees, else by record name
    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.tools
            .iter()
            .find(|(f, _)| f == name)
            .or_else(|| self.tools.iter().find(|(_, t)| t.name() == name))
            .map(|(_, t)| t.clone())
    }

    /// Union of two sets, `self` first
    pub fn merged(&self, other: &ToolSet) -> ToolSet {
        let mut merged = self.clone();
        for (_, tool) in &other.tools {
            merged.register(tool.clone());
        }
        merged
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|(_, t)| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl FromIterator<Arc<dyn ToolHandler>> for ToolSet {
    fn from_iter<I: IntoIterator<Item = Arc<dyn ToolHandler>>>(iter: I) -> Self {
        let mut set = Self::new();
        for tool in iter {
            set.register(tool);
        }
        set
    }
}

#[async_trait]
impl ToolExecutor for ToolSet {
    async fn execute(&self, tool_name: &str, input: Value) -> Result<String> {
        debug!("Executing tool: {} with input: {:?}", tool_name, input);

        let handler = self
            .get(tool_name)
            .ok_or_else(|| anyhow!("Unknown tool: {}", tool_name))?;

        match handler.execute(input).await {
            Ok(result) => {
                debug!("Tool {} succeeded", tool_name);
                Ok(result)
            }
            Err(e) => {
                warn!("Tool {} failed: {}", tool_name, e);
                Err(e)
            }
        }
    }

    fn list_tools(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|(fn_name, t)| ToolDefinition {
                name: fn_name.clone(),
                ..t.definition()
            })
            .collect()
    }
}

const MAX_FUNCTION_NAME: usize = 64;

/// Function-calling name for a free-text tool name: `[A-Za-z0-9_-]`, at most 64 chars
pub fn function_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_FUNCTION_NAME)
        .collect();
    if cleaned.is_empty() {
        "tool".to_string()
    } else {
        cleaned
    }
}

/// Helper function to create a JSON schema for tool input
pub fn json_schema(properties: Value, required: Vec<&str>) -> Value {
    serde_json::json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}
