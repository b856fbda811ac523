//! Retrieval tool over a vector store

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use super::{ToolHandler, json_schema};
use crate::providers::EmbeddingProvider;
use crate::vector::VectorStore;

/// Documents returned when a tool record doesn't set `topK`
pub const DEFAULT_TOP_K: usize = 4;

const NO_RESULTS: &str = "No relevant documents found.";

/// Produces retrieval tools bound to one store and embedding model
pub struct RagToolFactory {
    store: Arc<dyn VectorStore>,
    embeddings: Arc<dyn EmbeddingProvider>,
}

impl RagToolFactory {
    pub fn init(store: Arc<dyn VectorStore>, embeddings: Arc<dyn EmbeddingProvider>) -> Self {
        Self { store, embeddings }
    }

    pub fn generate_tool(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
        top_k: Option<usize>,
    ) -> RagTool {
        RagTool {
            name: name.into(),
            description: description.into(),
            top_k: top_k.unwrap_or(DEFAULT_TOP_K).max(1),
            store: self.store.clone(),
            embeddings: self.embeddings.clone(),
        }
    }
}

pub struct RagTool {
    name: String,
    description: String,
    top_k: usize,
    store: Arc<dyn VectorStore>,
    embeddings: Arc<dyn EmbeddingProvider>,
}

impl RagTool {
    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn collection(&self) -> &str {
        self.store.collection()
    }
}

#[async_trait]
impl ToolHandler for RagTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn input_schema(&self) -> Value {
        json_schema(
            serde_json::json!({
                "query": {
                    "type": "string",
                    "description": "What to search the knowledge base for"
                }
            }),
            vec!["query"],
        )
    }

    async fn execute(&self, input: Value) -> Result<String> {
        let query = input
            .get("query")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow!("Missing 'query' parameter"))?;

        debug!("{} searching {} for: {}", self.name, self.collection(), query);

        let vector = self
            .embeddings
            .embed_query(query)
            .await
            .context("Failed to embed query")?;
        let docs = self.store.similarity_search(vector, self.top_k).await?;

        if docs.is_empty() {
            return Ok(NO_RESULTS.to_string());
        }

        Ok(docs
            .into_iter()
            .map(|d| d.page_content)
            .collect::<Vec<_>>()
            .join("\n\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::InMemoryVectorStore;

    struct CharEmbeddings;

    #[async_trait]
    impl EmbeddingProvider for CharEmbeddings {
        fn provider_name(&self) -> &str {
            "test"
        }
        fn model(&self) -> &str {
            "chars"
        }
        async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    let a = t.matches('a').count() as f32;
                    let b = t.matches('b').count() as f32;
                    vec![a, b]
                })
                .collect())
        }
    }

    fn factory(store: Arc<InMemoryVectorStore>) -> RagToolFactory {
        RagToolFactory::init(store, Arc::new(CharEmbeddings))
    }

    #[tokio::test]
    async fn test_rag_tool_joins_top_k() {
        let store = Arc::new(InMemoryVectorStore::new("kb"));
        store.insert(vec![1.0, 0.0], "all about a", Value::Null);
        store.insert(vec![0.0, 1.0], "all about b", Value::Null);
        store.insert(vec![0.9, 0.1], "mostly a", Value::Null);

        let tool = factory(store).generate_tool("kb_search", "Search the kb", Some(2));
        let out = tool
            .execute(serde_json::json!({"query": "aaa"}))
            .await
            .unwrap();
        assert_eq!(out, "all about a\n\nmostly a");
    }

    #[tokio::test]
    async fn test_rag_tool_empty_store() {
        let store = Arc::new(InMemoryVectorStore::new("empty"));
        let tool = factory(store).generate_tool("kb", "", None);
        assert_eq!(tool.top_k(), DEFAULT_TOP_K);
        let out = tool.execute(serde_json::json!({"query": "a"})).await.unwrap();
        assert_eq!(out, NO_RESULTS);
    }

    #[tokio::test]
    async fn test_rag_tool_requires_query() {
        let store = Arc::new(InMemoryVectorStore::new("kb"));
        let tool = factory(store).generate_tool("kb", "", Some(1));
        let err = tool.execute(serde_json::json!({})).await.unwrap_err();
        assert!(err.to_string().contains("query"));
    }

    #[test]
    fn test_definition_uses_record_fields() {
        let store = Arc::new(InMemoryVectorStore::new("kb"));
        let tool = factory(store).generate_tool("Policy Search", "Searches HR policy", Some(0));
        let def = tool.definition();
        assert_eq!(def.name, "Policy_Search");
        assert_eq!(tool.name(), "Policy Search");
        assert_eq!(def.description, "Searches HR policy");
        assert_eq!(tool.top_k(), 1);
        assert_eq!(tool.collection(), "kb");
    }
}
