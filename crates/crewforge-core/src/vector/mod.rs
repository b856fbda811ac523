//! Vector store port used by retrieval tools

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

pub mod memory;
pub mod qdrant;

pub use memory::{InMemoryFactory, InMemoryVectorStore};
pub use qdrant::{QdrantFactory, QdrantStore};

/// Payload key holding the chunk text when a datasource doesn't name one
pub const DEFAULT_CONTENT_KEY: &str = "page_content";

/// A retrieved chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub page_content: String,
    #[serde(default)]
    pub metadata: Value,
    #[serde(default)]
    pub score: f32,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Collection this store searches
    fn collection(&self) -> &str;

    /// Top `k` documents closest to `query`
    async fn similarity_search(&self, query: Vec<f32>, k: usize) -> Result<Vec<Document>>;
}

/// Opens stores on named collections
pub trait VectorStoreFactory: Send + Sync {
    fn open(
        &self,
        collection: &str,
        vector_name: Option<&str>,
        content_key: &str,
    ) -> Result<Arc<dyn VectorStore>>;
}
