//! Qdrant-backed vector store

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use qdrant_client::{
    Qdrant,
    qdrant::{SearchPointsBuilder, Value, value::Kind},
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::{Document, VectorStore, VectorStoreFactory};

/// Payload key holding per-chunk metadata
const METADATA_KEY: &str = "metadata";

pub struct QdrantStore {
    client: Arc<Qdrant>,
    collection: String,
    vector_name: Option<String>,
    content_key: String,
}

impl QdrantStore {
    pub fn new(
        client: Arc<Qdrant>,
        collection: impl Into<String>,
        vector_name: Option<String>,
        content_key: impl Into<String>,
    ) -> Self {
        Self {
            client,
            collection: collection.into(),
            vector_name,
            content_key: content_key.into(),
        }
    }

    pub fn vector_name(&self) -> Option<&str> {
        self.vector_name.as_deref()
    }

    fn payload_to_document(&self, payload: &HashMap<String, Value>, score: f32) -> Document {
        let page_content = match payload.get(&self.content_key).and_then(|v| v.kind.as_ref()) {
            Some(Kind::StringValue(s)) => s.clone(),
            Some(_) | None => String::new(),
        };
        let metadata = payload
            .get(METADATA_KEY)
            .map(value_to_json)
            .unwrap_or(serde_json::Value::Null);

        Document {
            page_content,
            metadata,
            score,
        }
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    fn collection(&self) -> &str {
        &self.collection
    }

    async fn similarity_search(&self, query: Vec<f32>, k: usize) -> Result<Vec<Document>> {
        let mut request =
            SearchPointsBuilder::new(self.collection.as_str(), query, k as u64).with_payload(true);
        if let Some(name) = &self.vector_name {
            request = request.vector_name(name.as_str());
        }

        let response = self
            .client
            .search_points(request)
            .await
            .with_context(|| format!("Failed to search Qdrant collection {}", self.collection))?;

        debug!(
            "Qdrant returned {} points from {}",
            response.result.len(),
            self.collection
        );

        Ok(response
            .result
            .iter()
            .map(|point| self.payload_to_document(&point.payload, point.score))
            .collect())
    }
}

/// Opens [`QdrantStore`]s sharing one client
pub struct QdrantFactory {
    client: Arc<Qdrant>,
}

impl QdrantFactory {
    pub fn new(url: &str) -> Result<Self> {
        let client = Qdrant::from_url(url)
            .build()
            .context("Failed to create Qdrant client")?;
        Ok(Self {
            client: Arc::new(client),
        })
    }
}

impl VectorStoreFactory for QdrantFactory {
    fn open(
        &self,
        collection: &str,
        vector_name: Option<&str>,
        content_key: &str,
    ) -> Result<Arc<dyn VectorStore>> {
        Ok(Arc::new(QdrantStore::new(
            self.client.clone(),
            collection,
            vector_name.map(str::to_string),
            content_key,
        )))
    }
}

/// Convert a Qdrant payload value to JSON
fn value_to_json(value: &Value) -> serde_json::Value {
    match &value.kind {
        Some(Kind::NullValue(_)) | None => serde_json::Value::Null,
        Some(Kind::BoolValue(b)) => serde_json::Value::Bool(*b),
        Some(Kind::IntegerValue(i)) => serde_json::Value::from(*i),
        Some(Kind::DoubleValue(d)) => serde_json::Number::from_f64(*d)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Some(Kind::StringValue(s)) => serde_json::Value::String(s.clone()),
        Some(Kind::ListValue(list)) => {
            serde_json::Value::Array(list.values.iter().map(value_to_json).collect())
        }
        Some(Kind::StructValue(st)) => serde_json::Value::Object(
            st.fields
                .iter()
                .map(|(k, v)| (k.clone(), value_to_json(v)))
                .collect(),
        ),
    }
}
