//! In-process vector store with cosine similarity

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::{Document, VectorStore, VectorStoreFactory};

pub struct InMemoryVectorStore {
    collection: String,
    points: RwLock<Vec<(Vec<f32>, Document)>>,
}

impl InMemoryVectorStore {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            points: RwLock::new(Vec::new()),
        }
    }

    pub fn insert(&self, vector: Vec<f32>, page_content: impl Into<String>, metadata: Value) {
        let doc = Document {
            page_content: page_content.into(),
            metadata,
            score: 0.0,
        };
        match self.points.write() {
            Ok(mut points) => points.push((vector, doc)),
            Err(poisoned) => poisoned.into_inner().push((vector, doc)),
        }
    }

    pub fn len(&self) -> usize {
        self.points.read().map(|p| p.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Calculate cosine similarity between two vectors
    fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() {
            return 0.0;
        }

        let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

        if magnitude_a == 0.0 || magnitude_b == 0.0 {
            return 0.0;
        }

        dot_product / (magnitude_a * magnitude_b)
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    fn collection(&self) -> &str {
        &self.collection
    }

    async fn similarity_search(&self, query: Vec<f32>, k: usize) -> Result<Vec<Document>> {
        let points = match self.points.read() {
            Ok(points) => points,
            Err(poisoned) => poisoned.into_inner(),
        };

        let mut results: Vec<Document> = points
            .iter()
            .map(|(vector, doc)| Document {
                score: Self::cosine_similarity(&query, vector),
                ..doc.clone()
            })
            .collect();

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(k);
        Ok(results)
    }
}

/// Hands out shared in-memory stores, one per collection
#[derive(Default)]
pub struct InMemoryFactory {
    stores: RwLock<HashMap<String, Arc<InMemoryVectorStore>>>,
}

impl InMemoryFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store for `collection`, created on first use
    pub fn store(&self, collection: &str) -> Arc<InMemoryVectorStore> {
        let mut stores = match self.stores.write() {
            Ok(stores) => stores,
            Err(poisoned) => poisoned.into_inner(),
        };
        stores
            .entry(collection.to_string())
            .or_insert_with(|| Arc::new(InMemoryVectorStore::new(collection)))
            .clone()
    }

    pub fn collections(&self) -> Vec<String> {
        let stores = match self.stores.read() {
            Ok(stores) => stores,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut names: Vec<String> = stores.keys().cloned().collect();
        names.sort();
        names
    }
}

impl VectorStoreFactory for InMemoryFactory {
    fn open(
        &self,
        collection: &str,
        _vector_name: Option<&str>,
        _content_key: &str,
    ) -> Result<Arc<dyn VectorStore>> {
        Ok(self.store(collection))
    }
}
