//! FastEmbed embedding provider
//!
//! FastEmbed models run out of process; the serving endpoint speaks the
//! OpenAI `/v1/embeddings` wire format.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::openai::http_client;
use super::types::EmbeddingProvider;

pub const DEFAULT_FASTEMBED_BASE_URL: &str = "http://localhost:8080";

pub struct FastEmbedProvider {
    client: Client,
    base_url: String,
    model: String,
    dimensions: Option<u32>,
}

impl std::fmt::Debug for FastEmbedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedProvider")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("dimensions", &self.dimensions)
            .finish()
    }
}

impl FastEmbedProvider {
    pub fn new(model: String, base_url: Option<String>) -> Self {
        Self {
            client: http_client(Duration::from_secs(60)),
            base_url: base_url.unwrap_or_else(|| DEFAULT_FASTEMBED_BASE_URL.to_string()),
            model,
            dimensions: None,
        }
    }

    /// Expected vector length; responses of any other length are rejected
    pub fn with_dimensions(mut self, dimensions: Option<u32>) -> Self {
        self.dimensions = dimensions;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn embeddings_url(&self) -> String {
        format!("{}/v1/embeddings", self.base_url.trim_end_matches('/'))
    }

    fn from_response(&self, resp: EmbeddingResponse, expected: usize) -> Result<Vec<Vec<f32>>> {
        if resp.data.len() != expected {
            return Err(anyhow!(
                "Embedding endpoint returned {} vectors for {} inputs",
                resp.data.len(),
                expected
            ));
        }

        let mut data = resp.data;
        data.sort_by_key(|d| d.index);

        let vectors: Vec<Vec<f32>> = data.into_iter().map(|d| d.embedding).collect();
        if let Some(dims) = self.dimensions {
            if let Some(bad) = vectors.iter().find(|v| v.len() != dims as usize) {
                return Err(anyhow!(
                    "Embedding length mismatch for {}: expected {}, got {}",
                    self.model,
                    dims,
                    bad.len()
                ));
            }
        }
        Ok(vectors)
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    fn provider_name(&self) -> &str {
        "fastembed"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let body = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };

        debug!("FastEmbed request: model={}, inputs={}", self.model, texts.len());

        let response = self
            .client
            .post(self.embeddings_url())
            .json(&body)
            .send()
            .await
            .context("Failed to send request to embedding endpoint")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow!(
                "Embedding request failed with status {}: {}",
                status,
                error_text
            ));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .context("Failed to parse embedding response")?;

        self.from_response(parsed, texts.len())
    }
}

// ── Wire types ──

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(json: &str) -> EmbeddingResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_default_base_url() {
        let p = FastEmbedProvider::new("BAAI/bge-small-en-v1.5".to_string(), None);
        assert_eq!(p.base_url(), DEFAULT_FASTEMBED_BASE_URL);
        assert_eq!(p.embeddings_url(), "http://localhost:8080/v1/embeddings");
        assert_eq!(p.provider_name(), "fastembed");
    }

    #[test]
    fn test_from_response_orders_by_index() {
        let p = FastEmbedProvider::new("m".to_string(), None);
        let resp = response(
            r#"{"data": [
                {"index": 1, "embedding": [0.0, 1.0]},
                {"index": 0, "embedding": [1.0, 0.0]}
            ]}"#,
        );
        let vectors = p.from_response(resp, 2).unwrap();
        assert_eq!(vectors[0], vec![1.0, 0.0]);
        assert_eq!(vectors[1], vec![0.0, 1.0]);
    }

    #[test]
    fn test_from_response_rejects_count_mismatch() {
        let p = FastEmbedProvider::new("m".to_string(), None);
        let resp = response(r#"{"data": [{"index": 0, "embedding": [1.0]}]}"#);
        assert!(p.from_response(resp, 2).is_err());
    }

    #[test]
    fn test_from_response_checks_dimensions() {
        let p = FastEmbedProvider::new("m".to_string(), None).with_dimensions(Some(3));
        let resp = response(r#"{"data": [{"index": 0, "embedding": [1.0, 2.0]}]}"#);
        let err = p.from_response(resp, 1).unwrap_err();
        assert!(err.to_string().contains("expected 3, got 2"));
    }

    #[tokio::test]
    async fn test_embed_documents_empty_input_skips_request() {
        let p = FastEmbedProvider::new("m".to_string(), Some("http://127.0.0.1:9".to_string()));
        let vectors = p.embed_documents(&[]).await.unwrap();
        assert!(vectors.is_empty());
    }
}
