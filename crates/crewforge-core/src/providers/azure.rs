//! Azure OpenAI provider
//!
//! Reuses the OpenAI wire format against a deployment URL with `api-key` auth.

use anyhow::Result;
use async_trait::async_trait;

use crate::tools::ToolDefinition;

use super::openai::{Endpoint, OpenAiProvider};
use super::types::{ChatMessage, ChatResponse, LlmProvider};

pub const DEFAULT_AZURE_API_VERSION: &str = "2024-06-01";

/// Azure OpenAI provider: wraps [`OpenAiProvider`] with a deployment endpoint
pub struct AzureOpenAiProvider {
    inner: OpenAiProvider,
    deployment: String,
}

impl std::fmt::Debug for AzureOpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureOpenAiProvider")
            .field("deployment", &self.deployment)
            .field("inner", &self.inner)
            .finish()
    }
}

impl AzureOpenAiProvider {
    /// Create a new Azure OpenAI provider.
    ///
    /// - `endpoint`: resource root (e.g. `https://acme.openai.azure.com`)
    /// - `deployment`: the deployment name, which also identifies the model
    pub fn new(
        api_key: String,
        endpoint: String,
        deployment: String,
        api_version: Option<String>,
        max_tokens: u32,
    ) -> Self {
        let endpoint = Endpoint::Azure {
            endpoint,
            deployment: deployment.clone(),
            api_version: api_version.unwrap_or_else(|| DEFAULT_AZURE_API_VERSION.to_string()),
        };
        Self {
            inner: OpenAiProvider::with_endpoint(api_key, deployment.clone(), endpoint, max_tokens),
            deployment,
        }
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.inner = self.inner.with_temperature(temperature);
        self
    }

    pub fn endpoint(&self) -> &Endpoint {
        self.inner.endpoint()
    }
}

#[async_trait]
impl LlmProvider for AzureOpenAiProvider {
    fn provider_name(&self) -> &str {
        self.inner.provider_name()
    }

    fn model(&self) -> &str {
        &self.deployment
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        system: &str,
    ) -> Result<ChatResponse> {
        self.inner.chat(messages, tools, system).await
    }
}
