//! Turning a model record and its credential into a live provider

use anyhow::Result;
use std::sync::Arc;
use tracing::debug;

use super::{
    AzureOpenAiProvider, FastEmbedProvider, LlmProvider, ModelHandle, OpenAiProvider,
    RetryingProvider,
    openai::{DEFAULT_MAX_TOKENS, DEFAULT_OPENAI_BASE_URL},
};
use crate::error::BuildError;
use crate::records::{Credentials, Model, Platform};

/// Builds providers for model records; the credential's platform picks the kind
pub trait ModelFactory: Send + Sync {
    fn build(&self, model: &Model, credential: &Credentials) -> Result<ModelHandle>;
}

/// Providers that talk to the real HTTP endpoints
#[derive(Debug, Clone)]
pub struct HttpModelFactory {
    max_attempts: u32,
}

impl HttpModelFactory {
    pub fn new() -> Self {
        Self { max_attempts: 3 }
    }

    /// Attempts per chat request, including the first
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    fn retrying(&self, provider: Arc<dyn LlmProvider>) -> ModelHandle {
        if self.max_attempts <= 1 {
            return ModelHandle::Chat(provider);
        }
        ModelHandle::Chat(Arc::new(
            RetryingProvider::new(provider).with_max_attempts(self.max_attempts),
        ))
    }
}

impl Default for HttpModelFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelFactory for HttpModelFactory {
    fn build(&self, model: &Model, credential: &Credentials) -> Result<ModelHandle> {
        debug!(
            "Building {} model {} ({})",
            credential.platform, model.id, model.model_name
        );
        let max_tokens = model.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS);

        let handle = match credential.platform {
            Platform::ChatOpenAi => {
                let base_url = model
                    .base_url
                    .clone()
                    .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string());
                let provider = OpenAiProvider::new(
                    credential.api_key().to_string(),
                    model.model_name.clone(),
                    base_url,
                    max_tokens,
                )
                .with_temperature(model.temperature);
                self.retrying(Arc::new(provider))
            }
            Platform::AzureChatOpenAi => {
                let endpoint = credential
                    .credentials
                    .endpoint
                    .clone()
                    .or_else(|| model.base_url.clone())
                    .ok_or(BuildError::MissingCredentialField {
                        credential: credential.id.clone(),
                        platform: credential.platform,
                        field: "endpoint",
                    })?;
                let provider = AzureOpenAiProvider::new(
                    credential.api_key().to_string(),
                    endpoint,
                    model.model_name.clone(),
                    credential.credentials.api_version.clone(),
                    max_tokens,
                )
                .with_temperature(model.temperature);
                self.retrying(Arc::new(provider))
            }
            Platform::FastEmbed => ModelHandle::Embedding(Arc::new(
                FastEmbedProvider::new(model.model_name.clone(), model.base_url.clone())
                    .with_dimensions(model.embedding_length),
            )),
        };
        Ok(handle)
    }
}
