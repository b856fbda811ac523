//! Chat and embedding model providers
//!
//! Chat providers implement [`LlmProvider`]; embedding providers implement
//! [`EmbeddingProvider`]. The builder hands them around as a [`ModelHandle`].

pub mod azure;
pub mod embeddings;
pub mod factory;
pub mod openai;
pub mod retry;
pub mod types;

use std::sync::Arc;

pub use azure::AzureOpenAiProvider;
pub use embeddings::FastEmbedProvider;
pub use factory::{HttpModelFactory, ModelFactory};
pub use openai::{Endpoint, OpenAiProvider};
pub use retry::RetryingProvider;
pub use types::{
    ChatBlock, ChatMessage, ChatMessageContent, ChatResponse, ChatResponseBlock, ChatRole,
    ChatUsage, EmbeddingProvider, LlmProvider, StopReason,
};

/// A constructed model, either side of the chat/embedding split
#[derive(Clone)]
pub enum ModelHandle {
    Chat(Arc<dyn LlmProvider>),
    Embedding(Arc<dyn EmbeddingProvider>),
}

impl ModelHandle {
    pub fn as_chat(&self) -> Option<&Arc<dyn LlmProvider>> {
        match self {
            Self::Chat(p) => Some(p),
            Self::Embedding(_) => None,
        }
    }

    pub fn as_embedding(&self) -> Option<&Arc<dyn EmbeddingProvider>> {
        match self {
            Self::Chat(_) => None,
            Self::Embedding(p) => Some(p),
        }
    }

    pub fn model(&self) -> &str {
        match self {
            Self::Chat(p) => p.model(),
            Self::Embedding(p) => p.model(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Chat(_) => "chat",
            Self::Embedding(_) => "embedding",
        }
    }
}

impl std::fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHandle")
            .field("kind", &self.kind())
            .field("model", &self.model())
            .finish()
    }
}
