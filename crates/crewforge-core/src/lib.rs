//! crewforge-core - assembles and runs agent crews from configuration records
//!
//! This crate provides:
//! - Record types and key-subset lookups over scoped record maps
//! - OpenAI, Azure OpenAI and FastEmbed providers
//! - Retrieval tools over vector stores (Qdrant or in-memory)
//! - A sequential crew runtime with a tool-use loop
//! - `CrewBuilder`, which resolves records into a runnable crew and streams
//!   finished steps to an [`EventSink`]

pub mod builder;
pub mod bundle;
pub mod crew;
pub mod error;
pub mod events;
pub mod keys;
pub mod providers;
pub mod records;
pub mod tools;
pub mod vector;

#[cfg(test)]
mod testing;

// Re-export main types for convenience
pub use builder::{CrewBuilder, StepForwarder};
pub use bundle::{FileRecordSource, FlatRecords, RecordBundle, RecordSource};
pub use crew::{Crew, CrewAgent, CrewOutput, CrewTask, StepCallback, StepEvent};
pub use error::BuildError;
pub use events::{EventSink, Message, NullSink, SocketEvents, SocketMessage, send};
pub use keys::{KeyedMap, MatchMode, match_entry, match_key, search_subordinate_keys};
pub use providers::{LlmProvider, ModelHandle};
pub use records::{KeySet, RecordId, keyset};
pub use tools::{ToolExecutor, ToolHandler, ToolSet};
pub use vector::{Document, QdrantFactory, VectorStore, VectorStoreFactory};
