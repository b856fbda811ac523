//! Messages streamed to the front-end and the sink they are emitted through

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Event names understood by the front-end socket server
pub struct SocketEvents;

impl SocketEvents {
    pub const MESSAGE: &'static str = "message";
    pub const JOIN_ROOM: &'static str = "join_room";
}

/// A chat message addressed to a session room
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SocketMessage {
    pub room: String,
    pub author_name: String,
    pub message: Message,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub text: String,
    #[serde(default)]
    pub tokens: u32,
    #[serde(default)]
    pub first: bool,
    /// Milliseconds since the Unix epoch
    #[serde(default)]
    pub timestamp: i64,
}

impl Message {
    /// Message stamped with the current time
    pub fn new(text: impl Into<String>, tokens: u32, first: bool) -> Self {
        Self {
            text: text.into(),
            tokens,
            first,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// Destination for named events, e.g. a socket connection
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: &str, payload: Value) -> Result<()>;
}

/// Serialize `message` and emit it under `event`
pub async fn send<T: Serialize + Sync>(
    sink: &dyn EventSink,
    event: &str,
    message: &T,
) -> Result<()> {
    let payload = serde_json::to_value(message).context("Failed to serialize socket message")?;
    debug!("Emitting '{}': {}", event, payload);
    sink.emit(event, payload).await
}

/// Sink that drops everything, for runs without a front-end
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

#[async_trait]
impl EventSink for NullSink {
    async fn emit(&self, event: &str, _payload: Value) -> Result<()> {
        debug!("Dropping '{}' event, no socket attached", event);
        Ok(())
    }
}
