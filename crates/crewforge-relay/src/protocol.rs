//! Wire format between the relay and the front-end Socket.IO server
//!
//! Only the WebSocket transport is spoken. Every text frame is an Engine.IO
//! packet (`0` open, `1` close, `2` ping, `3` pong, `4` message) and Socket.IO
//! packets ride inside Engine.IO messages (`40` connect, `41` disconnect,
//! `42[..]` event, `44` connect error). Only the default namespace is used.

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

/// Header carrying the shared backend token on connect
pub const TOKEN_HEADER: &str = "x-agent-backend-socket-token";

/// Engine.IO endpoint path on the server
pub const ENGINE_IO_PATH: &str = "/socket.io/";

/// Engine.IO protocol revision spoken by Socket.IO v4 servers
pub const ENGINE_IO_VERSION: &str = "4";

/// One named event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocketEnvelope {
    pub event: String,
    pub data: Value,
}

impl SocketEnvelope {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }
}

/// A decoded text frame
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    /// Engine.IO handshake with the session parameters
    Open(Value),
    Close,
    Ping,
    Pong,
    /// Socket.IO namespace connect; the server's reply carries `{"sid": ..}`
    Connect(Option<Value>),
    Disconnect,
    Event(SocketEnvelope),
    ConnectError(Value),
    /// Anything the relay does not act on (acks, binary, upgrades)
    Other(String),
}

impl Packet {
    /// Decode one text frame
    pub fn parse(frame: &str) -> Result<Self> {
        let mut chars = frame.chars();
        let kind = chars.next().ok_or_else(|| anyhow!("Empty socket frame"))?;
        let rest = chars.as_str();
        match kind {
            '0' => Ok(Packet::Open(
                serde_json::from_str(rest).context("Invalid open packet")?,
            )),
            '1' => Ok(Packet::Close),
            '2' => Ok(Packet::Ping),
            '3' => Ok(Packet::Pong),
            '4' => parse_socket_packet(rest),
            _ => Ok(Packet::Other(frame.to_string())),
        }
    }

    /// Encode as one text frame
    pub fn encode(&self) -> Result<String> {
        let frame = match self {
            Packet::Open(params) => format!("0{}", params),
            Packet::Close => "1".to_string(),
            Packet::Ping => "2".to_string(),
            Packet::Pong => "3".to_string(),
            Packet::Connect(None) => "40".to_string(),
            Packet::Connect(Some(payload)) => format!("40{}", payload),
            Packet::Disconnect => "41".to_string(),
            Packet::Event(env) => {
                let args = serde_json::to_string(&(&env.event, &env.data))
                    .context("Failed to serialize socket event")?;
                format!("42{}", args)
            }
            Packet::ConnectError(payload) => format!("44{}", payload),
            Packet::Other(raw) => raw.clone(),
        };
        Ok(frame)
    }
}

fn parse_socket_packet(body: &str) -> Result<Packet> {
    let mut chars = body.chars();
    let kind = chars.next().ok_or_else(|| anyhow!("Empty socket message"))?;
    let mut rest = chars.as_str();

    // `/nsp,` prefix for non-default namespaces
    if rest.starts_with('/') {
        rest = rest.split_once(',').map(|(_, tail)| tail).unwrap_or("");
    }

    match kind {
        '0' if rest.is_empty() => Ok(Packet::Connect(None)),
        '0' => Ok(Packet::Connect(Some(
            serde_json::from_str(rest).context("Invalid connect packet")?,
        ))),
        '1' => Ok(Packet::Disconnect),
        '2' => {
            // optional ack id before the argument array
            let args = rest.trim_start_matches(|c: char| c.is_ascii_digit());
            let mut values: Vec<Value> =
                serde_json::from_str(args).context("Invalid event packet")?;
            if values.is_empty() {
                return Err(anyhow!("Event packet without a name"));
            }
            let event = match values.remove(0) {
                Value::String(name) => name,
                other => return Err(anyhow!("Event name is not a string: {}", other)),
            };
            let data = if values.is_empty() {
                Value::Null
            } else {
                values.remove(0)
            };
            Ok(Packet::Event(SocketEnvelope { event, data }))
        }
        '4' => Ok(Packet::ConnectError(
            serde_json::from_str(rest).unwrap_or_else(|_| Value::String(rest.to_string())),
        )),
        _ => Ok(Packet::Other(format!("4{}", body))),
    }
}

/// Room name the front-end uses for a session
pub fn room_name(session_id: &str) -> String {
    format!("_{}", session_id)
}

/// Engine.IO WebSocket endpoint for a server URL.
///
/// `http` becomes `ws` and `https` becomes `wss`. The path is replaced by
/// `/socket.io/`. Query parameters are kept, then the Engine.IO revision and
/// transport are appended.
pub fn to_ws_url(raw: &str) -> Result<String> {
    let mut url = Url::parse(raw).map_err(|e| anyhow!("Invalid socket URL '{}': {}", raw, e))?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(anyhow!("Unsupported socket URL scheme: {}", other)),
    };
    url.set_scheme(scheme)
        .map_err(|_| anyhow!("Cannot use scheme {} for {}", scheme, raw))?;
    url.set_path(ENGINE_IO_PATH);
    url.set_fragment(None);
    url.query_pairs_mut()
        .append_pair("EIO", ENGINE_IO_VERSION)
        .append_pair("transport", "websocket");
    Ok(url.to_string())
}
