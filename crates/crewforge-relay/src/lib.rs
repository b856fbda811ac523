//! crewforge-relay - streams crew progress to the front-end
//!
//! Connects to the front-end's Socket.IO server over its WebSocket
//! transport, joins the session's room and emits events into it.

pub mod client;
pub mod protocol;

pub use client::{SocketClient, SocketConfig};
pub use protocol::{Packet, SocketEnvelope, TOKEN_HEADER, room_name, to_ws_url};
