//! Socket.IO client that joins a session room and emits events into it

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crewforge_core::events::{EventSink, SocketEvents};
use crewforge_core::records::mask_secret;

use crate::protocol::{Packet, SocketEnvelope, TOKEN_HEADER, room_name, to_ws_url};

/// How long `close` waits for queued frames to flush
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on the open and namespace-connect exchange
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Where to connect and how to authenticate
#[derive(Clone)]
pub struct SocketConfig {
    pub url: String,
    pub token: String,
}

impl std::fmt::Debug for SocketConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketConfig")
            .field("url", &self.url)
            .field("token", &mask_secret(&self.token))
            .finish()
    }
}

enum Outgoing {
    Frame(String),
    Close,
}

/// Connected socket; emits are queued to a single writer task
pub struct SocketClient {
    url: String,
    sid: Option<String>,
    tx: mpsc::UnboundedSender<Outgoing>,
    cancel: CancellationToken,
    writer: Mutex<Option<JoinHandle<()>>>,
}

impl SocketClient {
    /// Connect, sending the backend token header; failures are logged and returned
    pub async fn connect(config: &SocketConfig) -> Result<Self> {
        info!("Socket URL: {}", config.url);
        match Self::try_connect(config).await {
            Ok(client) => Ok(client),
            Err(e) => {
                error!("Connection error occurred: {:#}", e);
                Err(e)
            }
        }
    }

    async fn try_connect(config: &SocketConfig) -> Result<Self> {
        let url = to_ws_url(&config.url)?;
        let mut request = url
            .as_str()
            .into_client_request()
            .with_context(|| format!("Invalid socket request for {}", url))?;
        if !config.token.is_empty() {
            let token = HeaderValue::from_str(&config.token)
                .context("Socket token is not a valid header value")?;
            request.headers_mut().insert(TOKEN_HEADER, token);
        }

        let (stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .with_context(|| format!("Failed to connect to {}", url))?;
        debug!("WebSocket connected to {}", url);

        let (mut ws_sender, mut ws_receiver) = stream.split();
        let sid = tokio::time::timeout(
            HANDSHAKE_TIMEOUT,
            handshake(&mut ws_sender, &mut ws_receiver),
        )
        .await
        .map_err(|_| anyhow!("Socket handshake with {} timed out", url))??;
        info!("Socket connected (sid {})", sid.as_deref().unwrap_or("-"));

        let (tx, rx) = mpsc::unbounded_channel::<Outgoing>();
        let cancel = CancellationToken::new();

        let writer = tokio::spawn(write_loop(ws_sender, rx, cancel.clone()));
        tokio::spawn(read_loop(ws_receiver, tx.clone(), cancel.clone()));

        Ok(Self {
            url,
            sid,
            tx,
            cancel,
            writer: Mutex::new(Some(writer)),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Session id the server assigned on namespace connect
    pub fn sid(&self) -> Option<&str> {
        self.sid.as_deref()
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled() || self.tx.is_closed()
    }

    /// Queue an event frame
    pub fn emit(&self, event: &str, data: Value) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(anyhow!("Socket to {} is closed", self.url));
        }
        let frame = Packet::Event(SocketEnvelope::new(event, data)).encode()?;
        self.tx
            .send(Outgoing::Frame(frame))
            .map_err(|_| anyhow!("Socket writer for {} has stopped", self.url))
    }

    /// Join the front-end room for `session_id`
    pub fn join_room(&self, session_id: &str) -> Result<()> {
        let room = room_name(session_id);
        info!("Joining room {}", room);
        self.emit(SocketEvents::JOIN_ROOM, Value::String(room))
    }

    /// Flush queued frames, disconnect and stop background tasks
    pub async fn close(&self) {
        let _ = self.tx.send(Outgoing::Close);
        if let Some(writer) = self.writer.lock().await.take() {
            if tokio::time::timeout(CLOSE_TIMEOUT, writer).await.is_err() {
                warn!("Socket writer did not stop within {:?}", CLOSE_TIMEOUT);
            }
        }
        self.cancel.cancel();
    }
}

impl Drop for SocketClient {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[async_trait]
impl EventSink for SocketClient {
    async fn emit(&self, event: &str, payload: Value) -> Result<()> {
        SocketClient::emit(self, event, payload)
    }
}

/// Wait for the Engine.IO open packet, connect the default namespace and
/// return the Socket.IO session id from the server's reply
async fn handshake(
    sender: &mut SplitSink<WsStream, Message>,
    receiver: &mut SplitStream<WsStream>,
) -> Result<Option<String>> {
    match next_packet(receiver).await? {
        Packet::Open(params) => debug!("Engine.IO open: {}", params),
        other => return Err(anyhow!("Expected open packet, got {:?}", other)),
    }

    sender
        .send(Message::Text(Packet::Connect(None).encode()?.into()))
        .await
        .context("Failed to send namespace connect")?;

    loop {
        match next_packet(receiver).await? {
            Packet::Connect(payload) => {
                let sid = payload
                    .as_ref()
                    .and_then(|p| p.get("sid"))
                    .and_then(Value::as_str)
                    .map(str::to_string);
                return Ok(sid);
            }
            Packet::ConnectError(reason) => {
                return Err(anyhow!("Server refused connection: {}", reason));
            }
            Packet::Ping => {
                sender
                    .send(Message::Text(Packet::Pong.encode()?.into()))
                    .await
                    .context("Failed to answer ping")?;
            }
            Packet::Close | Packet::Disconnect => {
                return Err(anyhow!("Server closed the socket during handshake"));
            }
            other => debug!("Ignoring packet during handshake: {:?}", other),
        }
    }
}

async fn next_packet(receiver: &mut SplitStream<WsStream>) -> Result<Packet> {
    loop {
        match receiver.next().await {
            Some(Ok(Message::Text(text))) => return Packet::parse(text.as_str()),
            Some(Ok(Message::Close(_))) | None => {
                return Err(anyhow!("Socket closed during handshake"));
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(anyhow!("Socket read error: {}", e)),
        }
    }
}

async fn write_loop(
    mut ws_sender: SplitSink<WsStream, Message>,
    mut rx: mpsc::UnboundedReceiver<Outgoing>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            next = rx.recv() => match next {
                Some(Outgoing::Frame(text)) => {
                    if let Err(e) = ws_sender.send(Message::Text(text.into())).await {
                        error!("Socket send failed: {}", e);
                        break;
                    }
                }
                Some(Outgoing::Close) | None => {
                    if let Ok(frame) = Packet::Disconnect.encode() {
                        if let Err(e) = ws_sender.send(Message::Text(frame.into())).await {
                            debug!("Socket disconnect packet not sent: {}", e);
                        }
                    }
                    if let Err(e) = ws_sender.send(Message::Close(None)).await {
                        debug!("Socket close frame not sent: {}", e);
                    }
                    break;
                }
            },
        }
    }
    cancel.cancel();
    debug!("Socket writer stopped");
}

async fn read_loop(
    mut ws_receiver: SplitStream<WsStream>,
    tx: mpsc::UnboundedSender<Outgoing>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            frame = ws_receiver.next() => match frame {
                Some(Ok(Message::Text(text))) => match Packet::parse(text.as_str()) {
                    Ok(Packet::Ping) => {
                        let pong = Packet::Pong.encode().map(Outgoing::Frame);
                        if let Ok(pong) = pong {
                            let _ = tx.send(pong);
                        }
                    }
                    Ok(Packet::Close) | Ok(Packet::Disconnect) => {
                        info!("Socket disconnected by server");
                        cancel.cancel();
                        break;
                    }
                    Ok(packet) => debug!("Socket received: {:?}", packet),
                    Err(e) => warn!("Unreadable socket frame {:?}: {}", text.as_str(), e),
                },
                Some(Ok(Message::Close(_))) | None => {
                    info!("Socket closed by server");
                    cancel.cancel();
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("Socket read error: {}", e);
                    cancel.cancel();
                    break;
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;
    use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

    const OPEN: &str = r#"0{"sid":"eio-1","upgrades":[],"pingInterval":25000,"pingTimeout":20000}"#;

    /// What the server saw on the upgrade request
    struct Upgrade {
        uri: String,
        token: Option<String>,
    }

    /// Accepts one Socket.IO connection. It answers the namespace connect with
    /// `connect_reply`, pings once, then reports every packet it receives.
    async fn spawn_server(
        connect_reply: &'static str,
    ) -> (String, oneshot::Receiver<Upgrade>, mpsc::UnboundedReceiver<Packet>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (upgrade_tx, upgrade_rx) = oneshot::channel();
        let (packet_tx, packet_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let callback = |req: &Request, resp: Response| {
                let token = req
                    .headers()
                    .get(TOKEN_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                let uri = req.uri().to_string();
                let _ = upgrade_tx.send(Upgrade { uri, token });
                Ok::<Response, ErrorResponse>(resp)
            };
            let mut ws = tokio_tungstenite::accept_hdr_async(stream, callback)
                .await
                .unwrap();

            ws.send(Message::Text(OPEN.to_string().into())).await.unwrap();
            match ws.next().await {
                Some(Ok(Message::Text(text))) => assert_eq!(text.as_str(), "40"),
                other => panic!("expected namespace connect, got {:?}", other),
            }
            ws.send(Message::Text(connect_reply.to_string().into())).await.unwrap();
            if connect_reply.starts_with("44") {
                return;
            }
            ws.send(Message::Text("2".to_string().into())).await.unwrap();

            while let Some(Ok(msg)) = ws.next().await {
                match msg {
                    Message::Text(text) => {
                        let _ = packet_tx.send(Packet::parse(text.as_str()).unwrap());
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        });

        (format!("http://{}", addr), upgrade_rx, packet_rx)
    }

    /// Next event packet, skipping pongs and other control traffic
    async fn next_event(packets: &mut mpsc::UnboundedReceiver<Packet>) -> SocketEnvelope {
        loop {
            match packets.recv().await.unwrap() {
                Packet::Event(env) => return env,
                _ => continue,
            }
        }
    }

    #[tokio::test]
    async fn test_connect_join_and_emit() {
        let (url, upgrade_rx, mut packets) = spawn_server(r#"40{"sid":"sio-7"}"#).await;
        let config = SocketConfig {
            url,
            token: "backend-secret".to_string(),
        };

        let client = SocketClient::connect(&config).await.unwrap();
        assert!(client.url().starts_with("ws://127.0.0.1:"));
        assert_eq!(client.sid(), Some("sio-7"));

        let upgrade = upgrade_rx.await.unwrap();
        assert_eq!(upgrade.uri, "/socket.io/?EIO=4&transport=websocket");
        assert_eq!(upgrade.token.as_deref(), Some("backend-secret"));

        client.join_room("abc123").unwrap();
        client
            .emit("message", serde_json::json!({"room": "abc123"}))
            .unwrap();

        let join = next_event(&mut packets).await;
        assert_eq!(join.event, "join_room");
        assert_eq!(join.data, "_abc123");

        let msg = next_event(&mut packets).await;
        assert_eq!(msg.event, "message");
        assert_eq!(msg.data["room"], "abc123");

        client.close().await;
        assert!(client.is_closed());
        assert!(client.emit("message", Value::Null).is_err());

        let mut rest = Vec::new();
        while let Some(packet) = packets.recv().await {
            rest.push(packet);
        }
        assert_eq!(rest.last(), Some(&Packet::Disconnect));
    }

    #[tokio::test]
    async fn test_answers_server_ping() {
        let (url, _upgrade_rx, mut packets) = spawn_server("40").await;
        let client = SocketClient::connect(&SocketConfig {
            url,
            token: String::new(),
        })
        .await
        .unwrap();
        assert_eq!(client.sid(), None);

        assert_eq!(packets.recv().await, Some(Packet::Pong));
        client.close().await;
    }

    #[tokio::test]
    async fn test_event_sink_impl() {
        let (url, _upgrade_rx, mut packets) = spawn_server("40").await;
        let client = Arc::new(
            SocketClient::connect(&SocketConfig {
                url,
                token: String::new(),
            })
            .await
            .unwrap(),
        );

        let sink: Arc<dyn EventSink> = client.clone();
        sink.emit("message", serde_json::json!({"text": "hi"}))
            .await
            .unwrap();

        let frame = next_event(&mut packets).await;
        assert_eq!(frame.data["text"], "hi");
        client.close().await;
    }

    #[tokio::test]
    async fn test_refused_namespace_connect_is_an_error() {
        let (url, _upgrade_rx, _packets) =
            spawn_server(r#"44{"message":"invalid token"}"#).await;
        let err = SocketClient::connect(&SocketConfig {
            url,
            token: "wrong".to_string(),
        })
        .await
        .err()
        .unwrap();
        assert!(format!("{:#}", err).contains("invalid token"));
    }

    #[tokio::test]
    async fn test_connect_failure_is_returned() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = SocketClient::connect(&SocketConfig {
            url: format!("http://{}", addr),
            token: String::new(),
        })
        .await;
        assert!(result.is_err());
    }

    #[test]
    fn test_config_debug_masks_token() {
        let config = SocketConfig {
            url: "http://localhost:3001".to_string(),
            token: "super-secret-token".to_string(),
        };
        let debug = format!("{:?}", config);
        assert!(!debug.contains("super-secret-token"));
    }
}
