//! WebSocket client for the job progress hub.
//!
//! [`HubClient`] holds the hub URL and an HTTP client. Each call to
//! [`Transport::connect`] negotiates a connection token, opens the
//! WebSocket, performs the protocol handshake, and spawns a pump task
//! that moves frames between the socket and the [`Connection`]
//! channels. The pump also sends keep-alive pings and treats a silent
//! server as a dropped connection.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::messages::{parse_invocation, ClientCommand, ServerMessage};
use crate::protocol::{self, HubFrame, RECORD_SEPARATOR};
use crate::transport::{Connection, Transport, TransportError};

/// Interval between client keep-alive pings.
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Silence from the server longer than this drops the connection.
pub const SERVER_TIMEOUT: Duration = Duration::from_secs(30);

/// Deadline for the server's handshake response.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(15);

type HubStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Configuration handle for the job progress hub.
///
/// Stores the hub URL (e.g. `https://host/jobProgressHub`) and the HTTP
/// client used for the negotiate request.
pub struct HubClient {
    hub_url: String,
    http: reqwest::Client,
}

/// Response of `POST {hub}/negotiate?negotiateVersion=1`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NegotiateResponse {
    #[serde(default)]
    connection_id: Option<String>,
    #[serde(default)]
    connection_token: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl HubClient {
    pub fn new(hub_url: String) -> Self {
        Self {
            hub_url,
            http: reqwest::Client::new(),
        }
    }

    /// Reuse an existing [`reqwest::Client`] for the negotiate call.
    pub fn with_client(http: reqwest::Client, hub_url: String) -> Self {
        Self { hub_url, http }
    }

    pub fn hub_url(&self) -> &str {
        &self.hub_url
    }

    /// Ask the hub for a connection id and token.
    async fn negotiate(&self, token: &str) -> Result<NegotiateResponse, TransportError> {
        let url = format!(
            "{}/negotiate?negotiateVersion=1",
            self.hub_url.trim_end_matches('/')
        );

        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| TransportError::Negotiate(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(TransportError::Auth(format!(
                "Hub rejected credentials ({status})"
            )));
        }
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(TransportError::Negotiate(format!("HTTP {status}: {body}")));
        }

        let negotiated: NegotiateResponse = response
            .json()
            .await
            .map_err(|e| TransportError::Negotiate(e.to_string()))?;

        if let Some(error) = negotiated.error {
            return Err(TransportError::Negotiate(error));
        }
        Ok(negotiated)
    }
}

#[async_trait]
impl Transport for HubClient {
    async fn connect(&self, token: &str) -> Result<Connection, TransportError> {
        let negotiated = self.negotiate(token).await?;
        let connection_id = negotiated.connection_id.clone();
        let url = websocket_url(
            &self.hub_url,
            negotiated
                .connection_token
                .as_deref()
                .or(negotiated.connection_id.as_deref()),
            token,
        )?;

        let (mut ws_stream, _response) = connect_async(url.as_str()).await.map_err(|e| {
            TransportError::Connection(format!(
                "Failed to connect to hub at {}: {e}",
                self.hub_url
            ))
        })?;

        let leftover = handshake(&mut ws_stream).await?;

        tracing::info!(
            connection_id = connection_id.as_deref().unwrap_or("-"),
            "Connected to job progress hub at {}",
            self.hub_url,
        );

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_pump(ws_stream, command_rx, event_tx, leftover));

        Ok(Connection {
            connection_id,
            commands: command_tx,
            events: event_rx,
        })
    }
}

/// Build the WebSocket URL from the hub URL.
///
/// `http(s)` schemes become `ws(s)`; the connection token and bearer
/// token are appended as `id` and `access_token` query parameters.
pub fn websocket_url(
    hub_url: &str,
    connection_token: Option<&str>,
    access_token: &str,
) -> Result<String, TransportError> {
    let base = if let Some(rest) = hub_url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = hub_url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else if hub_url.starts_with("ws://") || hub_url.starts_with("wss://") {
        hub_url.to_string()
    } else {
        return Err(TransportError::Connection(format!(
            "Unsupported hub URL scheme: {hub_url}"
        )));
    };

    let base = base.trim_end_matches('/');
    let separator = if base.contains('?') { '&' } else { '?' };
    let mut url = format!("{base}{separator}");
    if let Some(id) = connection_token {
        url.push_str(&format!("id={}&", urlencoding::encode(id)));
    }
    url.push_str(&format!("access_token={}", urlencoding::encode(access_token)));
    Ok(url)
}

/// Send the protocol handshake and wait for the server's answer.
///
/// Returns any records that arrived in the same text message after the
/// handshake response.
async fn handshake(ws_stream: &mut HubStream) -> Result<String, TransportError> {
    ws_stream
        .send(Message::Text(protocol::handshake_request()))
        .await
        .map_err(|e| TransportError::Handshake(e.to_string()))?;

    let reply = tokio::time::timeout(HANDSHAKE_TIMEOUT, async {
        while let Some(msg) = ws_stream.next().await {
            match msg {
                Ok(Message::Text(text)) => return Ok(text),
                Ok(Message::Close(frame)) => {
                    return Err(TransportError::Handshake(format!(
                        "Hub closed during handshake: {frame:?}"
                    )))
                }
                Ok(_) => continue,
                Err(e) => return Err(TransportError::Handshake(e.to_string())),
            }
        }
        Err(TransportError::Handshake(
            "Stream ended during handshake".to_string(),
        ))
    })
    .await
    .map_err(|_| {
        TransportError::Handshake(format!(
            "No handshake response within {}s",
            HANDSHAKE_TIMEOUT.as_secs()
        ))
    })??;

    let (first, rest) = match reply.split_once(RECORD_SEPARATOR) {
        Some((first, rest)) => (first, rest.to_string()),
        None => (reply.as_str(), String::new()),
    };
    protocol::parse_handshake_response(first).map_err(TransportError::Handshake)?;
    Ok(rest)
}

/// Drive one hub session: forward commands, push decoded events, send
/// keep-alives, and stop when either side goes away.
///
/// Returning drops `event_tx`, which is how the manager learns the
/// connection has dropped.
async fn run_pump(
    ws_stream: HubStream,
    mut command_rx: mpsc::UnboundedReceiver<ClientCommand>,
    event_tx: mpsc::UnboundedSender<ServerMessage>,
    leftover: String,
) {
    let (mut sink, mut stream) = ws_stream.split();
    let mut pending: HashMap<String, ClientCommand> = HashMap::new();
    let mut next_invocation: u64 = 0;
    let mut keepalive = tokio::time::interval(KEEPALIVE_INTERVAL);
    let server_deadline = tokio::time::sleep(SERVER_TIMEOUT);
    tokio::pin!(server_deadline);

    if !leftover.is_empty() && !handle_text(&leftover, &event_tx, &mut pending) {
        return;
    }

    loop {
        tokio::select! {
            cmd = command_rx.recv() => {
                match cmd {
                    Some(cmd) => {
                        next_invocation += 1;
                        let invocation_id = next_invocation.to_string();
                        let frame = protocol::encode_invocation(
                            &invocation_id,
                            cmd.target(),
                            &cmd.arguments(),
                        );
                        tracing::debug!(
                            job_id = %cmd.job_id(),
                            target = cmd.target(),
                            invocation_id = %invocation_id,
                            "Sending hub invocation",
                        );
                        pending.insert(invocation_id, cmd);
                        if let Err(e) = sink.send(Message::Text(frame)).await {
                            tracing::error!(error = %e, "Failed to send hub invocation");
                            break;
                        }
                    }
                    None => {
                        tracing::debug!("Command channel closed, closing hub connection");
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
            _ = keepalive.tick() => {
                if let Err(e) = sink.send(Message::Text(protocol::encode_ping())).await {
                    tracing::warn!(error = %e, "Failed to send keep-alive ping");
                    break;
                }
            }
            _ = &mut server_deadline => {
                tracing::warn!(
                    timeout_secs = SERVER_TIMEOUT.as_secs(),
                    "No message from hub within server timeout",
                );
                break;
            }
            msg = stream.next() => {
                server_deadline.as_mut().reset(Instant::now() + SERVER_TIMEOUT);
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if !handle_text(&text, &event_tx, &mut pending) {
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                        // Handled automatically by tungstenite.
                    }
                    Some(Ok(Message::Close(frame))) => {
                        tracing::info!(?frame, "Hub closed WebSocket");
                        break;
                    }
                    Some(Ok(_)) => {
                        // Binary frames are not part of the JSON protocol.
                    }
                    Some(Err(e)) => {
                        tracing::error!(error = %e, "WebSocket receive error");
                        break;
                    }
                    None => {
                        tracing::info!("WebSocket stream exhausted");
                        break;
                    }
                }
            }
        }
    }
}

/// Decode a text message and forward its job events.
///
/// Returns `false` when the session should end (server close frame, or
/// nobody is listening for events any more).
fn handle_text(
    text: &str,
    event_tx: &mpsc::UnboundedSender<ServerMessage>,
    pending: &mut HashMap<String, ClientCommand>,
) -> bool {
    for frame in protocol::parse_frames(text) {
        match frame {
            Ok(HubFrame::Invocation {
                target, arguments, ..
            }) => match parse_invocation(&target, &arguments) {
                Ok(message) => {
                    if event_tx.send(message).is_err() {
                        tracing::debug!("Event receiver dropped, ending hub session");
                        return false;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, target = %target, "Ignoring hub invocation");
                }
            },
            Ok(HubFrame::Completion {
                invocation_id,
                error,
            }) => {
                let command = pending.remove(&invocation_id);
                if let Some(error) = error {
                    tracing::warn!(
                        invocation_id = %invocation_id,
                        job_id = command.as_ref().map(|c| c.job_id()).unwrap_or("-"),
                        error = %error,
                        "Hub invocation failed",
                    );
                }
            }
            Ok(HubFrame::Ping) => {
                tracing::trace!("Hub ping");
            }
            Ok(HubFrame::Close {
                error,
                allow_reconnect,
            }) => {
                tracing::info!(?error, allow_reconnect, "Hub sent close frame");
                return false;
            }
            Ok(HubFrame::Other(kind)) => {
                tracing::trace!(kind, "Ignoring hub frame");
            }
            Err(e) => {
                tracing::warn!(error = %e, raw_message = %text, "Failed to parse hub frame");
            }
        }
    }
    true
}
