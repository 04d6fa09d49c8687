//! Push-channel transport abstraction.
//!
//! The connection manager only needs to open a connection and then
//! exchange [`ClientCommand`]s and [`ServerMessage`]s with it, so a
//! transport hands back a pair of channels. The WebSocket hub client in
//! [`client`](crate::client) is the production implementation; tests
//! substitute an in-memory one.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::messages::{ClientCommand, ServerMessage};

/// A live push connection.
///
/// The connection stays open while both channel halves are alive:
///
/// - dropping every clone of `commands` closes the connection,
/// - `events` yields `None` once the connection has dropped.
pub struct Connection {
    /// Server-assigned connection identity, when the transport has one.
    pub connection_id: Option<String>,
    /// Outbound requests (join/leave).
    pub commands: mpsc::UnboundedSender<ClientCommand>,
    /// Inbound server pushes.
    pub events: mpsc::UnboundedReceiver<ServerMessage>,
}

/// Opens push connections to the job progress hub.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform the handshake using `token` as the bearer credential.
    async fn connect(&self, token: &str) -> Result<Connection, TransportError>;
}

/// Errors that can occur while opening or running a push connection.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The negotiate request failed or was rejected.
    #[error("Negotiate failed: {0}")]
    Negotiate(String),

    /// Failed to establish the WebSocket connection.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The hub rejected or never answered the protocol handshake.
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// A protocol-level error on an already-established connection.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// No usable bearer token was available.
    #[error("Authentication error: {0}")]
    Auth(String),
}
