//! Hub wire protocol (SignalR JSON protocol, version 1).
//!
//! Every frame is a JSON object terminated by the ASCII record separator
//! `0x1E`. A single WebSocket text message may carry several frames.
//! The numeric `"type"` field selects the frame kind; this module turns
//! records into typed [`HubFrame`]s and encodes the few frames the
//! client sends.

use serde::Deserialize;
use serde_json::json;

/// Terminates every JSON record on the wire.
pub const RECORD_SEPARATOR: char = '\u{1e}';

/// Hub protocol negotiated during the handshake.
pub const PROTOCOL_NAME: &str = "json";

/// Hub protocol version negotiated during the handshake.
pub const PROTOCOL_VERSION: u32 = 1;

const TYPE_INVOCATION: u8 = 1;
const TYPE_COMPLETION: u8 = 3;
const TYPE_PING: u8 = 6;
const TYPE_CLOSE: u8 = 7;

/// A decoded hub frame.
#[derive(Debug, Clone, PartialEq)]
pub enum HubFrame {
    /// Remote method call. Server-to-client pushes have no
    /// `invocation_id`.
    Invocation {
        invocation_id: Option<String>,
        target: String,
        arguments: Vec<serde_json::Value>,
    },

    /// Result of a client invocation.
    Completion {
        invocation_id: String,
        error: Option<String>,
    },

    /// Keep-alive.
    Ping,

    /// The server is closing the connection.
    Close {
        error: Option<String>,
        allow_reconnect: bool,
    },

    /// Streaming and other frame types the client does not use.
    Other(u8),
}

/// Errors decoding a hub record.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The record is not valid JSON or has the wrong shape.
    #[error("Malformed hub frame: {0}")]
    Json(#[from] serde_json::Error),

    /// A field required by the frame type is absent.
    #[error("Hub frame of type {kind} is missing '{field}'")]
    MissingField { kind: u8, field: &'static str },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFrame {
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default)]
    invocation_id: Option<String>,
    #[serde(default)]
    target: Option<String>,
    #[serde(default)]
    arguments: Vec<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    allow_reconnect: bool,
}

/// Split a text message into its non-empty records.
pub fn split_records(text: &str) -> impl Iterator<Item = &str> {
    text.split(RECORD_SEPARATOR)
        .map(str::trim)
        .filter(|r| !r.is_empty())
}

/// Decode a single record (without its separator).
pub fn parse_frame(record: &str) -> Result<HubFrame, ProtocolError> {
    let raw: RawFrame = serde_json::from_str(record)?;
    let frame = match raw.kind {
        TYPE_INVOCATION => HubFrame::Invocation {
            invocation_id: raw.invocation_id,
            target: raw.target.ok_or(ProtocolError::MissingField {
                kind: raw.kind,
                field: "target",
            })?,
            arguments: raw.arguments,
        },
        TYPE_COMPLETION => HubFrame::Completion {
            invocation_id: raw.invocation_id.ok_or(ProtocolError::MissingField {
                kind: raw.kind,
                field: "invocationId",
            })?,
            error: raw.error,
        },
        TYPE_PING => HubFrame::Ping,
        TYPE_CLOSE => HubFrame::Close {
            error: raw.error,
            allow_reconnect: raw.allow_reconnect,
        },
        other => HubFrame::Other(other),
    };
    Ok(frame)
}

/// Decode every record in a text message.
///
/// Records are decoded independently so one malformed frame does not
/// hide the others.
pub fn parse_frames(text: &str) -> Vec<Result<HubFrame, ProtocolError>> {
    split_records(text).map(parse_frame).collect()
}

/// The handshake request the client sends right after the socket opens.
pub fn handshake_request() -> String {
    let body = json!({ "protocol": PROTOCOL_NAME, "version": PROTOCOL_VERSION });
    format!("{body}{RECORD_SEPARATOR}")
}

/// Check the server's handshake response record.
///
/// An empty object means success; `{"error": "..."}` carries the
/// rejection reason.
pub fn parse_handshake_response(record: &str) -> Result<(), String> {
    #[derive(Deserialize)]
    struct HandshakeResponse {
        #[serde(default)]
        error: Option<String>,
    }

    match serde_json::from_str::<HandshakeResponse>(record) {
        Ok(HandshakeResponse { error: None }) => Ok(()),
        Ok(HandshakeResponse { error: Some(e) }) => Err(e),
        Err(e) => Err(format!("Malformed handshake response: {e}")),
    }
}

/// Encode a client invocation expecting a completion.
pub fn encode_invocation(
    invocation_id: &str,
    target: &str,
    arguments: &[serde_json::Value],
) -> String {
    let body = json!({
        "type": TYPE_INVOCATION,
        "invocationId": invocation_id,
        "target": target,
        "arguments": arguments,
    });
    format!("{body}{RECORD_SEPARATOR}")
}

/// Encode a keep-alive ping.
pub fn encode_ping() -> String {
    format!("{}{RECORD_SEPARATOR}", json!({ "type": TYPE_PING }))
}
