//! End-to-end tests for `HubClient` against a minimal axum hub.
//!
//! The test hub implements just enough of the hub protocol: negotiate,
//! the JSON handshake, and a `ProgressUpdate` push in reply to every
//! `JoinJobGroup` invocation.

mod common;

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::Query;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use common::*;
use futures::{SinkExt, StreamExt};
use resumeai_core::auth::StaticToken;
use resumeai_core::job_status::JobStatus;
use resumeai_progress::client::HubClient;
use resumeai_progress::manager::{ConnectionManager, ConnectionState, ManagerConfig};
use resumeai_progress::protocol::RECORD_SEPARATOR;
use resumeai_progress::transport::{Transport, TransportError};
use serde_json::{json, Value};

/// Token the hub accepts at negotiate but rejects at handshake.
const HANDSHAKE_REJECTED: &str = "handshake-rejected";

async fn negotiate(
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if auth != format!("Bearer {TEST_TOKEN}") && auth != format!("Bearer {HANDSHAKE_REJECTED}") {
        return (StatusCode::UNAUTHORIZED, Json(json!({}))).into_response();
    }
    assert_eq!(params.get("negotiateVersion").map(String::as_str), Some("1"));
    Json(json!({
        "negotiateVersion": 1,
        "connectionId": "conn-abc",
        "connectionToken": "tok-1",
        "availableTransports": [{"transport": "WebSockets", "transferFormats": ["Text"]}]
    }))
    .into_response()
}

async fn hub(ws: WebSocketUpgrade, Query(params): Query<HashMap<String, String>>) -> impl IntoResponse {
    assert_eq!(params.get("id").map(String::as_str), Some("tok-1"));
    let reject = params.get("access_token").map(String::as_str) == Some(HANDSHAKE_REJECTED);
    ws.on_upgrade(move |socket| serve_hub(socket, reject))
}

async fn serve_hub(socket: WebSocket, reject_handshake: bool) {
    let (mut sink, mut stream) = socket.split();

    // Handshake.
    let Some(Ok(Message::Text(handshake))) = stream.next().await else {
        return;
    };
    let request: Value =
        serde_json::from_str(handshake.as_str().trim_end_matches(RECORD_SEPARATOR)).unwrap();
    assert_eq!(request["protocol"], "json");
    let reply = if reject_handshake {
        json!({"error": "Requested protocol 'json' is not available."})
    } else {
        json!({})
    };
    if sink
        .send(Message::Text(format!("{reply}{RECORD_SEPARATOR}").into()))
        .await
        .is_err()
        || reject_handshake
    {
        return;
    }

    while let Some(Ok(msg)) = stream.next().await {
        let Message::Text(text) = msg else { continue };
        for record in text.as_str().split(RECORD_SEPARATOR).filter(|r| !r.is_empty()) {
            let frame: Value = serde_json::from_str(record).unwrap();
            if frame["type"] != 1 || frame["target"] != "JoinJobGroup" {
                continue;
            }
            let job_id = frame["arguments"][0].as_str().unwrap_or_default();
            let completion = json!({"type": 3, "invocationId": frame["invocationId"]});
            let push = json!({
                "type": 1,
                "target": "ProgressUpdate",
                "arguments": [{
                    "jobId": job_id,
                    "status": "processing",
                    "progressPercentage": 40,
                    "processedItems": 4,
                    "totalItems": 10,
                    "failedItems": 0,
                    "lastUpdated": "2026-10-17T10:00:01Z"
                }]
            });
            // Both frames in one text message.
            let batch = format!("{completion}{RECORD_SEPARATOR}{push}{RECORD_SEPARATOR}");
            if sink.send(Message::Text(batch.into())).await.is_err() {
                return;
            }
        }
    }
}

async fn spawn_hub() -> String {
    let app = Router::new()
        .route("/jobProgressHub/negotiate", post(negotiate))
        .route("/jobProgressHub", get(hub));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/jobProgressHub")
}

// ---------------------------------------------------------------------------
// Test: joined jobs receive pushed progress through the manager
// ---------------------------------------------------------------------------

#[tokio::test]
async fn joined_job_receives_progress() {
    let hub_url = spawn_hub().await;
    let manager = ConnectionManager::new(
        Arc::new(HubClient::new(hub_url)),
        Arc::new(StaticToken::new(TEST_TOKEN)),
        ManagerConfig::default(),
    );
    manager.subscribe("job-42").await;

    manager.connect().await;
    wait_for_state(&manager, ConnectionState::Connected).await;
    assert_eq!(manager.connection_id().await.as_deref(), Some("conn-abc"));

    let store = Arc::clone(manager.store());
    tokio::time::timeout(WAIT, async {
        while store.get("job-42").await.map(|p| p.status) != Some(JobStatus::Processing) {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("progress should arrive");

    let record = store.get("job-42").await.unwrap();
    assert_eq!(record.progress_percentage, 40.0);
    assert_eq!(record.processed_items, 4);

    manager.disconnect().await;
    assert_eq!(manager.state(), ConnectionState::Disconnected);
}

// ---------------------------------------------------------------------------
// Test: negotiate rejects a bad token
// ---------------------------------------------------------------------------

#[tokio::test]
async fn bad_token_is_auth_error() {
    let client = HubClient::new(spawn_hub().await);

    let err = client.connect("wrong").await.err().expect("should fail");

    assert!(matches!(err, TransportError::Auth(_)), "{err}");
}

// ---------------------------------------------------------------------------
// Test: handshake errors are reported
// ---------------------------------------------------------------------------

#[tokio::test]
async fn handshake_error_is_reported() {
    let client = HubClient::new(spawn_hub().await);

    let err = client
        .connect(HANDSHAKE_REJECTED)
        .await
        .err()
        .expect("should fail");

    match err {
        TransportError::Handshake(msg) => assert!(msg.contains("not available"), "{msg}"),
        other => panic!("Expected Handshake error, got {other}"),
    }
}

// ---------------------------------------------------------------------------
// Test: unreachable hub is a negotiate error
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unreachable_hub_is_negotiate_error() {
    let client = HubClient::new("http://127.0.0.1:1/jobProgressHub".into());

    let err = client.connect(TEST_TOKEN).await.err().expect("should fail");

    assert!(matches!(err, TransportError::Negotiate(_)), "{err}");
}
