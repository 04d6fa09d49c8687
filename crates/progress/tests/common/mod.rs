#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use resumeai_core::auth::StaticToken;
use resumeai_core::job_status::JobStatus;
use resumeai_core::types::Timestamp;
use resumeai_progress::api::{ApiError, JobsBackend};
use resumeai_progress::control::JobControl;
use resumeai_progress::manager::{ConnectionManager, ConnectionState, ManagerConfig};
use resumeai_progress::messages::{ClientCommand, ServerMessage};
use resumeai_progress::models::{BulkJobRequest, JobProgress, JobSummary, SubmitResponse};
use resumeai_progress::reconnect::ReconnectConfig;
use resumeai_progress::store::JobStore;
use resumeai_progress::transport::{Connection, Transport, TransportError};
use tokio::sync::mpsc;

/// Upper bound for any wait in these tests.
pub const WAIT: Duration = Duration::from_secs(3);

/// Token handed to the fake transport and backend.
pub const TEST_TOKEN: &str = "test-token";

// ---------------------------------------------------------------------------
// FakeTransport
// ---------------------------------------------------------------------------

/// In-memory hub. Records every outbound command and lets tests push
/// events, drop the live connection, or script failed handshakes.
#[derive(Default)]
pub struct FakeTransport {
    state: Mutex<FakeState>,
    log: Arc<Mutex<Vec<ClientCommand>>>,
}

#[derive(Default)]
struct FakeState {
    fail_next: usize,
    attempts: usize,
    tokens: Vec<String>,
    events: Option<mpsc::UnboundedSender<ServerMessage>>,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make the next `n` connection attempts fail the handshake.
    pub fn fail_next(&self, n: usize) {
        self.state.lock().unwrap().fail_next = n;
    }

    pub fn attempts(&self) -> usize {
        self.state.lock().unwrap().attempts
    }

    pub fn tokens(&self) -> Vec<String> {
        self.state.lock().unwrap().tokens.clone()
    }

    /// Deliver a server push on the live connection.
    pub fn push(&self, message: ServerMessage) -> bool {
        match self.state.lock().unwrap().events.as_ref() {
            Some(events) => events.send(message).is_ok(),
            None => false,
        }
    }

    /// Simulate the server going away.
    pub fn drop_connection(&self) {
        self.state.lock().unwrap().events = None;
    }

    pub fn commands(&self) -> Vec<ClientCommand> {
        self.log.lock().unwrap().clone()
    }

    pub fn clear_commands(&self) {
        self.log.lock().unwrap().clear();
    }

    pub fn joins(&self, job_id: &str) -> usize {
        self.count(|c| matches!(c, ClientCommand::JoinJobGroup(id) if id == job_id))
    }

    pub fn leaves(&self, job_id: &str) -> usize {
        self.count(|c| matches!(c, ClientCommand::LeaveJobGroup(id) if id == job_id))
    }

    fn count(&self, pred: impl Fn(&ClientCommand) -> bool) -> usize {
        self.log.lock().unwrap().iter().filter(|c| pred(c)).count()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn connect(&self, token: &str) -> Result<Connection, TransportError> {
        let mut state = self.state.lock().unwrap();
        state.attempts += 1;
        state.tokens.push(token.to_string());
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(TransportError::Handshake("scripted failure".into()));
        }

        let (command_tx, mut command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        state.events = Some(event_tx);

        let log = Arc::clone(&self.log);
        tokio::spawn(async move {
            while let Some(cmd) = command_rx.recv().await {
                log.lock().unwrap().push(cmd);
            }
        });

        Ok(Connection {
            connection_id: Some(format!("conn-{}", state.attempts)),
            commands: command_tx,
            events: event_rx,
        })
    }
}

// ---------------------------------------------------------------------------
// FakeBackend
// ---------------------------------------------------------------------------

/// Scriptable REST backend. Replies are `Ok(value)` or
/// `Err((status, body))`.
pub struct FakeBackend {
    pub submit_reply: Mutex<Result<SubmitResponse, (u16, String)>>,
    pub cancel_reply: Mutex<Result<(), (u16, String)>>,
    pub snapshots: Mutex<HashMap<String, JobProgress>>,
    pub listing: Mutex<Vec<JobSummary>>,
    pub latency: Mutex<Duration>,
    pub requests: Mutex<Vec<String>>,
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self {
            submit_reply: Mutex::new(Ok(submit_response("job-42"))),
            cancel_reply: Mutex::new(Ok(())),
            snapshots: Mutex::new(HashMap::new()),
            listing: Mutex::new(Vec::new()),
            latency: Mutex::new(Duration::ZERO),
            requests: Mutex::new(Vec::new()),
        }
    }
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    pub fn reject_cancel(&self, status: u16, body: &str) {
        *self.cancel_reply.lock().unwrap() = Err((status, body.to_string()));
    }

    pub fn reject_submit(&self, status: u16, body: &str) {
        *self.submit_reply.lock().unwrap() = Err((status, body.to_string()));
    }

    pub fn put_snapshot(&self, progress: JobProgress) {
        self.snapshots
            .lock()
            .unwrap()
            .insert(progress.job_id.clone(), progress);
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    fn record(&self, token: &str, request: String) {
        assert_eq!(token, TEST_TOKEN);
        self.requests.lock().unwrap().push(request);
    }

    async fn wait(&self) {
        let latency = *self.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

fn status_error((status, body): (u16, String)) -> ApiError {
    match status {
        401 | 403 => ApiError::Unauthorized { status, body },
        _ => ApiError::Status { status, body },
    }
}

#[async_trait]
impl JobsBackend for FakeBackend {
    async fn submit_bulk(
        &self,
        token: &str,
        request: &BulkJobRequest,
    ) -> Result<SubmitResponse, ApiError> {
        self.record(token, format!("submit {}", request.resume_ids.len()));
        self.wait().await;
        self.submit_reply.lock().unwrap().clone().map_err(status_error)
    }

    async fn cancel(&self, token: &str, job_id: &str, user_id: &str) -> Result<(), ApiError> {
        self.record(token, format!("cancel {job_id} {user_id}"));
        self.wait().await;
        self.cancel_reply.lock().unwrap().clone().map_err(status_error)
    }

    async fn job_progress(&self, token: &str, job_id: &str) -> Result<JobProgress, ApiError> {
        self.record(token, format!("progress {job_id}"));
        self.wait().await;
        self.snapshots
            .lock()
            .unwrap()
            .get(job_id)
            .cloned()
            .ok_or_else(|| status_error((404, r#"{"message":"Job not found"}"#.into())))
    }

    async fn user_jobs(&self, token: &str, user_id: &str) -> Result<Vec<JobSummary>, ApiError> {
        self.record(token, format!("jobs {user_id}"));
        self.wait().await;
        Ok(self.listing.lock().unwrap().clone())
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub transport: Arc<FakeTransport>,
    pub backend: Arc<FakeBackend>,
    pub manager: Arc<ConnectionManager>,
    pub control: JobControl,
}

/// Backoff fast enough for tests but with a visible gap after the
/// first retry.
pub fn fast_reconnect() -> ReconnectConfig {
    ReconnectConfig {
        delays: vec![
            Duration::ZERO,
            Duration::from_millis(20),
            Duration::from_millis(20),
        ],
    }
}

pub fn harness() -> Harness {
    harness_with(ManagerConfig {
        reconnect: fast_reconnect(),
        auto_connect: true,
    })
}

pub fn harness_with(config: ManagerConfig) -> Harness {
    let transport = FakeTransport::new();
    let backend = FakeBackend::new();
    let tokens = Arc::new(StaticToken::new(TEST_TOKEN));
    let manager = ConnectionManager::new(transport.clone(), tokens.clone(), config);
    let control = JobControl::new(
        backend.clone(),
        tokens,
        Arc::clone(&manager),
        Duration::from_millis(500),
    );
    Harness {
        transport,
        backend,
        manager,
        control,
    }
}

/// Connect and wait until the manager reports Connected.
pub async fn connected_harness() -> Harness {
    let h = harness();
    h.manager.connect().await;
    wait_for_state(&h.manager, ConnectionState::Connected).await;
    h
}

pub async fn wait_for_state(manager: &ConnectionManager, state: ConnectionState) {
    let mut rx = manager.state_changes();
    tokio::time::timeout(WAIT, rx.wait_for(|s| *s == state))
        .await
        .unwrap_or_else(|_| panic!("manager never reached {state}"))
        .expect("state channel closed");
}

/// Poll `cond` until it holds.
pub async fn eventually(what: &str, mut cond: impl FnMut() -> bool) {
    tokio::time::timeout(WAIT, async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {what}"));
}

/// Wait until `job_id` shows `status` in the store.
pub async fn wait_for_status(store: &JobStore, job_id: &str, status: JobStatus) {
    tokio::time::timeout(WAIT, async {
        while store.get(job_id).await.map(|p| p.status) != Some(status) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("{job_id} never reached {status}"));
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn at(secs: i64) -> Timestamp {
    Utc.with_ymd_and_hms(2026, 10, 17, 10, 0, 0).unwrap() + chrono::Duration::seconds(secs)
}

pub fn submit_response(job_id: &str) -> SubmitResponse {
    SubmitResponse {
        job_id: job_id.into(),
        status: None,
        total_items: None,
        estimated_completion_time: None,
    }
}

pub fn processing(job_id: &str, pct: f64, processed: u32, ts: i64) -> JobProgress {
    let mut p = JobProgress::queued(job_id);
    p.status = JobStatus::Processing;
    p.progress_percentage = pct;
    p.processed_items = processed;
    p.total_items = 10;
    p.last_updated = Some(at(ts));
    p
}

pub fn items(n: usize) -> Vec<String> {
    (1..=n).map(|i| format!("resume-{i}")).collect()
}
