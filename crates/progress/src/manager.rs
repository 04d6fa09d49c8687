//! Hub connection manager.
//!
//! [`ConnectionManager`] owns at most one logical push connection. It
//! spawns a connection task (connect -> process -> reconnect loop),
//! replays the [`SubscriptionRegistry`] every time a connection comes
//! up, and routes pushed events into the [`JobStore`].
//!
//! Connection failures never surface as errors from the public API.
//! They are logged, recorded in [`ConnectionManager::error`], and
//! reflected in the [`ConnectionState`] published through a
//! [`tokio::sync::watch`] channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use resumeai_core::auth::TokenProvider;
use tokio::sync::{watch, Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::messages::ServerMessage;
use crate::reconnect::{delay_for_retry, open_connection, sleep_or_cancel, ReconnectConfig};
use crate::registry::{JoinOutcome, SubscriptionRegistry};
use crate::store::JobStore;
use crate::transport::{Connection, Transport};

/// Error shown while an automatic reconnect is in progress.
pub const ERROR_RECONNECTING: &str = "Reconnecting to server...";

/// Error shown after a drop when auto-connect is off.
pub const ERROR_CONNECTION_LOST: &str = "Connection lost";

/// How long [`ConnectionManager::disconnect`] waits for the connection
/// task before aborting it.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// ConnectionState
// ---------------------------------------------------------------------------

/// Lifecycle state of the push connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ConnectionManager
// ---------------------------------------------------------------------------

/// Tunables for [`ConnectionManager`].
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub reconnect: ReconnectConfig,
    /// Retry failed and dropped connections automatically.
    pub auto_connect: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            reconnect: ReconnectConfig::default(),
            auto_connect: true,
        }
    }
}

/// Owns the push connection, the subscription registry and the job
/// store.
///
/// Created once by the composition root via [`ConnectionManager::new`].
/// The returned `Arc` can be cheaply cloned into consumers.
pub struct ConnectionManager {
    transport: Arc<dyn Transport>,
    tokens: Arc<dyn TokenProvider>,
    reconnect: ReconnectConfig,
    auto_connect: AtomicBool,
    store: Arc<JobStore>,
    registry: SubscriptionRegistry,
    state_tx: watch::Sender<ConnectionState>,
    error: RwLock<Option<String>>,
    connection_id: RwLock<Option<String>>,
    session: Mutex<Option<Session>>,
}

/// The running connection task.
struct Session {
    cancel: CancellationToken,
    task: tokio::task::JoinHandle<()>,
}

impl ConnectionManager {
    pub fn new(
        transport: Arc<dyn Transport>,
        tokens: Arc<dyn TokenProvider>,
        config: ManagerConfig,
    ) -> Arc<Self> {
        let store = Arc::new(JobStore::default());
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);

        Arc::new(Self {
            transport,
            tokens,
            reconnect: config.reconnect,
            auto_connect: AtomicBool::new(config.auto_connect),
            registry: SubscriptionRegistry::new(Arc::clone(&store)),
            store,
            state_tx,
            error: RwLock::new(None),
            connection_id: RwLock::new(None),
            session: Mutex::new(None),
        })
    }

    /// Start the connection task.
    ///
    /// Does nothing if a connection task is already running (connected,
    /// connecting or reconnecting).
    pub async fn connect(self: &Arc<Self>) {
        let mut session = self.session.lock().await;
        if session.as_ref().is_some_and(|s| !s.task.is_finished()) {
            tracing::debug!(state = %self.state(), "Connection task already running");
            return;
        }

        self.set_state(ConnectionState::Connecting);
        let cancel = CancellationToken::new();
        let manager = Arc::clone(self);
        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            tracing::info!("Starting hub connection task");
            manager.run_connection_loop(&task_cancel).await;
            tracing::info!("Hub connection task exited");
        });

        *session = Some(Session { cancel, task });
    }

    /// Close the connection and forget every subscription and record.
    ///
    /// Cancels pending reconnects, then waits up to 5 seconds for the
    /// connection task to exit cleanly.
    pub async fn disconnect(&self) {
        let mut session = self.session.lock().await;
        if let Some(mut running) = session.take() {
            running.cancel.cancel();
            if tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut running.task)
                .await
                .is_err()
            {
                tracing::warn!("Connection task did not stop in time, aborting");
                running.task.abort();
            }
        }

        self.registry.detach().await;
        self.registry.clear().await;
        self.store.clear().await;
        *self.connection_id.write().await = None;
        self.set_error(None).await;
        self.set_state(ConnectionState::Disconnected);
        tracing::info!("Disconnected from job progress hub");
    }

    /// Enable or disable automatic retries.
    ///
    /// Disabling does not close an open connection; it only stops the
    /// next scheduled retry.
    pub fn set_auto_connect(&self, enabled: bool) {
        self.auto_connect.store(enabled, Ordering::SeqCst);
        tracing::info!(enabled, "Auto-connect updated");
    }

    pub fn auto_connect(&self) -> bool {
        self.auto_connect.load(Ordering::SeqCst)
    }

    /// Register a job and join its group when connected.
    pub async fn subscribe(&self, job_id: &str) -> JoinOutcome {
        self.registry.add(job_id).await
    }

    /// Unregister a job, leave its group, and drop its record.
    pub async fn unsubscribe(&self, job_id: &str) -> bool {
        self.registry.remove(job_id).await
    }

    /// Route one pushed message.
    ///
    /// Job events reach the store only for subscribed jobs or jobs the
    /// store already holds.
    pub async fn dispatch(&self, message: ServerMessage) {
        match message {
            ServerMessage::Job(event) => {
                let job_id = event.job_id().to_string();
                let kind = event.kind();
                match self.registry.route(event).await {
                    Some(outcome) => tracing::debug!(
                        job_id = %job_id,
                        kind,
                        applied = outcome.is_applied(),
                        "Dispatched job event",
                    ),
                    None => tracing::debug!(
                        job_id = %job_id,
                        kind,
                        "Ignoring event for unsubscribed job",
                    ),
                }
            }
            ServerMessage::UserNotification(payload) => {
                tracing::info!(%payload, "User notification");
            }
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Observe state changes.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Most recent connection error, cleared once connected.
    pub async fn error(&self) -> Option<String> {
        self.error.read().await.clone()
    }

    /// Server-assigned id of the live connection.
    pub async fn connection_id(&self) -> Option<String> {
        self.connection_id.read().await.clone()
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    // ---- private helpers ----

    /// Core connection loop: connect -> process messages -> reconnect.
    ///
    /// Runs until the cancellation token is triggered or a retry is
    /// suppressed because auto-connect is off.
    async fn run_connection_loop(&self, cancel: &CancellationToken) {
        // `None` until the first failure or drop; then the retry index.
        let mut retry: Option<usize> = None;
        let mut reconnecting = false;

        loop {
            if let Some(n) = retry {
                let delay = delay_for_retry(n, &self.reconnect);
                tracing::info!(
                    attempt = n + 1,
                    delay_ms = delay.as_millis() as u64,
                    "Scheduling hub reconnect",
                );
                if !sleep_or_cancel(delay, cancel).await {
                    return;
                }
                if !self.auto_connect() {
                    tracing::info!("Auto-connect disabled, abandoning reconnect");
                    self.set_state(ConnectionState::Disconnected);
                    return;
                }
            }

            self.set_state(if reconnecting {
                ConnectionState::Reconnecting
            } else {
                ConnectionState::Connecting
            });

            let attempt = tokio::select! {
                _ = cancel.cancelled() => return,
                result = open_connection(self.transport.as_ref(), self.tokens.as_ref()) => result,
            };

            match attempt {
                Ok(connection) => {
                    if !self.run_session(connection, cancel).await {
                        return;
                    }
                    if !self.auto_connect() {
                        tracing::warn!("Hub connection lost, auto-connect disabled");
                        self.set_error(Some(ERROR_CONNECTION_LOST.to_string()))
                            .await;
                        self.set_state(ConnectionState::Disconnected);
                        return;
                    }
                    tracing::info!("Hub connection lost, entering reconnect loop");
                    self.set_error(Some(ERROR_RECONNECTING.to_string())).await;
                    self.set_state(ConnectionState::Reconnecting);
                    reconnecting = true;
                    retry = Some(0);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Hub connection attempt failed");
                    if !reconnecting {
                        self.set_error(Some(e.to_string())).await;
                        self.set_state(ConnectionState::Disconnected);
                    }
                    if !self.auto_connect() {
                        self.set_state(ConnectionState::Disconnected);
                        return;
                    }
                    retry = Some(retry.map_or(0, |n| n + 1));
                }
            }
        }
    }

    /// Process one live connection.
    ///
    /// Returns `true` if the connection dropped, `false` if the task was
    /// cancelled.
    async fn run_session(&self, connection: Connection, cancel: &CancellationToken) -> bool {
        let Connection {
            connection_id,
            commands,
            mut events,
        } = connection;

        *self.connection_id.write().await = connection_id.clone();
        self.set_error(None).await;
        self.set_state(ConnectionState::Connected);
        tracing::info!(
            connection_id = connection_id.as_deref().unwrap_or("-"),
            "Hub connection established",
        );
        self.registry.attach(commands).await;

        let dropped = loop {
            tokio::select! {
                _ = cancel.cancelled() => break false,
                msg = events.recv() => match msg {
                    Some(message) => self.dispatch(message).await,
                    None => break true,
                },
            }
        };

        self.registry.detach().await;
        *self.connection_id.write().await = None;
        dropped
    }

    fn set_state(&self, state: ConnectionState) {
        let changed = self.state_tx.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            *current = state;
            true
        });
        if changed {
            tracing::debug!(state = %state, "Connection state changed");
        }
    }

    async fn set_error(&self, error: Option<String>) {
        *self.error.write().await = error;
    }
}
