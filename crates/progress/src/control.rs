//! Imperative job operations.
//!
//! [`JobControl`] combines the REST [`JobsBackend`] with the
//! [`ConnectionManager`] so callers can submit, cancel and inspect
//! jobs while the store and subscriptions stay consistent. Every REST
//! call is bounded by the configured request timeout; there are no
//! automatic retries.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use resumeai_core::auth::TokenProvider;
use resumeai_core::types::JobId;

use crate::api::{ApiError, JobsApi, JobsBackend};
use crate::client::HubClient;
use crate::config::ClientConfig;
use crate::manager::{ConnectionManager, ManagerConfig};
use crate::models::{BulkJobRequest, JobCancelled, JobProgress, JobSummary};
use crate::registry::JoinOutcome;

/// Plan tier sent when the caller leaves it blank.
pub const DEFAULT_PLAN_TYPE: &str = "free";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why a bulk job could not be submitted.
#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    /// The request was rejected before or by the server as malformed.
    #[error("Invalid submission: {0}")]
    Validation(String),

    /// The user's plan does not allow this submission.
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Submission rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Submission timed out after {0:?}")]
    Timeout(Duration),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),
}

/// Why a cancel request failed. The store is rolled back in every case.
#[derive(Debug, thiserror::Error)]
pub enum CancellationError {
    /// The job already finished or is otherwise past cancelling.
    #[error("Job cannot be cancelled: {0}")]
    NotCancellable(String),

    #[error("Job {0} not found")]
    NotFound(JobId),

    #[error("Cancel rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Cancel timed out after {0:?}")]
    Timeout(Duration),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),
}

/// Why a snapshot or listing could not be fetched.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("Request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),
}

fn mentions_quota(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("limit") || lower.contains("quota")
}

/// Map a REST failure of `POST /jobs/bulk`.
pub fn classify_submission(error: ApiError) -> SubmissionError {
    let message = error.server_message();
    match error {
        ApiError::Request(_) => SubmissionError::Network(message),
        ApiError::Unauthorized { .. } => SubmissionError::Unauthorized(message),
        ApiError::Status { status, .. } => match status {
            402 | 429 => SubmissionError::QuotaExceeded(message),
            _ if mentions_quota(&message) => SubmissionError::QuotaExceeded(message),
            400 | 422 => SubmissionError::Validation(message),
            _ => SubmissionError::Rejected { status, message },
        },
    }
}

/// Map a REST failure of `POST /jobs/{id}/cancel`.
pub fn classify_cancellation(error: ApiError, job_id: &str) -> CancellationError {
    let message = error.server_message();
    match error {
        ApiError::Request(_) => CancellationError::Network(message),
        ApiError::Unauthorized { .. } => CancellationError::Unauthorized(message),
        ApiError::Status { status, .. } => match status {
            404 => CancellationError::NotFound(job_id.to_string()),
            400 | 409 | 422 => CancellationError::NotCancellable(message),
            _ => CancellationError::Rejected { status, message },
        },
    }
}

/// Map a REST failure of a read endpoint. `subject` names what was
/// being fetched.
pub fn classify_fetch(error: ApiError, subject: &str) -> FetchError {
    let message = error.server_message();
    match error {
        ApiError::Request(_) => FetchError::Network(message),
        ApiError::Unauthorized { .. } => FetchError::Unauthorized(message),
        ApiError::Status { status: 404, .. } => FetchError::NotFound(subject.to_string()),
        ApiError::Status { status, .. } => FetchError::Rejected { status, message },
    }
}

// ---------------------------------------------------------------------------
// JobControl
// ---------------------------------------------------------------------------

/// Submit, cancel, subscribe to and inspect jobs.
pub struct JobControl {
    backend: Arc<dyn JobsBackend>,
    tokens: Arc<dyn TokenProvider>,
    manager: Arc<ConnectionManager>,
    request_timeout: Duration,
}

impl JobControl {
    pub fn new(
        backend: Arc<dyn JobsBackend>,
        tokens: Arc<dyn TokenProvider>,
        manager: Arc<ConnectionManager>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            backend,
            tokens,
            manager,
            request_timeout,
        }
    }

    /// Wire up the hub client, REST client and manager from config.
    ///
    /// The two clients share one [`reqwest::Client`] connection pool.
    pub fn from_config(config: &ClientConfig, tokens: Arc<dyn TokenProvider>) -> Self {
        let http = reqwest::Client::new();
        let transport = Arc::new(HubClient::with_client(
            http.clone(),
            config.job_hub_url.clone(),
        ));
        let backend = Arc::new(JobsApi::with_client(http, config.api_base_url.clone()));
        let manager = ConnectionManager::new(
            transport,
            Arc::clone(&tokens),
            ManagerConfig {
                auto_connect: config.auto_connect,
                ..Default::default()
            },
        );
        Self::new(backend, tokens, manager, config.request_timeout)
    }

    pub fn manager(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }

    /// Submit a bulk analysis of `item_ids` against `target_id`.
    ///
    /// On success the new job is subscribed and, unless a pushed event
    /// got there first, seeded in the store as Queued.
    pub async fn submit_bulk_job(
        &self,
        item_ids: &[String],
        target_id: &str,
        user_id: &str,
        plan_type: &str,
    ) -> Result<JobId, SubmissionError> {
        validate_submission(item_ids, target_id, user_id)?;
        let token = self.token().await.map_err(SubmissionError::Unauthorized)?;

        let request = BulkJobRequest {
            resume_ids: item_ids.to_vec(),
            job_description_id: target_id.to_string(),
            user_id: user_id.to_string(),
            plan_type: if plan_type.trim().is_empty() {
                DEFAULT_PLAN_TYPE.to_string()
            } else {
                plan_type.to_string()
            },
        };

        let response = self
            .timed(self.backend.submit_bulk(&token, &request))
            .await
            .map_err(SubmissionError::Timeout)?
            .map_err(classify_submission)?;

        if response.job_id.trim().is_empty() {
            return Err(SubmissionError::Rejected {
                status: 200,
                message: "Server returned no job id".into(),
            });
        }

        self.manager.subscribe(&response.job_id).await;

        let mut seed = JobProgress::queued(response.job_id.clone());
        seed.total_items = response.total_items.unwrap_or(0);
        seed.estimated_completion_time = response.estimated_completion_time;
        self.manager.store().seed(seed).await;

        tracing::info!(
            job_id = %response.job_id,
            items = item_ids.len(),
            plan_type = %request.plan_type,
            "Submitted bulk job",
        );
        Ok(response.job_id)
    }

    /// Cancel a job, showing it as Cancelled immediately.
    ///
    /// A record that exists and is not terminal is marked Cancelled
    /// before the request is sent. Events pushed while the request is in
    /// flight are held by the store. If the request fails, the previous
    /// record is put back and the held events are merged into it.
    pub async fn cancel_job(&self, job_id: &str, user_id: &str) -> Result<(), CancellationError> {
        let token = self
            .token()
            .await
            .map_err(CancellationError::Unauthorized)?;
        let store = self.manager.store();

        let pending = store
            .begin_cancel(JobCancelled {
                job_id: job_id.to_string(),
                timestamp: Utc::now(),
            })
            .await;

        let result = match self.timed(self.backend.cancel(&token, job_id, user_id)).await {
            Err(timeout) => Err(CancellationError::Timeout(timeout)),
            Ok(Err(e)) => Err(classify_cancellation(e, job_id)),
            Ok(Ok(())) => Ok(()),
        };

        match &result {
            Ok(()) => {
                if pending.is_some() {
                    store.commit_cancel(job_id).await;
                }
                tracing::info!(job_id, "Job cancelled");
            }
            Err(e) => {
                let restored = match pending {
                    Some(pending) => store.rollback_cancel(job_id, pending).await,
                    None => false,
                };
                tracing::warn!(job_id, error = %e, restored, "Cancel failed");
            }
        }
        result
    }

    /// Fetch the server's current snapshot and make it authoritative.
    pub async fn fetch_job_snapshot(&self, job_id: &str) -> Result<JobProgress, FetchError> {
        let token = self.token().await.map_err(FetchError::Unauthorized)?;

        let mut progress = self
            .timed(self.backend.job_progress(&token, job_id))
            .await
            .map_err(FetchError::Timeout)?
            .map_err(|e| classify_fetch(e, &format!("Job {job_id}")))?;

        progress.job_id = job_id.to_string();
        let stored = self.manager.store().set_authoritative(progress).await;
        tracing::debug!(job_id, status = %stored.status, "Fetched job snapshot");
        Ok(stored)
    }

    /// Subscribe to a job and load its current snapshot.
    ///
    /// A failed fetch is returned, but the subscription stays.
    pub async fn subscribe_to_job(&self, job_id: &str) -> Result<JoinOutcome, FetchError> {
        let outcome = self.manager.subscribe(job_id).await;
        self.fetch_job_snapshot(job_id).await?;
        Ok(outcome)
    }

    pub async fn unsubscribe_from_job(&self, job_id: &str) -> bool {
        self.manager.unsubscribe(job_id).await
    }

    /// Jobs belonging to `user_id`. Does not touch the store.
    pub async fn list_user_jobs(&self, user_id: &str) -> Result<Vec<JobSummary>, FetchError> {
        let token = self.token().await.map_err(FetchError::Unauthorized)?;

        self.timed(self.backend.user_jobs(&token, user_id))
            .await
            .map_err(FetchError::Timeout)?
            .map_err(|e| classify_fetch(e, &format!("User {user_id}")))
    }

    // ---- private helpers ----

    async fn token(&self) -> Result<String, String> {
        self.tokens.bearer_token().await.map_err(|e| e.to_string())
    }

    /// Run `request` under the request timeout. `Err` carries the
    /// timeout that elapsed.
    async fn timed<T>(
        &self,
        request: impl Future<Output = Result<T, ApiError>>,
    ) -> Result<Result<T, ApiError>, Duration> {
        tokio::time::timeout(self.request_timeout, request)
            .await
            .map_err(|_| self.request_timeout)
    }
}

fn validate_submission(
    item_ids: &[String],
    target_id: &str,
    user_id: &str,
) -> Result<(), SubmissionError> {
    if item_ids.is_empty() {
        return Err(SubmissionError::Validation(
            "At least one item is required".into(),
        ));
    }
    if item_ids.iter().any(|id| id.trim().is_empty()) {
        return Err(SubmissionError::Validation("Item ids must not be blank".into()));
    }
    if target_id.trim().is_empty() {
        return Err(SubmissionError::Validation("Target id is required".into()));
    }
    if user_id.trim().is_empty() {
        return Err(SubmissionError::Validation("User id is required".into()));
    }
    Ok(())
}
