//! REST client for the job endpoints.
//!
//! [`JobsBackend`] is the seam the [`JobControl`](crate::control::JobControl)
//! API talks to; [`JobsApi`] implements it with [`reqwest`]. Every call
//! takes the bearer token explicitly so the caller decides how tokens
//! are refreshed.

use async_trait::async_trait;
use serde::Deserialize;

use crate::models::{BulkJobRequest, CancelRequest, JobProgress, JobSummary, SubmitResponse};

/// The job endpoints, relative to the API base URL:
///
/// | Method | Path                     | Response          |
/// |--------|--------------------------|-------------------|
/// | POST   | `/jobs/bulk`             | `SubmitResponse`  |
/// | POST   | `/jobs/{id}/cancel`      | ignored           |
/// | GET    | `/jobs/{id}/progress`    | `JobProgress`     |
/// | GET    | `/jobs/status/{userId}`  | `[JobSummary]`    |
#[async_trait]
pub trait JobsBackend: Send + Sync {
    async fn submit_bulk(
        &self,
        token: &str,
        request: &BulkJobRequest,
    ) -> Result<SubmitResponse, ApiError>;

    async fn cancel(&self, token: &str, job_id: &str, user_id: &str) -> Result<(), ApiError>;

    async fn job_progress(&self, token: &str, job_id: &str) -> Result<JobProgress, ApiError>;

    async fn user_jobs(&self, token: &str, user_id: &str) -> Result<Vec<JobSummary>, ApiError>;
}

/// Errors from the REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The HTTP request itself failed (network, DNS, TLS, decoding).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The server rejected the bearer token (401/403).
    #[error("Unauthorized ({status}): {body}")]
    Unauthorized { status: u16, body: String },

    /// The server returned another non-2xx status code.
    #[error("Job API error ({status}): {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },
}

impl ApiError {
    /// HTTP status of a rejected request.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Request(e) => e.status().map(|s| s.as_u16()),
            Self::Unauthorized { status, .. } | Self::Status { status, .. } => Some(*status),
        }
    }

    /// Human-readable reason from the response body.
    ///
    /// Uses the `message`, `error` or `title` field of a JSON body when
    /// present, otherwise the raw body.
    pub fn server_message(&self) -> String {
        #[derive(Deserialize)]
        struct ErrorBody {
            message: Option<String>,
            error: Option<String>,
            title: Option<String>,
        }

        match self {
            Self::Request(e) => e.to_string(),
            Self::Unauthorized { body, .. } | Self::Status { body, .. } => {
                serde_json::from_str::<ErrorBody>(body)
                    .ok()
                    .and_then(|b| b.message.or(b.error).or(b.title))
                    .unwrap_or_else(|| body.trim().to_string())
            }
        }
    }
}

/// HTTP client for the job endpoints.
pub struct JobsApi {
    client: reqwest::Client,
    base_url: String,
}

impl JobsApi {
    /// Create a new API client.
    ///
    /// * `base_url` - API root, e.g. `http://host:5000/api/recruiter`.
    pub fn new(base_url: String) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, base_url: String) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // ---- private helpers ----

    fn job_url(&self, job_id: &str, action: &str) -> String {
        format!(
            "{}/jobs/{}/{action}",
            self.base_url,
            urlencoding::encode(job_id)
        )
    }

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or an error carrying the status
    /// and body text on failure.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            let status = status.as_u16();
            return Err(match status {
                401 | 403 => ApiError::Unauthorized { status, body },
                _ => ApiError::Status { status, body },
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }

    /// Assert the response has a success status code, discarding the body.
    async fn check_status(response: reqwest::Response) -> Result<(), ApiError> {
        Self::ensure_success(response).await?;
        Ok(())
    }
}

/// The listing endpoint returns either a bare array or `{"jobs": [...]}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum JobListing {
    Bare(Vec<JobSummary>),
    Wrapped { jobs: Vec<JobSummary> },
}

#[async_trait]
impl JobsBackend for JobsApi {
    async fn submit_bulk(
        &self,
        token: &str,
        request: &BulkJobRequest,
    ) -> Result<SubmitResponse, ApiError> {
        let response = self
            .client
            .post(format!("{}/jobs/bulk", self.base_url))
            .bearer_auth(token)
            .json(request)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    async fn cancel(&self, token: &str, job_id: &str, user_id: &str) -> Result<(), ApiError> {
        let body = CancelRequest {
            user_id: user_id.to_string(),
        };

        let response = self
            .client
            .post(self.job_url(job_id, "cancel"))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;

        Self::check_status(response).await
    }

    async fn job_progress(&self, token: &str, job_id: &str) -> Result<JobProgress, ApiError> {
        let response = self
            .client
            .get(self.job_url(job_id, "progress"))
            .bearer_auth(token)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    async fn user_jobs(&self, token: &str, user_id: &str) -> Result<Vec<JobSummary>, ApiError> {
        let response = self
            .client
            .get(format!(
                "{}/jobs/status/{}",
                self.base_url,
                urlencoding::encode(user_id)
            ))
            .bearer_auth(token)
            .send()
            .await?;

        let listing: JobListing = Self::parse_response(response).await?;
        Ok(match listing {
            JobListing::Bare(jobs) | JobListing::Wrapped { jobs } => jobs,
        })
    }
}
