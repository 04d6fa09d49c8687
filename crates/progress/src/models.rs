//! Wire and domain models for bulk jobs.
//!
//! Field names follow the camelCase JSON the job server emits on both
//! the hub and the REST endpoints.

use resumeai_core::job_status::JobStatus;
use resumeai_core::types::{
    deserialize_optional_timestamp, deserialize_timestamp, JobId, Timestamp,
};
use serde::{Deserialize, Serialize};

/// Upper bound of `progress_percentage`.
pub const MAX_PERCENTAGE: f64 = 100.0;

/// Current progress snapshot of one job.
///
/// Pushed as the `ProgressUpdate` payload, returned by
/// `GET /jobs/{id}/progress`, and held per job by the
/// [`JobStore`](crate::store::JobStore).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobProgress {
    pub job_id: JobId,
    #[serde(default)]
    pub status: JobStatus,
    /// 0-100, meaningful while processing.
    #[serde(default)]
    pub progress_percentage: f64,
    #[serde(default)]
    pub processed_items: u32,
    /// Zero until the server has counted the items.
    #[serde(default)]
    pub total_items: u32,
    #[serde(default)]
    pub failed_items: u32,
    /// Label of the item currently being processed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_item: Option<String>,
    /// Result payload, present only once completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial_results: Option<serde_json::Value>,
    /// Failure description, present only once failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Server timestamp of the most recent event merged into this record.
    #[serde(default, deserialize_with = "deserialize_optional_timestamp")]
    pub last_updated: Option<Timestamp>,
    /// Advisory forecast; passed through as the server formats it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_completion_time: Option<String>,
}

impl JobProgress {
    /// A fresh record for a job nothing is known about yet.
    pub fn queued(job_id: impl Into<JobId>) -> Self {
        Self {
            job_id: job_id.into(),
            status: JobStatus::Queued,
            progress_percentage: 0.0,
            processed_items: 0,
            total_items: 0,
            failed_items: 0,
            current_item: None,
            partial_results: None,
            error_message: None,
            last_updated: None,
            estimated_completion_time: None,
        }
    }

    /// Enforce the per-status field invariants in place.
    ///
    /// - percentage clamped to 0-100, pinned to 100 when completed
    /// - `processed + failed <= total` once `total` is known
    /// - `current_item` only while processing
    /// - `partial_results` only when completed, `error_message` only when failed
    pub fn normalize(&mut self) {
        if !self.progress_percentage.is_finite() {
            self.progress_percentage = 0.0;
        }
        self.progress_percentage = self.progress_percentage.clamp(0.0, MAX_PERCENTAGE);

        if self.total_items > 0 {
            self.failed_items = self.failed_items.min(self.total_items);
            self.processed_items = self
                .processed_items
                .min(self.total_items - self.failed_items);
        }

        if self.status == JobStatus::Completed {
            self.progress_percentage = MAX_PERCENTAGE;
        }
        if self.status != JobStatus::Processing {
            self.current_item = None;
        }
        if self.status != JobStatus::Completed {
            self.partial_results = None;
        }
        if self.status != JobStatus::Failed {
            self.error_message = None;
        }
    }
}

/// `JobCompleted` push payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    pub job_id: JobId,
    #[serde(default)]
    pub result_data: serde_json::Value,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: Timestamp,
}

/// `JobFailed` push payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobError {
    pub job_id: JobId,
    pub error_message: String,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: Timestamp,
}

/// `JobCancelled` push payload, also used for the local cancel ack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobCancelled {
    pub job_id: JobId,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: Timestamp,
}

/// Lightweight row returned by the user's job listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub job_id: JobId,
    #[serde(default)]
    pub status: JobStatus,
    #[serde(default)]
    pub total_items: u32,
    #[serde(default)]
    pub processed_items: u32,
    #[serde(default)]
    pub failed_items: u32,
    #[serde(default, deserialize_with = "deserialize_optional_timestamp")]
    pub created_at: Option<Timestamp>,
    #[serde(default, deserialize_with = "deserialize_optional_timestamp")]
    pub completed_at: Option<Timestamp>,
}

/// Body of `POST /jobs/bulk`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkJobRequest {
    /// Items (resumes) to analyse.
    pub resume_ids: Vec<String>,
    /// Target the items are analysed against (a job description).
    pub job_description_id: String,
    pub user_id: String,
    /// Plan tier of the submitting user, e.g. `"free"`.
    pub plan_type: String,
}

/// Response of `POST /jobs/bulk`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub job_id: JobId,
    #[serde(default)]
    pub status: Option<JobStatus>,
    #[serde(default)]
    pub total_items: Option<u32>,
    #[serde(default)]
    pub estimated_completion_time: Option<String>,
}

/// Body of `POST /jobs/{id}/cancel`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    pub user_id: String,
}
