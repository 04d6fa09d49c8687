//! Events consumed and emitted by the job state store.
//!
//! [`JobEvent`] is everything that can change a job record: pushed hub
//! events plus the local cancel acknowledgement. [`MergeOutcome`] tells
//! the caller what a merge did, and [`StoreUpdate`] is broadcast to
//! store observers.

use resumeai_core::types::{JobId, Timestamp};
use serde::Serialize;

use crate::models::{JobCancelled, JobError, JobProgress, JobResult};

/// An input to [`JobStore::merge`](crate::store::JobStore::merge).
#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    /// Full progress snapshot pushed by the server.
    Progress(JobProgress),

    /// The job finished and its results are attached.
    Completed(JobResult),

    /// The job failed as a whole.
    Failed(JobError),

    /// Server confirmation that the job was cancelled.
    Cancelled(JobCancelled),

    /// Local acknowledgement of a cancel request, stamped with the local
    /// clock. Not subject to the server-timestamp guard.
    CancelAcknowledged(JobCancelled),
}

impl JobEvent {
    /// The job this event belongs to.
    pub fn job_id(&self) -> &str {
        match self {
            Self::Progress(p) => &p.job_id,
            Self::Completed(r) => &r.job_id,
            Self::Failed(e) => &e.job_id,
            Self::Cancelled(c) | Self::CancelAcknowledged(c) => &c.job_id,
        }
    }

    /// Server timestamp carried by the event, if any.
    pub fn timestamp(&self) -> Option<Timestamp> {
        match self {
            Self::Progress(p) => p.last_updated,
            Self::Completed(r) => Some(r.timestamp),
            Self::Failed(e) => Some(e.timestamp),
            Self::Cancelled(c) | Self::CancelAcknowledged(c) => Some(c.timestamp),
        }
    }

    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Progress(_) => "progress",
            Self::Completed(_) => "completed",
            Self::Failed(_) => "failed",
            Self::Cancelled(_) => "cancelled",
            Self::CancelAcknowledged(_) => "cancel_ack",
        }
    }
}

/// Result of merging one [`JobEvent`] into the store.
///
/// Every variant carries the record as it stands after the merge.
#[derive(Debug, Clone, PartialEq)]
pub enum MergeOutcome {
    /// The event changed the record.
    Applied(JobProgress),

    /// The event was older than (or as old as) the record and was
    /// discarded.
    Stale(JobProgress),

    /// The record is terminal; the event was discarded.
    Terminal(JobProgress),
}

impl MergeOutcome {
    pub fn snapshot(&self) -> &JobProgress {
        match self {
            Self::Applied(p) | Self::Stale(p) | Self::Terminal(p) => p,
        }
    }

    pub fn into_snapshot(self) -> JobProgress {
        match self {
            Self::Applied(p) | Self::Stale(p) | Self::Terminal(p) => p,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }
}

/// Change notification broadcast to store observers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum StoreUpdate {
    /// A record was created or changed.
    Updated(JobProgress),

    /// A record was removed (unsubscribe).
    Removed(JobId),

    /// Every record was dropped (disconnect).
    Cleared,
}
