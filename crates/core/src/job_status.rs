//! Bulk job status values and the forward-moving status state machine.

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Accepted by the server, waiting for a worker.
pub const STATUS_QUEUED: &str = "queued";

/// A worker is processing items.
pub const STATUS_PROCESSING: &str = "processing";

/// All items processed; results attached.
pub const STATUS_COMPLETED: &str = "completed";

/// The job failed as a whole.
pub const STATUS_FAILED: &str = "failed";

/// The job was cancelled by its owner.
pub const STATUS_CANCELLED: &str = "cancelled";

/// Valid status values.
const VALID_STATUSES: &[&str] = &[
    STATUS_QUEUED,
    STATUS_PROCESSING,
    STATUS_COMPLETED,
    STATUS_FAILED,
    STATUS_CANCELLED,
];

// ---------------------------------------------------------------------------
// JobStatus
// ---------------------------------------------------------------------------

/// Lifecycle status of a bulk job.
///
/// `Queued -> Processing -> {Completed | Failed | Cancelled}`, with
/// `Queued` also allowed to fail or be cancelled directly. The three
/// terminal states never transition again on pushed events.
///
/// Serializes as the lowercase name. Deserializes from any casing of the
/// name or from the numeric code the server uses for enum values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Queued,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Return the wire string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => STATUS_QUEUED,
            Self::Processing => STATUS_PROCESSING,
            Self::Completed => STATUS_COMPLETED,
            Self::Failed => STATUS_FAILED,
            Self::Cancelled => STATUS_CANCELLED,
        }
    }

    /// Parse from a string, returning an error for unknown statuses.
    ///
    /// Matching is case-insensitive because some server paths emit the
    /// enum name (`"Processing"`) rather than the lowercase value.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s.to_ascii_lowercase().as_str() {
            STATUS_QUEUED => Ok(Self::Queued),
            STATUS_PROCESSING => Ok(Self::Processing),
            STATUS_COMPLETED => Ok(Self::Completed),
            STATUS_FAILED => Ok(Self::Failed),
            STATUS_CANCELLED => Ok(Self::Cancelled),
            other => Err(CoreError::Validation(format!(
                "Unknown job status: '{other}'. Valid statuses: {}",
                VALID_STATUSES.join(", ")
            ))),
        }
    }

    /// Map the server's numeric enum value (`0` = Queued .. `4` = Cancelled).
    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            0 => Some(Self::Queued),
            1 => Some(Self::Processing),
            2 => Some(Self::Completed),
            3 => Some(Self::Failed),
            4 => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Completed, Failed and Cancelled are terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Position along the lifecycle; terminal states share the last rank.
    fn rank(&self) -> u8 {
        match self {
            Self::Queued => 0,
            Self::Processing => 1,
            Self::Completed | Self::Failed | Self::Cancelled => 2,
        }
    }

    /// Whether a pushed event may move a job from `self` to `next`.
    ///
    /// Staying in the same non-terminal state is allowed (counts update);
    /// moving backwards or leaving a terminal state is not.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        next.rank() >= self.rank()
    }
}

impl<'de> Deserialize<'de> for JobStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Wire {
            Code(u64),
            Name(String),
        }

        match Wire::deserialize(deserializer)? {
            Wire::Code(code) => Self::from_code(code).ok_or_else(|| {
                serde::de::Error::custom(format!("Unknown job status code: {code}"))
            }),
            Wire::Name(name) => Self::parse(&name).map_err(serde::de::Error::custom),
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
