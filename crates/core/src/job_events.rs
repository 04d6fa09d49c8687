//! Hub invocation target names for job progress traffic.
//!
//! The server pushes the `EVENT_*` targets to every connection enrolled
//! in a job's group; the client invokes the `CMD_*` targets to enrol or
//! leave. Names must match the hub method names on the server.

/// Progress snapshot for a running job (percentage, counts, current item).
pub const EVENT_PROGRESS_UPDATE: &str = "ProgressUpdate";

/// Job completed successfully; carries the result payload.
pub const EVENT_JOB_COMPLETED: &str = "JobCompleted";

/// Job failed with an error message.
pub const EVENT_JOB_FAILED: &str = "JobFailed";

/// Job was cancelled (confirmation of a cancel request).
pub const EVENT_JOB_CANCELLED: &str = "JobCancelled";

/// Per-user notification unrelated to a single job.
pub const EVENT_USER_NOTIFICATION: &str = "UserNotification";

/// Enrol the current connection in a job's event group.
pub const CMD_JOIN_JOB_GROUP: &str = "JoinJobGroup";

/// Remove the current connection from a job's event group.
pub const CMD_LEAVE_JOB_GROUP: &str = "LeaveJobGroup";
