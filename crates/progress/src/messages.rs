//! Typed hub messages.
//!
//! The server pushes job events as hub invocations whose `target` names
//! the event and whose single argument is the JSON payload. This module
//! maps `(target, arguments)` pairs onto [`ServerMessage`] and describes
//! the [`ClientCommand`]s the client sends back.

use resumeai_core::job_events::{
    CMD_JOIN_JOB_GROUP, CMD_LEAVE_JOB_GROUP, EVENT_JOB_CANCELLED, EVENT_JOB_COMPLETED,
    EVENT_JOB_FAILED, EVENT_PROGRESS_UPDATE, EVENT_USER_NOTIFICATION,
};
use resumeai_core::types::JobId;
use serde::de::DeserializeOwned;

use crate::events::JobEvent;

/// A message pushed by the server.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// An event for a single job.
    Job(JobEvent),

    /// A notification addressed to the user rather than a job.
    UserNotification(serde_json::Value),
}

/// A request the client sends to the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ClientCommand {
    /// Enrol this connection in the job's event group.
    JoinJobGroup(JobId),

    /// Remove this connection from the job's event group.
    LeaveJobGroup(JobId),
}

impl ClientCommand {
    /// Hub method name invoked for this command.
    pub fn target(&self) -> &'static str {
        match self {
            Self::JoinJobGroup(_) => CMD_JOIN_JOB_GROUP,
            Self::LeaveJobGroup(_) => CMD_LEAVE_JOB_GROUP,
        }
    }

    pub fn job_id(&self) -> &str {
        match self {
            Self::JoinJobGroup(id) | Self::LeaveJobGroup(id) => id,
        }
    }

    /// Positional invocation arguments.
    pub fn arguments(&self) -> Vec<serde_json::Value> {
        vec![serde_json::Value::String(self.job_id().to_string())]
    }
}

/// Errors mapping an invocation onto a [`ServerMessage`].
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    /// The target is not a method this client handles.
    #[error("Unknown hub target: {0}")]
    UnknownTarget(String),

    /// The invocation carried no payload argument.
    #[error("Hub target {0} sent no arguments")]
    MissingArgument(String),

    /// The payload did not match the expected shape.
    #[error("Invalid {target} payload: {source}")]
    Payload {
        target: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Map a server invocation onto a typed message.
///
/// Returns `Err` for unknown targets or malformed payloads. Callers
/// should log and continue.
pub fn parse_invocation(
    target: &str,
    arguments: &[serde_json::Value],
) -> Result<ServerMessage, MessageError> {
    let message = match target {
        EVENT_PROGRESS_UPDATE => ServerMessage::Job(JobEvent::Progress(payload(target, arguments)?)),
        EVENT_JOB_COMPLETED => ServerMessage::Job(JobEvent::Completed(payload(target, arguments)?)),
        EVENT_JOB_FAILED => ServerMessage::Job(JobEvent::Failed(payload(target, arguments)?)),
        EVENT_JOB_CANCELLED => ServerMessage::Job(JobEvent::Cancelled(payload(target, arguments)?)),
        EVENT_USER_NOTIFICATION => ServerMessage::UserNotification(
            arguments
                .first()
                .cloned()
                .ok_or_else(|| MessageError::MissingArgument(target.to_string()))?,
        ),
        other => return Err(MessageError::UnknownTarget(other.to_string())),
    };
    Ok(message)
}

fn payload<T: DeserializeOwned>(
    target: &str,
    arguments: &[serde_json::Value],
) -> Result<T, MessageError> {
    let first = arguments
        .first()
        .ok_or_else(|| MessageError::MissingArgument(target.to_string()))?;
    T::deserialize(first).map_err(|source| MessageError::Payload {
        target: target.to_string(),
        source,
    })
}
