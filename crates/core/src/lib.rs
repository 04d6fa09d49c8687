//! Shared domain types for the bulk-analysis job client.
//!
//! Holds the job identifiers, the job status state machine, hub message
//! names, the crate-wide [`CoreError`](error::CoreError), and the
//! interfaces of the collaborators the job client consumes but does not
//! implement (auth tokens, blob storage, profile metadata).

pub mod auth;
pub mod error;
pub mod job_events;
pub mod job_status;
pub mod metadata;
pub mod storage;
pub mod types;
