//! Real-time bulk-job progress client.
//!
//! Keeps a resilient push connection to the job progress hub, tracks
//! which jobs the client is subscribed to, merges pushed events into a
//! per-job state store, and wraps the REST endpoints used to submit,
//! cancel and inspect bulk analysis jobs.

pub mod api;
pub mod client;
pub mod config;
pub mod control;
pub mod events;
pub mod manager;
pub mod messages;
pub mod models;
pub mod protocol;
pub mod reconnect;
pub mod registry;
pub mod store;
pub mod transport;
