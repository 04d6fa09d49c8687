//! Subscription registry.
//!
//! Tracks which jobs this client wants events for, independent of any
//! physical connection. The registry survives reconnects: when the
//! connection manager attaches a new link, every registered job is
//! re-joined exactly once.
//!
//! Lock order is `jobs` then `link`. Membership changes and replays
//! both hold the `jobs` lock while sending, so a job added during a
//! reconnect is joined by either the add or the replay, never both.

use std::collections::HashSet;
use std::sync::Arc;

use resumeai_core::types::JobId;
use tokio::sync::{mpsc, Mutex};

use crate::events::{JobEvent, MergeOutcome};
use crate::messages::ClientCommand;
use crate::store::JobStore;

/// What [`SubscriptionRegistry::add`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// The job was already registered; nothing was sent.
    AlreadySubscribed,
    /// Registered and a join was sent on the live link.
    Joined,
    /// Registered while no link is usable; the next replay joins it.
    Deferred,
}

/// The set of subscribed job ids plus the outbound link of the current
/// connection.
pub struct SubscriptionRegistry {
    jobs: Mutex<HashSet<JobId>>,
    link: Mutex<Option<mpsc::UnboundedSender<ClientCommand>>>,
    store: Arc<JobStore>,
}

impl SubscriptionRegistry {
    pub fn new(store: Arc<JobStore>) -> Self {
        Self {
            jobs: Mutex::new(HashSet::new()),
            link: Mutex::new(None),
            store,
        }
    }

    /// Register a job and join its event group if a link is attached.
    pub async fn add(&self, job_id: &str) -> JoinOutcome {
        let mut jobs = self.jobs.lock().await;
        if !jobs.insert(job_id.to_string()) {
            return JoinOutcome::AlreadySubscribed;
        }

        let outcome = if self
            .send(ClientCommand::JoinJobGroup(job_id.to_string()))
            .await
        {
            JoinOutcome::Joined
        } else {
            JoinOutcome::Deferred
        };
        tracing::info!(job_id, ?outcome, "Subscribed to job");
        outcome
    }

    /// Forget a job, leave its group, and drop its store record.
    ///
    /// Returns `true` if the job was registered.
    pub async fn remove(&self, job_id: &str) -> bool {
        let mut jobs = self.jobs.lock().await;
        let removed = jobs.remove(job_id);
        if removed {
            self.send(ClientCommand::LeaveJobGroup(job_id.to_string()))
                .await;
            tracing::info!(job_id, "Unsubscribed from job");
        }
        self.store.remove(job_id).await;
        removed
    }

    /// Send a join for every registered job on the current link.
    ///
    /// Returns how many joins were sent.
    pub async fn replay_all(&self) -> usize {
        let jobs = self.jobs.lock().await;
        self.replay_locked(&jobs).await
    }

    async fn replay_locked(&self, jobs: &HashSet<JobId>) -> usize {
        let mut sent = 0;
        for job_id in jobs.iter() {
            if self.send(ClientCommand::JoinJobGroup(job_id.clone())).await {
                sent += 1;
            }
        }
        sent
    }

    /// Bind the outbound link of a fresh connection and replay every
    /// registered job on it.
    ///
    /// Returns how many joins were sent.
    pub async fn attach(&self, link: mpsc::UnboundedSender<ClientCommand>) -> usize {
        let jobs = self.jobs.lock().await;
        *self.link.lock().await = Some(link);
        let sent = self.replay_locked(&jobs).await;
        tracing::info!(replayed = sent, "Replayed job subscriptions");
        sent
    }

    /// Unbind the current link. Later adds are deferred.
    pub async fn detach(&self) {
        let _jobs = self.jobs.lock().await;
        *self.link.lock().await = None;
    }

    /// Drop every registration. Does not touch the store.
    pub async fn clear(&self) {
        self.jobs.lock().await.clear();
    }

    pub async fn contains(&self, job_id: &str) -> bool {
        self.jobs.lock().await.contains(job_id)
    }

    pub async fn job_ids(&self) -> Vec<JobId> {
        self.jobs.lock().await.iter().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.jobs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.lock().await.is_empty()
    }

    /// Hand a pushed event to the store if this client cares about it.
    ///
    /// Registered jobs are merged (creating a record if needed); other
    /// jobs are merged only if the store already tracks them. Returns
    /// `None` when the event was ignored.
    pub async fn route(&self, event: JobEvent) -> Option<MergeOutcome> {
        let jobs = self.jobs.lock().await;
        if jobs.contains(event.job_id()) {
            Some(self.store.merge(event).await)
        } else {
            self.store.merge_existing(event).await
        }
    }

    /// Send on the attached link. Returns `false` if there is none or it
    /// is closing.
    async fn send(&self, command: ClientCommand) -> bool {
        match self.link.lock().await.as_ref() {
            Some(link) => link.send(command).is_ok(),
            None => false,
        }
    }
}
