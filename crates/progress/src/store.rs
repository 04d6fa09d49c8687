//! Per-job state store with timestamp-guarded merges.
//!
//! [`JobStore`] owns every [`JobProgress`] record. All mutation goes
//! through it, and each merge runs entirely under one write lock, so a
//! merge is atomic with respect to other tasks. Observers receive a
//! [`StoreUpdate`] for every change through a `broadcast` channel.

use std::collections::HashMap;

use resumeai_core::job_status::JobStatus;
use resumeai_core::types::JobId;
use tokio::sync::{broadcast, RwLock};

use crate::events::{JobEvent, MergeOutcome, StoreUpdate};
use crate::models::{JobCancelled, JobProgress, MAX_PERCENTAGE};

/// Default buffer capacity for the update channel.
const DEFAULT_CAPACITY: usize = 1024;

// ---------------------------------------------------------------------------
// Merge rules
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Applied,
    Stale,
    Terminal,
}

/// Apply one event to a record in place.
///
/// - terminal records discard every event
/// - once `last_updated` is set, an event not strictly newer is stale
/// - a local cancel ack skips the timestamp guard
/// - progress never moves the status backwards
fn apply(record: &mut JobProgress, event: JobEvent) -> Verdict {
    if record.status.is_terminal() {
        return Verdict::Terminal;
    }

    if let JobEvent::CancelAcknowledged(ack) = &event {
        record.status = JobStatus::Cancelled;
        record.last_updated = Some(match record.last_updated {
            Some(last) => last.max(ack.timestamp),
            None => ack.timestamp,
        });
        record.normalize();
        return Verdict::Applied;
    }

    match (event.timestamp(), record.last_updated) {
        (Some(incoming), Some(last)) if incoming <= last => return Verdict::Stale,
        (None, Some(_)) => return Verdict::Stale,
        _ => {}
    }

    match event {
        JobEvent::Progress(p) => {
            let mut target = p.status;
            if target == JobStatus::Queued && p.progress_percentage > 0.0 {
                target = JobStatus::Processing;
            }
            if record.status.can_transition_to(target) {
                record.status = target;
            }
            record.progress_percentage = p.progress_percentage;
            record.processed_items = p.processed_items;
            record.total_items = p.total_items;
            record.failed_items = p.failed_items;
            record.current_item = p.current_item;
            record.partial_results = p.partial_results;
            record.error_message = p.error_message;
            record.estimated_completion_time = p.estimated_completion_time;
            if p.last_updated.is_some() {
                record.last_updated = p.last_updated;
            }
        }
        JobEvent::Completed(result) => {
            record.status = JobStatus::Completed;
            record.progress_percentage = MAX_PERCENTAGE;
            record.partial_results = Some(result.result_data);
            record.last_updated = Some(result.timestamp);
        }
        JobEvent::Failed(failure) => {
            record.status = JobStatus::Failed;
            record.error_message = Some(failure.error_message);
            record.last_updated = Some(failure.timestamp);
        }
        JobEvent::Cancelled(cancelled) => {
            record.status = JobStatus::Cancelled;
            record.last_updated = Some(cancelled.timestamp);
        }
        // Handled above.
        JobEvent::CancelAcknowledged(_) => {}
    }

    record.normalize();
    Verdict::Applied
}

// ---------------------------------------------------------------------------
// JobStore
// ---------------------------------------------------------------------------

#[derive(Default)]
struct State {
    records: HashMap<JobId, JobProgress>,
    /// Events that arrived while a local cancel was awaiting the server,
    /// keyed by job. Present only between `begin_cancel` and
    /// `commit_cancel` / `rollback_cancel`.
    held: HashMap<JobId, Vec<JobEvent>>,
}

/// A local cancel written ahead of the server's answer.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingCancel {
    /// The record before the cancel.
    pub prior: JobProgress,
    /// The record showing `Cancelled`.
    pub speculative: JobProgress,
}

/// Observable map of job id to its latest progress record.
pub struct JobStore {
    state: RwLock<State>,
    updates: broadcast::Sender<StoreUpdate>,
}

impl JobStore {
    /// Create a store whose update channel buffers `capacity` messages.
    ///
    /// Slow observers see `RecvError::Lagged` once the buffer is full.
    pub fn new(capacity: usize) -> Self {
        let (updates, _) = broadcast::channel(capacity);
        Self {
            state: RwLock::new(State::default()),
            updates,
        }
    }

    /// Receive every subsequent change to the store.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreUpdate> {
        self.updates.subscribe()
    }

    /// Merge an event, creating a Queued record first if none exists.
    pub async fn merge(&self, event: JobEvent) -> MergeOutcome {
        let mut state = self.state.write().await;
        let State { records, held } = &mut *state;
        let record = records
            .entry(event.job_id().to_string())
            .or_insert_with(|| JobProgress::queued(event.job_id()));
        self.merge_into(record, held, event)
    }

    /// Merge an event only if the store already holds its job.
    ///
    /// Returns `None` (and changes nothing) for unknown jobs.
    pub async fn merge_existing(&self, event: JobEvent) -> Option<MergeOutcome> {
        let mut state = self.state.write().await;
        let State { records, held } = &mut *state;
        let record = records.get_mut(event.job_id())?;
        Some(self.merge_into(record, held, event))
    }

    fn merge_into(
        &self,
        record: &mut JobProgress,
        held: &mut HashMap<JobId, Vec<JobEvent>>,
        event: JobEvent,
    ) -> MergeOutcome {
        let kind = event.kind();
        let incoming = event.timestamp();
        let retained = held.contains_key(event.job_id()).then(|| event.clone());
        match apply(record, event) {
            Verdict::Applied => {
                tracing::trace!(
                    job_id = %record.job_id,
                    kind,
                    status = %record.status,
                    "Merged job event",
                );
                self.publish(StoreUpdate::Updated(record.clone()));
                MergeOutcome::Applied(record.clone())
            }
            Verdict::Stale => {
                tracing::debug!(
                    job_id = %record.job_id,
                    kind,
                    ?incoming,
                    last_updated = ?record.last_updated,
                    "Discarding stale job event",
                );
                MergeOutcome::Stale(record.clone())
            }
            Verdict::Terminal => {
                if let (Some(events), Some(event)) = (held.get_mut(&record.job_id), retained) {
                    tracing::debug!(
                        job_id = %record.job_id,
                        kind,
                        "Holding job event until cancel is answered",
                    );
                    events.push(event);
                } else {
                    tracing::debug!(
                        job_id = %record.job_id,
                        kind,
                        status = %record.status,
                        "Discarding event for terminal job",
                    );
                }
                MergeOutcome::Terminal(record.clone())
            }
        }
    }

    pub async fn get(&self, job_id: &str) -> Option<JobProgress> {
        self.state.read().await.records.get(job_id).cloned()
    }

    /// Snapshot of every record.
    pub async fn get_all(&self) -> HashMap<JobId, JobProgress> {
        self.state.read().await.records.clone()
    }

    pub async fn contains(&self, job_id: &str) -> bool {
        self.state.read().await.records.contains_key(job_id)
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.records.is_empty()
    }

    /// Drop one record. Returns it if it existed.
    pub async fn remove(&self, job_id: &str) -> Option<JobProgress> {
        let mut state = self.state.write().await;
        state.held.remove(job_id);
        let removed = state.records.remove(job_id);
        if removed.is_some() {
            self.publish(StoreUpdate::Removed(job_id.to_string()));
        }
        removed
    }

    /// Drop every record.
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.records.clear();
        state.held.clear();
        self.publish(StoreUpdate::Cleared);
    }

    /// Overwrite a record regardless of timestamps or terminal state.
    ///
    /// Used for snapshots fetched explicitly from the server.
    pub async fn set_authoritative(&self, mut progress: JobProgress) -> JobProgress {
        progress.normalize();
        self.state
            .write()
            .await
            .records
            .insert(progress.job_id.clone(), progress.clone());
        self.publish(StoreUpdate::Updated(progress.clone()));
        progress
    }

    /// Insert `progress` only if the job has no record yet.
    ///
    /// Returns `true` if the record was inserted.
    pub async fn seed(&self, mut progress: JobProgress) -> bool {
        let mut state = self.state.write().await;
        if state.records.contains_key(&progress.job_id) {
            return false;
        }
        progress.normalize();
        state
            .records
            .insert(progress.job_id.clone(), progress.clone());
        self.publish(StoreUpdate::Updated(progress));
        true
    }

    /// Put back a record captured before a speculative write.
    ///
    /// `None` means there was no record, so the current one is removed.
    pub async fn restore(&self, job_id: &str, prior: Option<JobProgress>) {
        let mut state = self.state.write().await;
        match prior {
            Some(prior) => {
                state.records.insert(job_id.to_string(), prior.clone());
                self.publish(StoreUpdate::Updated(prior));
            }
            None => {
                if state.records.remove(job_id).is_some() {
                    self.publish(StoreUpdate::Removed(job_id.to_string()));
                }
            }
        }
    }

    /// Show a job as Cancelled ahead of the server's answer.
    ///
    /// Only an existing, non-terminal record is changed. Until the
    /// cancel is committed or rolled back, pushed events that the
    /// Cancelled record would discard are held instead.
    pub async fn begin_cancel(&self, ack: JobCancelled) -> Option<PendingCancel> {
        let mut state = self.state.write().await;
        let State { records, held } = &mut *state;
        let record = records.get_mut(&ack.job_id)?;
        if record.status.is_terminal() {
            return None;
        }
        let prior = record.clone();
        let job_id = ack.job_id.clone();
        match self.merge_into(record, held, JobEvent::CancelAcknowledged(ack)) {
            MergeOutcome::Applied(speculative) => {
                held.insert(job_id, Vec::new());
                Some(PendingCancel { prior, speculative })
            }
            _ => None,
        }
    }

    /// The server accepted the cancel; events held meanwhile are dropped.
    pub async fn commit_cancel(&self, job_id: &str) {
        let dropped = self.state.write().await.held.remove(job_id);
        if let Some(events) = dropped.filter(|e| !e.is_empty()) {
            tracing::debug!(job_id, dropped = events.len(), "Dropping events held during cancel");
        }
    }

    /// The server rejected the cancel.
    ///
    /// Restores the prior record unless something else replaced the
    /// speculative one, then re-merges every event held since
    /// [`begin_cancel`](Self::begin_cancel). Returns `true` if the prior
    /// record was restored.
    pub async fn rollback_cancel(&self, job_id: &str, pending: PendingCancel) -> bool {
        let mut state = self.state.write().await;
        let State { records, held } = &mut *state;
        let events = held.remove(job_id).unwrap_or_default();

        let restored = records.get(job_id) == Some(&pending.speculative);
        if restored {
            records.insert(job_id.to_string(), pending.prior.clone());
            self.publish(StoreUpdate::Updated(pending.prior));
        }

        if let Some(record) = records.get_mut(job_id) {
            for event in events {
                self.merge_into(record, held, event);
            }
        }
        restored
    }

    fn publish(&self, update: StoreUpdate) {
        // Ignore the SendError; it only means there are zero receivers.
        let _ = self.updates.send(update);
    }
}

impl Default for JobStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
