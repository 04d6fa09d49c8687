//! Terminal watcher for bulk jobs.
//!
//! Connects to the job hub, follows a configured set of jobs, and prints
//! one status line per store update until interrupted.

use std::sync::Arc;

use resumeai_core::job_status::JobStatus;
use resumeai_progress::control::JobControl;
use resumeai_progress::events::StoreUpdate;
use resumeai_progress::manager::{ConnectionState, ERROR_RECONNECTING};
use resumeai_progress::models::JobProgress;
use tokio::sync::broadcast::error::RecvError;

/// What to watch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchConfig {
    /// Jobs to subscribe to on startup.
    pub job_ids: Vec<String>,
    /// When set, the user's job listing is logged on startup.
    pub user_id: Option<String>,
}

impl WatchConfig {
    /// Read `WATCH_JOB_IDS` (comma separated) and `WATCH_USER_ID`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let job_ids = lookup("WATCH_JOB_IDS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();
        let user_id = lookup("WATCH_USER_ID")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        Self { job_ids, user_id }
    }
}

/// One-line summary of a job record.
pub fn render_status_line(progress: &JobProgress) -> String {
    let id = &progress.job_id;
    match progress.status {
        JobStatus::Queued => format!("{id} queued"),
        JobStatus::Processing => {
            let mut line = format!(
                "{id} processing {:.1}% ({}/{}, {} failed)",
                progress.progress_percentage,
                progress.processed_items,
                progress.total_items,
                progress.failed_items,
            );
            if let Some(item) = &progress.current_item {
                line.push_str(&format!(" {item}"));
            }
            line
        }
        JobStatus::Completed => format!(
            "{id} completed ({}/{}, {} failed)",
            progress.processed_items, progress.total_items, progress.failed_items,
        ),
        JobStatus::Failed => format!(
            "{id} failed: {}",
            progress.error_message.as_deref().unwrap_or("unknown error")
        ),
        JobStatus::Cancelled => format!("{id} cancelled"),
    }
}

/// Line to print for a store change, if any.
pub fn render_update(update: &StoreUpdate) -> Option<String> {
    match update {
        StoreUpdate::Updated(progress) => Some(render_status_line(progress)),
        StoreUpdate::Removed(job_id) => Some(format!("{job_id} no longer watched")),
        StoreUpdate::Cleared => None,
    }
}

/// Banner describing the connection state.
///
/// `Connecting` is transient and prints nothing.
pub fn connection_banner(state: ConnectionState, error: Option<&str>) -> Option<String> {
    match state {
        ConnectionState::Connecting => None,
        ConnectionState::Connected => Some("Connected to job hub".into()),
        ConnectionState::Reconnecting => Some(error.unwrap_or(ERROR_RECONNECTING).to_string()),
        ConnectionState::Disconnected => Some(match error {
            Some(e) => format!("Disconnected: {e}"),
            None => "Disconnected".into(),
        }),
    }
}

/// Watch until Ctrl-C, then disconnect.
pub async fn run(control: JobControl, config: WatchConfig) {
    let manager = Arc::clone(control.manager());
    let mut updates = manager.store().subscribe();
    let mut states = manager.state_changes();

    manager.connect().await;

    for job_id in &config.job_ids {
        match control.subscribe_to_job(job_id).await {
            Ok(outcome) => tracing::info!(job_id = %job_id, ?outcome, "Watching job"),
            Err(e) => tracing::warn!(
                job_id = %job_id,
                error = %e,
                "Snapshot unavailable, waiting for pushes",
            ),
        }
    }

    if let Some(user_id) = &config.user_id {
        match control.list_user_jobs(user_id).await {
            Ok(jobs) => {
                for job in jobs {
                    tracing::info!(
                        job_id = %job.job_id,
                        status = %job.status.as_str(),
                        processed = job.processed_items,
                        total = job.total_items,
                        "Known job",
                    );
                }
            }
            Err(e) => tracing::warn!(user_id = %user_id, error = %e, "Failed to list jobs"),
        }
    }

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("Shutdown signal received");
                break;
            }
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *states.borrow_and_update();
                let error = manager.error().await;
                if let Some(banner) = connection_banner(state, error.as_deref()) {
                    tracing::info!(state = %state, "{banner}");
                }
            }
            update = updates.recv() => match update {
                Ok(update) => {
                    if let Some(line) = render_update(&update) {
                        println!("{line}");
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Status output fell behind");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    manager.disconnect().await;
}
