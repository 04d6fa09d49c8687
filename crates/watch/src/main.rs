//! `resumeai-watch` -- follow bulk analysis jobs from the terminal.
//!
//! Connects to the job progress hub, subscribes to the configured jobs,
//! and prints a status line for every change until Ctrl-C.
//!
//! # Environment variables
//!
//! | Variable               | Required | Default                                | Description                     |
//! |------------------------|----------|----------------------------------------|---------------------------------|
//! | `AUTH_TOKEN`           | yes      | --                                     | Bearer token for hub and API    |
//! | `API_BASE_URL`         | no       | `http://localhost:5000/api/recruiter`  | REST root of the job endpoints  |
//! | `JOB_HUB_URL`          | no       | `http://localhost:5000/jobProgressHub` | Hub endpoint                    |
//! | `REQUEST_TIMEOUT_SECS` | no       | `15`                                   | Per-request REST timeout        |
//! | `AUTO_CONNECT`         | no       | `true`                                 | Reconnect after drops           |
//! | `WATCH_JOB_IDS`        | no       | --                                     | Comma-separated jobs to follow  |
//! | `WATCH_USER_ID`        | no       | --                                     | Log this user's jobs on startup |

use std::sync::Arc;

use resumeai_core::auth::StaticToken;
use resumeai_progress::config::ClientConfig;
use resumeai_progress::control::JobControl;
use resumeai_watch::WatchConfig;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "resumeai_watch=info,resumeai_progress=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ClientConfig::from_env().unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid configuration");
        std::process::exit(1);
    });

    let token = config.auth_token.clone().unwrap_or_else(|| {
        tracing::error!("AUTH_TOKEN environment variable is required");
        std::process::exit(1);
    });

    let watch = WatchConfig::from_env();

    tracing::info!(
        hub_url = %config.job_hub_url,
        api_base_url = %config.api_base_url,
        jobs = watch.job_ids.len(),
        "Starting resumeai-watch",
    );

    let control = JobControl::from_config(&config, Arc::new(StaticToken::new(token)));

    resumeai_watch::run(control, watch).await;
}
