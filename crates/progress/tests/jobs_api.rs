//! Tests for the `reqwest` `JobsApi` against an axum test server.

mod common;

use axum::extract::Path;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use common::TEST_TOKEN;
use resumeai_core::job_status::JobStatus;
use resumeai_progress::api::{ApiError, JobsApi, JobsBackend};
use resumeai_progress::models::BulkJobRequest;
use serde_json::{json, Value};

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {TEST_TOKEN}"))
}

async fn submit(headers: HeaderMap, Json(body): Json<Value>) -> impl IntoResponse {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({"message": "Invalid token"})));
    }
    if body["planType"] == "free" && body["resumeIds"].as_array().map_or(0, Vec::len) > 5 {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({"message": "Free plan limit reached"})),
        );
    }
    (
        StatusCode::OK,
        Json(json!({
            "jobId": "job-42",
            "status": "queued",
            "totalItems": body["resumeIds"].as_array().map_or(0, Vec::len),
        })),
    )
}

async fn cancel(
    headers: HeaderMap,
    Path(job_id): Path<String>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({})));
    }
    assert_eq!(body["userId"], "u1");
    match job_id.as_str() {
        "job-done" => (
            StatusCode::CONFLICT,
            Json(json!({"message": "Job already finished"})),
        ),
        _ => (StatusCode::OK, Json(json!({"ok": true}))),
    }
}

async fn progress(headers: HeaderMap, Path(job_id): Path<String>) -> impl IntoResponse {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({})));
    }
    if job_id != "job-42" {
        return (StatusCode::NOT_FOUND, Json(json!({"message": "Job not found"})));
    }
    (
        StatusCode::OK,
        Json(json!({
            "jobId": "job-42",
            "status": "Processing",
            "progressPercentage": 40.5,
            "processedItems": 4,
            "totalItems": 10,
            "failedItems": 0,
            "currentItem": "resume-5.pdf",
            "lastUpdated": "2026-10-17T10:00:01Z"
        })),
    )
}

async fn user_jobs(headers: HeaderMap, Path(user_id): Path<String>) -> impl IntoResponse {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({})));
    }
    (
        StatusCode::OK,
        Json(json!([
            {"jobId": "job-1", "status": "completed", "totalItems": 3, "processedItems": 3,
             "createdAt": "2026-10-16T09:00:00Z", "completedAt": "2026-10-16T09:02:00Z"},
            {"jobId": format!("job-of-{user_id}"), "status": "queued"}
        ])),
    )
}

async fn spawn_api() -> JobsApi {
    let app = Router::new()
        .route("/api/recruiter/jobs/bulk", post(submit))
        .route("/api/recruiter/jobs/{id}/cancel", post(cancel))
        .route("/api/recruiter/jobs/{id}/progress", get(progress))
        .route("/api/recruiter/jobs/status/{user_id}", get(user_jobs));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    JobsApi::new(format!("http://{addr}/api/recruiter"))
}

fn bulk_request(items: usize, plan: &str) -> BulkJobRequest {
    BulkJobRequest {
        resume_ids: (0..items).map(|i| format!("r{i}")).collect(),
        job_description_id: "jd-7".into(),
        user_id: "u1".into(),
        plan_type: plan.into(),
    }
}

// ---------------------------------------------------------------------------
// Test: submit returns the job id
// ---------------------------------------------------------------------------

#[tokio::test]
async fn submit_returns_job_id() {
    let api = spawn_api().await;

    let response = api
        .submit_bulk(TEST_TOKEN, &bulk_request(3, "free"))
        .await
        .unwrap();

    assert_eq!(response.job_id, "job-42");
    assert_eq!(response.status, Some(JobStatus::Queued));
    assert_eq!(response.total_items, Some(3));
}

// ---------------------------------------------------------------------------
// Test: non-2xx responses carry status and body
// ---------------------------------------------------------------------------

#[tokio::test]
async fn submit_over_limit_is_status_error() {
    let api = spawn_api().await;

    let err = api
        .submit_bulk(TEST_TOKEN, &bulk_request(10, "free"))
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::Status { status: 429, .. }), "{err}");
    assert_eq!(err.server_message(), "Free plan limit reached");
}

#[tokio::test]
async fn wrong_token_is_unauthorized() {
    let api = spawn_api().await;

    let err = api.user_jobs("nope", "u1").await.unwrap_err();

    assert!(matches!(err, ApiError::Unauthorized { status: 401, .. }), "{err}");
}

// ---------------------------------------------------------------------------
// Test: cancel succeeds or reports a conflict
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cancel_running_and_finished_jobs() {
    let api = spawn_api().await;

    api.cancel(TEST_TOKEN, "job-42", "u1").await.unwrap();

    let err = api.cancel(TEST_TOKEN, "job-done", "u1").await.unwrap_err();
    assert_eq!(err.status(), Some(409));
    assert_eq!(err.server_message(), "Job already finished");
}

// ---------------------------------------------------------------------------
// Test: progress snapshot parses server casing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn job_progress_parses_snapshot() {
    let api = spawn_api().await;

    let progress = api.job_progress(TEST_TOKEN, "job-42").await.unwrap();

    assert_eq!(progress.status, JobStatus::Processing);
    assert_eq!(progress.progress_percentage, 40.5);
    assert_eq!(progress.current_item.as_deref(), Some("resume-5.pdf"));

    let err = api.job_progress(TEST_TOKEN, "job-x").await.unwrap_err();
    assert_eq!(err.status(), Some(404));
}

// ---------------------------------------------------------------------------
// Test: user job listing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn user_jobs_lists_summaries() {
    let api = spawn_api().await;

    let jobs = api.user_jobs(TEST_TOKEN, "u1").await.unwrap();

    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs[0].status, JobStatus::Completed);
    assert!(jobs[0].completed_at.is_some());
    assert_eq!(jobs[1].job_id, "job-of-u1");
    assert_eq!(jobs[1].total_items, 0);
}
