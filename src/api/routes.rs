//! API route definitions.
//!
//! Shapes and status codes here are the contract the browser panel was
//! written against; field names stay camelCase on the wire.

use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info};

use super::state::AppState;
use crate::jenkins::history;
use crate::jenkins::{BuildReference, CiAdapter};
use crate::{catalog, monitor};

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/gettestlist", get(get_test_list))
        .route("/runTest", post(run_test))
        .route("/runAllTests", post(run_all_tests))
        .route("/checkJenkinsStatus", post(check_jenkins_status))
        .route("/lastRuns", get(last_runs))
        .route("/inProgressBuilds", get(in_progress_builds))
}

/// `GET /gettestlist` -- the catalog as-is. An unreadable catalog is an
/// empty list plus an error log, never an HTTP failure.
async fn get_test_list(State(state): State<AppState>) -> Json<Vec<catalog::TestCase>> {
    Json(catalog::load_or_empty(&state.config.catalog.path))
}

#[derive(Debug, Deserialize)]
struct RunTestRequest {
    #[serde(rename = "testPath")]
    test_path: Option<String>,
}

/// `POST /runTest` -- trigger one build, answer with its reference.
async fn run_test(
    State(state): State<AppState>,
    Json(request): Json<RunTestRequest>,
) -> (StatusCode, Json<Value>) {
    let test_path = match request.test_path.as_deref() {
        Some(p) if !p.is_empty() => p,
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "success": false, "message": "Test path not provided." })),
            );
        }
    };

    let tests = catalog::load_or_empty(&state.config.catalog.path);
    let test_name = catalog::name_for_path(&tests, test_path);
    info!(path = %test_path, name = %test_name, "running test");

    match state.jenkins.submit_build(test_path, &test_name).await {
        Ok(job_url) => (
            StatusCode::OK,
            Json(json!({ "success": true, "jobUrl": job_url })),
        ),
        Err(e) => {
            error!(path = %test_path, error = %e, "jenkins job could not be triggered");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "success": false,
                    "message": format!("Failed to trigger Jenkins job for {test_path}. Check Jenkins logs.")
                })),
            )
        }
    }
}

/// `POST /runAllTests` -- run the whole catalog sequentially, each test to
/// completion before the next starts. One record and one notification per
/// test; a failing entry never aborts the batch.
async fn run_all_tests(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let tests = catalog::load_or_empty(&state.config.catalog.path);
    if tests.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "success": false, "message": "Test list is empty" })),
        );
    }

    let poll_interval = Duration::from_secs(state.config.monitor.poll_interval_secs);
    let all_results = monitor::run_batch(
        &*state.jenkins,
        &state.results,
        &*state.notifier,
        &tests,
        poll_interval,
    )
    .await;

    (
        StatusCode::OK,
        Json(json!({ "success": true, "allResults": all_results })),
    )
}

#[derive(Debug, Deserialize)]
struct CheckStatusRequest {
    #[serde(rename = "jobUrl")]
    job_url: String,
}

/// `POST /checkJenkinsStatus` -- single-shot status passthrough. Looping is
/// the caller's job.
async fn check_jenkins_status(
    State(state): State<AppState>,
    Json(request): Json<CheckStatusRequest>,
) -> (StatusCode, Json<Value>) {
    let build = BuildReference(request.job_url);
    match state.jenkins.poll_status(&build).await {
        Ok(status) => (
            StatusCode::OK,
            Json(json!({
                "result": status.result,
                "building": status.building,
                "logs": status.logs,
            })),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "success": false, "message": e.to_string() })),
        ),
    }
}

/// `GET /lastRuns` -- newest completed build per test name. Builds still in
/// progress are excluded until they finish.
async fn last_runs(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match history::fetch_all_builds(&state.jenkins).await {
        Ok(builds) if builds.is_empty() => (
            StatusCode::OK,
            Json(json!({ "success": false, "message": "No builds found" })),
        ),
        Ok(builds) => {
            let last_runs = history::newest_completed_per_test(&builds);
            (
                StatusCode::OK,
                Json(json!({ "success": true, "lastRuns": last_runs })),
            )
        }
        Err(e) => {
            error!(error = %e, "error fetching last run details");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "success": false, "error": e.to_string() })),
            )
        }
    }
}

/// `GET /inProgressBuilds` -- currently-building runs keyed by test name.
async fn in_progress_builds(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match history::fetch_all_builds(&state.jenkins).await {
        Ok(builds) => {
            let in_progress = history::in_progress_by_test(&builds);
            (
                StatusCode::OK,
                Json(json!({ "success": true, "inProgressBuilds": in_progress })),
            )
        }
        Err(e) => {
            error!(error = %e, "error fetching in-progress builds");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "success": false, "error": e.to_string() })),
            )
        }
    }
}
