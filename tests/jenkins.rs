//! Jenkins client tests against a path-recording stub server: the request
//! paths the client composes from build references.

use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::{StatusCode, Uri};
use axum::response::IntoResponse;
use axum::{Json, Router};
use serde_json::json;

use testpanel::config::JenkinsConfig;
use testpanel::jenkins::client::BuildDetails;
use testpanel::jenkins::{history, BuildReference, BuildResult, CiAdapter, JenkinsClient};

type Paths = Arc<Mutex<Vec<String>>>;

async fn record(State(paths): State<Paths>, uri: Uri) -> axum::response::Response {
    let path = uri.path().to_string();
    paths.lock().unwrap().push(path.clone());
    if path.ends_with("/consoleText") {
        "log text".into_response()
    } else if path.ends_with("/api/json") {
        Json(json!({ "building": false, "result": "SUCCESS" })).into_response()
    } else {
        StatusCode::NOT_FOUND.into_response()
    }
}

async fn spawn_stub() -> (String, Paths) {
    let paths: Paths = Arc::default();
    let app = Router::new().fallback(record).with_state(paths.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), paths)
}

fn client_for(base: &str) -> JenkinsClient {
    JenkinsClient::new(&JenkinsConfig {
        base_url: base.to_string(),
        job_name: "playwrightTest".to_string(),
        username: String::new(),
        api_token: String::new(),
    })
    .unwrap()
}

fn running_build(base: &str) -> BuildDetails {
    BuildDetails {
        number: 43,
        url: format!("{base}/job/playwrightTest/43/"),
        display_name: "Login".to_string(),
        in_progress: true,
        result: None,
        timestamp: 1_755_907_300_000,
        duration: 0,
    }
}

#[tokio::test]
async fn test_adopted_in_progress_reference_polls_one_api_json() {
    let (base, paths) = spawn_stub().await;
    let client = client_for(&base);

    // The jobUrl advertised for an in-progress build already carries the
    // api/json suffix; polling with it must still hit well-formed endpoints,
    // not .../api/json/api/json.
    let in_progress = history::in_progress_by_test(&[running_build(&base)]);
    let job_url = in_progress["Login"].job_url.clone();
    assert!(job_url.ends_with("/job/playwrightTest/43/api/json"));

    let status = client.poll_status(&BuildReference(job_url)).await.unwrap();
    assert!(!status.building);
    assert_eq!(status.result, BuildResult::Success);
    assert_eq!(status.logs, "log text");

    let recorded = paths.lock().unwrap().clone();
    assert_eq!(
        recorded,
        vec![
            "/job/playwrightTest/43/api/json".to_string(),
            "/job/playwrightTest/43/consoleText".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_bare_build_reference_polls_same_endpoints() {
    let (base, paths) = spawn_stub().await;
    let client = client_for(&base);

    let build = BuildReference(format!("{base}/job/playwrightTest/43/"));
    client.poll_status(&build).await.unwrap();

    let recorded = paths.lock().unwrap().clone();
    assert_eq!(
        recorded,
        vec![
            "/job/playwrightTest/43/api/json".to_string(),
            "/job/playwrightTest/43/consoleText".to_string(),
        ]
    );
}
