//! The reqwest-backed Jenkins client.
//!
//! Jenkins answers `buildWithParameters` with a queue item, not a build, so
//! `submit_build` polls the queue item until it resolves to an executable
//! and returns that build's URL as the reference.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use super::{BuildReference, BuildResult, BuildStatus, CiAdapter, PollError, TriggerError};
use crate::config::JenkinsConfig;

/// How often the queue item is re-checked while waiting for the build to
/// leave the queue. Jenkins' default quiet period is five seconds.
const QUEUE_POLL_INTERVAL: Duration = Duration::from_secs(2);

pub struct JenkinsClient {
    http: Client,
    base_url: String,
    job_name: String,
    username: String,
    api_token: String,
}

/// The subset of a build's `api/json` the status check needs.
#[derive(Debug, Deserialize)]
struct BuildInfo {
    #[serde(default)]
    building: bool,
    result: Option<String>,
}

/// A build's `api/json` as the history views see it.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildDetails {
    pub number: u64,
    pub url: String,
    pub display_name: String,
    #[serde(default)]
    pub in_progress: bool,
    pub result: Option<String>,
    /// Milliseconds since the epoch, as Jenkins reports it.
    #[serde(default)]
    pub timestamp: u64,
    /// Milliseconds; zero while the build is running.
    #[serde(default)]
    pub duration: u64,
}

#[derive(Debug, Deserialize)]
struct JobInfo {
    #[serde(default)]
    builds: Vec<BuildSummary>,
}

#[derive(Debug, Deserialize)]
pub struct BuildSummary {
    pub number: u64,
    pub url: String,
}

#[derive(Debug, Deserialize)]
struct QueueItem {
    executable: Option<QueueExecutable>,
}

#[derive(Debug, Deserialize)]
struct QueueExecutable {
    url: String,
}

impl JenkinsClient {
    pub fn new(cfg: &JenkinsConfig) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            job_name: cfg.job_name.clone(),
            username: cfg.username.clone(),
            api_token: cfg.api_token.clone(),
        })
    }

    fn job_api_url(&self) -> String {
        format!("{}/job/{}/api/json", self.base_url, self.job_name)
    }

    /// List the job's builds, newest first (Jenkins' own ordering).
    pub async fn list_builds(&self) -> Result<Vec<BuildSummary>, PollError> {
        let info: JobInfo = self
            .http
            .get(self.job_api_url())
            .basic_auth(&self.username, Some(&self.api_token))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(info.builds)
    }

    /// Fetch one build's full details.
    pub async fn build_details(&self, build_url: &str) -> Result<BuildDetails, PollError> {
        let url = format!("{}api/json", ensure_trailing_slash(build_url));
        let details: BuildDetails = self
            .http
            .get(&url)
            .basic_auth(&self.username, Some(&self.api_token))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(details)
    }

    async fn build_info(&self, build: &BuildReference) -> Result<BuildInfo, PollError> {
        let url = format!("{}api/json", reference_base(build.as_str()));
        let info: BuildInfo = self
            .http
            .get(&url)
            .basic_auth(&self.username, Some(&self.api_token))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(info)
    }

    /// Wait for a queue item to resolve to a concrete build. Unbounded, like
    /// build polling itself; each wait is logged.
    async fn resolve_queue_item(&self, queue_url: &str) -> Result<BuildReference, TriggerError> {
        let api_url = format!("{}api/json", ensure_trailing_slash(queue_url));
        loop {
            let item: QueueItem = self
                .http
                .get(&api_url)
                .basic_auth(&self.username, Some(&self.api_token))
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;

            if let Some(exe) = item.executable {
                return Ok(BuildReference(ensure_trailing_slash(&exe.url)));
            }
            debug!(queue = %queue_url, "build still queued, waiting");
            tokio::time::sleep(QUEUE_POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl CiAdapter for JenkinsClient {
    async fn submit_build(
        &self,
        path: &str,
        name: &str,
    ) -> Result<BuildReference, TriggerError> {
        let url = format!(
            "{}/job/{}/buildWithParameters",
            self.base_url, self.job_name
        );
        let response = self
            .http
            .post(&url)
            .basic_auth(&self.username, Some(&self.api_token))
            .query(&[("TEST_PATH", path), ("TEST_NAME", name)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(TriggerError::Rejected(response.status()));
        }

        let queue_url = response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or(TriggerError::MissingQueueLocation)?;

        let build = self.resolve_queue_item(&queue_url).await?;
        info!(test = %name, build = %build, "jenkins build triggered");
        Ok(build)
    }

    async fn poll_status(&self, build: &BuildReference) -> Result<BuildStatus, PollError> {
        let info = self.build_info(build).await?;
        let logs = self.fetch_log(build).await?;
        Ok(BuildStatus {
            building: info.building,
            result: BuildResult::from_raw(info.result.as_deref()),
            logs,
        })
    }

    async fn fetch_log(&self, build: &BuildReference) -> Result<String, PollError> {
        let url = format!("{}consoleText", reference_base(build.as_str()));
        let text = self
            .http
            .get(&url)
            .basic_auth(&self.username, Some(&self.api_token))
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(text)
    }
}

fn ensure_trailing_slash(url: &str) -> String {
    if url.ends_with('/') {
        url.to_string()
    } else {
        format!("{}/", url)
    }
}

/// In-progress entries advertise their poll key as `{build}api/json`, so a
/// build reference may carry that suffix already. Reduce either form to the
/// bare build URL endpoint paths are appended to.
fn reference_base(url: &str) -> String {
    let url = ensure_trailing_slash(url);
    match url.strip_suffix("api/json/") {
        Some(base) => base.to_string(),
        None => url,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_trailing_slash() {
        assert_eq!(
            ensure_trailing_slash("http://jenkins:8080/job/x/1"),
            "http://jenkins:8080/job/x/1/"
        );
        assert_eq!(
            ensure_trailing_slash("http://jenkins:8080/job/x/1/"),
            "http://jenkins:8080/job/x/1/"
        );
    }

    #[test]
    fn test_reference_base_strips_api_json_suffix() {
        assert_eq!(
            reference_base("http://jenkins:8080/job/x/43/api/json"),
            "http://jenkins:8080/job/x/43/"
        );
        assert_eq!(
            reference_base("http://jenkins:8080/job/x/43/api/json/"),
            "http://jenkins:8080/job/x/43/"
        );
        assert_eq!(
            reference_base("http://jenkins:8080/job/x/43/"),
            "http://jenkins:8080/job/x/43/"
        );
        assert_eq!(
            reference_base("http://jenkins:8080/job/x/43"),
            "http://jenkins:8080/job/x/43/"
        );
    }

    #[test]
    fn test_build_details_parses_jenkins_payload() {
        let payload = r#"{
            "number": 42,
            "url": "http://jenkins:8080/job/playwrightTest/42/",
            "displayName": "Checkout",
            "inProgress": false,
            "result": "SUCCESS",
            "timestamp": 1755907200000,
            "duration": 93500
        }"#;
        let details: BuildDetails = serde_json::from_str(payload).unwrap();
        assert_eq!(details.number, 42);
        assert_eq!(details.display_name, "Checkout");
        assert!(!details.in_progress);
        assert_eq!(details.result.as_deref(), Some("SUCCESS"));
        assert_eq!(details.duration, 93500);
    }

    #[test]
    fn test_build_details_in_progress_payload() {
        // A running build has no result and no duration yet.
        let payload = r#"{
            "number": 43,
            "url": "http://jenkins:8080/job/playwrightTest/43/",
            "displayName": "Login",
            "inProgress": true,
            "result": null,
            "timestamp": 1755907300000
        }"#;
        let details: BuildDetails = serde_json::from_str(payload).unwrap();
        assert!(details.in_progress);
        assert!(details.result.is_none());
        assert_eq!(details.duration, 0);
    }
}
