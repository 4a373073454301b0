//! Jenkins adapter -- types, errors, and the thin client over its REST API.

pub mod client;
pub mod history;

pub use client::JenkinsClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Opaque identifier for one triggered build: the build's URL on the CI
/// server. Nothing more than a poll key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuildReference(pub String);

impl BuildReference {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BuildReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Terminal verdict as Jenkins reports it. Anything that is neither a clean
/// pass nor still pending (aborted, unstable) counts as a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BuildResult {
    Success,
    Failure,
    Unknown,
}

impl BuildResult {
    /// Map the raw `result` field of a build's JSON. `null` means the build
    /// has not finished.
    pub fn from_raw(raw: Option<&str>) -> Self {
        match raw {
            None => BuildResult::Unknown,
            Some("SUCCESS") => BuildResult::Success,
            Some(_) => BuildResult::Failure,
        }
    }
}

/// A point-in-time snapshot of one build. Fetched fresh on every poll and
/// always superseded by the next poll, never cached or merged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildStatus {
    pub building: bool,
    pub result: BuildResult,
    pub logs: String,
}

/// The CI system could not be reached or rejected the build request.
#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("jenkins is unreachable: {0}")]
    Unreachable(#[from] reqwest::Error),
    #[error("jenkins rejected the build request: HTTP {0}")]
    Rejected(reqwest::StatusCode),
    #[error("jenkins did not return a queue location for the build")]
    MissingQueueLocation,
}

/// A status check failed. Poll loops log these and keep going.
#[derive(Debug, Error)]
pub enum PollError {
    #[error("status request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("unexpected status payload: {0}")]
    Malformed(String),
}

/// The operations the build monitor and batch runner need from a CI server.
///
/// `JenkinsClient` is the real implementation; tests substitute scripted
/// fakes.
#[async_trait]
pub trait CiAdapter: Send + Sync {
    /// Start a parameterized build. Side effect: a new build exists on the
    /// CI server.
    async fn submit_build(&self, path: &str, name: &str)
        -> Result<BuildReference, TriggerError>;

    /// Fetch the current snapshot of a build. Pure read; must tolerate the
    /// CI server answering "in progress" indefinitely.
    async fn poll_status(&self, build: &BuildReference) -> Result<BuildStatus, PollError>;

    /// Fetch the raw console text. Large; only needed on terminal states.
    async fn fetch_log(&self, build: &BuildReference) -> Result<String, PollError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_result_mapping() {
        assert_eq!(BuildResult::from_raw(None), BuildResult::Unknown);
        assert_eq!(BuildResult::from_raw(Some("SUCCESS")), BuildResult::Success);
        assert_eq!(BuildResult::from_raw(Some("FAILURE")), BuildResult::Failure);
        // Aborted and unstable builds are failures as far as the panel cares.
        assert_eq!(BuildResult::from_raw(Some("ABORTED")), BuildResult::Failure);
        assert_eq!(BuildResult::from_raw(Some("UNSTABLE")), BuildResult::Failure);
    }

    #[test]
    fn test_build_result_wire_format() {
        assert_eq!(
            serde_json::to_string(&BuildResult::Success).unwrap(),
            "\"SUCCESS\""
        );
        assert_eq!(
            serde_json::to_string(&BuildResult::Unknown).unwrap(),
            "\"UNKNOWN\""
        );
    }

    #[test]
    fn test_build_reference_is_transparent() {
        let r = BuildReference("http://jenkins:8080/job/playwrightTest/42/".to_string());
        let json = serde_json::to_string(&r).unwrap();
        assert_eq!(json, "\"http://jenkins:8080/job/playwrightTest/42/\"");
    }
}
