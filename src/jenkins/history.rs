//! Aggregation of Jenkins' own build history into the dashboard views:
//! newest completed run per test name, and currently-building runs.
//!
//! The grouping is pure over fetched build details so it can be tested
//! without a Jenkins server.

use std::collections::HashMap;

use serde::Serialize;
use tracing::warn;

use super::client::{BuildDetails, JenkinsClient};
use super::PollError;

/// Relative path of the archived Playwright log inside a build.
const LOG_ARTIFACT_VIEW: &str = "artifact/playwright-test-output.log/*view*/";

/// The newest completed run of one test.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LastRun {
    pub test_name: String,
    pub result: Option<String>,
    pub timestamp: u64,
    pub duration: u64,
    pub url: String,
}

/// A build whose terminal result is not yet known.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InProgressBuild {
    pub test_name: String,
    pub in_progress: bool,
    pub build_number: u64,
    pub job_url: String,
    pub timestamp: u64,
}

/// Keep the newest non-in-progress build per display name. A build still in
/// progress never appears here.
pub fn newest_completed_per_test(builds: &[BuildDetails]) -> HashMap<String, LastRun> {
    let mut last_runs: HashMap<String, LastRun> = HashMap::new();

    for build in builds {
        if build.in_progress {
            continue;
        }
        let entry = last_runs.get(&build.display_name);
        if entry.map_or(true, |existing| build.timestamp > existing.timestamp) {
            last_runs.insert(
                build.display_name.clone(),
                LastRun {
                    test_name: build.display_name.clone(),
                    result: build.result.clone(),
                    timestamp: build.timestamp,
                    duration: build.duration,
                    url: format!("{}{}", build.url, LOG_ARTIFACT_VIEW),
                },
            );
        }
    }

    last_runs
}

/// Collect the builds that are still running, keyed by display name.
pub fn in_progress_by_test(builds: &[BuildDetails]) -> HashMap<String, InProgressBuild> {
    let mut in_progress = HashMap::new();

    for build in builds {
        if !build.in_progress {
            continue;
        }
        in_progress.insert(
            build.display_name.clone(),
            InProgressBuild {
                test_name: build.display_name.clone(),
                in_progress: true,
                build_number: build.number,
                job_url: format!("{}api/json", build.url),
                timestamp: build.timestamp,
            },
        );
    }

    in_progress
}

/// Fetch details for every build of the job. A single unreadable build is
/// skipped with a warning rather than failing the whole view.
pub async fn fetch_all_builds(client: &JenkinsClient) -> Result<Vec<BuildDetails>, PollError> {
    let summaries = client.list_builds().await?;
    let mut details = Vec::with_capacity(summaries.len());
    for summary in summaries {
        match client.build_details(&summary.url).await {
            Ok(d) => details.push(d),
            Err(e) => {
                warn!(build = summary.number, error = %e, "skipping unreadable build");
            }
        }
    }
    Ok(details)
}
