//! The dashboard client: the terminal-side mirror of the build monitor.
//!
//! Speaks the backend's JSON API: trigger a test, poll its status on a
//! fixed interval until terminal, and keep visible status labels current.
//! In-flight jobs are journaled so a restarted client resumes polling, and
//! a periodic reconcile sweep adopts builds the backend knows about that
//! this client does not.

pub mod journal;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::catalog::TestCase;
use crate::config::MonitorConfig;
use crate::jenkins::BuildResult;
use crate::monitor::excerpt;
use crate::monitor::MonitorRegistry;
use journal::JobJournal;

/// Visible per-test status label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Idle,
    Loading,
    Running,
    Success,
    Failure,
}

impl TestStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TestStatus::Success | TestStatus::Failure)
    }
}

impl std::fmt::Display for TestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            TestStatus::Idle => "idle",
            TestStatus::Loading => "loading",
            TestStatus::Running => "running",
            TestStatus::Success => "success",
            TestStatus::Failure => "failure",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Deserialize)]
struct RunTestResponse {
    #[serde(default)]
    success: bool,
    #[serde(rename = "jobUrl")]
    job_url: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    building: bool,
    result: BuildResult,
    #[serde(default)]
    logs: String,
}

#[derive(Debug, Deserialize)]
struct InProgressResponse {
    #[serde(default)]
    success: bool,
    #[serde(rename = "inProgressBuilds", default)]
    in_progress_builds: HashMap<String, InProgressEntry>,
}

#[derive(Debug, Deserialize)]
struct InProgressEntry {
    #[serde(rename = "jobUrl")]
    job_url: String,
}

#[derive(Debug, Deserialize)]
struct RunAllResponse {
    #[serde(default)]
    success: bool,
    #[serde(rename = "allResults", default)]
    all_results: Vec<RunAllEntry>,
}

#[derive(Debug, Deserialize)]
pub struct RunAllEntry {
    #[serde(rename = "testName")]
    pub test_name: String,
    pub result: bool,
}

/// A client for the dashboard backend. Cheap to clone; clones share the
/// status map, journal, and monitor registry.
#[derive(Clone)]
pub struct PanelClient {
    http: reqwest::Client,
    base_url: String,
    journal: JobJournal,
    registry: MonitorRegistry,
    statuses: Arc<Mutex<HashMap<String, TestStatus>>>,
    poll_interval: Duration,
    initial_delay: Duration,
    refresh_interval: Duration,
    screenshot_base: String,
}

impl PanelClient {
    pub fn new(
        base_url: &str,
        journal_path: &std::path::Path,
        monitor: &MonitorConfig,
        screenshot_base: &str,
    ) -> Result<Self> {
        // No global timeout: runAllTests legitimately takes many minutes.
        let http = reqwest::Client::builder()
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            journal: JobJournal::new(journal_path),
            registry: MonitorRegistry::new(),
            statuses: Arc::new(Mutex::new(HashMap::new())),
            poll_interval: Duration::from_secs(monitor.poll_interval_secs),
            initial_delay: Duration::from_secs(monitor.initial_delay_secs),
            refresh_interval: Duration::from_secs(monitor.refresh_interval_secs),
            screenshot_base: screenshot_base.to_string(),
        })
    }

    pub fn status(&self, test_id: &str) -> TestStatus {
        self.statuses
            .lock()
            .expect("status lock poisoned")
            .get(test_id)
            .copied()
            .unwrap_or(TestStatus::Idle)
    }

    /// Current labels, sorted by test id.
    pub fn snapshot(&self) -> Vec<(String, TestStatus)> {
        let mut entries: Vec<_> = self
            .statuses
            .lock()
            .expect("status lock poisoned")
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    fn set_status(&self, test_id: &str, status: TestStatus) {
        info!(test = %test_id, %status, "status");
        self.statuses
            .lock()
            .expect("status lock poisoned")
            .insert(test_id.to_string(), status);
    }

    pub async fn fetch_test_list(&self) -> Result<Vec<TestCase>> {
        let list = self
            .http
            .get(format!("{}/gettestlist", self.base_url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(list)
    }

    /// Trigger one test and monitor it in the background. The label goes to
    /// `loading` immediately; the monitor loop takes over after the initial
    /// delay. A trigger failure lands on `failure` right away. A repeat
    /// trigger while the job's monitor loop is live is ignored, so the
    /// journal entry for the running job is never rewritten.
    pub async fn trigger(&self, test_path: &str, test_id: &str) {
        if self.registry.is_active(test_id) {
            warn!(test = %test_id, "already monitored, ignoring trigger");
            return;
        }
        self.set_status(test_id, TestStatus::Loading);

        match self.post_run_test(test_path).await {
            Ok(job_url) => {
                self.journal.set(test_id, &job_url);
                self.start_monitor(&job_url, test_id, self.initial_delay);
            }
            Err(e) => {
                error!(test = %test_id, error = %e, "trigger failed");
                self.set_status(test_id, TestStatus::Failure);
            }
        }
    }

    /// Trigger one test and block until its verdict. Used by the one-shot
    /// `run` command; the background path is [`trigger`](Self::trigger).
    pub async fn run_to_verdict(
        &self,
        test_path: &str,
        test_id: &str,
    ) -> Result<(TestStatus, String)> {
        if self.registry.is_active(test_id) {
            bail!("test '{test_id}' is already being monitored");
        }

        self.set_status(test_id, TestStatus::Loading);
        let job_url = match self.post_run_test(test_path).await {
            Ok(url) => url,
            Err(e) => {
                self.set_status(test_id, TestStatus::Failure);
                return Ok((TestStatus::Failure, e.to_string()));
            }
        };
        self.journal.set(test_id, &job_url);

        tokio::time::sleep(self.initial_delay).await;
        self.set_status(test_id, TestStatus::Running);
        self.journal.update_status(test_id, TestStatus::Running);

        let (status, message) = self.poll_until_terminal(&job_url).await;
        self.set_status(test_id, status);
        self.journal.remove(test_id);
        self.surface_screenshot(status, &message);
        Ok((status, message))
    }

    /// Kick off the batch endpoint and wait for its aggregated outcome.
    pub async fn run_all(&self) -> Result<Vec<RunAllEntry>> {
        let response: RunAllResponse = self
            .http
            .post(format!("{}/runAllTests", self.base_url))
            .json(&serde_json::json!({}))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        if !response.success {
            bail!("backend reported batch failure");
        }
        Ok(response.all_results)
    }

    /// Start a background monitor loop for `test_id`, unless one is already
    /// live (idempotent start -- a second request is a no-op).
    pub fn start_monitor(&self, job_url: &str, test_id: &str, delay: Duration) -> bool {
        let client = self.clone();
        let id = test_id.to_string();
        let url = job_url.to_string();
        self.registry.start(test_id, async move {
            tokio::time::sleep(delay).await;
            client.set_status(&id, TestStatus::Running);
            client.journal.update_status(&id, TestStatus::Running);

            let (status, message) = client.poll_until_terminal(&url).await;
            client.set_status(&id, status);
            client.journal.remove(&id);
            client.surface_screenshot(status, &message);
            match status {
                TestStatus::Success => info!(test = %id, "test passed"),
                _ => error!(test = %id, excerpt = %message, "test failed"),
            }
        })
    }

    /// Re-adopt journaled jobs after a restart.
    pub async fn resume(&self) {
        for (test_id, job) in self.journal.load_all() {
            self.set_status(&test_id, job.status);
            match job.status {
                TestStatus::Loading | TestStatus::Running => {
                    info!(test = %test_id, "resuming journaled job");
                    self.start_monitor(&job.job_url, &test_id, Duration::ZERO);
                }
                // Terminal entries should have been removed; clean them up.
                _ => self.journal.remove(&test_id),
            }
        }
    }

    /// One reconcile sweep: ask the backend which builds are in progress and
    /// adopt any this client is not already monitoring. The backend's view
    /// is authoritative and may flip a locally-unknown test to `running`.
    pub async fn refresh_in_progress(&self) -> Result<()> {
        let response: InProgressResponse = self
            .http
            .get(format!("{}/inProgressBuilds", self.base_url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        if !response.success {
            return Ok(());
        }
        for (test_name, entry) in response.in_progress_builds {
            self.start_monitor(&entry.job_url, &test_name, Duration::ZERO);
        }
        Ok(())
    }

    /// Periodic reconcile loop. Returns the task handle so the caller can
    /// abort it on teardown.
    pub fn spawn_refresh_loop(&self) -> JoinHandle<()> {
        let client = self.clone();
        tokio::spawn(async move {
            loop {
                if let Err(e) = client.refresh_in_progress().await {
                    warn!(error = %e, "in-progress refresh failed");
                }
                tokio::time::sleep(client.refresh_interval).await;
            }
        })
    }

    /// Abort every outstanding monitor loop.
    pub fn shutdown(&self) {
        self.registry.shutdown();
    }

    async fn post_run_test(&self, test_path: &str) -> Result<String> {
        let response = self
            .http
            .post(format!("{}/runTest", self.base_url))
            .json(&serde_json::json!({ "testPath": test_path }))
            .send()
            .await?;

        let status = response.status();
        let body: RunTestResponse = response.json().await?;
        if !status.is_success() || !body.success {
            bail!(
                "{}",
                body.message
                    .unwrap_or_else(|| format!("trigger failed with HTTP {status}"))
            );
        }
        body.job_url
            .context("backend did not return a jobUrl")
    }

    /// Poll `/checkJenkinsStatus` on the fixed interval until the build
    /// stops building. Failed polls are logged and skipped; there is no
    /// backoff and no attempt cap.
    async fn poll_until_terminal(&self, job_url: &str) -> (TestStatus, String) {
        loop {
            match self.post_check_status(job_url).await {
                Ok(status) if !status.building => {
                    return if status.result == BuildResult::Success {
                        (TestStatus::Success, status.logs)
                    } else {
                        (TestStatus::Failure, excerpt::failure_excerpt(&status.logs))
                    };
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(job = %job_url, error = %e, "status poll failed");
                }
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn post_check_status(&self, job_url: &str) -> Result<StatusResponse> {
        let response = self
            .http
            .post(format!("{}/checkJenkinsStatus", self.base_url))
            .json(&serde_json::json!({ "jobUrl": job_url }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response)
    }

    /// Point the operator at screenshot evidence the suite uploaded, when
    /// the log mentions one.
    fn surface_screenshot(&self, status: TestStatus, message: &str) {
        let album = match status {
            TestStatus::Success => excerpt::SUCCESS_ALBUM,
            _ => excerpt::ERROR_ALBUM,
        };
        if let Some(url) = excerpt::screenshot_url(message, &self.screenshot_base, album) {
            info!(screenshot = %url, "screenshot evidence available");
        }
    }
}
