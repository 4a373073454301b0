//! The build monitor: fixed-interval polling of one build until Jenkins
//! reports a terminal state, plus the sequential batch runner and the
//! registry that keeps each job down to a single poll loop.

pub mod excerpt;

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::jenkins::{BuildReference, BuildResult, CiAdapter};
use crate::notify::Notifier;
use crate::storage::{ResultLog, TestRunRecord};

/// Lifecycle of one monitored job. `Pending` on submit, `Running` once
/// Jenkins reports `building`, then exactly one terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Running,
    Succeeded,
    Failed,
}

/// The terminal outcome handed to the listener exactly once: the pass/fail
/// verdict and the log text worth showing (full log on success, bounded
/// excerpt on failure).
#[derive(Debug, Clone)]
pub struct Verdict {
    pub passed: bool,
    pub message: String,
}

/// Poll a build until it stops building, then settle a verdict.
///
/// A failed poll is logged and skipped; the loop neither retries early nor
/// gives up, so a CI server that never reports a terminal state keeps this
/// future alive indefinitely. That matches the accepted design limitation:
/// no backoff, no attempt cap.
pub async fn run_to_completion(
    adapter: &dyn CiAdapter,
    build: &BuildReference,
    poll_interval: Duration,
) -> Verdict {
    let mut state = JobState::Pending;

    loop {
        match adapter.poll_status(build).await {
            Ok(status) => {
                if status.building {
                    if state == JobState::Pending {
                        state = JobState::Running;
                        debug!(build = %build, "build is running");
                    }
                } else {
                    let verdict = settle(status.result, status.logs);
                    state = if verdict.passed {
                        JobState::Succeeded
                    } else {
                        JobState::Failed
                    };
                    info!(build = %build, state = ?state, "build finished");
                    return verdict;
                }
            }
            Err(e) => {
                // Skip this round; the next tick polls again.
                warn!(build = %build, error = %e, "status poll failed");
            }
        }

        tokio::time::sleep(poll_interval).await;
    }
}

fn settle(result: BuildResult, logs: String) -> Verdict {
    if result == BuildResult::Success {
        Verdict {
            passed: true,
            message: logs,
        }
    } else {
        Verdict {
            passed: false,
            message: excerpt::failure_excerpt(&logs),
        }
    }
}

/// One entry of a `runAllTests` response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    pub test_name: String,
    pub result: bool,
}

/// Run every catalog entry to completion, strictly one after another.
///
/// Each test gets a full trigger-and-monitor cycle, one persisted record,
/// and one notification before the next test starts. A failing entry is
/// recorded as a failure and never aborts the rest of the batch.
pub async fn run_batch(
    adapter: &dyn CiAdapter,
    results: &ResultLog,
    notifier: &dyn Notifier,
    tests: &[crate::catalog::TestCase],
    poll_interval: Duration,
) -> Vec<BatchOutcome> {
    let mut outcomes = Vec::with_capacity(tests.len());

    for test in tests {
        let outcome = match adapter.submit_build(&test.path, &test.name).await {
            Ok(build) => {
                let verdict = run_to_completion(adapter, &build, poll_interval).await;
                let subject = if verdict.passed {
                    format!("{} Successfully Completed", test.name)
                } else {
                    format!("{} Failed", test.name)
                };
                notifier.send(&subject, &verdict.message).await;
                persist(results, &test.name, verdict.passed, &verdict.message).await;
                BatchOutcome {
                    test_name: test.name.clone(),
                    result: verdict.passed,
                }
            }
            Err(e) => {
                error!(test = %test.name, error = %e, "batch trigger failed");
                notifier
                    .send(&format!("{} Test Error", test.name), &e.to_string())
                    .await;
                persist(results, &test.name, false, &e.to_string()).await;
                BatchOutcome {
                    test_name: test.name.clone(),
                    result: false,
                }
            }
        };
        outcomes.push(outcome);
    }

    outcomes
}

async fn persist(results: &ResultLog, test_name: &str, passed: bool, message: &str) {
    let record = TestRunRecord::new(test_name, passed, (!passed).then(|| message.to_string()));
    if let Err(e) = results.append(record).await {
        error!(test = %test_name, error = %e, "failed to save test result");
    }
}

/// Tracks which test ids currently have a live poll loop.
///
/// Starting a monitor for an id that is already monitored is a no-op, which
/// is what keeps double triggers (or a reconcile sweep racing a local
/// trigger) from spawning two loops for the same job. Each loop's task
/// handle is kept so teardown can abort whatever is still in flight.
#[derive(Clone, Default)]
pub struct MonitorRegistry {
    jobs: Arc<Mutex<HashMap<String, JoinHandle<()>>>>,
}

impl MonitorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `work` as the monitor loop for `test_id`, unless one is already
    /// live. Returns whether a new loop was started. The entry removes
    /// itself when the loop finishes.
    pub fn start<F>(&self, test_id: &str, work: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut jobs = self.jobs.lock().expect("registry lock poisoned");
        if jobs.contains_key(test_id) {
            debug!(test = %test_id, "already monitored, not starting a second loop");
            return false;
        }

        let registry = self.clone();
        let id = test_id.to_string();
        let handle = tokio::spawn(async move {
            work.await;
            registry.finish(&id);
        });
        jobs.insert(test_id.to_string(), handle);
        true
    }

    pub fn is_active(&self, test_id: &str) -> bool {
        self.jobs
            .lock()
            .expect("registry lock poisoned")
            .contains_key(test_id)
    }

    pub fn active_count(&self) -> usize {
        self.jobs.lock().expect("registry lock poisoned").len()
    }

    fn finish(&self, test_id: &str) {
        self.jobs
            .lock()
            .expect("registry lock poisoned")
            .remove(test_id);
    }

    /// Abort every outstanding monitor loop. Used on client teardown so
    /// poll loops do not outlive the component that started them.
    pub fn shutdown(&self) {
        let mut jobs = self.jobs.lock().expect("registry lock poisoned");
        for (test_id, handle) in jobs.drain() {
            debug!(test = %test_id, "aborting monitor loop");
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::jenkins::{BuildStatus, PollError, TriggerError};

    /// Scripted adapter: a fixed sequence of poll responses per build.
    struct ScriptedAdapter {
        polls: Mutex<Vec<Result<BuildStatus, PollError>>>,
        poll_count: AtomicUsize,
        fail_submit_for: Option<String>,
    }

    impl ScriptedAdapter {
        fn new(polls: Vec<Result<BuildStatus, PollError>>) -> Self {
            Self {
                polls: Mutex::new(polls),
                poll_count: AtomicUsize::new(0),
                fail_submit_for: None,
            }
        }

        fn status(building: bool, result: BuildResult, logs: &str) -> BuildStatus {
            BuildStatus {
                building,
                result,
                logs: logs.to_string(),
            }
        }
    }

    #[async_trait]
    impl CiAdapter for ScriptedAdapter {
        async fn submit_build(
            &self,
            path: &str,
            _name: &str,
        ) -> Result<BuildReference, TriggerError> {
            if self.fail_submit_for.as_deref() == Some(path) {
                return Err(TriggerError::MissingQueueLocation);
            }
            Ok(BuildReference(format!("http://jenkins/job/x/{}/", path)))
        }

        async fn poll_status(
            &self,
            _build: &BuildReference,
        ) -> Result<BuildStatus, PollError> {
            self.poll_count.fetch_add(1, Ordering::SeqCst);
            let mut polls = self.polls.lock().unwrap();
            if polls.is_empty() {
                // Keep answering terminal success once the script runs out.
                return Ok(Self::status(false, BuildResult::Success, "done"));
            }
            polls.remove(0)
        }

        async fn fetch_log(&self, _build: &BuildReference) -> Result<String, PollError> {
            Ok("done".to_string())
        }
    }

    const TICK: Duration = Duration::from_millis(5);

    #[tokio::test]
    async fn test_monitor_waits_out_building_polls() {
        let adapter = ScriptedAdapter::new(vec![
            Ok(ScriptedAdapter::status(true, BuildResult::Unknown, "")),
            Ok(ScriptedAdapter::status(true, BuildResult::Unknown, "")),
            Ok(ScriptedAdapter::status(true, BuildResult::Unknown, "")),
            Ok(ScriptedAdapter::status(false, BuildResult::Success, "3 passed")),
        ]);
        let build = BuildReference("http://jenkins/job/x/1/".to_string());

        let verdict = run_to_completion(&adapter, &build, TICK).await;
        assert!(verdict.passed);
        assert_eq!(verdict.message, "3 passed");
        assert_eq!(adapter.poll_count.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_monitor_skips_failed_polls() {
        let adapter = ScriptedAdapter::new(vec![
            Err(PollError::Malformed("bad payload".to_string())),
            Ok(ScriptedAdapter::status(true, BuildResult::Unknown, "")),
            Err(PollError::Malformed("bad payload".to_string())),
            Ok(ScriptedAdapter::status(false, BuildResult::Success, "ok")),
        ]);
        let build = BuildReference("http://jenkins/job/x/2/".to_string());

        // A poll error never terminates the loop.
        let verdict = run_to_completion(&adapter, &build, TICK).await;
        assert!(verdict.passed);
    }

    #[tokio::test]
    async fn test_monitor_extracts_failure_excerpt() {
        let log = "noise\n1) [chromium] > checkout\n    Error: boom\n      at pay (checkout.spec.ts:7:1)\ntail\n";
        let adapter = ScriptedAdapter::new(vec![Ok(ScriptedAdapter::status(
            false,
            BuildResult::Failure,
            log,
        ))]);
        let build = BuildReference("http://jenkins/job/x/3/".to_string());

        let verdict = run_to_completion(&adapter, &build, TICK).await;
        assert!(!verdict.passed);
        assert!(verdict.message.starts_with("1) [chromium]"));
        assert!(verdict.message.ends_with("checkout.spec.ts:7:1"));
    }

    #[tokio::test]
    async fn test_batch_produces_one_outcome_per_test_in_order() {
        let dir = tempfile::TempDir::new().unwrap();
        let results = ResultLog::new(dir.path().join("results.json"));
        let notifier = crate::notify::NoopNotifier;

        let mut adapter = ScriptedAdapter::new(vec![]);
        adapter.fail_submit_for = Some("b.spec.ts".to_string());

        let tests = vec![
            crate::catalog::TestCase {
                name: "A".into(),
                path: "a.spec.ts".into(),
                description: None,
                steps: vec![],
            },
            crate::catalog::TestCase {
                name: "B".into(),
                path: "b.spec.ts".into(),
                description: None,
                steps: vec![],
            },
            crate::catalog::TestCase {
                name: "C".into(),
                path: "c.spec.ts".into(),
                description: None,
                steps: vec![],
            },
        ];

        let outcomes = run_batch(&adapter, &results, &notifier, &tests, TICK).await;

        // Exactly N entries, catalog order, with the broken trigger recorded
        // as a failure instead of aborting the batch.
        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[0].test_name, "A");
        assert!(outcomes[0].result);
        assert_eq!(outcomes[1].test_name, "B");
        assert!(!outcomes[1].result);
        assert_eq!(outcomes[2].test_name, "C");
        assert!(outcomes[2].result);

        let records = results.read_all().await.unwrap();
        assert_eq!(records.len(), 3);
        assert!(records[1].error.is_some());
        assert!(records[0].error.is_none());
    }

    #[tokio::test]
    async fn test_registry_dedupes_monitor_starts() {
        let registry = MonitorRegistry::new();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        assert!(registry.start("Checkout", async move {
            let _ = rx.await;
        }));
        assert!(registry.is_active("Checkout"));

        // Second start for the same id while the first loop lives: no-op.
        assert!(!registry.start("Checkout", async {}));
        assert_eq!(registry.active_count(), 1);

        tx.send(()).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!registry.is_active("Checkout"));

        // Once finished, the id can be monitored again.
        assert!(registry.start("Checkout", async {}));
    }

    #[tokio::test]
    async fn test_registry_shutdown_aborts_loops() {
        let registry = MonitorRegistry::new();
        registry.start("forever", async {
            loop {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
        });
        assert_eq!(registry.active_count(), 1);

        registry.shutdown();
        assert_eq!(registry.active_count(), 0);
    }
}
