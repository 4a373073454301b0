//! Client-local journal of in-flight jobs, so a restarted panel can
//! rediscover and resume polling. The browser panel kept this in
//! localStorage; here it is a small JSON file keyed by test id.
//!
//! Best-effort storage: journal write failures are logged, never raised --
//! losing a journal entry only costs resumption, not correctness.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::TestStatus;

/// One in-flight job. Created on trigger, updated on each status
/// transition, deleted once the job reaches a terminal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OngoingJob {
    pub test_id: String,
    pub job_url: String,
    pub status: TestStatus,
}

#[derive(Clone)]
pub struct JobJournal {
    path: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl JobJournal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Every journaled job. Missing or malformed files read as empty.
    pub fn load_all(&self) -> HashMap<String, OngoingJob> {
        let _guard = self.lock.lock().expect("journal lock poisoned");
        self.read_unlocked()
    }

    /// Journal a freshly triggered job.
    pub fn set(&self, test_id: &str, job_url: &str) {
        self.mutate(|jobs| {
            jobs.insert(
                test_id.to_string(),
                OngoingJob {
                    test_id: test_id.to_string(),
                    job_url: job_url.to_string(),
                    status: TestStatus::Loading,
                },
            );
        });
    }

    /// Record a status transition for a journaled job, if present.
    pub fn update_status(&self, test_id: &str, status: TestStatus) {
        self.mutate(|jobs| {
            if let Some(job) = jobs.get_mut(test_id) {
                job.status = status;
            }
        });
    }

    /// Drop a job that reached a terminal state.
    pub fn remove(&self, test_id: &str) {
        self.mutate(|jobs| {
            jobs.remove(test_id);
        });
    }

    fn mutate(&self, f: impl FnOnce(&mut HashMap<String, OngoingJob>)) {
        let _guard = self.lock.lock().expect("journal lock poisoned");
        let mut jobs = self.read_unlocked();
        f(&mut jobs);
        match serde_json::to_string_pretty(&jobs) {
            Ok(data) => {
                if let Err(e) = std::fs::write(&self.path, data) {
                    warn!(path = %self.path.display(), error = %e, "failed to write job journal");
                }
            }
            Err(e) => warn!(error = %e, "failed to serialize job journal"),
        }
    }

    fn read_unlocked(&self) -> HashMap<String, OngoingJob> {
        match std::fs::read_to_string(&self.path) {
            Ok(data) if data.trim().is_empty() => HashMap::new(),
            Ok(data) => serde_json::from_str(&data).unwrap_or_else(|e| {
                warn!(path = %self.path.display(), error = %e, "job journal is malformed, starting fresh");
                HashMap::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to read job journal");
                HashMap::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_journal_lifecycle() {
        let dir = tempfile::TempDir::new().unwrap();
        let journal = JobJournal::new(dir.path().join("ongoing.json"));

        journal.set("Checkout", "http://jenkins/job/x/1/");
        let jobs = journal.load_all();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs["Checkout"].status, TestStatus::Loading);
        assert_eq!(jobs["Checkout"].job_url, "http://jenkins/job/x/1/");

        journal.update_status("Checkout", TestStatus::Running);
        assert_eq!(journal.load_all()["Checkout"].status, TestStatus::Running);

        journal.remove("Checkout");
        assert!(journal.load_all().is_empty());
    }

    #[test]
    fn test_update_unknown_id_is_noop() {
        let dir = tempfile::TempDir::new().unwrap();
        let journal = JobJournal::new(dir.path().join("ongoing.json"));
        journal.update_status("ghost", TestStatus::Running);
        assert!(journal.load_all().is_empty());
    }

    #[test]
    fn test_missing_and_malformed_files_read_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("ongoing.json");

        let journal = JobJournal::new(&path);
        assert!(journal.load_all().is_empty());

        std::fs::write(&path, "{broken").unwrap();
        assert!(journal.load_all().is_empty());
    }

    #[test]
    fn test_wire_field_names() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("ongoing.json");
        let journal = JobJournal::new(&path);
        journal.set("Login", "http://jenkins/job/x/2/");

        let raw = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        let job = &value["Login"];
        assert_eq!(job["testId"], "Login");
        assert_eq!(job["jobUrl"], "http://jenkins/job/x/2/");
        assert_eq!(job["status"], "loading");
    }
}
