//! Flat-file result log -- an append-only JSON array of completed runs.
//!
//! The file format is read-whole / append / rewrite-whole. Writes are
//! serialized behind a single async mutex so two completing runs cannot
//! lose each other's records.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("result log I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("result log is not valid JSON: {0}")]
    Format(#[from] serde_json::Error),
}

/// One persisted outcome. Records are only ever appended, never mutated or
/// deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRunRecord {
    pub test_name: String,
    pub result: bool,
    pub date: DateTime<Utc>,
    pub error: Option<String>,
}

impl TestRunRecord {
    pub fn new(test_name: &str, result: bool, error: Option<String>) -> Self {
        Self {
            test_name: test_name.to_string(),
            result,
            date: Utc::now(),
            error,
        }
    }
}

/// Handle on the result log file.
pub struct ResultLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl ResultLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Read every record. A missing file is an empty log.
    pub async fn read_all(&self) -> Result<Vec<TestRunRecord>, StorageError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(data) if data.trim().is_empty() => Ok(Vec::new()),
            Ok(data) => Ok(serde_json::from_str(&data)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Append one record, rewriting the whole array under the write lock.
    pub async fn append(&self, record: TestRunRecord) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.read_all().await?;
        records.push(record);
        let data = serde_json::to_string_pretty(&records)?;
        tokio::fs::write(&self.path, data).await?;
        Ok(())
    }
}
