//! The YAML test catalog -- the human-maintained list of available suites.
//!
//! Loaded fresh on every request so edits to the file show up without a
//! restart. An unreadable catalog is not fatal: callers get an empty list
//! and the error goes to the log.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::error;

/// One entry in the catalog. `path` is the opaque locator handed to Jenkins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    pub name: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(
        rename = "test steps",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub steps: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    tests: Vec<TestCase>,
}

/// Read and parse the catalog file.
pub fn load(path: &Path) -> Result<Vec<TestCase>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read test catalog: {}", path.display()))?;
    let catalog: CatalogFile = serde_yaml::from_str(&content)
        .with_context(|| format!("failed to parse test catalog: {}", path.display()))?;
    Ok(catalog.tests)
}

/// Load the catalog, degrading to an empty list on any error.
pub fn load_or_empty(path: &Path) -> Vec<TestCase> {
    match load(path) {
        Ok(tests) => tests,
        Err(e) => {
            error!(path = %path.display(), error = %e, "error reading test catalog");
            Vec::new()
        }
    }
}

/// Resolve a test path to its catalog name, falling back to `"Unknown Test"`.
pub fn name_for_path(tests: &[TestCase], test_path: &str) -> String {
    tests
        .iter()
        .find(|t| t.path == test_path)
        .map(|t| t.name.clone())
        .unwrap_or_else(|| "Unknown Test".to_string())
}
