//! TOML configuration for the testpanel daemon and client.
//!
//! Layered lookup: the `TESTPANEL_CONFIG` environment variable, then
//! `./testpanel.toml`, then compiled-in defaults. Jenkins credentials are
//! additionally overridable through `JENKINS_USERNAME` / `JENKINS_TOKEN` so
//! tokens stay out of config files.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Root configuration for the testpanel process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub jenkins: JenkinsConfig,
    pub catalog: CatalogConfig,
    pub results: ResultsConfig,
    pub monitor: MonitorConfig,
    pub notify: NotifyConfig,
    pub screenshots: ScreenshotConfig,
}

impl Config {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let mut config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        config.apply_env_overrides();
        info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Try to load configuration from, in order:
    /// 1. The path named by the `TESTPANEL_CONFIG` environment variable.
    /// 2. `./testpanel.toml`.
    /// 3. Fall back to compiled-in defaults.
    pub fn load_or_default() -> Self {
        if let Ok(env_path) = std::env::var("TESTPANEL_CONFIG") {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "TESTPANEL_CONFIG set but file could not be loaded, trying fallback"
                    );
                }
            }
        }

        let local_path = Path::new("testpanel.toml");
        if local_path.exists() {
            match Self::load(local_path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        error = %e,
                        "testpanel.toml exists but could not be loaded, using defaults"
                    );
                }
            }
        }

        debug!("no config file found, using compiled-in defaults");
        let mut cfg = Self::default();
        cfg.apply_env_overrides();
        cfg
    }

    /// Credentials from the environment win over the config file.
    fn apply_env_overrides(&mut self) {
        if let Ok(user) = std::env::var("JENKINS_USERNAME") {
            self.jenkins.username = user;
        }
        if let Ok(token) = std::env::var("JENKINS_TOKEN") {
            self.jenkins.api_token = token;
        }
    }
}

/// HTTP listener configuration for the dashboard backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address and port for the JSON API listener.
    pub bind: String,
    /// Origin allowed to call the API from a browser.
    pub cors_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:3000".to_string(),
            cors_origin: "http://localhost:3006".to_string(),
        }
    }
}

/// Jenkins connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JenkinsConfig {
    /// Base URL of the Jenkins server, no trailing slash.
    pub base_url: String,
    /// Name of the parameterized job that runs Playwright suites.
    pub job_name: String,
    /// Basic-auth user. Overridable via `JENKINS_USERNAME`.
    pub username: String,
    /// Basic-auth API token. Overridable via `JENKINS_TOKEN`.
    pub api_token: String,
}

impl Default for JenkinsConfig {
    fn default() -> Self {
        Self {
            base_url: "http://jenkins:8080".to_string(),
            job_name: "playwrightTest".to_string(),
            username: String::new(),
            api_token: String::new(),
        }
    }
}

/// Where the YAML test catalog lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub path: PathBuf,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("testlist.yaml"),
        }
    }
}

/// Where completed-run records are appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResultsConfig {
    pub path: PathBuf,
}

impl Default for ResultsConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("testResults.json"),
        }
    }
}

/// Polling cadence. Fixed intervals, no backoff.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Seconds between build status polls.
    pub poll_interval_secs: u64,
    /// Seconds to wait after a trigger before the first poll.
    pub initial_delay_secs: u64,
    /// Seconds between in-progress reconcile sweeps on the client.
    pub refresh_interval_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 6,
            initial_delay_secs: 2,
            refresh_interval_secs: 5,
        }
    }
}

/// Optional outcome notification webhook.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// POST target for per-test outcome notifications. Disabled when unset.
    pub webhook_url: Option<String>,
}

/// Object-storage location that hosts failure/success screenshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenshotConfig {
    /// Bucket base URL; screenshots live under `<album>/<file>` below it.
    pub base_url: String,
}

impl Default for ScreenshotConfig {
    fn default() -> Self {
        Self {
            base_url: "https://test-panel-stroge.s3.eu-central-1.amazonaws.com".to_string(),
        }
    }
}
