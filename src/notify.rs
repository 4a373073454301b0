//! Outcome notifications.
//!
//! One notification goes out per completed batch test. Delivery is an HTTP
//! webhook (a mail gateway or chat hook); when no webhook is configured the
//! notifier is a no-op. Delivery failures are logged and never propagate --
//! a lost notification must not fail a run.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};

use crate::config::NotifyConfig;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, subject: &str, body: &str);
}

/// POSTs `{subject, body}` to a configured endpoint.
pub struct WebhookNotifier {
    http: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: &str) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, subject: &str, body: &str) {
        let payload = json!({ "subject": subject, "body": body });
        match self.http.post(&self.url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {
                debug!(%subject, "notification delivered");
            }
            Ok(response) => {
                warn!(%subject, status = %response.status(), "notification rejected");
            }
            Err(e) => {
                warn!(%subject, error = %e, "notification delivery failed");
            }
        }
    }
}

/// Used when no webhook is configured.
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn send(&self, subject: &str, _body: &str) {
        debug!(%subject, "notifications disabled, dropping");
    }
}

/// Build the notifier the config asks for.
pub fn from_config(cfg: &NotifyConfig) -> anyhow::Result<Arc<dyn Notifier>> {
    match &cfg.webhook_url {
        Some(url) => Ok(Arc::new(WebhookNotifier::new(url)?)),
        None => Ok(Arc::new(NoopNotifier)),
    }
}
