//! testpanel -- dashboard backend and terminal client for Playwright test
//! jobs on Jenkins.
//!
//! The backend is a thin orchestration layer: a JSON API in front of
//! Jenkins' own REST API, a flat-file result log, and a build monitor that
//! polls triggered builds to their verdict. The client mirrors the browser
//! panel: trigger, poll, resume after restart.

pub mod api;
pub mod catalog;
pub mod config;
pub mod jenkins;
pub mod monitor;
pub mod notify;
pub mod panel;
pub mod storage;

use std::sync::Arc;

use anyhow::Result;

use config::Config;

/// Start the dashboard backend: Jenkins adapter, result log, JSON API.
pub async fn serve(config: Config) -> Result<()> {
    let config = Arc::new(config);

    tracing::info!(
        jenkins = %config.jenkins.base_url,
        job = %config.jenkins.job_name,
        "initializing jenkins adapter"
    );
    let jenkins = Arc::new(jenkins::JenkinsClient::new(&config.jenkins)?);
    let results = Arc::new(storage::ResultLog::new(config.results.path.clone()));
    let notifier = notify::from_config(&config.notify)?;

    let addr: std::net::SocketAddr = config.server.bind.parse()?;
    let state = api::state::AppState {
        config: config.clone(),
        jenkins,
        results,
        notifier,
    };
    let app = api::router(state);

    tracing::info!(%addr, "testpanel listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
