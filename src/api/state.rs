use std::sync::Arc;

use crate::config::Config;
use crate::jenkins::JenkinsClient;
use crate::notify::Notifier;
use crate::storage::ResultLog;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub jenkins: Arc<JenkinsClient>,
    pub results: Arc<ResultLog>,
    pub notifier: Arc<dyn Notifier>,
}
