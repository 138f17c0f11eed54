use crate::config::AppConfig;
use crate::pipeline::Pipeline;
use crate::pipeline::session::Session;
use tokio::sync::Mutex;

/// Shared application state for the web server
pub struct AppState {
    pub config: AppConfig,
    pub pipeline: Pipeline,
    // One conversation per server; turns run one at a time
    pub session: Mutex<Option<Session>>,
    pub startup_time: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    pub fn new(config: AppConfig, pipeline: Pipeline, session: Option<Session>) -> Self {
        Self {
            config,
            pipeline,
            session: Mutex::new(session),
            startup_time: chrono::Utc::now(),
        }
    }
}
