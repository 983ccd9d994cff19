use std::sync::Arc;

use clickhouse::Client;

use crate::{config::Config, services::recorder::LogRecorder};

#[derive(Clone)]
pub struct AppState {
    /// Shared read handle for the metrics query layer.
    pub clickhouse: Client,
    /// Write-side entry point; enqueue only, drained by the writer task.
    pub recorder: Arc<LogRecorder>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(clickhouse: Client, recorder: Arc<LogRecorder>, config: Config) -> Self {
        Self {
            clickhouse,
            recorder,
            config: Arc::new(config),
        }
    }
}
