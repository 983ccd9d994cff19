use std::sync::Arc;

use clickhouse::Client;
use oplog_backend::{config::Config, services::recorder::LogRecorder, state::AppState};

/// Configuration for in-process tests. The client handle is never used
/// because no writer task is spawned; events stay queued for inspection.
pub fn test_config() -> Config {
    Config {
        clickhouse_url: "http://localhost:8123".to_string(),
        clickhouse_user: "default".to_string(),
        clickhouse_password: String::new(),
        clickhouse_db: "admin_logs_test".to_string(),
        bind_addr: "127.0.0.1:0".to_string(),
        log_queue_capacity: 64,
        max_captured_body_bytes: 64 * 1024,
        capture_get_bodies: false,
        http_requests_ttl_days: 30,
        admin_actions_ttl_days: 90,
        errors_ttl_days: 365,
        query_timeout_secs: 10,
    }
}

pub fn test_state(config: Config) -> (AppState, Arc<LogRecorder>) {
    let recorder = LogRecorder::new(config.log_queue_capacity);
    let client = Client::default()
        .with_url(&config.clickhouse_url)
        .with_database(&config.clickhouse_db);
    let state = AppState::new(client, Arc::clone(&recorder), config);
    (state, recorder)
}
