use anyhow::anyhow;
use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub clickhouse_url: String,
    pub clickhouse_user: String,
    pub clickhouse_password: String,
    pub clickhouse_db: String,
    pub bind_addr: String,
    /// Capacity of the in-memory log queue. When full, the oldest pending
    /// event is dropped and counted.
    pub log_queue_capacity: usize,
    /// Upper bound on how many body bytes the capture middleware buffers.
    pub max_captured_body_bytes: usize,
    /// Whether GET request/response bodies are captured. Off by default to
    /// keep log volume down.
    pub capture_get_bodies: bool,
    pub http_requests_ttl_days: u32,
    pub admin_actions_ttl_days: u32,
    pub errors_ttl_days: u32,
    /// Deadline applied to every dashboard read query.
    pub query_timeout_secs: u64,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let clickhouse_url =
            env::var("CLICKHOUSE_URL").unwrap_or_else(|_| "http://localhost:8123".to_string());
        let clickhouse_user = env::var("CLICKHOUSE_USER").unwrap_or_else(|_| "default".to_string());
        let clickhouse_password = env::var("CLICKHOUSE_PASSWORD").unwrap_or_default();
        let clickhouse_db = env::var("CLICKHOUSE_DB").unwrap_or_else(|_| "admin_logs".to_string());

        if !is_valid_db_name(&clickhouse_db) {
            return Err(anyhow!(
                "Invalid CLICKHOUSE_DB value: {} (expected [A-Za-z0-9_]+)",
                clickhouse_db
            ));
        }

        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());

        let log_queue_capacity = env::var("LOG_QUEUE_CAPACITY")
            .unwrap_or_else(|_| "4096".to_string())
            .parse()
            .unwrap_or(4096);

        let max_captured_body_bytes = env::var("MAX_CAPTURED_BODY_BYTES")
            .unwrap_or_else(|_| "65536".to_string())
            .parse()
            .unwrap_or(64 * 1024);

        let capture_get_bodies = env::var("CAPTURE_GET_BODIES")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let http_requests_ttl_days = parse_env_u32("HTTP_REQUESTS_TTL_DAYS", 30);
        let admin_actions_ttl_days = parse_env_u32("ADMIN_ACTIONS_TTL_DAYS", 90);
        let errors_ttl_days = parse_env_u32("ERRORS_TTL_DAYS", 365);

        let query_timeout_secs = env::var("QUERY_TIMEOUT_SECS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .unwrap_or(10);

        Ok(Config {
            clickhouse_url,
            clickhouse_user,
            clickhouse_password,
            clickhouse_db,
            bind_addr,
            log_queue_capacity,
            max_captured_body_bytes,
            capture_get_bodies,
            http_requests_ttl_days,
            admin_actions_ttl_days,
            errors_ttl_days,
            query_timeout_secs,
        })
    }
}

fn parse_env_u32(key: &str, default: u32) -> u32 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Database names are interpolated into DDL, so only identifier characters
/// are accepted.
pub fn is_valid_db_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_name_validation_accepts_identifiers() {
        assert!(is_valid_db_name("admin_logs"));
        assert!(is_valid_db_name("logs2"));
        assert!(!is_valid_db_name(""));
        assert!(!is_valid_db_name("logs;DROP"));
        assert!(!is_valid_db_name("logs.other"));
        assert!(!is_valid_db_name("logs-prod"));
    }
}
