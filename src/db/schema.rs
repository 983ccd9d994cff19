use clickhouse::Client;

use crate::config::{is_valid_db_name, Config};
use crate::db::connection::create_bootstrap_client;

/// Creates the log database and its three append-only tables at startup.
/// A missing table would fail every write, so any error here is fatal and
/// aborts the process.
pub struct SchemaManager {
    client: Client,
    database: String,
    http_requests_ttl_days: u32,
    admin_actions_ttl_days: u32,
    errors_ttl_days: u32,
}

impl SchemaManager {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        if !is_valid_db_name(&config.clickhouse_db) {
            anyhow::bail!("invalid database name: {}", config.clickhouse_db);
        }
        Ok(Self {
            client: create_bootstrap_client(config),
            database: config.clickhouse_db.clone(),
            http_requests_ttl_days: config.http_requests_ttl_days,
            admin_actions_ttl_days: config.admin_actions_ttl_days,
            errors_ttl_days: config.errors_ttl_days,
        })
    }

    /// Idempotent; blocking here is fine because this runs once before the
    /// server starts accepting traffic.
    pub async fn ensure_ready(&self) -> anyhow::Result<()> {
        self.client
            .query(&format!("CREATE DATABASE IF NOT EXISTS {}", self.database))
            .execute()
            .await
            .map_err(|e| anyhow::anyhow!("failed to create database {}: {e}", self.database))?;

        tokio::try_join!(
            self.execute_ddl(http_requests_ddl(&self.database, self.http_requests_ttl_days)),
            self.execute_ddl(admin_actions_ddl(&self.database, self.admin_actions_ttl_days)),
            self.execute_ddl(errors_ddl(&self.database, self.errors_ttl_days)),
        )?;

        tracing::info!(database = %self.database, "Log tables verified/created");
        Ok(())
    }

    async fn execute_ddl(&self, ddl: String) -> anyhow::Result<()> {
        self.client
            .query(&ddl)
            .execute()
            .await
            .map_err(|e| anyhow::anyhow!("failed to create log table: {e}"))
    }
}

fn http_requests_ddl(db: &str, ttl_days: u32) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {db}.http_requests (\
           timestamp DateTime DEFAULT now(),\
           method String,\
           path String,\
           status UInt16,\
           duration_ms UInt32,\
           ip String,\
           user_id Nullable(String),\
           request_id String,\
           request_body Nullable(String),\
           response_body Nullable(String),\
           query_params Nullable(String)\
         ) ENGINE = MergeTree() \
         ORDER BY (timestamp, status) \
         TTL timestamp + INTERVAL {ttl_days} DAY"
    )
}

fn admin_actions_ddl(db: &str, ttl_days: u32) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {db}.admin_actions (\
           timestamp DateTime DEFAULT now(),\
           level Enum8('INFO' = 1, 'WARN' = 2, 'ERROR' = 3) DEFAULT 'INFO',\
           action String,\
           user_id String,\
           target_id Nullable(String),\
           metadata String\
         ) ENGINE = MergeTree() \
         ORDER BY (timestamp, level, action) \
         TTL timestamp + INTERVAL {ttl_days} DAY"
    )
}

fn errors_ddl(db: &str, ttl_days: u32) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {db}.errors (\
           timestamp DateTime DEFAULT now(),\
           type String,\
           message String,\
           stack_trace String,\
           ip String,\
           request_id Nullable(String),\
           user_id Nullable(String),\
           http_path Nullable(String),\
           http_method Nullable(String),\
           http_status Nullable(UInt16),\
           request_body Nullable(String),\
           response_body Nullable(String),\
           metadata String\
         ) ENGINE = MergeTree() \
         ORDER BY (timestamp, type) \
         TTL timestamp + INTERVAL {ttl_days} DAY"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_requests_ddl_has_sort_key_and_ttl() {
        let ddl = http_requests_ddl("admin_logs", 30);
        assert!(ddl.contains("CREATE TABLE IF NOT EXISTS admin_logs.http_requests"));
        assert!(ddl.contains("ORDER BY (timestamp, status)"));
        assert!(ddl.contains("TTL timestamp + INTERVAL 30 DAY"));
        assert!(ddl.contains("ENGINE = MergeTree()"));
    }

    #[test]
    fn admin_actions_ddl_has_sort_key_and_ttl() {
        let ddl = admin_actions_ddl("admin_logs", 90);
        assert!(ddl.contains("ORDER BY (timestamp, level, action)"));
        assert!(ddl.contains("TTL timestamp + INTERVAL 90 DAY"));
        assert!(ddl.contains("Enum8('INFO' = 1, 'WARN' = 2, 'ERROR' = 3)"));
    }

    #[test]
    fn errors_ddl_has_sort_key_and_ttl() {
        let ddl = errors_ddl("admin_logs", 365);
        assert!(ddl.contains("ORDER BY (timestamp, type)"));
        assert!(ddl.contains("TTL timestamp + INTERVAL 365 DAY"));
        assert!(ddl.contains("http_status Nullable(UInt16)"));
    }
}
