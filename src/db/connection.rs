use clickhouse::Client;

use crate::config::Config;

/// Builds the shared client used by the recorder and the query layer.
/// Constructed once in `main` and cloned into whatever needs it; the
/// client is a thin handle over a connection pool.
pub fn create_client(config: &Config) -> Client {
    Client::default()
        .with_url(&config.clickhouse_url)
        .with_user(&config.clickhouse_user)
        .with_password(&config.clickhouse_password)
        .with_database(&config.clickhouse_db)
}

/// A client with no default database, for DDL that must run before the
/// database exists.
pub fn create_bootstrap_client(config: &Config) -> Client {
    Client::default()
        .with_url(&config.clickhouse_url)
        .with_user(&config.clickhouse_user)
        .with_password(&config.clickhouse_password)
}
