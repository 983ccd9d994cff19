use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use clickhouse::query::Query;
use clickhouse::{Client, Row};
use serde::{Deserialize, Serialize};

use crate::models::log_event::ErrorRow;
use crate::repositories::allowlist;

/// Dashboard time window. The window and its aggregation granularity are
/// the only tokens ever interpolated into query text; both come from this
/// enum, never from raw user input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeRange {
    H3,
    H24,
    D7,
    D30,
}

impl TimeRange {
    /// Window size as a ClickHouse INTERVAL token.
    pub fn window_token(&self) -> &'static str {
        match self {
            TimeRange::H3 => "3 HOUR",
            TimeRange::H24 => "24 HOUR",
            TimeRange::D7 => "7 DAY",
            TimeRange::D30 => "30 DAY",
        }
    }

    /// Bucket width used by `toStartOfInterval`. Tuning knob: 15-minute
    /// buckets for 3h, hourly for 24h, daily beyond.
    pub fn bucket_token(&self) -> &'static str {
        match self {
            TimeRange::H3 => "15 MINUTE",
            TimeRange::H24 => "1 HOUR",
            TimeRange::D7 | TimeRange::D30 => "1 DAY",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeRange::H3 => "3h",
            TimeRange::H24 => "24h",
            TimeRange::D7 => "7d",
            TimeRange::D30 => "30d",
        }
    }
}

impl FromStr for TimeRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "3h" => Ok(TimeRange::H3),
            "24h" => Ok(TimeRange::H24),
            "7d" => Ok(TimeRange::D7),
            "30d" => Ok(TimeRange::D30),
            other => Err(format!(
                "invalid range '{other}', expected one of 3h, 24h, 7d, 30d"
            )),
        }
    }
}

#[derive(Debug, Clone, Row, Serialize, Deserialize)]
pub struct RequestsOverTimeRow {
    #[serde(with = "clickhouse::serde::chrono::datetime")]
    pub time: DateTime<Utc>,
    pub total_requests: u64,
    pub error_requests: u64,
    pub avg_duration: f64,
}

#[derive(Debug, Clone, Row, Serialize, Deserialize)]
pub struct AdminActionSummaryRow {
    pub action: String,
    pub count: u64,
    pub unique_users: u64,
}

#[derive(Debug, Clone, Row, Serialize, Deserialize)]
pub struct ErrorSummaryRow {
    #[serde(rename = "type")]
    pub error_type: String,
    pub count: u64,
    pub last_message: String,
}

#[derive(Debug, Clone, Row, Serialize, Deserialize)]
pub struct PopularEndpointRow {
    pub path: String,
    pub method: String,
    pub requests: u64,
    pub avg_duration: f64,
    pub errors: u64,
}

/// Listing row without the body columns; raw payloads stay out of the
/// dashboard tables view.
#[derive(Debug, Clone, Row, Serialize, Deserialize)]
pub struct HttpRequestListRow {
    #[serde(with = "clickhouse::serde::chrono::datetime")]
    pub timestamp: DateTime<Utc>,
    pub method: String,
    pub path: String,
    pub status: u16,
    pub duration_ms: u32,
    pub ip: String,
    pub user_id: Option<String>,
    pub request_id: String,
}

const HTTP_REQUEST_LIST_COLUMNS: &str =
    "timestamp, method, path, status, duration_ms, ip, user_id, request_id";

const ERROR_COLUMNS: &str = "timestamp, type, message, stack_trace, ip, request_id, user_id, \
     http_path, http_method, http_status, request_body, response_body, metadata";

/// Optional narrowing filters for the per-user activity listing. Bounds
/// are inclusive.
#[derive(Debug, Clone, Default)]
pub struct ActivityFilters {
    pub method: Option<String>,
    pub endpoint: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// Values bound into `?` placeholders, kept as an enum so clause builders
/// stay testable without a client.
#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    Str(String),
    I64(i64),
}

fn apply_binds(mut query: Query, binds: &[BindValue]) -> Query {
    for bind in binds {
        query = match bind {
            BindValue::Str(v) => query.bind(v.as_str()),
            BindValue::I64(v) => query.bind(*v),
        };
    }
    query
}

/// Read-only aggregate and paginated queries over the three log tables.
/// Query failures propagate to the caller; these are side-effect-free read
/// paths and a broken dashboard query should be visible, not silently
/// empty.
#[derive(Clone)]
pub struct LogsRepository {
    client: Client,
    query_timeout: Duration,
}

impl LogsRepository {
    pub fn new(client: Client, query_timeout: Duration) -> Self {
        Self {
            client,
            query_timeout,
        }
    }

    /// One row per time bucket in the window: total requests, error count
    /// left-joined from the errors table (0 when absent), average
    /// duration. Buckets with no traffic at all are omitted.
    pub async fn requests_over_time(
        &self,
        range: TimeRange,
    ) -> anyhow::Result<Vec<RequestsOverTimeRow>> {
        let bucket = range.bucket_token();
        let window = range.window_token();
        let sql = format!(
            "WITH requests_stats AS (\
               SELECT toStartOfInterval(timestamp, INTERVAL {bucket}) AS time, \
                      count() AS total_requests, \
                      avg(duration_ms) AS avg_duration \
               FROM http_requests \
               WHERE timestamp >= now() - INTERVAL {window} \
               GROUP BY time\
             ), \
             errors_stats AS (\
               SELECT toStartOfInterval(timestamp, INTERVAL {bucket}) AS time, \
                      count() AS error_requests \
               FROM errors \
               WHERE timestamp >= now() - INTERVAL {window} \
               GROUP BY time\
             ) \
             SELECT r.time, \
                    r.total_requests, \
                    if(e.error_requests > 0, e.error_requests, 0) AS error_requests, \
                    r.avg_duration \
             FROM requests_stats r \
             LEFT JOIN errors_stats e ON r.time = e.time \
             ORDER BY r.time ASC"
        );

        self.run(self.client.query(&sql).fetch_all()).await
    }

    /// Top 10 actions of the last 7 days with distinct actor counts.
    pub async fn admin_action_summary(&self) -> anyhow::Result<Vec<AdminActionSummaryRow>> {
        let sql = "SELECT action, count() AS count, uniq(user_id) AS unique_users \
             FROM admin_actions \
             WHERE timestamp >= now() - INTERVAL 7 DAY \
             GROUP BY action \
             ORDER BY count DESC \
             LIMIT 10";

        self.run(self.client.query(sql).fetch_all()).await
    }

    /// Top 10 error types in the window; `last_message` is the message of
    /// the most recent occurrence.
    pub async fn error_summary(&self, range: TimeRange) -> anyhow::Result<Vec<ErrorSummaryRow>> {
        let window = range.window_token();
        let sql = format!(
            "SELECT type, count() AS count, argMax(message, timestamp) AS last_message \
             FROM errors \
             WHERE timestamp >= now() - INTERVAL {window} \
             GROUP BY type \
             ORDER BY count DESC \
             LIMIT 10"
        );

        self.run(self.client.query(&sql).fetch_all()).await
    }

    /// Per (path, method) request counts with error counts left-joined
    /// from the errors table on (http_path, http_method).
    pub async fn popular_endpoints(
        &self,
        range: TimeRange,
    ) -> anyhow::Result<Vec<PopularEndpointRow>> {
        let window = range.window_token();
        let sql = format!(
            "WITH request_stats AS (\
               SELECT path, method, count() AS requests, avg(duration_ms) AS avg_duration \
               FROM http_requests \
               WHERE timestamp >= now() - INTERVAL {window} \
               GROUP BY path, method\
             ), \
             error_stats AS (\
               SELECT assumeNotNull(http_path) AS path, \
                      assumeNotNull(http_method) AS method, \
                      count() AS errors \
               FROM errors \
               WHERE timestamp >= now() - INTERVAL {window} \
                 AND http_path IS NOT NULL AND http_method IS NOT NULL \
               GROUP BY path, method\
             ) \
             SELECT r.path, r.method, r.requests, r.avg_duration, \
                    if(e.errors > 0, e.errors, 0) AS errors \
             FROM request_stats r \
             LEFT JOIN error_stats e ON r.path = e.path AND r.method = e.method \
             ORDER BY r.requests DESC"
        );

        self.run(self.client.query(&sql).fetch_all()).await
    }

    /// Newest-first page of raw request rows plus the total count; the two
    /// queries run concurrently.
    pub async fn http_requests_page(
        &self,
        page: u64,
        page_size: u64,
    ) -> anyhow::Result<(Vec<HttpRequestListRow>, u64)> {
        let offset = (page - 1) * page_size;
        let page_sql = format!(
            "SELECT {HTTP_REQUEST_LIST_COLUMNS} FROM http_requests \
             ORDER BY timestamp DESC \
             LIMIT ? OFFSET ?"
        );
        let count_sql = "SELECT count() FROM http_requests";

        let rows = self
            .client
            .query(&page_sql)
            .bind(page_size)
            .bind(offset)
            .fetch_all();
        let total = self.client.query(count_sql).fetch_one::<u64>();

        self.run_pair(rows, total).await
    }

    /// Newest-first page of raw error rows plus the total count.
    pub async fn errors_page(
        &self,
        page: u64,
        page_size: u64,
    ) -> anyhow::Result<(Vec<ErrorRow>, u64)> {
        let offset = (page - 1) * page_size;
        let page_sql = format!(
            "SELECT {ERROR_COLUMNS} FROM errors \
             ORDER BY timestamp DESC \
             LIMIT ? OFFSET ?"
        );
        let count_sql = "SELECT count() FROM errors";

        let rows = self
            .client
            .query(&page_sql)
            .bind(page_size)
            .bind(offset)
            .fetch_all();
        let total = self.client.query(count_sql).fetch_one::<u64>();

        self.run_pair(rows, total).await
    }

    /// Page of one user's requests against allow-listed endpoints only.
    /// Rows outside the allow-list never show up here even though they
    /// exist in http_requests.
    pub async fn user_activity_page(
        &self,
        user_id: &str,
        page: u64,
        page_size: u64,
        filters: &ActivityFilters,
    ) -> anyhow::Result<(Vec<HttpRequestListRow>, u64)> {
        let (where_clause, binds) = activity_where_clause(user_id, filters);
        let offset = (page - 1) * page_size;

        let page_sql = format!(
            "SELECT {HTTP_REQUEST_LIST_COLUMNS} FROM http_requests \
             WHERE {where_clause} \
             ORDER BY timestamp DESC \
             LIMIT ? OFFSET ?"
        );
        let count_sql = format!("SELECT count() FROM http_requests WHERE {where_clause}");

        let rows = apply_binds(self.client.query(&page_sql), &binds)
            .bind(page_size)
            .bind(offset)
            .fetch_all();
        let total = apply_binds(self.client.query(&count_sql), &binds).fetch_one::<u64>();

        self.run_pair(rows, total).await
    }

    /// Distinct methods the user has actually invoked among allow-listed
    /// endpoints, for populating the activity filter UI.
    pub async fn user_available_actions(&self, user_id: &str) -> anyhow::Result<Vec<String>> {
        let (allow_clause, allow_binds) = allowlist::sql_predicate();
        let sql = format!(
            "SELECT DISTINCT method FROM http_requests \
             WHERE user_id = ? AND {allow_clause} \
             ORDER BY method ASC"
        );

        let mut query = self.client.query(&sql).bind(user_id);
        for value in &allow_binds {
            query = query.bind(value.as_str());
        }
        self.run(query.fetch_all()).await
    }

    async fn run<T>(
        &self,
        fut: impl std::future::Future<Output = clickhouse::error::Result<T>>,
    ) -> anyhow::Result<T> {
        match tokio::time::timeout(self.query_timeout, fut).await {
            Ok(result) => result.map_err(Into::into),
            Err(_) => Err(anyhow::anyhow!(
                "log query exceeded {}s deadline",
                self.query_timeout.as_secs()
            )),
        }
    }

    async fn run_pair<A, B>(
        &self,
        a: impl std::future::Future<Output = clickhouse::error::Result<A>>,
        b: impl std::future::Future<Output = clickhouse::error::Result<B>>,
    ) -> anyhow::Result<(A, B)> {
        match tokio::time::timeout(self.query_timeout, async {
            tokio::try_join!(a, b)
        })
        .await
        {
            Ok(result) => result.map_err(Into::into),
            Err(_) => Err(anyhow::anyhow!(
                "log query exceeded {}s deadline",
                self.query_timeout.as_secs()
            )),
        }
    }
}

/// WHERE clause for activity queries. Every user-supplied value becomes a
/// `?` placeholder; the allow-list contributes its own parameterized
/// predicate.
fn activity_where_clause(user_id: &str, filters: &ActivityFilters) -> (String, Vec<BindValue>) {
    let (allow_clause, allow_values) = allowlist::sql_predicate();

    let mut clause = format!("user_id = ? AND {allow_clause}");
    let mut binds = vec![BindValue::Str(user_id.to_string())];
    binds.extend(allow_values.into_iter().map(BindValue::Str));

    if let Some(method) = filters.method.as_ref() {
        clause.push_str(" AND method = ?");
        binds.push(BindValue::Str(method.clone()));
    }
    if let Some(endpoint) = filters.endpoint.as_ref() {
        clause.push_str(" AND positionCaseInsensitive(path, ?) > 0");
        binds.push(BindValue::Str(endpoint.clone()));
    }
    if let Some(from) = filters.from.as_ref() {
        clause.push_str(" AND timestamp >= toDateTime(?)");
        binds.push(BindValue::I64(from.timestamp()));
    }
    if let Some(to) = filters.to.as_ref() {
        clause.push_str(" AND timestamp <= toDateTime(?)");
        binds.push(BindValue::I64(to.timestamp()));
    }

    (clause, binds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn time_range_parses_known_tokens() {
        assert_eq!("3h".parse::<TimeRange>().unwrap(), TimeRange::H3);
        assert_eq!("24h".parse::<TimeRange>().unwrap(), TimeRange::H24);
        assert_eq!("7d".parse::<TimeRange>().unwrap(), TimeRange::D7);
        assert_eq!("30d".parse::<TimeRange>().unwrap(), TimeRange::D30);
        assert!("1y".parse::<TimeRange>().is_err());
        assert!("24H".parse::<TimeRange>().is_err());
    }

    #[test]
    fn granularity_follows_the_range() {
        assert_eq!(TimeRange::H3.bucket_token(), "15 MINUTE");
        assert_eq!(TimeRange::H24.bucket_token(), "1 HOUR");
        assert_eq!(TimeRange::D7.bucket_token(), "1 DAY");
        assert_eq!(TimeRange::D30.bucket_token(), "1 DAY");
    }

    #[test]
    fn window_tokens_match_ranges() {
        assert_eq!(TimeRange::H3.window_token(), "3 HOUR");
        assert_eq!(TimeRange::D30.window_token(), "30 DAY");
    }

    #[test]
    fn activity_clause_binds_every_placeholder() {
        let filters = ActivityFilters {
            method: Some("POST".to_string()),
            endpoint: Some("staff".to_string()),
            from: Some(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()),
            to: Some(Utc.with_ymd_and_hms(2025, 1, 31, 23, 59, 59).unwrap()),
        };
        let (clause, binds) = activity_where_clause("u1", &filters);
        assert_eq!(clause.matches('?').count(), binds.len());
        assert!(clause.starts_with("user_id = ? AND "));
        assert!(clause.contains("method = ?"));
        assert!(clause.contains("positionCaseInsensitive(path, ?) > 0"));
        assert!(clause.contains("timestamp >= toDateTime(?)"));
        assert!(clause.contains("timestamp <= toDateTime(?)"));
        assert_eq!(binds[0], BindValue::Str("u1".to_string()));
    }

    #[test]
    fn activity_clause_without_filters_only_has_allowlist() {
        let (clause, binds) = activity_where_clause("u1", &ActivityFilters::default());
        assert_eq!(clause.matches('?').count(), binds.len());
        assert!(!clause.contains("method = ?"));
        assert!(!clause.contains("toDateTime"));
    }

    #[test]
    fn date_bounds_bind_as_epoch_seconds() {
        let from = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let filters = ActivityFilters {
            from: Some(from),
            ..Default::default()
        };
        let (_, binds) = activity_where_clause("u1", &filters);
        assert!(binds.contains(&BindValue::I64(from.timestamp())));
    }
}
