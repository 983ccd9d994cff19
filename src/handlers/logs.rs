use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::{
    error::AppError,
    models::log_event::ErrorRow,
    repositories::metrics::{
        ActivityFilters, AdminActionSummaryRow, ErrorSummaryRow, HttpRequestListRow,
        LogsRepository, PopularEndpointRow, RequestsOverTimeRow, TimeRange,
    },
    state::AppState,
};

const DEFAULT_RANGE: TimeRange = TimeRange::D7;
const DEFAULT_PAGE: u64 = 1;
const DEFAULT_PAGE_SIZE: u64 = 10;
const MAX_PAGE_SIZE: u64 = 100;
const MAX_PAGE: u64 = 10_000;

/// Dashboard read surface. Authentication is layered on by the embedding
/// application; everything here is read-only.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/logs/requests", get(requests_over_time))
        .route("/logs/admin-actions", get(admin_action_summary))
        .route("/logs/errors", get(error_summary))
        .route("/logs/errors-page", get(errors_page))
        .route("/logs/endpoints", get(popular_endpoints))
        .route("/logs/http-requests", get(http_requests_page))
        .route("/logs/users/{id}/activity-logs", get(user_activity_logs))
        .route(
            "/logs/users/{id}/activity-logs/actions",
            get(user_available_actions),
        )
}

fn repository(state: &AppState) -> LogsRepository {
    LogsRepository::new(
        state.clickhouse.clone(),
        Duration::from_secs(state.config.query_timeout_secs),
    )
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct RangeQuery {
    pub range: Option<String>,
}

impl RangeQuery {
    fn parse(&self) -> Result<TimeRange, AppError> {
        match self.range.as_deref() {
            None => Ok(DEFAULT_RANGE),
            Some(raw) => raw.parse().map_err(AppError::BadRequest),
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct PageQuery {
    pub page: Option<u64>,
    pub page_size: Option<u64>,
}

impl PageQuery {
    fn clamp(&self) -> (u64, u64) {
        let page = self.page.unwrap_or(DEFAULT_PAGE).clamp(1, MAX_PAGE);
        let page_size = self
            .page_size
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        (page, page_size)
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Pagination {
    pub total: u64,
    pub page: u64,
    #[serde(rename = "pageSize")]
    pub page_size: u64,
    #[serde(rename = "totalPages")]
    pub total_pages: u64,
}

impl Pagination {
    fn new(total: u64, page: u64, page_size: u64) -> Self {
        Self {
            total,
            page,
            page_size,
            total_pages: total.div_ceil(page_size),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RequestsOverTimePoint {
    pub time: DateTime<Utc>,
    pub total_requests: u64,
    pub error_requests: u64,
    pub avg_duration: f64,
}

impl From<RequestsOverTimeRow> for RequestsOverTimePoint {
    fn from(row: RequestsOverTimeRow) -> Self {
        Self {
            time: row.time,
            total_requests: row.total_requests,
            error_requests: row.error_requests,
            avg_duration: row.avg_duration,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AdminActionSummary {
    pub action: String,
    pub count: u64,
    pub unique_users: u64,
}

impl From<AdminActionSummaryRow> for AdminActionSummary {
    fn from(row: AdminActionSummaryRow) -> Self {
        Self {
            action: row.action,
            count: row.count,
            unique_users: row.unique_users,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorSummary {
    #[serde(rename = "type")]
    pub error_type: String,
    pub count: u64,
    pub last_message: String,
}

impl From<ErrorSummaryRow> for ErrorSummary {
    fn from(row: ErrorSummaryRow) -> Self {
        Self {
            error_type: row.error_type,
            count: row.count,
            last_message: row.last_message,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PopularEndpoint {
    pub path: String,
    pub method: String,
    pub requests: u64,
    pub avg_duration: f64,
    pub errors: u64,
}

impl From<PopularEndpointRow> for PopularEndpoint {
    fn from(row: PopularEndpointRow) -> Self {
        Self {
            path: row.path,
            method: row.method,
            requests: row.requests,
            avg_duration: row.avg_duration,
            errors: row.errors,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HttpRequestLogItem {
    pub timestamp: DateTime<Utc>,
    pub method: String,
    pub path: String,
    pub status: u16,
    pub duration_ms: u32,
    pub ip: String,
    pub user_id: Option<String>,
    pub request_id: String,
}

impl From<HttpRequestListRow> for HttpRequestLogItem {
    fn from(row: HttpRequestListRow) -> Self {
        Self {
            timestamp: row.timestamp,
            method: row.method,
            path: row.path,
            status: row.status,
            duration_ms: row.duration_ms,
            ip: row.ip,
            user_id: row.user_id,
            request_id: row.request_id,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorLogItem {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
    pub stack_trace: String,
    pub ip: String,
    pub request_id: Option<String>,
    pub user_id: Option<String>,
    pub http_path: Option<String>,
    pub http_method: Option<String>,
    pub http_status: Option<u16>,
    pub request_body: Option<String>,
    pub response_body: Option<String>,
    pub metadata: String,
}

impl From<ErrorRow> for ErrorLogItem {
    fn from(row: ErrorRow) -> Self {
        Self {
            timestamp: row.timestamp,
            error_type: row.error_type,
            message: row.message,
            stack_trace: row.stack_trace,
            ip: row.ip,
            request_id: row.request_id,
            user_id: row.user_id,
            http_path: row.http_path,
            http_method: row.http_method,
            http_status: row.http_status,
            request_body: row.request_body,
            response_body: row.response_body,
            metadata: row.metadata,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HttpRequestsPageResponse {
    pub data: Vec<HttpRequestLogItem>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorsPageResponse {
    pub data: Vec<ErrorLogItem>,
    pub pagination: Pagination,
}

pub async fn requests_over_time(
    State(state): State<AppState>,
    Query(query): Query<RangeQuery>,
) -> Result<Json<Vec<RequestsOverTimePoint>>, AppError> {
    let range = query.parse()?;
    let rows = repository(&state).requests_over_time(range).await?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

pub async fn admin_action_summary(
    State(state): State<AppState>,
) -> Result<Json<Vec<AdminActionSummary>>, AppError> {
    let rows = repository(&state).admin_action_summary().await?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

pub async fn error_summary(
    State(state): State<AppState>,
    Query(query): Query<RangeQuery>,
) -> Result<Json<Vec<ErrorSummary>>, AppError> {
    let range = query.parse()?;
    let rows = repository(&state).error_summary(range).await?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

pub async fn popular_endpoints(
    State(state): State<AppState>,
    Query(query): Query<RangeQuery>,
) -> Result<Json<Vec<PopularEndpoint>>, AppError> {
    let range = query.parse()?;
    let rows = repository(&state).popular_endpoints(range).await?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

pub async fn http_requests_page(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<HttpRequestsPageResponse>, AppError> {
    let (page, page_size) = query.clamp();
    let (rows, total) = repository(&state).http_requests_page(page, page_size).await?;
    Ok(Json(HttpRequestsPageResponse {
        data: rows.into_iter().map(Into::into).collect(),
        pagination: Pagination::new(total, page, page_size),
    }))
}

pub async fn errors_page(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<ErrorsPageResponse>, AppError> {
    let (page, page_size) = query.clamp();
    let (rows, total) = repository(&state).errors_page(page, page_size).await?;
    Ok(Json(ErrorsPageResponse {
        data: rows.into_iter().map(Into::into).collect(),
        pagination: Pagination::new(total, page, page_size),
    }))
}

#[derive(Debug, Deserialize, IntoParams, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ActivityLogQuery {
    pub page: Option<u64>,
    pub page_size: Option<u64>,
    /// HTTP method filter ("action" in the dashboard UI).
    #[validate(length(max = 16))]
    pub action: Option<String>,
    /// Path substring filter.
    #[validate(length(max = 200))]
    pub endpoint: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
}

pub async fn user_activity_logs(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<ActivityLogQuery>,
) -> Result<Json<HttpRequestsPageResponse>, AppError> {
    query.validate()?;
    if user_id.trim().is_empty() {
        return Err(AppError::BadRequest("user id must not be empty".into()));
    }

    let page = query.page.unwrap_or(DEFAULT_PAGE).clamp(1, MAX_PAGE);
    let page_size = query
        .page_size
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);

    let filters = ActivityFilters {
        method: query.action.clone(),
        endpoint: query.endpoint.clone(),
        from: query
            .date_from
            .as_deref()
            .map(|raw| parse_date_bound(raw, false))
            .transpose()?,
        to: query
            .date_to
            .as_deref()
            .map(|raw| parse_date_bound(raw, true))
            .transpose()?,
    };

    let (rows, total) = repository(&state)
        .user_activity_page(&user_id, page, page_size, &filters)
        .await?;
    Ok(Json(HttpRequestsPageResponse {
        data: rows.into_iter().map(Into::into).collect(),
        pagination: Pagination::new(total, page, page_size),
    }))
}

pub async fn user_available_actions(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<String>>, AppError> {
    if user_id.trim().is_empty() {
        return Err(AppError::BadRequest("user id must not be empty".into()));
    }
    let actions = repository(&state).user_available_actions(&user_id).await?;
    Ok(Json(actions))
}

/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS`, or a bare date. A bare date
/// used as an upper bound means the end of that day; both bounds are
/// inclusive.
fn parse_date_bound(raw: &str, upper: bool) -> Result<DateTime<Utc>, AppError> {
    if let Ok(value) = DateTime::parse_from_rfc3339(raw) {
        return Ok(value.with_timezone(&Utc));
    }
    if let Ok(value) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Ok(Utc.from_utc_datetime(&value));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        let time = if upper {
            date.and_hms_opt(23, 59, 59)
        } else {
            date.and_hms_opt(0, 0, 0)
        };
        if let Some(value) = time {
            return Ok(Utc.from_utc_datetime(&value));
        }
    }
    Err(AppError::BadRequest(format!(
        "invalid date value: {raw} (expected RFC 3339 or YYYY-MM-DD)"
    )))
}
