#![allow(dead_code)] // OpenAPI doc stubs are only referenced by utoipa macros.

use crate::handlers::{
    health::HealthResponse,
    logs::{
        ActivityLogQuery, AdminActionSummary, ErrorLogItem, ErrorSummary, ErrorsPageResponse,
        HttpRequestLogItem, HttpRequestsPageResponse, PageQuery, Pagination, PopularEndpoint,
        RangeQuery, RequestsOverTimePoint,
    },
};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        requests_over_time_doc,
        admin_actions_doc,
        error_summary_doc,
        errors_page_doc,
        popular_endpoints_doc,
        http_requests_page_doc,
        user_activity_logs_doc,
        user_available_actions_doc,
        health_doc
    ),
    components(
        schemas(
            RequestsOverTimePoint,
            AdminActionSummary,
            ErrorSummary,
            ErrorLogItem,
            ErrorsPageResponse,
            PopularEndpoint,
            HttpRequestLogItem,
            HttpRequestsPageResponse,
            Pagination,
            HealthResponse
        )
    ),
    tags(
        (name = "Logs", description = "Dashboard queries over request, admin-action and error logs"),
        (name = "System", description = "Service health")
    )
)]
pub struct ApiDoc;

#[utoipa::path(
    get,
    path = "/logs/requests",
    params(RangeQuery),
    responses(
        (status = 200, description = "Requests per time bucket", body = Vec<RequestsOverTimePoint>),
        (status = 400, description = "Unknown range token")
    ),
    tag = "Logs"
)]
fn requests_over_time_doc() {}

#[utoipa::path(
    get,
    path = "/logs/admin-actions",
    responses((status = 200, description = "Top actions of the last 7 days", body = Vec<AdminActionSummary>)),
    tag = "Logs"
)]
fn admin_actions_doc() {}

#[utoipa::path(
    get,
    path = "/logs/errors",
    params(RangeQuery),
    responses((status = 200, description = "Top error types in range", body = Vec<ErrorSummary>)),
    tag = "Logs"
)]
fn error_summary_doc() {}

#[utoipa::path(
    get,
    path = "/logs/errors-page",
    params(PageQuery),
    responses((status = 200, description = "Paginated error rows", body = ErrorsPageResponse)),
    tag = "Logs"
)]
fn errors_page_doc() {}

#[utoipa::path(
    get,
    path = "/logs/endpoints",
    params(RangeQuery),
    responses((status = 200, description = "Endpoints by traffic", body = Vec<PopularEndpoint>)),
    tag = "Logs"
)]
fn popular_endpoints_doc() {}

#[utoipa::path(
    get,
    path = "/logs/http-requests",
    params(PageQuery),
    responses((status = 200, description = "Paginated request rows", body = HttpRequestsPageResponse)),
    tag = "Logs"
)]
fn http_requests_page_doc() {}

#[utoipa::path(
    get,
    path = "/logs/users/{id}/activity-logs",
    params(
        ("id" = String, Path, description = "User id"),
        ActivityLogQuery
    ),
    responses((status = 200, description = "Allow-listed activity for the user", body = HttpRequestsPageResponse)),
    tag = "Logs"
)]
fn user_activity_logs_doc() {}

#[utoipa::path(
    get,
    path = "/logs/users/{id}/activity-logs/actions",
    params(("id" = String, Path, description = "User id")),
    responses((status = 200, description = "Methods the user has used on allow-listed endpoints", body = Vec<String>)),
    tag = "Logs"
)]
fn user_available_actions_doc() {}

#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, body = HealthResponse)),
    tag = "System"
)]
fn health_doc() {}
