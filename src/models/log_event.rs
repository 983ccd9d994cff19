use chrono::{DateTime, Utc};
use clickhouse::Row;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::utils::sanitize::sanitize_to_string;

/// Severity of an admin action, stored as Enum8 in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize_repr, Deserialize_repr)]
#[repr(i8)]
pub enum LogLevel {
    #[default]
    Info = 1,
    Warn = 2,
    Error = 3,
}

/// One completed HTTP request/response cycle, built by the capture
/// middleware. Body and query fields are still structured JSON here;
/// sanitization happens when the event is turned into a row.
#[derive(Debug, Clone)]
pub struct HttpRequestEvent {
    pub timestamp: DateTime<Utc>,
    pub method: String,
    pub path: String,
    pub status: u16,
    pub duration_ms: u32,
    pub ip: String,
    pub user_id: Option<String>,
    pub request_id: String,
    pub request_body: Option<Value>,
    pub response_body: Option<Value>,
    pub query_params: Option<Value>,
}

/// An explicit audit record written by business logic at mutation points,
/// not derived from HTTP traffic.
#[derive(Debug, Clone)]
pub struct AdminActionEvent {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub action: String,
    pub user_id: String,
    pub target_id: Option<String>,
    pub metadata: Value,
}

/// An error that reached the top-level boundary. Written in addition to,
/// never instead of, the HttpRequestEvent for the same request.
#[derive(Debug, Clone)]
pub struct ErrorEvent {
    pub timestamp: DateTime<Utc>,
    pub error_type: String,
    pub message: String,
    pub stack_trace: String,
    pub ip: String,
    pub request_id: Option<String>,
    pub user_id: Option<String>,
    pub http_path: Option<String>,
    pub http_method: Option<String>,
    pub http_status: Option<u16>,
    pub request_body: Option<Value>,
    pub response_body: Option<Value>,
    pub metadata: Value,
}

#[derive(Debug, Clone, Row, Serialize, Deserialize)]
pub struct HttpRequestRow {
    #[serde(with = "clickhouse::serde::chrono::datetime")]
    pub timestamp: DateTime<Utc>,
    pub method: String,
    pub path: String,
    pub status: u16,
    pub duration_ms: u32,
    pub ip: String,
    pub user_id: Option<String>,
    pub request_id: String,
    pub request_body: Option<String>,
    pub response_body: Option<String>,
    pub query_params: Option<String>,
}

#[derive(Debug, Clone, Row, Serialize, Deserialize)]
pub struct AdminActionRow {
    #[serde(with = "clickhouse::serde::chrono::datetime")]
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub action: String,
    pub user_id: String,
    pub target_id: Option<String>,
    pub metadata: String,
}

#[derive(Debug, Clone, Row, Serialize, Deserialize)]
pub struct ErrorRow {
    #[serde(with = "clickhouse::serde::chrono::datetime")]
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

impl From<HttpRequestEvent> for HttpRequestRow {
    fn from(event: HttpRequestEvent) -> Self {
        Self {
            timestamp: event.timestamp,
            method: event.method,
            path: event.path,
            status: event.status,
            duration_ms: event.duration_ms,
            ip: event.ip,
            user_id: event.user_id,
            request_id: event.request_id,
            request_body: event.request_body.as_ref().map(sanitize_to_string),
            response_body: event.response_body.as_ref().map(sanitize_to_string),
            query_params: event.query_params.as_ref().map(sanitize_to_string),
        }
    }
}

impl From<AdminActionEvent> for AdminActionRow {
    fn from(event: AdminActionEvent) -> Self {
        Self {
            timestamp: event.timestamp,
            level: event.level,
            action: event.action,
            user_id: event.user_id,
            target_id: event.target_id,
            metadata: sanitize_to_string(&event.metadata),
        }
    }
}

impl From<ErrorEvent> for ErrorRow {
    fn from(event: ErrorEvent) -> Self {
        Self {
            timestamp: event.timestamp,
            error_type: event.error_type,
            message: event.message,
            stack_trace: event.stack_trace,
            ip: event.ip,
            request_id: event.request_id,
            user_id: event.user_id,
            http_path: event.http_path,
            http_method: event.http_method,
            http_status: event.http_status,
            request_body: event.request_body.as_ref().map(sanitize_to_string),
            response_body: event.response_body.as_ref().map(sanitize_to_string),
            metadata: sanitize_to_string(&event.metadata),
        }
    }
}
