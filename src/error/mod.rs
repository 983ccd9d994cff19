use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};

/// Attached to error responses so the capture middleware can record an
/// ErrorEvent with the same request id and rewrite the client envelope.
#[derive(Debug, Clone)]
pub struct ErrorDetails {
    pub error_type: String,
    pub message: String,
    pub stack_trace: String,
    pub status: u16,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub message: String,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    BadRequest(String),
    Validation(Vec<String>),
    InternalServerError(anyhow::Error),
}

impl AppError {
    fn type_name(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "NotFound",
            AppError::BadRequest(_) => "BadRequest",
            AppError::Validation(_) => "Validation",
            AppError::InternalServerError(_) => "InternalServerError",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let error_type = self.type_name().to_string();
        let (status, message, stack_trace, details) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone(), msg, None),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone(), msg, None),
            AppError::Validation(errors) => {
                let joined = errors.join("; ");
                (
                    StatusCode::BAD_REQUEST,
                    "Validation failed".to_string(),
                    joined,
                    Some(json!({ "errors": errors })),
                )
            }
            AppError::InternalServerError(err) => {
                tracing::error!("Internal server error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    format!("{err:?}"),
                    None,
                )
            }
        };

        let body = Json(ErrorResponse {
            status_code: status.as_u16(),
            message: message.clone(),
            timestamp: Utc::now().to_rfc3339(),
            details,
        });

        let mut response = (status, body).into_response();
        response.extensions_mut().insert(ErrorDetails {
            error_type,
            message,
            stack_trace,
            status: status.as_u16(),
        });
        response
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalServerError(err)
    }
}

impl From<clickhouse::error::Error> for AppError {
    fn from(err: clickhouse::error::Error) -> Self {
        AppError::InternalServerError(err.into())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let messages: Vec<String> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| {
                    let code = e.code.as_ref();
                    format!("{}: {}", field, code)
                })
            })
            .collect();
        AppError::Validation(messages)
    }
}
