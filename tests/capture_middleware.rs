use axum::{
    body::Body,
    http::{Request, StatusCode},
    middleware as axum_middleware,
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use oplog_backend::{
    error::AppError,
    middleware::{capture, request_id, CurrentUser},
    services::recorder::LogEventRow,
    state::AppState,
};

#[path = "support/mod.rs"]
mod support;

fn app(state: AppState) -> Router {
    Router::new()
        .route(
            "/staff",
            post(|| async { Json(json!({ "id": "staff-1" })) }),
        )
        .route("/staff", get(|| async { Json(json!([])) }))
        .route(
            "/staff/missing",
            get(|| async {
                Err::<Json<Value>, AppError>(AppError::NotFound("staff member not found".to_string()))
            }),
        )
        .layer(axum_middleware::from_fn_with_state(state.clone(), capture))
        .layer(axum_middleware::from_fn(request_id))
        .with_state(state)
}

async fn response_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("json body")
}

#[tokio::test]
async fn post_request_records_one_sanitized_event() {
    let (state, recorder) = support::test_state(support::test_config());

    let response = app(state)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/staff?notify=1")
                .header("content-type", "application/json")
                .header("x-forwarded-for", "203.0.113.9")
                .header("x-request-id", "req-abc")
                .body(Body::from(r#"{"name":"Ada","password":"hunter2"}"#))
                .expect("build request"),
        )
        .await
        .expect("call app");
    assert_eq!(response.status(), StatusCode::OK);

    let rows = recorder.drain_pending();
    assert_eq!(rows.len(), 1);
    let LogEventRow::HttpRequest(row) = &rows[0] else {
        panic!("expected http request row, got {rows:?}");
    };
    assert_eq!(row.method, "POST");
    assert_eq!(row.path, "/staff");
    assert_eq!(row.status, 200);
    assert_eq!(row.ip, "203.0.113.9");
    assert_eq!(row.request_id, "req-abc");

    let body: Value = serde_json::from_str(row.request_body.as_deref().unwrap()).unwrap();
    assert_eq!(body["name"], "Ada");
    assert_eq!(body["password"], "*****");
    assert!(!row.request_body.as_deref().unwrap().contains("hunter2"));

    let query: Value = serde_json::from_str(row.query_params.as_deref().unwrap()).unwrap();
    assert_eq!(query["notify"], "1");
}

#[tokio::test]
async fn get_request_bodies_are_not_captured() {
    let (state, recorder) = support::test_state(support::test_config());

    let response = app(state)
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/staff")
                .body(Body::empty())
                .expect("build request"),
        )
        .await
        .expect("call app");
    assert_eq!(response.status(), StatusCode::OK);

    let rows = recorder.drain_pending();
    assert_eq!(rows.len(), 1);
    let LogEventRow::HttpRequest(row) = &rows[0] else {
        panic!("expected http request row");
    };
    assert!(row.request_body.is_none());
    assert!(row.response_body.is_none());
}

#[tokio::test]
async fn get_bodies_captured_when_enabled() {
    let mut config = support::test_config();
    config.capture_get_bodies = true;
    let (state, recorder) = support::test_state(config);

    let response = app(state)
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/staff")
                .body(Body::empty())
                .expect("build request"),
        )
        .await
        .expect("call app");
    assert_eq!(response.status(), StatusCode::OK);

    let rows = recorder.drain_pending();
    let LogEventRow::HttpRequest(row) = &rows[0] else {
        panic!("expected http request row");
    };
    // Empty request body still logs as absent; the JSON response is kept.
    assert!(row.request_body.is_none());
    assert_eq!(row.response_body.as_deref(), Some("[]"));
}

#[tokio::test]
async fn handler_error_produces_envelope_and_paired_events() {
    let (state, recorder) = support::test_state(support::test_config());

    let response = app(state)
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/staff/missing")
                .header("x-request-id", "req-err")
                .body(Body::empty())
                .expect("build request"),
        )
        .await
        .expect("call app");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body = response_json(response).await;
    assert_eq!(body["statusCode"], 404);
    assert_eq!(body["message"], "staff member not found");
    assert_eq!(body["path"], "/staff/missing");
    assert!(body["timestamp"].is_string());

    let rows = recorder.drain_pending();
    assert_eq!(rows.len(), 2);
    let LogEventRow::Error(error_row) = &rows[0] else {
        panic!("expected error row first, got {rows:?}");
    };
    let LogEventRow::HttpRequest(request_row) = &rows[1] else {
        panic!("expected http request row second, got {rows:?}");
    };

    assert_eq!(error_row.error_type, "NotFound");
    assert_eq!(error_row.message, "staff member not found");
    assert_eq!(error_row.http_status, Some(404));
    assert_eq!(error_row.http_method.as_deref(), Some("GET"));
    assert_eq!(error_row.http_path.as_deref(), Some("/staff/missing"));

    assert_eq!(error_row.request_id.as_deref(), Some("req-err"));
    assert_eq!(request_row.request_id, "req-err");
    assert_eq!(request_row.status, 404);
}

#[tokio::test]
async fn current_user_extension_is_recorded() {
    let (state, recorder) = support::test_state(support::test_config());

    let app = Router::new()
        .route("/staff", post(|| async { StatusCode::CREATED }))
        .layer(axum_middleware::from_fn_with_state(state.clone(), capture))
        .layer(Extension(CurrentUser("admin-7".to_string())))
        .layer(axum_middleware::from_fn(request_id))
        .with_state(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/staff")
                .body(Body::empty())
                .expect("build request"),
        )
        .await
        .expect("call app");
    assert_eq!(response.status(), StatusCode::CREATED);

    let rows = recorder.drain_pending();
    let LogEventRow::HttpRequest(row) = &rows[0] else {
        panic!("expected http request row");
    };
    assert_eq!(row.user_id.as_deref(), Some("admin-7"));
}

#[tokio::test]
async fn slow_recording_cannot_fail_the_response() {
    // Queue capacity of one: the second request evicts the first event but
    // both requests still succeed.
    let mut config = support::test_config();
    config.log_queue_capacity = 1;
    let (state, recorder) = support::test_state(config);
    let app = app(state);

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/staff")
                    .body(Body::empty())
                    .expect("build request"),
            )
            .await
            .expect("call app");
        assert_eq!(response.status(), StatusCode::OK);
    }

    assert_eq!(recorder.dropped_events(), 1);
    assert_eq!(recorder.pending_events(), 1);
}

async fn ok_handler() -> impl IntoResponse {
    StatusCode::OK
}

#[tokio::test]
async fn capture_generates_request_id_when_none_supplied() {
    let (state, recorder) = support::test_state(support::test_config());

    // No request_id middleware in this stack.
    let app = Router::new()
        .route("/staff", get(ok_handler))
        .layer(axum_middleware::from_fn_with_state(state.clone(), capture))
        .with_state(state);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/staff")
                .body(Body::empty())
                .expect("build request"),
        )
        .await
        .expect("call app");
    assert_eq!(response.status(), StatusCode::OK);

    let rows = recorder.drain_pending();
    let LogEventRow::HttpRequest(row) = &rows[0] else {
        panic!("expected http request row");
    };
    assert!(uuid::Uuid::parse_str(&row.request_id).is_ok());
}
