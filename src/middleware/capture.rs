use axum::{
    body::{Body, Bytes},
    extract::{Request, State},
    http::{header::CONTENT_LENGTH, HeaderMap, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use http_body::{Body as HttpBody, Frame};
use http_body_util::BodyExt;
use serde_json::{json, Map, Value};
use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;
use uuid::Uuid;

use crate::{
    error::ErrorDetails,
    middleware::request_id::RequestId,
    models::log_event::{ErrorEvent, HttpRequestEvent},
    state::AppState,
};

/// Inserted by the external authentication layer when a request carries a
/// valid identity. Absent means anonymous.
#[derive(Clone, Debug)]
pub struct CurrentUser(pub String);

/// Wraps every route: times the request, captures identity and payloads,
/// and records exactly one HttpRequestEvent per completed response. When
/// the handler returned an error, additionally records one ErrorEvent with
/// the same request id and rewrites the client body into the standard
/// error envelope.
///
/// Recording is an enqueue only; a slow or failing log write cannot change
/// the response or its latency.
pub async fn capture(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let raw_query = request.uri().query().map(str::to_string);
    let headers = request.headers().clone();

    let ip = extract_ip(&headers).unwrap_or_else(|| "unknown".to_string());
    let user_id = request
        .extensions()
        .get::<CurrentUser>()
        .map(|user| user.0.clone());
    let request_id = request
        .extensions()
        .get::<RequestId>()
        .map(|id| id.0.clone())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let body_cap = state.config.max_captured_body_bytes;
    let capture_bodies = method != Method::GET || state.config.capture_get_bodies;

    let (request, request_body_bytes) = if capture_bodies {
        buffer_request_body(request, body_cap).await
    } else {
        (request, None)
    };
    let request_body = request_body_bytes.as_ref().and_then(parse_body);

    let response = next.run(request).await;

    let duration_ms = u32::try_from(start.elapsed().as_millis()).unwrap_or(u32::MAX);
    let status = response.status();
    let error_details = response.extensions().get::<ErrorDetails>().cloned();

    let (response, response_body) = match error_details {
        Some(details) => {
            // Logging and the client response are independent effects;
            // build the envelope first so a recorder problem cannot lose it.
            let envelope = json!({
                "statusCode": details.status,
                "message": details.message,
                "timestamp": Utc::now().to_rfc3339(),
                "path": path,
            });

            state.recorder.record_error(ErrorEvent {
                timestamp: Utc::now(),
                error_type: details.error_type,
                message: details.message,
                stack_trace: details.stack_trace,
                ip: ip.clone(),
                request_id: Some(request_id.clone()),
                user_id: user_id.clone(),
                http_path: Some(path.clone()),
                http_method: Some(method.to_string()),
                http_status: Some(details.status),
                request_body: request_body.clone(),
                response_body: Some(envelope.clone()),
                metadata: json!({}),
            });

            let rewritten = (
                StatusCode::from_u16(details.status).unwrap_or(status),
                Json(envelope.clone()),
            )
                .into_response();
            (rewritten, capture_bodies.then_some(envelope))
        }
        None if capture_bodies => buffer_response_body(response, body_cap).await,
        None => (response, None),
    };

    state.recorder.record_http_request(HttpRequestEvent {
        timestamp: Utc::now(),
        method: method.to_string(),
        path,
        status: status.as_u16(),
        duration_ms,
        ip,
        user_id,
        request_id,
        request_body,
        response_body,
        query_params: Some(parse_query_params(raw_query.as_deref())),
    });

    response
}

/// Query string as a JSON object; repeated keys collapse into an array.
fn parse_query_params(raw: Option<&str>) -> Value {
    let mut params = Map::new();
    let Some(raw) = raw else {
        return Value::Object(params);
    };
    for (key, value) in url::form_urlencoded::parse(raw.as_bytes()) {
        let key = key.into_owned();
        let value = Value::String(value.into_owned());
        match params.get_mut(&key) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                params.insert(key, value);
            }
        }
    }
    Value::Object(params)
}

fn parse_body(bytes: &Bytes) -> Option<Value> {
    if bytes.is_empty() {
        return None;
    }
    match serde_json::from_slice(bytes) {
        Ok(value) => Some(value),
        Err(_) => Some(Value::String(String::from_utf8_lossy(bytes).into_owned())),
    }
}

fn extract_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .or_else(|| headers.get("x-real-ip"))
        .and_then(|value| value.to_str().ok())
        .map(|value| value.split(',').next().unwrap_or(value).trim().to_string())
}

/// Buffers up to `cap` bytes of the request body while keeping the full
/// stream replayable for the downstream handler. Bodies over the cap are
/// forwarded intact but logged as absent.
async fn buffer_request_body(request: Request, cap: usize) -> (Request, Option<Bytes>) {
    let (parts, mut body) = request.into_parts();
    let mut replay_frames = VecDeque::new();
    let mut captured = Vec::new();
    let mut overflowed = false;
    let mut pending_error = None;

    while let Some(frame_result) = body.frame().await {
        match frame_result {
            Ok(frame) => {
                if let Some(data) = frame.data_ref() {
                    if !overflowed {
                        if captured.len() + data.len() > cap {
                            overflowed = true;
                        } else {
                            captured.extend_from_slice(data);
                        }
                    }
                }
                replay_frames.push_back(frame);
                if overflowed {
                    break;
                }
            }
            Err(err) => {
                pending_error = Some(err);
                break;
            }
        }
    }

    let captured = if overflowed || pending_error.is_some() {
        None
    } else {
        Some(Bytes::from(captured))
    };
    let replay = ReplayBody::new(replay_frames, body, pending_error);
    (Request::from_parts(parts, Body::new(replay)), captured)
}

/// Captures the response body only when its size is known up front (via
/// Content-Length or an exact body size hint) and within the cap;
/// streaming or oversized responses pass through untouched.
async fn buffer_response_body(response: Response, cap: usize) -> (Response, Option<Value>) {
    let declared_len = response
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<usize>().ok())
        .or_else(|| {
            response
                .body()
                .size_hint()
                .exact()
                .map(|len| usize::try_from(len).unwrap_or(usize::MAX))
        });

    match declared_len {
        Some(len) if len <= cap => {
            let (parts, body) = response.into_parts();
            match axum::body::to_bytes(body, cap).await {
                Ok(bytes) => {
                    let value = parse_body(&bytes);
                    (Response::from_parts(parts, Body::from(bytes)), value)
                }
                Err(err) => {
                    tracing::warn!(error = ?err, "Failed to buffer response body for logging");
                    (Response::from_parts(parts, Body::empty()), None)
                }
            }
        }
        _ => (response, None),
    }
}

/// Body that first yields the frames already pulled off the wire, then the
/// untouched remainder of the original stream.
struct ReplayBody {
    buffered: VecDeque<Frame<Bytes>>,
    inner: Body,
    pending_error: Option<axum::Error>,
}

impl ReplayBody {
    fn new(
        buffered: VecDeque<Frame<Bytes>>,
        inner: Body,
        pending_error: Option<axum::Error>,
    ) -> Self {
        Self {
            buffered,
            inner,
            pending_error,
        }
    }

    fn buffered_len(&self) -> u64 {
        self.buffered
            .iter()
            .filter_map(|frame| frame.data_ref().map(|data| data.len() as u64))
            .sum()
    }
}

impl HttpBody for ReplayBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        if let Some(frame) = this.buffered.pop_front() {
            return Poll::Ready(Some(Ok(frame)));
        }
        if let Some(err) = this.pending_error.take() {
            this.inner = Body::empty();
            return Poll::Ready(Some(Err(err)));
        }
        Pin::new(&mut this.inner).poll_frame(cx)
    }

    fn size_hint(&self) -> http_body::SizeHint {
        let buffered_len = self.buffered_len();
        let mut hint = self.inner.size_hint();
        hint.set_lower(hint.lower().saturating_add(buffered_len));
        if let Some(upper) = hint.upper() {
            hint.set_upper(upper.saturating_add(buffered_len));
        }
        hint
    }

    fn is_end_stream(&self) -> bool {
        if !self.buffered.is_empty() || self.pending_error.is_some() {
            return false;
        }
        self.inner.is_end_stream()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[test]
    fn extract_ip_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.1, 10.0.0.1".parse().unwrap());
        headers.insert("x-real-ip", "203.0.113.2".parse().unwrap());
        assert_eq!(extract_ip(&headers).as_deref(), Some("203.0.113.1"));
    }

    #[test]
    fn extract_ip_falls_back_to_real_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", "203.0.113.2".parse().unwrap());
        assert_eq!(extract_ip(&headers).as_deref(), Some("203.0.113.2"));
    }

    #[test]
    fn query_params_parse_into_object() {
        let value = parse_query_params(Some("page=2&pageSize=10"));
        assert_eq!(value["page"], "2");
        assert_eq!(value["pageSize"], "10");
    }

    #[test]
    fn query_params_collapse_repeats_into_arrays() {
        let value = parse_query_params(Some("tag=a&tag=b"));
        assert_eq!(value["tag"], json!(["a", "b"]));
    }

    #[test]
    fn query_params_default_to_empty_object() {
        assert_eq!(parse_query_params(None), json!({}));
    }

    #[test]
    fn parse_body_handles_json_and_text() {
        assert_eq!(
            parse_body(&Bytes::from_static(br#"{"a":1}"#)),
            Some(json!({"a":1}))
        );
        assert_eq!(
            parse_body(&Bytes::from_static(b"plain")),
            Some(json!("plain"))
        );
        assert_eq!(parse_body(&Bytes::new()), None);
    }

    #[tokio::test]
    async fn buffer_request_body_replays_full_stream() {
        let payload = br#"{"name":"x"}"#.to_vec();
        let request = Request::builder()
            .method(Method::POST)
            .uri("/staff")
            .body(Body::from(payload.clone()))
            .unwrap();

        let (request, captured) = buffer_request_body(request, 64 * 1024).await;
        assert_eq!(captured.as_deref(), Some(payload.as_slice()));

        let replayed = to_bytes(request.into_body(), payload.len() + 1)
            .await
            .expect("body still readable");
        assert_eq!(replayed.as_ref(), payload.as_slice());
    }

    #[tokio::test]
    async fn buffer_request_body_skips_capture_over_cap() {
        let payload = vec![b'a'; 1024];
        let request = Request::builder()
            .method(Method::POST)
            .uri("/staff")
            .body(Body::from(payload.clone()))
            .unwrap();

        let (request, captured) = buffer_request_body(request, 16).await;
        assert!(captured.is_none());

        let replayed = to_bytes(request.into_body(), payload.len() + 1)
            .await
            .expect("body still readable");
        assert_eq!(replayed.as_ref(), payload.as_slice());
    }

    #[tokio::test]
    async fn buffer_response_body_captures_sized_bodies() {
        let response = Response::builder()
            .status(StatusCode::OK)
            .body(Body::from("short"))
            .unwrap();
        let (response, value) = buffer_response_body(response, 64).await;
        assert_eq!(value, Some(json!("short")));
        let bytes = to_bytes(response.into_body(), 64).await.unwrap();
        assert_eq!(bytes.as_ref(), b"short");
    }

    #[tokio::test]
    async fn buffer_response_body_skips_oversized_bodies() {
        let payload = "a".repeat(128);
        let response = Response::builder()
            .status(StatusCode::OK)
            .body(Body::from(payload.clone()))
            .unwrap();
        let (response, value) = buffer_response_body(response, 64).await;
        assert!(value.is_none());
        let bytes = to_bytes(response.into_body(), 256).await.unwrap();
        assert_eq!(bytes.len(), 128);
    }
}
