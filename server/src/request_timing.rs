//! Request timing and request-id propagation.
//!
//! Every response carries an `X-Request-Id` (echoed if the caller sent one,
//! generated otherwise); requests slower than one second are logged.

use std::time::Instant;

use axum::body::Body;
use axum::extract::Request;
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;
use uuid::Uuid;

const REQUEST_ID_HEADER: &str = "x-request-id";
const SLOW_REQUEST_THRESHOLD_MS: u128 = 1000;

/// The per-request id, stashed in request extensions so error bodies built
/// deep in a handler (see `error.rs`) can include it without threading it
/// through every function signature.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

pub async fn request_timing(mut request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    request
        .extensions_mut()
        .insert(RequestId(request_id.clone()));

    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let started = Instant::now();
    let mut response = next.run(request).await;
    let elapsed = started.elapsed();

    if elapsed.as_millis() > SLOW_REQUEST_THRESHOLD_MS {
        tracing::warn!(
            request_id = %request_id,
            method = %method,
            path = %path,
            elapsed_ms = elapsed.as_millis(),
            "slow request"
        );
    }

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    if response.status().is_client_error() || response.status().is_server_error() {
        response = stamp_request_id(response, &request_id).await;
    }

    response
}

/// Splice `requestId` into an error response's JSON body. The error body is
/// built inside `AppError::into_response`, which has no access to request
/// extensions, so the id is patched in here instead.
async fn stamp_request_id(response: Response, request_id: &str) -> Response {
    let (parts, body) = response.into_parts();

    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(_) => return Response::from_parts(parts, Body::empty()),
    };

    let mut value: serde_json::Value = match serde_json::from_slice(&bytes) {
        Ok(value) => value,
        Err(_) => return Response::from_parts(parts, Body::from(bytes)),
    };

    if let Some(object) = value.as_object_mut() {
        object.insert(
            "requestId".to_string(),
            serde_json::Value::String(request_id.to_string()),
        );
    }

    let patched = serde_json::to_vec(&value).unwrap_or_else(|_| bytes.to_vec());
    let mut response = Response::from_parts(parts, Body::from(patched));
    response.headers_mut().remove(axum::http::header::CONTENT_LENGTH);
    response
}
