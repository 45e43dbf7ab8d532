//! HTTP response building helpers
//!
//! Provides a consistent API for building HTTP responses across all handlers.
//! Error bodies are always `{"error": <code>, "message": <text>}`.

use bytes::Bytes;
use hyper::{header, Response, StatusCode};
use http_body_util::Full;
use serde::Serialize;
use tracing::error;

use crate::error::EngineError;

/// Build a JSON response with the given status code
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());
    let mut response = Response::new(Full::new(Bytes::from(json)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, header::HeaderValue::from_static("application/json"));
    response
}

/// Build a JSON response with 200 OK status
pub fn ok<T: Serialize>(body: &T) -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, body)
}

/// Build a JSON response with 201 Created status
pub fn created<T: Serialize>(body: &T) -> Response<Full<Bytes>> {
    json_response(StatusCode::CREATED, body)
}

/// Build an empty response with 204 No Content status
pub fn no_content() -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = StatusCode::NO_CONTENT;
    response
}

fn error_body(status: StatusCode, code: &str, message: &str) -> Response<Full<Bytes>> {
    json_response(status, &serde_json::json!({ "error": code, "message": message }))
}

/// Build a 404 Not Found response with message
pub fn not_found(message: &str) -> Response<Full<Bytes>> {
    error_body(StatusCode::NOT_FOUND, "not_found", message)
}

/// Build a 401 response for calls without an authenticated person
pub fn unauthenticated() -> Response<Full<Bytes>> {
    error_body(
        StatusCode::UNAUTHORIZED,
        "unauthenticated",
        "Missing X-Person-Id header",
    )
}

/// HTTP status for an engine error
pub fn status_for(error: &EngineError) -> StatusCode {
    match error {
        EngineError::Unauthorized(_) => StatusCode::FORBIDDEN,
        EngineError::NotFound(_) => StatusCode::NOT_FOUND,
        EngineError::SelfReference(_) | EngineError::InvalidInput(_) | EngineError::Json(_) => {
            StatusCode::BAD_REQUEST
        }
        EngineError::AlreadyRequested(..)
        | EngineError::AlreadyResolved(_)
        | EngineError::NotCancelable(_)
        | EngineError::ResendNotAllowed(..)
        | EngineError::SelfFollow(_) => StatusCode::CONFLICT,
        EngineError::Blocked(..) => StatusCode::LOCKED,
        EngineError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        EngineError::Pool(_) => StatusCode::SERVICE_UNAVAILABLE,
        EngineError::Database(_)
        | EngineError::Config(_)
        | EngineError::Io(_)
        | EngineError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Convert an EngineError to an appropriate HTTP response
///
/// Storage internals are logged and replaced by a generic message.
pub fn error_response(err: EngineError) -> Response<Full<Bytes>> {
    let status = status_for(&err);

    let message = if status.is_server_error() && !matches!(err, EngineError::Timeout(_)) {
        error!(error = %err, retryable = err.is_retryable(), "Request failed");
        if err.is_retryable() {
            "Temporary storage failure, retry later".to_string()
        } else {
            "Internal error".to_string()
        }
    } else {
        err.to_string()
    };

    error_body(status, err.code(), &message)
}

/// Result type alias for handlers
pub type HandlerResult = Result<Response<Full<Bytes>>, EngineError>;

/// Wrap a service result into an HTTP response
pub fn from_result<T: Serialize>(result: Result<T, EngineError>) -> Response<Full<Bytes>> {
    match result {
        Ok(value) => ok(&value),
        Err(e) => error_response(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_json(resp: Response<Full<Bytes>>) -> serde_json::Value {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_ok_response() {
        let resp = ok(&serde_json::json!({"test": true}));
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/json");
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(status_for(&EngineError::Unauthorized("x".into())), StatusCode::FORBIDDEN);
        assert_eq!(status_for(&EngineError::NotFound("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(status_for(&EngineError::SelfReference("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_for(&EngineError::AlreadyRequested("a".into(), "b".into())),
            StatusCode::CONFLICT
        );
        assert_eq!(status_for(&EngineError::AlreadyResolved("r".into())), StatusCode::CONFLICT);
        assert_eq!(status_for(&EngineError::NotCancelable("r".into())), StatusCode::CONFLICT);
        assert_eq!(status_for(&EngineError::SelfFollow("o".into())), StatusCode::CONFLICT);
        assert_eq!(status_for(&EngineError::Blocked("a".into(), "b".into())), StatusCode::LOCKED);
        assert_eq!(status_for(&EngineError::Timeout("t".into())), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(status_for(&EngineError::Pool("p".into())), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            status_for(&EngineError::Internal("boom".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_error_body_carries_code() {
        let body = body_json(error_response(EngineError::AlreadyResolved("r1".into()))).await;
        assert_eq!(body["error"], "already_resolved");
        assert!(body["message"].as_str().unwrap().contains("r1"));
    }

    #[tokio::test]
    async fn test_internal_details_are_hidden() {
        let body = body_json(error_response(EngineError::Internal("secret path /var/db".into()))).await;
        assert_eq!(body["error"], "internal");
        assert_eq!(body["message"], "Internal error");
    }
}
