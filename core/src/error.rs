//! Error taxonomy and the normalizer that produces it.
//!
//! # Design
//! Every failed call, whatever its cause, reaches the caller as one
//! `NormalizedError`. The transport reports what went wrong on the wire as a
//! `TransportFailure`; an error status from the server arrives as an ordinary
//! `HttpResponse`. `normalize` turns either into the taxonomy below.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::http::HttpResponse;

/// The fixed classification of client-layer failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    NetworkError,
    TimeoutError,
    AuthenticationError,
    AuthorizationError,
    ValidationError,
    ServerError,
    NotFoundError,
    UnknownError,
}

impl ErrorKind {
    /// Classify an HTTP error status.
    pub fn from_status(status: u16) -> Self {
        match status {
            400 | 422 => ErrorKind::ValidationError,
            401 => ErrorKind::AuthenticationError,
            403 => ErrorKind::AuthorizationError,
            404 => ErrorKind::NotFoundError,
            500 | 502 | 503 | 504 => ErrorKind::ServerError,
            _ => ErrorKind::UnknownError,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::NetworkError => "NETWORK_ERROR",
            ErrorKind::TimeoutError => "TIMEOUT_ERROR",
            ErrorKind::AuthenticationError => "AUTHENTICATION_ERROR",
            ErrorKind::AuthorizationError => "AUTHORIZATION_ERROR",
            ErrorKind::ValidationError => "VALIDATION_ERROR",
            ErrorKind::ServerError => "SERVER_ERROR",
            ErrorKind::NotFoundError => "NOT_FOUND_ERROR",
            ErrorKind::UnknownError => "UNKNOWN_ERROR",
        }
    }

    /// Message used when neither the server nor the transport supplied one.
    pub fn default_message(self) -> &'static str {
        match self {
            ErrorKind::NetworkError => "Network error: unable to reach the server",
            ErrorKind::TimeoutError => "The request timed out",
            ErrorKind::AuthenticationError => "Session expired, please sign in again",
            ErrorKind::AuthorizationError => "You do not have permission to perform this action",
            ErrorKind::ValidationError => "The submitted data is invalid",
            ErrorKind::ServerError => "Internal server error",
            ErrorKind::NotFoundError => "Resource not found",
            ErrorKind::UnknownError => "An unexpected error occurred",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single error shape returned by every client call.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct NormalizedError {
    pub message: String,
    pub kind: ErrorKind,
    /// HTTP status, absent when no response was received.
    pub status: Option<u16>,
    /// Parsed response body, when one was received.
    pub payload: Option<Value>,
}

impl NormalizedError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind,
            status: None,
            payload: None,
        }
    }

    /// Build an error from a non-2xx server response.
    ///
    /// The message is taken from the body's `message` field, then its `error`
    /// field, then the transport's status text.
    pub fn from_response(response: &HttpResponse) -> Self {
        let kind = ErrorKind::from_status(response.status);
        let payload = parse_body(&response.body);
        let message = payload
            .as_ref()
            .and_then(|body| text_field(body, "message").or_else(|| text_field(body, "error")))
            .unwrap_or_else(|| status_text(response.status));
        Self {
            message,
            kind,
            status: Some(response.status),
            payload,
        }
    }

    /// Build an error for a request that never produced a response.
    pub fn from_failure(failure: &TransportFailure) -> Self {
        match failure {
            TransportFailure::Timeout => {
                Self::new(ErrorKind::TimeoutError, ErrorKind::TimeoutError.default_message())
            }
            TransportFailure::Network(detail) => {
                Self::new(ErrorKind::NetworkError, or_default(detail, ErrorKind::NetworkError))
            }
            TransportFailure::Construction(detail) => {
                Self::new(ErrorKind::UnknownError, or_default(detail, ErrorKind::UnknownError))
            }
        }
    }

    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }
}

/// Why a request produced no response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportFailure {
    /// The client-side deadline elapsed before a response arrived.
    #[error("request timed out")]
    Timeout,

    /// The request was sent (or attempted) but no response came back.
    #[error("network failure: {0}")]
    Network(String),

    /// The request could not be built, so it never left the client.
    #[error("request construction failed: {0}")]
    Construction(String),
}

/// Turn the outcome of one round-trip into the payload-or-error result seen
/// by response stages. 2xx responses pass through unchanged.
pub fn normalize(
    outcome: Result<HttpResponse, TransportFailure>,
) -> Result<HttpResponse, NormalizedError> {
    match outcome {
        Ok(response) if response.is_success() => Ok(response),
        Ok(response) => Err(NormalizedError::from_response(&response)),
        Err(failure) => Err(NormalizedError::from_failure(&failure)),
    }
}

fn parse_body(body: &str) -> Option<Value> {
    if body.trim().is_empty() {
        return None;
    }
    Some(serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.to_string())))
}

fn text_field(body: &Value, field: &str) -> Option<String> {
    match body.get(field)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

fn or_default(detail: &str, kind: ErrorKind) -> String {
    if detail.is_empty() {
        kind.default_message().to_string()
    } else {
        detail.to_string()
    }
}

/// The transport's own description of an error status.
fn status_text(status: u16) -> String {
    format!("Request failed with status code {status}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: Vec::new(),
            body: body.to_string(),
        }
    }

    #[test]
    fn status_table_is_exact() {
        let table = [
            (400, ErrorKind::ValidationError),
            (401, ErrorKind::AuthenticationError),
            (403, ErrorKind::AuthorizationError),
            (404, ErrorKind::NotFoundError),
            (422, ErrorKind::ValidationError),
            (500, ErrorKind::ServerError),
            (502, ErrorKind::ServerError),
            (503, ErrorKind::ServerError),
            (504, ErrorKind::ServerError),
        ];
        for (status, kind) in table {
            assert_eq!(ErrorKind::from_status(status), kind, "status {status}");
        }
        for status in [300, 402, 405, 409, 418, 429, 501, 505, 599] {
            assert_eq!(ErrorKind::from_status(status), ErrorKind::UnknownError, "status {status}");
        }
    }

    #[test]
    fn message_field_wins_over_error_field() {
        let err = NormalizedError::from_response(&response(
            404,
            r#"{"message":"Recurso no encontrado","error":"missing"}"#,
        ));
        assert_eq!(err.kind, ErrorKind::NotFoundError);
        assert_eq!(err.status, Some(404));
        assert_eq!(err.message, "Recurso no encontrado");
        assert_eq!(err.to_string(), "Recurso no encontrado");
    }

    #[test]
    fn error_field_used_when_message_absent() {
        let err = NormalizedError::from_response(&response(403, r#"{"error":"forbidden"}"#));
        assert_eq!(err.kind, ErrorKind::AuthorizationError);
        assert_eq!(err.message, "forbidden");
    }

    #[test]
    fn transport_text_used_when_body_has_no_message() {
        let err = NormalizedError::from_response(&response(500, ""));
        assert_eq!(err.message, "Request failed with status code 500");
        assert!(err.payload.is_none());
    }

    #[test]
    fn empty_message_field_is_skipped() {
        let err = NormalizedError::from_response(&response(418, r#"{"message":""}"#));
        assert_eq!(err.kind, ErrorKind::UnknownError);
        assert_eq!(err.message, "Request failed with status code 418");
    }

    #[test]
    fn non_json_error_body_kept_as_string_payload() {
        let err = NormalizedError::from_response(&response(502, "Bad Gateway"));
        assert_eq!(err.payload, Some(Value::String("Bad Gateway".to_string())));
    }

    #[test]
    fn timeout_has_no_status() {
        let err = NormalizedError::from_failure(&TransportFailure::Timeout);
        assert_eq!(err.kind, ErrorKind::TimeoutError);
        assert!(err.status.is_none());
    }

    #[test]
    fn network_and_construction_failures() {
        let err = NormalizedError::from_failure(&TransportFailure::Network("refused".into()));
        assert_eq!(err.kind, ErrorKind::NetworkError);
        assert_eq!(err.message, "refused");
        assert!(err.status.is_none());

        let err = NormalizedError::from_failure(&TransportFailure::Construction(String::new()));
        assert_eq!(err.kind, ErrorKind::UnknownError);
        assert_eq!(err.message, ErrorKind::UnknownError.default_message());
    }

    #[test]
    fn normalize_passes_success_through() {
        let ok = response(201, r#"{"id":1}"#);
        assert_eq!(normalize(Ok(ok.clone())).unwrap(), ok);
    }

    #[test]
    fn kind_serializes_to_taxonomy_name() {
        let json = serde_json::to_string(&ErrorKind::NotFoundError).unwrap();
        assert_eq!(json, r#""NOT_FOUND_ERROR""#);
        assert_eq!(ErrorKind::AuthenticationError.as_str(), "AUTHENTICATION_ERROR");
    }
}
