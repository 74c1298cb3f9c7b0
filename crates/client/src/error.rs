//! Error taxonomy for calls made through the client.
//!
//! Every endpoint returns `Result<T, ApiError>`. `AuthExpired` is terminal:
//! by the time a caller sees it the session has been cleared and
//! `session-expired` has been published, so the caller only needs to send the
//! user back to the login view.

use std::collections::BTreeMap;

use reqwest::StatusCode;
use thiserror::Error;

use crate::storage::StorageError;

/// Errors returned by API calls.
#[derive(Debug, Error)]
pub enum ApiError {
    /// No response was received (connection refused, DNS failure, timeout).
    #[error("Network unreachable: {0}")]
    NetworkUnreachable(#[source] reqwest::Error),

    /// Credentials were rejected on an unauthenticated call such as login.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The session could not be renewed; the user must sign in again.
    #[error("Session expired, please log in again")]
    AuthExpired,

    /// The server rejected the request body.
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        /// Field-level messages keyed by field name.
        fields: BTreeMap<String, Vec<String>>,
    },

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The server failed (5xx).
    #[error("Server error (HTTP {status})")]
    Server { status: u16 },

    /// Any other non-success status.
    #[error("Unexpected HTTP {status}: {message}")]
    UnexpectedStatus { status: u16, message: String },

    /// Response body did not match the expected shape.
    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    /// Endpoint path could not be joined onto the base URL.
    #[error("Invalid request URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Local persistence failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl ApiError {
    /// Map a non-success, non-401 response to the taxonomy.
    #[must_use]
    pub fn from_status(status: StatusCode, body: &str, path: &str) -> Self {
        match status {
            StatusCode::NOT_FOUND => Self::NotFound(path.to_string()),
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                let (message, fields) = parse_validation_body(body);
                Self::Validation { message, fields }
            }
            s if s.is_server_error() => Self::Server { status: s.as_u16() },
            s => Self::UnexpectedStatus {
                status: s.as_u16(),
                message: error_message(body).unwrap_or_else(|| truncate(body)),
            },
        }
    }

    /// Map a 401 on an unauthenticated call.
    #[must_use]
    pub fn unauthorized(body: &str) -> Self {
        Self::Unauthorized(
            error_message(body).unwrap_or_else(|| "Invalid username or password".to_string()),
        )
    }

    /// Whether showing a notification and letting the user try again makes sense.
    ///
    /// `AuthExpired` is excluded: the only remedy is signing in again.
    #[must_use]
    pub fn is_retryable_by_user(&self) -> bool {
        match self {
            Self::NetworkUnreachable(_) | Self::Server { .. } => true,
            Self::UnexpectedStatus { status, .. } => *status == 429 || *status == 408,
            _ => false,
        }
    }

    /// HTTP status behind the error, if one was received.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Unauthorized(_) | Self::AuthExpired => Some(401),
            Self::NotFound(_) => Some(404),
            Self::Server { status } | Self::UnexpectedStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Pull a top-level `error` or `detail` message out of a JSON body.
fn error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    ["error", "detail", "message"]
        .iter()
        .find_map(|key| value.get(key).and_then(serde_json::Value::as_str))
        .map(str::to_string)
}

/// Parse `{"error": "..."}` or DRF-style `{"field": ["msg", ...]}` bodies.
fn parse_validation_body(body: &str) -> (String, BTreeMap<String, Vec<String>>) {
    if let Some(message) = error_message(body) {
        return (message, BTreeMap::new());
    }

    let mut fields = BTreeMap::new();
    if let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(body) {
        for (field, value) in map {
            let messages = match value {
                serde_json::Value::Array(items) => items
                    .into_iter()
                    .map(|item| match item {
                        serde_json::Value::String(s) => s,
                        other => other.to_string(),
                    })
                    .collect(),
                serde_json::Value::String(s) => vec![s],
                other => vec![other.to_string()],
            };
            fields.insert(field, messages);
        }
    }

    if fields.is_empty() {
        return (truncate(body), fields);
    }

    let message = fields
        .iter()
        .map(|(field, messages)| format!("{field}: {}", messages.join(" ")))
        .collect::<Vec<_>>()
        .join("; ");
    (message, fields)
}

fn truncate(body: &str) -> String {
    const MAX: usize = 200;
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "(empty response)".to_string();
    }
    trimmed.chars().take(MAX).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_mapping() {
        let err = ApiError::from_status(StatusCode::NOT_FOUND, "", "products/9/");
        assert_eq!(err.to_string(), "Not found: products/9/");
        assert_eq!(err.status(), Some(404));
    }

    #[test]
    fn test_validation_with_error_key() {
        let err = ApiError::from_status(
            StatusCode::BAD_REQUEST,
            r#"{"error": "User already exists"}"#,
            "register/",
        );
        match err {
            ApiError::Validation { message, fields } => {
                assert_eq!(message, "User already exists");
                assert!(fields.is_empty());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_validation_with_field_errors() {
        let err = ApiError::from_status(
            StatusCode::BAD_REQUEST,
            r#"{"price": ["A valid number is required."], "name": ["This field is required."]}"#,
            "products/",
        );
        match err {
            ApiError::Validation { message, fields } => {
                assert_eq!(fields.len(), 2);
                assert_eq!(fields["price"], vec!["A valid number is required."]);
                assert!(message.starts_with("name: This field is required."));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_server_error_is_retryable() {
        let err = ApiError::from_status(StatusCode::BAD_GATEWAY, "<html>", "summary/");
        assert!(matches!(err, ApiError::Server { status: 502 }));
        assert!(err.is_retryable_by_user());
    }

    #[test]
    fn test_unexpected_status_keeps_detail() {
        let err = ApiError::from_status(
            StatusCode::FORBIDDEN,
            r#"{"detail": "You do not have permission to perform this action."}"#,
            "products/",
        );
        assert_eq!(
            err.to_string(),
            "Unexpected HTTP 403: You do not have permission to perform this action."
        );
        assert!(!err.is_retryable_by_user());
    }

    #[test]
    fn test_unauthorized_message() {
        let err = ApiError::unauthorized(r#"{"detail": "Invalid username or password"}"#);
        assert_eq!(err.to_string(), "Unauthorized: Invalid username or password");
        let err = ApiError::unauthorized("");
        assert!(matches!(err, ApiError::Unauthorized(_)));
    }

    #[test]
    fn test_auth_expired_is_terminal() {
        assert!(!ApiError::AuthExpired.is_retryable_by_user());
        assert_eq!(ApiError::AuthExpired.status(), Some(401));
    }
}
