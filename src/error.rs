//! # Error Handling
//!
//! Every failure a relay request can hit falls into one of three kinds:
//!
//! - **ClientData**: the caller sent no file, a malformed form or an oversized upload
//! - **ServiceUnavailable**: the remote service was never connected at startup
//! - **Upstream**: the remote call itself failed (network or remote-side error)
//!
//! All kinds render the same JSON envelope, `{"error": "<message>"}`. The
//! kind travels in the `X-Error-Kind` header so callers never need to match
//! on message text. HTTP status is 500 for every kind unless distinct
//! statuses are enabled in the server config.

use actix_web::http::StatusCode;
use actix_web::HttpResponse;
use serde::Serialize;
use serde_json::json;
use std::fmt;

/// Response header carrying the [`ErrorKind`] of a failed request.
pub const ERROR_KIND_HEADER: &str = "x-error-kind";

/// Closed set of failure classes surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ClientData,
    ServiceUnavailable,
    Upstream,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ClientData => "client_data",
            ErrorKind::ServiceUnavailable => "service_unavailable",
            ErrorKind::Upstream => "upstream",
        }
    }

    /// Status used when distinct error statuses are enabled.
    pub fn distinct_status(&self) -> StatusCode {
        match self {
            ErrorKind::ClientData => StatusCode::BAD_REQUEST,
            ErrorKind::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Upstream => StatusCode::BAD_GATEWAY,
        }
    }
}

/// How error kinds map onto HTTP statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusPolicy {
    /// Every failure is a 500.
    #[default]
    Uniform,
    /// 400 / 503 / 502 by kind.
    Distinct,
}

impl StatusPolicy {
    pub fn from_flag(distinct: bool) -> Self {
        if distinct {
            StatusPolicy::Distinct
        } else {
            StatusPolicy::Uniform
        }
    }
}

/// A failed relay request: its kind plus the message shown to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayError {
    pub kind: ErrorKind,
    pub message: String,
}

impl RelayError {
    pub fn client_data(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::ClientData,
            message: message.into(),
        }
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::ServiceUnavailable,
            message: message.into(),
        }
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Upstream,
            message: message.into(),
        }
    }

    pub fn status(&self, policy: StatusPolicy) -> StatusCode {
        match policy {
            StatusPolicy::Uniform => StatusCode::INTERNAL_SERVER_ERROR,
            StatusPolicy::Distinct => self.kind.distinct_status(),
        }
    }

    /// Render the JSON error envelope under the given status policy.
    pub fn to_response(&self, policy: StatusPolicy) -> HttpResponse {
        HttpResponse::build(self.status(policy))
            .insert_header((ERROR_KIND_HEADER, self.kind.as_str()))
            .json(json!({ "error": self.message }))
    }
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for RelayError {}

impl From<crate::gradio::ClientError> for RelayError {
    fn from(err: crate::gradio::ClientError) -> Self {
        RelayError::upstream(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    #[test]
    fn test_uniform_policy_is_always_500() {
        for err in [
            RelayError::client_data("No audio file provided"),
            RelayError::service_unavailable("not initialized"),
            RelayError::upstream("boom"),
        ] {
            assert_eq!(err.status(StatusPolicy::Uniform), StatusCode::INTERNAL_SERVER_ERROR);
        }
    }

    #[test]
    fn test_distinct_policy_by_kind() {
        assert_eq!(RelayError::client_data("x").status(StatusPolicy::Distinct), StatusCode::BAD_REQUEST);
        assert_eq!(
            RelayError::service_unavailable("x").status(StatusPolicy::Distinct),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(RelayError::upstream("x").status(StatusPolicy::Distinct), StatusCode::BAD_GATEWAY);
        assert_eq!(StatusPolicy::from_flag(false), StatusPolicy::Uniform);
    }

    #[actix_web::test]
    async fn test_error_envelope_and_kind_header() {
        let response = RelayError::upstream("upstream timeout").to_response(StatusPolicy::Uniform);
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            response.headers().get(ERROR_KIND_HEADER).unwrap(),
            "upstream"
        );

        let body = to_bytes(response.into_body()).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value, json!({ "error": "upstream timeout" }));
    }
}
