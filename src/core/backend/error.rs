use std::error::Error as StdError;
use std::fmt;

use reqwest::StatusCode;

use crate::core::stream_decoder::DecodeError;

/// Errors produced by backend adapters.
///
/// `Cancelled` is not a failure: it means the caller's cancellation token
/// fired and the operation stopped quietly. Callers must not report it.
#[derive(Debug)]
pub enum BackendError {
    /// The server answered with a non-success status.
    Http { status: StatusCode, body: String },
    /// The request never completed (connection refused, reset, timeout).
    Transport(reqwest::Error),
    /// A streamed payload was not valid JSON.
    Decode {
        payload: String,
        source: serde_json::Error,
    },
    /// A streamed payload was valid JSON but reported an error or had an
    /// unexpected shape.
    Api { message: String },
    Cancelled,
}

impl BackendError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, BackendError::Cancelled)
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            BackendError::Http { status, .. } => Some(*status),
            BackendError::Transport(err) => err.status(),
            _ => None,
        }
    }

    /// Statuses servers use for endpoints they do not implement.
    pub(crate) fn is_unsupported_endpoint(&self) -> bool {
        matches!(
            self.status(),
            Some(StatusCode::NOT_FOUND | StatusCode::METHOD_NOT_ALLOWED | StatusCode::NOT_IMPLEMENTED)
        )
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::Http { status, body } => {
                if body.trim().is_empty() {
                    write!(f, "HTTP error: {status}")
                } else {
                    write!(f, "HTTP error: {status}: {}", body.trim())
                }
            }
            BackendError::Transport(err) => write!(f, "Request failed: {err}"),
            BackendError::Decode { source, .. } => {
                write!(f, "Malformed stream payload: {source}")
            }
            BackendError::Api { message } => write!(f, "{message}"),
            BackendError::Cancelled => write!(f, "Request cancelled"),
        }
    }
}

impl StdError for BackendError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            BackendError::Transport(err) => Some(err),
            BackendError::Decode { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        BackendError::Transport(err)
    }
}

impl From<DecodeError> for BackendError {
    fn from(err: DecodeError) -> Self {
        BackendError::Decode {
            payload: err.payload,
            source: err.source,
        }
    }
}

/// Pulls a one-line message out of an API error payload such as
/// `{"error": {"message": "..."}}`, `{"error": "..."}` or `{"message": "..."}`.
pub(crate) fn error_summary(value: &serde_json::Value) -> Option<String> {
    let summary = value
        .pointer("/error/message")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .or_else(|| {
            value.get("error").and_then(|v| match v {
                serde_json::Value::String(s) => Some(s.to_string()),
                _ => None,
            })
        })
        .or_else(|| {
            value
                .get("message")
                .and_then(|v| v.as_str().map(str::to_owned))
        });

    summary
        .map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|text| !text.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_error_exposes_status() {
        let err = BackendError::Http {
            status: StatusCode::UNAUTHORIZED,
            body: " denied ".into(),
        };
        assert_eq!(err.status(), Some(StatusCode::UNAUTHORIZED));
        assert_eq!(err.to_string(), "HTTP error: 401 Unauthorized: denied");
        assert!(!err.is_unsupported_endpoint());
    }

    #[test]
    fn not_found_counts_as_unsupported() {
        let err = BackendError::Http {
            status: StatusCode::NOT_FOUND,
            body: String::new(),
        };
        assert!(err.is_unsupported_endpoint());
        assert_eq!(err.to_string(), "HTTP error: 404 Not Found");
    }

    #[test]
    fn error_summary_handles_common_shapes() {
        let nested = serde_json::json!({"error": {"message": "model  overloaded\n", "code": 503}});
        assert_eq!(error_summary(&nested).as_deref(), Some("model overloaded"));

        let flat = serde_json::json!({"error": "bad key"});
        assert_eq!(error_summary(&flat).as_deref(), Some("bad key"));

        let message = serde_json::json!({"message": "nope"});
        assert_eq!(error_summary(&message).as_deref(), Some("nope"));

        assert_eq!(error_summary(&serde_json::json!({"error": {"code": 1}})), None);
    }

    #[test]
    fn cancellation_is_distinct() {
        assert!(BackendError::Cancelled.is_cancelled());
        assert!(!BackendError::Api {
            message: "x".into()
        }
        .is_cancelled());
    }
}
