use std::fmt;

use reqwest::StatusCode;

use crate::core::backend::error::error_summary;
use crate::core::backend::options::StopSequenceError;
use crate::core::backend::{BackendError, BackendKind};

/// What the user is told when a prediction fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionFailure {
    /// The backend answered 401.
    CredentialRejected,
    /// The backend answered 429 and bills by quota.
    QuotaExceeded,
    Failed(String),
}

impl fmt::Display for CompletionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompletionFailure::CredentialRejected => {
                write!(f, "The backend rejected the API key.")
            }
            CompletionFailure::QuotaExceeded => {
                write!(f, "Quota exceeded. Check the plan and billing details for this API key.")
            }
            CompletionFailure::Failed(message) => write!(f, "{message}"),
        }
    }
}

/// Maps a backend error to a user-facing failure. Cancellation is not a
/// failure and yields `None`.
pub fn classify(error: &BackendError, kind: BackendKind) -> Option<CompletionFailure> {
    match error {
        BackendError::Cancelled => None,
        _ => Some(match error.status() {
            Some(StatusCode::UNAUTHORIZED) => CompletionFailure::CredentialRejected,
            Some(StatusCode::TOO_MANY_REQUESTS) if kind.reports_quota() => {
                CompletionFailure::QuotaExceeded
            }
            _ => CompletionFailure::Failed(describe(error)),
        }),
    }
}

/// One-line description of a backend error, summarizing JSON error bodies.
pub fn describe(error: &BackendError) -> String {
    match error {
        BackendError::Http { status, body } => {
            let summary = serde_json::from_str::<serde_json::Value>(body.trim())
                .ok()
                .and_then(|value| error_summary(&value));
            match summary {
                Some(summary) => format!("API Error: {status}: {summary}"),
                None if body.trim().is_empty() => format!("API Error: {status}"),
                None => format!("API Error: {status}: {}", body.trim()),
            }
        }
        other => format!("API Error: {other}"),
    }
}

/// Why a prediction request was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PredictRejected {
    InvalidStopSequences,
}

impl fmt::Display for PredictRejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PredictRejected::InvalidStopSequences => {
                write!(f, "Fix the stop sequences before predicting.")
            }
        }
    }
}

impl std::error::Error for PredictRejected {}

impl From<&StopSequenceError> for PredictRejected {
    fn from(_: &StopSequenceError) -> Self {
        PredictRejected::InvalidStopSequences
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http(status: u16, body: &str) -> BackendError {
        BackendError::Http {
            status: StatusCode::from_u16(status).expect("status"),
            body: body.to_string(),
        }
    }

    #[test]
    fn unauthorized_is_credential_rejection_everywhere() {
        for kind in BackendKind::ALL {
            assert_eq!(
                classify(&http(401, ""), kind),
                Some(CompletionFailure::CredentialRejected)
            );
        }
    }

    #[test]
    fn too_many_requests_is_quota_only_for_billed_backends() {
        assert_eq!(
            classify(&http(429, ""), BackendKind::OpenAiCompatible),
            Some(CompletionFailure::QuotaExceeded)
        );
        assert_eq!(
            classify(&http(429, ""), BackendKind::Hosted),
            Some(CompletionFailure::QuotaExceeded)
        );
        assert_eq!(
            classify(&http(429, "busy"), BackendKind::KoboldCpp),
            Some(CompletionFailure::Failed(
                "API Error: 429 Too Many Requests: busy".into()
            ))
        );
    }

    #[test]
    fn cancellation_is_not_a_failure() {
        assert_eq!(classify(&BackendError::Cancelled, BackendKind::LlamaCpp), None);
    }

    #[test]
    fn json_bodies_are_summarized() {
        let failure = classify(
            &http(500, r#"{"error":{"message":"model not loaded","type":"server"}}"#),
            BackendKind::LlamaCpp,
        );
        assert_eq!(
            failure,
            Some(CompletionFailure::Failed(
                "API Error: 500 Internal Server Error: model not loaded".into()
            ))
        );
    }

    #[test]
    fn api_errors_keep_their_message() {
        let failure = classify(
            &BackendError::Api {
                message: "context too long".into(),
            },
            BackendKind::OpenAiCompatible,
        );
        assert_eq!(
            failure.map(|f| f.to_string()),
            Some("API Error: context too long".to_string())
        );
    }
}
