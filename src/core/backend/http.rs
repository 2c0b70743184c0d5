//! HTTP plumbing shared by the backend adapters.

use std::sync::OnceLock;

use futures_util::stream::StreamExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::error::BackendError;
use super::CompletionStream;
use crate::core::stream_decoder::decode_event_stream;

static SHARED_CLIENT: OnceLock<reqwest::Client> = OnceLock::new();

/// The process-wide HTTP client, built on first use.
pub fn shared_client() -> reqwest::Client {
    SHARED_CLIENT.get_or_init(reqwest::Client::new).clone()
}

/// Joins a configured endpoint and an API path without doubling slashes.
///
/// ```
/// use promptpad::core::backend::http::endpoint_url;
///
/// assert_eq!(
///     endpoint_url("http://127.0.0.1:8080/", "/completion"),
///     "http://127.0.0.1:8080/completion"
/// );
/// ```
pub fn endpoint_url(endpoint: &str, path: &str) -> String {
    format!(
        "{}/{}",
        endpoint.trim().trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Adds `Authorization: Bearer` when a non-empty key is configured.
pub(crate) fn with_bearer(
    request: reqwest::RequestBuilder,
    api_key: Option<&str>,
) -> reqwest::RequestBuilder {
    match api_key.map(str::trim).filter(|key| !key.is_empty()) {
        Some(key) => request.header("Authorization", format!("Bearer {key}")),
        None => request,
    }
}

/// Sends a request, failing with [`BackendError::Cancelled`] if the token
/// fires first and with [`BackendError::Http`] on a non-success status.
pub(crate) async fn send(
    request: reqwest::RequestBuilder,
    cancel: &CancellationToken,
) -> Result<reqwest::Response, BackendError> {
    let response = tokio::select! {
        response = request.send() => response?,
        _ = cancel.cancelled() => return Err(BackendError::Cancelled),
    };

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = tokio::select! {
        body = response.text() => body.unwrap_or_else(|_| "<no body>".to_string()),
        _ = cancel.cancelled() => return Err(BackendError::Cancelled),
    };
    debug!(%status, "Backend request failed");
    Err(BackendError::Http { status, body })
}

pub(crate) async fn post_json<B: Serialize + ?Sized>(
    client: &reqwest::Client,
    url: &str,
    api_key: Option<&str>,
    body: &B,
    cancel: &CancellationToken,
) -> Result<reqwest::Response, BackendError> {
    debug!(url = %url, "POST");
    let request = with_bearer(client.post(url), api_key)
        .header("Content-Type", "application/json")
        .json(body);
    send(request, cancel).await
}

pub(crate) async fn get(
    client: &reqwest::Client,
    url: &str,
    api_key: Option<&str>,
    cancel: &CancellationToken,
) -> Result<reqwest::Response, BackendError> {
    debug!(url = %url, "GET");
    send(with_bearer(client.get(url), api_key), cancel).await
}

pub(crate) async fn read_json<T: DeserializeOwned>(
    response: reqwest::Response,
    cancel: &CancellationToken,
) -> Result<T, BackendError> {
    tokio::select! {
        body = response.json::<T>() => Ok(body?),
        _ = cancel.cancelled() => Err(BackendError::Cancelled),
    }
}

/// Turns an event-stream response into completion chunks using `parse` for
/// each decoded event.
pub(crate) fn completion_stream<F>(
    response: reqwest::Response,
    cancel: CancellationToken,
    parse: F,
) -> CompletionStream
where
    F: Fn(serde_json::Value) -> Result<super::CompletionChunk, BackendError> + Send + 'static,
{
    let body = Box::pin(response.bytes_stream());
    decode_event_stream(body, cancel)
        .map(move |event| event.and_then(&parse))
        .boxed()
}
