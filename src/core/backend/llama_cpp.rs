//! llama.cpp server adapter.
//!
//! The server already uses the canonical option names, so requests need no
//! translation and `n_predict: -1` is sent as is.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::http::{completion_stream, endpoint_url, post_json, read_json};
use super::{
    BackendConfig, BackendError, BackendKind, CompletionBackend, CompletionChunk,
    CompletionRequest, CompletionStream,
};
use crate::core::document::TokenProbabilities;

pub struct LlamaCppBackend {
    client: reqwest::Client,
}

impl LlamaCppBackend {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[derive(Deserialize)]
struct TokenizeResponse {
    #[serde(default)]
    tokens: Vec<Value>,
}

#[derive(Deserialize)]
struct LlamaEvent {
    #[serde(default)]
    content: String,
    #[serde(default)]
    stopping_word: Option<String>,
    #[serde(default)]
    completion_probabilities: Option<Vec<TokenProbabilities>>,
}

pub(crate) fn completion_body(request: &CompletionRequest) -> Value {
    let mut body = request.canonical_options();
    body.insert("prompt".into(), Value::from(request.prompt.as_str()));
    body.insert("stream".into(), Value::Bool(true));
    body.insert("cache_prompt".into(), Value::Bool(true));
    Value::Object(body)
}

fn parse_event(event: Value) -> Result<CompletionChunk, BackendError> {
    let event: LlamaEvent = serde_json::from_value(event).map_err(|err| BackendError::Api {
        message: format!("Unexpected llama.cpp event: {err}"),
    })?;
    Ok(CompletionChunk {
        content: event.content,
        stopping_word: event.stopping_word.filter(|word| !word.is_empty()),
        token_probabilities: event.completion_probabilities,
    })
}

#[async_trait]
impl CompletionBackend for LlamaCppBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::LlamaCpp
    }

    async fn token_count(
        &self,
        text: &str,
        config: &BackendConfig,
        cancel: &CancellationToken,
    ) -> Result<usize, BackendError> {
        let url = endpoint_url(&config.endpoint, "tokenize");
        let response = post_json(
            &self.client,
            &url,
            config.api_key(),
            &json!({ "content": text }),
            cancel,
        )
        .await?;
        let body: TokenizeResponse = read_json(response, cancel).await?;
        Ok(body.tokens.len())
    }

    async fn list_models(
        &self,
        _config: &BackendConfig,
        _cancel: &CancellationToken,
    ) -> Result<Vec<String>, BackendError> {
        Ok(Vec::new())
    }

    async fn stream_completion(
        &self,
        request: &CompletionRequest,
        config: &BackendConfig,
        cancel: CancellationToken,
    ) -> Result<CompletionStream, BackendError> {
        let url = endpoint_url(&config.endpoint, "completion");
        let response = post_json(
            &self.client,
            &url,
            config.api_key(),
            &completion_body(request),
            &cancel,
        )
        .await?;
        debug!("llama.cpp stream opened");
        Ok(completion_stream(response, cancel, parse_event))
    }

    async fn abort(
        &self,
        _config: &BackendConfig,
        _cancel: &CancellationToken,
    ) -> Result<(), BackendError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::backend::test_server::{test_client, MockResponse, MockServer};
    use crate::core::backend::SamplingOptions;
    use futures_util::StreamExt;

    #[test]
    fn completion_body_keeps_canonical_names() {
        let request = CompletionRequest::new("Once", SamplingOptions::default());
        let body = completion_body(&request);
        assert_eq!(body["prompt"], "Once");
        assert_eq!(body["stream"], true);
        assert_eq!(body["cache_prompt"], true);
        assert_eq!(body["n_predict"], -1);
        assert_eq!(body["repeat_penalty"], 1.1);
    }

    #[test]
    fn empty_stopping_word_is_ignored() {
        let chunk = parse_event(json!({"content": "a", "stop": false, "stopping_word": ""}))
            .expect("event");
        assert_eq!(chunk.stopping_word, None);

        let chunk = parse_event(json!({"content": "", "stop": true, "stopping_word": "\n"}))
            .expect("event");
        assert_eq!(chunk.stopping_word.as_deref(), Some("\n"));
    }

    #[test]
    fn probabilities_are_passed_through() {
        let chunk = parse_event(json!({
            "content": " the",
            "completion_probabilities": [
                {"content": " the", "probs": [{"tok_str": " the", "prob": 0.75}, {"tok_str": " a", "prob": 0.25}]}
            ]
        }))
        .expect("event");
        let probs = chunk.token_probabilities.expect("probabilities");
        assert_eq!(probs[0].probs[1].tok_str, " a");
    }

    #[tokio::test]
    async fn token_count_counts_tokens() {
        let server = MockServer::start(vec![MockResponse::json(json!({"tokens": [1, 2, 3]}))]).await;
        let backend = LlamaCppBackend::new(test_client());
        let config = BackendConfig::new(BackendKind::LlamaCpp, &server.endpoint);

        let count = backend
            .token_count("hello", &config, &CancellationToken::new())
            .await
            .expect("count");

        assert_eq!(count, 3);
        let requests = server.requests().await;
        assert_eq!(requests[0].path, "/tokenize");
        assert_eq!(requests[0].json(), json!({"content": "hello"}));
    }

    #[tokio::test]
    async fn stream_completion_yields_content() {
        let events = concat!(
            "data: {\"content\":\"Hel\",\"stop\":false}\n\n",
            "data: {\"content\":\"lo\",\"stop\":false}\n\n",
            "data: {\"content\":\"\",\"stop\":true,\"stopping_word\":\"\"}\n\n",
        );
        let server = MockServer::start(vec![MockResponse::events(events)]).await;
        let backend = LlamaCppBackend::new(test_client());
        let config = BackendConfig::new(BackendKind::LlamaCpp, &server.endpoint);
        let request = CompletionRequest::new("Say", SamplingOptions::default());

        let stream = backend
            .stream_completion(&request, &config, CancellationToken::new())
            .await
            .expect("stream");
        let chunks: Vec<_> = stream.collect().await;

        let text: String = chunks
            .into_iter()
            .map(|chunk| chunk.expect("chunk").content)
            .collect();
        assert_eq!(text, "Hello");
        let requests = server.requests().await;
        assert_eq!(requests[0].method, "POST");
        assert_eq!(requests[0].path, "/completion");
        assert_eq!(requests[0].json()["prompt"], "Say");
    }

    #[tokio::test]
    async fn http_errors_surface_status() {
        let server = MockServer::start(vec![MockResponse::status(503, "loading model")]).await;
        let backend = LlamaCppBackend::new(test_client());
        let config = BackendConfig::new(BackendKind::LlamaCpp, &server.endpoint);

        let err = backend
            .token_count("x", &config, &CancellationToken::new())
            .await
            .expect_err("should fail");

        assert_eq!(err.status().map(|s| s.as_u16()), Some(503));
        assert!(err.to_string().contains("loading model"));
    }
}
