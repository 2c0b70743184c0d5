//! Adapter for servers that expose the OpenAI completions API, including
//! text-generation-webui and TabbyAPI style extensions for token counting
//! and stopping generation.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::error::error_summary;
use super::http::{completion_stream, endpoint_url, get, post_json, read_json};
use super::options::{apply_predict_default, OPENAI_RENAMES};
use super::{
    BackendConfig, BackendError, BackendKind, CompletionBackend, CompletionChunk,
    CompletionRequest, CompletionStream,
};
use crate::core::document::{TokenAlternative, TokenProbabilities};

/// Upper bound on alternatives kept per token.
pub const MAX_ALTERNATIVES: usize = 10;

const TOKEN_COUNT_PATHS: [&str; 2] = ["v1/internal/token-count", "v1/token/encode"];

pub struct OpenAiBackend {
    client: reqwest::Client,
}

impl OpenAiBackend {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[derive(Deserialize)]
struct LengthResponse {
    length: usize,
}

#[derive(Deserialize)]
pub(crate) struct ModelsResponse {
    #[serde(default)]
    data: Vec<ModelInfo>,
}

#[derive(Deserialize)]
struct ModelInfo {
    id: String,
}

impl ModelsResponse {
    pub(crate) fn into_ids(self) -> Vec<String> {
        self.data.into_iter().map(|model| model.id).collect()
    }
}

#[derive(Deserialize)]
struct CompletionEvent {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    #[serde(default)]
    text: String,
    #[serde(default)]
    logprobs: Option<Logprobs>,
}

#[derive(Deserialize)]
struct Logprobs {
    #[serde(default)]
    tokens: Vec<String>,
    #[serde(default)]
    top_logprobs: Vec<Option<Map<String, Value>>>,
}

pub(crate) fn completion_body(request: &CompletionRequest, model: Option<&str>) -> Value {
    let mut options = request.canonical_options();
    apply_predict_default(&mut options);
    let mut body = OPENAI_RENAMES.to_backend(options);
    if let Some(model) = model {
        body.insert("model".into(), Value::from(model));
    }
    body.insert("prompt".into(), Value::from(request.prompt.as_str()));
    body.insert("stream".into(), Value::Bool(true));
    Value::Object(body)
}

/// Converts an OpenAI-shaped completion event, keeping at most
/// `min(n_probs, MAX_ALTERNATIVES)` alternatives per token.
pub(crate) fn parse_event(event: Value, n_probs: u32) -> Result<CompletionChunk, BackendError> {
    if event.get("error").is_some() {
        let message = error_summary(&event).unwrap_or_else(|| event.to_string());
        return Err(BackendError::Api { message });
    }

    let event: CompletionEvent = serde_json::from_value(event).map_err(|err| BackendError::Api {
        message: format!("Unexpected completion event: {err}"),
    })?;
    let Some(choice) = event.choices.into_iter().next() else {
        return Ok(CompletionChunk::default());
    };

    let cap = (n_probs as usize).min(MAX_ALTERNATIVES);
    let token_probabilities = choice
        .logprobs
        .filter(|_| cap > 0)
        .map(|logprobs| convert_logprobs(logprobs, cap))
        .filter(|probs| !probs.is_empty());

    Ok(CompletionChunk {
        content: choice.text,
        stopping_word: None,
        token_probabilities,
    })
}

fn convert_logprobs(logprobs: Logprobs, cap: usize) -> Vec<TokenProbabilities> {
    logprobs
        .top_logprobs
        .into_iter()
        .enumerate()
        .filter_map(|(index, top)| {
            let mut probs: Vec<TokenAlternative> = top?
                .into_iter()
                .filter_map(|(tok_str, logprob)| {
                    logprob.as_f64().map(|lp| TokenAlternative {
                        tok_str,
                        prob: lp.exp(),
                    })
                })
                .collect();
            probs.sort_by(|a, b| b.prob.total_cmp(&a.prob));
            probs.truncate(cap);
            let content = logprobs
                .tokens
                .get(index)
                .cloned()
                .or_else(|| probs.first().map(|alt| alt.tok_str.clone()))?;
            Some(TokenProbabilities { content, probs })
        })
        .collect()
}

#[async_trait]
impl CompletionBackend for OpenAiBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::OpenAiCompatible
    }

    async fn token_count(
        &self,
        text: &str,
        config: &BackendConfig,
        cancel: &CancellationToken,
    ) -> Result<usize, BackendError> {
        let body = json!({ "text": text });
        for path in TOKEN_COUNT_PATHS {
            let url = endpoint_url(&config.endpoint, path);
            match post_json(&self.client, &url, config.api_key(), &body, cancel).await {
                Ok(response) => {
                    let body: LengthResponse = read_json(response, cancel).await?;
                    return Ok(body.length);
                }
                Err(err) if err.is_unsupported_endpoint() => {
                    debug!(path, "Token count endpoint unsupported");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(0)
    }

    async fn list_models(
        &self,
        config: &BackendConfig,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, BackendError> {
        let url = endpoint_url(&config.endpoint, "v1/models");
        let response = get(&self.client, &url, config.api_key(), cancel).await?;
        let body: ModelsResponse = read_json(response, cancel).await?;
        Ok(body.into_ids())
    }

    async fn stream_completion(
        &self,
        request: &CompletionRequest,
        config: &BackendConfig,
        cancel: CancellationToken,
    ) -> Result<CompletionStream, BackendError> {
        let url = endpoint_url(&config.endpoint, "v1/completions");
        let body = completion_body(request, config.model.as_deref());
        let response = post_json(&self.client, &url, config.api_key(), &body, &cancel).await?;
        debug!("OpenAI-compatible stream opened");
        let n_probs = request.options.n_probs;
        Ok(completion_stream(response, cancel, move |event| {
            parse_event(event, n_probs)
        }))
    }

    async fn abort(
        &self,
        config: &BackendConfig,
        cancel: &CancellationToken,
    ) -> Result<(), BackendError> {
        let url = endpoint_url(&config.endpoint, "v1/internal/stop-generation");
        post_json(&self.client, &url, config.api_key(), &json!({}), cancel).await?;
        Ok(())
    }
}
