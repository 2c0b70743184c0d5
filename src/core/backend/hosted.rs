//! OpenRouter adapter. The endpoint is fixed and the request carries only
//! the fields the hosted API accepts for every model.

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::http::{completion_stream, endpoint_url, get, post_json, read_json};
use super::openai::{parse_event, ModelsResponse};
use super::options::{DEFAULT_PREDICT_LIMIT, UNLIMITED_PREDICT};
use super::{
    BackendConfig, BackendError, BackendKind, CompletionBackend, CompletionRequest,
    CompletionStream,
};

pub const HOSTED_ENDPOINT: &str = "https://openrouter.ai/api";

pub struct HostedBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HostedBackend {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            base_url: HOSTED_ENDPOINT.to_string(),
        }
    }

    #[cfg(test)]
    fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

pub(crate) fn completion_body(request: &CompletionRequest, model: Option<&str>) -> Value {
    let max_tokens = match request.options.n_predict {
        UNLIMITED_PREDICT => DEFAULT_PREDICT_LIMIT,
        limit => limit,
    };
    json!({
        "model": model.unwrap_or_default(),
        "prompt": request.prompt,
        "max_tokens": max_tokens,
        "stream": true,
    })
}

#[async_trait]
impl CompletionBackend for HostedBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Hosted
    }

    async fn token_count(
        &self,
        _text: &str,
        _config: &BackendConfig,
        _cancel: &CancellationToken,
    ) -> Result<usize, BackendError> {
        Ok(0)
    }

    async fn list_models(
        &self,
        config: &BackendConfig,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, BackendError> {
        let url = endpoint_url(&self.base_url, "v1/models");
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
        let url = endpoint_url(&self.base_url, "v1/completions");
        let body = completion_body(request, config.model.as_deref());
        let response = post_json(&self.client, &url, config.api_key(), &body, &cancel).await?;
        debug!("OpenRouter stream opened");
        Ok(completion_stream(response, cancel, |event| parse_event(event, 0)))
    }

    async fn abort(
        &self,
        _config: &BackendConfig,
        _cancel: &CancellationToken,
    ) -> Result<(), BackendError> {
        Ok(())
    }
}
