//! KoboldCpp adapter.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::http::{completion_stream, endpoint_url, get, post_json, read_json};
use super::options::{apply_predict_default, KOBOLDCPP_RENAMES};
use super::{
    BackendConfig, BackendError, BackendKind, CompletionBackend, CompletionChunk,
    CompletionRequest, CompletionStream,
};

pub struct KoboldCppBackend {
    client: reqwest::Client,
}

impl KoboldCppBackend {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[derive(Deserialize)]
struct TokenCountResponse {
    value: usize,
}

#[derive(Deserialize)]
struct ModelResponse {
    result: String,
}

#[derive(Deserialize)]
struct KoboldEvent {
    #[serde(default)]
    token: String,
}

pub(crate) fn completion_body(request: &CompletionRequest) -> Value {
    let mut options = request.canonical_options();
    apply_predict_default(&mut options);
    let mut body = KOBOLDCPP_RENAMES.to_backend(options);
    body.insert("prompt".into(), Value::from(request.prompt.as_str()));
    Value::Object(body)
}

fn parse_event(event: Value) -> Result<CompletionChunk, BackendError> {
    let event: KoboldEvent = serde_json::from_value(event).map_err(|err| BackendError::Api {
        message: format!("Unexpected KoboldCpp event: {err}"),
    })?;
    Ok(CompletionChunk::text(event.token))
}

#[async_trait]
impl CompletionBackend for KoboldCppBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::KoboldCpp
    }

    async fn token_count(
        &self,
        text: &str,
        config: &BackendConfig,
        cancel: &CancellationToken,
    ) -> Result<usize, BackendError> {
        let url = endpoint_url(&config.endpoint, "api/extra/tokencount");
        let response = post_json(
            &self.client,
            &url,
            config.api_key(),
            &json!({ "prompt": text }),
            cancel,
        )
        .await?;
        let body: TokenCountResponse = read_json(response, cancel).await?;
        Ok(body.value)
    }

    async fn list_models(
        &self,
        config: &BackendConfig,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, BackendError> {
        let url = endpoint_url(&config.endpoint, "api/v1/model");
        let response = get(&self.client, &url, config.api_key(), cancel).await?;
        let body: ModelResponse = read_json(response, cancel).await?;
        Ok(vec![body.result])
    }

    async fn stream_completion(
        &self,
        request: &CompletionRequest,
        config: &BackendConfig,
        cancel: CancellationToken,
    ) -> Result<CompletionStream, BackendError> {
        let url = endpoint_url(&config.endpoint, "api/extra/generate/stream");
        let response = post_json(
            &self.client,
            &url,
            config.api_key(),
            &completion_body(request),
            &cancel,
        )
        .await?;
        debug!("KoboldCpp stream opened");
        Ok(completion_stream(response, cancel, parse_event))
    }

    async fn abort(
        &self,
        config: &BackendConfig,
        cancel: &CancellationToken,
    ) -> Result<(), BackendError> {
        let url = endpoint_url(&config.endpoint, "api/extra/abort");
        post_json(&self.client, &url, config.api_key(), &json!({}), cancel).await?;
        Ok(())
    }
}
