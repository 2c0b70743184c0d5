//! Backend adapters.
//!
//! Every supported server speaks a slightly different dialect for the same
//! four operations: count tokens, list models, stream a completion, and
//! abort a running generation. [`CompletionBackend`] is that contract;
//! [`backend_for`] picks the adapter for a [`BackendKind`].

pub mod error;
pub mod hosted;
pub mod http;
pub mod koboldcpp;
pub mod llama_cpp;
pub mod openai;
pub mod options;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::core::document::TokenProbabilities;
pub use error::BackendError;
pub use options::{CompletionRequest, SamplingOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// llama.cpp server.
    #[default]
    LlamaCpp,
    /// KoboldCpp server.
    KoboldCpp,
    /// Any server exposing OpenAI-style `/v1/completions`.
    OpenAiCompatible,
    /// OpenRouter, reached at a fixed address.
    Hosted,
}

impl BackendKind {
    pub const ALL: [BackendKind; 4] = [
        BackendKind::LlamaCpp,
        BackendKind::KoboldCpp,
        BackendKind::OpenAiCompatible,
        BackendKind::Hosted,
    ];

    pub fn id(self) -> &'static str {
        match self {
            BackendKind::LlamaCpp => "llama-cpp",
            BackendKind::KoboldCpp => "kobold-cpp",
            BackendKind::OpenAiCompatible => "open-ai-compatible",
            BackendKind::Hosted => "hosted",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            BackendKind::LlamaCpp => "llama.cpp",
            BackendKind::KoboldCpp => "KoboldCpp",
            BackendKind::OpenAiCompatible => "OpenAI-compatible",
            BackendKind::Hosted => "OpenRouter",
        }
    }

    pub fn default_endpoint(self) -> &'static str {
        match self {
            BackendKind::LlamaCpp => "http://127.0.0.1:8080",
            BackendKind::KoboldCpp => "http://127.0.0.1:5001",
            BackendKind::OpenAiCompatible => "http://127.0.0.1:5000",
            BackendKind::Hosted => hosted::HOSTED_ENDPOINT,
        }
    }

    /// Whether 429 responses mean the account ran out of quota.
    pub fn reports_quota(self) -> bool {
        matches!(self, BackendKind::OpenAiCompatible | BackendKind::Hosted)
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['_', '.', ' '], "-");
        match normalized.as_str() {
            "llama-cpp" | "llamacpp" | "llama" => Ok(BackendKind::LlamaCpp),
            "kobold-cpp" | "koboldcpp" | "kobold" => Ok(BackendKind::KoboldCpp),
            "open-ai-compatible" | "openai-compatible" | "openai" => {
                Ok(BackendKind::OpenAiCompatible)
            }
            "hosted" | "openrouter" => Ok(BackendKind::Hosted),
            _ => Err(format!(
                "Unknown backend '{s}'. Expected one of: {}",
                BackendKind::ALL.map(BackendKind::id).join(", ")
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    pub kind: BackendKind,
    pub endpoint: String,
    /// Never persisted with sessions; loaded from the keyring at runtime.
    #[serde(skip)]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl BackendConfig {
    pub fn new(kind: BackendKind, endpoint: impl Into<String>) -> Self {
        Self {
            kind,
            endpoint: endpoint.into(),
            api_key: None,
            model: None,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub(crate) fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        let kind = BackendKind::default();
        Self::new(kind, kind.default_endpoint())
    }
}

/// One increment of generated text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionChunk {
    pub content: String,
    /// Set when generation stopped because this stop sequence was produced.
    pub stopping_word: Option<String>,
    pub token_probabilities: Option<Vec<TokenProbabilities>>,
}

impl CompletionChunk {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }
}

pub type CompletionStream = BoxStream<'static, Result<CompletionChunk, BackendError>>;

/// The operations every backend adapter provides. Adapters that cannot
/// support an operation return an empty result instead of failing.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    async fn token_count(
        &self,
        text: &str,
        config: &BackendConfig,
        cancel: &CancellationToken,
    ) -> Result<usize, BackendError>;

    async fn list_models(
        &self,
        config: &BackendConfig,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, BackendError>;

    async fn stream_completion(
        &self,
        request: &CompletionRequest,
        config: &BackendConfig,
        cancel: CancellationToken,
    ) -> Result<CompletionStream, BackendError>;

    async fn abort(
        &self,
        config: &BackendConfig,
        cancel: &CancellationToken,
    ) -> Result<(), BackendError>;
}

pub fn backend_for(kind: BackendKind, client: reqwest::Client) -> Arc<dyn CompletionBackend> {
    match kind {
        BackendKind::LlamaCpp => Arc::new(llama_cpp::LlamaCppBackend::new(client)),
        BackendKind::KoboldCpp => Arc::new(koboldcpp::KoboldCppBackend::new(client)),
        BackendKind::OpenAiCompatible => Arc::new(openai::OpenAiBackend::new(client)),
        BackendKind::Hosted => Arc::new(hosted::HostedBackend::new(client)),
    }
}

#[cfg(test)]
pub(crate) mod test_server;
