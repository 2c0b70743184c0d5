//! Chunked prompt document
//!
//! The prompt is kept as an ordered list of chunks tagged with who wrote
//! them. Joining every chunk's content in order always yields the text the
//! user sees.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    User,
    Machine,
}

/// One alternative token the backend considered at a position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenAlternative {
    pub tok_str: String,
    pub prob: f64,
}

/// Probability metadata for a single generated token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenProbabilities {
    pub content: String,
    #[serde(default)]
    pub probs: Vec<TokenAlternative>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptChunk {
    #[serde(rename = "type")]
    pub kind: ChunkKind,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_probabilities: Option<Vec<TokenProbabilities>>,
}

impl PromptChunk {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            kind: ChunkKind::User,
            content: content.into(),
            token_probabilities: None,
        }
    }

    pub fn machine(content: impl Into<String>) -> Self {
        Self {
            kind: ChunkKind::Machine,
            content: content.into(),
            token_probabilities: None,
        }
    }

    pub fn with_probabilities(mut self, probabilities: Vec<TokenProbabilities>) -> Self {
        self.token_probabilities = Some(probabilities);
        self
    }

    pub fn is_machine(&self) -> bool {
        self.kind == ChunkKind::Machine
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PromptDocument {
    chunks: Vec<PromptChunk>,
}

impl PromptDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_chunks(chunks: Vec<PromptChunk>) -> Self {
        Self { chunks }
    }

    pub fn chunks(&self) -> &[PromptChunk] {
        &self.chunks
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// The full prompt text.
    pub fn text(&self) -> String {
        let capacity = self.chunks.iter().map(|c| c.content.len()).sum();
        let mut text = String::with_capacity(capacity);
        for chunk in &self.chunks {
            text.push_str(&chunk.content);
        }
        text
    }

    /// Appends a whole chunk. This is the only way streamed output enters the
    /// document, so a chunk is never observed half-written.
    pub fn append(&mut self, chunk: PromptChunk) {
        self.chunks.push(chunk);
    }

    pub fn extend(&mut self, chunks: Vec<PromptChunk>) {
        self.chunks.extend(chunks);
    }

    /// Removes and returns every chunk at or after `len`.
    pub fn split_off(&mut self, len: usize) -> Vec<PromptChunk> {
        if len >= self.chunks.len() {
            return Vec::new();
        }
        self.chunks.split_off(len)
    }

    pub fn truncate(&mut self, len: usize) {
        self.chunks.truncate(len);
    }

    pub(crate) fn replace(&mut self, chunks: Vec<PromptChunk>) {
        self.chunks = chunks;
    }

    pub fn into_chunks(self) -> Vec<PromptChunk> {
        self.chunks
    }
}

impl From<Vec<PromptChunk>> for PromptDocument {
    fn from(chunks: Vec<PromptChunk>) -> Self {
        Self::from_chunks(chunks)
    }
}
