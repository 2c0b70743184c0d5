//! Persisted prompt sessions.
//!
//! A [`SessionStore`] is a plain key-value store of sessions by numeric id
//! plus a monotonically increasing id counter. [`FileSessionStore`] keeps one
//! JSON file per session; [`MemorySessionStore`] keeps everything in a map.

mod file;
mod memory;

pub use file::FileSessionStore;
pub use memory::MemorySessionStore;

use std::error::Error;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::backend::{BackendConfig, SamplingOptions};
use crate::core::config::{path_display, Config};
use crate::core::context::PromptContext;
use crate::core::controller::CompletionController;
use crate::core::document::PromptDocument;

pub type SessionId = u64;

pub const DEFAULT_SESSION_NAME: &str = "New Session";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub document: PromptDocument,
    #[serde(default)]
    pub context: PromptContext,
    #[serde(default)]
    pub options: SamplingOptions,
    /// Stop sequences as the user typed them (a JSON list of strings).
    #[serde(default)]
    pub stop_text: String,
    #[serde(default)]
    pub backend: BackendConfig,
}

impl Session {
    /// A blank session using the configured backend and context settings.
    pub fn new(name: impl Into<String>, config: &Config) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            created_at: now,
            updated_at: now,
            document: PromptDocument::new(),
            context: PromptContext {
                settings: config.assembly_settings(),
                ..PromptContext::default()
            },
            options: SamplingOptions::default(),
            stop_text: String::new(),
            backend: config.backend_config(),
        }
    }

    pub fn context_length(&self) -> u32 {
        self.context.settings.context_length
    }

    /// A controller positioned on this session's document and settings.
    pub fn controller(&self) -> CompletionController {
        let mut controller = CompletionController::new(
            self.document.clone(),
            self.context.clone(),
            self.backend.clone(),
        );
        controller.set_options(self.options.clone());
        if !self.stop_text.is_empty() {
            controller.set_stop_text(self.stop_text.clone());
        }
        controller
    }

    /// Copies the controller's document and settings back into the session.
    pub fn update_from(&mut self, controller: &CompletionController) {
        self.document = controller.document().clone();
        self.context = controller.context().clone();
        self.options = controller.options().clone();
        self.stop_text = controller.stop_text().to_string();
        self.backend = controller.backend().clone();
        self.touch();
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// What a store lists without loading every document in full.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub id: SessionId,
    pub name: String,
    pub updated_at: DateTime<Utc>,
}

impl SessionSummary {
    pub fn of(id: SessionId, session: &Session) -> Self {
        Self {
            id,
            name: session.name.clone(),
            updated_at: session.updated_at,
        }
    }
}

#[derive(Debug)]
pub enum SessionStoreError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    Serialize(serde_json::Error),
}

impl fmt::Display for SessionStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStoreError::Io { path, source } => {
                write!(f, "Failed to access {}: {}", path_display(path), source)
            }
            SessionStoreError::Parse { path, source } => {
                write!(
                    f,
                    "Failed to parse session at {}: {}",
                    path_display(path),
                    source
                )
            }
            SessionStoreError::Serialize(source) => {
                write!(f, "Failed to serialize session: {source}")
            }
        }
    }
}

impl Error for SessionStoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SessionStoreError::Io { source, .. } => Some(source),
            SessionStoreError::Parse { source, .. } => Some(source),
            SessionStoreError::Serialize(source) => Some(source),
        }
    }
}

pub trait SessionStore {
    fn get(&self, id: SessionId) -> Result<Option<Session>, SessionStoreError>;

    fn put(&mut self, id: SessionId, session: &Session) -> Result<(), SessionStoreError>;

    /// Returns false when no session had this id.
    fn delete(&mut self, id: SessionId) -> Result<bool, SessionStoreError>;

    /// Summaries ordered by id.
    fn list(&self) -> Result<Vec<SessionSummary>, SessionStoreError>;

    /// Reserves a fresh id. Ids are never handed out twice by the same store.
    fn next_id(&mut self) -> Result<SessionId, SessionStoreError>;

    /// Stores `session` under a fresh id and returns the id.
    fn create(&mut self, session: &Session) -> Result<SessionId, SessionStoreError> {
        let id = self.next_id()?;
        self.put(id, session)?;
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::backend::BackendKind;
    use crate::core::document::PromptChunk;

    #[test]
    fn new_session_takes_backend_and_context_from_config() {
        let config = Config {
            backend: Some(BackendKind::KoboldCpp),
            context_length: Some(8192),
            ..Default::default()
        };
        let session = Session::new("draft", &config);

        assert_eq!(session.name, "draft");
        assert_eq!(session.backend.kind, BackendKind::KoboldCpp);
        assert_eq!(session.context_length(), 8192);
        assert!(session.document.is_empty());
        assert_eq!(session.created_at, session.updated_at);
    }

    #[test]
    fn controller_round_trip_keeps_edits_and_stop_text() {
        let mut session = Session::new("s", &Config::default());
        session.document = PromptDocument::from_chunks(vec![PromptChunk::user("Once upon")]);
        session.stop_text = "[\"\\n\\n\"]".to_string();

        let mut controller = session.controller();
        assert_eq!(controller.stop_text(), session.stop_text);
        assert!(controller.stop_sequence_error().is_none());

        controller.edit_text("Once upon a time");
        session.update_from(&controller);

        assert_eq!(session.document.text(), "Once upon a time");
        assert_eq!(session.stop_text, "[\"\\n\\n\"]");
        assert!(session.updated_at >= session.created_at);
    }

    #[test]
    fn session_json_omits_api_key() {
        let mut session = Session::new("s", &Config::default());
        session.backend = session.backend.clone().with_api_key("sk-secret");

        let json = serde_json::to_string(&session).expect("serialize");
        assert!(!json.contains("sk-secret"));

        let restored: Session = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(restored.backend.api_key(), None);
        assert_eq!(restored.backend.endpoint, session.backend.endpoint);
    }

    #[test]
    fn create_uses_fresh_ids() {
        let mut store = MemorySessionStore::new();
        let session = Session::new("a", &Config::default());
        let first = store.create(&session).expect("create");
        let second = store.create(&session).expect("create");
        assert_ne!(first, second);
        assert_eq!(store.list().expect("list").len(), 2);
    }
}
