//! Keeps a session in step with a text file while it is being edited.

use std::error::Error;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::debug;

use crate::cli::predict::resolve_backend;
use crate::cli::sessions::{load_session, open_store};
use crate::cli::BackendOverrides;
use crate::core::backend::http::shared_client;
use crate::core::backend::{backend_for, BackendConfig, CompletionBackend};
use crate::core::config::{path_display, Config};
use crate::core::controller::CompletionController;
use crate::core::refresh::{RefreshOutcome, RefreshResult, RefreshScheduler};
use crate::core::session::{Session, SessionId, SessionStore, SessionStoreError};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Reconciles file contents into a session and schedules a debounced token
/// count of the resulting context after every change.
pub(crate) struct SessionWatch<S> {
    id: SessionId,
    store: S,
    session: Session,
    controller: CompletionController,
    backend: Arc<dyn CompletionBackend>,
    backend_config: BackendConfig,
    scheduler: RefreshScheduler,
    last_text: Option<String>,
}

impl<S: SessionStore> SessionWatch<S> {
    pub(crate) fn new(
        id: SessionId,
        store: S,
        session: Session,
        backend: Arc<dyn CompletionBackend>,
        backend_config: BackendConfig,
        debounce: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<RefreshResult>) {
        let (scheduler, results) = RefreshScheduler::new(debounce);
        let controller = session.controller();
        (
            Self {
                id,
                store,
                session,
                controller,
                backend,
                backend_config,
                scheduler,
                last_text: None,
            },
            results,
        )
    }

    /// Applies `text` if it differs from what was last seen. Returns whether
    /// the stored session changed.
    pub(crate) fn sync(&mut self, text: &str) -> Result<bool, SessionStoreError> {
        if self.last_text.as_deref() == Some(text) {
            return Ok(false);
        }
        self.last_text = Some(text.to_string());

        let summary = self.controller.edit_text(text);
        if summary.changed {
            self.session.update_from(&self.controller);
            self.store.put(self.id, &self.session)?;
        }

        let prompt = self.controller.assembled_context().to_string();
        let generation = self.scheduler.schedule_token_count(
            Arc::clone(&self.backend),
            self.backend_config.clone(),
            prompt,
        );
        debug!(generation, changed = summary.changed, "Scheduled token count");
        Ok(summary.changed)
    }

    /// The token count carried by `result` if it is the latest one.
    pub(crate) fn token_count(&self, result: RefreshResult) -> Option<usize> {
        match self.scheduler.accept(result)? {
            RefreshOutcome::TokenCount(count) => Some(count),
            RefreshOutcome::Models(_) => None,
        }
    }
}

/// Polls `file` until the process is interrupted.
pub async fn watch_session(
    id: SessionId,
    file: &Path,
    overrides: &BackendOverrides,
) -> Result<(), Box<dyn Error>> {
    let config = Config::load()?;
    let store = open_store(&config)?;
    let session = load_session(&store, id)?;
    let backend_config = resolve_backend(session.backend.clone(), overrides)?;
    let backend = backend_for(backend_config.kind, shared_client());

    let (mut watch, mut results) = SessionWatch::new(
        id,
        store,
        session,
        backend,
        backend_config,
        config.refresh_debounce(),
    );

    println!(
        "👀 Watching {} for session {id}. Press Ctrl-C to stop.",
        path_display(file)
    );
    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    loop {
        tokio::select! {
            _ = ticker.tick() => match fs::read_to_string(file) {
                Ok(text) => {
                    if watch.sync(&text)? {
                        println!("✅ Updated session {id}");
                    }
                }
                Err(err) => debug!(error = %err, "Watched file unreadable"),
            },
            Some(result) = results.recv() => {
                if let Some(count) = watch.token_count(result) {
                    println!("{count} tokens");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_util::sync::CancellationToken;

    use crate::core::backend::{BackendError, BackendKind, CompletionRequest, CompletionStream};
    use crate::core::refresh::DEFAULT_DEBOUNCE;
    use crate::core::session::MemorySessionStore;

    /// Counts characters instead of tokens.
    #[derive(Default)]
    struct CharCounter {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CompletionBackend for CharCounter {
        fn kind(&self) -> BackendKind {
            BackendKind::LlamaCpp
        }

        async fn token_count(
            &self,
            text: &str,
            _config: &BackendConfig,
            _cancel: &CancellationToken,
        ) -> Result<usize, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(text.chars().count())
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
            _request: &CompletionRequest,
            _config: &BackendConfig,
            _cancel: CancellationToken,
        ) -> Result<CompletionStream, BackendError> {
            Err(BackendError::Api {
                message: "unused".into(),
            })
        }

        async fn abort(
            &self,
            _config: &BackendConfig,
            _cancel: &CancellationToken,
        ) -> Result<(), BackendError> {
            Ok(())
        }
    }

    fn watch_with(
        backend: Arc<CharCounter>,
    ) -> (
        SessionWatch<MemorySessionStore>,
        mpsc::UnboundedReceiver<RefreshResult>,
    ) {
        let session = Session::new("draft", &Config::default());
        let mut store = MemorySessionStore::new();
        store.put(1, &session).expect("put");
        SessionWatch::new(
            1,
            store,
            session,
            backend,
            BackendConfig::default(),
            DEFAULT_DEBOUNCE,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_edits_are_saved_and_counted_once() {
        let backend = Arc::new(CharCounter::default());
        let (mut watch, mut results) = watch_with(Arc::clone(&backend));

        assert!(watch.sync("Hello").expect("sync"));
        assert!(!watch.sync("Hello").expect("sync"));
        assert!(watch.sync("Hello there").expect("sync"));

        let stored = watch.store.get(1).expect("get").expect("session");
        assert_eq!(stored.document.text(), "Hello there");

        let result = results.recv().await.expect("result");
        assert_eq!(watch.token_count(result), Some(11));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unchanged_file_still_gets_an_initial_count() {
        let backend = Arc::new(CharCounter::default());
        let (mut watch, mut results) = watch_with(backend);

        assert!(!watch.sync("").expect("sync"));

        let result = results.recv().await.expect("result");
        assert_eq!(watch.token_count(result), Some(0));
    }
}
