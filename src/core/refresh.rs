//! Debounced token-count and model-list refreshes.
//!
//! Each schedule call supersedes the previous refresh of the same kind: the
//! old task is cancelled and its generation retired, so a late result can
//! never overwrite a newer one.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::core::backend::{BackendConfig, BackendError, CompletionBackend};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshKind {
    TokenCount,
    Models,
}

#[derive(Debug, PartialEq)]
pub enum RefreshOutcome {
    TokenCount(usize),
    Models(Vec<String>),
}

#[derive(Debug)]
pub struct RefreshResult {
    pub kind: RefreshKind,
    pub generation: u64,
    pub outcome: Result<RefreshOutcome, BackendError>,
}

#[derive(Default)]
struct Slot {
    generation: u64,
    cancel: Option<CancellationToken>,
}

impl Slot {
    fn supersede(&mut self) -> (u64, CancellationToken) {
        if let Some(previous) = self.cancel.take() {
            previous.cancel();
        }
        self.generation += 1;
        let token = CancellationToken::new();
        self.cancel = Some(token.clone());
        (self.generation, token)
    }
}

pub struct RefreshScheduler {
    delay: Duration,
    token_count: Slot,
    models: Slot,
    tx: mpsc::UnboundedSender<RefreshResult>,
}

impl RefreshScheduler {
    pub fn new(delay: Duration) -> (Self, mpsc::UnboundedReceiver<RefreshResult>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                delay,
                token_count: Slot::default(),
                models: Slot::default(),
                tx,
            },
            rx,
        )
    }

    fn slot_mut(&mut self, kind: RefreshKind) -> &mut Slot {
        match kind {
            RefreshKind::TokenCount => &mut self.token_count,
            RefreshKind::Models => &mut self.models,
        }
    }

    fn slot(&self, kind: RefreshKind) -> &Slot {
        match kind {
            RefreshKind::TokenCount => &self.token_count,
            RefreshKind::Models => &self.models,
        }
    }

    pub fn schedule_token_count(
        &mut self,
        backend: Arc<dyn CompletionBackend>,
        config: BackendConfig,
        text: String,
    ) -> u64 {
        self.schedule(RefreshKind::TokenCount, move |cancel| async move {
            backend
                .token_count(&text, &config, &cancel)
                .await
                .map(RefreshOutcome::TokenCount)
        })
    }

    pub fn schedule_models(
        &mut self,
        backend: Arc<dyn CompletionBackend>,
        config: BackendConfig,
    ) -> u64 {
        self.schedule(RefreshKind::Models, move |cancel| async move {
            backend
                .list_models(&config, &cancel)
                .await
                .map(RefreshOutcome::Models)
        })
    }

    fn schedule<F, Fut>(&mut self, kind: RefreshKind, run: F) -> u64
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<RefreshOutcome, BackendError>> + Send + 'static,
    {
        let delay = self.delay;
        let tx = self.tx.clone();
        let (generation, cancel) = self.slot_mut(kind).supersede();

        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => return,
            }
            let outcome = run(cancel.clone()).await;
            if cancel.is_cancelled() || matches!(&outcome, Err(err) if err.is_cancelled()) {
                debug!(?kind, generation, "Refresh superseded");
                return;
            }
            let _ = tx.send(RefreshResult {
                kind,
                generation,
                outcome,
            });
        });
        generation
    }

    pub fn is_current(&self, kind: RefreshKind, generation: u64) -> bool {
        self.slot(kind).generation == generation
    }

    /// The outcome of `result` if it belongs to the latest refresh of its
    /// kind. Failures are logged and dropped.
    pub fn accept(&self, result: RefreshResult) -> Option<RefreshOutcome> {
        if !self.is_current(result.kind, result.generation) {
            return None;
        }
        match result.outcome {
            Ok(outcome) => Some(outcome),
            Err(err) => {
                debug!(kind = ?result.kind, error = %err, "Refresh failed");
                None
            }
        }
    }

    pub fn cancel_all(&mut self) {
        for kind in [RefreshKind::TokenCount, RefreshKind::Models] {
            if let Some(token) = self.slot_mut(kind).cancel.take() {
                token.cancel();
            }
        }
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::backend::{BackendKind, CompletionRequest, CompletionStream};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingBackend {
        token_calls: AtomicUsize,
    }

    #[async_trait]
    impl CompletionBackend for CountingBackend {
        fn kind(&self) -> BackendKind {
            BackendKind::LlamaCpp
        }

        async fn token_count(
            &self,
            text: &str,
            _config: &BackendConfig,
            _cancel: &CancellationToken,
        ) -> Result<usize, BackendError> {
            self.token_calls.fetch_add(1, Ordering::SeqCst);
            Ok(text.len())
        }

        async fn list_models(
            &self,
            _config: &BackendConfig,
            _cancel: &CancellationToken,
        ) -> Result<Vec<String>, BackendError> {
            Ok(vec!["model-a".into()])
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

    #[tokio::test(start_paused = true)]
    async fn rapid_schedules_collapse_into_one_request() {
        let backend = Arc::new(CountingBackend::default());
        let (mut scheduler, mut results) = RefreshScheduler::new(DEFAULT_DEBOUNCE);
        let config = BackendConfig::default();

        for text in ["a", "ab", "abc"] {
            scheduler.schedule_token_count(backend.clone(), config.clone(), text.to_string());
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        let result = results.recv().await.expect("result");

        assert_eq!(result.generation, 3);
        assert_eq!(scheduler.accept(result), Some(RefreshOutcome::TokenCount(3)));
        assert_eq!(backend.token_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn superseded_results_are_rejected() {
        let backend = Arc::new(CountingBackend::default());
        let (mut scheduler, mut results) = RefreshScheduler::new(DEFAULT_DEBOUNCE);

        let first = scheduler.schedule_models(backend.clone(), BackendConfig::default());
        let result = results.recv().await.expect("result");
        assert_eq!(result.generation, first);

        scheduler.schedule_models(backend, BackendConfig::default());
        assert_eq!(scheduler.accept(result), None);
    }

    #[tokio::test(start_paused = true)]
    async fn kinds_do_not_supersede_each_other() {
        let backend = Arc::new(CountingBackend::default());
        let (mut scheduler, mut results) = RefreshScheduler::new(DEFAULT_DEBOUNCE);

        scheduler.schedule_token_count(backend.clone(), BackendConfig::default(), "xy".into());
        scheduler.schedule_models(backend, BackendConfig::default());

        let mut outcomes = Vec::new();
        for _ in 0..2 {
            let result = results.recv().await.expect("result");
            outcomes.extend(scheduler.accept(result));
        }
        assert!(outcomes.contains(&RefreshOutcome::TokenCount(2)));
        assert!(outcomes.contains(&RefreshOutcome::Models(vec!["model-a".into()])));
    }
}
