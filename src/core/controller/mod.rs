//! Prediction orchestration.
//!
//! [`CompletionController`] owns the document and its undo history. Its
//! methods are synchronous and return [`ControllerCommand`]s; the
//! [`executor::CommandExecutor`] runs those on tokio tasks and reports back
//! with [`ControllerEvent`]s, which are fed to
//! [`CompletionController::handle_event`]. Events from superseded streams or
//! cooldowns carry stale ids and are ignored.

pub mod errors;
pub mod executor;

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::backend::options::{parse_stop_sequences, StopSequenceError};
use crate::core::backend::{
    BackendConfig, BackendError, CompletionChunk, CompletionRequest, SamplingOptions,
};
use crate::core::context::{AssemblyCache, PromptContext};
use crate::core::document::{PromptChunk, PromptDocument};
use crate::core::edit::{ChunkEditModel, EditSummary};
use crate::core::history::UndoHistory;
use crate::core::observer::{Observers, StateChange, StateField};
pub use errors::{classify, CompletionFailure, PredictRejected};

/// Pause between aborting a generation and starting the next one. Some
/// servers emit corrupted output when a request follows an abort directly.
pub const ABORT_COOLDOWN: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Predicting,
    /// A prediction was interrupted by a new request that waits for the
    /// cooldown.
    CancelPending,
}

/// Everything a task needs to run one prediction.
#[derive(Debug, Clone)]
pub struct PredictionParams {
    pub backend: BackendConfig,
    pub request: CompletionRequest,
    pub cancel: CancellationToken,
    pub stream_id: u64,
}

#[derive(Debug)]
pub enum ControllerCommand {
    SpawnPrediction(PredictionParams),
    /// Abort the backend's generation, wait [`ABORT_COOLDOWN`], then report
    /// `CooldownElapsed { ticket }`.
    AbortThenRetry { backend: BackendConfig, ticket: u64 },
    /// Wait [`ABORT_COOLDOWN`], then report `CooldownElapsed { ticket }`.
    Cooldown { ticket: u64 },
    Abort { backend: BackendConfig },
    /// Yield to the scheduler, then report `PredictRequested`.
    DeferredPredict,
}

#[derive(Debug)]
pub enum ControllerEvent {
    TokenCount { stream_id: u64, count: usize },
    Chunk { stream_id: u64, chunk: CompletionChunk },
    Failed { stream_id: u64, error: BackendError },
    Finished { stream_id: u64 },
    CooldownElapsed { ticket: u64 },
    PredictRequested,
}

pub type EventSender = mpsc::UnboundedSender<ControllerEvent>;

struct ActiveStream {
    id: u64,
    cancel: CancellationToken,
    appended: bool,
}

pub struct CompletionController {
    editor: ChunkEditModel,
    history: UndoHistory,
    context: PromptContext,
    cache: AssemblyCache,
    backend: BackendConfig,
    options: SamplingOptions,
    stop_text: String,
    stop_error: Option<StopSequenceError>,
    state: ControllerState,
    error: Option<CompletionFailure>,
    token_count: Option<usize>,
    next_stream_id: u64,
    active: Option<ActiveStream>,
    cooldown_ticket: u64,
    deferred_predict: bool,
    observers: Observers,
}

impl CompletionController {
    pub fn new(document: PromptDocument, context: PromptContext, backend: BackendConfig) -> Self {
        Self {
            editor: ChunkEditModel::new(document),
            history: UndoHistory::new(),
            context,
            cache: AssemblyCache::new(),
            backend,
            options: SamplingOptions::default(),
            stop_text: String::new(),
            stop_error: None,
            state: ControllerState::Idle,
            error: None,
            token_count: None,
            next_stream_id: 0,
            active: None,
            cooldown_ticket: 0,
            deferred_predict: false,
            observers: Observers::new(),
        }
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == ControllerState::Idle
    }

    /// Idle with no deferred predict waiting to be delivered.
    pub fn is_settled(&self) -> bool {
        self.is_idle() && !self.deferred_predict
    }

    pub fn document(&self) -> &PromptDocument {
        self.editor.document()
    }

    pub fn text(&self) -> String {
        self.editor.text()
    }

    pub fn history(&self) -> &UndoHistory {
        &self.history
    }

    pub fn context(&self) -> &PromptContext {
        &self.context
    }

    pub fn backend(&self) -> &BackendConfig {
        &self.backend
    }

    pub fn options(&self) -> &SamplingOptions {
        &self.options
    }

    pub fn stop_text(&self) -> &str {
        &self.stop_text
    }

    pub fn error(&self) -> Option<&CompletionFailure> {
        self.error.as_ref()
    }

    pub fn token_count(&self) -> Option<usize> {
        self.token_count
    }

    pub fn stop_sequence_error(&self) -> Option<&StopSequenceError> {
        self.stop_error.as_ref()
    }

    pub fn subscribe(&mut self, field: StateField) -> mpsc::UnboundedReceiver<StateChange> {
        self.observers.subscribe(field)
    }

    pub fn set_context(&mut self, context: PromptContext) {
        self.context = context;
    }

    pub fn set_backend(&mut self, backend: BackendConfig) {
        self.backend = backend;
    }

    pub fn set_options(&mut self, options: SamplingOptions) {
        self.options = options;
    }

    /// Stores the raw stop-sequence text. Invalid text is kept so the user
    /// can fix it, and blocks predictions until then.
    pub fn set_stop_text(&mut self, text: impl Into<String>) {
        self.stop_text = text.into();
        self.stop_error = parse_stop_sequences(&self.stop_text).err();
        let message = self.stop_error.as_ref().map(ToString::to_string);
        self.observers.notify(StateChange::StopSequences(message));
    }

    pub fn clear_error(&mut self) {
        if self.error.take().is_some() {
            self.observers.notify(StateChange::Error(None));
        }
    }

    pub fn set_models(&mut self, models: Vec<String>) {
        self.observers.notify(StateChange::Models(models));
    }

    pub fn set_token_count(&mut self, count: usize) {
        self.token_count = Some(count);
        self.observers.notify(StateChange::TokenCount(count));
    }

    /// The prompt that a prediction would send right now.
    pub fn assembled_context(&mut self) -> &str {
        let inputs = self.context.inputs(self.editor.document().chunks());
        self.cache.assemble(&inputs)
    }

    /// Applies the user's edited text to the document.
    pub fn edit_text(&mut self, new_text: &str) -> EditSummary {
        let summary = self.editor.reconcile(new_text, &mut self.history);
        if summary.changed {
            self.notify_document();
        }
        summary
    }

    pub fn request_predict(&mut self) -> Result<Vec<ControllerCommand>, PredictRejected> {
        if let Some(err) = &self.stop_error {
            return Err(err.into());
        }
        match self.state {
            ControllerState::Idle => Ok(vec![self.begin_prediction()]),
            ControllerState::Predicting => {
                if let Some(active) = self.active.take() {
                    active.cancel.cancel();
                }
                self.cooldown_ticket += 1;
                debug!(ticket = self.cooldown_ticket, "Interrupting prediction for retry");
                self.set_state(ControllerState::CancelPending);
                Ok(vec![ControllerCommand::AbortThenRetry {
                    backend: self.backend.clone(),
                    ticket: self.cooldown_ticket,
                }])
            }
            ControllerState::CancelPending => {
                self.cooldown_ticket += 1;
                debug!(ticket = self.cooldown_ticket, "Superseding pending retry");
                Ok(vec![ControllerCommand::Cooldown {
                    ticket: self.cooldown_ticket,
                }])
            }
        }
    }

    /// Cancels the running prediction, or a pending retry.
    pub fn stop(&mut self) -> Vec<ControllerCommand> {
        match self.state {
            ControllerState::Idle => Vec::new(),
            ControllerState::Predicting => {
                if let Some(active) = self.active.take() {
                    active.cancel.cancel();
                }
                self.set_state(ControllerState::Idle);
                vec![ControllerCommand::Abort {
                    backend: self.backend.clone(),
                }]
            }
            ControllerState::CancelPending => {
                self.cooldown_ticket += 1;
                self.set_state(ControllerState::Idle);
                Vec::new()
            }
        }
    }

    /// Undo is refused while a prediction is running or pending.
    pub fn undo(&mut self) -> bool {
        if !self.is_idle() {
            return false;
        }
        let undone = self.history.undo(self.editor.document_mut());
        if undone {
            self.notify_document();
        }
        undone
    }

    pub fn redo(&mut self) -> bool {
        if !self.is_idle() {
            return false;
        }
        let redone = self.history.redo(self.editor.document_mut());
        if redone {
            self.notify_document();
        }
        redone
    }

    /// Undoes, then predicts again once the executor has yielded.
    pub fn undo_and_retry(&mut self) -> Vec<ControllerCommand> {
        if !self.undo() {
            return Vec::new();
        }
        self.deferred_predict = true;
        vec![ControllerCommand::DeferredPredict]
    }

    pub fn handle_event(&mut self, event: ControllerEvent) -> Vec<ControllerCommand> {
        match event {
            ControllerEvent::TokenCount { stream_id, count } => {
                if self.is_current_stream(stream_id) {
                    self.set_token_count(count);
                }
                Vec::new()
            }
            ControllerEvent::Chunk { stream_id, chunk } => {
                if self.is_current_stream(stream_id) {
                    self.append_chunk(chunk);
                }
                Vec::new()
            }
            ControllerEvent::Failed { stream_id, error } => {
                if self.is_current_stream(stream_id) {
                    self.fail_stream(&error);
                }
                Vec::new()
            }
            ControllerEvent::Finished { stream_id } => {
                if self.is_current_stream(stream_id) {
                    self.active = None;
                    self.set_state(ControllerState::Idle);
                }
                Vec::new()
            }
            ControllerEvent::CooldownElapsed { ticket } => {
                if ticket != self.cooldown_ticket || self.state != ControllerState::CancelPending {
                    debug!(ticket, "Dropping superseded retry");
                    return Vec::new();
                }
                vec![self.begin_prediction()]
            }
            ControllerEvent::PredictRequested => {
                self.deferred_predict = false;
                match self.request_predict() {
                    Ok(commands) => commands,
                    Err(err) => {
                        debug!(error = %err, "Deferred prediction rejected");
                        Vec::new()
                    }
                }
            }
        }
    }

    fn is_current_stream(&self, stream_id: u64) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| active.id == stream_id)
    }

    fn begin_prediction(&mut self) -> ControllerCommand {
        let len = self.editor.document().len();
        self.history.checkpoint(len);
        self.clear_error();

        let prompt = self.assembled_context().to_string();
        let mut options = self.options.clone();
        // Validated in `request_predict`.
        options.stop = parse_stop_sequences(&self.stop_text).unwrap_or_default();
        let request = CompletionRequest::new(prompt, options)
            .with_context_length(self.context.settings.context_length);

        self.next_stream_id += 1;
        let cancel = CancellationToken::new();
        self.active = Some(ActiveStream {
            id: self.next_stream_id,
            cancel: cancel.clone(),
            appended: false,
        });
        self.set_state(ControllerState::Predicting);
        debug!(stream_id = self.next_stream_id, checkpoint = len, "Starting prediction");

        ControllerCommand::SpawnPrediction(PredictionParams {
            backend: self.backend.clone(),
            request,
            cancel,
            stream_id: self.next_stream_id,
        })
    }

    fn append_chunk(&mut self, chunk: CompletionChunk) {
        let content = chunk.stopping_word.unwrap_or(chunk.content);
        if content.is_empty() {
            return;
        }
        let mut prompt_chunk = PromptChunk::machine(content);
        if let Some(probabilities) = chunk.token_probabilities {
            prompt_chunk = prompt_chunk.with_probabilities(probabilities);
        }
        self.editor.append(prompt_chunk);
        if let Some(active) = self.active.as_mut() {
            active.appended = true;
        }
        self.notify_document();
    }

    fn fail_stream(&mut self, error: &BackendError) {
        let appended = self.active.take().is_some_and(|active| active.appended);
        if let Some(failure) = classify(error, self.backend.kind) {
            warn!(error = %error, "Prediction failed");
            if !appended {
                let len = self.editor.document().len();
                self.history.discard_checkpoint_at(len);
            }
            self.observers
                .notify(StateChange::Error(Some(failure.to_string())));
            self.error = Some(failure);
        }
        self.set_state(ControllerState::Idle);
    }

    fn set_state(&mut self, state: ControllerState) {
        if self.state != state {
            self.state = state;
            self.observers.notify(StateChange::State(state));
        }
    }

    fn notify_document(&mut self) {
        let chunks = self.editor.document().len();
        self.observers.notify(StateChange::Document { chunks });
    }

    /// Hands the document back, e.g. for saving.
    pub fn into_document(self) -> PromptDocument {
        self.editor.into_document()
    }
}
