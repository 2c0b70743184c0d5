use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{
    CompletionController, ControllerCommand, ControllerEvent, EventSender, PredictionParams,
    ABORT_COOLDOWN,
};
use crate::core::backend::{backend_for, BackendConfig, BackendKind, CompletionBackend};

enum BackendSource {
    Http(reqwest::Client),
    Fixed(Arc<dyn CompletionBackend>),
}

/// Runs controller commands on tokio tasks and reports their outcome as
/// [`ControllerEvent`]s.
pub struct CommandExecutor {
    source: BackendSource,
    tx: EventSender,
}

impl CommandExecutor {
    pub fn new(client: reqwest::Client) -> (Self, mpsc::UnboundedReceiver<ControllerEvent>) {
        Self::with_source(BackendSource::Http(client))
    }

    /// Uses `backend` for every command regardless of the configured kind.
    pub fn with_backend(
        backend: Arc<dyn CompletionBackend>,
    ) -> (Self, mpsc::UnboundedReceiver<ControllerEvent>) {
        Self::with_source(BackendSource::Fixed(backend))
    }

    fn with_source(source: BackendSource) -> (Self, mpsc::UnboundedReceiver<ControllerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { source, tx }, rx)
    }

    fn backend(&self, kind: BackendKind) -> Arc<dyn CompletionBackend> {
        match &self.source {
            BackendSource::Http(client) => backend_for(kind, client.clone()),
            BackendSource::Fixed(backend) => Arc::clone(backend),
        }
    }

    pub fn execute_all(&self, commands: impl IntoIterator<Item = ControllerCommand>) {
        for command in commands {
            self.execute(command);
        }
    }

    pub fn execute(&self, command: ControllerCommand) {
        let tx = self.tx.clone();
        match command {
            ControllerCommand::SpawnPrediction(params) => {
                let backend = self.backend(params.backend.kind);
                tokio::spawn(run_prediction(backend, params, tx));
            }
            ControllerCommand::AbortThenRetry { backend, ticket } => {
                let adapter = self.backend(backend.kind);
                tokio::spawn(async move {
                    abort(adapter.as_ref(), &backend).await;
                    tokio::time::sleep(ABORT_COOLDOWN).await;
                    let _ = tx.send(ControllerEvent::CooldownElapsed { ticket });
                });
            }
            ControllerCommand::Cooldown { ticket } => {
                tokio::spawn(async move {
                    tokio::time::sleep(ABORT_COOLDOWN).await;
                    let _ = tx.send(ControllerEvent::CooldownElapsed { ticket });
                });
            }
            ControllerCommand::Abort { backend } => {
                let adapter = self.backend(backend.kind);
                tokio::spawn(async move {
                    abort(adapter.as_ref(), &backend).await;
                });
            }
            ControllerCommand::DeferredPredict => {
                tokio::spawn(async move {
                    tokio::task::yield_now().await;
                    let _ = tx.send(ControllerEvent::PredictRequested);
                });
            }
        }
    }
}

async fn abort(backend: &dyn CompletionBackend, config: &BackendConfig) {
    if let Err(err) = backend.abort(config, &CancellationToken::new()).await {
        warn!(error = %err, "Backend abort failed");
    }
}

/// Counts prompt tokens, then streams the completion. Cancellation ends the
/// task with `Finished`; any other error with `Failed`.
async fn run_prediction(
    backend: Arc<dyn CompletionBackend>,
    params: PredictionParams,
    tx: EventSender,
) {
    let PredictionParams {
        backend: config,
        request,
        cancel,
        stream_id,
    } = params;

    match backend.token_count(&request.prompt, &config, &cancel).await {
        Ok(count) => {
            let _ = tx.send(ControllerEvent::TokenCount { stream_id, count });
        }
        Err(err) if err.is_cancelled() => {
            let _ = tx.send(ControllerEvent::Finished { stream_id });
            return;
        }
        Err(err) => debug!(error = %err, "Token count unavailable"),
    }

    let mut stream = match backend
        .stream_completion(&request, &config, cancel.clone())
        .await
    {
        Ok(stream) => stream,
        Err(err) if err.is_cancelled() => {
            let _ = tx.send(ControllerEvent::Finished { stream_id });
            return;
        }
        Err(error) => {
            let _ = tx.send(ControllerEvent::Failed { stream_id, error });
            return;
        }
    };

    loop {
        let item = tokio::select! {
            item = stream.next() => item,
            _ = cancel.cancelled() => break,
        };
        match item {
            Some(Ok(chunk)) => {
                let _ = tx.send(ControllerEvent::Chunk { stream_id, chunk });
            }
            Some(Err(err)) if err.is_cancelled() => break,
            Some(Err(error)) => {
                let _ = tx.send(ControllerEvent::Failed { stream_id, error });
                return;
            }
            None => break,
        }
    }
    debug!(stream_id, "Prediction stream ended");
    let _ = tx.send(ControllerEvent::Finished { stream_id });
}

/// Feeds events into `controller` until it is idle with nothing deferred.
pub async fn run_until_settled(
    controller: &mut CompletionController,
    executor: &CommandExecutor,
    events: &mut mpsc::UnboundedReceiver<ControllerEvent>,
) {
    drive_until_settled(controller, executor, events, |_| {}).await;
}

/// Like [`run_until_settled`], calling `after_event` once each event has been
/// applied.
pub async fn drive_until_settled<F>(
    controller: &mut CompletionController,
    executor: &CommandExecutor,
    events: &mut mpsc::UnboundedReceiver<ControllerEvent>,
    mut after_event: F,
) where
    F: FnMut(&CompletionController),
{
    while !controller.is_settled() {
        let Some(event) = events.recv().await else {
            break;
        };
        let commands = controller.handle_event(event);
        executor.execute_all(commands);
        after_event(controller);
    }
}
