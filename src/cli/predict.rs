//! TUI-less prediction and token counting

use std::error::Error;
use std::io::{self, Write};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cli::sessions::{load_session, open_store};
use crate::cli::BackendOverrides;
use crate::core::backend::http::shared_client;
use crate::core::backend::{backend_for, BackendConfig};
use crate::core::config::Config;
use crate::core::controller::executor::{drive_until_settled, CommandExecutor};
use crate::core::controller::CompletionController;
use crate::core::keyring::CredentialStore;
use crate::core::session::{SessionId, SessionStore};

/// Per-run changes to the session's sampling settings.
#[derive(Debug, Clone, Default)]
pub struct PredictSettings {
    pub n_predict: Option<i64>,
    pub stop: Option<String>,
    pub temperature: Option<f64>,
}

pub(crate) fn resolve_backend(
    base: BackendConfig,
    overrides: &BackendOverrides,
) -> Result<BackendConfig, Box<dyn Error>> {
    Ok(CredentialStore::new().attach_key(overrides.apply(base))?)
}

/// Prints every chunk appended since the last call.
struct ChunkPrinter {
    printed: usize,
}

impl ChunkPrinter {
    fn print_new(&mut self, controller: &CompletionController) {
        let chunks = controller.document().chunks();
        if chunks.len() <= self.printed {
            self.printed = chunks.len();
            return;
        }
        let mut stdout = io::stdout().lock();
        for chunk in &chunks[self.printed..] {
            let _ = write!(stdout, "{}", chunk.content);
        }
        let _ = stdout.flush();
        self.printed = chunks.len();
    }
}

pub async fn run_predict(
    id: SessionId,
    overrides: &BackendOverrides,
    settings: PredictSettings,
) -> Result<(), Box<dyn Error>> {
    let config = Config::load()?;
    let mut store = open_store(&config)?;
    let mut session = load_session(&store, id)?;

    if let Some(n_predict) = settings.n_predict {
        session.options.n_predict = n_predict;
    }
    if let Some(temperature) = settings.temperature {
        session.options.temperature = temperature;
    }
    if let Some(stop) = settings.stop {
        session.stop_text = stop;
    }

    let mut controller = session.controller();
    controller.set_backend(resolve_backend(session.backend.clone(), overrides)?);

    if let Some(err) = controller.stop_sequence_error() {
        eprintln!("❌ {err}");
        std::process::exit(2);
    }

    let (executor, mut events) = CommandExecutor::new(shared_client());
    let commands = controller.request_predict()?;
    executor.execute_all(commands);

    let mut printer = ChunkPrinter {
        printed: controller.document().len(),
    };
    drive_until_settled(&mut controller, &executor, &mut events, |controller| {
        printer.print_new(controller);
    })
    .await;
    println!();

    if let Some(count) = controller.token_count() {
        debug!(count, "Prompt tokens");
    }

    let failure = controller.error().map(ToString::to_string);
    session.update_from(&controller);
    store.put(id, &session)?;

    if let Some(failure) = failure {
        eprintln!("❌ {failure}");
        std::process::exit(1);
    }
    Ok(())
}

pub async fn count_tokens(id: SessionId, overrides: &BackendOverrides) -> Result<(), Box<dyn Error>> {
    let config = Config::load()?;
    let store = open_store(&config)?;
    let session = load_session(&store, id)?;

    let backend_config = resolve_backend(session.backend.clone(), overrides)?;
    let mut controller = session.controller();
    let prompt = controller.assembled_context().to_string();

    let backend = backend_for(backend_config.kind, shared_client());
    let count = backend
        .token_count(&prompt, &backend_config, &CancellationToken::new())
        .await?;
    println!(
        "{count} tokens ({} characters, context length {})",
        prompt.chars().count(),
        session.context_length()
    );
    Ok(())
}
