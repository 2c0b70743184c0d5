//! Command-line interface parsing and handling
//!
//! This module handles parsing command-line arguments and executing the appropriate commands.

pub mod auth;
pub mod model_list;
pub mod predict;
pub mod sessions;
pub mod settings;
pub mod watch;

use std::error::Error;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::cli::settings::{SetContext, SettingError, SettingRegistry};
use crate::core::backend::{BackendConfig, BackendKind};
use crate::core::config::Config;
use crate::core::session::SessionId;
use crate::utils::logging;

#[derive(Parser)]
#[command(name = "promptpad")]
#[command(about = "Compose prompts and stream completions from local or hosted LLM backends")]
#[command(
    long_about = "promptpad keeps prompt sessions on disk and streams completions into them \
from llama.cpp, KoboldCpp, OpenAI-compatible servers or a hosted OpenRouter endpoint. \
Each session carries its own memory, author's note and world info, which are merged \
into the prompt before every prediction.\n\n\
Authentication:\n\
  Use 'promptpad auth' to store an API key for an endpoint in your system keyring.\n\n\
Environment Variables:\n\
  PROMPTPAD_API_KEY   API key used when the keyring has none for the endpoint\n\
  PROMPTPAD_LOG       Log filter (e.g. debug, promptpad=trace); defaults to warn"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Write logs to this file instead of stderr
    #[arg(short = 'l', long, global = true, value_name = "FILE")]
    pub log: Option<PathBuf>,

    /// Backend kind to use instead of the session's or configured one
    #[arg(short = 'b', long, global = true, value_name = "KIND")]
    pub backend: Option<BackendKind>,

    /// Server address to use instead of the session's or configured one
    #[arg(short = 'e', long, global = true, value_name = "URL")]
    pub endpoint: Option<String>,

    /// Model to request (OpenAI-compatible and hosted backends)
    #[arg(short = 'm', long, global = true, value_name = "MODEL")]
    pub model: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List stored sessions
    Sessions,
    /// Create an empty session and print its id
    New {
        /// Session name
        #[arg(trailing_var_arg = true)]
        name: Vec<String>,
    },
    /// Delete a session
    Delete { id: SessionId },
    /// Print a session's prompt text
    Show {
        id: SessionId,
        /// Mark machine-written text with ANSI colour
        #[arg(long)]
        chunks: bool,
    },
    /// Replace a session's prompt text with a file's contents (or stdin)
    Write {
        id: SessionId,
        /// Read the text from this file instead of stdin
        #[arg(short = 'f', long, value_name = "FILE")]
        file: Option<PathBuf>,
    },
    /// Follow edits to a text file, saving them into a session and printing
    /// debounced token counts
    Watch {
        id: SessionId,
        /// File to follow
        file: PathBuf,
    },
    /// Print the context that a prediction would send
    Context {
        id: SessionId,
        /// Replace memory, author's note and world info from a JSON file first
        #[arg(long, value_name = "FILE")]
        import: Option<PathBuf>,
    },
    /// Count the tokens of a session's assembled context
    Tokens { id: SessionId },
    /// List the models the backend offers
    Models,
    /// Stream a completion into a session and print it
    Predict {
        id: SessionId,
        /// Maximum number of tokens to generate (-1 for no limit)
        #[arg(short = 'n', long, allow_hyphen_values = true)]
        n_predict: Option<i64>,
        /// Stop sequences as a JSON list of strings, e.g. '["\\n\\n"]'
        #[arg(long, value_name = "JSON")]
        stop: Option<String>,
        /// Sampling temperature
        #[arg(short = 't', long)]
        temperature: Option<f64>,
    },
    /// Store an API key for an endpoint in the system keyring
    Auth {
        /// Endpoint the key belongs to (defaults to the configured one)
        endpoint: Option<String>,
    },
    /// Remove a stored API key
    Deauth {
        /// Endpoint whose key to remove (defaults to the configured one)
        endpoint: Option<String>,
    },
    /// Set configuration values, or show them all when no key is given
    Set {
        /// Configuration key to set
        key: Option<String>,
        /// Value to set for the key (can be multiple words for default-model)
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        value: Vec<String>,
    },
    /// Unset configuration values
    Unset {
        /// Configuration key to unset
        key: String,
        /// Value to unset for the key (optional)
        value: Option<String>,
    },
}

/// Backend selection given on the command line.
#[derive(Debug, Clone, Default)]
pub struct BackendOverrides {
    pub kind: Option<BackendKind>,
    pub endpoint: Option<String>,
    pub model: Option<String>,
}

impl BackendOverrides {
    /// Applies the overrides to `base`. Switching kind without an explicit
    /// endpoint moves to that kind's default address.
    pub fn apply(&self, base: BackendConfig) -> BackendConfig {
        let mut config = base;
        if let Some(kind) = self.kind {
            if kind != config.kind {
                config.kind = kind;
                config.endpoint = kind.default_endpoint().to_string();
            }
        }
        if let Some(endpoint) = &self.endpoint {
            config.endpoint = endpoint.clone();
        }
        if let Some(model) = &self.model {
            config.model = Some(model.clone());
        }
        config
    }
}

pub fn main() -> Result<(), Box<dyn Error>> {
    tokio::runtime::Runtime::new()?.block_on(async_main())
}

async fn async_main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    if let Err(err) = logging::init(args.log.as_deref()) {
        eprintln!("⚠️  Logging disabled: {err}");
    }

    let overrides = BackendOverrides {
        kind: args.backend,
        endpoint: args.endpoint,
        model: args.model,
    };

    match args.command {
        Commands::Sessions => sessions::list_sessions(),
        Commands::New { name } => sessions::new_session(name.join(" "), &overrides),
        Commands::Delete { id } => sessions::delete_session(id),
        Commands::Show { id, chunks } => sessions::show_session(id, chunks),
        Commands::Write { id, file } => sessions::write_session(id, file.as_deref()),
        Commands::Watch { id, file } => watch::watch_session(id, &file, &overrides).await,
        Commands::Context { id, import } => sessions::print_context(id, import.as_deref()),
        Commands::Tokens { id } => predict::count_tokens(id, &overrides).await,
        Commands::Models => model_list::list_models(&overrides).await,
        Commands::Predict {
            id,
            n_predict,
            stop,
            temperature,
        } => {
            let settings = predict::PredictSettings {
                n_predict,
                stop,
                temperature,
            };
            predict::run_predict(id, &overrides, settings).await
        }
        Commands::Auth { endpoint } => {
            if let Err(e) = auth::store_api_key(endpoint, &overrides) {
                eprintln!("❌ Authentication failed: {e}");
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Deauth { endpoint } => {
            if let Err(e) = auth::remove_api_key(endpoint, &overrides) {
                eprintln!("❌ Deauthentication failed: {e}");
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Set { key, value } => {
            let mut config = Config::load()?;
            let registry = SettingRegistry::new();
            let Some(key) = key else {
                print_settings(&registry, &config);
                return Ok(());
            };
            let result = match registry.get(&key) {
                Some(handler) => handler.set(&value, &mut SetContext {
                    config: &mut config,
                }),
                None => Err(SettingError::UnknownKey(key)),
            };
            finish_setting(result, &config)
        }
        Commands::Unset { key, value } => {
            let mut config = Config::load()?;
            let registry = SettingRegistry::new();
            let result = match registry.get(&key) {
                Some(handler) => handler.unset(value.as_deref(), &mut SetContext {
                    config: &mut config,
                }),
                None => Err(SettingError::UnknownKey(key)),
            };
            finish_setting(result, &config)
        }
    }
}

fn print_settings(registry: &SettingRegistry, config: &Config) {
    println!("Current configuration:");
    for key in registry.keys_display_order() {
        if let Some(handler) = registry.get(key) {
            println!("{}", handler.format(config));
        }
    }
}

/// Saves the config after a successful set/unset and reports the outcome.
fn finish_setting(result: Result<String, SettingError>, config: &Config) -> Result<(), Box<dyn Error>> {
    let outcome = result.and_then(|message| {
        config
            .save()
            .map(|()| message)
            .map_err(|err| SettingError::ConfigError(err.to_string()))
    });
    match outcome {
        Ok(message) => {
            println!("{message}");
            Ok(())
        }
        Err(err) => {
            err.print();
            std::process::exit(err.exit_code());
        }
    }
}

#[cfg(test)]
mod tests;
