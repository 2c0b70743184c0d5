//! Model listing functionality
//!
//! This module lists the models the configured backend offers.

use std::error::Error;

use tokio_util::sync::CancellationToken;

use crate::cli::predict::resolve_backend;
use crate::cli::BackendOverrides;
use crate::core::backend::backend_for;
use crate::core::backend::http::shared_client;
use crate::core::config::Config;

pub async fn list_models(overrides: &BackendOverrides) -> Result<(), Box<dyn Error>> {
    let config = Config::load()?;
    let backend_config = resolve_backend(config.backend_config(), overrides)?;
    let kind = backend_config.kind;

    println!("🤖 Available Models for {kind} at {}", backend_config.endpoint);
    println!();

    if let Some(default_model) = config.get_default_model(kind) {
        println!("🎯 Default model for this backend: {default_model} (from config)");
        println!();
    }

    let backend = backend_for(kind, shared_client());
    let mut models = backend
        .list_models(&backend_config, &CancellationToken::new())
        .await?;

    if models.is_empty() {
        println!("No models reported. {kind} serves whichever model it was started with.");
    } else {
        models.sort();
        println!("Found {} models:", models.len());
        println!();
        for model in models {
            println!("  {model}");
        }
    }
    Ok(())
}
