//! Backend-keyed setting handlers for HashMap<String, String> settings.

use crate::cli::settings::error::SettingError;
use crate::cli::settings::helpers::validate_backend;
use crate::cli::settings::{SetContext, SettingHandler};
use crate::core::config::Config;

/// Handler for the `default-model` setting.
pub struct DefaultModelHandler;

impl SettingHandler for DefaultModelHandler {
    fn key(&self) -> &'static str {
        "default-model"
    }

    fn set(&self, args: &[String], ctx: &mut SetContext<'_>) -> Result<String, SettingError> {
        if args.len() < 2 {
            return Err(SettingError::MissingArgs {
                hint: "To set a default model, specify the backend and model:",
                example: "promptpad set default-model hosted mistralai/mistral-7b-instruct",
            });
        }

        let kind = validate_backend(&args[0])?;
        let model = args[1..].join(" ");
        let message = format!(
            "✅ Set default-model for backend '{}' to: {model}",
            kind.id()
        );
        ctx.config.set_default_model(kind, model);
        Ok(message)
    }

    fn unset(&self, args: Option<&str>, ctx: &mut SetContext<'_>) -> Result<String, SettingError> {
        let backend = args.ok_or(SettingError::MissingArgs {
            hint: "To unset a default model, specify the backend:",
            example: "promptpad unset default-model hosted",
        })?;

        let kind = validate_backend(backend)?;
        ctx.config.unset_default_model(kind);
        Ok(format!("✅ Unset default-model for backend: {}", kind.id()))
    }

    fn format(&self, config: &Config) -> String {
        if config.default_models.is_empty() {
            "  default-models: (none set)".to_string()
        } else {
            let mut output = String::from("  default-models:\n");
            let mut entries: Vec<_> = config.default_models.iter().collect();
            entries.sort_by_key(|(k, _)| *k);
            for (backend, model) in entries {
                output.push_str(&format!("    {backend}: {model}\n"));
            }
            output.pop();
            output
        }
    }
}
