//! Numeric setting handlers.

use crate::cli::settings::error::SettingError;
use crate::cli::settings::helpers::success_set;
use crate::cli::settings::{SetContext, SettingHandler};
use crate::core::config::Config;
use crate::core::context::{DEFAULT_CONTEXT_LENGTH, DEFAULT_TOKEN_RATIO};
use crate::core::refresh::DEFAULT_DEBOUNCE;

/// Data-driven handler for settings holding a single number.
pub struct NumericHandler {
    key: &'static str,
    hint: &'static str,
    example: &'static str,
    expected: &'static str,
    default_display: fn() -> String,
    get: fn(&Config) -> Option<String>,
    /// Stores the parsed value; false when the input is not acceptable.
    apply: fn(&mut Config, &str) -> bool,
    clear: fn(&mut Config),
}

impl SettingHandler for NumericHandler {
    fn key(&self) -> &'static str {
        self.key
    }

    fn set(&self, args: &[String], ctx: &mut SetContext<'_>) -> Result<String, SettingError> {
        let Some(input) = args.first() else {
            return Err(SettingError::MissingArgs {
                hint: self.hint,
                example: self.example,
            });
        };

        if !(self.apply)(ctx.config, input.trim()) {
            return Err(SettingError::InvalidValue {
                key: self.key,
                input: input.clone(),
                expected: self.expected,
            });
        }
        Ok(success_set(self.key, input.trim()))
    }

    fn unset(
        &self,
        _args: Option<&str>,
        ctx: &mut SetContext<'_>,
    ) -> Result<String, SettingError> {
        (self.clear)(ctx.config);
        Ok(format!(
            "✅ Unset {} (will use default: {})",
            self.key,
            (self.default_display)()
        ))
    }

    fn format(&self, config: &Config) -> String {
        match (self.get)(config) {
            Some(value) => format!("  {}: {}", self.key, value),
            None => format!(
                "  {}: (unset, default: {})",
                self.key,
                (self.default_display)()
            ),
        }
    }
}

/// Create a handler for the `context-length` setting.
pub fn context_length_handler() -> NumericHandler {
    NumericHandler {
        key: "context-length",
        hint: "To set the context budget, specify a token count:",
        example: "promptpad set context-length 4096",
        expected: "a positive whole number of tokens",
        default_display: || DEFAULT_CONTEXT_LENGTH.to_string(),
        get: |c| c.context_length.map(|v| v.to_string()),
        apply: |c, input| match input.parse::<u32>() {
            Ok(value) if value > 0 => {
                c.context_length = Some(value);
                true
            }
            _ => false,
        },
        clear: |c| c.context_length = None,
    }
}

/// Create a handler for the `token-ratio` setting.
pub fn token_ratio_handler() -> NumericHandler {
    NumericHandler {
        key: "token-ratio",
        hint: "To set the characters-per-token estimate, specify a number:",
        example: "promptpad set token-ratio 3.6",
        expected: "a positive number",
        default_display: || DEFAULT_TOKEN_RATIO.to_string(),
        get: |c| c.token_ratio.map(|v| v.to_string()),
        apply: |c, input| match input.parse::<f64>() {
            Ok(value) if value.is_finite() && value > 0.0 => {
                c.token_ratio = Some(value);
                true
            }
            _ => false,
        },
        clear: |c| c.token_ratio = None,
    }
}

/// Create a handler for the `refresh-debounce-ms` setting.
pub fn refresh_debounce_handler() -> NumericHandler {
    NumericHandler {
        key: "refresh-debounce-ms",
        hint: "To set the refresh delay, specify milliseconds:",
        example: "promptpad set refresh-debounce-ms 300",
        expected: "a whole number of milliseconds",
        default_display: || DEFAULT_DEBOUNCE.as_millis().to_string(),
        get: |c| c.refresh_debounce_ms.map(|v| v.to_string()),
        apply: |c, input| match input.parse::<u64>() {
            Ok(value) => {
                c.refresh_debounce_ms = Some(value);
                true
            }
            Err(_) => false,
        },
        clear: |c| c.refresh_debounce_ms = None,
    }
}
