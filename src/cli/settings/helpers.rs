//! Helper functions for settings operations.

use crate::core::backend::BackendKind;

use super::error::SettingError;

pub fn success_set(key: &str, value: &str) -> String {
    format!("✅ Set {key} to: {value}")
}

pub fn success_unset(key: &str) -> String {
    format!("✅ Unset {key}")
}

/// Resolve a backend kind from user input, accepting the usual aliases.
pub fn validate_backend(input: &str) -> Result<BackendKind, SettingError> {
    input
        .trim()
        .parse::<BackendKind>()
        .map_err(|_| SettingError::UnknownBackend {
            input: input.to_string(),
        })
}
