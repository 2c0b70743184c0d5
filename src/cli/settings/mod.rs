//! Settings management for CLI set/unset commands.
//!
//! Each configuration key has a [`SettingHandler`]:
//!
//! - Simple settings (`backend`, `endpoint`, `sessions-dir`)
//! - Numeric settings (`context-length`, `token-ratio`, `refresh-debounce-ms`)
//! - Backend-keyed settings (`default-model`)
//!
//! Handlers edit the loaded [`Config`] in place; the caller saves it.

pub mod error;
pub mod handlers;
pub mod helpers;
pub mod registry;

pub use error::SettingError;
pub use registry::SettingRegistry;

use crate::core::config::Config;

/// Context provided to setting handlers during set/unset operations.
pub struct SetContext<'a> {
    pub config: &'a mut Config,
}

/// Trait for handling a configuration setting.
pub trait SettingHandler: Send + Sync {
    /// Returns the configuration key this handler manages.
    fn key(&self) -> &'static str;

    /// Set the configuration value from the arguments after the key.
    ///
    /// Returns a success message to display.
    fn set(&self, args: &[String], ctx: &mut SetContext<'_>) -> Result<String, SettingError>;

    /// Unset (clear) the configuration value.
    ///
    /// `args` carries the optional argument (e.g. a backend for
    /// backend-keyed settings).
    fn unset(&self, args: Option<&str>, ctx: &mut SetContext<'_>) -> Result<String, SettingError>;

    /// Format the current value for display in `promptpad set` output.
    fn format(&self, config: &Config) -> String;
}
