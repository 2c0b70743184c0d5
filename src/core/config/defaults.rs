use std::path::PathBuf;
use std::time::Duration;

use crate::core::backend::{BackendConfig, BackendKind};
use crate::core::config::data::Config;
use crate::core::config::io::{project_dirs, ConfigError};
use crate::core::context::AssemblySettings;
use crate::core::refresh::DEFAULT_DEBOUNCE;

impl Config {
    pub fn get_default_model(&self, kind: BackendKind) -> Option<&String> {
        self.default_models.get(kind.id())
    }

    pub fn set_default_model(&mut self, kind: BackendKind, model: String) {
        self.default_models.insert(kind.id().to_string(), model);
    }

    pub fn unset_default_model(&mut self, kind: BackendKind) {
        self.default_models.remove(kind.id());
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.unwrap_or_default()
    }

    /// Backend settings for a new session. The endpoint falls back to the
    /// kind's usual local address; the API key is never part of the config.
    pub fn backend_config(&self) -> BackendConfig {
        let kind = self.backend_kind();
        let endpoint = self
            .endpoint
            .clone()
            .unwrap_or_else(|| kind.default_endpoint().to_string());
        let config = BackendConfig::new(kind, endpoint);
        match self.get_default_model(kind) {
            Some(model) => config.with_model(model.clone()),
            None => config,
        }
    }

    pub fn assembly_settings(&self) -> AssemblySettings {
        let defaults = AssemblySettings::default();
        AssemblySettings {
            context_length: self.context_length.unwrap_or(defaults.context_length),
            token_ratio: self
                .token_ratio
                .filter(|ratio| ratio.is_finite() && *ratio > 0.0)
                .unwrap_or(defaults.token_ratio),
        }
    }

    pub fn refresh_debounce(&self) -> Duration {
        self.refresh_debounce_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_DEBOUNCE)
    }

    pub fn sessions_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.sessions_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(project_dirs()?.data_dir().join("sessions")),
        }
    }
}
