use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::core::backend::BackendKind;

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct Config {
    /// Backend used for new sessions.
    pub backend: Option<BackendKind>,
    /// Server address for new sessions; defaults per backend kind.
    pub endpoint: Option<String>,
    /// Default models keyed by backend id (e.g. "open-ai-compatible").
    #[serde(default)]
    pub default_models: HashMap<String, String>,
    /// Context budget in tokens for new sessions.
    pub context_length: Option<u32>,
    /// Characters per token used to estimate truncation.
    pub token_ratio: Option<f64>,
    /// Delay before token count and model list refreshes, in milliseconds.
    pub refresh_debounce_ms: Option<u64>,
    /// Overrides the session directory under the data dir.
    pub sessions_dir: Option<PathBuf>,
}

/// Get a user-friendly display string for a path
/// Converts absolute paths to use ~ notation on Unix-like systems when possible
pub fn path_display<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let home_path = PathBuf::from(home);
            if let Ok(relative) = path.strip_prefix(&home_path) {
                return format!("~/{}", relative.display());
            }
        }
    }

    path.display().to_string()
}
