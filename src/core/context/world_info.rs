//! Keyword-activated world info.

use std::collections::HashMap;
use std::sync::{LazyLock, Mutex, PoisonError};

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;

use super::{tail_chars, tokens_to_chars};

/// Search range used when an entry has none or an unusable one.
pub const DEFAULT_SEARCH_RANGE: u32 = 2048;

const MAX_CACHED_KEYS: usize = 4096;

static KEY_CACHE: LazyLock<Mutex<KeyCache>> = LazyLock::new(|| Mutex::new(KeyCache::default()));

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldInfoEntry {
    pub display_name: String,
    pub text: String,
    /// Case-insensitive regular expressions.
    pub keys: Vec<String>,
    /// Tokens of recent prompt text to search. `Some(0)` disables the entry.
    #[serde(
        deserialize_with = "lenient_search_range",
        skip_serializing_if = "Option::is_none"
    )]
    pub search_range: Option<u32>,
}

impl WorldInfoEntry {
    pub fn new(text: impl Into<String>, keys: Vec<String>) -> Self {
        Self {
            text: text.into(),
            keys,
            ..Self::default()
        }
    }

    pub fn effective_search_range(&self) -> u32 {
        self.search_range.unwrap_or(DEFAULT_SEARCH_RANGE)
    }

    fn is_candidate(&self) -> bool {
        !self.text.is_empty() && self.keys.iter().any(|key| !key.is_empty())
    }

    /// Whether any key matches the window of `prompt` this entry searches.
    pub fn is_active(&self, prompt: &str, token_ratio: f64) -> bool {
        if !self.is_candidate() {
            return false;
        }
        let window_len = tokens_to_chars(self.effective_search_range(), token_ratio);
        let window = tail_chars(prompt, window_len);
        if window.is_empty() {
            return false;
        }
        self.keys
            .iter()
            .filter(|key| !key.is_empty())
            .any(|key| key_matches(key, window, &self.display_name))
    }
}

fn key_matches(key: &str, window: &str, entry_name: &str) -> bool {
    let regex = KEY_CACHE
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .get_or_compile(key, entry_name);
    regex.is_some_and(|regex| regex.is_match(window))
}

/// Compiled world info keys. Invalid keys are remembered as `None` so they
/// are reported once. The cache is cleared when it reaches its capacity.
#[derive(Debug, Default)]
struct KeyCache {
    regexes: HashMap<String, Option<Regex>>,
}

impl KeyCache {
    fn get_or_compile(&mut self, key: &str, entry_name: &str) -> Option<Regex> {
        if let Some(regex) = self.regexes.get(key) {
            return regex.clone();
        }
        if self.regexes.len() >= MAX_CACHED_KEYS {
            self.regexes.clear();
        }
        let regex = match RegexBuilder::new(key).case_insensitive(true).build() {
            Ok(regex) => Some(regex),
            Err(err) => {
                warn!(entry = entry_name, key, error = %err, "Ignoring invalid world info key");
                None
            }
        };
        self.regexes.insert(key.to_string(), regex.clone());
        regex
    }
}

/// Accepts a number or numeric string; anything else becomes `None`.
fn lenient_search_range<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Number(number) => number.as_u64().and_then(|n| u32::try_from(n).ok()),
        serde_json::Value::String(text) => text.trim().parse::<u32>().ok(),
        _ => None,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldInfoSet {
    pub entries: Vec<WorldInfoEntry>,
    pub prefix: String,
    pub suffix: String,
}

impl WorldInfoSet {
    /// Newline-joined texts of the entries activated by `prompt`, in stored
    /// order.
    pub fn assemble(&self, prompt: &str, token_ratio: f64) -> String {
        self.entries
            .iter()
            .filter(|entry| entry.is_active(prompt, token_ratio))
            .map(|entry| entry.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}
