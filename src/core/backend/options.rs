//! Canonical sampling options and the per-backend field translations.
//!
//! Options are stored under llama.cpp's names. Backends that expect other
//! names get an explicit [`RenameTable`] instead of ad hoc field shuffling.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Value of `n_predict` meaning "no explicit limit".
pub const UNLIMITED_PREDICT: i64 = -1;

/// Token limit sent to backends that cannot express "no limit".
pub const DEFAULT_PREDICT_LIMIT: i64 = 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingOptions {
    pub temperature: f64,
    pub top_p: f64,
    pub top_k: i64,
    pub min_p: f64,
    pub typical_p: f64,
    pub tfs_z: f64,
    pub repeat_penalty: f64,
    pub repeat_last_n: i64,
    pub presence_penalty: f64,
    pub frequency_penalty: f64,
    pub mirostat: u8,
    pub mirostat_tau: f64,
    pub mirostat_eta: f64,
    pub n_predict: i64,
    pub n_probs: u32,
    pub seed: i64,
    pub ignore_eos: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
}

impl Default for SamplingOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.95,
            top_k: 40,
            min_p: 0.05,
            typical_p: 1.0,
            tfs_z: 1.0,
            repeat_penalty: 1.1,
            repeat_last_n: 256,
            presence_penalty: 0.0,
            frequency_penalty: 0.0,
            mirostat: 0,
            mirostat_tau: 5.0,
            mirostat_eta: 0.1,
            n_predict: UNLIMITED_PREDICT,
            n_probs: 10,
            seed: -1,
            ignore_eos: false,
            stop: Vec::new(),
        }
    }
}

/// Everything a backend needs to produce a completion.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub prompt: String,
    pub options: SamplingOptions,
    /// Context length the user configured, forwarded to backends that use it.
    pub n_ctx: Option<u32>,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>, options: SamplingOptions) -> Self {
        Self {
            prompt: prompt.into(),
            options,
            n_ctx: None,
        }
    }

    pub fn with_context_length(mut self, n_ctx: u32) -> Self {
        self.n_ctx = Some(n_ctx);
        self
    }

    /// Sampling options as a JSON object under canonical names. The prompt is
    /// not included.
    pub fn canonical_options(&self) -> Map<String, Value> {
        let mut map = match serde_json::to_value(&self.options) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        if let Some(n_ctx) = self.n_ctx {
            map.insert("n_ctx".into(), Value::from(n_ctx));
        }
        map
    }
}

/// Replaces a `-1` token limit with [`DEFAULT_PREDICT_LIMIT`].
pub fn apply_predict_default(options: &mut Map<String, Value>) {
    if options.get("n_predict").and_then(Value::as_i64) == Some(UNLIMITED_PREDICT) {
        options.insert("n_predict".into(), Value::from(DEFAULT_PREDICT_LIMIT));
    }
}

/// Bidirectional mapping between canonical option names and a backend's
/// names. Fields missing from the table pass through unchanged.
#[derive(Debug, Clone, Copy)]
pub struct RenameTable {
    pairs: &'static [(&'static str, &'static str)],
}

impl RenameTable {
    pub const fn new(pairs: &'static [(&'static str, &'static str)]) -> Self {
        Self { pairs }
    }

    pub fn backend_name<'a>(&self, canonical: &'a str) -> &'a str {
        self.pairs
            .iter()
            .find(|(from, _)| *from == canonical)
            .map_or(canonical, |&(_, to)| to)
    }

    pub fn canonical_name<'a>(&self, backend: &'a str) -> &'a str {
        self.pairs
            .iter()
            .find(|(_, to)| *to == backend)
            .map_or(backend, |&(from, _)| from)
    }

    pub fn to_backend(&self, options: Map<String, Value>) -> Map<String, Value> {
        options
            .into_iter()
            .map(|(key, value)| (self.backend_name(&key).to_string(), value))
            .collect()
    }

    pub fn to_canonical(&self, options: Map<String, Value>) -> Map<String, Value> {
        options
            .into_iter()
            .map(|(key, value)| (self.canonical_name(&key).to_string(), value))
            .collect()
    }
}

pub const KOBOLDCPP_RENAMES: RenameTable = RenameTable::new(&[
    ("n_ctx", "max_context_length"),
    ("n_predict", "max_length"),
    ("repeat_penalty", "rep_pen"),
    ("repeat_last_n", "rep_pen_range"),
    ("tfs_z", "tfs"),
    ("typical_p", "typical"),
    ("seed", "sampler_seed"),
    ("stop", "stop_sequence"),
    ("ignore_eos", "use_default_badwordsids"),
]);

pub const OPENAI_RENAMES: RenameTable = RenameTable::new(&[
    ("n_predict", "max_tokens"),
    ("repeat_penalty", "repetition_penalty"),
    ("n_probs", "logprobs"),
    ("n_ctx", "truncation_length"),
]);

/// Parses the user's stop-sequence text, a JSON array of strings.
pub fn parse_stop_sequences(text: &str) -> Result<Vec<String>, StopSequenceError> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str::<Vec<String>>(text).map_err(|source| StopSequenceError {
        input: text.to_string(),
        source,
    })
}

/// Stop-sequence text that is not a JSON list of strings.
#[derive(Debug)]
pub struct StopSequenceError {
    pub input: String,
    pub source: serde_json::Error,
}

impl std::fmt::Display for StopSequenceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Stop sequences must be a JSON list of strings, e.g. [\"\\n\"]: {}",
            self.source
        )
    }
}

impl std::error::Error for StopSequenceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn koboldcpp_translation_renames_fields() {
        let mut canonical = Map::new();
        canonical.insert("repeat_penalty".into(), json!(1.1));
        canonical.insert("stop".into(), json!(["\n"]));
        canonical.insert("temperature".into(), json!(0.5));

        let translated = KOBOLDCPP_RENAMES.to_backend(canonical.clone());

        assert_eq!(translated.get("rep_pen"), Some(&json!(1.1)));
        assert_eq!(translated.get("stop_sequence"), Some(&json!(["\n"])));
        assert_eq!(translated.get("temperature"), Some(&json!(0.5)));
        assert!(!translated.contains_key("repeat_penalty"));
        assert!(!translated.contains_key("stop"));

        assert_eq!(KOBOLDCPP_RENAMES.to_canonical(translated), canonical);
    }

    #[test]
    fn predict_default_only_replaces_unlimited() {
        let mut options = Map::new();
        options.insert("n_predict".into(), json!(-1));
        apply_predict_default(&mut options);
        assert_eq!(options["n_predict"], json!(1024));

        options.insert("n_predict".into(), json!(64));
        apply_predict_default(&mut options);
        assert_eq!(options["n_predict"], json!(64));
    }

    #[test]
    fn canonical_options_skip_empty_stop_and_add_context() {
        let request = CompletionRequest::new("hi", SamplingOptions::default())
            .with_context_length(4096);
        let map = request.canonical_options();
        assert!(!map.contains_key("stop"));
        assert!(!map.contains_key("prompt"));
        assert_eq!(map["n_ctx"], json!(4096));
        assert_eq!(map["n_predict"], json!(-1));
    }

    #[test]
    fn stop_sequences_parse_as_json_list() {
        assert_eq!(
            parse_stop_sequences(r####"["\n", "###"]"####).expect("valid"),
            vec!["\n".to_string(), "###".to_string()]
        );
        assert!(parse_stop_sequences("  ").expect("empty").is_empty());
        assert!(parse_stop_sequences("\\n").is_err());
        assert!(parse_stop_sequences(r#"[1, 2]"#).is_err());
    }
}
