//! Context assembly: merges the prompt document with memory, the author's
//! note and activated world info into the string sent to a backend.

pub mod assembler;
pub mod cache;
pub mod world_info;

use serde::{Deserialize, Serialize};

use crate::core::document::PromptChunk;
pub use assembler::{assemble_context, ContextInputs};
pub use cache::AssemblyCache;
pub use world_info::{WorldInfoEntry, WorldInfoSet};

/// Placeholder order used when the user has not customized it.
pub const DEFAULT_CONTEXT_ORDER: &str =
    "{memPrefix}{wiPrefix}{wiText}{wiSuffix}{memText}{memSuffix}{prompt}";

/// Average characters per token, used only to estimate truncation.
pub const DEFAULT_TOKEN_RATIO: f64 = 3.6;

pub const DEFAULT_CONTEXT_LENGTH: u32 = 2048;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryBlock {
    pub prefix: String,
    pub text: String,
    pub suffix: String,
    /// Line-oriented template of `{placeholder}`s controlling assembly order.
    pub context_order: String,
}

impl Default for MemoryBlock {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            text: String::new(),
            suffix: String::new(),
            context_order: DEFAULT_CONTEXT_ORDER.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorNote {
    pub prefix: String,
    pub text: String,
    pub suffix: String,
    /// Lines from the end of the prompt at which the note is spliced in.
    pub depth: u32,
}

impl Default for AuthorNote {
    fn default() -> Self {
        Self {
            prefix: "[".to_string(),
            text: String::new(),
            suffix: "]\\n".to_string(),
            depth: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblySettings {
    /// Context budget in tokens.
    pub context_length: u32,
    pub token_ratio: f64,
}

impl Default for AssemblySettings {
    fn default() -> Self {
        Self {
            context_length: DEFAULT_CONTEXT_LENGTH,
            token_ratio: DEFAULT_TOKEN_RATIO,
        }
    }
}

/// Auxiliary context assembled around the prompt document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptContext {
    pub memory: MemoryBlock,
    pub author_note: AuthorNote,
    pub world_info: WorldInfoSet,
    pub settings: AssemblySettings,
}

impl PromptContext {
    pub fn inputs<'a>(&'a self, chunks: &'a [PromptChunk]) -> ContextInputs<'a> {
        ContextInputs {
            chunks,
            memory: &self.memory,
            author_note: &self.author_note,
            world_info: &self.world_info,
            settings: self.settings,
        }
    }
}

/// Replaces the two-character escape `\n` with a newline.
pub(crate) fn expand_newline_escapes(text: &str) -> String {
    text.replace("\\n", "\n")
}

/// Converts a token budget into an estimated character count.
pub(crate) fn tokens_to_chars(tokens: u32, token_ratio: f64) -> usize {
    let chars = (f64::from(tokens) * token_ratio).round();
    if chars.is_finite() && chars > 0.0 {
        chars as usize
    } else {
        0
    }
}

/// The last `count` characters of `text`.
pub(crate) fn tail_chars(text: &str, count: usize) -> &str {
    if count == 0 {
        return "";
    }
    match text.char_indices().rev().nth(count - 1) {
        Some((index, _)) => &text[index..],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_chars_respects_char_boundaries() {
        assert_eq!(tail_chars("héllo", 4), "éllo");
        assert_eq!(tail_chars("héllo", 10), "héllo");
        assert_eq!(tail_chars("héllo", 0), "");
    }

    #[test]
    fn tokens_to_chars_rounds() {
        assert_eq!(tokens_to_chars(10, 3.6), 36);
        assert_eq!(tokens_to_chars(1, 3.6), 4);
        assert_eq!(tokens_to_chars(0, 3.6), 0);
        assert_eq!(tokens_to_chars(5, f64::NAN), 0);
    }

    #[test]
    fn escapes_expand_to_newlines() {
        assert_eq!(expand_newline_escapes("a\\nb"), "a\nb");
        assert_eq!(expand_newline_escapes("plain"), "plain");
    }
}
