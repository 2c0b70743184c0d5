//! Reconciles free-form text edits back into prompt chunks.
//!
//! The editor only hands back a flat string. To keep machine metadata on the
//! chunks the user did not touch, the longest run of chunks that still prefix
//! the new text and the longest run that still suffix it are preserved; the
//! text in between collapses into at most one new user chunk.

use crate::core::document::{PromptChunk, PromptDocument};
use crate::core::history::UndoHistory;

/// Outcome of reconciling an edit against the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditSummary {
    /// Chunks preserved at the front.
    pub start: usize,
    /// Chunks preserved at the back.
    pub end: usize,
    pub old_len: usize,
    pub new_len: usize,
    pub changed: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChunkEditModel {
    document: PromptDocument,
}

impl ChunkEditModel {
    pub fn new(document: PromptDocument) -> Self {
        Self { document }
    }

    pub fn document(&self) -> &PromptDocument {
        &self.document
    }

    pub(crate) fn document_mut(&mut self) -> &mut PromptDocument {
        &mut self.document
    }

    pub fn text(&self) -> String {
        self.document.text()
    }

    pub fn append(&mut self, chunk: PromptChunk) {
        self.document.append(chunk);
    }

    pub fn into_document(self) -> PromptDocument {
        self.document
    }

    /// Replaces the document text with `new_text`, keeping as many existing
    /// chunks as possible and fixing up `history` to match.
    pub fn reconcile(&mut self, new_text: &str, history: &mut UndoHistory) -> EditSummary {
        let old_len = self.document.len();
        let (chunks, start, end) = reconcile_chunks(self.document.chunks(), new_text);
        let new_len = chunks.len();
        let changed = chunks.as_slice() != self.document.chunks();

        if changed {
            history.apply_edit(start, end, old_len, new_len);
            if end == 0 {
                history.clear_redo();
            }
            self.document.replace(chunks);
        }

        EditSummary {
            start,
            end,
            old_len,
            new_len,
            changed,
        }
    }
}

/// Returns the reconciled chunk list plus the number of chunks preserved at
/// the front and at the back.
pub fn reconcile_chunks(chunks: &[PromptChunk], new_text: &str) -> (Vec<PromptChunk>, usize, usize) {
    let mut remaining = new_text;
    let mut front = 0;
    let mut back = chunks.len();

    while front < back {
        let Some(rest) = remaining.strip_prefix(chunks[front].content.as_str()) else {
            break;
        };
        remaining = rest;
        front += 1;
    }

    while back > front {
        let Some(rest) = remaining.strip_suffix(chunks[back - 1].content.as_str()) else {
            break;
        };
        remaining = rest;
        back -= 1;
    }

    let mut result = Vec::with_capacity(front + 1 + chunks.len() - back);
    result.extend_from_slice(&chunks[..front]);
    if !remaining.is_empty() {
        result.push(PromptChunk::user(remaining));
    }
    result.extend_from_slice(&chunks[back..]);

    (result, front, chunks.len() - back)
}
