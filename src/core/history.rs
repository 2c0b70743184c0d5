use crate::core::document::{PromptChunk, PromptDocument};

/// Chunk-granular undo/redo bookkeeping.
///
/// An undo checkpoint is the chunk count to truncate back to. A redo entry is
/// the tail that an undo removed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UndoHistory {
    undo: Vec<usize>,
    redo: Vec<Vec<PromptChunk>>,
}

impl UndoHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn undo_stack(&self) -> &[usize] {
        &self.undo
    }

    pub fn redo_depth(&self) -> usize {
        self.redo.len()
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    /// Records a checkpoint at `len`, dropping checkpoints that no longer
    /// point strictly before it, and forgets redo history.
    pub fn checkpoint(&mut self, len: usize) {
        while self.undo.last().is_some_and(|&pos| pos >= len) {
            self.undo.pop();
        }
        self.undo.push(len);
        self.redo.clear();
    }

    /// Pops the latest checkpoint if it still equals `len` (nothing was
    /// appended after it).
    pub fn discard_checkpoint_at(&mut self, len: usize) -> bool {
        if self.undo.last() == Some(&len) {
            self.undo.pop();
            return true;
        }
        false
    }

    pub fn undo(&mut self, document: &mut PromptDocument) -> bool {
        while let Some(pos) = self.undo.pop() {
            if pos > document.len() {
                continue;
            }
            let tail = document.split_off(pos);
            self.redo.push(tail);
            return true;
        }
        false
    }

    pub fn redo(&mut self, document: &mut PromptDocument) -> bool {
        let Some(tail) = self.redo.pop() else {
            return false;
        };
        self.undo.push(document.len());
        document.extend(tail);
        true
    }

    pub(crate) fn clear_redo(&mut self) {
        self.redo.clear();
    }

    /// Rewrites checkpoints after an edit replaced the chunks in
    /// `start..old_len - end` of a document that had `old_len` chunks.
    pub(crate) fn apply_edit(&mut self, start: usize, end: usize, old_len: usize, new_len: usize) {
        let middle_end = old_len - end;
        let delta = new_len as isize - old_len as isize;
        self.undo = self
            .undo
            .iter()
            .filter_map(|&pos| {
                if pos <= start {
                    Some(pos)
                } else if pos < middle_end {
                    None
                } else {
                    usize::try_from(pos as isize + delta).ok()
                }
            })
            .collect();
    }
}
