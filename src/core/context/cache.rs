use super::assembler::{assemble_context, ContextInputs};
use super::{AssemblySettings, AuthorNote, MemoryBlock, WorldInfoSet};

/// Owned copy of the inputs behind the cached output.
#[derive(Debug)]
struct AssemblyKey {
    chunks: Vec<String>,
    memory: MemoryBlock,
    author_note: AuthorNote,
    world_info: WorldInfoSet,
    settings: AssemblySettings,
}

impl AssemblyKey {
    fn of(inputs: &ContextInputs<'_>) -> Self {
        Self {
            chunks: inputs
                .chunks
                .iter()
                .map(|chunk| chunk.content.clone())
                .collect(),
            memory: inputs.memory.clone(),
            author_note: inputs.author_note.clone(),
            world_info: inputs.world_info.clone(),
            settings: inputs.settings,
        }
    }

    fn matches(&self, inputs: &ContextInputs<'_>) -> bool {
        self.chunks.len() == inputs.chunks.len()
            && self
                .chunks
                .iter()
                .zip(inputs.chunks)
                .all(|(cached, chunk)| *cached == chunk.content)
            && self.memory == *inputs.memory
            && self.author_note == *inputs.author_note
            && self.world_info == *inputs.world_info
            && self.settings.context_length == inputs.settings.context_length
            && self.settings.token_ratio.to_bits() == inputs.settings.token_ratio.to_bits()
    }
}

/// Memoizes the most recent assembly so repeated calls with unchanged
/// inputs skip the work.
#[derive(Debug, Default)]
pub struct AssemblyCache {
    key: Option<AssemblyKey>,
    output: String,
    recomputations: u64,
}

impl AssemblyCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assemble(&mut self, inputs: &ContextInputs<'_>) -> &str {
        let hit = self.key.as_ref().is_some_and(|key| key.matches(inputs));
        if !hit {
            self.output = assemble_context(inputs);
            self.key = Some(AssemblyKey::of(inputs));
            self.recomputations += 1;
        }
        &self.output
    }

    pub fn invalidate(&mut self) {
        self.key = None;
    }

    /// Number of times the context was actually rebuilt.
    pub fn recomputations(&self) -> u64 {
        self.recomputations
    }
}
