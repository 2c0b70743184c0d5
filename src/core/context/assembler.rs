use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::core::document::PromptChunk;

use super::{
    expand_newline_escapes, tokens_to_chars, AssemblySettings, AuthorNote, MemoryBlock,
    WorldInfoSet,
};

/// Everything the final context depends on.
#[derive(Debug, Clone, Copy)]
pub struct ContextInputs<'a> {
    pub chunks: &'a [PromptChunk],
    pub memory: &'a MemoryBlock,
    pub author_note: &'a AuthorNote,
    pub world_info: &'a WorldInfoSet,
    pub settings: AssemblySettings,
}

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{(\w+)\}").expect("invalid placeholder regex"));

struct Placeholders {
    values: Vec<(&'static str, String)>,
}

impl Placeholders {
    fn get(&self, name: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.as_str())
    }

    fn total_chars(&self) -> usize {
        self.values
            .iter()
            .map(|(_, value)| value.chars().count())
            .sum()
    }

    fn insert(&mut self, name: &'static str, value: String) {
        self.values.push((name, value));
    }
}

/// Builds the prompt sent to the backend.
///
/// The prompt text is truncated from the front so that it, together with
/// memory and world info, fits the token budget as estimated by
/// [`AssemblySettings::token_ratio`]. The author's note is spliced in
/// `depth` lines from the end, and the result is laid out according to the
/// memory block's order template.
pub fn assemble_context(inputs: &ContextInputs<'_>) -> String {
    let ContextInputs {
        chunks,
        memory,
        author_note,
        world_info,
        settings,
    } = *inputs;

    let prompt_text: String = chunks.iter().map(|chunk| chunk.content.as_str()).collect();
    let world_info_text = world_info.assemble(&prompt_text, settings.token_ratio);
    let note = assemble_author_note(author_note);
    let mut placeholders = placeholder_table(memory, world_info, world_info_text);

    let start = estimated_start(
        prompt_text.chars().count(),
        tokens_to_chars(settings.context_length, settings.token_ratio),
        placeholders.total_chars(),
    );
    let truncated: String = prompt_text.chars().skip(start).collect();
    let prompt = splice_author_note(&truncated, &note, author_note.depth);
    placeholders.insert("prompt", prompt);

    let assembled = memory
        .context_order
        .lines()
        .map(|line| substitute(line, &placeholders))
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    expand_newline_escapes(&assembled)
}

fn assemble_author_note(note: &AuthorNote) -> String {
    if note.text.is_empty() {
        return String::new();
    }
    expand_newline_escapes(&format!("{}{}{}", note.prefix, note.text, note.suffix))
}

fn placeholder_table(
    memory: &MemoryBlock,
    world_info: &WorldInfoSet,
    world_info_text: String,
) -> Placeholders {
    let has_world_info = !world_info_text.is_empty();
    let frame_memory = has_world_info || !memory.text.is_empty();
    let when = |cond: bool, value: &str| if cond { value.to_string() } else { String::new() };

    Placeholders {
        values: vec![
            ("memPrefix", when(frame_memory, &memory.prefix)),
            ("memSuffix", when(frame_memory, &memory.suffix)),
            ("memText", memory.text.clone()),
            ("wiPrefix", when(has_world_info, &world_info.prefix)),
            ("wiSuffix", when(has_world_info, &world_info.suffix)),
            ("wiText", world_info_text),
        ],
    }
}

/// First character of the prompt to keep, never negative.
fn estimated_start(prompt_chars: usize, budget_chars: usize, extra_chars: usize) -> usize {
    let estimate = (prompt_chars as f64 - budget_chars as f64 + extra_chars as f64).round() + 1.0;
    if estimate > 0.0 {
        estimate as usize
    } else {
        0
    }
}

/// Inserts `note` as its own segment `depth` lines from the end. The prompt
/// is split into newline-terminated segments plus a trailing empty one, so
/// depth 0 appends the note. Indexes past the start clamp to the front.
fn splice_author_note(prompt: &str, note: &str, depth: u32) -> String {
    if note.is_empty() {
        return prompt.to_string();
    }
    let mut segments: Vec<&str> = prompt.split_inclusive('\n').collect();
    segments.push("");
    let index = segments.len().saturating_sub(depth as usize + 1);
    segments.insert(index, note);
    segments.concat()
}

/// Replaces every `{name}` with its value. Unknown placeholders stay as
/// written.
fn substitute(line: &str, placeholders: &Placeholders) -> String {
    PLACEHOLDER
        .replace_all(line, |caps: &Captures<'_>| match placeholders.get(&caps[1]) {
            Some(value) => value.to_string(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::context::{WorldInfoEntry, DEFAULT_CONTEXT_ORDER};

    fn no_note() -> AuthorNote {
        AuthorNote::default()
    }

    fn assemble(
        chunks: &[PromptChunk],
        memory: &MemoryBlock,
        note: &AuthorNote,
        world_info: &WorldInfoSet,
        context_length: u32,
    ) -> String {
        assemble_context(&ContextInputs {
            chunks,
            memory,
            author_note: note,
            world_info,
            settings: AssemblySettings {
                context_length,
                ..AssemblySettings::default()
            },
        })
    }

    #[test]
    fn memory_and_prompt_follow_template() {
        let memory = MemoryBlock {
            text: "M".into(),
            context_order: "{memText}\n{prompt}".into(),
            ..MemoryBlock::default()
        };

        let out = assemble(
            &[PromptChunk::user("P")],
            &memory,
            &no_note(),
            &WorldInfoSet::default(),
            2048,
        );

        assert_eq!(out, "M\nP");
    }

    #[test]
    fn framing_is_omitted_around_empty_memory() {
        let memory = MemoryBlock {
            prefix: "<mem>".into(),
            suffix: "</mem>\\n".into(),
            ..MemoryBlock::default()
        };

        let out = assemble(
            &[PromptChunk::user("Hello"), PromptChunk::machine(" world")],
            &memory,
            &no_note(),
            &WorldInfoSet::default(),
            2048,
        );

        assert_eq!(out, "Hello world");
    }

    #[test]
    fn default_order_frames_memory_and_world_info() {
        let memory = MemoryBlock {
            prefix: "<".into(),
            text: "facts".into(),
            suffix: ">\\n".into(),
            context_order: DEFAULT_CONTEXT_ORDER.into(),
        };
        let world_info = WorldInfoSet {
            entries: vec![WorldInfoEntry::new("Ships sail.", vec!["ship".into()])],
            prefix: "[WI: ".into(),
            suffix: "] ".into(),
        };

        let out = assemble(
            &[PromptChunk::user("A ship arrives.")],
            &memory,
            &no_note(),
            &world_info,
            2048,
        );

        assert_eq!(out, "<[WI: Ships sail.] facts>\nA ship arrives.");
    }

    #[test]
    fn blank_template_lines_are_dropped_and_unknown_placeholders_kept() {
        let memory = MemoryBlock {
            context_order: "{wiText}\n{custom}\n   \n{prompt}".into(),
            ..MemoryBlock::default()
        };

        let out = assemble(
            &[PromptChunk::user("P")],
            &memory,
            &no_note(),
            &WorldInfoSet::default(),
            2048,
        );

        assert_eq!(out, "{custom}\nP");
    }

    #[test]
    fn prompt_is_truncated_from_the_front() {
        let memory = MemoryBlock::default();
        // 10 tokens at 3.6 chars per token leaves room for 36 characters.
        let prompt = "x".repeat(100);

        let out = assemble(
            &[PromptChunk::user(prompt)],
            &memory,
            &no_note(),
            &WorldInfoSet::default(),
            10,
        );

        assert_eq!(out.chars().count(), 35);
    }

    #[test]
    fn memory_counts_against_the_budget() {
        let memory = MemoryBlock {
            text: "mmmmmmmmmm".into(),
            context_order: "{memText}{prompt}".into(),
            ..MemoryBlock::default()
        };

        let out = assemble(
            &[PromptChunk::user("y".repeat(100))],
            &memory,
            &no_note(),
            &WorldInfoSet::default(),
            10,
        );

        assert_eq!(out, format!("mmmmmmmmmm{}", "y".repeat(25)));
    }

    #[test]
    fn author_note_is_spliced_at_depth() {
        let note = AuthorNote {
            prefix: "[".into(),
            text: "N".into(),
            suffix: "]\\n".into(),
            depth: 1,
        };

        let out = assemble(
            &[PromptChunk::user("one\ntwo\nthree")],
            &MemoryBlock::default(),
            &note,
            &WorldInfoSet::default(),
            2048,
        );

        assert_eq!(out, "one\ntwo\n[N]\nthree");
    }

    #[test]
    fn author_note_at_depth_zero_goes_last() {
        let note = AuthorNote {
            prefix: String::new(),
            text: "N".into(),
            suffix: String::new(),
            depth: 0,
        };

        let out = assemble(
            &[PromptChunk::user("one\ntwo\nthree")],
            &MemoryBlock::default(),
            &note,
            &WorldInfoSet::default(),
            2048,
        );
        assert_eq!(out, "one\ntwo\nthreeN");

        let out = assemble(
            &[PromptChunk::user("one\ntwo\n")],
            &MemoryBlock::default(),
            &note,
            &WorldInfoSet::default(),
            2048,
        );
        assert_eq!(out, "one\ntwo\nN");
    }

    #[test]
    fn deep_author_note_clamps_to_front() {
        let note = AuthorNote {
            prefix: String::new(),
            text: "N".into(),
            suffix: "\\n".into(),
            depth: 50,
        };

        let out = assemble(
            &[PromptChunk::user("a\nb")],
            &MemoryBlock::default(),
            &note,
            &WorldInfoSet::default(),
            2048,
        );

        assert_eq!(out, "N\na\nb");
    }

    #[test]
    fn empty_note_text_skips_splicing() {
        let note = AuthorNote {
            depth: 0,
            ..AuthorNote::default()
        };

        let out = assemble(
            &[PromptChunk::user("a\nb")],
            &MemoryBlock::default(),
            &note,
            &WorldInfoSet::default(),
            2048,
        );

        assert_eq!(out, "a\nb");
    }

    #[test]
    fn assembly_is_deterministic() {
        let chunks = [PromptChunk::user("same input")];
        let memory = MemoryBlock::default();
        let note = no_note();
        let world_info = WorldInfoSet::default();
        let first = assemble(&chunks, &memory, &note, &world_info, 64);
        let second = assemble(&chunks, &memory, &note, &world_info, 64);
        assert_eq!(first, second);
    }

    #[test]
    fn substitute_replaces_placeholders_next_to_stray_braces() {
        let placeholders = Placeholders {
            values: vec![("prompt", "P".into())],
        };
        assert_eq!(substitute("a{prompt}b{", &placeholders), "aPb{");
        assert_eq!(substitute("{{prompt}}", &placeholders), "{P}");
        assert_eq!(substitute("{a{prompt}", &placeholders), "{aP");
        assert_eq!(substitute("{prompt}{other}{prompt}", &placeholders), "P{other}P");
    }
}
