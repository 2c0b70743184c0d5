use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use promptpad::core::context::{
    assemble_context, AssemblyCache, AssemblySettings, PromptContext, WorldInfoEntry,
};
use promptpad::core::document::PromptChunk;

fn make_chunks(n_pairs: usize, base: &str) -> Vec<PromptChunk> {
    let mut chunks = Vec::with_capacity(n_pairs * 2);
    for i in 0..n_pairs {
        chunks.push(PromptChunk::user(format!("{base} {i}\n")));
        chunks.push(PromptChunk::machine(format!("{base} reply {i}\n")));
    }
    chunks
}

fn make_context(n_entries: usize) -> PromptContext {
    let mut context = PromptContext {
        settings: AssemblySettings {
            context_length: 4096,
            ..AssemblySettings::default()
        },
        ..PromptContext::default()
    };
    context.memory.text = "The story takes place aboard a generation ship.".into();
    context.author_note.text = "Keep the tone tense.".into();
    for i in 0..n_entries {
        context.world_info.entries.push(WorldInfoEntry::new(
            format!("Entry {i} describes deck {i} of the ship."),
            vec![format!("deck {i}\\b"), format!("keyword{i}")],
        ));
    }
    context
}

fn bench_context_assembly(c: &mut Criterion) {
    let base = "lorem ipsum dolor sit amet consectetur adipiscing elit sed do eiusmod tempor incididunt ut labore et dolore magna aliqua";

    for &pairs in &[100usize, 800usize] {
        let mut chunks = make_chunks(pairs, base);
        let context = make_context(32);
        let prompt_chars: usize = chunks.iter().map(|c| c.content.len()).sum();

        let mut group = c.benchmark_group(format!("context_assembly_pairs{pairs}"));
        group.throughput(Throughput::Bytes(prompt_chars as u64));

        group.bench_function(BenchmarkId::new("no_cache", pairs), |b| {
            b.iter(|| assemble_context(&context.inputs(&chunks)))
        });

        let mut cache = AssemblyCache::new();
        group.bench_function(BenchmarkId::new("with_cache", pairs), |b| {
            b.iter(|| cache.assemble(&context.inputs(&chunks)).len())
        });

        // Streaming-like scenario: a new machine chunk before every assembly
        let mut stream_cache = AssemblyCache::new();
        group.bench_function(BenchmarkId::new("with_cache_stream", pairs), |b| {
            b.iter(|| {
                chunks.push(PromptChunk::machine(" ."));
                stream_cache.assemble(&context.inputs(&chunks)).len()
            })
        });

        group.finish();
    }
}

criterion_group!(benches, bench_context_assembly);
criterion_main!(benches);
