use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use open_agent_rt::memory::{HistoryFormat, Memory};
use open_agent_rt::tools::registry::ToolRegistry;
use open_agent_rt::Tool;
use serde_json::json;

fn populate_memory(turns: usize) -> Memory {
    let mut memory = Memory::new();
    for i in 0..turns {
        memory.add_user(format!("question {i}"));
        memory.add_assistant_text(format!("answer {i}"));
    }
    memory
}

fn bench_build_history(c: &mut Criterion) {
    let mut group = c.benchmark_group("memory_build_history");
    for turns in [10, 100, 1000] {
        let memory = populate_memory(turns);
        group.bench_with_input(BenchmarkId::from_parameter(turns), &turns, |b, _| {
            b.iter(|| black_box(memory.build_history(HistoryFormat::Messages, 20, false)));
        });
    }
    group.finish();
}

fn bench_render_history_text(c: &mut Criterion) {
    let mut group = c.benchmark_group("memory_render_history_text");
    for turns in [10, 100, 1000] {
        let memory = populate_memory(turns);
        let history = memory.build_history(HistoryFormat::Messages, 20, false);
        group.bench_with_input(BenchmarkId::from_parameter(turns), &turns, |b, _| {
            b.iter(|| black_box(Memory::render_history_text(&history)));
        });
    }
    group.finish();
}

fn bench_tool_registry_schema_export(c: &mut Criterion) {
    let mut group = c.benchmark_group("tool_registry_openai_schema");
    for tool_count in [10, 100] {
        let registry = ToolRegistry::new();
        for i in 0..tool_count {
            registry
                .register(
                    Tool::new(
                        format!("tool_{i}"),
                        "a benchmarking tool",
                        json!({"type": "object", "properties": {"x": {"type": "number"}}}),
                        |_args| Box::pin(async move { Ok(json!({})) }),
                    ),
                    None,
                )
                .unwrap();
        }
        group.bench_with_input(BenchmarkId::from_parameter(tool_count), &tool_count, |b, _| {
            b.iter(|| black_box(registry.get_openai_tools_schema()));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_build_history, bench_render_history_text, bench_tool_registry_schema_export);
criterion_main!(benches);
