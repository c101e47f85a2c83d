use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::json;
use sync_engine::clock::VectorClock;
use sync_engine::conflict::{auto_resolve_task, detect_conflict};
use sync_engine::record::{TaskFields, TaskPriority, TaskStatus};

fn sample_task(tag_count: usize) -> TaskFields {
    TaskFields {
        title: "Ship the release".into(),
        description: Some("final checklist".into()),
        status: TaskStatus::InProgress,
        priority: TaskPriority::High,
        due_date: Some(1_700_000_000_000),
        assigned_to: Some("user-1".into()),
        tags: (0..tag_count).map(|i| format!("tag-{i}")).collect(),
        custom_fields: serde_json::Map::from_iter([(
            "estimate_hours".to_string(),
            json!(8),
        )]),
        position: "1000".into(),
    }
}

fn bench_detect_conflict(c: &mut Criterion) {
    let mut group = c.benchmark_group("detect_conflict");
    for devices in [2usize, 10, 50] {
        let server = VectorClock::from_counters((0..devices).map(|i| (format!("device-{i}"), i as u64)));
        let incoming = server.increment("device-0");
        group.bench_function(format!("{devices}_devices"), |b| {
            b.iter(|| detect_conflict(black_box(&incoming), black_box(&server)))
        });
    }
    group.finish();
}

fn bench_auto_resolve_task(c: &mut Criterion) {
    let mut group = c.benchmark_group("auto_resolve_task");
    for tag_count in [5usize, 50, 200] {
        let ours = sample_task(tag_count);
        let mut theirs = sample_task(tag_count);
        theirs.priority = TaskPriority::Urgent;
        theirs.tags.push("extra-tag".into());
        group.bench_function(format!("{tag_count}_tags"), |b| {
            b.iter(|| auto_resolve_task(black_box(&ours), black_box(&theirs)))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_detect_conflict, bench_auto_resolve_task);
criterion_main!(benches);
