//! Section partitioning and change batching benchmarks
//!
//! This benchmark suite measures:
//! - Partitioning large normal-mode tab lists with grouping and inactivity
//! - Net-effect renumbering when inserts are cancelled by deletes

use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tabgrid::{partition, ChangeBatcher, PartitionPolicy, PrivacyMode, TabId, TabRef};

/// Tabs with a mix of group keys and activity ages
fn create_tabs(count: usize) -> Vec<TabRef> {
    let now = Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap();
    (0..count)
        .map(|i| {
            let idle = Duration::days((i % 30) as i64);
            let url = Some(format!("https://{i}.test"));
            let mut tab = TabRef::new(TabId::new(), url, false, now - idle);
            if i % 3 == 0 {
                tab.group_key = Some(format!("topic {}", i % 17));
            }
            tab
        })
        .collect()
}

fn bench_partition(c: &mut Criterion) {
    let mut group = c.benchmark_group("partition");
    let now = Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap();
    let policy = PartitionPolicy::default();

    for count in [50, 500, 5000] {
        let tabs = create_tabs(count);
        let selected = tabs.last().map(|tab| tab.id);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &tabs, |b, tabs| {
            b.iter(|| {
                black_box(partition(
                    black_box(tabs),
                    PrivacyMode::Normal,
                    &policy,
                    now,
                    selected,
                ))
            });
        });
    }

    group.finish();
}

fn bench_batch_renumbering(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_renumbering");

    for count in [10, 100, 1000] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            let ids: Vec<TabId> = (0..count).map(|_| TabId::new()).collect();
            b.iter(|| {
                let mut batcher = ChangeBatcher::new();
                for (index, id) in ids.iter().enumerate() {
                    batcher.record_insert(*id, index);
                }
                // Cancel every other insert, oldest first
                for (removed, id) in ids.iter().step_by(2).enumerate() {
                    batcher.record_delete(*id, removed);
                }
                black_box(batcher.begin_flush())
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_partition, bench_batch_renumbering);
criterion_main!(benches);
