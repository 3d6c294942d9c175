use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use table_sync::config::{SyncConfig, TableTarget};
use table_sync::data::{Row, Value};
use table_sync::dataset::{Column, DataType, Dataset};
use table_sync::diff;
use table_sync::engine::merge;
use table_sync::store::memory::MemoryStore;

fn generate_batch(rows: usize, revision: i64) -> Dataset {
    let data: Vec<Row> = (0..rows as i64)
        .map(|i| {
            // Every tenth row changes between revisions.
            let qty = if i % 10 == 0 { i + revision } else { i };
            let status = match i % 3 {
                0 => "shipped",
                1 => "pending",
                _ => "processing",
            };
            vec![
                Some(Value::Integer(i)),
                Some(Value::Integer(qty)),
                Some(Value::Text(status.to_string())),
                (i % 7 != 0).then(|| Value::Float(i as f64 * 0.25)),
            ]
        })
        .collect();
    Dataset::new(
        vec![
            Column::new("id", DataType::Integer),
            Column::new("qty", DataType::Integer),
            Column::new("status", DataType::Text),
            Column::new("weight", DataType::Float),
        ],
        data,
    )
    .expect("valid dataset")
}

fn bench_merge(c: &mut Criterion) {
    let temp_dir = tempfile::tempdir().expect("temp dir");
    let config = SyncConfig {
        staging_dir: temp_dir.path().join("TEMP"),
        store_root: temp_dir.path().join("warehouse"),
        ledger: None,
    };
    let target = TableTarget::new(1, "orders");
    let base = generate_batch(50_000, 0);
    let revised = generate_batch(50_000, 1);

    let mut seeded = MemoryStore::new();
    merge(&mut seeded, &config, &target, &base).expect("seed");

    let mut group = c.benchmark_group("merge");
    group.sample_size(20);

    group.bench_function("bootstrap_50k", |b| {
        b.iter_batched(
            MemoryStore::new,
            |mut store| {
                merge(&mut store, &config, &target, &base).expect("bootstrap");
            },
            BatchSize::LargeInput,
        );
    });

    group.bench_function("diff_50k_10pct_changed", |b| {
        b.iter(|| diff::diff(&seeded, "orders", &revised).expect("diff"));
    });

    group.bench_function("merge_50k_10pct_changed", |b| {
        b.iter_batched(
            || seeded.clone(),
            |mut store| {
                merge(&mut store, &config, &target, &revised).expect("merge");
            },
            BatchSize::LargeInput,
        );
    });

    group.finish();
    drop(temp_dir);
}

criterion_group!(benches, bench_merge);
criterion_main!(benches);
