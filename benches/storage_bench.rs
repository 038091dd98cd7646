//! Benchmarks for LodeDB storage operations

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use lodedb::config::{Config, WalFsync};
use lodedb::value::{Row, Value};
use lodedb::TableEngine;
use tempfile::TempDir;

fn bench_engine(fsync: WalFsync) -> (TempDir, TableEngine) {
    let temp = TempDir::new().unwrap();
    let mut cfg = Config::default().engine_config();
    cfg.wal_fsync = fsync;
    let engine = TableEngine::open(temp.path().to_path_buf(), cfg).unwrap();
    (temp, engine)
}

fn row(pk: i64) -> Row {
    let mut row = Row::new();
    row.insert("id".into(), Value::Int(pk));
    row.insert("name".into(), Value::Varchar(format!("user-{}", pk)));
    row.insert("active".into(), Value::Bool(pk % 2 == 0));
    row
}

fn storage_benchmarks(c: &mut Criterion) {
    c.bench_function("put_sequential", |b| {
        let (_temp, engine) = bench_engine(WalFsync::Off);
        let mut pk = 0i64;
        b.iter(|| {
            engine.put(Value::Int(pk), row(pk)).unwrap();
            pk += 1;
        });
    });

    c.bench_function("get_from_memtable", |b| {
        let (_temp, engine) = bench_engine(WalFsync::Off);
        for pk in 0..10_000 {
            engine.put(Value::Int(pk), row(pk)).unwrap();
        }
        let mut pk = 0i64;
        b.iter(|| {
            let hit = engine.get(&Value::Int(pk % 10_000)).unwrap();
            assert!(hit.is_some());
            pk += 1;
        });
    });

    c.bench_function("get_from_sstable", |b| {
        let (_temp, engine) = bench_engine(WalFsync::Off);
        for pk in 0..10_000 {
            engine.put(Value::Int(pk), row(pk)).unwrap();
        }
        engine.flush().unwrap();
        let mut pk = 0i64;
        b.iter(|| {
            let hit = engine.get(&Value::Int(pk % 10_000)).unwrap();
            assert!(hit.is_some());
            pk += 1;
        });
    });

    c.bench_function("scan_merged_1k", |b| {
        let (_temp, engine) = bench_engine(WalFsync::Off);
        for pk in 0..500 {
            engine.put(Value::Int(pk), row(pk)).unwrap();
        }
        engine.flush().unwrap();
        for pk in 500..1_000 {
            engine.put(Value::Int(pk), row(pk)).unwrap();
        }
        b.iter_batched(
            || (),
            |_| {
                let rows = engine.scan(false, None).unwrap();
                assert_eq!(rows.len(), 1_000);
            },
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(benches, storage_benchmarks);
criterion_main!(benches);
