//! Throughput Benchmark for ccdb
//!
//! Measures the storage engine, the RESP codec and the full dispatch path
//! under a few representative workloads.

use bytes::Bytes;
use ccdb::commands::CommandHandler;
use ccdb::protocol::{parse_message, RespValue};
use ccdb::storage::StorageEngine;
use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use std::sync::Arc;
use std::time::Duration;

fn make_command(args: &[&str]) -> RespValue {
    RespValue::array(
        args.iter()
            .map(|s| RespValue::bulk_string(Bytes::from(s.to_string())))
            .collect(),
    )
}

fn bench_set(c: &mut Criterion) {
    let engine = Arc::new(StorageEngine::new());

    let mut group = c.benchmark_group("set");
    group.throughput(Throughput::Elements(1));

    group.bench_function("set_small", |b| {
        let mut i = 0u64;
        b.iter(|| {
            engine.set(Bytes::from(format!("key:{}", i)), Bytes::from("small_value"));
            i += 1;
        });
    });

    group.bench_function("set_with_expiry", |b| {
        let mut i = 0u64;
        b.iter(|| {
            engine.set_with_expiry(
                Bytes::from(format!("ttl:{}", i)),
                Bytes::from("value"),
                Duration::from_secs(3600),
            );
            i += 1;
        });
    });

    group.finish();
}

fn bench_get(c: &mut Criterion) {
    let engine = Arc::new(StorageEngine::new());

    for i in 0..100_000 {
        engine.set(
            Bytes::from(format!("key:{}", i)),
            Bytes::from(format!("value:{}", i)),
        );
    }

    let mut group = c.benchmark_group("get");
    group.throughput(Throughput::Elements(1));

    group.bench_function("get_existing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("key:{}", i % 100_000);
            black_box(engine.get(key.as_bytes()).ok());
            i += 1;
        });
    });

    group.bench_function("get_missing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("missing:{}", i);
            black_box(engine.get(key.as_bytes()).ok());
            i += 1;
        });
    });

    group.finish();
}

fn bench_incr(c: &mut Criterion) {
    let engine = Arc::new(StorageEngine::new());

    let mut group = c.benchmark_group("incr");
    group.throughput(Throughput::Elements(1));

    group.bench_function("single_counter", |b| {
        b.iter(|| {
            black_box(engine.incr(b"counter").ok());
        });
    });

    group.finish();
}

fn bench_lists(c: &mut Criterion) {
    let engine = Arc::new(StorageEngine::new());

    for i in 0..1_000 {
        engine
            .rpush(Bytes::from("list"), vec![Bytes::from(format!("item:{}", i))])
            .ok();
    }

    let mut group = c.benchmark_group("lists");

    group.bench_function("lpush", |b| {
        b.iter(|| {
            black_box(engine.lpush(Bytes::from("pushed"), vec![Bytes::from("x")]).ok());
        });
    });

    group.bench_function("lrange_100", |b| {
        b.iter(|| {
            black_box(engine.lrange(b"list", 0, 100).ok());
        });
    });

    group.finish();
}

fn bench_sweep(c: &mut Criterion) {
    let mut group = c.benchmark_group("expiry");

    group.bench_function("sweep_10k_expired", |b| {
        b.iter_batched(
            || {
                let engine = StorageEngine::new();
                for i in 0..10_000 {
                    engine.set_with_expiry(
                        Bytes::from(format!("key:{}", i)),
                        Bytes::from("value"),
                        Duration::from_nanos(1),
                    );
                }
                std::thread::sleep(Duration::from_millis(1));
                engine
            },
            |engine| black_box(engine.sweep_expired()),
            BatchSize::LargeInput,
        );
    });

    group.finish();
}

fn bench_protocol(c: &mut Criterion) {
    let request = make_command(&["SET", "user:1000", "some moderately sized value"]).serialize();

    let mut group = c.benchmark_group("protocol");
    group.throughput(Throughput::Bytes(request.len() as u64));

    group.bench_function("parse_set", |b| {
        b.iter(|| black_box(parse_message(&request).ok()));
    });

    group.finish();
}

fn bench_dispatch(c: &mut Criterion) {
    let handler = CommandHandler::in_memory(Arc::new(StorageEngine::new()));
    let set = make_command(&["SET", "k", "v"]).serialize();
    let get = make_command(&["GET", "k"]).serialize();

    let mut group = c.benchmark_group("dispatch");
    group.throughput(Throughput::Elements(2));

    group.bench_function("set_then_get", |b| {
        b.iter(|| {
            black_box(handler.handle_buffer(&set).ok());
            black_box(handler.handle_buffer(&get).ok());
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_set,
    bench_get,
    bench_incr,
    bench_lists,
    bench_sweep,
    bench_protocol,
    bench_dispatch,
);

criterion_main!(benches);
