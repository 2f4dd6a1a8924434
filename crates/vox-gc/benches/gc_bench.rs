//! GC Performance Benchmarks
//!
//! Measures collection pause times and allocation throughput.
//!
//! Run with: `cargo bench -p vox-gc`

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use std::time::{Duration, Instant};
use vox_gc::{Heap, HeapConfig, Value};

fn create_test_heap() -> Heap {
    Heap::with_config(HeapConfig {
        space_size: 16 * 1024 * 1024, // 16MB
        ..HeapConfig::default()
    })
}

/// Benchmark GC pause time for various heap sizes
fn gc_pause_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("gc_pause");

    for num_objects in [100, 1000, 5000, 10000].iter() {
        group.bench_with_input(
            BenchmarkId::new("objects", num_objects),
            num_objects,
            |b, &n| {
                b.iter_custom(|iters| {
                    let mut total_duration = Duration::ZERO;

                    for _ in 0..iters {
                        let mut heap = create_test_heap();

                        // Half the boxes stay reachable from the root array
                        let live = heap.new_array(n / 2, &mut ()).unwrap();
                        let mut roots = vec![Value::Obj(live)];
                        for i in 0..n {
                            let value = heap.new_number(i as f64, &mut roots).unwrap();
                            roots.push(value.into());
                            let boxed = heap.new_array(1, &mut roots).unwrap();
                            let value = roots.pop().unwrap();
                            heap.array_set(boxed, 0, value).unwrap();
                            if i % 2 == 0 {
                                let live = roots[0].as_obj().unwrap();
                                heap.array_set(live, i / 2, boxed.into()).unwrap();
                            }
                        }

                        let start = Instant::now();
                        heap.collect_garbage(&mut roots);
                        total_duration += start.elapsed();

                        black_box(&roots);
                    }

                    total_duration
                });
            },
        );
    }

    group.finish();
}

/// Benchmark allocation throughput
fn allocation_throughput_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("allocation_throughput");

    group.bench_function("numbers_1000", |b| {
        b.iter(|| {
            let mut heap = create_test_heap();
            for i in 0..1000 {
                let n = heap.new_number(i as f64, &mut ()).unwrap();
                black_box(n);
            }
        });
    });

    group.bench_function("tables_with_entries_1000", |b| {
        b.iter(|| {
            let mut heap = create_test_heap();
            let mut roots = vec![Value::Nil];
            for i in 0..1000 {
                let t = heap.new_table(&mut roots).unwrap();
                roots[0] = t.into();
                for key in [b"a".as_slice(), b"b", b"c"] {
                    let k = heap.new_string(key, &mut roots).unwrap();
                    let t = roots[0].as_obj().unwrap();
                    heap.table_set(t, k.into(), Value::Nil, &mut roots).unwrap();
                }
                black_box(i);
            }
        });
    });

    // Small heap: allocation keeps hitting the collector
    group.bench_function("churn_small_heap", |b| {
        b.iter(|| {
            let mut heap = Heap::with_config(HeapConfig {
                space_size: 64 * 1024,
                ..HeapConfig::default()
            });
            let mut roots = vec![Value::Nil];
            for i in 0..10_000 {
                let n = heap.new_number(i as f64, &mut roots).unwrap();
                if i % 100 == 0 {
                    roots[0] = n.into();
                }
            }
            black_box(heap.stats().collections);
        });
    });

    group.finish();
}

/// Benchmark GC with circular references
fn gc_circular_refs_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("gc_circular");

    group.bench_function("cycles_100", |b| {
        b.iter_custom(|iters| {
            let mut total_duration = Duration::ZERO;

            for _ in 0..iters {
                let mut heap = create_test_heap();

                // 100 array pairs pointing at each other, all garbage
                for _ in 0..100 {
                    let a = heap.new_array(1, &mut ()).unwrap();
                    let b = heap.new_array(1, &mut ()).unwrap();
                    heap.array_set(a, 0, b.into()).unwrap();
                    heap.array_set(b, 0, a.into()).unwrap();
                }

                let start = Instant::now();
                heap.collect_garbage(&mut ());
                total_duration += start.elapsed();
            }

            total_duration
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    gc_pause_benchmark,
    allocation_throughput_benchmark,
    gc_circular_refs_benchmark
);
criterion_main!(benches);
