//! Parameter list benchmarks
//!
//! Measures building lists and handing them across the trampoline.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ydb_varargs::buffer::BufferT;
use ydb_varargs::plist::{ParamList, MAX_VPARAMS};
use ydb_varargs::probe::{self, Echoed, FixedScenario};

fn bench_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("append");
    let buffer = BufferT::from_bytes(b"Buffer one").unwrap();

    for size in [4, 16, MAX_VPARAMS].iter() {
        group.bench_with_input(BenchmarkId::new("int", size), size, |b, &size| {
            let mut plist = ParamList::create(MAX_VPARAMS).unwrap();
            b.iter(|| {
                plist.reset();
                for i in 0..size {
                    plist.append_int(black_box(i as isize)).unwrap();
                }
                black_box(plist.len())
            });
        });

        group.bench_with_input(BenchmarkId::new("buffer", size), size, |b, &size| {
            let mut plist = ParamList::create(MAX_VPARAMS).unwrap();
            b.iter(|| {
                plist.reset();
                for _ in 0..size {
                    plist.append_buffer(black_box(buffer.descriptor())).unwrap();
                }
                black_box(plist.len())
            });
        });
    }

    group.bench_function("u64", |b| {
        let mut plist = ParamList::create(MAX_VPARAMS).unwrap();
        b.iter(|| {
            plist.reset();
            for i in 0..(MAX_VPARAMS / 3) as u64 {
                plist.append_u64(black_box(i << 33)).unwrap();
            }
            black_box(plist.len())
        });
    });

    group.finish();
}

fn bench_create(c: &mut Criterion) {
    c.bench_function("create", |b| {
        b.iter(|| ParamList::create(black_box(MAX_VPARAMS)).unwrap());
    });
}

fn bench_invoke(c: &mut Criterion) {
    let mut group = c.benchmark_group("invoke");

    group.bench_function("fixed_scenario", |b| {
        let scenario = FixedScenario::expected().unwrap();
        let mut plist = ParamList::create(MAX_VPARAMS).unwrap();
        b.iter(|| scenario.run(black_box(&mut plist)).unwrap());
    });

    for size in [1, 8, MAX_VPARAMS - 3].iter() {
        group.bench_with_input(BenchmarkId::new("echo", size), size, |b, &size| {
            let values: Vec<Echoed> = (0..size)
                .map(|i| {
                    if i % 2 == 0 {
                        Echoed::Int(i as isize)
                    } else {
                        Echoed::Bytes(vec![b'v'; i])
                    }
                })
                .collect();
            b.iter(|| probe::echo(black_box(&values)).unwrap());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_append, bench_create, bench_invoke);
criterion_main!(benches);
