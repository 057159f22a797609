use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use di_compiler::runtime::{Instance, Service, ServiceFactories};
use di_compiler::*;
use std::sync::Arc;

struct Node;
impl Service for Node {
    fn call(&self, _method: &str, _args: runtime::Arguments) -> DiResult<Option<Instance>> {
        Ok(None)
    }
}

/// A chain `s0 -> s1 -> ... -> sN` with a setter back-edge every tenth service.
fn chain_builder(size: usize) -> ContainerBuilder {
    let mut builder = ContainerBuilder::new();
    builder.set_parameter("app.name", "bench");
    for i in 0..size {
        let mut def = Definition::new("Node").arg("%app.name%");
        if i + 1 < size {
            def = def.arg(Reference::new(format!("s{}", i + 1)));
        }
        if i % 10 == 9 {
            def = def.call("setRoot", vec![Reference::new("s0").into()]);
        }
        if i == 0 {
            def = def.public();
        }
        builder.register(format!("s{i}"), def);
    }
    builder
}

// ===== Compilation =====

fn bench_compile_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile_chain");

    for &size in &[10, 100, 1000] {
        group.bench_with_input(BenchmarkId::new("services", size), &size, |b, &size| {
            b.iter_batched(
                || chain_builder(size),
                |builder| {
                    let frozen = builder.compile().unwrap();
                    black_box(frozen.construction_order().len());
                },
                criterion::BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

fn bench_parameter_resolution(c: &mut Criterion) {
    let mut params = ParameterBag::new();
    params.set("root", "/srv/app");
    for i in 0..100 {
        params.set(format!("dir{i}"), format!("%root%/dir{i}/%%literal"));
    }

    c.bench_function("resolve_100_parameters", |b| {
        b.iter(|| {
            let resolved = params.resolve_all().unwrap();
            black_box(resolved.len());
        })
    });
}

fn bench_dump(c: &mut Criterion) {
    let frozen = chain_builder(200).compile().unwrap();

    c.bench_function("dump_json_200", |b| {
        b.iter(|| {
            let json = ArtifactDumper::new(DumpFormat::Json).dump(&frozen).unwrap();
            black_box(json.len());
        })
    });
}

// ===== Runtime =====

fn bench_shared_hit(c: &mut Criterion) {
    let factories = ServiceFactories::new().with("Node", |_| Ok(Arc::new(Node) as Instance));
    let container = chain_builder(100).compile().unwrap().into_container(factories);

    // Prime the chain
    let _ = container.get("s0").unwrap();

    c.bench_function("shared_hit", |b| {
        b.iter(|| {
            let v = container.get("s0").unwrap();
            black_box(v);
        })
    });
}

fn bench_contention(c: &mut Criterion) {
    let mut group = c.benchmark_group("contention");
    let factories = ServiceFactories::new().with("Node", |_| Ok(Arc::new(Node) as Instance));
    let container = chain_builder(10).compile().unwrap().into_container(factories);
    let _ = container.get("s0").unwrap();

    for &thread_count in &[1, 2, 4, 8] {
        group.bench_with_input(
            BenchmarkId::new("shared_threads", thread_count),
            &thread_count,
            |b, &threads| {
                b.iter_custom(|iters| {
                    let start = std::time::Instant::now();
                    crossbeam_utils::thread::scope(|s| {
                        for _ in 0..threads {
                            let container = &container;
                            s.spawn(move |_| {
                                for _ in 0..iters / threads as u64 {
                                    black_box(container.get("s0").unwrap());
                                }
                            });
                        }
                    })
                    .unwrap();
                    start.elapsed()
                })
            },
        );
    }

    group.finish();
}

criterion_group!(compile_benches, bench_compile_chain, bench_parameter_resolution, bench_dump);
criterion_group!(runtime_benches, bench_shared_hit, bench_contention);
criterion_main!(compile_benches, runtime_benches);
