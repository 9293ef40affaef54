//! Performance benchmarks for the DI container

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use trellis_di::{
    ConstructorDescriptor, ContainerOptions, DIContainer, DIContainerBuilder, DIResult, EngineKind, Instance,
    Registration, ServiceLifetime, ServiceList, ServiceType, TypeDescriptor,
};

/// Simple test service for benchmarking
#[derive(Debug, Clone)]
struct TestService {
    id: u32,
    data: Vec<u8>,
}

impl TestService {
    fn new(id: u32) -> Self {
        Self {
            id,
            data: vec![0; 1024], // 1KB of data
        }
    }
}

/// Depth of a service; each level depends on the one below it
#[derive(Debug)]
struct Level(usize);

/// Chain of transient services `Level0 <- Level1 <- ... <- Level{depth-1}`
fn chain(depth: usize) -> Vec<Registration> {
    (0..depth)
        .map(|level| {
            let descriptor = TypeDescriptor::new(ServiceType::named(format!("Level{level}")));
            let constructor = if level == 0 {
                ConstructorDescriptor::new(|_| Ok(Level(0)))
            } else {
                ConstructorDescriptor::new(move |args| Ok(Level(args.get::<Level>(0)?.0 + 1)))
                    .param("inner", ServiceType::named(format!("Level{}", level - 1)))
            };
            Registration::self_type(ServiceLifetime::Transient, descriptor.constructor(constructor))
        })
        .collect()
}

fn chain_container(depth: usize, engine: EngineKind) -> DIContainer {
    DIContainerBuilder::new()
        .add_all(chain(depth))
        .unwrap()
        .with_options(ContainerOptions {
            engine,
            ..ContainerOptions::default()
        })
        .build()
        .unwrap()
}

fn benchmark_service_registration(c: &mut Criterion) {
    c.bench_function("register_singleton_service", |b| {
        b.iter(|| {
            let container = DIContainer::new();
            let result = container.register(|_| {
                let service = Arc::new(TestService::new(black_box(42)));
                Ok(service)
            });
            black_box(result)
        })
    });

    c.bench_function("register_transient_service", |b| {
        b.iter(|| {
            let container = DIContainer::new();
            let result = container.register_transient(|_| {
                let service = Arc::new(TestService::new(black_box(42)));
                Ok(service)
            });
            black_box(result)
        })
    });

    c.bench_function("build_container_with_chain", |b| {
        b.iter(|| {
            let container = DIContainerBuilder::new().add_all(chain(black_box(32))).and_then(|builder| builder.build());
            black_box(container)
        })
    });
}

fn benchmark_service_resolution(c: &mut Criterion) {
    let container = DIContainerBuilder::new()
        .register(|_| Ok(Arc::new(TestService::new(42))))
        .unwrap()
        .register_transient(|_| Ok(Arc::new(String::from("transient"))))
        .unwrap()
        .register_scoped(|_| Ok(Arc::new(TestService::new(7).id)))
        .unwrap()
        .build()
        .unwrap();

    c.bench_function("resolve_singleton_service", |b| {
        b.iter(|| {
            let result: DIResult<Arc<TestService>> = container.resolve();
            black_box(result)
        })
    });

    c.bench_function("resolve_transient_service", |b| {
        b.iter(|| {
            let result: DIResult<Arc<String>> = container.resolve();
            black_box(result)
        })
    });

    c.bench_function("resolve_scoped_service", |b| {
        let scope = container.create_scope().unwrap();
        b.iter(|| {
            let result: DIResult<Arc<u32>> = scope.resolve();
            black_box(result)
        })
    });

    c.bench_function("create_and_dispose_scope", |b| {
        b.iter(|| {
            let scope = container.create_scope().unwrap();
            let _: DIResult<Arc<u32>> = scope.resolve();
            black_box(scope.dispose())
        })
    });
}

fn benchmark_engines(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve_chain");
    for engine in [EngineKind::Interpreted, EngineKind::Compiled, EngineKind::Dynamic] {
        for depth in [4usize, 16, 64] {
            let container = chain_container(depth, engine);
            let top = ServiceType::named(format!("Level{}", depth - 1));
            // Warm the call-site cache and let the dynamic engine swap
            for _ in 0..4 {
                container.resolve_required_service(&top, None).unwrap();
            }
            group.bench_with_input(BenchmarkId::new(engine.to_string(), depth), &top, |b, top| {
                b.iter(|| black_box(container.resolve_required_service(top, None)))
            });
        }
    }
    group.finish();
}

fn benchmark_enumerables(c: &mut Criterion) {
    let service = ServiceType::named("IPlugin");
    let mut builder = DIContainerBuilder::new();
    for id in 0..16u32 {
        builder = builder
            .add(Registration::factory(service.clone(), ServiceLifetime::Transient, move |_, _| {
                Ok(Instance::new(TestService::new(id)))
            }))
            .unwrap();
    }
    let container = builder.build().unwrap();
    let sequence = ServiceType::sequence_of(service);

    c.bench_function("resolve_enumerable_16", |b| {
        b.iter(|| {
            let list = container.resolve_required_service(&sequence, None).unwrap();
            black_box(list.downcast::<ServiceList>().map(|list| list.len()))
        })
    });
}

fn benchmark_container_operations(c: &mut Criterion) {
    c.bench_function("create_container", |b| {
        b.iter(|| {
            let container = DIContainer::new();
            black_box(container)
        })
    });

    c.bench_function("check_service_registration", |b| {
        let container = DIContainer::new();
        container.register(|_| Ok(Arc::new(TestService::new(42)))).unwrap();

        b.iter(|| {
            let result = container.is_registered::<TestService>();
            black_box(result)
        })
    });

    c.bench_function("memory_overhead_per_service", |b| {
        b.iter(|| {
            let container = DIContainer::new();
            for id in 1..=3 {
                container.register(move |_| Ok(Arc::new(TestService::new(id)))).unwrap();
            }

            // Force resolution to create instances
            for _ in 0..3 {
                let service: DIResult<Arc<TestService>> = container.resolve();
                black_box(service.map(|service| service.data.len()).ok());
            }

            black_box(container.service_count())
        })
    });
}

criterion_group!(
    benches,
    benchmark_service_registration,
    benchmark_service_resolution,
    benchmark_engines,
    benchmark_enumerables,
    benchmark_container_operations
);
criterion_main!(benches);
