//! Execution engines: interpreted and compiled producers agree, and the
//! dynamic engine promotes hot call sites in the background

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use trellis_di::*;

#[derive(Debug)]
struct Label(String);

fn named(name: &str) -> ServiceType {
    ServiceType::named(name)
}

fn label_of(args: &Arguments, index: usize) -> DIResult<String> {
    Ok(args.get::<Label>(index)?.0.clone())
}

/// Object graph with zero-arg, multi-arg, nested generic and enumerable services
fn registrations() -> Vec<Registration> {
    let handler = |name: &'static str| {
        Registration::of_type(
            named("IHandler"),
            ServiceLifetime::Transient,
            TypeDescriptor::new(named(name)).constructor(
                ConstructorDescriptor::new(move |args| Ok(Label(format!("{name}({})", label_of(args, 0)?))))
                    .param("leaf", named("Leaf")),
            ),
        )
    };

    vec![
        Registration::self_type(
            ServiceLifetime::Transient,
            TypeDescriptor::new(named("Leaf")).constructor(ConstructorDescriptor::new(|_| Ok(Label("Leaf".into())))),
        ),
        Registration::self_type(
            ServiceLifetime::Singleton,
            TypeDescriptor::new(named("Clock")).constructor(ConstructorDescriptor::new(|_| Ok(Label("Clock".into())))),
        ),
        Registration::self_type(
            ServiceLifetime::Scoped,
            TypeDescriptor::new(named("Pair")).constructor(
                ConstructorDescriptor::new(|args| {
                    Ok(Label(format!(
                        "Pair({}, {}, {})",
                        label_of(args, 0)?,
                        label_of(args, 1)?,
                        args.get::<u32>(2)?
                    )))
                })
                .param("leaf", named("Leaf"))
                .param("clock", named("Clock"))
                .optional_param("size", named("Size"), Instance::new(8u32)),
            ),
        ),
        Registration::generic(
            ServiceType::generic_definition("IRepository", 1),
            ServiceLifetime::Scoped,
            GenericImplementation::new("Repository", vec![GenericParameter::new("T")], |arguments| {
                let entity = arguments[0].to_string();
                Ok(TypeDescriptor::new(ServiceType::generic("Repository", arguments.to_vec())).constructor(
                    ConstructorDescriptor::new(move |args| {
                        Ok(Label(format!("Repository<{entity}>({})", label_of(args, 0)?)))
                    })
                    .param("clock", named("Clock")),
                ))
            }),
        ),
        Registration::generic(
            ServiceType::generic_definition("ICached", 1),
            ServiceLifetime::Transient,
            GenericImplementation::new("Cached", vec![GenericParameter::new("T")], |arguments| {
                Ok(TypeDescriptor::new(ServiceType::generic("Cached", arguments.to_vec())).constructor(
                    ConstructorDescriptor::new(|args| Ok(Label(format!("Cached({})", label_of(args, 0)?))))
                        .param("inner", arguments[0].clone()),
                ))
            }),
        ),
        handler("First"),
        handler("Second"),
        handler("Third"),
    ]
}

fn nested_generic() -> ServiceType {
    ServiceType::generic(
        "ICached",
        vec![ServiceType::generic("IRepository", vec![named("Order")])],
    )
}

/// Resolve every service of the graph once and render the results
fn render(scope: &ServiceScope) -> Vec<String> {
    let single = |service_type: ServiceType| {
        scope
            .resolve_required_service(&service_type, None)
            .unwrap()
            .downcast::<Label>()
            .unwrap()
            .0
            .clone()
    };

    let handlers = scope
        .resolve_required_service(&ServiceType::sequence_of(named("IHandler")), None)
        .unwrap()
        .downcast::<ServiceList>()
        .unwrap()
        .downcast_all::<Label>()
        .iter()
        .map(|label| label.0.clone())
        .collect::<Vec<_>>()
        .join(", ");

    vec![
        single(named("Leaf")),
        single(named("Pair")),
        single(nested_generic()),
        handlers,
    ]
}

fn expected() -> Vec<String> {
    vec![
        "Leaf".to_string(),
        "Pair(Leaf, Clock, 8)".to_string(),
        "Cached(Repository<Order>(Clock))".to_string(),
        "First(Leaf), Second(Leaf), Third(Leaf)".to_string(),
    ]
}

fn container_with(engine: EngineKind, observer: Arc<dyn DiagnosticsObserver>) -> DIContainer {
    DIContainerBuilder::new()
        .add_all(registrations())
        .unwrap()
        .with_options(ContainerOptions {
            engine,
            ..ContainerOptions::default()
        })
        .with_observer(observer)
        .build()
        .unwrap()
}

#[derive(Default)]
struct CountingObserver {
    built: AtomicUsize,
    resolved: AtomicUsize,
    compiled: AtomicUsize,
    failed: AtomicUsize,
    disposed_scopes: AtomicUsize,
}

impl DiagnosticsObserver for CountingObserver {
    fn call_site_built(&self, _call_site: &CallSite) {
        self.built.fetch_add(1, Ordering::SeqCst);
    }

    fn service_resolved(&self, _lookup: &LookupKey, _scope: u64) {
        self.resolved.fetch_add(1, Ordering::SeqCst);
    }

    fn scope_disposed(&self, _scope: u64, _disposed: usize) {
        self.disposed_scopes.fetch_add(1, Ordering::SeqCst);
    }

    fn call_site_compiled(&self, _call_site: &CallSite) {
        self.compiled.fetch_add(1, Ordering::SeqCst);
    }

    fn compilation_failed(&self, _call_site: &CallSite, _error: &DIError) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }
}

fn wait_for(counter: &AtomicUsize, target: usize) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if counter.load(Ordering::SeqCst) >= target {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}

#[test]
fn test_interpreted_and_compiled_engines_agree() {
    for engine in [EngineKind::Interpreted, EngineKind::Compiled] {
        let container = container_with(engine, Arc::new(TracingObserver));
        assert_eq!(container.engine_name(), engine.to_string());

        let scope = container.create_scope().unwrap();
        assert_eq!(render(&scope), expected(), "engine {engine}");
        assert_eq!(render(&scope), expected(), "engine {engine}");
    }
}

#[test]
fn test_compiled_engine_keeps_lifetimes() {
    let container = container_with(EngineKind::Compiled, Arc::new(TracingObserver));
    let scope = container.create_scope().unwrap();
    let other = container.create_scope().unwrap();

    let clock = scope.resolve_required_service(&named("Clock"), None).unwrap();
    assert!(clock.ptr_eq(&other.resolve_required_service(&named("Clock"), None).unwrap()));

    let pair = scope.resolve_required_service(&named("Pair"), None).unwrap();
    assert!(pair.ptr_eq(&scope.resolve_required_service(&named("Pair"), None).unwrap()));
    assert!(!pair.ptr_eq(&other.resolve_required_service(&named("Pair"), None).unwrap()));

    let leaf = scope.resolve_required_service(&named("Leaf"), None).unwrap();
    assert!(!leaf.ptr_eq(&scope.resolve_required_service(&named("Leaf"), None).unwrap()));
}

#[test]
fn test_dynamic_engine_swaps_in_compiled_producers() {
    let observer = Arc::new(CountingObserver::default());
    let container = container_with(EngineKind::Dynamic, observer.clone());
    assert_eq!(container.engine_name(), "dynamic");

    let scope = container.create_scope().unwrap();
    let clock = scope.resolve_required_service(&named("Clock"), None).unwrap();

    // First and second invocations interpret; the second schedules compilation
    assert_eq!(render(&scope), expected());
    assert_eq!(observer.compiled.load(Ordering::SeqCst), 0);
    assert_eq!(render(&scope), expected());

    assert!(wait_for(&observer.compiled, 4), "call sites were not compiled");
    assert_eq!(observer.failed.load(Ordering::SeqCst), 0);

    // Compiled producers return the same results and share cached instances
    assert_eq!(render(&scope), expected());
    scope.resolve_required_service(&named("Clock"), None).unwrap();
    let again = scope.resolve_required_service(&named("Clock"), None).unwrap();
    assert!(again.ptr_eq(&clock));

    assert!(observer.built.load(Ordering::SeqCst) > 0);
    assert!(observer.resolved.load(Ordering::SeqCst) >= 15);
}

struct FailingCompiler;

impl ExecutionEngine for FailingCompiler {
    fn name(&self) -> &'static str {
        "failing"
    }

    fn realize(&self, call_site: &Arc<CallSite>) -> DIResult<Producer> {
        Err(DIError::Compilation {
            service: call_site.service_type().to_string(),
            message: "unsupported".to_string(),
        })
    }
}

struct PanickingCompiler;

impl ExecutionEngine for PanickingCompiler {
    fn name(&self) -> &'static str {
        "panicking"
    }

    fn realize(&self, _call_site: &Arc<CallSite>) -> DIResult<Producer> {
        panic!("compiler bug")
    }
}

/// Route swallowed-failure warnings to the test output
fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

#[test]
fn test_compilation_failures_keep_the_interpreter() {
    init_tracing();
    let compilers: Vec<Arc<dyn ExecutionEngine>> = vec![Arc::new(FailingCompiler), Arc::new(PanickingCompiler)];

    for compiler in compilers {
        let observer = Arc::new(CountingObserver::default());
        let container = DIContainerBuilder::new()
            .add_all(registrations())
            .unwrap()
            .with_observer(observer.clone())
            .with_compiler(compiler)
            .build()
            .unwrap();
        let scope = container.create_scope().unwrap();

        assert_eq!(render(&scope), expected());
        assert_eq!(render(&scope), expected());
        assert!(wait_for(&observer.failed, 4), "failures were not reported");
        assert_eq!(observer.compiled.load(Ordering::SeqCst), 0);

        // Failures never surface to callers
        assert_eq!(render(&scope), expected());
    }
}

#[test]
fn test_compile_threshold_is_configurable() {
    let observer = Arc::new(CountingObserver::default());
    let container = DIContainerBuilder::new()
        .add_all(registrations())
        .unwrap()
        .with_options(ContainerOptions {
            compile_after: 3,
            ..ContainerOptions::default()
        })
        .with_observer(observer.clone())
        .build()
        .unwrap();

    for _ in 0..2 {
        container.resolve_required_service(&named("Leaf"), None).unwrap();
    }
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(observer.compiled.load(Ordering::SeqCst), 0);

    container.resolve_required_service(&named("Leaf"), None).unwrap();
    assert!(wait_for(&observer.compiled, 1));
}

#[test]
fn test_zero_compile_threshold_is_rejected() {
    let err = DIContainerBuilder::new()
        .with_options(ContainerOptions {
            compile_after: 0,
            ..ContainerOptions::default()
        })
        .build()
        .unwrap_err();
    assert!(matches!(err, DIError::InvalidOptions(_)));
}

#[test]
fn test_root_disposal_disposes_engine_once() {
    struct TrackingCompiler {
        disposed: Arc<AtomicUsize>,
    }

    impl ExecutionEngine for TrackingCompiler {
        fn name(&self) -> &'static str {
            "tracking"
        }

        fn realize(&self, call_site: &Arc<CallSite>) -> DIResult<Producer> {
            CompiledEngine.realize(call_site)
        }

        fn dispose(&self) {
            self.disposed.fetch_add(1, Ordering::SeqCst);
        }
    }

    let disposed = Arc::new(AtomicUsize::new(0));
    let observer = Arc::new(CountingObserver::default());
    let container = DIContainerBuilder::new()
        .add_all(registrations())
        .unwrap()
        .with_observer(observer.clone())
        .with_compiler(Arc::new(TrackingCompiler {
            disposed: disposed.clone(),
        }))
        .build()
        .unwrap();

    let scope = container.create_scope().unwrap();
    render(&scope);
    scope.dispose().unwrap();
    assert_eq!(disposed.load(Ordering::SeqCst), 0);

    container.dispose().unwrap();
    container.dispose().unwrap();
    assert_eq!(disposed.load(Ordering::SeqCst), 1);
    assert_eq!(observer.disposed_scopes.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_dynamic_engine_compiles_on_the_runtime() {
    let observer = Arc::new(CountingObserver::default());
    let container = container_with(EngineKind::Dynamic, observer.clone());

    container.resolve_required_service(&named("Clock"), None).unwrap();
    container.resolve_required_service(&named("Clock"), None).unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while observer.compiled.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(observer.compiled.load(Ordering::SeqCst), 1);
}

#[test]
fn test_call_site_introspection() {
    let container = container_with(EngineKind::Interpreted, Arc::new(TracingObserver));
    let scope = container.create_scope().unwrap();

    let site = scope
        .call_site(&ServiceType::sequence_of(named("IHandler")), None)
        .unwrap()
        .unwrap();
    match site.kind() {
        CallSiteKind::Enumerable { item_type, items } => {
            assert_eq!(item_type, &named("IHandler"));
            assert_eq!(items.len(), 3);
            let slots: Vec<usize> = items.iter().map(|item| item.cache().key.slot).collect();
            assert_eq!(slots, vec![2, 1, 0]);
        }
        other => panic!("unexpected call site {other:?}"),
    }
    assert_eq!(site.cache().location, CacheLocation::None);

    let pair = scope.call_site(&named("Pair"), None).unwrap().unwrap();
    assert_eq!(pair.cache().location, CacheLocation::Scope);
    assert!(scope.call_site(&named("Missing"), None).unwrap().is_none());
}
