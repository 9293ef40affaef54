//! Scopes: per-scope instance caches, disposal tracking and the resolution entry point
//!
//! Every [`ServiceScope`] shares one provider core (planner, engine, realized
//! producers) and owns a [`ScopeState`]. The root scope's state additionally
//! holds singletons. A scope moves from active to disposed exactly once;
//! disposal releases captured instances in reverse creation order.

use std::cell::RefCell;
use std::mem;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::call_site::validator::{validate_call_site, validate_resolution};
use crate::call_site::planner::CallSitePlanner;
use crate::call_site::{CacheLocation, CallSite, ResultCache};
use crate::engine::{ExecutionEngine, Producer};
use crate::error::{DIError, DIResult};
use crate::instance::{AsyncDispose, DisposeHandle, Instance, ServiceList};
use crate::key::{LookupKey, ServiceCacheKey, ServiceKey};
use crate::observer::{DiagnosticsObserver, ResolutionHook};
use crate::options::{AsyncDisposePolicy, ContainerOptions};
use crate::service_type::ServiceType;

/// Instances cached under `(lookup key, slot)`.
///
/// Each key gets its own once-cell, so concurrent first resolutions of one
/// singleton construct it once while other keys proceed independently.
#[derive(Default)]
pub(crate) struct InstanceCache {
    cells: DashMap<ServiceCacheKey, Arc<OnceCell<Instance>>>,
}

impl InstanceCache {
    /// Returns the instance and whether this call created it
    fn get_or_try_init(
        &self,
        key: &ServiceCacheKey,
        scope: u64,
        init: impl FnOnce() -> DIResult<Instance>,
    ) -> DIResult<(Instance, bool)> {
        let cell = self.cells.entry(key.clone()).or_default().value().clone();
        if let Some(instance) = cell.get() {
            return Ok((instance.clone(), false));
        }

        let _activation = Activation::enter(scope, key)?;
        let mut created = false;
        let instance = cell.get_or_try_init(|| {
            created = true;
            init()
        })?;
        Ok((instance.clone(), created))
    }

    pub(crate) fn len(&self) -> usize {
        self.cells.iter().filter(|cell| cell.value().get().is_some()).count()
    }

    fn clear(&self) {
        self.cells.clear();
    }
}

thread_local! {
    static ACTIVE: RefCell<Vec<(u64, ServiceCacheKey)>> = const { RefCell::new(Vec::new()) };
}

/// Marks a cached instance as under construction on this thread.
///
/// A factory that resolves the instance it is producing would otherwise wait
/// on its own once-cell.
struct Activation;

impl Activation {
    fn enter(scope: u64, key: &ServiceCacheKey) -> DIResult<Self> {
        ACTIVE.with(|active| {
            let mut active = active.borrow_mut();
            if active.iter().any(|(s, k)| *s == scope && k == key) {
                let mut path: Vec<String> = active
                    .iter()
                    .filter(|(s, _)| *s == scope)
                    .map(|(_, k)| k.lookup.to_string())
                    .collect();
                path.push(key.lookup.to_string());
                return Err(DIError::CircularDependency {
                    service: key.lookup.to_string(),
                    detail: " while it was being constructed".to_string(),
                    path: path.join(" -> "),
                });
            }
            active.push((scope, key.clone()));
            Ok(Activation)
        })
    }
}

impl Drop for Activation {
    fn drop(&mut self) {
        ACTIVE.with(|active| {
            active.borrow_mut().pop();
        });
    }
}

/// Runtime state of one scope
pub(crate) struct ScopeState {
    id: u64,
    is_root: bool,
    instances: InstanceCache,
    disposables: Mutex<Vec<Instance>>,
    disposed: AtomicBool,
}

impl ScopeState {
    fn new(id: u64, is_root: bool) -> Self {
        Self {
            id,
            is_root,
            instances: InstanceCache::default(),
            disposables: Mutex::new(Vec::new()),
            disposed: AtomicBool::new(false),
        }
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Cached instance for `key`, producing and capturing it on first use
    fn cached(&self, key: &ServiceCacheKey, produce: impl FnOnce() -> DIResult<Instance>) -> DIResult<Instance> {
        if self.is_disposed() {
            return Err(DIError::Disposed { scope: self.id });
        }
        let (instance, created) = self.instances.get_or_try_init(key, self.id, produce)?;
        if created {
            self.capture(&instance)?;
        }
        Ok(instance)
    }

    /// Track a disposable instance for release when this scope is disposed
    fn capture(&self, instance: &Instance) -> DIResult<()> {
        if !instance.is_disposable() {
            return Ok(());
        }
        let mut disposables = self.disposables.lock();
        if self.is_disposed() {
            drop(disposables);
            if let Some(DisposeHandle::Sync(d) | DisposeHandle::Both(d, _)) = instance.disposal() {
                d.dispose();
            }
            return Err(DIError::Disposed { scope: self.id });
        }
        disposables.push(instance.clone());
        Ok(())
    }

    /// Flip to disposed; `None` if that already happened
    fn begin_dispose(&self) -> Option<Vec<Instance>> {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return None;
        }
        let mut items = mem::take(&mut *self.disposables.lock());
        items.reverse();
        Some(items)
    }
}

struct Realized {
    producer: Producer,
    call_site: Arc<CallSite>,
    scoped_dependency: Option<ServiceType>,
}

/// State shared by the root and every child scope
pub(crate) struct ProviderCore {
    planner: CallSitePlanner,
    engine: Arc<dyn ExecutionEngine>,
    realized: DashMap<LookupKey, Option<Arc<Realized>>>,
    root: Arc<ScopeState>,
    options: ContainerOptions,
    hook: Option<Arc<dyn ResolutionHook>>,
    observer: Arc<dyn DiagnosticsObserver>,
    engine_disposed: AtomicBool,
    next_scope_id: AtomicU64,
}

impl ProviderCore {
    pub(crate) fn new(
        planner: CallSitePlanner,
        engine: Arc<dyn ExecutionEngine>,
        options: ContainerOptions,
        hook: Option<Arc<dyn ResolutionHook>>,
        observer: Arc<dyn DiagnosticsObserver>,
    ) -> Self {
        Self {
            planner,
            engine,
            realized: DashMap::new(),
            root: Arc::new(ScopeState::new(0, true)),
            options,
            hook,
            observer,
            engine_disposed: AtomicBool::new(false),
            next_scope_id: AtomicU64::new(1),
        }
    }

    pub(crate) fn planner(&self) -> &CallSitePlanner {
        &self.planner
    }

    pub(crate) fn options(&self) -> &ContainerOptions {
        &self.options
    }

    pub(crate) fn engine_name(&self) -> &'static str {
        self.engine.name()
    }

    /// Forget producers so the next resolution re-plans against the current index
    pub(crate) fn reset_realized(&self) {
        self.realized.clear();
    }

    fn realize(&self, lookup: &LookupKey) -> DIResult<Option<Arc<Realized>>> {
        loop {
            if let Some(realized) = self.realized.get(lookup).map(|entry| entry.value().clone()) {
                return Ok(realized);
            }

            let generation = self.planner.generation();
            let realized = match self.planner.plan(lookup)? {
                Some(call_site) => {
                    let scoped_dependency = if self.options.validate_scopes {
                        validate_call_site(&call_site)?
                    } else {
                        None
                    };
                    let producer = self.engine.realize(&call_site)?;
                    Some(Arc::new(Realized {
                        producer,
                        call_site,
                        scoped_dependency,
                    }))
                }
                None => None,
            };

            let published = self.planner.publish_if_current(generation, || {
                self.realized
                    .entry(lookup.clone())
                    .or_insert(realized)
                    .value()
                    .clone()
            });
            match published {
                Some(realized) => return Ok(realized),
                // Registrations changed while planning; plan again
                None => debug!(service = %lookup, "Discarded plan made against a replaced index"),
            }
        }
    }

    fn dispose_engine(&self) {
        if !self.engine_disposed.swap(true, Ordering::AcqRel) {
            self.engine.dispose();
            info!(engine = self.engine.name(), "Disposed execution engine");
        }
    }
}

/// A resolution scope. Cloning yields another handle to the same scope.
#[derive(Clone)]
pub struct ServiceScope {
    core: Arc<ProviderCore>,
    state: Arc<ScopeState>,
}

impl ServiceScope {
    pub(crate) fn root_of(core: Arc<ProviderCore>) -> Self {
        let state = core.root.clone();
        Self { core, state }
    }

    pub(crate) fn core(&self) -> &Arc<ProviderCore> {
        &self.core
    }

    pub fn id(&self) -> u64 {
        self.state.id
    }

    pub fn is_root(&self) -> bool {
        self.state.is_root
    }

    pub fn is_disposed(&self) -> bool {
        self.state.is_disposed() || self.core.root.is_disposed()
    }

    /// The root scope this scope belongs to
    pub fn root(&self) -> ServiceScope {
        Self::root_of(self.core.clone())
    }

    fn ensure_active(&self) -> DIResult<()> {
        if self.is_disposed() {
            return Err(DIError::Disposed { scope: self.state.id });
        }
        Ok(())
    }

    /// Create a child scope of this scope's root
    pub fn create_scope(&self) -> DIResult<ServiceScope> {
        self.ensure_active()?;
        let id = self.core.next_scope_id.fetch_add(1, Ordering::Relaxed);
        debug!(scope = id, "Created scope");
        Ok(ServiceScope {
            core: self.core.clone(),
            state: Arc::new(ScopeState::new(id, false)),
        })
    }

    /// Resolve `service_type` under an optional key; `Ok(None)` if nothing can produce it
    pub fn resolve_service(&self, service_type: &ServiceType, key: Option<&ServiceKey>) -> DIResult<Option<Instance>> {
        self.ensure_active()?;
        let lookup = LookupKey::new(service_type.clone(), key.cloned());
        let Some(realized) = self.core.realize(&lookup)? else {
            return Ok(None);
        };

        if self.core.options.validate_scopes {
            validate_resolution(&lookup, realized.scoped_dependency.as_ref(), self.state.is_root)?;
        }

        let instance = (realized.producer)(self)?;
        if let Some(hook) = &self.core.hook {
            hook.on_resolved(service_type, &instance);
        }
        self.core.observer.service_resolved(&lookup, self.state.id);
        Ok(Some(instance))
    }

    pub fn resolve_required_service(&self, service_type: &ServiceType, key: Option<&ServiceKey>) -> DIResult<Instance> {
        self.resolve_service(service_type, key)?
            .ok_or_else(|| DIError::ServiceNotRegistered {
                service_type: LookupKey::new(service_type.clone(), key.cloned()).to_string(),
            })
    }

    /// Whether `service_type` could be resolved, without planning it
    pub fn is_registered_service(&self, service_type: &ServiceType, key: Option<&ServiceKey>) -> bool {
        let lookup = LookupKey::new(service_type.clone(), key.cloned());
        self.core.planner.index().is_known_service(&lookup)
    }

    /// Resolve a service instance
    pub fn resolve<T>(&self) -> DIResult<Arc<T>>
    where
        T: Send + Sync + 'static,
    {
        let instance = self.resolve_required_service(&ServiceType::of::<T>(), None)?;
        downcast(&instance)
    }

    /// Resolve a service instance if one is registered
    pub fn try_resolve<T>(&self) -> DIResult<Option<Arc<T>>>
    where
        T: Send + Sync + 'static,
    {
        match self.resolve_service(&ServiceType::of::<T>(), None)? {
            Some(instance) => downcast(&instance).map(Some),
            None => Ok(None),
        }
    }

    pub fn resolve_keyed<T>(&self, key: impl Into<ServiceKey>) -> DIResult<Arc<T>>
    where
        T: Send + Sync + 'static,
    {
        let key = key.into();
        let instance = self.resolve_required_service(&ServiceType::of::<T>(), Some(&key))?;
        downcast(&instance)
    }

    /// Every registration of `T`, in declaration order
    pub fn resolve_all<T>(&self) -> DIResult<Vec<Arc<T>>>
    where
        T: Send + Sync + 'static,
    {
        let sequence = ServiceType::sequence_of(ServiceType::of::<T>());
        let list = self.resolve_required_service(&sequence, None)?;
        Ok(downcast::<ServiceList>(&list)?.downcast_all::<T>())
    }

    pub fn resolve_all_keyed<T>(&self, key: impl Into<ServiceKey>) -> DIResult<Vec<Arc<T>>>
    where
        T: Send + Sync + 'static,
    {
        let key = key.into();
        let sequence = ServiceType::sequence_of(ServiceType::of::<T>());
        let list = self.resolve_required_service(&sequence, Some(&key))?;
        Ok(downcast::<ServiceList>(&list)?.downcast_all::<T>())
    }

    /// Check if a service is registered
    pub fn is_registered<T>(&self) -> bool
    where
        T: Send + Sync + 'static,
    {
        self.is_registered_service(&ServiceType::of::<T>(), None)
    }

    /// Number of instances currently cached by this scope
    pub fn cached_instances(&self) -> usize {
        self.state.instances.len()
    }

    /// Number of captured instances awaiting disposal
    pub fn pending_disposals(&self) -> usize {
        self.state.disposables.lock().len()
    }

    /// Run `produce` through the cache tier named by `cache`
    pub(crate) fn resolve_cached(
        &self,
        cache: &ResultCache,
        produce: impl FnOnce(&ServiceScope) -> DIResult<Instance>,
    ) -> DIResult<Instance> {
        match cache.location {
            CacheLocation::Root => {
                let root = self.root();
                root.state.cached(&cache.key, || produce(&root))
            }
            CacheLocation::Scope => self.state.cached(&cache.key, || produce(self)),
            CacheLocation::DisposeOnly => {
                let instance = produce(self)?;
                self.state.capture(&instance)?;
                Ok(instance)
            }
            CacheLocation::None => produce(self),
        }
    }

    /// Dispose captured instances in reverse creation order.
    ///
    /// Idempotent. Instances that only support async disposal follow the
    /// container's [`AsyncDisposePolicy`]. Disposing the root also disposes the
    /// execution engine.
    pub fn dispose(&self) -> DIResult<()> {
        let Some(items) = self.state.begin_dispose() else {
            return Ok(());
        };
        let count = items.len();
        let mut rejected = None;

        for instance in items {
            match instance.disposal() {
                Some(DisposeHandle::Sync(d) | DisposeHandle::Both(d, _)) => d.dispose(),
                Some(DisposeHandle::Async(d)) => match self.core.options.async_dispose {
                    AsyncDisposePolicy::Block => block_on_detached(d.clone(), instance.type_name()),
                    AsyncDisposePolicy::Reject => {
                        warn!(type_name = instance.type_name(), "Skipped async-only disposable");
                        rejected.get_or_insert(DIError::AsyncDisposeOnly {
                            type_name: instance.type_name().to_string(),
                        });
                    }
                },
                None => {}
            }
        }

        self.finish_dispose(count);
        match rejected {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Dispose captured instances, awaiting async disposal where supported
    pub async fn dispose_async(&self) -> DIResult<()> {
        let Some(items) = self.state.begin_dispose() else {
            return Ok(());
        };
        let count = items.len();

        for instance in items {
            if let Some(handle) = instance.disposal() {
                handle.dispose_async().await;
            }
        }

        self.finish_dispose(count);
        Ok(())
    }

    fn finish_dispose(&self, count: usize) {
        self.state.instances.clear();
        if self.state.is_root {
            self.core.dispose_engine();
            self.core.realized.clear();
        }
        self.core.observer.scope_disposed(self.state.id, count);
    }

    /// Call site the next resolution of `lookup` would execute
    pub fn call_site(&self, service_type: &ServiceType, key: Option<&ServiceKey>) -> DIResult<Option<Arc<CallSite>>> {
        let lookup = LookupKey::new(service_type.clone(), key.cloned());
        Ok(self.core.realize(&lookup)?.map(|realized| realized.call_site.clone()))
    }
}

impl std::fmt::Debug for ServiceScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceScope")
            .field("id", &self.state.id)
            .field("is_root", &self.state.is_root)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

fn downcast<T: Send + Sync + 'static>(instance: &Instance) -> DIResult<Arc<T>> {
    instance.downcast::<T>().ok_or_else(|| DIError::InvalidServiceType {
        message: format!(
            "Service type mismatch during downcast: expected '{}', found '{}'",
            std::any::type_name::<T>(),
            instance.type_name()
        ),
    })
}

/// Drive an async disposal to completion from synchronous code.
///
/// Runs on a fresh thread with its own current-thread runtime, so it works
/// whether or not the caller is itself inside a tokio runtime.
fn block_on_detached(target: Arc<dyn AsyncDispose>, type_name: &'static str) {
    let spawned = std::thread::Builder::new()
        .name("di-dispose".to_string())
        .spawn(move || {
            match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                Ok(runtime) => runtime.block_on(target.dispose_async()),
                Err(err) => warn!(type_name, error = %err, "Failed to build disposal runtime"),
            }
        });

    match spawned {
        Ok(handle) => {
            if handle.join().is_err() {
                warn!(type_name, "Async disposal panicked");
            }
        }
        Err(err) => warn!(type_name, error = %err, "Failed to spawn disposal thread"),
    }
}

/// Services every container answers without a registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinService {
    /// The resolving [`ServiceScope`] itself
    Provider,
    /// A [`ScopeFactory`] over the root
    ScopeFactory,
    /// A [`ServiceProbe`] answering is-service queries
    IsService,
}

impl BuiltinService {
    pub fn from_type(service_type: &ServiceType) -> Option<Self> {
        [
            BuiltinService::Provider,
            BuiltinService::ScopeFactory,
            BuiltinService::IsService,
        ]
        .into_iter()
        .find(|builtin| &builtin.service_type() == service_type)
    }

    pub fn service_type(self) -> ServiceType {
        match self {
            BuiltinService::Provider => ServiceType::of::<ServiceScope>(),
            BuiltinService::ScopeFactory => ServiceType::of::<ScopeFactory>(),
            BuiltinService::IsService => ServiceType::of::<ServiceProbe>(),
        }
    }

    pub(crate) fn produce(self, scope: &ServiceScope) -> Instance {
        match self {
            BuiltinService::Provider => Instance::new(scope.clone()),
            BuiltinService::ScopeFactory => Instance::new(ScopeFactory { root: scope.root() }),
            BuiltinService::IsService => Instance::new(ServiceProbe { scope: scope.clone() }),
        }
    }
}

/// Creates child scopes; resolvable from any scope
#[derive(Debug, Clone)]
pub struct ScopeFactory {
    root: ServiceScope,
}

impl ScopeFactory {
    pub fn create_scope(&self) -> DIResult<ServiceScope> {
        self.root.create_scope()
    }
}

/// Answers whether a type can be resolved; resolvable from any scope
#[derive(Debug, Clone)]
pub struct ServiceProbe {
    scope: ServiceScope,
}

impl ServiceProbe {
    pub fn is_service(&self, service_type: &ServiceType, key: Option<&ServiceKey>) -> bool {
        self.scope.is_registered_service(service_type, key)
    }
}
