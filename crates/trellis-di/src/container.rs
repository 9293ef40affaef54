//! The root container and its builder

use std::sync::Arc;

use tracing::{debug, info};

use crate::call_site::planner::CallSitePlanner;
use crate::descriptor::TypeFacts;
use crate::engine::{create_engine, ExecutionEngine};
use crate::error::{DIError, DIResult};
use crate::index::RegistrationIndex;
use crate::instance::Instance;
use crate::key::{LookupKey, ServiceKey};
use crate::observer::{DiagnosticsObserver, ResolutionHook, TracingObserver};
use crate::options::ContainerOptions;
use crate::registration::{Registration, ServiceLifetime};
use crate::scope::{ProviderCore, ServiceScope};
use crate::service_type::ServiceType;

/// Typed factory registration for `T`
fn typed_registration<F, T>(lifetime: ServiceLifetime, factory: F) -> Registration
where
    F: Fn(&ServiceScope) -> DIResult<Arc<T>> + Send + Sync + 'static,
    T: Send + Sync + 'static,
{
    Registration::factory(ServiceType::of::<T>(), lifetime, move |scope, _| {
        factory(scope).map(Instance::from_arc)
    })
}

/// The dependency injection container: the root provider
pub struct DIContainer {
    root: ServiceScope,
}

impl DIContainer {
    /// Create a new empty DI container with default options
    pub fn new() -> Self {
        Self::from_parts(
            RegistrationIndex::new(),
            ContainerOptions::default(),
            None,
            Arc::new(TracingObserver),
            None,
        )
    }

    pub fn builder() -> DIContainerBuilder {
        DIContainerBuilder::new()
    }

    fn from_parts(
        index: RegistrationIndex,
        options: ContainerOptions,
        hook: Option<Arc<dyn ResolutionHook>>,
        observer: Arc<dyn DiagnosticsObserver>,
        compiler: Option<Arc<dyn ExecutionEngine>>,
    ) -> Self {
        let engine = create_engine(&options, compiler, observer.clone());
        let planner = CallSitePlanner::new(index, observer.clone());
        let core = ProviderCore::new(planner, engine, options, hook, observer);
        Self {
            root: ServiceScope::root_of(Arc::new(core)),
        }
    }

    /// The root scope
    pub fn root(&self) -> &ServiceScope {
        &self.root
    }

    pub fn options(&self) -> &ContainerOptions {
        self.root.core().options()
    }

    pub fn engine_name(&self) -> &'static str {
        self.root.core().engine_name()
    }

    /// Append registrations after the container was built.
    ///
    /// Planned call sites and realized producers are discarded so later
    /// resolutions see the new winners; instances already created stay cached.
    pub fn add_registrations(&self, registrations: impl IntoIterator<Item = Registration>) -> DIResult<()> {
        let registrations: Vec<Registration> = registrations.into_iter().collect();
        let count = registrations.len();
        self.root
            .core()
            .planner()
            .update(|index| index.add_all(registrations.iter().cloned()))?;
        self.root.core().reset_realized();
        info!(count, "Added registrations to built container");
        Ok(())
    }

    /// Register a singleton service with a factory function
    pub fn register<F, T>(&self, factory: F) -> DIResult<()>
    where
        F: Fn(&ServiceScope) -> DIResult<Arc<T>> + Send + Sync + 'static,
        T: Send + Sync + 'static,
    {
        self.add_registrations([typed_registration(ServiceLifetime::Singleton, factory)])
    }

    /// Register a scoped service
    pub fn register_scoped<F, T>(&self, factory: F) -> DIResult<()>
    where
        F: Fn(&ServiceScope) -> DIResult<Arc<T>> + Send + Sync + 'static,
        T: Send + Sync + 'static,
    {
        self.add_registrations([typed_registration(ServiceLifetime::Scoped, factory)])
    }

    /// Register a transient service
    pub fn register_transient<F, T>(&self, factory: F) -> DIResult<()>
    where
        F: Fn(&ServiceScope) -> DIResult<Arc<T>> + Send + Sync + 'static,
        T: Send + Sync + 'static,
    {
        self.add_registrations([typed_registration(ServiceLifetime::Transient, factory)])
    }

    pub fn resolve<T>(&self) -> DIResult<Arc<T>>
    where
        T: Send + Sync + 'static,
    {
        self.root.resolve::<T>()
    }

    pub fn try_resolve<T>(&self) -> DIResult<Option<Arc<T>>>
    where
        T: Send + Sync + 'static,
    {
        self.root.try_resolve::<T>()
    }

    pub fn resolve_keyed<T>(&self, key: impl Into<ServiceKey>) -> DIResult<Arc<T>>
    where
        T: Send + Sync + 'static,
    {
        self.root.resolve_keyed::<T>(key)
    }

    pub fn resolve_all<T>(&self) -> DIResult<Vec<Arc<T>>>
    where
        T: Send + Sync + 'static,
    {
        self.root.resolve_all::<T>()
    }

    pub fn resolve_service(&self, service_type: &ServiceType, key: Option<&ServiceKey>) -> DIResult<Option<Instance>> {
        self.root.resolve_service(service_type, key)
    }

    pub fn resolve_required_service(&self, service_type: &ServiceType, key: Option<&ServiceKey>) -> DIResult<Instance> {
        self.root.resolve_required_service(service_type, key)
    }

    /// Check if a service is registered
    pub fn is_registered<T>(&self) -> bool
    where
        T: Send + Sync + 'static,
    {
        self.root.is_registered::<T>()
    }

    pub fn is_registered_service(&self, service_type: &ServiceType, key: Option<&ServiceKey>) -> bool {
        self.root.is_registered_service(service_type, key)
    }

    pub fn create_scope(&self) -> DIResult<ServiceScope> {
        self.root.create_scope()
    }

    /// Get the number of registrations
    pub fn service_count(&self) -> usize {
        self.root.core().planner().index().len()
    }

    /// Dispose the root scope: singletons, root-captured transients and the engine
    pub fn dispose(&self) -> DIResult<()> {
        self.root.dispose()
    }

    pub async fn dispose_async(&self) -> DIResult<()> {
        self.root.dispose_async().await
    }

    pub fn is_disposed(&self) -> bool {
        self.root.is_disposed()
    }
}

impl Default for DIContainer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DIContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DIContainer")
            .field("services", &self.service_count())
            .field("engine", &self.engine_name())
            .finish()
    }
}

/// Builder pattern for configuring the DI container
pub struct DIContainerBuilder {
    index: RegistrationIndex,
    options: ContainerOptions,
    hook: Option<Arc<dyn ResolutionHook>>,
    observer: Arc<dyn DiagnosticsObserver>,
    compiler: Option<Arc<dyn ExecutionEngine>>,
}

impl DIContainerBuilder {
    /// Create a new container builder
    pub fn new() -> Self {
        Self {
            index: RegistrationIndex::new(),
            options: ContainerOptions::default(),
            hook: None,
            observer: Arc::new(TracingObserver),
            compiler: None,
        }
    }

    /// Append a registration
    pub fn add(mut self, registration: Registration) -> DIResult<Self> {
        self.index.add(registration)?;
        Ok(self)
    }

    pub fn add_all(mut self, registrations: impl IntoIterator<Item = Registration>) -> DIResult<Self> {
        self.index.add_all(registrations)?;
        Ok(self)
    }

    /// Register an existing instance as a singleton
    pub fn add_instance<T: Send + Sync + 'static>(self, value: Arc<T>) -> DIResult<Self> {
        self.add(Registration::instance(ServiceType::of::<T>(), Instance::from_arc(value)))
    }

    /// Add only if nothing is registered for the registration's lookup key
    pub fn try_add(self, registration: Registration) -> DIResult<Self> {
        if self.index.contains(registration.lookup()) {
            debug!(service = %registration.lookup(), "Skipped try_add: already registered");
            return Ok(self);
        }
        self.add(registration)
    }

    /// Add only if no registration for the key has the same implementation
    pub fn try_add_enumerable(self, registration: Registration) -> DIResult<Self> {
        let identity = registration.implementation().identity();
        let duplicate = identity.is_some()
            && self
                .index
                .get(registration.lookup())
                .any(|existing| existing.implementation().identity() == identity);
        if duplicate {
            debug!(service = %registration.lookup(), "Skipped try_add_enumerable: implementation present");
            return Ok(self);
        }
        self.add(registration)
    }

    /// Remove the first registration for the key, then add
    pub fn replace(mut self, registration: Registration) -> DIResult<Self> {
        self.index.remove_first(registration.lookup());
        self.add(registration)
    }

    pub fn remove_all(mut self, lookup: &LookupKey) -> Self {
        let removed = self.index.remove_all(lookup);
        debug!(service = %lookup, removed, "Removed registrations");
        self
    }

    /// Register a singleton service
    pub fn register<F, T>(self, factory: F) -> DIResult<Self>
    where
        F: Fn(&ServiceScope) -> DIResult<Arc<T>> + Send + Sync + 'static,
        T: Send + Sync + 'static,
    {
        self.add(typed_registration(ServiceLifetime::Singleton, factory))
    }

    /// Register a scoped service
    pub fn register_scoped<F, T>(self, factory: F) -> DIResult<Self>
    where
        F: Fn(&ServiceScope) -> DIResult<Arc<T>> + Send + Sync + 'static,
        T: Send + Sync + 'static,
    {
        self.add(typed_registration(ServiceLifetime::Scoped, factory))
    }

    /// Register a transient service
    pub fn register_transient<F, T>(self, factory: F) -> DIResult<Self>
    where
        F: Fn(&ServiceScope) -> DIResult<Arc<T>> + Send + Sync + 'static,
        T: Send + Sync + 'static,
    {
        self.add(typed_registration(ServiceLifetime::Transient, factory))
    }

    /// Describe a type for generic constraint checks
    pub fn describe_type(mut self, service_type: ServiceType, facts: TypeFacts) -> Self {
        self.index.describe(service_type, facts);
        self
    }

    pub fn with_options(mut self, options: ContainerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_resolution_hook(mut self, hook: impl ResolutionHook + 'static) -> Self {
        self.hook = Some(Arc::new(hook));
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn DiagnosticsObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Use `compiler` as the compiled strategy
    pub fn with_compiler(mut self, compiler: Arc<dyn ExecutionEngine>) -> Self {
        self.compiler = Some(compiler);
        self
    }

    pub fn service_count(&self) -> usize {
        self.index.len()
    }

    /// Build the container
    pub fn build(self) -> DIResult<DIContainer> {
        self.options.validate()?;
        let validate = self.options.validate_on_build;
        let validate_scopes = self.options.validate_scopes;
        let count = self.index.len();

        let container = DIContainer::from_parts(
            self.index,
            self.options,
            self.hook,
            self.observer,
            self.compiler,
        );

        if validate {
            let planner = container.root.core().planner();
            let errors = planner.plan_all(validate_scopes);
            if !errors.is_empty() {
                return Err(DIError::BuildValidation { errors });
            }
        }

        info!(
            services = count,
            engine = container.engine_name(),
            "Built DI container"
        );
        Ok(container)
    }
}

impl Default for DIContainerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
