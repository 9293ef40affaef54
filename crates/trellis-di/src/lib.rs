//! Dependency injection resolution engine
//!
//! This crate turns a list of service registrations into a provider that
//! resolves object graphs: it plans a call-site tree per requested service,
//! caches instances per lifetime (singleton, scoped, transient), detects
//! circular dependencies, tracks disposable instances per scope, and executes
//! call sites through a pluggable engine that can compile hot paths in the
//! background.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use trellis_di::{
//!     ConstructorDescriptor, DIContainerBuilder, Registration, ServiceLifetime, ServiceType,
//!     TypeDescriptor,
//! };
//!
//! struct Clock;
//! struct Greeter {
//!     clock: Arc<Clock>,
//! }
//!
//! let container = DIContainerBuilder::new()
//!     .register(|_| Ok(Arc::new(Clock)))
//!     .unwrap()
//!     .add(Registration::self_type(
//!         ServiceLifetime::Transient,
//!         TypeDescriptor::of::<Greeter>().constructor(
//!             ConstructorDescriptor::new(|args| Ok(Greeter { clock: args.get::<Clock>(0)? }))
//!                 .param("clock", ServiceType::of::<Clock>()),
//!         ),
//!     ))
//!     .unwrap()
//!     .build()
//!     .unwrap();
//!
//! let greeter = container.resolve::<Greeter>().unwrap();
//! let clock = container.resolve::<Clock>().unwrap();
//! assert!(Arc::ptr_eq(&greeter.clock, &clock));
//! ```
//!
//! Registration modules ([`ServiceModule`]) group related registrations and
//! are applied in dependency order by a [`ServiceModuleRegistry`].

pub mod call_site;
pub mod container;
pub mod descriptor;
pub mod engine;
pub mod error;
pub mod index;
pub mod instance;
pub mod key;
pub mod observer;
pub mod options;
pub mod provider;
pub mod registration;
pub mod scope;
pub mod service_type;

pub use call_site::classifier::location_for;
pub use call_site::{CacheLocation, CallSite, CallSiteKind, ResultCache};
pub use container::{DIContainer, DIContainerBuilder};
pub use descriptor::{
    Arguments, ConstructorDescriptor, GenericConstraint, GenericImplementation, GenericParameter,
    ParameterDescriptor, ParameterSource, TypeCatalog, TypeDescriptor, TypeFacts, TypeKind,
};
pub use engine::{CompiledEngine, DynamicEngine, EngineKind, ExecutionEngine, InterpreterEngine, Producer};
pub use error::{DIError, DIResult, ErrorCategory};
pub use index::RegistrationIndex;
pub use instance::{AsyncDispose, Disposal, Dispose, Instance, ServiceList};
pub use key::{LookupKey, ServiceCacheKey, ServiceKey};
pub use observer::{DiagnosticsObserver, ResolutionHook, TracingObserver};
pub use options::{AsyncDisposePolicy, ContainerOptions};
pub use provider::{ServiceModule, ServiceModuleRegistry};
pub use registration::{Factory, Implementation, Registration, ServiceLifetime};
pub use scope::{BuiltinService, ScopeFactory, ServiceProbe, ServiceScope};
pub use service_type::ServiceType;

/// Convenience macro for registering a factory on a builder or container
///
/// The lifetime defaults to singleton; `scoped` and `transient` select the others.
#[macro_export]
macro_rules! register_service {
    ($target:expr, scoped $service_type:ty, $factory:expr) => {
        $target.register_scoped::<_, $service_type>($factory)
    };
    ($target:expr, transient $service_type:ty, $factory:expr) => {
        $target.register_transient::<_, $service_type>($factory)
    };
    ($target:expr, $service_type:ty, $factory:expr) => {
        $target.register::<_, $service_type>($factory)
    };
}

/// Convenience macro for resolving services
#[macro_export]
macro_rules! resolve_service {
    ($provider:expr, $service_type:ty) => {
        $provider.resolve::<$service_type>()
    };
    ($provider:expr, $service_type:ty, $key:expr) => {
        $provider.resolve_keyed::<$service_type>($key)
    };
}
