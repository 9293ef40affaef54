//! Error types for registration, planning, resolution and scope lifecycle

use thiserror::Error;

/// Broad classification of a [`DIError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Raised when a registration is added or first planned
    Configuration,
    /// Raised while planning or executing a resolution
    Resolution,
    /// Raised when a scope is used or disposed incorrectly
    Lifecycle,
    /// Raised by execution engines and option loading
    Engine,
}

/// Errors that can occur during dependency injection operations
#[derive(Debug, Error)]
pub enum DIError {
    #[error("Open generic service '{service}' requires an open generic implementation, got {implementation}")]
    OpenGenericMismatch {
        service: String,
        implementation: String,
    },

    #[error("Closed service '{service}' cannot use the open generic implementation '{implementation}'")]
    ClosedServiceOpenImplementation {
        service: String,
        implementation: String,
    },

    #[error("Arity of open generic service '{service}' ({service_arity}) does not match implementation '{implementation}' ({implementation_arity})")]
    ArityMismatch {
        service: String,
        service_arity: usize,
        implementation: String,
        implementation_arity: usize,
    },

    #[error("Implementation '{implementation}' registered for '{service}' cannot be instantiated: it is {kind}")]
    NotInstantiable {
        service: String,
        implementation: String,
        kind: String,
    },

    #[error("Invalid constraints on generic parameter '{parameter}' of '{implementation}': {message}")]
    InvalidConstraints {
        implementation: String,
        parameter: String,
        message: String,
    },

    #[error("Generic argument '{argument}' violates the constraint '{constraint}' on parameter '{parameter}' of '{implementation}'")]
    ConstraintViolation {
        implementation: String,
        parameter: String,
        argument: String,
        constraint: String,
    },

    #[error("Constant instance registered for '{service}' must use the singleton lifetime")]
    ConstantLifetime { service: String },

    #[error("Parameter '{parameter}' of '{implementation}' asks for the service key, but '{service}' was resolved without one")]
    MissingServiceKey {
        service: String,
        implementation: String,
        parameter: String,
    },

    #[error("Service not registered: {service_type}")]
    ServiceNotRegistered { service_type: String },

    #[error("Unable to resolve service for type '{dependency}' while attempting to activate '{implementation}'")]
    UnresolvedDependency {
        dependency: String,
        implementation: String,
    },

    #[error("No public constructor is available for '{implementation}'")]
    NoConstructor { implementation: String },

    #[error("Unable to activate type '{implementation}'. The following constructors are ambiguous:\n{first}\n{second}")]
    AmbiguousConstructor {
        implementation: String,
        first: String,
        second: String,
    },

    #[error("No constructor for type '{implementation}' can be instantiated using services from the service container and default values")]
    CannotActivate { implementation: String },

    #[error("A circular dependency was detected for the service of type '{service}'{detail}.\n{path}")]
    CircularDependency {
        service: String,
        detail: String,
        path: String,
    },

    #[error("Cannot resolve scoped service '{scoped}' from the root provider while resolving '{service}'")]
    ScopedFromRoot { service: String, scoped: String },

    #[error("Cannot consume scoped service '{scoped}' from singleton '{singleton}'")]
    ScopedInSingleton { scoped: String, singleton: String },

    #[error("Invalid service type: {message}")]
    InvalidServiceType { message: String },

    #[error("Dependency resolution failed: {message}")]
    DependencyResolutionFailed { message: String },

    #[error("Cannot access a disposed scope (scope {scope})")]
    Disposed { scope: u64 },

    #[error("'{type_name}' only supports asynchronous disposal; use dispose_async to dispose the scope")]
    AsyncDisposeOnly { type_name: String },

    #[error("Compilation failed for '{service}': {message}")]
    Compilation { service: String, message: String },

    #[error("Container validation failed with {} error(s):\n{}", errors.len(), render_errors(errors))]
    BuildValidation { errors: Vec<DIError> },

    #[error("Invalid container options: {0}")]
    InvalidOptions(String),

    #[error("Options error: {0}")]
    Options(#[from] config::ConfigError),
}

fn render_errors(errors: &[DIError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {e}"))
        .collect::<Vec<_>>()
        .join("\n")
}

impl DIError {
    /// Classify this error into the taxonomy used by callers
    pub fn category(&self) -> ErrorCategory {
        match self {
            DIError::OpenGenericMismatch { .. }
            | DIError::ClosedServiceOpenImplementation { .. }
            | DIError::ArityMismatch { .. }
            | DIError::NotInstantiable { .. }
            | DIError::InvalidConstraints { .. }
            | DIError::ConstraintViolation { .. }
            | DIError::ConstantLifetime { .. }
            | DIError::MissingServiceKey { .. }
            | DIError::BuildValidation { .. } => ErrorCategory::Configuration,

            DIError::ServiceNotRegistered { .. }
            | DIError::UnresolvedDependency { .. }
            | DIError::NoConstructor { .. }
            | DIError::AmbiguousConstructor { .. }
            | DIError::CannotActivate { .. }
            | DIError::CircularDependency { .. }
            | DIError::ScopedFromRoot { .. }
            | DIError::ScopedInSingleton { .. }
            | DIError::InvalidServiceType { .. }
            | DIError::DependencyResolutionFailed { .. } => ErrorCategory::Resolution,

            DIError::Disposed { .. } | DIError::AsyncDisposeOnly { .. } => ErrorCategory::Lifecycle,

            DIError::Compilation { .. } | DIError::InvalidOptions(_) | DIError::Options(_) => {
                ErrorCategory::Engine
            }
        }
    }

    /// Whether this error is a circular dependency report
    pub fn is_circular(&self) -> bool {
        matches!(self, DIError::CircularDependency { .. })
    }
}

pub type DIResult<T> = Result<T, DIError>;
