//! Service registrations: a lookup key mapped to a lifetime and a construction strategy

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::descriptor::{GenericImplementation, TypeDescriptor};
use crate::error::{DIError, DIResult};
use crate::instance::Instance;
use crate::key::{LookupKey, ServiceKey};
use crate::scope::ServiceScope;
use crate::service_type::ServiceType;

/// Service lifetime management
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceLifetime {
    /// Service is created once and reused for the entire application lifetime
    Singleton,
    /// Service is created once per scope
    Scoped,
    /// Service is created each time it's requested
    Transient,
}

impl fmt::Display for ServiceLifetime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ServiceLifetime::Singleton => "singleton",
            ServiceLifetime::Scoped => "scoped",
            ServiceLifetime::Transient => "transient",
        };
        f.write_str(text)
    }
}

/// Factory delegate; receives the resolving scope and the key being resolved
pub type Factory = Arc<dyn Fn(&ServiceScope, Option<&ServiceKey>) -> DIResult<Instance> + Send + Sync>;

/// How instances of a registration are produced
#[derive(Clone)]
pub enum Implementation {
    Type(Arc<TypeDescriptor>),
    Generic(Arc<GenericImplementation>),
    Factory(Factory),
    Constant(Instance),
}

impl Implementation {
    /// Implementation identity used by `try_add_enumerable`
    pub(crate) fn identity(&self) -> Option<ServiceType> {
        match self {
            Implementation::Type(descriptor) => Some(descriptor.implementation().clone()),
            Implementation::Generic(generic) => Some(generic.definition().clone()),
            Implementation::Factory(_) => None,
            Implementation::Constant(instance) => Some(ServiceType::named(instance.type_name())),
        }
    }
}

impl fmt::Display for Implementation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Implementation::Type(descriptor) => write!(f, "'{}'", descriptor.implementation()),
            Implementation::Generic(generic) => write!(f, "'{}'", generic.definition()),
            Implementation::Factory(_) => f.write_str("a factory"),
            Implementation::Constant(instance) => write!(f, "an instance of '{}'", instance.type_name()),
        }
    }
}

impl fmt::Debug for Implementation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Implementation({self})")
    }
}

/// A declared mapping from a lookup key to a construction strategy and lifetime
#[derive(Debug, Clone)]
pub struct Registration {
    lookup: LookupKey,
    lifetime: ServiceLifetime,
    implementation: Implementation,
}

impl Registration {
    pub fn new(service_type: ServiceType, lifetime: ServiceLifetime, implementation: Implementation) -> Self {
        Self {
            lookup: LookupKey::of_type(service_type),
            lifetime,
            implementation,
        }
    }

    /// Register `descriptor` as the implementation of `service_type`
    pub fn of_type(service_type: ServiceType, lifetime: ServiceLifetime, descriptor: TypeDescriptor) -> Self {
        Self::new(service_type, lifetime, Implementation::Type(Arc::new(descriptor)))
    }

    /// Register an implementation as itself
    pub fn self_type(lifetime: ServiceLifetime, descriptor: TypeDescriptor) -> Self {
        let service_type = descriptor.implementation().clone();
        Self::of_type(service_type, lifetime, descriptor)
    }

    /// Register an open generic template
    pub fn generic(service_type: ServiceType, lifetime: ServiceLifetime, implementation: GenericImplementation) -> Self {
        Self::new(service_type, lifetime, Implementation::Generic(Arc::new(implementation)))
    }

    pub fn factory<F>(service_type: ServiceType, lifetime: ServiceLifetime, factory: F) -> Self
    where
        F: Fn(&ServiceScope, Option<&ServiceKey>) -> DIResult<Instance> + Send + Sync + 'static,
    {
        Self::new(service_type, lifetime, Implementation::Factory(Arc::new(factory)))
    }

    /// Register an existing instance as a singleton
    pub fn instance(service_type: ServiceType, instance: Instance) -> Self {
        Self::new(service_type, ServiceLifetime::Singleton, Implementation::Constant(instance))
    }

    pub fn with_key(mut self, key: impl Into<ServiceKey>) -> Self {
        self.lookup = LookupKey::new(self.lookup.service_type().clone(), Some(key.into()));
        self
    }

    pub fn lookup(&self) -> &LookupKey {
        &self.lookup
    }

    pub fn service_type(&self) -> &ServiceType {
        self.lookup.service_type()
    }

    pub fn lifetime(&self) -> ServiceLifetime {
        self.lifetime
    }

    pub fn implementation(&self) -> &Implementation {
        &self.implementation
    }

    pub fn is_open_generic(&self) -> bool {
        self.service_type().is_generic_definition()
    }

    /// Reject registrations that could never be planned
    pub(crate) fn validate(&self) -> DIResult<()> {
        let service = self.service_type();
        match &self.implementation {
            Implementation::Generic(generic) => {
                if !service.is_generic_definition() {
                    return Err(DIError::ClosedServiceOpenImplementation {
                        service: service.to_string(),
                        implementation: generic.definition().to_string(),
                    });
                }
                if service.arity() != generic.arity() {
                    return Err(DIError::ArityMismatch {
                        service: service.to_string(),
                        service_arity: service.arity(),
                        implementation: generic.definition().to_string(),
                        implementation_arity: generic.arity(),
                    });
                }
                for parameter in generic.parameters() {
                    parameter.validate(generic.definition())?;
                }
                Ok(())
            }
            other if service.is_generic_definition() => Err(DIError::OpenGenericMismatch {
                service: service.to_string(),
                implementation: other.to_string(),
            }),
            Implementation::Type(descriptor) => {
                if descriptor.type_kind().is_instantiable() {
                    Ok(())
                } else {
                    Err(DIError::NotInstantiable {
                        service: service.to_string(),
                        implementation: descriptor.implementation().to_string(),
                        kind: descriptor.type_kind().to_string(),
                    })
                }
            }
            Implementation::Constant(_) if self.lifetime != ServiceLifetime::Singleton => {
                Err(DIError::ConstantLifetime {
                    service: service.to_string(),
                })
            }
            Implementation::Factory(_) | Implementation::Constant(_) => Ok(()),
        }
    }
}
