//! Lookup keys and cache keys

use std::fmt;
use std::sync::Arc;

use crate::service_type::ServiceType;

/// Optional discriminator that distinguishes registrations of the same type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ServiceKey {
    /// Catch-all sentinel: satisfies any concrete key on single lookups, never
    /// appears in collection results for a concrete key
    Any,
    Name(Arc<str>),
    Number(i64),
}

impl ServiceKey {
    pub fn is_any(&self) -> bool {
        matches!(self, ServiceKey::Any)
    }
}

impl From<&str> for ServiceKey {
    fn from(value: &str) -> Self {
        ServiceKey::Name(value.into())
    }
}

impl From<String> for ServiceKey {
    fn from(value: String) -> Self {
        ServiceKey::Name(value.into())
    }
}

impl From<i64> for ServiceKey {
    fn from(value: i64) -> Self {
        ServiceKey::Number(value)
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceKey::Any => f.write_str("*"),
            ServiceKey::Name(name) => f.write_str(name),
            ServiceKey::Number(n) => write!(f, "{n}"),
        }
    }
}

/// The (type, optional key) identity used to find registrations
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LookupKey {
    service_type: ServiceType,
    key: Option<ServiceKey>,
}

impl LookupKey {
    pub fn new(service_type: ServiceType, key: Option<ServiceKey>) -> Self {
        Self { service_type, key }
    }

    pub fn of_type(service_type: ServiceType) -> Self {
        Self::new(service_type, None)
    }

    pub fn keyed(service_type: ServiceType, key: impl Into<ServiceKey>) -> Self {
        Self::new(service_type, Some(key.into()))
    }

    pub fn of<T: ?Sized + 'static>() -> Self {
        Self::of_type(ServiceType::of::<T>())
    }

    pub fn service_type(&self) -> &ServiceType {
        &self.service_type
    }

    pub fn service_key(&self) -> Option<&ServiceKey> {
        self.key.as_ref()
    }

    /// Same key, different type
    pub fn with_type(&self, service_type: ServiceType) -> Self {
        Self::new(service_type, self.key.clone())
    }

    /// The catch-all key for a lookup carrying a concrete service key
    pub fn any_key_fallback(&self) -> Option<LookupKey> {
        match &self.key {
            Some(key) if !key.is_any() => Some(self.with_type_and_key(ServiceKey::Any)),
            _ => None,
        }
    }

    /// The template lookup for a constructed generic type
    pub fn generic_definition(&self) -> Option<LookupKey> {
        self.service_type
            .generic_definition_of()
            .map(|definition| self.with_type(definition))
    }

    /// Whether a registration under `self` belongs in a collection requested as `request`
    pub(crate) fn matches_collection_key(&self, request: Option<&ServiceKey>) -> bool {
        match (request, self.key.as_ref()) {
            (None, None) => true,
            (Some(ServiceKey::Any), Some(own)) => !own.is_any(),
            (Some(requested), Some(own)) => !own.is_any() && requested == own,
            _ => false,
        }
    }

    fn with_type_and_key(&self, key: ServiceKey) -> Self {
        Self::new(self.service_type.clone(), Some(key))
    }
}

impl fmt::Display for LookupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key {
            Some(key) => write!(f, "{}[{key}]", self.service_type),
            None => write!(f, "{}", self.service_type),
        }
    }
}

/// Identity of a planned call site and of its cached instance: (lookup key, slot)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceCacheKey {
    pub lookup: LookupKey,
    pub slot: usize,
}

impl ServiceCacheKey {
    pub fn new(lookup: LookupKey, slot: usize) -> Self {
        Self { lookup, slot }
    }
}

impl fmt::Display for ServiceCacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.lookup, self.slot)
    }
}
