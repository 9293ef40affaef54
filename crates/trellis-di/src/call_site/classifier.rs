//! Result-cache classification
//!
//! Decides where the instance produced by a call site may be reused. Leaf call
//! sites are classified from their registration's lifetime; composites take the
//! most restrictive location among their children.

use crate::call_site::{CacheLocation, CallSite, ResultCache};
use crate::descriptor::TypeDescriptor;
use crate::key::ServiceCacheKey;
use crate::registration::ServiceLifetime;
use std::sync::Arc;

/// Location for a lifetime, given whether the produced value may need disposal
pub fn location_for(lifetime: ServiceLifetime, disposable: bool) -> CacheLocation {
    match lifetime {
        ServiceLifetime::Singleton => CacheLocation::Root,
        ServiceLifetime::Scoped => CacheLocation::Scope,
        ServiceLifetime::Transient if disposable => CacheLocation::DisposeOnly,
        ServiceLifetime::Transient => CacheLocation::None,
    }
}

pub(crate) fn for_type(lifetime: ServiceLifetime, descriptor: &TypeDescriptor, key: ServiceCacheKey) -> ResultCache {
    ResultCache::new(location_for(lifetime, descriptor.is_disposable()), key)
}

/// Factories are opaque: a transient factory result is always tracked so a
/// disposable return value is not leaked
pub(crate) fn for_factory(lifetime: ServiceLifetime, key: ServiceCacheKey) -> ResultCache {
    ResultCache::new(location_for(lifetime, true), key)
}

pub(crate) fn for_constant(lifetime: ServiceLifetime, key: ServiceCacheKey) -> ResultCache {
    ResultCache::new(location_for(lifetime, false), key)
}

pub(crate) fn for_enumerable(items: &[Arc<CallSite>], key: ServiceCacheKey) -> ResultCache {
    let location = items
        .iter()
        .map(|item| item.location())
        .max()
        .unwrap_or(CacheLocation::None);
    ResultCache::new(location, key)
}
