//! Call sites: cacheable construction plans produced by the planner
//!
//! A call site is a closed tree: constructors hold their argument call sites,
//! enumerables hold their items. Both execution engines match over
//! [`CallSiteKind`] exhaustively.

pub(crate) mod chain;
pub mod classifier;
pub(crate) mod planner;
pub(crate) mod validator;

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::descriptor::ConstructorDescriptor;
use crate::instance::{Disposal, Instance};
use crate::key::{ServiceCacheKey, ServiceKey};
use crate::registration::Factory;
use crate::scope::BuiltinService;
use crate::service_type::ServiceType;

/// Tier at which a produced instance may be reused, least to most restrictive
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheLocation {
    /// Shared by every scope of the root
    Root,
    /// Shared within one scope
    Scope,
    /// Never reused, but tracked for disposal by the resolving scope
    DisposeOnly,
    /// Never reused, never tracked
    None,
}

impl fmt::Display for CacheLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            CacheLocation::Root => "root",
            CacheLocation::Scope => "scope",
            CacheLocation::DisposeOnly => "dispose",
            CacheLocation::None => "none",
        };
        f.write_str(text)
    }
}

/// Where a call site's result is cached, and under which key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultCache {
    pub location: CacheLocation,
    pub key: ServiceCacheKey,
}

impl ResultCache {
    pub fn new(location: CacheLocation, key: ServiceCacheKey) -> Self {
        Self { location, key }
    }

    pub fn none(key: ServiceCacheKey) -> Self {
        Self::new(CacheLocation::None, key)
    }
}

#[derive(Clone)]
pub enum CallSiteKind {
    Constructor {
        implementation: ServiceType,
        constructor: Arc<ConstructorDescriptor>,
        arguments: Vec<Arc<CallSite>>,
        disposal: Option<Disposal>,
    },
    Factory {
        factory: Factory,
        key: Option<ServiceKey>,
    },
    Constant {
        value: Instance,
    },
    Enumerable {
        item_type: ServiceType,
        items: Vec<Arc<CallSite>>,
    },
    SelfReference(BuiltinService),
}

impl fmt::Debug for CallSiteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallSiteKind::Constructor {
                implementation,
                arguments,
                ..
            } => f
                .debug_struct("Constructor")
                .field("implementation", implementation)
                .field("arguments", arguments)
                .finish(),
            CallSiteKind::Factory { key, .. } => f.debug_struct("Factory").field("key", key).finish(),
            CallSiteKind::Constant { value } => f.debug_struct("Constant").field("value", value).finish(),
            CallSiteKind::Enumerable { item_type, items } => f
                .debug_struct("Enumerable")
                .field("item_type", item_type)
                .field("items", items)
                .finish(),
            CallSiteKind::SelfReference(builtin) => f.debug_tuple("SelfReference").field(builtin).finish(),
        }
    }
}

/// A planned way of producing one service
#[derive(Debug)]
pub struct CallSite {
    service_type: ServiceType,
    kind: CallSiteKind,
    cache: ResultCache,
}

impl CallSite {
    pub fn new(service_type: ServiceType, kind: CallSiteKind, cache: ResultCache) -> Self {
        Self {
            service_type,
            kind,
            cache,
        }
    }

    pub fn service_type(&self) -> &ServiceType {
        &self.service_type
    }

    pub fn kind(&self) -> &CallSiteKind {
        &self.kind
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub fn location(&self) -> CacheLocation {
        self.cache.location
    }

    /// Direct child call sites
    pub fn children(&self) -> &[Arc<CallSite>] {
        match &self.kind {
            CallSiteKind::Constructor { arguments, .. } => arguments,
            CallSiteKind::Enumerable { items, .. } => items,
            _ => &[],
        }
    }
}
