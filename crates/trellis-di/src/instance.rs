//! Type-erased service instances and the disposal protocol

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

pub type AnyArc = Arc<dyn Any + Send + Sync>;

/// Synchronous release of resources held by a service
pub trait Dispose: Send + Sync {
    fn dispose(&self);
}

/// Asynchronous release of resources held by a service
#[async_trait]
pub trait AsyncDispose: Send + Sync {
    async fn dispose_async(&self);
}

/// How a captured instance is released
#[derive(Clone)]
pub(crate) enum DisposeHandle {
    Sync(Arc<dyn Dispose>),
    Async(Arc<dyn AsyncDispose>),
    Both(Arc<dyn Dispose>, Arc<dyn AsyncDispose>),
}

impl DisposeHandle {
    /// Future for the async path; sync-only handles run inline
    pub(crate) fn dispose_async(&self) -> BoxFuture<'static, ()> {
        match self {
            DisposeHandle::Sync(d) => {
                d.dispose();
                Box::pin(async {})
            }
            DisposeHandle::Async(d) | DisposeHandle::Both(_, d) => {
                let d = d.clone();
                Box::pin(async move { d.dispose_async().await })
            }
        }
    }
}

/// A resolved service: the shared value plus its disposal capability
#[derive(Clone)]
pub struct Instance {
    value: AnyArc,
    type_name: &'static str,
    disposal: Option<DisposeHandle>,
}

impl Instance {
    pub fn new<T: Send + Sync + 'static>(value: T) -> Self {
        Self::from_arc(Arc::new(value))
    }

    pub fn from_arc<T: Send + Sync + 'static>(value: Arc<T>) -> Self {
        Self {
            value: value as AnyArc,
            type_name: std::any::type_name::<T>(),
            disposal: None,
        }
    }

    /// An instance the owning scope disposes synchronously
    pub fn disposable<T: Dispose + 'static>(value: Arc<T>) -> Self {
        let handle = DisposeHandle::Sync(value.clone());
        Self::from_arc(value).with_disposal(handle)
    }

    /// An instance that can only be disposed asynchronously
    pub fn async_disposable<T: AsyncDispose + 'static>(value: Arc<T>) -> Self {
        let handle = DisposeHandle::Async(value.clone());
        Self::from_arc(value).with_disposal(handle)
    }

    /// An instance supporting both disposal paths
    pub fn dual_disposable<T: Dispose + AsyncDispose + 'static>(value: Arc<T>) -> Self {
        let handle = DisposeHandle::Both(value.clone(), value.clone());
        Self::from_arc(value).with_disposal(handle)
    }

    pub(crate) fn with_disposal(mut self, handle: DisposeHandle) -> Self {
        self.disposal = Some(handle);
        self
    }

    pub fn downcast<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.value.clone().downcast::<T>().ok()
    }

    pub fn is<T: Send + Sync + 'static>(&self) -> bool {
        self.value.is::<T>()
    }

    pub fn as_any(&self) -> &AnyArc {
        &self.value
    }

    /// Rust type name of the stored value
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn is_disposable(&self) -> bool {
        self.disposal.is_some()
    }

    /// Whether both instances share the same allocation
    pub fn ptr_eq(&self, other: &Instance) -> bool {
        Arc::ptr_eq(&self.value, &other.value)
    }

    pub(crate) fn disposal(&self) -> Option<&DisposeHandle> {
        self.disposal.as_ref()
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("type_name", &self.type_name)
            .field("disposable", &self.is_disposable())
            .finish()
    }
}

/// Declares how instances produced by an implementation type are disposed.
///
/// Attached to a [`TypeDescriptor`](crate::descriptor::TypeDescriptor) so the planner
/// knows, before anything is built, whether transient instances must be tracked.
#[derive(Clone)]
pub struct Disposal {
    attach: Arc<dyn Fn(&AnyArc) -> Option<DisposeHandle> + Send + Sync>,
}

impl Disposal {
    pub fn sync<T: Dispose + 'static>() -> Self {
        Self {
            attach: Arc::new(|value: &AnyArc| {
                value
                    .clone()
                    .downcast::<T>()
                    .ok()
                    .map(|v| DisposeHandle::Sync(v))
            }),
        }
    }

    pub fn async_only<T: AsyncDispose + 'static>() -> Self {
        Self {
            attach: Arc::new(|value: &AnyArc| {
                value
                    .clone()
                    .downcast::<T>()
                    .ok()
                    .map(|v| DisposeHandle::Async(v))
            }),
        }
    }

    pub fn both<T: Dispose + AsyncDispose + 'static>() -> Self {
        Self {
            attach: Arc::new(|value: &AnyArc| {
                value
                    .clone()
                    .downcast::<T>()
                    .ok()
                    .map(|v| DisposeHandle::Both(v.clone(), v))
            }),
        }
    }

    pub(crate) fn attach(&self, instance: Instance) -> Instance {
        match (self.attach)(instance.as_any()) {
            Some(handle) => instance.with_disposal(handle),
            None => instance,
        }
    }
}

impl fmt::Debug for Disposal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Disposal")
    }
}

/// The value produced for a "sequence of T" resolution
#[derive(Debug, Clone, Default)]
pub struct ServiceList {
    items: Vec<Instance>,
}

impl ServiceList {
    pub(crate) fn new(items: Vec<Instance>) -> Self {
        Self { items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Instance> {
        self.items.iter()
    }

    /// Downcast every item; items of another type are skipped
    pub fn downcast_all<T: Send + Sync + 'static>(&self) -> Vec<Arc<T>> {
        self.items.iter().filter_map(Instance::downcast::<T>).collect()
    }
}
