//! Diagnostics and resolution hooks
//!
//! A container is constructed with one [`DiagnosticsObserver`] and an optional
//! [`ResolutionHook`]. The observer sees engine events (plans, resolutions,
//! disposals, background compilation); the hook sees every successfully
//! resolved instance and can decorate or audit it.

use tracing::debug;

use crate::call_site::CallSite;
use crate::error::DIError;
use crate::instance::Instance;
use crate::key::LookupKey;
use crate::service_type::ServiceType;

/// Receives engine events. Every method defaults to a no-op.
#[allow(unused_variables)]
pub trait DiagnosticsObserver: Send + Sync {
    /// A new call site was planned and stored in the call-site cache
    fn call_site_built(&self, call_site: &CallSite) {}

    /// A resolution request completed successfully
    fn service_resolved(&self, lookup: &LookupKey, scope: u64) {}

    /// A scope finished disposal; `disposed` counts the released instances
    fn scope_disposed(&self, scope: u64, disposed: usize) {}

    /// The dynamic engine swapped in a compiled producer
    fn call_site_compiled(&self, call_site: &CallSite) {}

    /// Background compilation failed; the interpreter stays in effect
    fn compilation_failed(&self, call_site: &CallSite, error: &DIError) {}
}

/// Default observer: emits `tracing` events
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl DiagnosticsObserver for TracingObserver {
    fn call_site_built(&self, call_site: &CallSite) {
        debug!(
            service = %call_site.service_type(),
            slot = call_site.cache().key.slot,
            location = %call_site.location(),
            "Built call site"
        );
    }

    fn service_resolved(&self, lookup: &LookupKey, scope: u64) {
        debug!(service = %lookup, scope, "Resolved service");
    }

    fn scope_disposed(&self, scope: u64, disposed: usize) {
        debug!(scope, disposed, "Disposed scope");
    }

    fn call_site_compiled(&self, call_site: &CallSite) {
        debug!(service = %call_site.service_type(), "Compiled call site");
    }

    fn compilation_failed(&self, call_site: &CallSite, error: &DIError) {
        debug!(service = %call_site.service_type(), error = %error, "Compilation failed");
    }
}

/// Invoked with every successfully resolved service
pub trait ResolutionHook: Send + Sync {
    fn on_resolved(&self, service_type: &ServiceType, instance: &Instance);
}

impl<F> ResolutionHook for F
where
    F: Fn(&ServiceType, &Instance) + Send + Sync,
{
    fn on_resolved(&self, service_type: &ServiceType, instance: &Instance) {
        self(service_type, instance)
    }
}
