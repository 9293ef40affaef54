//! Adaptive engine: interpret first, compile hot call sites in the background

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::{debug, warn};

use crate::call_site::CallSite;
use crate::engine::{ExecutionEngine, InterpreterEngine, Producer};
use crate::error::{DIError, DIResult};
use crate::instance::Instance;
use crate::observer::DiagnosticsObserver;
use crate::scope::ServiceScope;

/// Interprets each call site until its `compile_after`-th invocation, then
/// compiles it on a detached task and atomically swaps the producer.
///
/// Compilation failures are reported to the observer and logged; the
/// interpreted producer stays in effect.
pub struct DynamicEngine {
    compiler: Arc<dyn ExecutionEngine>,
    compile_after: u32,
    observer: Arc<dyn DiagnosticsObserver>,
    disposed: Arc<AtomicBool>,
}

impl DynamicEngine {
    pub fn new(compiler: Arc<dyn ExecutionEngine>, compile_after: u32, observer: Arc<dyn DiagnosticsObserver>) -> Self {
        Self {
            compiler,
            compile_after: compile_after.max(1),
            observer,
            disposed: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl ExecutionEngine for DynamicEngine {
    fn name(&self) -> &'static str {
        "dynamic"
    }

    fn realize(&self, call_site: &Arc<CallSite>) -> DIResult<Producer> {
        let interpreted = InterpreterEngine.realize(call_site)?;
        let adaptive = Arc::new(AdaptiveProducer {
            site: call_site.clone(),
            calls: AtomicU32::new(0),
            current: ArcSwap::from_pointee(interpreted),
            compiler: self.compiler.clone(),
            compile_after: self.compile_after,
            observer: self.observer.clone(),
            disposed: self.disposed.clone(),
        });
        Ok(Arc::new(move |scope: &ServiceScope| adaptive.invoke(scope)))
    }

    fn dispose(&self) {
        if !self.disposed.swap(true, Ordering::AcqRel) {
            debug!(compiler = self.compiler.name(), "Dynamic engine disposed");
            self.compiler.dispose();
        }
    }
}

struct AdaptiveProducer {
    site: Arc<CallSite>,
    calls: AtomicU32,
    current: ArcSwap<Producer>,
    compiler: Arc<dyn ExecutionEngine>,
    compile_after: u32,
    observer: Arc<dyn DiagnosticsObserver>,
    disposed: Arc<AtomicBool>,
}

impl AdaptiveProducer {
    fn invoke(self: &Arc<Self>, scope: &ServiceScope) -> DIResult<Instance> {
        let producer = Producer::clone(&self.current.load());
        let call = self.calls.fetch_add(1, Ordering::AcqRel).saturating_add(1);
        if call == self.compile_after {
            self.schedule_compile();
        }
        producer(scope)
    }

    fn schedule_compile(self: &Arc<Self>) {
        if self.disposed.load(Ordering::Acquire) {
            return;
        }
        let this = Arc::clone(self);
        let job = move || this.compile();

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(job);
            }
            Err(_) => {
                let spawned = std::thread::Builder::new()
                    .name("di-compile".to_string())
                    .spawn(job);
                if let Err(err) = spawned {
                    warn!(service = %self.site.service_type(), error = %err, "Failed to spawn compilation thread");
                }
            }
        }
    }

    fn compile(&self) {
        if self.disposed.load(Ordering::Acquire) {
            return;
        }

        let outcome = catch_unwind(AssertUnwindSafe(|| self.compiler.realize(&self.site)));
        let result = match outcome {
            Ok(result) => result,
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "compiler panicked".to_string());
                Err(DIError::Compilation {
                    service: self.site.service_type().to_string(),
                    message,
                })
            }
        };

        match result {
            Ok(compiled) => {
                self.current.store(Arc::new(compiled));
                debug!(
                    service = %self.site.service_type(),
                    compiler = self.compiler.name(),
                    "Swapped in compiled producer"
                );
                self.observer.call_site_compiled(&self.site);
            }
            Err(err) => {
                warn!(
                    service = %self.site.service_type(),
                    error = %err,
                    "Background compilation failed; keeping interpreter"
                );
                self.observer.compilation_failed(&self.site, &err);
            }
        }
    }
}
